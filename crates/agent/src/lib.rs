//! The agent step loop: the heart of Ferrocode.
//!
//! Each step of a run:
//!
//! 1. **Compact** the history if the token count is over budget
//! 2. **Checkpoint** the conversation so the step can be reverted
//! 3. **Stream** one model turn and rebuild it from chunks
//! 4. **Dispatch** the tool calls it contains, concurrently
//! 5. **Append** the results and loop back, or stop when no tools were called
//!
//! Model and tool failures become conversation content the model can react
//! to; only the step limit and persistence failures end a run with an error.

pub mod accumulator;
pub mod compaction;
pub mod error;
pub mod loop_runner;
pub mod pipeline;
pub mod runtime;
pub mod subagent;
pub mod token;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use accumulator::{AssistantTurn, RawToolCall, StreamAccumulator};
pub use compaction::{Compaction, Compactor, SimpleCompactor};
pub use error::AgentError;
pub use loop_runner::{AgentLoop, AgentStatus, LoopState, RunOutcome, StopReason};
pub use pipeline::{Prepared, ToolPipeline, prepare, validate};
pub use runtime::{DefaultToolset, Runtime, ToolsetFactory};
pub use subagent::TaskTool;
pub use token::{CharEstimator, TokenEstimator};
