//! # Ferrocode Core
//!
//! Domain types, traits, and error definitions for the Ferrocode agent
//! runtime. This crate defines the domain model that every other crate
//! implements against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the step loop is a trait here: the model
//! ([`Provider`]), tools ([`Tool`]), the session log ([`LogWriter`]) and
//! placeholder ids ([`IdGenerator`]). Implementations live in their
//! respective crates, so tests can swap in scripted stand-ins.

pub mod agent;
pub mod approval;
pub mod error;
pub mod event;
pub mod ids;
pub mod message;
pub mod provider;
pub mod session;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentSpec, SubagentSpec};
pub use approval::{Approval, ApprovalRequest, ApprovalResponse};
pub use error::{PersistenceError, ProviderError, ToolError};
pub use event::{Wire, WireEvent};
pub use ids::{IdGenerator, SequentialIds, UuidGenerator};
pub use message::{ContentPart, Message, Role, ToolCall};
pub use provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolCallDelta,
    ToolDefinition, Usage,
};
pub use session::{LogRecord, LogWriter};
pub use tool::{Tool, ToolRegistry, ToolResult, ToolStatus};
