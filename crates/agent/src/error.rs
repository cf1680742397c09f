use ferrocode_core::error::PersistenceError;
use thiserror::Error;

/// Failures that abort a run. Everything else is turned into conversation
/// content the model can react to.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Reached the maximum of {max_steps} steps in one run")]
    MaxStepsReached { max_steps: u32 },

    #[error("Session persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
}
