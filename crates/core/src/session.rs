//! Session log records and the writer trait.
//!
//! A session is persisted as an append-only JSON-lines file holding three
//! kinds of record:
//!
//! ```text
//! {...message fields...}
//! {"role":"_usage","token_count":1234}
//! {"role":"_checkpoint","id":3}
//! ```
//!
//! Writers live in the `ferrocode-session` crate.

use async_trait::async_trait;
use std::path::Path;

use crate::error::PersistenceError;
use crate::message::Message;

const USAGE_ROLE: &str = "_usage";
const CHECKPOINT_ROLE: &str = "_checkpoint";

/// One line of the session log.
#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
    Message(Message),
    Usage { token_count: u64 },
    Checkpoint { id: u64 },
}

impl LogRecord {
    /// Encode as a single JSON line (without the trailing newline).
    pub fn to_line(&self) -> Result<String, PersistenceError> {
        match self {
            LogRecord::Message(message) => {
                serde_json::to_string(message).map_err(|e| PersistenceError::Encode(e.to_string()))
            }
            LogRecord::Usage { token_count } => Ok(format!(
                r#"{{"role":"{USAGE_ROLE}","token_count":{token_count}}}"#
            )),
            LogRecord::Checkpoint { id } => {
                Ok(format!(r#"{{"role":"{CHECKPOINT_ROLE}","id":{id}}}"#))
            }
        }
    }

    /// Decode one JSON line.
    pub fn parse(line: &str) -> Result<Self, String> {
        let value: serde_json::Value = serde_json::from_str(line).map_err(|e| e.to_string())?;
        match value.get("role").and_then(|r| r.as_str()) {
            Some(USAGE_ROLE) => value
                .get("token_count")
                .and_then(|n| n.as_u64())
                .map(|token_count| LogRecord::Usage { token_count })
                .ok_or_else(|| "usage record without token_count".to_string()),
            Some(CHECKPOINT_ROLE) => value
                .get("id")
                .and_then(|n| n.as_u64())
                .map(|id| LogRecord::Checkpoint { id })
                .ok_or_else(|| "checkpoint record without id".to_string()),
            _ => serde_json::from_value::<Message>(value)
                .map(LogRecord::Message)
                .map_err(|e| e.to_string()),
        }
    }
}

/// Durable sink for session log records.
///
/// Implementations must preserve append order. Buffering writers override
/// [`LogWriter::flush`]; the conversation store calls it before touching the
/// log file directly (revert, restore).
#[async_trait]
pub trait LogWriter: Send + Sync {
    /// The log file this writer appends to.
    fn path(&self) -> &Path;

    /// Append records in order.
    async fn append(&self, records: &[LogRecord]) -> Result<(), PersistenceError>;

    /// Make every appended record durable.
    async fn flush(&self) -> Result<(), PersistenceError> {
        Ok(())
    }
}
