//! # Ferrocode Session
//!
//! The conversation store and its append-only JSON-lines log.
//!
//! Two writers are available:
//! - **Sync**: every append hits the file before returning (default)
//! - **Batched**: appends are queued and written by size threshold or timer

pub mod replay;
pub mod store;
pub mod writer;

pub use replay::Replayed;
pub use store::{ConversationStore, checkpoint_marker};
pub use writer::{BatchedLogWriter, SyncLogWriter};

use chrono::Utc;
use ferrocode_config::{PersistenceConfig, PersistenceMode};
use ferrocode_core::session::LogWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Build the writer selected by the persistence configuration.
pub fn open_writer(path: impl Into<PathBuf>, config: &PersistenceConfig) -> Arc<dyn LogWriter> {
    let path = path.into();
    match config.mode {
        PersistenceMode::Sync => Arc::new(SyncLogWriter::new(path)),
        PersistenceMode::Batched => Arc::new(BatchedLogWriter::new(
            path,
            config.batch_size,
            Duration::from_millis(config.flush_interval_ms),
        )),
    }
}

/// A fresh log path for a new session inside `dir`.
pub fn new_session_path(dir: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%d-%H%M%S");
    let suffix = Uuid::new_v4().simple().to_string();
    dir.join(format!("{stamp}-{}.jsonl", &suffix[..8]))
}
