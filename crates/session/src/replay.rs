//! Reading, replaying, and rotating session log files.

use ferrocode_core::error::PersistenceError;
use ferrocode_core::message::Message;
use ferrocode_core::session::LogRecord;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// In-memory state reconstructed from a sequence of log records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Replayed {
    pub history: Vec<Message>,
    pub token_count: u64,
    pub next_checkpoint_id: u64,
}

impl Replayed {
    pub fn from_records(records: &[LogRecord]) -> Self {
        let mut state = Self::default();
        for record in records {
            state.apply(record);
        }
        state
    }

    pub fn apply(&mut self, record: &LogRecord) {
        match record {
            LogRecord::Message(message) => self.history.push(message.clone()),
            LogRecord::Usage { token_count } => self.token_count = *token_count,
            LogRecord::Checkpoint { id } => self.next_checkpoint_id = id + 1,
        }
    }
}

/// Read every record of a log file. A missing file is an empty log.
pub async fn read_records(path: &Path) -> Result<Vec<LogRecord>, PersistenceError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(PersistenceError::io(path, e)),
    };

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            LogRecord::parse(line).map_err(|reason| PersistenceError::CorruptRecord {
                path: path.to_path_buf(),
                line: idx + 1,
                reason,
            })
        })
        .collect()
}

/// Records up to and including the marker of checkpoint `id`, or `None` if
/// the log holds no such marker.
///
/// Everything the checkpoint guarded is dropped. The marker itself carries no
/// conversation content and stays, so replaying the result gives the history
/// from before the checkpoint and continues numbering at `id + 1`.
pub fn truncate_at_checkpoint(records: &[LogRecord], id: u64) -> Option<&[LogRecord]> {
    records
        .iter()
        .position(|r| matches!(r, LogRecord::Checkpoint { id: found } if *found == id))
        .map(|idx| &records[..=idx])
}

/// Rename `path` to `<path>.<n>` using the first unused `n >= 1`.
pub async fn rotate(path: &Path) -> Result<PathBuf, PersistenceError> {
    let mut n = 1u32;
    let backup = loop {
        let candidate = with_suffix(path, &format!(".{n}"));
        if !tokio::fs::try_exists(&candidate)
            .await
            .map_err(|e| PersistenceError::io(&candidate, e))?
        {
            break candidate;
        }
        n += 1;
    };

    tokio::fs::rename(path, &backup)
        .await
        .map_err(|e| PersistenceError::io(path, e))?;
    debug!(from = %path.display(), to = %backup.display(), "Rotated session log");
    Ok(backup)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Replace the log at `path` with `records` and keep the old log as a
/// numbered backup, whose path is returned.
///
/// The new content is staged in `<path>.tmp` first. On any failure the live
/// log is left as it was.
pub async fn replace_with_backup(
    path: &Path,
    records: &[LogRecord],
) -> Result<PathBuf, PersistenceError> {
    let staged = with_suffix(path, ".tmp");
    if let Err(e) = write_records(&staged, records).await {
        discard(&staged).await;
        return Err(e);
    }

    let backup = match rotate(path).await {
        Ok(backup) => backup,
        Err(e) => {
            discard(&staged).await;
            return Err(e);
        }
    };

    if let Err(e) = tokio::fs::rename(&staged, path).await {
        if let Err(undo) = tokio::fs::rename(&backup, path).await {
            warn!(
                backup = %backup.display(),
                error = %undo,
                "Could not move session log back from backup"
            );
        }
        discard(&staged).await;
        return Err(PersistenceError::io(path, e));
    }
    Ok(backup)
}

async fn discard(staged: &Path) {
    if let Err(e) = tokio::fs::remove_file(staged).await {
        debug!(path = %staged.display(), error = %e, "Staged session log not removed");
    }
}

/// Write `records` as a fresh log, replacing whatever is at `path`.
pub async fn write_records(path: &Path, records: &[LogRecord]) -> Result<(), PersistenceError> {
    let mut content = String::new();
    for record in records {
        content.push_str(&record.to_line()?);
        content.push('\n');
    }
    tokio::fs::write(path, content)
        .await
        .map_err(|e| PersistenceError::io(path, e))
}
