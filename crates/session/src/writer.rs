//! Session log writers.
//!
//! [`SyncLogWriter`] writes every append before returning.
//! [`BatchedLogWriter`] queues encoded lines and flushes them when the queue
//! reaches the batch size, when the flush timer fires, or when asked to.

use async_trait::async_trait;
use ferrocode_core::error::PersistenceError;
use ferrocode_core::session::{LogRecord, LogWriter};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

fn encode(records: &[LogRecord]) -> Result<Vec<String>, PersistenceError> {
    records.iter().map(LogRecord::to_line).collect()
}

async fn append_lines(path: &Path, lines: &[String]) -> Result<(), PersistenceError> {
    let mut buf = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
    for line in lines {
        buf.push_str(line);
        buf.push('\n');
    }

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| PersistenceError::io(path, e))?;
    file.write_all(buf.as_bytes())
        .await
        .map_err(|e| PersistenceError::io(path, e))?;
    file.flush().await.map_err(|e| PersistenceError::io(path, e))
}

/// Writes each append straight to the log file.
pub struct SyncLogWriter {
    path: PathBuf,
}

impl SyncLogWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl LogWriter for SyncLogWriter {
    fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, records: &[LogRecord]) -> Result<(), PersistenceError> {
        if records.is_empty() {
            return Ok(());
        }
        let lines = encode(records)?;
        append_lines(&self.path, &lines).await
    }
}

struct BatchState {
    path: PathBuf,
    batch_size: usize,
    queue: Mutex<Vec<String>>,
    /// Held for the whole duration of a flush.
    flush_gate: tokio::sync::Mutex<()>,
    /// Failure of a timer-driven flush, reported to the next caller.
    failure: Mutex<Option<String>>,
}

impl BatchState {
    fn queued(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    fn take_failure(&self) -> Option<String> {
        self.failure.lock().ok().and_then(|mut f| f.take())
    }

    fn record_failure(&self, err: &PersistenceError) {
        if let Ok(mut slot) = self.failure.lock() {
            if slot.is_none() {
                *slot = Some(err.to_string());
            }
        }
    }

    /// Write the queue followed by `incoming`.
    ///
    /// On failure the queued lines go back to the front of the queue for the
    /// next flush, while `incoming` is dropped: its caller gets the error and
    /// never treats those records as written.
    async fn flush_queued(&self, incoming: Vec<String>) -> Result<(), PersistenceError> {
        let _gate = self.flush_gate.lock().await;
        let mut lines = match self.queue.lock() {
            Ok(mut queue) => std::mem::take(&mut *queue),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        let queued = lines.len();
        lines.extend(incoming);
        if lines.is_empty() {
            return Ok(());
        }

        debug!(path = %self.path.display(), records = lines.len(), "Flushing session log batch");
        if let Err(e) = append_lines(&self.path, &lines).await {
            lines.truncate(queued);
            if let Ok(mut queue) = self.queue.lock() {
                let newer = std::mem::replace(&mut *queue, lines);
                queue.extend(newer);
            }
            return Err(e);
        }
        Ok(())
    }
}

/// Queues records and writes them in batches.
pub struct BatchedLogWriter {
    state: Arc<BatchState>,
    timer: JoinHandle<()>,
}

impl BatchedLogWriter {
    /// Create the writer and start its flush timer. Must be called inside a
    /// tokio runtime.
    pub fn new(path: impl Into<PathBuf>, batch_size: usize, flush_interval: Duration) -> Self {
        let state = Arc::new(BatchState {
            path: path.into(),
            batch_size: batch_size.max(1),
            queue: Mutex::new(Vec::new()),
            flush_gate: tokio::sync::Mutex::new(()),
            failure: Mutex::new(None),
        });
        let timer = tokio::spawn(flush_timer(Arc::downgrade(&state), flush_interval));
        Self { state, timer }
    }

    /// Number of records waiting to be written.
    pub fn pending(&self) -> usize {
        self.state.queued()
    }

    fn check_failure(&self) -> Result<(), PersistenceError> {
        match self.state.take_failure() {
            Some(reason) => Err(PersistenceError::Flush(reason)),
            None => Ok(()),
        }
    }
}

async fn flush_timer(state: Weak<BatchState>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(state) = state.upgrade() else {
            return;
        };
        if let Err(e) = state.flush_queued(Vec::new()).await {
            warn!(path = %state.path.display(), error = %e, "Timed session log flush failed");
            state.record_failure(&e);
        }
    }
}

#[async_trait]
impl LogWriter for BatchedLogWriter {
    fn path(&self) -> &Path {
        &self.state.path
    }

    async fn append(&self, records: &[LogRecord]) -> Result<(), PersistenceError> {
        self.check_failure()?;
        if records.is_empty() {
            return Ok(());
        }
        let lines = encode(records)?;
        match self.state.queue.lock() {
            Ok(mut queue) if queue.len() + lines.len() < self.state.batch_size => {
                queue.extend(lines);
                return Ok(());
            }
            Ok(_) => {}
            Err(_) => return Err(PersistenceError::Flush("write queue poisoned".into())),
        }
        self.state.flush_queued(lines).await
    }

    async fn flush(&self) -> Result<(), PersistenceError> {
        self.check_failure()?;
        self.state.flush_queued(Vec::new()).await
    }
}

impl Drop for BatchedLogWriter {
    fn drop(&mut self) {
        self.timer.abort();
        let lines = match self.state.queue.lock() {
            Ok(mut queue) => std::mem::take(&mut *queue),
            Err(_) => return,
        };
        if lines.is_empty() {
            return;
        }
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.state.path)
            .and_then(|mut file| {
                for line in &lines {
                    writeln!(file, "{line}")?;
                }
                Ok(())
            });
        if let Err(e) = result {
            warn!(path = %self.state.path.display(), error = %e, "Dropped unflushed session log records");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::read_records;
    use ferrocode_core::message::Message;

    fn msg(text: &str) -> LogRecord {
        LogRecord::Message(Message::user(text))
    }

    #[tokio::test]
    async fn sync_writer_appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let writer = SyncLogWriter::new(&path);

        writer.append(&[msg("a"), msg("b")]).await.unwrap();
        writer.append(&[LogRecord::Checkpoint { id: 0 }]).await.unwrap();

        let records = read_records(&path).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2], LogRecord::Checkpoint { id: 0 });
    }

    #[tokio::test]
    async fn batched_writer_holds_until_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let writer = BatchedLogWriter::new(&path, 3, Duration::from_secs(3600));

        writer.append(&[msg("a"), msg("b")]).await.unwrap();
        assert_eq!(writer.pending(), 2);
        assert!(read_records(&path).await.unwrap().is_empty());

        writer.append(&[msg("c")]).await.unwrap();
        assert_eq!(writer.pending(), 0);
        assert_eq!(read_records(&path).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn batched_writer_explicit_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let writer = BatchedLogWriter::new(&path, 100, Duration::from_secs(3600));

        writer.append(&[msg("a")]).await.unwrap();
        writer.flush().await.unwrap();
        assert_eq!(read_records(&path).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn batched_writer_flushes_on_timer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let writer = BatchedLogWriter::new(&path, 100, Duration::from_millis(50));

        writer.append(&[msg("a")]).await.unwrap();
        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if writer.pending() == 0 {
                break;
            }
        }
        assert_eq!(writer.pending(), 0);
        // Waits out a flush the timer may still have in progress.
        writer.flush().await.unwrap();
        assert_eq!(read_records(&path).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_failure_surfaces_on_next_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("log.jsonl");
        let writer = BatchedLogWriter::new(&path, 100, Duration::from_millis(50));

        writer.append(&[msg("a")]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        let err = writer.append(&[msg("b")]).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Flush(_)));
    }

    #[tokio::test]
    async fn drop_writes_pending_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        {
            let writer = BatchedLogWriter::new(&path, 100, Duration::from_secs(3600));
            writer.append(&[msg("a"), msg("b")]).await.unwrap();
        }
        assert_eq!(read_records(&path).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failed_threshold_flush_drops_only_the_new_records() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let path = logs.join("log.jsonl");
        let writer = BatchedLogWriter::new(&path, 2, Duration::from_secs(3600));

        writer.append(&[msg("a")]).await.unwrap();
        assert!(writer.append(&[msg("b")]).await.is_err());
        assert_eq!(writer.pending(), 1);

        tokio::fs::create_dir(&logs).await.unwrap();
        writer.flush().await.unwrap();
        assert_eq!(read_records(&path).await.unwrap(), vec![msg("a")]);
    }
}
