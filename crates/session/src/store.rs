//! The conversation store: ordered history, token count, and checkpoints,
//! kept in lockstep with the session log.

use ferrocode_core::error::PersistenceError;
use ferrocode_core::message::Message;
use ferrocode_core::session::{LogRecord, LogWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::replay::{self, Replayed};

/// Text of the user-visible marker inserted with a checkpoint.
pub fn checkpoint_marker(id: u64) -> String {
    format!("<system>CHECKPOINT {id}</system>")
}

/// Session state of one agent loop.
///
/// Every mutation is written to the log first and applied in memory only
/// once the write succeeded, so the in-memory state always equals a replay of
/// the log.
pub struct ConversationStore {
    writer: Arc<dyn LogWriter>,
    history: Vec<Message>,
    token_count: u64,
    next_checkpoint_id: u64,
}

impl ConversationStore {
    /// An empty store. Does not read the log; use [`ConversationStore::restore`]
    /// to continue an existing session.
    pub fn new(writer: Arc<dyn LogWriter>) -> Self {
        Self {
            writer,
            history: Vec::new(),
            token_count: 0,
            next_checkpoint_id: 0,
        }
    }

    /// Rebuild a store from the writer's log file.
    pub async fn restore(writer: Arc<dyn LogWriter>) -> Result<Self, PersistenceError> {
        writer.flush().await?;
        let records = replay::read_records(writer.path()).await?;
        let state = Replayed::from_records(&records);
        debug!(
            path = %writer.path().display(),
            messages = state.history.len(),
            next_checkpoint = state.next_checkpoint_id,
            "Restored conversation"
        );
        Ok(Self {
            writer,
            history: state.history,
            token_count: state.token_count,
            next_checkpoint_id: state.next_checkpoint_id,
        })
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn token_count(&self) -> u64 {
        self.token_count
    }

    /// The id the next checkpoint will get.
    pub fn next_checkpoint_id(&self) -> u64 {
        self.next_checkpoint_id
    }

    pub fn log_path(&self) -> &Path {
        self.writer.path()
    }

    pub fn writer(&self) -> &Arc<dyn LogWriter> {
        &self.writer
    }

    pub async fn append(&mut self, message: Message) -> Result<(), PersistenceError> {
        self.append_many(vec![message]).await
    }

    pub async fn append_many(&mut self, messages: Vec<Message>) -> Result<(), PersistenceError> {
        if messages.is_empty() {
            return Ok(());
        }
        let records: Vec<LogRecord> = messages.iter().cloned().map(LogRecord::Message).collect();
        self.writer.append(&records).await?;
        self.history.extend(messages);
        Ok(())
    }

    pub async fn update_token_count(&mut self, token_count: u64) -> Result<(), PersistenceError> {
        self.writer
            .append(&[LogRecord::Usage { token_count }])
            .await?;
        self.token_count = token_count;
        Ok(())
    }

    /// Create the next checkpoint and return its id. With `marker` set, a
    /// user message naming the checkpoint is appended right after it.
    pub async fn checkpoint(&mut self, marker: bool) -> Result<u64, PersistenceError> {
        let id = self.next_checkpoint_id;
        let mut records = vec![LogRecord::Checkpoint { id }];
        let marker_message = marker.then(|| Message::user(checkpoint_marker(id)));
        if let Some(message) = &marker_message {
            records.push(LogRecord::Message(message.clone()));
        }

        self.writer.append(&records).await?;
        self.next_checkpoint_id = id + 1;
        self.history.extend(marker_message);
        debug!(checkpoint = id, "Created checkpoint");
        Ok(id)
    }

    /// Drop everything checkpoint `id` guarded.
    ///
    /// The current log is rotated to a numbered backup, whose path is
    /// returned, and replaced by its prefix up to the checkpoint marker. The
    /// marker stays in the log, so the next checkpoint gets `id + 1` both here
    /// and after a restore.
    pub async fn revert_to(&mut self, id: u64) -> Result<PathBuf, PersistenceError> {
        if id >= self.next_checkpoint_id {
            return Err(PersistenceError::UnknownCheckpoint(id));
        }

        self.writer.flush().await?;
        let path = self.writer.path().to_path_buf();
        let records = replay::read_records(&path).await?;
        let kept = replay::truncate_at_checkpoint(&records, id)
            .ok_or(PersistenceError::UnknownCheckpoint(id))?;

        let backup = replay::replace_with_backup(&path, kept).await?;

        let state = Replayed::from_records(kept);
        info!(
            checkpoint = id,
            backup = %backup.display(),
            removed = self.history.len().saturating_sub(state.history.len()),
            "Reverted conversation"
        );
        self.history = state.history;
        self.token_count = state.token_count;
        self.next_checkpoint_id = state.next_checkpoint_id;
        Ok(backup)
    }

    pub async fn flush(&self) -> Result<(), PersistenceError> {
        self.writer.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{BatchedLogWriter, SyncLogWriter};
    use std::time::Duration;

    fn sync_store(path: &Path) -> ConversationStore {
        ConversationStore::new(Arc::new(SyncLogWriter::new(path)))
    }

    #[tokio::test]
    async fn append_then_restore_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.jsonl");

        let mut store = sync_store(&path);
        store.checkpoint(false).await.unwrap();
        store.append(Message::user("fix the bug")).await.unwrap();
        store.checkpoint(true).await.unwrap();
        store
            .append_many(vec![
                Message::assistant("on it"),
                Message::tool_result("call_1", "done"),
            ])
            .await
            .unwrap();
        store.update_token_count(321).await.unwrap();

        let restored = ConversationStore::restore(Arc::new(SyncLogWriter::new(&path)))
            .await
            .unwrap();
        assert_eq!(restored.history(), store.history());
        assert_eq!(restored.token_count(), 321);
        assert_eq!(restored.next_checkpoint_id(), 2);
    }

    #[tokio::test]
    async fn checkpoint_marker_is_visible() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = sync_store(&dir.path().join("s.jsonl"));

        assert_eq!(store.checkpoint(false).await.unwrap(), 0);
        assert!(store.history().is_empty());
        assert_eq!(store.checkpoint(true).await.unwrap(), 1);
        assert_eq!(store.history().len(), 1);
        assert_eq!(store.history()[0].text(), "<system>CHECKPOINT 1</system>");
    }

    #[tokio::test]
    async fn revert_truncates_and_keeps_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        let mut store = sync_store(&path);

        store.checkpoint(false).await.unwrap();
        store.append(Message::user("one")).await.unwrap();
        store.checkpoint(false).await.unwrap();
        store.append(Message::assistant("two")).await.unwrap();
        store.update_token_count(50).await.unwrap();
        store.checkpoint(false).await.unwrap();
        store.append(Message::user("three")).await.unwrap();
        assert_eq!(store.next_checkpoint_id(), 3);

        let backup = store.revert_to(1).await.unwrap();
        assert_eq!(backup, dir.path().join("s.jsonl.1"));
        assert_eq!(replay::read_records(&backup).await.unwrap().len(), 7);

        assert_eq!(store.history().len(), 1);
        assert_eq!(store.history()[0].text(), "one");
        assert_eq!(store.token_count(), 0);
        assert_eq!(store.next_checkpoint_id(), 2);

        let restored = ConversationStore::restore(Arc::new(SyncLogWriter::new(&path)))
            .await
            .unwrap();
        assert_eq!(restored.history(), store.history());
        assert_eq!(restored.next_checkpoint_id(), 2);

        assert_eq!(store.checkpoint(false).await.unwrap(), 2);
        assert_eq!(store.next_checkpoint_id(), 3);
    }

    #[tokio::test]
    async fn checkpoint_ids_only_grow_across_reverts() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = sync_store(&dir.path().join("s.jsonl"));

        let mut issued = Vec::new();
        for _ in 0..3 {
            issued.push(store.checkpoint(false).await.unwrap());
        }
        store.revert_to(2).await.unwrap();
        issued.push(store.checkpoint(false).await.unwrap());
        store.revert_to(0).await.unwrap();
        assert_eq!(store.next_checkpoint_id(), 1);

        assert_eq!(issued, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn revert_matches_replay_for_every_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        for k in 0..4u64 {
            let path = dir.path().join(format!("s{k}.jsonl"));
            let mut store = sync_store(&path);
            for step in 0..4 {
                store.checkpoint(step % 2 == 1).await.unwrap();
                store.append(Message::user(format!("q{step}"))).await.unwrap();
                store
                    .append(Message::assistant(format!("a{step}")))
                    .await
                    .unwrap();
                store.update_token_count(10 * (step + 1)).await.unwrap();
            }

            let records = replay::read_records(&path).await.unwrap();
            let marker = records
                .iter()
                .position(|r| *r == LogRecord::Checkpoint { id: k })
                .unwrap();
            let expected = Replayed::from_records(&records[..marker]);

            store.revert_to(k).await.unwrap();
            assert_eq!(store.history(), expected.history.as_slice());
            assert_eq!(store.token_count(), expected.token_count);
            assert_eq!(store.next_checkpoint_id(), k + 1);
        }
    }

    #[tokio::test]
    async fn revert_to_unknown_checkpoint_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = sync_store(&dir.path().join("s.jsonl"));
        store.checkpoint(false).await.unwrap();
        assert!(matches!(
            store.revert_to(4).await,
            Err(PersistenceError::UnknownCheckpoint(4))
        ));
    }

    #[tokio::test]
    async fn revert_flushes_batched_writes_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        let writer = Arc::new(BatchedLogWriter::new(&path, 1000, Duration::from_secs(3600)));
        let mut store = ConversationStore::new(writer);

        store.checkpoint(false).await.unwrap();
        store.append(Message::user("kept")).await.unwrap();
        store.checkpoint(false).await.unwrap();
        store.append(Message::user("dropped")).await.unwrap();

        store.revert_to(1).await.unwrap();
        assert_eq!(store.history().len(), 1);

        store.append(Message::assistant("after")).await.unwrap();
        store.flush().await.unwrap();
        let restored = ConversationStore::restore(Arc::new(SyncLogWriter::new(&path)))
            .await
            .unwrap();
        assert_eq!(restored.history(), store.history());
    }

    #[tokio::test]
    async fn failed_write_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("s.jsonl");
        let mut store = sync_store(&path);

        assert!(store.append(Message::user("lost")).await.is_err());
        assert!(store.history().is_empty());
        assert!(store.checkpoint(false).await.is_err());
        assert_eq!(store.next_checkpoint_id(), 0);
    }

    #[tokio::test]
    async fn failed_revert_keeps_log_and_memory_in_step() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        let mut store = sync_store(&path);
        store.checkpoint(false).await.unwrap();
        store.append(Message::user("one")).await.unwrap();
        store.checkpoint(false).await.unwrap();
        store.append(Message::assistant("two")).await.unwrap();
        tokio::fs::create_dir(dir.path().join("s.jsonl.tmp")).await.unwrap();

        assert!(store.revert_to(1).await.is_err());
        assert_eq!(store.history().len(), 2);
        assert_eq!(store.next_checkpoint_id(), 2);
        assert!(!dir.path().join("s.jsonl.1").exists());

        let restored = ConversationStore::restore(Arc::new(SyncLogWriter::new(&path)))
            .await
            .unwrap();
        assert_eq!(restored.history(), store.history());
    }

    #[tokio::test]
    async fn failed_batch_flush_does_not_commit_the_append() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let path = logs.join("s.jsonl");
        let writer = Arc::new(BatchedLogWriter::new(&path, 1, Duration::from_secs(3600)));
        let mut store = ConversationStore::new(writer.clone());

        assert!(store.append(Message::user("lost")).await.is_err());
        assert!(store.history().is_empty());

        tokio::fs::create_dir(&logs).await.unwrap();
        store.append(Message::user("kept")).await.unwrap();
        store.flush().await.unwrap();

        let replayed = Replayed::from_records(&replay::read_records(&path).await.unwrap());
        assert_eq!(replayed.history, store.history());
        assert_eq!(store.history().len(), 1);
    }
}
