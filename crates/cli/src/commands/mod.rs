pub mod agent;
pub mod history;
pub mod revert;
pub mod status;

use ferrocode_config::AppConfig;
use ferrocode_session::{ConversationStore, SyncLogWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub(crate) fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

/// The given log, or the most recently modified top-level session log in
/// the sessions directory. Subagent logs are skipped.
pub(crate) fn resolve_log(
    log: Option<PathBuf>,
    config: &AppConfig,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(path) = log {
        if !path.exists() {
            return Err(format!("Session log not found: {}", path.display()).into());
        }
        return Ok(path);
    }

    let dir = &config.persistence.sessions_dir;
    let path = latest_session(dir)?
        .ok_or_else(|| format!("No session logs in {}", dir.display()))?;
    debug!(log = %path.display(), "Using most recent session log");
    Ok(path)
}

fn latest_session(dir: &Path) -> Result<Option<PathBuf>, Box<dyn std::error::Error>> {
    if !dir.exists() {
        return Ok(None);
    }
    let mut latest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_session = path.extension().is_some_and(|e| e == "jsonl")
            && path
                .file_stem()
                .is_some_and(|s| !s.to_string_lossy().contains("_sub_"));
        if !is_session {
            continue;
        }
        let modified = std::fs::metadata(&path)?.modified()?;
        if latest.as_ref().is_none_or(|(t, _)| modified > *t) {
            latest = Some((modified, path));
        }
    }
    Ok(latest.map(|(_, path)| path))
}

pub(crate) async fn open_store(path: &Path) -> Result<ConversationStore, Box<dyn std::error::Error>> {
    let writer = Arc::new(SyncLogWriter::new(path));
    Ok(ConversationStore::restore(writer).await?)
}
