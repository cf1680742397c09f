//! `ferrocode revert`: Revert a session log to a checkpoint.

use std::path::PathBuf;

pub async fn run(log: Option<PathBuf>, checkpoint: u64) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let path = super::resolve_log(log, &config)?;
    let mut store = super::open_store(&path).await?;

    let before = store.history().len();
    let backup = store
        .revert_to(checkpoint)
        .await
        .map_err(|e| format!("Revert failed: {e}"))?;

    println!("Reverted {} to checkpoint {checkpoint}", path.display());
    println!("  Messages:     {before} -> {}", store.history().len());
    println!("  Tokens:       {}", store.token_count());
    println!("  Backup:       {}", backup.display());

    Ok(())
}
