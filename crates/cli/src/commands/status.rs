//! `ferrocode status`: Replay a session log and show its size.

use ferrocode_agent::AgentStatus;
use std::path::PathBuf;

pub async fn run(log: Option<PathBuf>, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let path = super::resolve_log(log, &config)?;
    let store = super::open_store(&path).await?;
    let status = AgentStatus::of(&store, &config);

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Ferrocode Session");
    println!("=================");
    println!("  Log:          {}", path.display());
    println!("  Model:        {}", config.model.name);
    println!("  Messages:     {}", status.message_count);
    println!("  Tokens:       {}", status.token_count);
    println!("  Checkpoints:  {}", status.checkpoint_count);
    println!(
        "  Context:      {:.1}% of {}",
        status.context_usage, config.model.max_context_size
    );
    if status.token_count > config.compaction_threshold() {
        println!("\n  Over the compaction threshold; the next step will compact.");
    }

    Ok(())
}
