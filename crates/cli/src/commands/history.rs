//! `ferrocode history`: Print the conversation stored in a session log.

use ferrocode_core::message::{Message, Role};
use std::path::PathBuf;

const PREVIEW_CHARS: usize = 200;

pub async fn run(log: Option<PathBuf>, limit: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let path = super::resolve_log(log, &config)?;
    let store = super::open_store(&path).await?;
    let history = store.history();

    let skip = limit.map_or(0, |n| history.len().saturating_sub(n));
    if skip > 0 {
        println!("  ... {skip} earlier messages");
    }
    for (i, message) in history.iter().enumerate().skip(skip) {
        print_message(i + 1, message);
    }
    if history.is_empty() {
        println!("  (empty session)");
    }

    Ok(())
}

fn print_message(index: usize, message: &Message) {
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
        Role::Tool => "tool",
    };
    let time = message.timestamp.format("%H:%M:%S");
    match &message.tool_call_id {
        Some(id) => println!("{index:>4}. [{time}] {role} ({id})"),
        None => println!("{index:>4}. [{time}] {role}"),
    }

    let text = message.text();
    if !text.is_empty() {
        println!("      {}", preview(&text));
    }
    for call in &message.tool_calls {
        println!("      -> {}({}) [{}]", call.name, preview(&call.arguments), call.id);
    }
}

fn preview(text: &str) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_flattens_and_truncates() {
        assert_eq!(preview("a\nb"), "a b");
        let long = "é".repeat(PREVIEW_CHARS + 10);
        let shown = preview(&long);
        assert!(shown.ends_with("..."));
        assert_eq!(shown.chars().count(), PREVIEW_CHARS + 3);
    }
}
