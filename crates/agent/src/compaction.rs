//! Context compaction.
//!
//! A compactor turns a long history into a shorter replacement. The step loop
//! decides when to compact and how the replacement lands in the store.

use async_trait::async_trait;
use ferrocode_core::message::{Message, Role};
use ferrocode_core::provider::{Provider, ProviderRequest};
use tracing::{debug, warn};

/// What a compaction attempt produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Compaction {
    /// Use these messages instead of the current history
    Replaced(Vec<Message>),
    /// Keep the history as it is
    Skipped { reason: String },
}

#[async_trait]
pub trait Compactor: Send + Sync {
    async fn compact(&self, history: &[Message], provider: &dyn Provider, model: &str)
    -> Compaction;
}

const SUMMARY_SYSTEM_PROMPT: &str = "You compress conversations between a user and a coding agent. \
Summarize the conversation you are given so the agent can continue the task without it. \
Keep file paths, commands, decisions, errors, and open questions. Leave out pleasantries.";

/// Keeps the last `preserved` user/assistant messages verbatim and asks the
/// model for a summary of everything before them.
#[derive(Debug, Clone)]
pub struct SimpleCompactor {
    preserved: usize,
}

impl SimpleCompactor {
    pub fn new(preserved: usize) -> Self {
        Self { preserved }
    }

    /// Index where the preserved tail starts, if there are enough
    /// user/assistant messages to preserve.
    fn tail_start(&self, history: &[Message]) -> Option<usize> {
        if self.preserved == 0 {
            return Some(history.len());
        }
        let mut seen = 0;
        for (idx, message) in history.iter().enumerate().rev() {
            if matches!(message.role, Role::User | Role::Assistant) {
                seen += 1;
                if seen == self.preserved {
                    return Some(idx);
                }
            }
        }
        None
    }
}

#[async_trait]
impl Compactor for SimpleCompactor {
    async fn compact(
        &self,
        history: &[Message],
        provider: &dyn Provider,
        model: &str,
    ) -> Compaction {
        let Some(start) = self.tail_start(history) else {
            return Compaction::Skipped {
                reason: format!("fewer than {} messages to preserve", self.preserved),
            };
        };
        let (older, tail) = history.split_at(start);
        if older.is_empty() {
            return Compaction::Skipped {
                reason: "nothing older than the preserved messages".into(),
            };
        }

        let request = ProviderRequest {
            model: model.to_string(),
            system_prompt: SUMMARY_SYSTEM_PROMPT.into(),
            messages: vec![Message::user(render_transcript(older))],
            tools: Vec::new(),
            max_tokens: None,
        };

        let summary = match provider.complete(request).await {
            Ok(response) => response.message.text(),
            Err(e) => {
                warn!(error = %e, "Compaction summary failed, keeping history");
                return Compaction::Skipped {
                    reason: format!("summarization failed: {e}"),
                };
            }
        };
        if summary.trim().is_empty() {
            return Compaction::Skipped {
                reason: "summarization returned nothing".into(),
            };
        }

        debug!(summarized = older.len(), preserved = tail.len(), "Compacted history");
        let mut replacement = Vec::with_capacity(tail.len() + 1);
        replacement.push(Message::user(format!(
            "<system>Earlier conversation was compacted. Summary:</system>\n{}",
            summary.trim()
        )));
        replacement.extend_from_slice(tail);
        Compaction::Replaced(replacement)
    }
}

fn render_transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for (i, message) in messages.iter().enumerate() {
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        };
        out.push_str(&format!("## Message {} ({role})\n", i + 1));
        let text = message.text();
        if !text.is_empty() {
            out.push_str(&text);
            out.push('\n');
        }
        for call in &message.tool_calls {
            out.push_str(&format!("[call {} {}({})]\n", call.id, call.name, call.arguments));
        }
        out.push('\n');
    }
    out
}
