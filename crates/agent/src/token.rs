//! Token estimation.
//!
//! The loop prefers the usage the model reports. The estimator fills in when
//! there is none, and sizes the history a compaction leaves behind.

use ferrocode_core::message::Message;

pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, messages: &[Message]) -> u64;
}

/// Character heuristic: ~4 characters per token, plus a fixed per-message
/// overhead for role and framing.
#[derive(Debug, Clone, Copy)]
pub struct CharEstimator {
    pub chars_per_token: usize,
    pub message_overhead: u64,
}

impl Default for CharEstimator {
    fn default() -> Self {
        Self {
            chars_per_token: 4,
            message_overhead: 4,
        }
    }
}

impl CharEstimator {
    pub fn estimate_text(&self, text: &str) -> u64 {
        if text.is_empty() {
            return 0;
        }
        let per = self.chars_per_token.max(1);
        text.len().div_ceil(per) as u64
    }

    fn estimate_message(&self, message: &Message) -> u64 {
        let calls: u64 = message
            .tool_calls
            .iter()
            .map(|c| self.estimate_text(&c.name) + self.estimate_text(&c.arguments))
            .sum();
        self.message_overhead + self.estimate_text(&message.text()) + calls
    }
}

impl TokenEstimator for CharEstimator {
    fn estimate(&self, messages: &[Message]) -> u64 {
        messages.iter().map(|m| self.estimate_message(m)).sum()
    }
}
