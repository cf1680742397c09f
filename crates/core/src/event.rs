//! The wire: lifecycle and streaming events flowing out of a running agent.
//!
//! A step loop emits events here; a terminal UI, a log writer, or a parent
//! agent subscribes to observe them. Publishing never blocks and never fails
//! when nobody is listening.

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::approval::ApprovalRequest;
use crate::tool::ToolStatus;

/// All events a running agent emits.
#[derive(Debug, Clone)]
pub enum WireEvent {
    /// A step is starting
    StepBegin {
        step: u32,
        is_subagent: bool,
        agent_name: String,
    },

    /// Partial assistant text, forwarded as soon as it arrives
    ContentPart { text: String },

    /// A tool call is about to be dispatched
    ToolCall { id: String, name: String },

    /// A tool call finished
    ToolResult { id: String, status: ToolStatus },

    /// Context compaction started
    CompactionBegin,

    /// Context compaction finished
    CompactionEnd { before: usize, after: usize },

    /// A step failed and the run is aborting
    StepInterrupted { error: String },

    /// A tool is waiting for a human decision
    ApprovalRequest(Arc<ApprovalRequest>),
}

impl WireEvent {
    /// Short event name, used for logging.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StepBegin { .. } => "step_begin",
            Self::ContentPart { .. } => "content_part",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::CompactionBegin => "compaction_begin",
            Self::CompactionEnd { .. } => "compaction_end",
            Self::StepInterrupted { .. } => "step_interrupted",
            Self::ApprovalRequest(_) => "approval_request",
        }
    }
}

/// A broadcast-based event sink.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub; cloning a `Wire`
/// yields another handle onto the same channel.
#[derive(Clone)]
pub struct Wire {
    sender: broadcast::Sender<WireEvent>,
}

impl Wire {
    /// Create a new wire with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn send(&self, event: WireEvent) {
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<WireEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for Wire {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl std::fmt::Debug for Wire {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wire")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wire_publish_subscribe() {
        let wire = Wire::new(16);
        let mut rx = wire.subscribe();

        wire.send(WireEvent::StepBegin {
            step: 1,
            is_subagent: false,
            agent_name: "main".into(),
        });

        match rx.recv().await.unwrap() {
            WireEvent::StepBegin {
                step, agent_name, ..
            } => {
                assert_eq!(step, 1);
                assert_eq!(agent_name, "main");
            }
            other => panic!("Expected StepBegin, got {}", other.event_type()),
        }
    }

    #[test]
    fn wire_no_subscribers_doesnt_panic() {
        let wire = Wire::new(16);
        wire.send(WireEvent::StepInterrupted {
            error: "no subscribers".into(),
        });
        assert_eq!(wire.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn cloned_wire_shares_channel() {
        let wire = Wire::default();
        let mut rx = wire.subscribe();
        wire.clone().send(WireEvent::CompactionBegin);
        assert_eq!(rx.recv().await.unwrap().event_type(), "compaction_begin");
    }
}
