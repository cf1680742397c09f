//! Rebuilds one assistant turn from a model stream.
//!
//! Text deltas are echoed to the wire as they arrive. Tool-call deltas are
//! stitched into calls; fragments may arrive before the id that identifies
//! them, in which case they are held under a placeholder id until the real
//! one shows up.

use ferrocode_core::error::ProviderError;
use ferrocode_core::event::{Wire, WireEvent};
use ferrocode_core::ids::IdGenerator;
use ferrocode_core::message::ToolCall;
use ferrocode_core::provider::{ChunkReceiver, StreamChunk, ToolCallDelta, Usage};
use std::sync::Arc;
use tracing::{debug, warn};

/// A tool call as streamed, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawToolCall {
    pub id: String,
    /// `id` was synthesized locally and the real one never arrived
    pub placeholder: bool,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

impl RawToolCall {
    fn started(id: String, placeholder: bool) -> Self {
        Self {
            id,
            placeholder,
            name: None,
            arguments: None,
        }
    }

    fn push_arguments(&mut self, fragment: &str) {
        self.arguments
            .get_or_insert_with(String::new)
            .push_str(fragment);
    }

    fn is_malformed(&self) -> bool {
        self.placeholder || self.name.is_none()
    }
}

impl From<ToolCall> for RawToolCall {
    fn from(call: ToolCall) -> Self {
        Self {
            id: call.id,
            placeholder: false,
            name: Some(call.name),
            arguments: Some(call.arguments),
        }
    }
}

/// Everything one model step produced.
#[derive(Debug, Clone, Default)]
pub struct AssistantTurn {
    pub text: String,
    pub tool_calls: Vec<RawToolCall>,
    pub usage: Option<Usage>,
}

enum DeltaTarget {
    /// Append to the call in progress
    Current,
    /// Give the placeholder call its real id
    Rebind,
    /// Close the call in progress and open a new one
    Start,
    /// Open a call under a synthesized id
    Placeholder,
}

pub struct StreamAccumulator {
    ids: Arc<dyn IdGenerator>,
    wire: Wire,
    text: String,
    current: Option<RawToolCall>,
    finished: Vec<RawToolCall>,
    usage: Option<Usage>,
}

impl StreamAccumulator {
    pub fn new(ids: Arc<dyn IdGenerator>, wire: Wire) -> Self {
        Self {
            ids,
            wire,
            text: String::new(),
            current: None,
            finished: Vec::new(),
            usage: None,
        }
    }

    /// Drain a provider stream into a finished turn. A stream error aborts
    /// the turn; a channel closed without `Done` ends it normally.
    pub async fn collect(mut self, mut rx: ChunkReceiver) -> Result<AssistantTurn, ProviderError> {
        while let Some(chunk) = rx.recv().await {
            self.push(chunk?);
        }
        Ok(self.finish())
    }

    pub fn push(&mut self, chunk: StreamChunk) {
        match chunk {
            StreamChunk::ContentDelta { text } => {
                if text.is_empty() {
                    return;
                }
                self.text.push_str(&text);
                self.wire.send(WireEvent::ContentPart { text });
            }
            StreamChunk::ToolCallDelta(delta) => self.push_tool_delta(delta),
            StreamChunk::Done { usage } => self.usage = usage,
        }
    }

    fn push_tool_delta(&mut self, delta: ToolCallDelta) {
        let ToolCallDelta {
            id,
            name,
            arguments,
        } = delta;

        let next = match (&id, &self.current) {
            (Some(_), Some(current)) if current.placeholder => DeltaTarget::Rebind,
            (Some(id), Some(current)) if &current.id == id => DeltaTarget::Current,
            (Some(_), _) => DeltaTarget::Start,
            (None, Some(_)) => DeltaTarget::Current,
            (None, None) => DeltaTarget::Placeholder,
        };

        match (next, id) {
            (DeltaTarget::Rebind, Some(id)) => {
                if let Some(current) = self.current.as_mut() {
                    debug!(placeholder = %current.id, id = %id, "Rebinding placeholder tool call id");
                    current.id = id;
                    current.placeholder = false;
                }
            }
            (DeltaTarget::Start, Some(id)) => {
                self.finalize_current();
                self.current = Some(RawToolCall::started(id, false));
            }
            (DeltaTarget::Placeholder, _) => {
                let id = self.ids.next_id();
                debug!(placeholder = %id, "Tool call fragment before its id");
                self.current = Some(RawToolCall::started(id, true));
            }
            _ => {}
        }

        if let Some(current) = self.current.as_mut() {
            if current.name.is_none() {
                current.name = name.filter(|n| !n.is_empty());
            }
            if let Some(fragment) = arguments {
                current.push_arguments(&fragment);
            }
        }
    }

    fn finalize_current(&mut self) {
        if let Some(call) = self.current.take() {
            if call.is_malformed() {
                warn!(
                    id = %call.id,
                    placeholder = call.placeholder,
                    name = ?call.name,
                    "Malformed tool call in model stream"
                );
            }
            self.finished.push(call);
        }
    }

    pub fn finish(mut self) -> AssistantTurn {
        self.finalize_current();
        AssistantTurn {
            text: self.text,
            tool_calls: self.finished,
            usage: self.usage,
        }
    }
}
