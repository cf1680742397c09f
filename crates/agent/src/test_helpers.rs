//! Shared test helpers: a provider that plays back scripted turns.

use async_trait::async_trait;
use ferrocode_core::error::ProviderError;
use ferrocode_core::message::{Message, ToolCall};
use ferrocode_core::provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolCallDelta, Usage,
};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::mpsc;

enum Turn {
    Chunks(Vec<StreamChunk>),
    Fail(ProviderError),
    /// Chunks followed by a mid-stream error
    Broken(Vec<StreamChunk>, ProviderError),
}

/// A mock provider that returns a sequence of scripted turns.
///
/// Each `stream` or `complete` call consumes the next turn. Panics if more
/// calls are made than turns provided.
pub struct ScriptedProvider {
    turns: Mutex<VecDeque<Turn>>,
    requests: Mutex<Vec<ProviderRequest>>,
    usage: Option<Usage>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            turns: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            usage: Some(Usage {
                input_tokens: 10,
                output_tokens: 5,
            }),
        }
    }

    /// Usage reported in every `Done` chunk.
    pub fn with_usage(mut self, usage: Option<Usage>) -> Self {
        self.usage = usage;
        self
    }

    fn push(self, turn: Turn) -> Self {
        self.turns.lock().unwrap().push_back(turn);
        self
    }

    pub fn then_chunks(self, mut chunks: Vec<StreamChunk>) -> Self {
        chunks.push(StreamChunk::Done { usage: self.usage });
        self.push(Turn::Chunks(chunks))
    }

    pub fn then_text(self, text: &str) -> Self {
        self.then_chunks(vec![StreamChunk::ContentDelta { text: text.into() }])
    }

    pub fn then_tool_call(self, id: &str, name: &str, arguments: &str) -> Self {
        self.then_tool_calls(&[(id, name, arguments)])
    }

    pub fn then_tool_calls(self, calls: &[(&str, &str, &str)]) -> Self {
        let chunks = calls
            .iter()
            .map(|(id, name, arguments)| {
                StreamChunk::ToolCallDelta(ToolCallDelta {
                    id: Some((*id).into()),
                    name: Some((*name).into()),
                    arguments: Some((*arguments).into()),
                })
            })
            .collect();
        self.then_chunks(chunks)
    }

    pub fn then_error(self, error: ProviderError) -> Self {
        self.push(Turn::Fail(error))
    }

    pub fn then_broken_stream(self, text: &str, error: ProviderError) -> Self {
        self.push(Turn::Broken(
            vec![StreamChunk::ContentDelta { text: text.into() }],
            error,
        ))
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next_turn(&self, request: ProviderRequest) -> Turn {
        self.requests.lock().unwrap().push(request);
        let calls = self.calls();
        self.turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedProvider exhausted at call #{calls}"))
    }
}

fn response_from(chunks: Vec<StreamChunk>) -> ProviderResponse {
    let mut text = String::new();
    let mut tool_calls = Vec::new();
    let mut usage = None;
    for chunk in chunks {
        match chunk {
            StreamChunk::ContentDelta { text: t } => text.push_str(&t),
            StreamChunk::ToolCallDelta(d) => tool_calls.push(ToolCall {
                id: d.id.unwrap_or_default(),
                name: d.name.unwrap_or_default(),
                arguments: d.arguments.unwrap_or_default(),
            }),
            StreamChunk::Done { usage: u } => usage = u,
        }
    }
    ProviderResponse {
        message: Message::assistant(text).with_tool_calls(tool_calls),
        usage,
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        match self.next_turn(request) {
            Turn::Chunks(chunks) => Ok(response_from(chunks)),
            Turn::Fail(e) | Turn::Broken(_, e) => Err(e),
        }
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let (chunks, tail) = match self.next_turn(request) {
            Turn::Chunks(chunks) => (chunks, None),
            Turn::Fail(e) => return Err(e),
            Turn::Broken(chunks, e) => (chunks, Some(e)),
        };
        let (tx, rx) = mpsc::channel(chunks.len() + 1);
        for chunk in chunks {
            tx.send(Ok(chunk)).await.unwrap();
        }
        if let Some(e) = tail {
            tx.send(Err(e)).await.unwrap();
        }
        Ok(rx)
    }
}
