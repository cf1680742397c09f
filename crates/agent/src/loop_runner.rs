//! The agent step loop.

use ferrocode_config::AppConfig;
use ferrocode_core::agent::AgentSpec;
use ferrocode_core::event::{Wire, WireEvent};
use ferrocode_core::message::Message;
use ferrocode_core::provider::{ProviderRequest, ToolDefinition};
use ferrocode_session::ConversationStore;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::accumulator::StreamAccumulator;
use crate::compaction::Compaction;
use crate::error::AgentError;
use crate::pipeline::{ToolPipeline, prepare};
use crate::runtime::Runtime;

/// Where a loop is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running { step: u32 },
    AwaitingModel { step: u32 },
    HandlingToolCalls { step: u32 },
    Done,
    Interrupted { error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The model answered without calling tools
    NoToolCalls,
    /// Too many consecutive steps without tool calls
    ThinkingLimit,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoToolCalls => write!(f, "no tool calls"),
            Self::ThinkingLimit => write!(f, "thinking step limit reached"),
        }
    }
}

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// Steps taken in this run
    pub steps: u32,
    pub stop_reason: StopReason,
}

/// Snapshot of a session's size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AgentStatus {
    pub message_count: usize,
    pub token_count: u64,
    pub checkpoint_count: u64,
    /// Token count as a percentage of the model's context size
    pub context_usage: f64,
}

impl AgentStatus {
    pub fn of(store: &ConversationStore, config: &AppConfig) -> Self {
        let context = config.model.max_context_size.max(1) as f64;
        Self {
            message_count: store.history().len(),
            token_count: store.token_count(),
            checkpoint_count: store.next_checkpoint_id(),
            context_usage: store.token_count() as f64 / context * 100.0,
        }
    }
}

/// Drives one agent: alternates model steps and tool dispatch over a
/// conversation store until the model stops calling tools.
pub struct AgentLoop {
    runtime: Arc<Runtime>,
    spec: AgentSpec,
    store: ConversationStore,
    pipeline: ToolPipeline,
    definitions: Vec<ToolDefinition>,
    is_subagent: bool,
    state: LoopState,
    /// Consecutive steps without tool calls, carried across runs
    thinking_steps: u32,
}

impl AgentLoop {
    pub fn new(runtime: Arc<Runtime>, spec: AgentSpec, store: ConversationStore) -> Self {
        let registry = runtime.toolsets().build(&spec, &runtime, store.log_path());
        let definitions = registry.definitions_for(&spec.tools);
        let limits = &runtime.config().loop_control;
        let pipeline = ToolPipeline::new(
            Arc::new(registry),
            runtime.wire().clone(),
            Duration::from_secs(limits.tool_timeout_secs),
        )
        .with_streak_threshold(limits.error_streak_threshold);

        Self {
            runtime,
            spec,
            store,
            pipeline,
            definitions,
            is_subagent: false,
            state: LoopState::Idle,
            thinking_steps: 0,
        }
    }

    /// Mark this loop as running on behalf of a parent agent.
    pub fn as_subagent(mut self) -> Self {
        self.is_subagent = true;
        self
    }

    pub fn spec(&self) -> &AgentSpec {
        &self.spec
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn history(&self) -> &[Message] {
        self.store.history()
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn wire(&self) -> &Wire {
        self.runtime.wire()
    }

    pub fn status(&self) -> AgentStatus {
        AgentStatus::of(&self.store, self.runtime.config())
    }

    /// Run the loop on one user input until the model stops calling tools.
    ///
    /// Model and tool failures become conversation content. Only exceeding
    /// the step limit and persistence failures abort the run.
    pub async fn run(&mut self, input: &str) -> Result<RunOutcome, AgentError> {
        let result = self.run_steps(input).await;
        match &result {
            Ok(outcome) => {
                info!(
                    agent = %self.spec.name,
                    steps = outcome.steps,
                    reason = %outcome.stop_reason,
                    "Run finished"
                );
                self.state = LoopState::Done;
            }
            Err(e) => {
                warn!(agent = %self.spec.name, error = %e, "Run interrupted");
                self.runtime.wire().send(WireEvent::StepInterrupted {
                    error: e.to_string(),
                });
                self.state = LoopState::Interrupted {
                    error: e.to_string(),
                };
            }
        }
        result
    }

    async fn run_steps(&mut self, input: &str) -> Result<RunOutcome, AgentError> {
        self.store.checkpoint(false).await?;
        self.store.append(Message::user(input)).await?;

        let limits = self.runtime.config().loop_control.clone();
        let threshold = self.runtime.config().compaction_threshold();
        let mut step = 1;
        loop {
            if step > limits.max_steps_per_run {
                return Err(AgentError::MaxStepsReached {
                    max_steps: limits.max_steps_per_run,
                });
            }
            self.state = LoopState::Running { step };
            debug!(agent = %self.spec.name, step, "Step begin");
            self.runtime.wire().send(WireEvent::StepBegin {
                step,
                is_subagent: self.is_subagent,
                agent_name: self.spec.name.clone(),
            });

            if self.store.token_count() > threshold {
                self.compact().await?;
            }
            self.store.checkpoint(limits.checkpoint_markers).await?;

            if self.step(step).await? {
                self.thinking_steps = 0;
                step += 1;
                continue;
            }

            self.thinking_steps += 1;
            if self.thinking_steps >= limits.max_thinking_steps {
                warn!(
                    agent = %self.spec.name,
                    thinking_steps = self.thinking_steps,
                    "Too many steps without tool calls"
                );
                self.thinking_steps = 0;
                return Ok(RunOutcome {
                    steps: step,
                    stop_reason: StopReason::ThinkingLimit,
                });
            }
            return Ok(RunOutcome {
                steps: step,
                stop_reason: StopReason::NoToolCalls,
            });
        }
    }

    /// One model call plus the tool calls it asked for. Returns whether the
    /// model called any tools, valid or not.
    async fn step(&mut self, step: u32) -> Result<bool, AgentError> {
        self.state = LoopState::AwaitingModel { step };
        let config = self.runtime.config();
        let request = ProviderRequest {
            model: config.model.name.clone(),
            system_prompt: self.spec.system_prompt.clone(),
            messages: self.store.history().to_vec(),
            tools: self.definitions.clone(),
            max_tokens: config.model.max_output_tokens,
        };

        let accumulator =
            StreamAccumulator::new(self.runtime.ids().clone(), self.runtime.wire().clone());
        let turn = match self.runtime.provider().stream(request).await {
            Ok(rx) => accumulator.collect(rx).await,
            Err(e) => Err(e),
        };
        let turn = match turn {
            Ok(turn) => turn,
            Err(e) => {
                warn!(agent = %self.spec.name, step, error = %e, "Model step failed");
                self.store
                    .append(Message::assistant(format!(
                        "Sorry, I could not get a response from the model: {e}"
                    )))
                    .await?;
                return Ok(false);
            }
        };

        let called_tools = !turn.tool_calls.is_empty();
        let prepared = prepare(&turn.tool_calls);
        self.store
            .append(Message::assistant(turn.text).with_tool_calls(prepared.valid.clone()))
            .await?;
        let token_count = match turn.usage {
            Some(usage) => usage.total(),
            None => self.runtime.estimator().estimate(self.store.history()),
        };
        self.store.update_token_count(token_count).await?;

        if !called_tools {
            return Ok(false);
        }

        self.state = LoopState::HandlingToolCalls { step };
        debug!(
            valid = prepared.valid.len(),
            rejected = prepared.rejected.len(),
            "Dispatching tool calls"
        );
        let mut results = prepared.rejected;
        results.extend(self.pipeline.dispatch(&prepared.valid).await);
        self.store.append_many(results).await?;
        Ok(true)
    }

    /// Replace the history with the compactor's output on top of a fresh
    /// session-start checkpoint.
    async fn compact(&mut self) -> Result<(), AgentError> {
        let wire = self.runtime.wire().clone();
        wire.send(WireEvent::CompactionBegin);
        let before = self.store.history().len();
        info!(
            agent = %self.spec.name,
            messages = before,
            tokens = self.store.token_count(),
            "Compacting context"
        );

        let outcome = self
            .runtime
            .compactor()
            .compact(
                self.store.history(),
                self.runtime.provider().as_ref(),
                &self.runtime.config().model.name,
            )
            .await;

        match outcome {
            Compaction::Replaced(replacement) => {
                self.store.revert_to(0).await?;
                self.store.append_many(replacement).await?;
                let estimate = self.runtime.estimator().estimate(self.store.history());
                self.store.update_token_count(estimate).await?;
            }
            Compaction::Skipped { reason } => {
                info!(reason = %reason, "Compaction skipped");
            }
        }

        let after = self.store.history().len();
        wire.send(WireEvent::CompactionEnd { before, after });
        Ok(())
    }
}
