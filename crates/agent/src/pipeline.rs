//! Tool call pipeline: validate, dispatch concurrently, collect results.

use ferrocode_core::error::ToolError;
use ferrocode_core::event::{Wire, WireEvent};
use ferrocode_core::message::{Message, ToolCall};
use ferrocode_core::tool::{ToolRegistry, ToolResult, ToolStatus};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{self, JoinSet};
use tracing::{debug, warn};

use crate::accumulator::RawToolCall;

/// Check that a streamed call can be executed.
///
/// Argument text only has to be present here; whether it parses is the
/// registry's concern.
pub fn validate(raw: &RawToolCall) -> Result<ToolCall, String> {
    if raw.placeholder || raw.id.is_empty() {
        return Err("the tool call has no id".into());
    }
    let Some(name) = raw.name.as_deref().filter(|n| !n.is_empty()) else {
        return Err("the tool call has no function name".into());
    };
    let Some(arguments) = raw.arguments.as_deref() else {
        return Err(format!("the call to {name} has no arguments"));
    };
    Ok(ToolCall {
        id: raw.id.clone(),
        name: name.to_string(),
        arguments: arguments.to_string(),
    })
}

/// Result of validating one turn's calls.
#[derive(Debug, Default)]
pub struct Prepared {
    /// Calls that will be executed and persisted with the assistant message
    pub valid: Vec<ToolCall>,
    /// Error tool messages for calls that failed validation
    pub rejected: Vec<Message>,
}

/// Validate one turn's calls. A call reusing an id already taken earlier in
/// the turn is rejected.
pub fn prepare(raw_calls: &[RawToolCall]) -> Prepared {
    let mut prepared = Prepared::default();
    let mut seen = HashSet::new();
    for raw in raw_calls {
        let checked = validate(raw).and_then(|call| {
            if seen.insert(call.id.clone()) {
                Ok(call)
            } else {
                Err(format!("the id {} is already used by another call in this turn", call.id))
            }
        });
        match checked {
            Ok(call) => prepared.valid.push(call),
            Err(reason) => {
                warn!(id = %raw.id, reason = %reason, "Rejecting invalid tool call");
                prepared.rejected.push(Message::tool_result(
                    raw.id.clone(),
                    format!(
                        "Error: invalid tool call ({reason}). Emit a complete tool call with an id, a function name, and JSON arguments."
                    ),
                ));
            }
        }
    }
    prepared
}

/// Executes tool calls and tracks repeated identical failures.
pub struct ToolPipeline {
    registry: Arc<ToolRegistry>,
    wire: Wire,
    timeout: Duration,
    streak_threshold: u32,
    streaks: HashMap<String, u32>,
}

impl ToolPipeline {
    pub fn new(registry: Arc<ToolRegistry>, wire: Wire, timeout: Duration) -> Self {
        Self {
            registry,
            wire,
            timeout,
            streak_threshold: 3,
            streaks: HashMap::new(),
        }
    }

    pub fn with_streak_threshold(mut self, threshold: u32) -> Self {
        self.streak_threshold = threshold.max(1);
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Current failure streak of a call signature.
    pub fn streak(&self, call: &ToolCall) -> u32 {
        self.streaks.get(&signature(call)).copied().unwrap_or(0)
    }

    /// Run every call concurrently and return one tool message per call, in
    /// completion order.
    pub async fn dispatch(&mut self, calls: &[ToolCall]) -> Vec<Message> {
        let mut tasks = JoinSet::new();
        let mut pending = HashMap::with_capacity(calls.len());
        for call in calls {
            self.wire.send(WireEvent::ToolCall {
                id: call.id.clone(),
                name: call.name.clone(),
            });
            let registry = self.registry.clone();
            let task_call = call.clone();
            let timeout = self.timeout;
            let handle = tasks.spawn(async move { execute_guarded(registry, &task_call, timeout).await });
            pending.insert(handle.id(), call.clone());
        }
        self.collect(tasks, pending).await
    }

    async fn collect(
        &mut self,
        mut tasks: JoinSet<ToolResult>,
        mut pending: HashMap<task::Id, ToolCall>,
    ) -> Vec<Message> {
        let mut messages = Vec::with_capacity(pending.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            let (task_id, outcome) = match joined {
                Ok((task_id, result)) => (task_id, Ok(result)),
                Err(e) => (e.id(), Err(e)),
            };
            let Some(call) = pending.remove(&task_id) else {
                continue;
            };
            let result = outcome.unwrap_or_else(|e| {
                warn!(tool = %call.name, id = %call.id, error = %e, "Tool task did not complete");
                ToolResult::from(ToolError::ExecutionFailed {
                    tool_name: call.name.clone(),
                    reason: if e.is_panic() {
                        "the tool panicked".into()
                    } else {
                        e.to_string()
                    },
                })
            });
            self.wire.send(WireEvent::ToolResult {
                id: call.id.clone(),
                status: result.status,
            });
            let content = self.render(&call, &result);
            messages.push(Message::tool_result(call.id, content));
        }
        messages
    }

    fn render(&mut self, call: &ToolCall, result: &ToolResult) -> String {
        let key = signature(call);
        match result.status {
            ToolStatus::Ok => {
                self.streaks.remove(&key);
                if !result.output.is_empty() {
                    result.output.clone()
                } else if !result.message.is_empty() {
                    result.message.clone()
                } else {
                    "(no output)".into()
                }
            }
            ToolStatus::Rejected => {
                "The user rejected this action. Do not retry it; ask the user how to proceed."
                    .into()
            }
            ToolStatus::Error => {
                let streak = self.streaks.entry(key).or_insert(0);
                *streak += 1;
                let count = *streak;
                warn!(tool = %call.name, streak = count, error = %result.message, "Tool call failed");

                let mut content = format!("Error: {}", result.message);
                if !result.output.is_empty() {
                    content.push('\n');
                    content.push_str(&result.output);
                }
                content.push_str(&format!(
                    "\n(This exact call has failed {count} time(s) in a row.)"
                ));
                if count >= self.streak_threshold {
                    content.push_str(
                        " Repeating it will not help. Change the arguments or try a different approach.",
                    );
                }
                content
            }
        }
    }
}

fn signature(call: &ToolCall) -> String {
    format!("{}\u{0}{}", call.name, call.arguments)
}

/// Execute one call on its own task so a panic or a timeout is contained.
/// On timeout the task is aborted, which drops (and thereby kills) whatever
/// the tool was running.
async fn execute_guarded(registry: Arc<ToolRegistry>, call: &ToolCall, timeout: Duration) -> ToolResult {
    let name = call.name.clone();
    let arguments = call.arguments.clone();
    let mut handle = tokio::spawn(async move { registry.execute(&name, &arguments).await });

    let outcome = match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join_err)) => Err(ToolError::ExecutionFailed {
            tool_name: call.name.clone(),
            reason: if join_err.is_panic() {
                "the tool panicked".into()
            } else {
                join_err.to_string()
            },
        }),
        Err(_) => {
            handle.abort();
            Err(ToolError::Timeout {
                tool_name: call.name.clone(),
                timeout_secs: timeout.as_secs(),
            })
        }
    };

    match outcome {
        Ok(result) => {
            debug!(tool = %call.name, id = %call.id, status = ?result.status, "Tool finished");
            result
        }
        Err(e) => ToolResult::from(e),
    }
}
