//! Delegation to subagents through the `Task` tool.
//!
//! Every delegation runs a fresh step loop with its own log, store, tool
//! registry and wire. Nothing of the parent's history is shared; the child
//! only sees the prompt it is given.

use async_trait::async_trait;
use ferrocode_core::agent::AgentSpec;
use ferrocode_core::error::{PersistenceError, ToolError};
use ferrocode_core::event::{Wire, WireEvent};
use ferrocode_core::message::{Message, Role};
use ferrocode_core::tool::{Tool, ToolResult};
use ferrocode_session::{ConversationStore, open_writer};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::loop_runner::AgentLoop;
use crate::runtime::Runtime;

const ELABORATION_PROMPT: &str = "Your answer is too brief for the agent that delegated this task. \
Restate the full result with the relevant details, including file paths and anything that still needs attention.";

const NO_ANSWER_GUIDANCE: &str = "The subagent finished without a final answer. \
Try again with a more specific prompt, or do the task yourself.";

#[derive(Debug, Deserialize)]
struct TaskArgs {
    #[serde(default)]
    description: String,
    #[serde(default)]
    subagent_name: String,
    #[serde(default)]
    prompt: String,
}

/// Runs a named subagent on a prompt and returns its final answer.
pub struct TaskTool {
    spec: AgentSpec,
    runtime: Arc<Runtime>,
    parent_log: PathBuf,
    description: String,
}

impl TaskTool {
    pub const NAME: &'static str = "Task";

    /// `spec` is the delegating agent; its subagents are the valid targets.
    pub fn new(spec: AgentSpec, runtime: Arc<Runtime>, parent_log: &Path) -> Self {
        let mut description = String::from(
            "Delegate a self-contained task to a subagent. The subagent starts with no \
             knowledge of this conversation, so the prompt must carry everything it needs.\n\n\
             Available subagents:",
        );
        for (name, sub) in &spec.subagents {
            description.push_str(&format!("\n- {name}: {}", sub.description));
        }
        Self {
            spec,
            runtime,
            parent_log: parent_log.to_path_buf(),
            description,
        }
    }

    fn available(&self) -> String {
        self.spec
            .subagents
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }

    async fn delegate(&self, name: &str, spec: &AgentSpec, prompt: &str) -> Result<ToolResult, ToolError> {
        let log = allocate_child_log(&self.parent_log)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: Self::NAME.into(),
                reason: e.to_string(),
            })?;
        info!(subagent = %name, log = %log.display(), "Delegating task");

        let child_runtime = Arc::new(self.runtime.for_subagent());
        let store = ConversationStore::new(open_writer(&log, &self.runtime.config().persistence));
        let mut child = AgentLoop::new(child_runtime.clone(), spec.clone(), store).as_subagent();
        let _bridge = ApprovalBridge::start(child_runtime.wire(), self.runtime.wire().clone());

        if let Err(e) = child.run(prompt).await {
            warn!(subagent = %name, error = %e, "Subagent run failed");
            return Ok(ToolResult::error(
                format!("Subagent '{name}' stopped before finishing: {e}"),
                "",
            ));
        }

        let Some(mut answer) = final_answer(child.history()) else {
            return Ok(ToolResult::error(NO_ANSWER_GUIDANCE, ""));
        };

        let min_chars = self.runtime.config().subagent.min_answer_chars;
        if answer.chars().count() < min_chars {
            debug!(subagent = %name, chars = answer.chars().count(), "Asking subagent to elaborate");
            match child.run(ELABORATION_PROMPT).await {
                Ok(_) => {
                    if let Some(longer) = final_answer(child.history()) {
                        answer = longer;
                    }
                }
                Err(e) => warn!(subagent = %name, error = %e, "Elaboration failed, using first answer"),
            }
        }

        if let Err(e) = child.store().flush().await {
            warn!(subagent = %name, error = %e, "Could not flush subagent log");
        }
        Ok(ToolResult::ok(answer).with_message(format!("Subagent {name} finished")))
    }
}

#[async_trait]
impl Tool for TaskTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "description": {
                    "type": "string",
                    "description": "A short (3-5 word) description of the task"
                },
                "subagent_name": {
                    "type": "string",
                    "description": "Which subagent to run"
                },
                "prompt": {
                    "type": "string",
                    "description": "The complete task for the subagent"
                }
            },
            "required": ["description", "subagent_name", "prompt"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: TaskArgs = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let name = args.subagent_name.trim();
        if name.is_empty() {
            return Ok(ToolResult::error("subagent_name must not be empty", ""));
        }
        if args.prompt.trim().is_empty() {
            return Ok(ToolResult::error("prompt must not be empty", ""));
        }
        let Some(sub) = self.spec.subagent(name) else {
            return Ok(ToolResult::error(
                format!("Subagent not found: {name}. Available: {}", self.available()),
                "",
            ));
        };

        debug!(subagent = %name, task = %args.description, "Task requested");
        self.delegate(name, &sub.spec, &args.prompt).await
    }
}

/// Text of the last message, if the model wrote it.
fn final_answer(history: &[Message]) -> Option<String> {
    history
        .last()
        .filter(|m| m.role == Role::Assistant)
        .map(Message::text)
}

/// Reserve `<stem>_sub_<n><.ext>` next to the parent log, using the first
/// `n >= 1` that does not exist yet.
async fn allocate_child_log(parent: &Path) -> Result<PathBuf, PersistenceError> {
    let stem = parent
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "session".into());
    let ext = parent
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut n = 1u32;
    loop {
        let candidate = parent.with_file_name(format!("{stem}_sub_{n}{ext}"));
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(PersistenceError::io(candidate, e)),
        }
    }
}

/// Forwards a child's approval requests to the parent's wire for as long as
/// it lives. Other child events stay private.
struct ApprovalBridge {
    task: JoinHandle<()>,
}

impl ApprovalBridge {
    fn start(child: &Wire, parent: Wire) -> Self {
        let mut rx = child.subscribe();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event @ WireEvent::ApprovalRequest(_)) => parent.send(event),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Subagent event bridge lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Self { task }
    }
}

impl Drop for ApprovalBridge {
    fn drop(&mut self) {
        self.task.abort();
    }
}
