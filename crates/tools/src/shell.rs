//! Shell tool: execute system commands.
//!
//! Every command needs approval unless the session runs in yolo mode or the
//! user approved shell commands for the session. The child process is killed
//! when the execution future is dropped, so a pipeline timeout really stops
//! the command.

use async_trait::async_trait;
use ferrocode_core::approval::Approval;
use ferrocode_core::error::ToolError;
use ferrocode_core::tool::{Tool, ToolResult};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const MAX_TIMEOUT_SECS: u64 = 300;

pub struct ShellTool {
    approval: Arc<Approval>,
    work_dir: PathBuf,
}

impl ShellTool {
    pub fn new(approval: Arc<Approval>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            approval,
            work_dir: work_dir.into(),
        }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "Shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the working directory and return stdout/stderr. Use this for running programs, listing files, git operations, etc."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (default 60, max 300)",
                    "minimum": 1,
                    "maximum": MAX_TIMEOUT_SECS
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let command = arguments["command"]
            .as_str()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;
        let timeout_secs = arguments["timeout"]
            .as_u64()
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .clamp(1, MAX_TIMEOUT_SECS);

        if !self
            .approval
            .request(self.name(), "run shell command", command)
            .await
        {
            return Ok(ToolResult::rejected());
        }

        debug!(command = %command, timeout_secs, "Executing shell command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.current_dir(&self.work_dir).kill_on_drop(true);

        let output = match tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output()).await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: self.name().into(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(ToolError::Timeout {
                    tool_name: self.name().into(),
                    timeout_secs,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if output.status.success() {
            let text = if stderr.is_empty() {
                stdout
            } else {
                format!("{stdout}\n[stderr]: {stderr}")
            };
            Ok(ToolResult::ok(text.trim()).with_message("Command executed successfully"))
        } else {
            let code = output.status.code().unwrap_or(-1);
            warn!(command = %command, exit_code = code, "Command failed");
            Ok(ToolResult::error(
                format!("Command failed with exit code: {code}"),
                format!("{stdout}\n{stderr}").trim(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrocode_core::event::Wire;
    use ferrocode_core::tool::ToolStatus;

    fn yolo_shell(dir: &std::path::Path) -> ShellTool {
        ShellTool::new(Approval::yolo(Wire::new(8)), dir)
    }

    #[tokio::test]
    async fn execute_echo() {
        let dir = tempfile::tempdir().unwrap();
        let result = yolo_shell(dir.path())
            .execute(serde_json::json!({"command": "echo hello"}))
            .await
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(result.output, "hello");
    }

    #[tokio::test]
    async fn runs_in_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let result = yolo_shell(dir.path())
            .execute(serde_json::json!({"command": "ls"}))
            .await
            .unwrap();
        assert!(result.output.contains("marker.txt"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_error_result() {
        let dir = tempfile::tempdir().unwrap();
        let result = yolo_shell(dir.path())
            .execute(serde_json::json!({"command": "echo oops >&2; exit 3"}))
            .await
            .unwrap();
        assert_eq!(result.status, ToolStatus::Error);
        assert!(result.message.contains("exit code: 3"));
        assert!(result.output.contains("oops"));
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let result = yolo_shell(dir.path())
            .execute(serde_json::json!({"command": "sleep 5", "timeout": 1}))
            .await;
        assert!(matches!(result, Err(ToolError::Timeout { timeout_secs: 1, .. })));
    }

    #[tokio::test]
    async fn unapproved_command_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ShellTool::new(Arc::new(Approval::new(Wire::new(8), false)), dir.path());
        let result = tool
            .execute(serde_json::json!({"command": "touch created.txt"}))
            .await
            .unwrap();
        assert_eq!(result.status, ToolStatus::Rejected);
        assert!(!dir.path().join("created.txt").exists());
    }

    #[tokio::test]
    async fn missing_command_argument() {
        let dir = tempfile::tempdir().unwrap();
        let result = yolo_shell(dir.path()).execute(serde_json::json!({})).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }
}
