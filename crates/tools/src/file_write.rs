//! WriteFile tool: create, overwrite, or append to files inside the working
//! directory after approval.

use async_trait::async_trait;
use ferrocode_core::approval::Approval;
use ferrocode_core::error::ToolError;
use ferrocode_core::tool::{Tool, ToolResult};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use crate::path::resolve_in_work_dir;

pub struct WriteFileTool {
    approval: Arc<Approval>,
    work_dir: PathBuf,
}

impl WriteFileTool {
    pub fn new(approval: Arc<Approval>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            approval,
            work_dir: work_dir.into(),
        }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "WriteFile"
    }

    fn description(&self) -> &str {
        "Write content to a file in the working directory. Creates the file and its parent directories if needed. Mode 'overwrite' (default) replaces the file, 'append' adds to its end."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to write to"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                },
                "mode": {
                    "type": "string",
                    "enum": ["overwrite", "append"],
                    "description": "Write mode (default overwrite)"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let raw_path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
        let content = arguments["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;
        let append = match arguments["mode"].as_str() {
            None | Some("overwrite") => false,
            Some("append") => true,
            Some(other) => {
                return Err(ToolError::InvalidArguments(format!(
                    "Unknown mode '{other}', expected 'overwrite' or 'append'"
                )));
            }
        };

        let path = resolve_in_work_dir(&self.work_dir, raw_path).map_err(|e| {
            ToolError::PermissionDenied {
                tool_name: self.name().into(),
                reason: e.to_string(),
            }
        })?;

        if !self.approval.request(self.name(), "edit file", raw_path).await {
            return Ok(ToolResult::rejected());
        }

        if let Some(parent) = path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Ok(ToolResult::error(
                "Failed to create directory",
                format!("Failed to create directory: {e}"),
            ));
        }

        let written = if append {
            append_to(&path, content).await
        } else {
            tokio::fs::write(&path, content).await
        };

        match written {
            Ok(()) => {
                let verb = if append { "appended" } else { "wrote" };
                Ok(ToolResult::ok(format!(
                    "Successfully {verb} {} bytes to {raw_path}",
                    content.len()
                ))
                .with_message("File successfully written"))
            }
            Err(e) => Ok(ToolResult::error(
                format!("Failed to write {raw_path}"),
                format!("Failed to write file: {e}"),
            )),
        }
    }
}

async fn append_to(path: &std::path::Path, content: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await
}
