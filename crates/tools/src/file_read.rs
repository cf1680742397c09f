//! ReadFile tool: read file contents inside the working directory.

use async_trait::async_trait;
use ferrocode_core::error::ToolError;
use ferrocode_core::tool::{Tool, ToolResult};
use std::path::PathBuf;

use crate::path::resolve_in_work_dir;

const MAX_LINES: usize = 1000;

pub struct ReadFileTool {
    work_dir: PathBuf,
}

impl ReadFileTool {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "ReadFile"
    }

    fn description(&self) -> &str {
        "Read a text file. Paths are relative to the working directory. At most 1000 lines are returned per call; use line_offset to page."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read"
                },
                "line_offset": {
                    "type": "integer",
                    "description": "1-based line to start from (default 1)",
                    "minimum": 1
                },
                "n_lines": {
                    "type": "integer",
                    "description": "Number of lines to read (default and max 1000)",
                    "minimum": 1
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let raw_path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
        let offset = arguments["line_offset"].as_u64().unwrap_or(1).max(1) as usize;
        let n_lines = arguments["n_lines"]
            .as_u64()
            .map(|n| n as usize)
            .unwrap_or(MAX_LINES)
            .clamp(1, MAX_LINES);

        let path = resolve_in_work_dir(&self.work_dir, raw_path).map_err(|e| {
            ToolError::PermissionDenied {
                tool_name: self.name().into(),
                reason: e.to_string(),
            }
        })?;

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                return Ok(ToolResult::error(
                    format!("Failed to read {raw_path}"),
                    format!("Failed to read file: {e}"),
                ));
            }
        };

        let total = content.lines().count();
        let selected: Vec<&str> = content.lines().skip(offset - 1).take(n_lines).collect();
        let mut output = selected.join("\n");
        if content.ends_with('\n') && offset - 1 + selected.len() == total && !selected.is_empty()
        {
            output.push('\n');
        }

        let message = if offset - 1 + selected.len() < total {
            format!(
                "Read lines {}-{} of {total}",
                offset,
                offset - 1 + selected.len()
            )
        } else {
            format!("Read {} lines", selected.len())
        };
        Ok(ToolResult::ok(output).with_message(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrocode_core::tool::ToolStatus;

    #[test]
    fn tool_definition() {
        let tool = ReadFileTool::new(".");
        assert_eq!(tool.name(), "ReadFile");
        let schema = tool.parameters_schema();
        assert_eq!(schema["required"], serde_json::json!(["path"]));
    }

    #[tokio::test]
    async fn read_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("test.txt"), "Hello, world!\n").unwrap();

        let result = ReadFileTool::new(dir.path())
            .execute(serde_json::json!({"path": "test.txt"}))
            .await
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(result.output, "Hello, world!\n");
    }

    #[tokio::test]
    async fn read_line_window() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lines.txt"), "a\nb\nc\nd\n").unwrap();

        let result = ReadFileTool::new(dir.path())
            .execute(serde_json::json!({"path": "lines.txt", "line_offset": 2, "n_lines": 2}))
            .await
            .unwrap();
        assert_eq!(result.output, "b\nc");
        assert_eq!(result.message, "Read lines 2-3 of 4");
    }

    #[tokio::test]
    async fn read_nonexistent_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = ReadFileTool::new(dir.path())
            .execute(serde_json::json!({"path": "missing.txt"}))
            .await
            .unwrap();
        assert_eq!(result.status, ToolStatus::Error);
        assert!(result.output.contains("Failed to read file"));
    }

    #[tokio::test]
    async fn path_traversal_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let result = ReadFileTool::new(dir.path())
            .execute(serde_json::json!({"path": "../../../etc/passwd"}))
            .await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));
    }

    #[tokio::test]
    async fn missing_path_argument() {
        let result = ReadFileTool::new(".").execute(serde_json::json!({})).await;
        assert!(result.is_err());
    }
}
