//! Built-in tool implementations for Ferrocode.
//!
//! Tools give the agent the ability to interact with its working directory:
//! run shell commands and read or write files. Subagent delegation (`Task`)
//! lives in the agent crate because it drives a nested step loop.

pub mod file_read;
pub mod file_write;
pub mod path;
pub mod shell;

pub use file_read::ReadFileTool;
pub use file_write::WriteFileTool;
pub use shell::ShellTool;

use ferrocode_core::approval::Approval;
use ferrocode_core::tool::Tool;
use std::path::Path;
use std::sync::Arc;

/// Names of the tools this crate provides.
pub const BUILTIN_TOOL_NAMES: &[&str] = &["Shell", "ReadFile", "WriteFile"];

/// Build one built-in tool by name, bound to `work_dir`.
pub fn builtin_tool(name: &str, approval: &Arc<Approval>, work_dir: &Path) -> Option<Box<dyn Tool>> {
    match name {
        "Shell" => Some(Box::new(ShellTool::new(approval.clone(), work_dir))),
        "ReadFile" => Some(Box::new(ReadFileTool::new(work_dir))),
        "WriteFile" => Some(Box::new(WriteFileTool::new(approval.clone(), work_dir))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrocode_core::event::Wire;
    use ferrocode_core::tool::ToolRegistry;

    #[test]
    fn every_builtin_name_builds_its_tool() {
        let approval = Approval::yolo(Wire::new(8));
        let mut registry = ToolRegistry::new();
        for name in BUILTIN_TOOL_NAMES {
            let tool = builtin_tool(name, &approval, Path::new(".")).unwrap();
            assert_eq!(tool.name(), *name);
            registry.register(tool);
        }
        let names: Vec<_> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["ReadFile", "Shell", "WriteFile"]);
    }

    #[test]
    fn unknown_name_builds_nothing() {
        let approval = Approval::yolo(Wire::new(8));
        assert!(builtin_tool("Glob", &approval, Path::new(".")).is_none());
        assert!(builtin_tool("Shell", &approval, Path::new(".")).is_some());
    }
}
