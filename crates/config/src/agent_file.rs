//! Agent spec files.
//!
//! ```toml
//! name = "ferrocode"
//! system_prompt_file = "system.md"
//! tools = ["Shell", "ReadFile", "WriteFile", "Task"]
//!
//! [subagents.coder]
//! description = "Good at focused code edits"
//! path = "coder.toml"
//! ```
//!
//! Relative paths resolve against the directory of the file that names them.

use ferrocode_core::agent::{AgentSpec, SubagentSpec};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::ConfigError;

#[derive(Debug, Deserialize)]
struct AgentFile {
    name: String,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(default)]
    system_prompt_file: Option<PathBuf>,
    #[serde(default)]
    tools: Vec<String>,
    #[serde(default)]
    subagents: BTreeMap<String, SubagentEntry>,
}

#[derive(Debug, Deserialize)]
struct SubagentEntry {
    description: String,
    path: PathBuf,
}

/// Load an agent spec and every subagent it references.
pub fn load_agent_spec(path: &Path) -> Result<AgentSpec, ConfigError> {
    let mut loading = HashSet::new();
    load_recursive(path, &mut loading)
}

fn load_recursive(path: &Path, loading: &mut HashSet<PathBuf>) -> Result<AgentSpec, ConfigError> {
    let canonical = path.canonicalize().map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    if !loading.insert(canonical.clone()) {
        return Err(ConfigError::ValidationError(format!(
            "agent spec {} references itself through its subagents",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(&canonical).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let file: AgentFile = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let base = canonical.parent().unwrap_or(Path::new("."));

    let system_prompt = match (file.system_prompt, file.system_prompt_file) {
        (Some(_), Some(_)) => {
            return Err(ConfigError::ValidationError(format!(
                "{}: set either system_prompt or system_prompt_file, not both",
                path.display()
            )));
        }
        (Some(prompt), None) => prompt,
        (None, Some(prompt_file)) => {
            let prompt_path = base.join(prompt_file);
            std::fs::read_to_string(&prompt_path).map_err(|e| ConfigError::ReadError {
                path: prompt_path,
                reason: e.to_string(),
            })?
        }
        (None, None) => {
            return Err(ConfigError::ValidationError(format!(
                "{}: agent '{}' has no system prompt",
                path.display(),
                file.name
            )));
        }
    };

    if file.name.trim().is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "{}: agent name must not be empty",
            path.display()
        )));
    }

    let mut subagents = BTreeMap::new();
    for (name, entry) in file.subagents {
        let spec = load_recursive(&base.join(&entry.path), loading)?;
        subagents.insert(
            name,
            SubagentSpec {
                description: entry.description,
                spec,
            },
        );
    }

    loading.remove(&canonical);
    tracing::debug!(agent = %file.name, subagents = subagents.len(), "Loaded agent spec");

    Ok(AgentSpec {
        name: file.name,
        system_prompt,
        tools: file.tools,
        subagents,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn loads_spec_with_subagent_and_prompt_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "system.md", "You are the main agent.");
        write(
            dir.path(),
            "coder.toml",
            r#"
name = "coder"
system_prompt = "You write code."
tools = ["Shell", "WriteFile"]
"#,
        );
        let main = write(
            dir.path(),
            "main.toml",
            r#"
name = "main"
system_prompt_file = "system.md"
tools = ["Shell", "Task"]

[subagents.coder]
description = "Writes code"
path = "coder.toml"
"#,
        );

        let spec = load_agent_spec(&main).unwrap();
        assert_eq!(spec.name, "main");
        assert_eq!(spec.system_prompt, "You are the main agent.");
        assert_eq!(spec.tools, vec!["Shell", "Task"]);

        let coder = spec.subagent("coder").unwrap();
        assert_eq!(coder.description, "Writes code");
        assert_eq!(coder.spec.tools, vec!["Shell", "WriteFile"]);
        assert!(coder.spec.subagents.is_empty());
    }

    #[test]
    fn missing_prompt_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "a.toml", "name = \"a\"\n");
        assert!(matches!(
            load_agent_spec(&path),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn both_prompt_sources_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "p.md", "x");
        let path = write(
            dir.path(),
            "a.toml",
            "name = \"a\"\nsystem_prompt = \"x\"\nsystem_prompt_file = \"p.md\"\n",
        );
        assert!(load_agent_spec(&path).is_err());
    }

    #[test]
    fn self_reference_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "loop.toml",
            r#"
name = "loop"
system_prompt = "x"

[subagents.me]
description = "myself"
path = "loop.toml"
"#,
        );
        let err = load_agent_spec(&path).unwrap_err();
        assert!(err.to_string().contains("references itself"));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        assert!(matches!(
            load_agent_spec(Path::new("/nonexistent/agent.toml")),
            Err(ConfigError::ReadError { .. })
        ));
    }
}
