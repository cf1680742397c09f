//! Agent definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Static definition of an agent: who it is and what it may use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    /// Agent name, shown in step events
    pub name: String,

    /// System prompt sent with every model request
    pub system_prompt: String,

    /// Names of the tools this agent may call
    #[serde(default)]
    pub tools: Vec<String>,

    /// Agents this agent may delegate to, keyed by name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub subagents: BTreeMap<String, SubagentSpec>,
}

/// A delegation target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubagentSpec {
    /// When to use this subagent (shown to the parent model)
    pub description: String,

    pub spec: AgentSpec,
}

impl AgentSpec {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            tools: Vec::new(),
            subagents: BTreeMap::new(),
        }
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_subagent(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        spec: AgentSpec,
    ) -> Self {
        self.subagents.insert(
            name.into(),
            SubagentSpec {
                description: description.into(),
                spec,
            },
        );
        self
    }

    pub fn subagent(&self, name: &str) -> Option<&SubagentSpec> {
        self.subagents.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_tools_and_subagents() {
        let coder = AgentSpec::new("coder", "You write code.").with_tools(["Shell"]);
        let spec = AgentSpec::new("main", "You are helpful.")
            .with_tools(["Shell", "ReadFile", "Task"])
            .with_subagent("coder", "Writes code", coder.clone());

        assert_eq!(spec.tools, vec!["Shell", "ReadFile", "Task"]);
        assert_eq!(spec.subagent("coder").unwrap().spec, coder);
        assert!(spec.subagent("reviewer").is_none());
    }
}
