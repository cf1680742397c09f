//! `ferrocode agent`: Load and validate an agent spec file.

use ferrocode_agent::TaskTool;
use ferrocode_config::load_agent_spec;
use ferrocode_core::agent::AgentSpec;
use ferrocode_tools::BUILTIN_TOOL_NAMES;
use std::path::PathBuf;

pub async fn run(spec: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let path = spec
        .or_else(|| config.default_agent_file.clone())
        .ok_or("No agent spec given and no default_agent_file configured")?;

    let spec = load_agent_spec(&path).map_err(|e| format!("Invalid agent spec: {e}"))?;

    println!("Agent spec {}", path.display());
    let problems = describe(&spec, 0);
    if problems.is_empty() {
        println!("\n  OK");
        Ok(())
    } else {
        println!();
        for problem in &problems {
            println!("  warning: {problem}");
        }
        Err(format!("{} problem(s) found", problems.len()).into())
    }
}

/// Print the agent tree and collect tool names that will not resolve.
fn describe(spec: &AgentSpec, depth: usize) -> Vec<String> {
    let indent = "  ".repeat(depth + 1);
    println!("{indent}{} ({} prompt chars)", spec.name, spec.system_prompt.len());
    println!("{indent}  tools: {}", spec.tools.join(", "));

    let mut problems = unresolved_tools(spec);
    for (name, sub) in &spec.subagents {
        println!("{indent}  subagent {name}: {}", sub.description);
        problems.extend(describe(&sub.spec, depth + 2));
    }
    problems
}

fn unresolved_tools(spec: &AgentSpec) -> Vec<String> {
    spec.tools
        .iter()
        .filter_map(|tool| {
            if tool == TaskTool::NAME {
                spec.subagents
                    .is_empty()
                    .then(|| format!("{}: Task is listed but there are no subagents", spec.name))
            } else if BUILTIN_TOOL_NAMES.contains(&tool.as_str()) {
                None
            } else {
                Some(format!("{}: unknown tool '{tool}'", spec.name))
            }
        })
        .collect()
}
