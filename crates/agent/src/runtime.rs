//! Shared collaborators of a step loop and the tool registries it runs with.

use ferrocode_config::AppConfig;
use ferrocode_core::agent::AgentSpec;
use ferrocode_core::approval::Approval;
use ferrocode_core::event::Wire;
use ferrocode_core::ids::{IdGenerator, UuidGenerator};
use ferrocode_core::provider::Provider;
use ferrocode_core::tool::ToolRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

use crate::compaction::{Compactor, SimpleCompactor};
use crate::subagent::TaskTool;
use crate::token::{CharEstimator, TokenEstimator};

/// Everything a loop needs besides its spec and its store.
///
/// A runtime is shared by the tools it builds; a subagent gets a copy with
/// its own wire (see [`Runtime::for_subagent`]).
#[derive(Clone)]
pub struct Runtime {
    provider: Arc<dyn Provider>,
    config: Arc<AppConfig>,
    approval: Arc<Approval>,
    ids: Arc<dyn IdGenerator>,
    estimator: Arc<dyn TokenEstimator>,
    compactor: Arc<dyn Compactor>,
    toolsets: Arc<dyn ToolsetFactory>,
    work_dir: PathBuf,
}

impl Runtime {
    pub fn new(provider: Arc<dyn Provider>, config: Arc<AppConfig>, wire: Wire) -> Self {
        let approval = Arc::new(Approval::new(wire, config.yolo));
        let compactor = Arc::new(SimpleCompactor::new(config.loop_control.preserved_messages));
        Self {
            provider,
            approval,
            ids: Arc::new(UuidGenerator::default()),
            estimator: Arc::new(CharEstimator::default()),
            compactor,
            toolsets: Arc::new(DefaultToolset),
            work_dir: PathBuf::from("."),
            config,
        }
    }

    pub fn with_approval(mut self, approval: Arc<Approval>) -> Self {
        self.approval = approval;
        self
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_compactor(mut self, compactor: Arc<dyn Compactor>) -> Self {
        self.compactor = compactor;
        self
    }

    pub fn with_toolsets(mut self, toolsets: Arc<dyn ToolsetFactory>) -> Self {
        self.toolsets = toolsets;
        self
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn approval(&self) -> &Arc<Approval> {
        &self.approval
    }

    pub fn wire(&self) -> &Wire {
        self.approval.wire()
    }

    pub fn ids(&self) -> &Arc<dyn IdGenerator> {
        &self.ids
    }

    pub fn estimator(&self) -> &Arc<dyn TokenEstimator> {
        &self.estimator
    }

    pub fn compactor(&self) -> &Arc<dyn Compactor> {
        &self.compactor
    }

    pub fn toolsets(&self) -> &Arc<dyn ToolsetFactory> {
        &self.toolsets
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// A copy for a nested agent: same collaborators, a private wire, and an
    /// approval with the same yolo setting bound to that wire.
    pub fn for_subagent(&self) -> Self {
        let wire = Wire::default();
        Self {
            approval: Arc::new(Approval::new(wire, self.approval.is_yolo())),
            ..self.clone()
        }
    }
}

/// Builds the tool registry for an agent before its loop starts.
pub trait ToolsetFactory: Send + Sync {
    /// `session_log` is the log of the loop that will own the registry; the
    /// delegation tool derives child log names from it.
    fn build(&self, spec: &AgentSpec, runtime: &Arc<Runtime>, session_log: &Path) -> ToolRegistry;
}

/// Registers the built-in tools an agent spec names, plus `Task` when the
/// agent has subagents.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultToolset;

impl ToolsetFactory for DefaultToolset {
    fn build(&self, spec: &AgentSpec, runtime: &Arc<Runtime>, session_log: &Path) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for name in &spec.tools {
            if name == TaskTool::NAME {
                if spec.subagents.is_empty() {
                    warn!(agent = %spec.name, "Task listed but the agent has no subagents");
                    continue;
                }
                registry.register(Box::new(TaskTool::new(
                    spec.clone(),
                    runtime.clone(),
                    session_log,
                )));
                continue;
            }
            match ferrocode_tools::builtin_tool(name, runtime.approval(), runtime.work_dir()) {
                Some(tool) => registry.register(tool),
                None => warn!(agent = %spec.name, tool = %name, "Unknown tool in agent spec"),
            }
        }
        registry
    }
}
