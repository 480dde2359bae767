//! Execution backends - one implementation per task type
//!
//! Every backend runs a single task against a store location. The task's
//! [`TaskKind`] picks the backend through [`backend_for`].

mod container;
mod plugin;
mod process;
mod script;

pub use container::{BackendOptions, ContainerBackend, DockerfileBackend};
pub use plugin::{discover, locate, Plugin, PluginBackend, PluginRegistry};
pub use process::shell_quote;
pub use script::{ScriptBackend, SCRIPT_PREFIX};

use crate::core::{Task, TaskKind};
use crate::error::TaskError;
use async_trait::async_trait;
use std::path::PathBuf;

/// What a successful task hands back to the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOutput {
    /// Captured standard output, for the output formatting step
    pub stdout: String,
}

/// Everything a backend needs besides the task itself. Shared read-only
/// by all tasks of a run.
#[derive(Clone)]
pub struct ExecContext {
    /// Store location, opaque to the engine
    pub store: String,
    pub plugin_dir: PathBuf,
    pub scripts_dir: PathBuf,
    pub plugins: PluginRegistry,
    /// Passed untouched to the container backends
    pub options: Option<BackendOptions>,
}

impl ExecContext {
    pub fn new(store: impl Into<String>, plugin_dir: impl Into<PathBuf>, plugins: PluginRegistry) -> Self {
        Self {
            store: store.into(),
            plugin_dir: plugin_dir.into(),
            scripts_dir: crate::config::default_dir("scripts"),
            plugins,
            options: None,
        }
    }

    pub fn with_scripts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scripts_dir = dir.into();
        self
    }

    pub fn with_options(mut self, options: Option<BackendOptions>) -> Self {
        self.options = options;
        self
    }
}

/// Run one task against a store
#[async_trait]
pub trait Backend: Send + Sync {
    async fn execute(&self, task: &Task, ctx: &ExecContext) -> Result<TaskOutput, TaskError>;
}

/// Backend implementing a task kind
pub fn backend_for(kind: TaskKind) -> &'static dyn Backend {
    match kind {
        TaskKind::Plugin => &PluginBackend,
        TaskKind::Script => &ScriptBackend,
        TaskKind::Docker => &ContainerBackend,
        TaskKind::Dockerfile => &DockerfileBackend,
    }
}

/// Resolve the task's kind and run it on the matching backend
pub async fn dispatch(task: &Task, ctx: &ExecContext) -> Result<TaskOutput, TaskError> {
    let kind = task.kind()?;
    backend_for(kind).execute(task, ctx).await
}
