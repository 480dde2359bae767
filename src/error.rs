//! Error types for graph construction and task execution

use thiserror::Error;

/// Workflow-level errors. Graph errors abort a run before any task starts;
/// `TasksFailed` is the aggregate raised after all reachable work finished.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("unknown dependency: task '{task}' requires '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("cyclic dependency detected at task '{task}'")]
    CyclicDependency { task: String },

    #[error("{failed} of {total} tasks failed: {details}")]
    TasksFailed {
        failed: usize,
        total: usize,
        details: String,
    },
}

/// Task-level errors, recorded per task and never fatal to the run.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("unknown task type '{0}'")]
    UnknownTaskType(String),

    #[error("plugin '{0}' not found")]
    PluginNotFound(String),

    #[error("plugin '{plugin}' failed: {cause}{}", diagnostics(.stderr))]
    PluginExecutionFailed {
        plugin: String,
        cause: String,
        stderr: String,
    },

    #[error("script '{script}' failed: {cause}{}", diagnostics(.stderr))]
    ScriptExecutionFailed {
        script: String,
        cause: String,
        stderr: String,
    },

    #[error("container '{image}' failed: {cause}{}", diagnostics(.stderr))]
    ContainerRunFailed {
        image: String,
        cause: String,
        stderr: String,
    },

    #[error("image build '{dockerfile}' failed: {cause}{}", diagnostics(.stderr))]
    ImageBuildFailed {
        dockerfile: String,
        cause: String,
        stderr: String,
    },

    #[error("dependency '{dependency}' failed")]
    DependencyFailed { dependency: String },

    #[error("task worker panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    /// Captured diagnostic output, if the failing process produced any
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::PluginExecutionFailed { stderr, .. }
            | Self::ScriptExecutionFailed { stderr, .. }
            | Self::ContainerRunFailed { stderr, .. }
            | Self::ImageBuildFailed { stderr, .. } => {
                if stderr.is_empty() {
                    None
                } else {
                    Some(stderr)
                }
            }
            _ => None,
        }
    }

    /// True when the task never ran because a predecessor failed
    pub fn is_dependency_failure(&self) -> bool {
        matches!(self, Self::DependencyFailed { .. })
    }
}

fn diagnostics(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(" (stderr: {})", trimmed)
    }
}
