//! EvidenceFlow - DAG workflow engine for forensic processing
//!
//! Tasks name their dependencies; the engine validates them into a graph,
//! then runs every task against an evidence store as soon as its
//! dependencies have finished, through one of the plugin, script, docker
//! or dockerfile backends.

pub mod backend;
pub mod config;
pub mod core;
pub mod error;
pub mod output;
pub mod plugins;
pub mod store;

// Re-exports
pub use backend::{BackendOptions, ExecContext, PluginRegistry, TaskOutput};
pub use config::Config;
pub use crate::core::{Graph, Runner, Task, TaskEvent, TaskKind, TaskStatus, Workflow, WorkflowResult};
pub use error::{TaskError, WorkflowError};
pub use output::OutputFormat;

/// Result type alias
pub type Result<T> = anyhow::Result<T>;
