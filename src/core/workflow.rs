//! Workflow - named task collection plus its cached dependency graph

use super::executor::Runner;
use super::result::WorkflowResult;
use super::{Graph, Task};
use crate::backend::{BackendOptions, ExecContext, PluginRegistry};
use crate::error::WorkflowError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default)]
    tasks: HashMap<String, Task>,
    /// Optional cap on concurrently executing tasks
    #[serde(default)]
    pub max_parallel: Option<usize>,
    #[serde(skip)]
    graph: Option<Graph>,
}

impl Workflow {
    pub fn new(tasks: HashMap<String, Task>) -> Self {
        Self {
            tasks,
            ..Self::default()
        }
    }

    /// Load workflow from YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading workflow {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("parsing workflow {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let workflow: Workflow = serde_yaml::from_str(content)?;
        Ok(workflow)
    }

    /// Add or replace a task; drops any cached graph
    pub fn insert_task(&mut self, name: impl Into<String>, task: Task) {
        self.tasks.insert(name.into(), task);
        self.graph = None;
    }

    pub fn with_task(mut self, name: impl Into<String>, task: Task) -> Self {
        self.insert_task(name, task);
        self
    }

    pub fn tasks(&self) -> &HashMap<String, Task> {
        &self.tasks
    }

    pub fn get_task(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }

    /// Graph built by the last successful [`Workflow::setup_graph`]
    pub fn graph(&self) -> Option<&Graph> {
        self.graph.as_ref()
    }

    /// Validate dependencies and compute the execution order.
    /// Cached: calling again on an unchanged workflow returns the same graph.
    pub fn setup_graph(&mut self) -> Result<&Graph, WorkflowError> {
        let graph = match self.graph.take() {
            Some(graph) => graph,
            None => {
                let graph = Graph::build(&self.tasks)?;
                log::debug!("Execution order: {:?}", graph.ordered_names());
                graph
            }
        };
        Ok(&*self.graph.insert(graph))
    }

    /// Run every task against the store at `store`.
    ///
    /// Graph errors are returned before anything runs. Task failures do not
    /// stop independent branches; they are collected in the result, whose
    /// [`WorkflowResult::check`] yields the aggregate error.
    pub async fn run(
        &mut self,
        store: &str,
        plugin_dir: &Path,
        plugins: &PluginRegistry,
        options: Option<&BackendOptions>,
    ) -> Result<WorkflowResult, WorkflowError> {
        let ctx = ExecContext::new(store, plugin_dir, plugins.clone()).with_options(options.cloned());
        let runner = Runner::new(ctx).with_max_parallel(self.max_parallel);
        self.run_with(&runner).await
    }

    /// Run with a preconfigured runner (scripts directory, events, limits)
    pub async fn run_with(&mut self, runner: &Runner) -> Result<WorkflowResult, WorkflowError> {
        let graph = self.setup_graph()?.clone();
        Ok(runner.run(&graph, &self.tasks).await)
    }
}
