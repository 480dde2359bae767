//! Plugin backend - in-process registry first, then the plugin directory

use super::process::run_captured;
use super::{Backend, ExecContext, TaskOutput};
use crate::core::Task;
use crate::error::TaskError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;

/// In-process plugin, handed the store location
pub trait Plugin: Send + Sync {
    fn run(&self, store: &str) -> anyhow::Result<()>;
}

impl<F> Plugin for F
where
    F: Fn(&str) -> anyhow::Result<()> + Send + Sync,
{
    fn run(&self, store: &str) -> anyhow::Result<()> {
        self(store)
    }
}

/// Command name -> in-process implementation. Clones share the plugins.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, plugin: impl Plugin + 'static) -> &mut Self {
        self.plugins.insert(name.into(), Arc::new(plugin));
        self
    }

    pub fn with(mut self, name: impl Into<String>, plugin: impl Plugin + 'static) -> Self {
        self.register(name, plugin);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plugins.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}

/// Executable plugins found in a directory, sorted
pub fn discover(plugin_dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(plugin_dir) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| is_executable_file(&entry.path()))
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .collect();
    names.sort();
    names
}

/// Path of the plugin binary, if `command` names a regular executable file
pub fn locate(plugin_dir: &Path, command: &str) -> Option<PathBuf> {
    // Only a bare file name may address the plugin directory
    if command.is_empty() || Path::new(command).components().count() != 1 {
        return None;
    }
    let path = plugin_dir.join(command);
    is_executable_file(&path).then_some(path)
}

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable_file(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

pub struct PluginBackend;

#[async_trait]
impl Backend for PluginBackend {
    async fn execute(&self, task: &Task, ctx: &ExecContext) -> Result<TaskOutput, TaskError> {
        let command = task.command();

        if let Some(plugin) = ctx.plugins.get(command) {
            log::debug!("Running in-process plugin {}", command);
            let store = ctx.store.clone();
            let result = tokio::task::spawn_blocking(move || plugin.run(&store))
                .await
                .map_err(|e| TaskError::Panicked(e.to_string()))?;

            return result
                .map(|()| TaskOutput::default())
                .map_err(|e| TaskError::PluginExecutionFailed {
                    plugin: command.to_string(),
                    cause: format!("{:#}", e),
                    stderr: String::new(),
                });
        }

        let Some(path) = locate(&ctx.plugin_dir, command) else {
            return Err(TaskError::PluginNotFound(command.to_string()));
        };

        let mut cmd = Command::new(&path);
        cmd.args(task.forwarded_args()).arg(&ctx.store);

        run_captured(cmd, command)
            .await
            .map(|captured| TaskOutput {
                stdout: captured.stdout,
            })
            .map_err(|failure| TaskError::PluginExecutionFailed {
                plugin: command.to_string(),
                cause: failure.cause,
                stderr: failure.stderr,
            })
    }
}
