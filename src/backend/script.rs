//! Script backend - runs `evidenceflow-<command>` from the scripts directory through `sh -c`

use super::process::{run_captured, shell_quote};
use super::{Backend, ExecContext, TaskOutput};
use crate::core::Task;
use crate::error::TaskError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// File name prefix of script executables
pub const SCRIPT_PREFIX: &str = "evidenceflow-";

pub struct ScriptBackend;

impl ScriptBackend {
    /// Conventional location of a script
    pub fn script_path(scripts_dir: &Path, command: &str) -> PathBuf {
        scripts_dir.join(format!("{}{}", SCRIPT_PREFIX, command))
    }

    /// Shell line: quoted script, forwarded flags, quoted store
    pub fn shell_command(script: &Path, task: &Task, store: &str) -> String {
        let mut words = vec![shell_quote(&slash_path(script))];
        words.extend(task.forwarded_args().iter().map(|arg| shell_quote(arg)));
        words.push(shell_quote(&store.replace('\\', "/")));
        words.join(" ")
    }
}

fn slash_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[async_trait]
impl Backend for ScriptBackend {
    async fn execute(&self, task: &Task, ctx: &ExecContext) -> Result<TaskOutput, TaskError> {
        let script = Self::script_path(&ctx.scripts_dir, task.command());
        let script_name = format!("{}{}", SCRIPT_PREFIX, task.command());

        let is_file = std::fs::metadata(&script)
            .map(|m| m.is_file())
            .unwrap_or(false);
        if task.command().is_empty() || !is_file {
            return Err(TaskError::ScriptExecutionFailed {
                script: script_name,
                cause: format!("script not found at {}", script.display()),
                stderr: String::new(),
            });
        }

        let line = Self::shell_command(&script, task, &ctx.store);
        log::debug!("sh -c {}", line);

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&line);

        let captured = run_captured(cmd, &script_name)
            .await
            .map_err(|failure| TaskError::ScriptExecutionFailed {
                script: script_name.clone(),
                cause: failure.cause,
                stderr: failure.stderr,
            })?;

        Ok(TaskOutput {
            stdout: captured.stdout,
        })
    }
}
