//! Container backends - run an image against the store, or build one first
//!
//! The store is exchanged by bind mount: the directory holding the store
//! is mounted at `mount_point`, which is also the working directory, and
//! the in-container store path is passed as the final argument.

use super::process::run_captured;
use super::{Backend, ExecContext, TaskOutput};
use crate::core::Task;
use crate::error::TaskError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Container engine settings, opaque to the scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendOptions {
    /// docker-compatible CLI
    pub engine: String,
    /// Engine connection override, passed as `-H`
    pub host: Option<String>,
    /// Directory of build contexts, one subdirectory per recipe
    pub dockerfiles_dir: Option<PathBuf>,
    /// Where the store directory appears inside the container
    pub mount_point: String,
    /// Extra arguments for `run`, placed before the image
    pub run_args: Vec<String>,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            engine: "docker".to_string(),
            host: None,
            dockerfiles_dir: None,
            mount_point: "/store".to_string(),
            run_args: Vec::new(),
        }
    }
}

impl BackendOptions {
    fn engine_command(&self) -> Command {
        let mut cmd = Command::new(&self.engine);
        if let Some(host) = &self.host {
            cmd.arg("-H").arg(host);
        }
        cmd
    }

    fn dockerfiles_dir(&self) -> PathBuf {
        self.dockerfiles_dir
            .clone()
            .unwrap_or_else(|| crate::config::default_dir("dockerfiles"))
    }
}

/// Tag given to images built from a recipe
pub fn image_tag(dockerfile: &str) -> String {
    format!("evidenceflow/{}:latest", dockerfile.to_lowercase())
}

/// Host directory to mount and the store path as seen in the container
fn mount_spec(store: &str, mount_point: &str) -> std::io::Result<(PathBuf, String)> {
    let path = absolute(Path::new(store))?;
    let (dir, name) = match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => (parent.to_path_buf(), name.to_string_lossy().into_owned()),
        _ => (path.clone(), String::new()),
    };

    let inner = if name.is_empty() {
        mount_point.to_string()
    } else {
        format!("{}/{}", mount_point.trim_end_matches('/'), name)
    };
    Ok((dir, inner))
}

fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

pub struct ContainerBackend;

impl ContainerBackend {
    /// Full `run` invocation for an image
    pub fn run_args(
        image: &str,
        task: &Task,
        store: &str,
        options: &BackendOptions,
    ) -> std::io::Result<Vec<String>> {
        let (host_dir, inner_store) = mount_spec(store, &options.mount_point)?;

        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "-v".to_string(),
            format!("{}:{}", host_dir.display(), options.mount_point),
            "-w".to_string(),
            options.mount_point.clone(),
        ];
        args.extend(options.run_args.iter().cloned());
        args.push(image.to_string());
        args.extend(task.command().split_whitespace().map(str::to_string));
        args.extend(task.forwarded_args());
        args.push(inner_store);
        Ok(args)
    }

    /// Run `image` to completion against the context's store
    pub async fn run_image(image: &str, task: &Task, ctx: &ExecContext) -> Result<TaskOutput, TaskError> {
        let options = ctx.options.clone().unwrap_or_default();
        let failed = |cause: String, stderr: String| TaskError::ContainerRunFailed {
            image: image.to_string(),
            cause,
            stderr,
        };

        let args = Self::run_args(image, task, &ctx.store, &options)
            .map_err(|e| failed(format!("cannot resolve store path: {}", e), String::new()))?;

        let mut cmd = options.engine_command();
        cmd.args(&args);

        let captured = run_captured(cmd, image)
            .await
            .map_err(|failure| failed(failure.cause, failure.stderr))?;

        Ok(TaskOutput {
            stdout: captured.stdout,
        })
    }
}

#[async_trait]
impl Backend for ContainerBackend {
    async fn execute(&self, task: &Task, ctx: &ExecContext) -> Result<TaskOutput, TaskError> {
        let image = task.image.as_deref().unwrap_or("");
        if image.is_empty() {
            return Err(TaskError::ContainerRunFailed {
                image: String::new(),
                cause: "task has no image".to_string(),
                stderr: String::new(),
            });
        }
        Self::run_image(image, task, ctx).await
    }
}

pub struct DockerfileBackend;

impl DockerfileBackend {
    /// Build the recipe and return the image tag
    pub async fn build(dockerfile: &str, options: &BackendOptions) -> Result<String, TaskError> {
        let failed = |cause: String, stderr: String| TaskError::ImageBuildFailed {
            dockerfile: dockerfile.to_string(),
            cause,
            stderr,
        };

        if dockerfile.is_empty() || Path::new(dockerfile).components().count() != 1 {
            return Err(failed(format!("invalid recipe name '{}'", dockerfile), String::new()));
        }

        let context = options.dockerfiles_dir().join(dockerfile);
        if !context.join("Dockerfile").is_file() {
            return Err(failed(
                format!("no Dockerfile in {}", context.display()),
                String::new(),
            ));
        }

        let tag = image_tag(dockerfile);
        log::info!("Building image {} from {}", tag, context.display());

        let mut cmd = options.engine_command();
        cmd.arg("build").arg("-t").arg(&tag).arg(&context);

        run_captured(cmd, &tag)
            .await
            .map_err(|failure| failed(failure.cause, failure.stderr))?;

        Ok(tag)
    }
}

#[async_trait]
impl Backend for DockerfileBackend {
    async fn execute(&self, task: &Task, ctx: &ExecContext) -> Result<TaskOutput, TaskError> {
        let dockerfile = task.dockerfile.as_deref().unwrap_or("");
        let options = ctx.options.clone().unwrap_or_default();
        let tag = Self::build(dockerfile, &options).await?;
        ContainerBackend::run_image(&tag, task, ctx).await
    }
}
