//! Task model - the declarative unit of work

use crate::error::TaskError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Backend variant of a task, parsed from its `type` string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Plugin,
    Script,
    Docker,
    Dockerfile,
}

impl FromStr for TaskKind {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plugin" => Ok(Self::Plugin),
            "script" => Ok(Self::Script),
            "docker" => Ok(Self::Docker),
            "dockerfile" => Ok(Self::Dockerfile),
            other => Err(TaskError::UnknownTaskType(other.to_string())),
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plugin => write!(f, "plugin"),
            Self::Script => write!(f, "script"),
            Self::Docker => write!(f, "docker"),
            Self::Dockerfile => write!(f, "dockerfile"),
        }
    }
}

/// A single task declaration.
///
/// The `type` string is kept verbatim so that workflows with an unknown
/// type still load; the mismatch surfaces as a task failure at run time.
/// Keys other than the known fields are collected into `arguments` and
/// forwarded to external backends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "type", default)]
    pub task_type: String,
    pub command: Option<String>,
    pub image: Option<String>,
    pub dockerfile: Option<String>,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(flatten)]
    pub arguments: BTreeMap<String, serde_yaml::Value>,
}

impl Task {
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            ..Self::default()
        }
    }

    /// Plugin task resolved against the registry or plugin directory
    pub fn plugin(command: impl Into<String>) -> Self {
        Self::new("plugin").with_command(command)
    }

    pub fn script(command: impl Into<String>) -> Self {
        Self::new("script").with_command(command)
    }

    pub fn docker(image: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            image: Some(image.into()),
            ..Self::new("docker")
        }
        .with_command(command)
    }

    pub fn dockerfile(recipe: impl Into<String>) -> Self {
        Self {
            dockerfile: Some(recipe.into()),
            ..Self::new("dockerfile")
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn requires<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<serde_yaml::Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    /// Resolve the backend variant
    pub fn kind(&self) -> Result<TaskKind, TaskError> {
        self.task_type.parse()
    }

    /// Command or empty string
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or("")
    }

    /// Render the extra arguments as command line flags.
    ///
    /// Keys come out in sorted order. Sequences repeat the flag, mappings
    /// become `k=v` pairs joined by commas, `true` is a bare flag and
    /// `false`/null are dropped.
    pub fn forwarded_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for (key, value) in &self.arguments {
            push_flag(&mut args, key, value);
        }
        args
    }
}

fn push_flag(args: &mut Vec<String>, key: &str, value: &serde_yaml::Value) {
    use serde_yaml::Value;

    match value {
        Value::Null | Value::Bool(false) => {}
        Value::Bool(true) => args.push(format!("--{}", key)),
        Value::Sequence(items) => {
            for item in items {
                push_flag(args, key, item);
            }
        }
        Value::Tagged(tagged) => push_flag(args, key, &tagged.value),
        other => {
            if let Some(rendered) = render_scalar_or_map(other) {
                args.push(format!("--{}={}", key, rendered));
            }
        }
    }
}

fn render_scalar_or_map(value: &serde_yaml::Value) -> Option<String> {
    use serde_yaml::Value;

    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Mapping(map) => {
            let pairs: Vec<String> = map
                .iter()
                .filter_map(|(k, v)| {
                    let k = render_scalar_or_map(k)?;
                    let v = render_scalar_or_map(v)?;
                    Some(format!("{}={}", k, v))
                })
                .collect();
            Some(pairs.join(","))
        }
        Value::Tagged(tagged) => render_scalar_or_map(&tagged.value),
        Value::Null | Value::Sequence(_) => None,
    }
}
