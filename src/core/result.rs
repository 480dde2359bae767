//! Workflow result - per-task outcomes of one run

use crate::backend::TaskOutput;
use crate::error::{TaskError, WorkflowError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Terminal status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Done,
    Failed,
    Skipped,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Outcome of a single task
#[derive(Debug)]
pub struct TaskOutcome {
    pub result: Result<TaskOutput, TaskError>,
    /// None when the task was skipped
    pub started: Option<DateTime<Utc>>,
    pub ended: DateTime<Utc>,
}

impl TaskOutcome {
    pub fn status(&self) -> TaskStatus {
        match &self.result {
            Ok(_) => TaskStatus::Done,
            Err(e) if e.is_dependency_failure() => TaskStatus::Skipped,
            Err(_) => TaskStatus::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&TaskError> {
        self.result.as_ref().err()
    }

    pub fn output(&self) -> Option<&TaskOutput> {
        self.result.as_ref().ok()
    }
}

/// Outcomes of every task in a run, keyed by task name
#[derive(Debug, Default)]
pub struct WorkflowResult {
    pub outcomes: BTreeMap<String, TaskOutcome>,
    pub started: Option<DateTime<Utc>>,
    pub ended: Option<DateTime<Utc>>,
}

/// Serializable view of one task, for reports
#[derive(Debug, Serialize)]
pub struct TaskReport<'a> {
    pub task: &'a str,
    pub status: TaskStatus,
    pub started: Option<DateTime<Utc>>,
    pub ended: DateTime<Utc>,
    pub error: Option<String>,
    pub output_bytes: usize,
}

impl WorkflowResult {
    pub fn get(&self, task: &str) -> Option<&TaskOutcome> {
        self.outcomes.get(task)
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.values().all(TaskOutcome::is_success)
    }

    /// Names of tasks that failed or were skipped
    pub fn failed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| !o.is_success())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Aggregate error if any task failed or was skipped
    pub fn error(&self) -> Option<WorkflowError> {
        let details: Vec<String> = self
            .outcomes
            .iter()
            .filter_map(|(name, o)| o.error().map(|e| format!("{}: {}", name, e)))
            .collect();

        if details.is_empty() {
            return None;
        }

        Some(WorkflowError::TasksFailed {
            failed: details.len(),
            total: self.outcomes.len(),
            details: details.join("; "),
        })
    }

    /// `Err` with the aggregate error if any task did not succeed
    pub fn check(&self) -> Result<(), WorkflowError> {
        match self.error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn report(&self) -> Vec<TaskReport<'_>> {
        self.outcomes
            .iter()
            .map(|(name, o)| TaskReport {
                task: name,
                status: o.status(),
                started: o.started,
                ended: o.ended,
                error: o.error().map(|e| e.to_string()),
                output_bytes: o.output().map(|out| out.stdout.len()).unwrap_or(0),
            })
            .collect()
    }
}
