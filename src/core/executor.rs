//! Task Runner - drives the scheduler and runs each task on its own tokio task
//!
//! The coordinating loop owns the scheduler and the outcome map. Every
//! launched task reports back exactly once through its join handle, so
//! outcome slots have a single writer.

use super::result::{TaskOutcome, WorkflowResult};
use super::scheduler::{Scheduler, Step};
use super::{Graph, Task};
use crate::backend::{self, ExecContext, TaskOutput};
use crate::error::TaskError;
use chrono::Utc;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

/// Task execution event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    Started { task_id: String },
    Completed { task_id: String },
    Failed { task_id: String, error: String },
    Skipped { task_id: String, dependency: String },
}

/// Runs a validated graph against one store
pub struct Runner {
    ctx: Arc<ExecContext>,
    max_parallel: Option<usize>,
    event_tx: Option<mpsc::UnboundedSender<TaskEvent>>,
}

impl Runner {
    pub fn new(ctx: ExecContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            max_parallel: None,
            event_tx: None,
        }
    }

    /// Cap the number of tasks executing at once
    pub fn with_max_parallel(mut self, max: Option<usize>) -> Self {
        self.max_parallel = max.map(|m| m.max(1));
        self
    }

    /// Create an event channel and return its receiving end
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<TaskEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.event_tx = Some(tx);
        rx
    }

    pub fn context(&self) -> &ExecContext {
        &self.ctx
    }

    fn emit(&self, event: TaskEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// Execute every task of `graph` once, in dependency order.
    ///
    /// `graph` must have been built from `tasks`; [`Workflow::run_with`]
    /// guarantees that. Never fails as a whole: task errors end up in the
    /// returned outcomes.
    ///
    /// [`Workflow::run_with`]: super::Workflow::run_with
    pub(crate) async fn run(&self, graph: &Graph, tasks: &HashMap<String, Task>) -> WorkflowResult {
        let mut result = WorkflowResult {
            started: Some(Utc::now()),
            ..WorkflowResult::default()
        };
        let mut scheduler = Scheduler::new(graph);
        let permits = self.max_parallel.map(|max| Arc::new(Semaphore::new(max)));
        let mut in_flight = FuturesUnordered::new();

        log::info!(
            "Running {} tasks against {}",
            graph.len(),
            self.ctx.store
        );

        loop {
            for step in scheduler.schedule_next() {
                match step {
                    Step::Launch(node) => {
                        let name = graph.name(node).to_string();
                        let task = tasks[&name].clone();
                        scheduler.mark_started(node);
                        in_flight.push(self.launch(node, name, task, permits.clone()));
                    }
                    Step::Skip { node, dependency } => {
                        let name = graph.name(node).to_string();
                        let dependency = graph.name(dependency).to_string();
                        log::warn!("Skipping {}: dependency {} failed", name, dependency);
                        self.emit(TaskEvent::Skipped {
                            task_id: name.clone(),
                            dependency: dependency.clone(),
                        });
                        result.outcomes.insert(
                            name,
                            TaskOutcome {
                                result: Err(TaskError::DependencyFailed { dependency }),
                                started: None,
                                ended: Utc::now(),
                            },
                        );
                    }
                }
            }

            let Some((node, outcome)) = in_flight.next().await else {
                break;
            };

            let name = graph.name(node).to_string();
            match &outcome.result {
                Ok(_) => {
                    log::info!("Task {} completed", name);
                    scheduler.mark_done(node);
                    self.emit(TaskEvent::Completed {
                        task_id: name.clone(),
                    });
                }
                Err(e) => {
                    log::warn!("Task {} failed: {}", name, e);
                    scheduler.mark_failed(node);
                    self.emit(TaskEvent::Failed {
                        task_id: name.clone(),
                        error: e.to_string(),
                    });
                }
            }
            result.outcomes.insert(name, outcome);
        }

        debug_assert!(scheduler.all_done());
        result.ended = Some(Utc::now());
        result
    }

    /// Spawn one task; resolves to its node and outcome
    fn launch(
        &self,
        node: usize,
        name: String,
        task: Task,
        permits: Option<Arc<Semaphore>>,
    ) -> impl std::future::Future<Output = (usize, TaskOutcome)> {
        let ctx = self.ctx.clone();
        let event_tx = self.event_tx.clone();

        let handle = tokio::spawn(async move {
            let _permit = match permits {
                Some(sem) => sem.acquire_owned().await.ok(),
                None => None,
            };

            let started = Utc::now();
            log::info!("Starting task: {} ({})", name, task.task_type);
            if let Some(tx) = &event_tx {
                let _ = tx.send(TaskEvent::Started {
                    task_id: name.clone(),
                });
            }

            let result: Result<TaskOutput, TaskError> = backend::dispatch(&task, &ctx).await;
            TaskOutcome {
                result,
                started: Some(started),
                ended: Utc::now(),
            }
        });

        async move {
            let outcome = handle.await.unwrap_or_else(|e| TaskOutcome {
                result: Err(TaskError::Panicked(e.to_string())),
                started: None,
                ended: Utc::now(),
            });
            (node, outcome)
        }
    }
}
