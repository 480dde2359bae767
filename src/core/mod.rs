//! Core engine - task model, graph validation, scheduling and the run loop

mod executor;
mod graph;
mod result;
mod scheduler;
mod task;
mod workflow;

pub use executor::{Runner, TaskEvent};
pub use graph::Graph;
pub use result::{TaskOutcome, TaskReport, TaskStatus, WorkflowResult};
pub use scheduler::{NodeState, Scheduler, Step};
pub use task::{Task, TaskKind};
pub use workflow::Workflow;
