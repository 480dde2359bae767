//! Task Scheduler - dependency-aware readiness tracking
//!
//! Owns no futures; the runner asks it what to launch next and reports
//! terminal states back.

use super::Graph;
use std::collections::HashSet;

/// Lifecycle of a node during one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Pending,
    Running,
    Done,
    Failed,
    /// Never executed because a predecessor failed
    Skipped,
}

impl NodeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Skipped)
    }

    fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Skipped)
    }
}

/// Scheduling decision for one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// All predecessors succeeded
    Launch(usize),
    /// A predecessor failed; `dependency` is the first failed one by name
    Skip { node: usize, dependency: usize },
}

/// Task scheduler with dependency resolution
pub struct Scheduler<'g> {
    graph: &'g Graph,
    states: Vec<NodeState>,
    running: HashSet<usize>,
}

impl<'g> Scheduler<'g> {
    /// Create a new scheduler from graph
    pub fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            states: vec![NodeState::Pending; graph.len()],
            running: HashSet::new(),
        }
    }

    /// Decide every pending node whose predecessors are all terminal.
    ///
    /// Walks in topological order so a skip cascades down a chain within
    /// one call. Skips are applied immediately; launches must be confirmed
    /// with [`Scheduler::mark_started`].
    pub fn schedule_next(&mut self) -> Vec<Step> {
        let mut steps = Vec::new();

        for &node in self.graph.order() {
            if self.states[node] != NodeState::Pending {
                continue;
            }

            let preds = self.graph.predecessors(node);
            if !preds.iter().all(|&p| self.states[p].is_terminal()) {
                continue;
            }

            match preds.iter().find(|&&p| self.states[p].is_failure()) {
                Some(&dependency) => {
                    self.states[node] = NodeState::Skipped;
                    steps.push(Step::Skip { node, dependency });
                }
                None => steps.push(Step::Launch(node)),
            }
        }

        steps
    }

    /// Mark node as started
    pub fn mark_started(&mut self, node: usize) {
        self.states[node] = NodeState::Running;
        self.running.insert(node);
    }

    /// Mark node as completed
    pub fn mark_done(&mut self, node: usize) {
        self.states[node] = NodeState::Done;
        self.running.remove(&node);
    }

    /// Mark node as failed
    pub fn mark_failed(&mut self, node: usize) {
        self.states[node] = NodeState::Failed;
        self.running.remove(&node);
    }

    pub fn state(&self, node: usize) -> NodeState {
        self.states[node]
    }

    /// Currently running nodes
    pub fn running(&self) -> usize {
        self.running.len()
    }

    /// Check if every node reached a terminal state
    pub fn all_done(&self) -> bool {
        self.running.is_empty() && self.states.iter().all(|s| s.is_terminal())
    }
}
