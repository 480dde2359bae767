//! Dependency graph - validates task requirements and computes execution order

use super::task::Task;
use crate::error::WorkflowError;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Validated task DAG.
///
/// Nodes live in an arena indexed by position in name-sorted order; edges
/// are index lists, so nothing here holds references into the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graph {
    names: Vec<String>,
    index: HashMap<String, usize>,
    /// node -> nodes it requires
    predecessors: Vec<Vec<usize>>,
    /// node -> nodes requiring it
    successors: Vec<Vec<usize>>,
    order: Vec<usize>,
}

impl Graph {
    /// Build and validate the graph for a task map
    pub fn build(tasks: &HashMap<String, Task>) -> Result<Self, WorkflowError> {
        let mut names: Vec<String> = tasks.keys().cloned().collect();
        names.sort();

        let index: HashMap<String, usize> = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();

        let mut predecessors = vec![Vec::new(); names.len()];
        let mut successors = vec![Vec::new(); names.len()];

        for (node, name) in names.iter().enumerate() {
            let task = &tasks[name];
            for dep in &task.requires {
                let Some(&dep_node) = index.get(dep) else {
                    return Err(WorkflowError::UnknownDependency {
                        task: name.clone(),
                        dependency: dep.clone(),
                    });
                };
                // Repeated entries in `requires` collapse into one edge
                if !predecessors[node].contains(&dep_node) {
                    predecessors[node].push(dep_node);
                    successors[dep_node].push(node);
                }
            }
        }

        for list in predecessors.iter_mut().chain(successors.iter_mut()) {
            list.sort_unstable();
        }

        let mut graph = Self {
            names,
            index,
            predecessors,
            successors,
            order: Vec::new(),
        };
        graph.order = graph.topological_order()?;
        Ok(graph)
    }

    /// Kahn's algorithm; ties broken by task name (node index is name rank)
    fn topological_order(&self) -> Result<Vec<usize>, WorkflowError> {
        let mut in_degree: Vec<usize> = self.predecessors.iter().map(Vec::len).collect();
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &degree)| degree == 0)
            .map(|(node, _)| Reverse(node))
            .collect();

        let mut order = Vec::with_capacity(self.names.len());
        while let Some(Reverse(node)) = ready.pop() {
            order.push(node);
            for &next in &self.successors[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if order.len() != self.names.len() {
            let remaining: Vec<usize> = (0..self.names.len())
                .filter(|&node| in_degree[node] > 0)
                .collect();
            let node = self.node_on_cycle(&remaining);
            return Err(WorkflowError::CyclicDependency {
                task: self.names[node].clone(),
            });
        }

        Ok(order)
    }

    /// Pick a node that actually sits on a cycle.
    ///
    /// Nodes left over by Kahn's algorithm are either on a cycle or
    /// downstream of one. Walking predecessors inside the leftover set
    /// must eventually revisit a node, and that node is on the cycle.
    fn node_on_cycle(&self, remaining: &[usize]) -> usize {
        let mut leftover = vec![false; self.names.len()];
        for &node in remaining {
            leftover[node] = true;
        }

        let mut seen = vec![false; self.names.len()];
        let mut current = remaining[0];
        loop {
            if seen[current] {
                return current;
            }
            seen[current] = true;
            match self.predecessors[current].iter().find(|&&p| leftover[p]) {
                Some(&prev) => current = prev,
                None => return current,
            }
        }
    }

    /// Number of tasks
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Task name of a node
    pub fn name(&self, node: usize) -> &str {
        &self.names[node]
    }

    /// Node index of a task name
    pub fn node(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn predecessors(&self, node: usize) -> &[usize] {
        &self.predecessors[node]
    }

    pub fn successors(&self, node: usize) -> &[usize] {
        &self.successors[node]
    }

    /// Execution order as node indices
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Execution order as task names
    pub fn ordered_names(&self) -> Vec<&str> {
        self.order.iter().map(|&node| self.name(node)).collect()
    }

    /// Group the order into levels: every task sits one level below its
    /// deepest predecessor. Tasks sharing a level never depend on each other.
    pub fn levels(&self) -> Vec<Vec<&str>> {
        let mut depth = vec![0usize; self.names.len()];
        let mut levels: Vec<Vec<&str>> = Vec::new();

        for &node in &self.order {
            let level = self.predecessors[node]
                .iter()
                .map(|&p| depth[p] + 1)
                .max()
                .unwrap_or(0);
            depth[node] = level;
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(self.name(node));
        }

        levels
    }
}
