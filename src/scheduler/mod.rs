//! Dependency resolution: Kahn's algorithm over the graph's connections.
//!
//! Every connection is a dependency edge, including those that feed a node's
//! behavior pseudo-input. A node whose body is produced by another node must not
//! run before its producer, so both kinds of edge count toward in-degree.

use crate::error::EngineError;
use crate::graph::Graph;
use std::collections::VecDeque;
use tracing::debug;

/// Scheduling state of a single node. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Unvisited,
    Ready,
    Processed,
}

/// Adjacency and in-degree counts, indexed by declaration position.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    successors: Vec<Vec<usize>>,
    in_degree: Vec<usize>,
}

impl DependencyGraph {
    pub fn build(graph: &Graph) -> Self {
        let mut successors = vec![Vec::new(); graph.len()];
        let mut in_degree = vec![0; graph.len()];

        for conn in graph.connections() {
            // Endpoints were validated when the graph was built.
            if let (Some(from), Some(to)) =
                (graph.position(&conn.from_node), graph.position(&conn.to_node))
            {
                successors[from].push(to);
                in_degree[to] += 1;
            }
        }

        Self {
            successors,
            in_degree,
        }
    }

    pub fn len(&self) -> usize {
        self.in_degree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_degree.is_empty()
    }

    pub fn successors(&self, node: usize) -> &[usize] {
        &self.successors[node]
    }

    pub fn in_degree(&self, node: usize) -> usize {
        self.in_degree[node]
    }

    /// Computes a total order over declaration positions, failing on cycles.
    pub fn topological_order(&self, graph: &Graph) -> Result<Vec<usize>, EngineError> {
        let mut queue = ReadyQueue::new(self);
        let mut order = Vec::with_capacity(self.len());

        while let Some(node) = queue.pop() {
            debug!(node_id = %graph.nodes()[node].id, "scheduled");
            order.push(node);
            queue.complete(node);
        }

        if order.len() < self.len() {
            let nodes = queue
                .unprocessed()
                .map(|i| graph.nodes()[i].id.clone())
                .collect();
            return Err(EngineError::CycleDetected { nodes });
        }
        Ok(order)
    }
}

/// The sequential ready queue driving the `Unvisited -> Ready -> Processed` machine.
///
/// Nodes that become ready in the same step are enqueued in declaration order,
/// which makes the resulting order deterministic.
pub struct ReadyQueue<'a> {
    deps: &'a DependencyGraph,
    remaining: Vec<usize>,
    states: Vec<NodeState>,
    queue: VecDeque<usize>,
}

impl<'a> ReadyQueue<'a> {
    pub fn new(deps: &'a DependencyGraph) -> Self {
        let remaining = deps.in_degree.clone();
        let mut states = vec![NodeState::Unvisited; deps.len()];
        let mut queue = VecDeque::new();
        for (node, &degree) in remaining.iter().enumerate() {
            if degree == 0 {
                states[node] = NodeState::Ready;
                queue.push_back(node);
            }
        }
        Self {
            deps,
            remaining,
            states,
            queue,
        }
    }

    pub fn pop(&mut self) -> Option<usize> {
        self.queue.pop_front()
    }

    /// Marks `node` processed and releases successors whose count reaches zero.
    pub fn complete(&mut self, node: usize) {
        debug_assert_eq!(self.states[node], NodeState::Ready);
        self.states[node] = NodeState::Processed;

        let mut released = Vec::new();
        for &next in self.deps.successors(node) {
            self.remaining[next] -= 1;
            if self.remaining[next] == 0 && self.states[next] == NodeState::Unvisited {
                self.states[next] = NodeState::Ready;
                released.push(next);
            }
        }
        released.sort_unstable();
        self.queue.extend(released);
    }

    pub fn state(&self, node: usize) -> NodeState {
        self.states[node]
    }

    /// Nodes that never reached `Processed`.
    pub fn unprocessed(&self) -> impl Iterator<Item = usize> + '_ {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, s)| **s != NodeState::Processed)
            .map(|(i, _)| i)
    }
}
