//! Per-node input and behavior resolution.
//!
//! The planner walks the graph in dependency order and records, for every node,
//! where each argument comes from and how its behavior is obtained. Both
//! backends consume the resulting [`ExecutionPlan`]; the plan itself never looks
//! at runtime values or at the registry.

mod artifact;

use crate::error::EngineError;
use crate::graph::{BEHAVIOR_INPUT, Graph, NodeDefinition};
use crate::scheduler::DependencyGraph;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Where a single argument's value comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Binding {
    /// The named output of an upstream node.
    Connected { node: String, output: String },
    /// The input's declared default.
    Literal(#[serde(with = "artifact::json_value")] Value),
    /// Neither connected nor defaulted.
    Missing,
}

/// How a node's callable is obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BehaviorSource {
    /// Registry entry keyed by node id.
    Static { key: String },
    /// Body text carried by the node itself.
    Inline { source: String },
    /// Body text produced at run time by an upstream node's output.
    Upstream { node: String, output: String },
    /// A function reached through an external module by qualified name.
    External { module: String, name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedNode {
    pub id: String,
    /// Position in the graph's declaration order.
    pub declared: usize,
    pub name: String,
    pub outputs: Vec<String>,
    pub arguments: Vec<(String, Binding)>,
    pub behavior: BehaviorSource,
    /// Plan positions of the nodes depending on this one, one entry per edge.
    pub successors: Vec<usize>,
    /// Number of incoming dependency edges.
    pub dependency_count: usize,
}

/// A graph resolved into execution order with all bindings decided.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub nodes: Vec<PlannedNode>,
}

impl ExecutionPlan {
    pub fn order(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }
}

impl PlannedNode {
    /// The first argument without a binding, reported as `MissingInput`.
    pub fn check_inputs(&self) -> Result<(), EngineError> {
        match self.arguments.iter().find(|(_, b)| *b == Binding::Missing) {
            Some((input, _)) => Err(EngineError::MissingInput {
                node_id: self.id.clone(),
                node_name: self.name.clone(),
                input: input.clone(),
            }),
            None => Ok(()),
        }
    }

    pub fn unresolved(&self, reason: impl Into<String>) -> EngineError {
        EngineError::UnresolvedBehavior {
            node_id: self.id.clone(),
            node_name: self.name.clone(),
            reason: reason.into(),
        }
    }
}

/// Builds an [`ExecutionPlan`] from a validated graph.
pub struct Planner<'a> {
    graph: &'a Graph,
}

impl<'a> Planner<'a> {
    pub fn new(graph: &'a Graph) -> Self {
        Self { graph }
    }

    pub fn plan(&self) -> Result<ExecutionPlan, EngineError> {
        let deps = DependencyGraph::build(self.graph);
        let order = deps.topological_order(self.graph)?;

        let mut plan_position = vec![0; order.len()];
        for (position, &declared) in order.iter().enumerate() {
            plan_position[declared] = position;
        }

        let nodes = order
            .iter()
            .map(|&declared| {
                let node = &self.graph.nodes()[declared];
                PlannedNode {
                    id: node.id.clone(),
                    declared,
                    name: node.name.clone(),
                    outputs: node.output_names(),
                    arguments: self.resolve_arguments(node),
                    behavior: self.resolve_behavior(node),
                    successors: deps
                        .successors(declared)
                        .iter()
                        .map(|&s| plan_position[s])
                        .collect(),
                    dependency_count: deps.in_degree(declared),
                }
            })
            .collect();

        Ok(ExecutionPlan { nodes })
    }

    fn resolve_arguments(&self, node: &NodeDefinition) -> Vec<(String, Binding)> {
        node.data_inputs()
            .map(|input| {
                let binding = match self.graph.incoming(&node.id, &input.name) {
                    Some(conn) => Binding::Connected {
                        node: conn.from_node.clone(),
                        output: conn.from_output.clone(),
                    },
                    None => match &input.default {
                        Some(value) => Binding::Literal(value.clone()),
                        None => Binding::Missing,
                    },
                };
                (input.name.clone(), binding)
            })
            .collect()
    }

    fn resolve_behavior(&self, node: &NodeDefinition) -> BehaviorSource {
        if let Some(module) = &node.module {
            return BehaviorSource::External {
                module: module.clone(),
                name: node.name.clone(),
            };
        }
        if let Some(source) = &node.source {
            return BehaviorSource::Inline {
                source: source.clone(),
            };
        }
        if let Some(conn) = self.graph.incoming(&node.id, BEHAVIOR_INPUT) {
            return BehaviorSource::Upstream {
                node: conn.from_node.clone(),
                output: conn.from_output.clone(),
            };
        }
        BehaviorSource::Static {
            key: node.id.clone(),
        }
    }
}
