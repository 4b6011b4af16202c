use crate::value::Value;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};

/// Reserved pseudo-input: a connection into it supplies the target's executable body.
pub const BEHAVIOR_INPUT: &str = "source";

/// The canonical, validated form of a dataflow graph.
///
/// Nodes keep their declaration order, which the scheduler uses to break ties.
/// Construct one through [`IntoGraph`](super::IntoGraph) or [`Graph::from_json`];
/// [`Graph::new`] performs the same structural validation on hand-built parts.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<NodeDefinition>,
    connections: Vec<Connection>,
    index: AHashMap<String, usize>,
}

/// A single unit of computation.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDefinition {
    pub id: String,
    pub name: String,
    pub inputs: Vec<InputSpec>,
    pub outputs: Vec<OutputSpec>,
    /// Inline executable body.
    pub source: Option<String>,
    /// External namespace the behavior is resolved from, already normalized.
    pub module: Option<String>,
    pub docstring: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    pub name: String,
    pub default: Option<Value>,
    /// Informational only; values are never type checked.
    pub type_hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub name: String,
    pub type_hint: Option<String>,
}

/// A directed edge from one node's output to another node's input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub from_node: String,
    pub from_output: String,
    pub to_node: String,
    pub to_input: String,
}

impl Connection {
    pub fn new(
        from_node: impl Into<String>,
        from_output: impl Into<String>,
        to_node: impl Into<String>,
        to_input: impl Into<String>,
    ) -> Self {
        Self {
            from_node: from_node.into(),
            from_output: from_output.into(),
            to_node: to_node.into(),
            to_input: to_input.into(),
        }
    }

    /// True when this connection supplies the target's behavior rather than data.
    pub fn supplies_behavior(&self) -> bool {
        self.to_input == BEHAVIOR_INPUT
    }
}

impl InputSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            type_hint: None,
        }
    }

    pub fn with_default(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            default: Some(default.into()),
            type_hint: None,
        }
    }
}

impl OutputSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_hint: None,
        }
    }
}

impl NodeDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            source: None,
            module: None,
            docstring: None,
        }
    }

    pub fn input(mut self, spec: InputSpec) -> Self {
        self.inputs.push(spec);
        self
    }

    pub fn output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(OutputSpec::new(name));
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn module(mut self, module: impl AsRef<str>) -> Self {
        self.module = Some(normalize_module_path(module.as_ref()));
        self
    }

    /// Ordinary data inputs, excluding a declared behavior pseudo-input.
    pub fn data_inputs(&self) -> impl Iterator<Item = &InputSpec> {
        self.inputs.iter().filter(|i| i.name != BEHAVIOR_INPUT)
    }

    pub fn output_names(&self) -> Vec<String> {
        self.outputs.iter().map(|o| o.name.clone()).collect()
    }
}

impl Graph {
    /// Builds a graph, rejecting duplicate ids, dangling connection endpoints and
    /// connections that target an already-connected input.
    pub fn new(
        nodes: Vec<NodeDefinition>,
        connections: Vec<Connection>,
    ) -> Result<Self, crate::error::EngineError> {
        super::validate::validate(nodes, connections)
    }

    pub(super) fn from_validated(
        nodes: Vec<NodeDefinition>,
        connections: Vec<Connection>,
        index: AHashMap<String, usize>,
    ) -> Self {
        Self {
            nodes,
            connections,
            index,
        }
    }

    pub fn nodes(&self) -> &[NodeDefinition] {
        &self.nodes
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&NodeDefinition> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Declaration position of a node.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// The connection feeding `(node, input)`, if any.
    pub fn incoming(&self, node: &str, input: &str) -> Option<&Connection> {
        self.connections
            .iter()
            .find(|c| c.to_node == node && c.to_input == input)
    }
}

/// Strips a `.py` suffix and a leading `./`, then turns path separators into dots.
pub fn normalize_module_path(module_path: &str) -> String {
    let trimmed = module_path.strip_suffix(".py").unwrap_or(module_path);
    let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
    trimmed.replace('/', ".")
}
