use super::definition::{
    Connection, Graph, InputSpec, NodeDefinition, OutputSpec, normalize_module_path,
};
use crate::error::EngineError;
use crate::value::Value;
use serde::Deserialize;

/// A trait for custom data models that can be converted into a [`Graph`].
///
/// This is the extension point for feeding graphs from formats other than the
/// bundled JSON description. Implement it on your own structs and hand the
/// result to [`Engine`](crate::engine::Engine).
///
/// # Example
///
/// ```rust
/// use nagare::error::EngineError;
/// use nagare::graph::{Connection, Graph, InputSpec, IntoGraph, NodeDefinition};
///
/// struct Pipeline {
///     steps: Vec<&'static str>,
/// }
///
/// impl IntoGraph for Pipeline {
///     fn into_graph(self) -> Result<Graph, EngineError> {
///         let nodes = self
///             .steps
///             .iter()
///             .map(|s| {
///                 NodeDefinition::new(*s, *s)
///                     .input(InputSpec::with_default("v", 0i64))
///                     .output("v")
///             })
///             .collect();
///         let connections = self
///             .steps
///             .windows(2)
///             .map(|w| Connection::new(w[0], "v", w[1], "v"))
///             .collect();
///         Graph::new(nodes, connections)
///     }
/// }
///
/// let graph = Pipeline { steps: vec!["load", "clean", "plot"] }.into_graph().unwrap();
/// assert_eq!(graph.len(), 3);
/// ```
pub trait IntoGraph {
    fn into_graph(self) -> Result<Graph, EngineError>;
}

impl IntoGraph for Graph {
    fn into_graph(self) -> Result<Graph, EngineError> {
        Ok(self)
    }
}

/// The serialized graph description, as produced by the editor front end.
///
/// Required fields are optional here so that their absence surfaces as a
/// `MalformedGraph` naming the node and field rather than a bare serde message.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphDescription {
    pub nodes: Option<Vec<RawNode>>,
    #[serde(default)]
    pub connections: Vec<RawConnection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawNode {
    pub id: Option<RawId>,
    pub name: Option<String>,
    #[serde(default)]
    pub inputs: Vec<RawInput>,
    pub outputs: Option<Vec<RawOutput>>,
    pub source: Option<String>,
    pub module: Option<String>,
    pub docstring: Option<String>,
}

/// Node ids arrive as strings from the editor, but hand-written files often use numbers.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawInput {
    pub name: Option<String>,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(rename = "type")]
    pub type_hint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawOutput {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub type_hint: Option<String>,
}

/// Either the nested `{"from": {...}, "to": {...}}` form or the flat form.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawConnection {
    Nested {
        from: RawEndpoint,
        to: RawEndpoint,
    },
    Flat {
        #[serde(alias = "fromNode")]
        from_node: Option<RawId>,
        #[serde(alias = "fromOutput")]
        from_output: Option<String>,
        #[serde(alias = "toNode")]
        to_node: Option<RawId>,
        #[serde(alias = "toInput")]
        to_input: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawEndpoint {
    pub node: Option<RawId>,
    pub output: Option<String>,
    pub input: Option<String>,
}

impl GraphDescription {
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json)
            .map_err(|e| EngineError::malformed(None, "description", e.to_string()))
    }
}

impl Graph {
    /// Parses and validates a JSON graph description.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        GraphDescription::from_json(json)?.into_graph()
    }
}

impl IntoGraph for GraphDescription {
    fn into_graph(self) -> Result<Graph, EngineError> {
        let raw_nodes = self
            .nodes
            .ok_or_else(|| EngineError::malformed(None, "nodes", "description has no node list"))?;

        let nodes = raw_nodes
            .into_iter()
            .enumerate()
            .map(|(position, raw)| convert_node(position, raw))
            .collect::<Result<Vec<_>, _>>()?;

        let connections = self
            .connections
            .into_iter()
            .enumerate()
            .map(|(position, raw)| convert_connection(position, raw))
            .collect::<Result<Vec<_>, _>>()?;

        Graph::new(nodes, connections)
    }
}

fn convert_node(position: usize, raw: RawNode) -> Result<NodeDefinition, EngineError> {
    let id = raw.id.map(RawId::into_string).ok_or_else(|| {
        EngineError::malformed(None, "id", format!("node #{} has no id", position))
    })?;
    let raw_outputs = raw
        .outputs
        .ok_or_else(|| EngineError::malformed(Some(&id), "outputs", "node has no outputs list"))?;

    let inputs = raw
        .inputs
        .into_iter()
        .map(|input| {
            let name = input.name.ok_or_else(|| {
                EngineError::malformed(Some(&id), "inputs[].name", "input has no name")
            })?;
            Ok(InputSpec {
                name,
                // `null` is how the editor spells "no default".
                default: input.default.filter(|d| !d.is_null()).map(Value::from),
                type_hint: input.type_hint,
            })
        })
        .collect::<Result<Vec<_>, EngineError>>()?;

    let outputs = raw_outputs
        .into_iter()
        .map(|output| {
            let name = output.name.ok_or_else(|| {
                EngineError::malformed(Some(&id), "outputs[].name", "output has no name")
            })?;
            Ok(OutputSpec {
                name,
                type_hint: output.type_hint,
            })
        })
        .collect::<Result<Vec<_>, EngineError>>()?;

    Ok(NodeDefinition {
        name: raw.name.unwrap_or_else(|| id.clone()),
        id,
        inputs,
        outputs,
        source: raw.source,
        module: raw.module.as_deref().map(normalize_module_path),
        docstring: raw.docstring,
    })
}

fn convert_connection(position: usize, raw: RawConnection) -> Result<Connection, EngineError> {
    let (from_node, from_output, to_node, to_input) = match raw {
        RawConnection::Nested { from, to } => (from.node, from.output, to.node, to.input),
        RawConnection::Flat {
            from_node,
            from_output,
            to_node,
            to_input,
        } => (from_node, from_output, to_node, to_input),
    };

    let missing = |field: &str| {
        EngineError::malformed(
            None,
            field,
            format!("connection #{} is missing '{}'", position, field),
        )
    };

    Ok(Connection {
        from_node: from_node.map(RawId::into_string).ok_or_else(|| missing("fromNode"))?,
        from_output: from_output.ok_or_else(|| missing("fromOutput"))?,
        to_node: to_node.map(RawId::into_string).ok_or_else(|| missing("toNode"))?,
        to_input: to_input.ok_or_else(|| missing("toInput"))?,
    })
}
