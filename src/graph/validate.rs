use super::definition::{Connection, Graph, NodeDefinition};
use crate::error::EngineError;
use ahash::{AHashMap, AHashSet};
use tracing::warn;

pub(super) fn validate(
    nodes: Vec<NodeDefinition>,
    connections: Vec<Connection>,
) -> Result<Graph, EngineError> {
    let mut index = AHashMap::with_capacity(nodes.len());
    for (position, node) in nodes.iter().enumerate() {
        if node.id.is_empty() {
            return Err(EngineError::malformed(None, "id", "node id is empty"));
        }
        if index.insert(node.id.clone(), position).is_some() {
            return Err(EngineError::malformed(
                Some(&node.id),
                "id",
                "node id is declared more than once",
            ));
        }
    }

    let mut targets: AHashSet<(&str, &str)> = AHashSet::with_capacity(connections.len());
    for conn in &connections {
        for endpoint in [&conn.from_node, &conn.to_node] {
            if !index.contains_key(endpoint.as_str()) {
                return Err(EngineError::malformed(
                    Some(endpoint),
                    "connections",
                    format!(
                        "connection {}.{} -> {}.{} references an unknown node",
                        conn.from_node, conn.from_output, conn.to_node, conn.to_input
                    ),
                ));
            }
        }
        if !targets.insert((conn.to_node.as_str(), conn.to_input.as_str())) {
            return Err(EngineError::malformed(
                Some(&conn.to_node),
                "connections",
                format!("input '{}' is targeted by more than one connection", conn.to_input),
            ));
        }

        let target = &nodes[index[conn.to_node.as_str()]];
        if !conn.supplies_behavior() && !target.inputs.iter().any(|i| i.name == conn.to_input) {
            warn!(
                node_id = %target.id,
                input = %conn.to_input,
                "connection targets an undeclared input; keeping it as a dependency only"
            );
        }
    }

    Ok(Graph::from_validated(nodes, connections, index))
}
