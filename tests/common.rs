//! Common test utilities for building graphs and registries.
use nagare::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A (no inputs, output `x`, static behavior) feeding B (inline `double(v)`).
#[allow(dead_code)]
pub const AB_GRAPH_JSON: &str = r#"{
    "nodes": [
        { "id": "A", "name": "five", "inputs": [], "outputs": [{ "name": "x", "type": "int" }] },
        {
            "id": "B",
            "name": "double",
            "inputs": [{ "name": "v", "default": null }],
            "outputs": [{ "name": "result" }],
            "source": "def double(v):\n    return v * 2\n"
        }
    ],
    "connections": [
        { "from": { "node": "A", "output": "x" }, "to": { "node": "B", "input": "v" } }
    ]
}"#;

/// The A/B graph, built through the JSON description.
#[allow(dead_code)]
pub fn ab_graph() -> Graph {
    Graph::from_json(AB_GRAPH_JSON).expect("A/B description is valid")
}

/// A registry where static node `A` returns 5.
#[allow(dead_code)]
pub fn ab_registry() -> Registry {
    Registry::new().with("A", |_: &Arguments| Ok(Value::Int(5)))
}

#[allow(dead_code)]
pub fn ab_engine() -> Engine {
    Engine::builder().with_registry(ab_registry()).build()
}

/// A node with inline source and a single output `out`.
#[allow(dead_code)]
pub fn inline_node(id: &str, name: &str, params: &[&str], body: &str) -> NodeDefinition {
    let source = format!("def {}({}):\n    return {}\n", name, params.join(", "), body);
    params
        .iter()
        .fold(NodeDefinition::new(id, name), |node, p| node.input(InputSpec::new(*p)))
        .output("out")
        .source(source)
}

/// `n0 -> n1 -> ... -> n{len-1}`, each node adding one to its input.
#[allow(dead_code)]
pub fn chain_graph(len: usize) -> Graph {
    let mut nodes = vec![inline_node("n0", "start", &[], "0")];
    let mut connections = Vec::new();
    for i in 1..len {
        nodes.push(inline_node(&format!("n{}", i), "inc", &["v"], "v + 1"));
        connections.push(Connection::new(format!("n{}", i - 1), "out", format!("n{}", i), "v"));
    }
    Graph::new(nodes, connections).expect("chain is valid")
}

/// Root `r` fanning out to `w` branches, all joined by a summing sink `s`.
#[allow(dead_code)]
pub fn fan_graph(width: usize) -> Graph {
    let mut nodes = vec![inline_node("r", "root", &[], "1")];
    let mut connections = Vec::new();
    let params: Vec<String> = (0..width).map(|i| format!("v{}", i)).collect();
    for i in 0..width {
        let id = format!("b{}", i);
        let name = format!("branch{}", i);
        nodes.push(inline_node(&id, &name, &["v"], &format!("v * {}", i + 1)));
        connections.push(Connection::new("r", "out", id.clone(), "v"));
        connections.push(Connection::new(id, "out", "s", params[i].clone()));
    }
    let param_refs: Vec<&str> = params.iter().map(String::as_str).collect();
    nodes.push(inline_node("s", "sink", &param_refs, &params.join(" + ")));
    Graph::new(nodes, connections).expect("fan graph is valid")
}

/// Wraps a behavior and counts its invocations.
#[allow(dead_code)]
pub fn counting(
    counter: &Arc<AtomicUsize>,
    result: Value,
) -> impl Fn(&Arguments) -> std::result::Result<Value, BehaviorError> + Send + Sync + 'static {
    let counter = Arc::clone(counter);
    move |_: &Arguments| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(result.clone())
    }
}

/// A deterministic pseudo-random DAG: node `i` may only read from nodes `< i`,
/// but nodes are declared in a shuffled order.
#[allow(dead_code)]
pub fn pseudo_random_dag(size: usize, seed: u64) -> Graph {
    let mut state = seed;
    let mut next = move || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (state >> 33) as usize
    };

    let mut declared: Vec<usize> = (0..size).collect();
    for i in (1..size).rev() {
        declared.swap(i, next() % (i + 1));
    }

    let mut connections = Vec::new();
    let mut inputs: Vec<Vec<String>> = vec![Vec::new(); size];
    for to in 1..size {
        for slot in 0..(next() % 3) {
            let from = next() % to;
            let input = format!("in{}", slot);
            connections.push(Connection::new(
                format!("d{}", from),
                "out",
                format!("d{}", to),
                input.clone(),
            ));
            inputs[to].push(input);
        }
    }

    let nodes = declared
        .iter()
        .map(|&i| {
            let params: Vec<&str> = inputs[i].iter().map(String::as_str).collect();
            inline_node(&format!("d{}", i), "step", &params, "1")
        })
        .collect();
    Graph::new(nodes, connections).expect("pseudo-random DAG is valid")
}
