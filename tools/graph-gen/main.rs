use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Value, json};
use std::fs;

/// A CLI tool to generate random layered graph descriptions for nagare
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// The path to write the generated JSON file to
    #[arg(short, long, default_value = "generated_graph.json")]
    output: String,

    /// Number of layers; every node only reads from earlier layers
    #[arg(long, default_value_t = 5)]
    layers: usize,

    /// Nodes per layer
    #[arg(long, default_value_t = 8)]
    width: usize,

    /// Maximum number of inputs per node
    #[arg(long, default_value_t = 3)]
    fan_in: usize,

    /// Seed for reproducible output
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.layers == 0 || cli.width == 0 {
        eprintln!("Error: --layers and --width must both be at least 1");
        std::process::exit(1);
    }

    let mut rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    };

    println!(
        "Generating a {}x{} layered graph (fan-in up to {})...",
        cli.layers, cli.width, cli.fan_in
    );

    let mut nodes = Vec::new();
    let mut connections = Vec::new();
    for layer in 0..cli.layers {
        for slot in 0..cli.width {
            let id = format!("n{}_{}", layer, slot);
            if layer == 0 {
                nodes.push(source_node(&id, &mut rng));
            } else {
                let (node, edges) = compute_node(&id, layer, cli.width, cli.fan_in, &mut rng);
                nodes.push(node);
                connections.extend(edges);
            }
        }
    }

    let description = json!({ "nodes": nodes, "connections": connections });
    fs::write(&cli.output, serde_json::to_string_pretty(&description)?)?;

    println!(
        "Successfully generated {} nodes and {} connections to '{}'",
        nodes_count(&description),
        connections_count(&description),
        cli.output
    );
    Ok(())
}

/// A node with no inputs returning a constant.
fn source_node(id: &str, rng: &mut StdRng) -> Value {
    let constant = rng.random_range(1..100);
    json!({
        "id": id,
        "name": id,
        "inputs": [],
        "outputs": [{ "name": "out", "type": "int" }],
        "source": format!("def {}():\n    return {}\n", id, constant),
    })
}

/// A node summing up to `fan_in` values from earlier layers, padded with defaults.
fn compute_node(
    id: &str,
    layer: usize,
    width: usize,
    fan_in: usize,
    rng: &mut StdRng,
) -> (Value, Vec<Value>) {
    let arity = rng.random_range(1..=fan_in.max(1));
    let params: Vec<String> = (0..arity).map(|i| format!("v{}", i)).collect();

    let mut inputs = Vec::new();
    let mut edges = Vec::new();
    for param in &params {
        if rng.random_bool(0.8) {
            let from_layer = rng.random_range(0..layer);
            let from_slot = rng.random_range(0..width);
            edges.push(json!({
                "from": { "node": format!("n{}_{}", from_layer, from_slot), "output": "out" },
                "to": { "node": id, "input": param },
            }));
            inputs.push(json!({ "name": param, "default": null }));
        } else {
            inputs.push(json!({ "name": param, "default": rng.random_range(0..10) }));
        }
    }

    let node = json!({
        "id": id,
        "name": id,
        "inputs": inputs,
        "outputs": [{ "name": "out", "type": "int" }],
        "source": format!("def {}({}):\n    return {}\n", id, params.join(", "), params.join(" + ")),
    });
    (node, edges)
}

fn nodes_count(description: &Value) -> usize {
    description["nodes"].as_array().map_or(0, Vec::len)
}

fn connections_count(description: &Value) -> usize {
    description["connections"].as_array().map_or(0, Vec::len)
}
