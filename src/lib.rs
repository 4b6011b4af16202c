//! # Nagare - Dataflow Graph Execution Engine
//!
//! **Nagare** takes a declarative description of computation nodes and the
//! connections between their inputs and outputs, works out a valid execution
//! order, resolves what every node receives and how it behaves, and then either
//! runs the graph or emits an equivalent standalone Python program.
//!
//! ## Core Workflow
//!
//! 1.  **Describe the graph**: parse the JSON description with [`Graph::from_json`](graph::Graph::from_json),
//!     or implement [`IntoGraph`](graph::IntoGraph) for your own format.
//! 2.  **Plan**: the engine orders nodes with Kahn's algorithm (behavior-supplying
//!     connections count as dependencies) and resolves each node's argument
//!     bindings and behavior source into an [`ExecutionPlan`](plan::ExecutionPlan).
//! 3.  **Execute**: interpret the plan with [`Engine::run`](engine::Engine::run), producing
//!     per-node outputs and per-node failure records, or turn it into program
//!     text with [`Engine::generate`](engine::Engine::generate).
//!
//! Static behaviors are Rust closures in a [`Registry`](registry::Registry).
//! Behaviors given as text (inline or produced by an upstream node) are compiled
//! through a [`BehaviorCompiler`](registry::BehaviorCompiler); the bundled
//! [`ScriptCompiler`](script::ScriptCompiler) understands a small Python subset.
//!
//! ## Quick Start
//!
//! ```rust
//! use nagare::prelude::*;
//!
//! let description = r#"{
//!     "nodes": [
//!         { "id": "A", "name": "five", "inputs": [], "outputs": [{ "name": "x" }] },
//!         {
//!             "id": "B", "name": "double",
//!             "inputs": [{ "name": "v", "default": null }],
//!             "outputs": [{ "name": "result" }],
//!             "source": "def double(v):\n    return v * 2\n"
//!         }
//!     ],
//!     "connections": [
//!         { "from": { "node": "A", "output": "x" }, "to": { "node": "B", "input": "v" } }
//!     ]
//! }"#;
//!
//! let graph = Graph::from_json(description)?;
//! let registry = Registry::new().with("A", |_: &Arguments| Ok(Value::Int(5)));
//! let engine = Engine::builder().with_registry(registry).build();
//!
//! let report = engine.run(&graph)?;
//! assert_eq!(report.output("B", "result"), Some(&Value::Int(10)));
//!
//! let program = engine.generate(&graph)?;
//! assert!(program.contains("node_B_result = double(v=node_A_x)"));
//! # Ok::<(), nagare::error::EngineError>(())
//! ```

pub mod backend;
pub mod codegen;
pub mod engine;
pub mod error;
pub mod graph;
pub mod interpreter;
pub mod plan;
pub mod prelude;
pub mod registry;
pub mod scheduler;
pub mod script;
pub mod value;

#[cfg(feature = "python-bindings")]
mod python;
