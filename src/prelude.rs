//! Prelude module for convenient imports
//!
//! Re-exports the types most programs need to describe, run and generate a
//! graph.
//!
//! # Example
//!
//! ```rust,no_run
//! use nagare::prelude::*;
//!
//! # fn run_example() -> Result<()> {
//! let description = std::fs::read_to_string("path/to/graph.json")?;
//! let graph = Graph::from_json(&description)?;
//!
//! let engine = Engine::builder()
//!     .with_mode(ExecutionMode::Parallel { workers: 4 })
//!     .build();
//! let report = engine.run(&graph)?;
//! for failure in &report.failures {
//!     eprintln!("{}", failure.error);
//! }
//! # Ok(())
//! # }
//! ```

// Engine and configuration
pub use crate::backend::{Backend, BackendChoice, BackendOutput};
pub use crate::engine::{Engine, EngineBuilder, EngineConfig};
pub use crate::interpreter::{
    CancelToken, ExecutionMode, ExecutionReport, NodeFailure, OutputMap, OutputPolicy,
};

// Graph model and plans
pub use crate::graph::{
    BEHAVIOR_INPUT, Connection, Graph, GraphDescription, InputSpec, IntoGraph, NodeDefinition,
};
pub use crate::plan::{BehaviorSource, Binding, ExecutionPlan};

// Behaviors
pub use crate::registry::{Arguments, Behavior, BehaviorCompiler, Registry};
pub use crate::script::ScriptCompiler;
pub use crate::value::Value;

// Error types
pub use crate::error::{BehaviorError, EngineError};

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
