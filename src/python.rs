use crate::engine::Engine;
use crate::graph::Graph;
use crate::interpreter::ExecutionReport;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use serde_json::json;

fn value_error(e: impl ToString) -> PyErr {
    PyErr::new::<PyValueError, _>(e.to_string())
}

/// A parsed dataflow graph, ready to be ordered, generated or run.
///
/// Only inline and upstream-supplied behaviors can run from Python: the
/// static registry is empty.
#[pyclass(name = "Nagare")]
struct NagarePy {
    graph: Graph,
    engine: Engine,
}

#[pymethods]
impl NagarePy {
    /// Parses a graph description.
    ///
    /// Args:
    ///     description_json (str): The `{"nodes": [...], "connections": [...]}`
    ///         description of the graph.
    ///
    /// Raises:
    ///     ValueError: If the JSON is invalid or the graph is malformed.
    #[new]
    fn new(description_json: &str) -> PyResult<Self> {
        let graph = Graph::from_json(description_json).map_err(value_error)?;
        Ok(NagarePy {
            graph,
            engine: Engine::builder().build(),
        })
    }

    /// Returns node ids in execution order.
    ///
    /// Raises:
    ///     ValueError: If the graph contains a cycle.
    fn order(&self) -> PyResult<Vec<String>> {
        self.engine.order(&self.graph).map_err(value_error)
    }

    /// Returns the generated Python program as a string.
    ///
    /// Raises:
    ///     ValueError: On cycles, missing inputs or unresolved behaviors.
    fn generate(&self) -> PyResult<String> {
        self.engine.generate(&self.graph).map_err(value_error)
    }

    /// Interprets the graph and returns a JSON object string with `outputs`
    /// and `failures`.
    ///
    /// Failed nodes do not raise: they are listed under `failures` as
    /// `{"node_id", "node_name", "message"}` and their outputs are `null`.
    ///
    /// Raises:
    ///     ValueError: If the graph is malformed or contains a cycle.
    fn run(&self) -> PyResult<String> {
        let report = self.engine.run(&self.graph).map_err(value_error)?;
        serde_json::to_string(&report_json(&report)).map_err(value_error)
    }
}

fn report_json(report: &ExecutionReport) -> serde_json::Value {
    let failures: Vec<serde_json::Value> = report
        .failures
        .iter()
        .map(|f| {
            json!({
                "node_id": f.node_id,
                "node_name": f.node_name,
                "message": f.error.to_string(),
            })
        })
        .collect();
    json!({
        "outputs": report.outputs,
        "failures": failures,
        "cancelled": report.cancelled,
    })
}


/// Python bindings to the nagare dataflow engine.
#[pymodule]
fn nagare(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<NagarePy>()?;
    Ok(())
}
