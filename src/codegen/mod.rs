//! Generation backend: turns a plan into standalone program text.
//!
//! The layout is fixed: module imports, the `_materialize` helper when some
//! node receives its body from upstream, one definition per distinct inline
//! function, then an entry-point block with one call per node in execution
//! order. Nothing is executed, and the same plan always yields the same bytes.

mod literal;
mod names;

pub use literal::{dedent, python_literal, sanitize};
pub use names::output_variable;

use crate::backend::Backend;
use crate::error::EngineError;
use crate::plan::{BehaviorSource, Binding, ExecutionPlan, PlannedNode};
use crate::registry::Registry;
use crate::value::Value;
use ahash::AHashSet;
use itertools::Itertools;
use names::VariableNames;
use tracing::debug;

const INDENT: &str = "    ";

const MATERIALIZE_HELPER: &str = "def _materialize(source, name):
    namespace = {}
    exec(source, namespace)
    return namespace[name]";

/// The generation backend.
///
/// The registry is consulted only to check that static behaviors exist; their
/// calls are emitted by function name.
pub struct ScriptGenerator<'a> {
    registry: &'a Registry,
}

impl<'a> ScriptGenerator<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    pub fn generate(&self, plan: &ExecutionPlan) -> Result<String, EngineError> {
        let names = VariableNames::assign(plan);
        let mut calls = Vec::with_capacity(plan.len());
        for node in &plan.nodes {
            node.check_inputs()?;
            if let BehaviorSource::Static { key } = &node.behavior {
                if !self.registry.contains(key) {
                    return Err(node.unresolved(format!("no behavior registered under '{}'", key)));
                }
            }
            debug!(node_id = %node.id, node_name = %node.name, "emitting call");
            calls.extend(call_lines(node, &names));
        }

        let mut declared: Vec<&PlannedNode> = plan.nodes.iter().collect();
        declared.sort_by_key(|node| node.declared);

        let mut sections = Vec::new();

        let imports = declared
            .iter()
            .filter_map(|node| match &node.behavior {
                BehaviorSource::External { module, .. } => Some(module.as_str()),
                _ => None,
            })
            .unique()
            .map(|module| format!("import {}", module))
            .join("\n");
        if !imports.is_empty() {
            sections.push(imports);
        }

        if declared
            .iter()
            .any(|node| matches!(node.behavior, BehaviorSource::Upstream { .. }))
        {
            sections.push(MATERIALIZE_HELPER.to_string());
        }

        let mut defined = AHashSet::new();
        for node in &declared {
            if let BehaviorSource::Inline { source } = &node.behavior {
                if defined.insert(node.name.as_str()) {
                    sections.push(dedent(source));
                }
            }
        }

        let body = if calls.is_empty() {
            format!("{}pass", INDENT)
        } else {
            calls.iter().map(|line| format!("{}{}", INDENT, line)).join("\n")
        };
        sections.push(format!("if __name__ == \"__main__\":\n{}", body));

        Ok(format!("{}\n", sections.join("\n\n")))
    }
}

impl Backend for ScriptGenerator<'_> {
    type Output = String;

    fn execute(&self, plan: &ExecutionPlan) -> Result<String, EngineError> {
        self.generate(plan)
    }
}

fn call_lines(node: &PlannedNode, names: &VariableNames) -> Vec<String> {
    let arguments = node
        .arguments
        .iter()
        .map(|(input, binding)| {
            let value = match binding {
                Binding::Connected { node, output } => names.output(node, output),
                Binding::Literal(value) => python_literal(value),
                // Rejected by `check_inputs` before any line is emitted.
                Binding::Missing => "None".to_string(),
            };
            format!("{}={}", input, value)
        })
        .join(", ");

    let callee = match &node.behavior {
        BehaviorSource::Static { .. } | BehaviorSource::Inline { .. } => node.name.clone(),
        BehaviorSource::External { module, name } => format!("{}.{}", module, name),
        BehaviorSource::Upstream { node: from, output } => format!(
            "_materialize({}, {})",
            names.output(from, output),
            python_literal(&Value::from(node.name.as_str()))
        ),
    };
    let call = format!("{}({})", callee, arguments);

    match node.outputs.as_slice() {
        [] => vec![call],
        [single] => vec![format!("{} = {}", names.output(&node.id, single), call)],
        several => {
            let result = names.result(&node.id);
            let mut lines = vec![format!("{} = {}", result, call)];
            lines.extend(several.iter().map(|output| {
                format!(
                    "{} = {}[{}]",
                    names.output(&node.id, output),
                    result,
                    python_literal(&Value::from(output.as_str()))
                )
            }));
            lines
        }
    }
}
