use super::literal::sanitize;
use crate::plan::ExecutionPlan;
use ahash::{AHashMap, AHashSet};

/// Variable bound to `output` of node `node_id` when nothing else claims the name.
pub fn output_variable(node_id: &str, output: &str) -> String {
    format!("node_{}_{}", sanitize(node_id), sanitize(output))
}

fn result_variable(node_id: &str) -> String {
    format!("node_{}", sanitize(node_id))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Slot {
    Output(String, String),
    /// The whole result of a multi-output node, before unpacking.
    Result(String),
}

impl Slot {
    fn base_name(&self) -> String {
        match self {
            Slot::Output(node, output) => output_variable(node, output),
            Slot::Result(node) => result_variable(node),
        }
    }
}

/// One distinct Python variable per node output across a whole plan.
///
/// Sanitizing ids can map different outputs to the same text (`a-b` and `a_b`).
/// The first claimant in plan order keeps the plain name; later ones get the
/// lowest `_N` suffix that is neither taken nor some other slot's plain name.
#[derive(Debug, Default)]
pub(super) struct VariableNames {
    names: AHashMap<Slot, String>,
}

impl VariableNames {
    pub(super) fn assign(plan: &ExecutionPlan) -> Self {
        let mut slots = Vec::new();
        for node in &plan.nodes {
            if node.outputs.len() > 1 {
                slots.push(Slot::Result(node.id.clone()));
            }
            slots.extend(
                node.outputs
                    .iter()
                    .map(|output| Slot::Output(node.id.clone(), output.clone())),
            );
        }

        let reserved: AHashSet<String> = slots.iter().map(Slot::base_name).collect();
        let mut taken = AHashSet::with_capacity(slots.len());
        let mut names = AHashMap::with_capacity(slots.len());
        for slot in slots {
            if names.contains_key(&slot) {
                continue;
            }
            let base = slot.base_name();
            let name = if taken.insert(base.clone()) {
                base
            } else {
                let mut suffix = 2;
                loop {
                    let candidate = format!("{}_{}", base, suffix);
                    if !reserved.contains(&candidate) && taken.insert(candidate.clone()) {
                        break candidate;
                    }
                    suffix += 1;
                }
            };
            names.insert(slot, name);
        }
        Self { names }
    }

    pub(super) fn output(&self, node_id: &str, output: &str) -> String {
        let slot = Slot::Output(node_id.to_string(), output.to_string());
        self.names
            .get(&slot)
            .cloned()
            .unwrap_or_else(|| slot.base_name())
    }

    pub(super) fn result(&self, node_id: &str) -> String {
        let slot = Slot::Result(node_id.to_string());
        self.names
            .get(&slot)
            .cloned()
            .unwrap_or_else(|| slot.base_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{BehaviorSource, PlannedNode};

    fn node(id: &str, outputs: &[&str]) -> PlannedNode {
        PlannedNode {
            id: id.into(),
            declared: 0,
            name: "f".into(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            arguments: Vec::new(),
            behavior: BehaviorSource::Static { key: id.into() },
            successors: Vec::new(),
            dependency_count: 0,
        }
    }

    #[test]
    fn plain_names_when_nothing_collides() {
        let plan = ExecutionPlan {
            nodes: vec![node("A", &["x"]), node("7", &["lo", "hi"])],
        };
        let names = VariableNames::assign(&plan);
        assert_eq!(names.output("A", "x"), "node_A_x");
        assert_eq!(names.result("7"), "node_7");
        assert_eq!(names.output("7", "hi"), "node_7_hi");
    }

    #[test]
    fn sanitized_collisions_get_distinct_names() {
        let plan = ExecutionPlan {
            nodes: vec![
                node("a-b", &["out"]),
                node("a_b", &["out"]),
                node("a_b_out", &["2"]),
            ],
        };
        let names = VariableNames::assign(&plan);
        assert_eq!(names.output("a-b", "out"), "node_a_b_out");
        // `node_a_b_out_2` is the plain name of `a_b_out.2`, so it is skipped.
        assert_eq!(names.output("a_b", "out"), "node_a_b_out_3");
        assert_eq!(names.output("a_b_out", "2"), "node_a_b_out_2");
    }

    #[test]
    fn multi_output_result_does_not_shadow_an_output() {
        let plan = ExecutionPlan {
            nodes: vec![node("s", &["lo", "hi"]), node("s_lo", &["a", "b"])],
        };
        let names = VariableNames::assign(&plan);
        assert_eq!(names.output("s", "lo"), "node_s_lo");
        assert_eq!(names.result("s_lo"), "node_s_lo_2");
        assert_eq!(names.output("s_lo", "a"), "node_s_lo_a");
    }
}
