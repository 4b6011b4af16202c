use super::ExecutionPlan;
use crate::error::PlanError;
use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

impl ExecutionPlan {
    /// Saves the plan to a file using the bincode format.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PlanError> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        let mut file = fs::File::create(path).map_err(|e| {
            PlanError::Io(format!("Could not create file '{}': {}", path.display(), e))
        })?;
        file.write_all(&bytes).map_err(|e| {
            PlanError::Io(format!("Could not write to file '{}': {}", path.display(), e))
        })
    }

    /// Loads a plan previously written by [`save`](Self::save).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PlanError> {
        let path = path.as_ref();
        let mut file = fs::File::open(path).map_err(|e| {
            PlanError::Io(format!("Could not open file '{}': {}", path.display(), e))
        })?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(|e| {
            PlanError::Io(format!("Could not read from file '{}': {}", path.display(), e))
        })?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PlanError> {
        encode_to_vec(self, standard()).map_err(|e| PlanError::Encode(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PlanError> {
        let plan: Self = decode_from_slice(bytes, standard())
            .map(|(plan, _)| plan) // bincode 2 returns (value, bytes_read)
            .map_err(|e| PlanError::Decode(e.to_string()))?;
        plan.check_links()?;
        Ok(plan)
    }

    /// Checks that successor links point forward, stay in bounds, and agree
    /// with every node's dependency count.
    fn check_links(&self) -> Result<(), PlanError> {
        let mut incoming = vec![0usize; self.nodes.len()];
        for (position, node) in self.nodes.iter().enumerate() {
            for &next in &node.successors {
                if next <= position || next >= self.nodes.len() {
                    return Err(PlanError::Inconsistent(format!(
                        "node '{}' lists successor #{} from position {}",
                        node.id, next, position
                    )));
                }
                incoming[next] += 1;
            }
        }
        for (node, count) in self.nodes.iter().zip(incoming) {
            if node.dependency_count != count {
                return Err(PlanError::Inconsistent(format!(
                    "node '{}' declares {} dependencies but {} edges lead to it",
                    node.id, node.dependency_count, count
                )));
            }
        }
        Ok(())
    }
}

/// Literal values are self-describing, which bincode cannot decode directly.
/// They travel inside the artifact as JSON text instead.
pub(super) mod json_value {
    use crate::value::Value;
    use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _, ser::Error as _};

    pub fn serialize<S: Serializer>(value: &Value, serializer: S) -> Result<S::Ok, S::Error> {
        serde_json::to_string(value)
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Value, D::Error> {
        let text = String::deserialize(deserializer)?;
        serde_json::from_str(&text).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::PlanError;
    use crate::graph::{Connection, Graph, InputSpec, NodeDefinition};
    use crate::plan::{Binding, ExecutionPlan, Planner};
    use crate::value::Value;

    fn graph() -> Graph {
        Graph::new(
            vec![
                NodeDefinition::new("a", "a").output("x"),
                NodeDefinition::new("b", "b")
                    .input(InputSpec::new("v"))
                    .input(InputSpec::with_default("label", "hist"))
                    .input(InputSpec::with_default("scale", 1.5))
                    .output("y"),
            ],
            vec![Connection::new("a", "x", "b", "v")],
        )
        .unwrap()
    }

    #[test]
    fn plan_survives_bincode() {
        let plan = Planner::new(&graph()).plan().unwrap();

        let bytes = plan.to_bytes().expect("encode");
        let decoded = ExecutionPlan::from_bytes(&bytes).expect("decode");

        assert_eq!(decoded, plan);
        assert_eq!(decoded.nodes[1].arguments[1].1, Binding::Literal(Value::from("hist")));
        assert_eq!(decoded.nodes[1].arguments[2].1, Binding::Literal(Value::Float(1.5)));
    }

    #[test]
    fn inconsistent_links_are_rejected() {
        let plan = Planner::new(&graph()).plan().unwrap();

        let mut out_of_range = plan.clone();
        out_of_range.nodes[0].successors = vec![7];
        let bytes = out_of_range.to_bytes().unwrap();
        assert!(matches!(ExecutionPlan::from_bytes(&bytes), Err(PlanError::Inconsistent(_))));

        let mut backwards = plan.clone();
        backwards.nodes[1].successors = vec![0];
        backwards.nodes[0].dependency_count = 1;
        let bytes = backwards.to_bytes().unwrap();
        assert!(matches!(ExecutionPlan::from_bytes(&bytes), Err(PlanError::Inconsistent(_))));

        let mut miscounted = plan;
        miscounted.nodes[1].dependency_count = 3;
        let bytes = miscounted.to_bytes().unwrap();
        assert!(matches!(ExecutionPlan::from_bytes(&bytes), Err(PlanError::Inconsistent(_))));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(ExecutionPlan::from_bytes(&[0xff, 0xff, 0xff]).is_err());
    }
}
