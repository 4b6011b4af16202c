//! Direct execution of an [`ExecutionPlan`].
//!
//! Nodes run in plan order (or concurrently, see [`ExecutionMode::Parallel`]).
//! A node that cannot be realized or invoked does not abort the run: the error
//! is recorded as a [`NodeFailure`], its declared outputs are filled with
//! `Value::Null`, and independent branches carry on.

mod parallel;

use crate::backend::Backend;
use crate::error::{BehaviorError, EngineError};
use crate::plan::{BehaviorSource, Binding, ExecutionPlan, PlannedNode};
use crate::registry::{Arguments, Behavior, BehaviorCompiler, Registry, qualified_name};
use crate::value::Value;
use ahash::AHashMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Output name → value for a single node.
pub type NodeOutputs = BTreeMap<String, Value>;

/// Node id → that node's outputs.
pub type OutputMap = BTreeMap<String, NodeOutputs>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    /// Every ready node is dispatched onto a pool of `workers` threads.
    Parallel { workers: usize },
}

/// How a result is split across several declared outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputPolicy {
    /// The result must be a mapping whose keys are exactly the declared outputs.
    #[default]
    Strict,
    /// Any mapping is copied as-is.
    Lenient,
}

/// Shared flag checked before each node dispatch.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeFailure {
    pub node_id: String,
    pub node_name: String,
    pub error: EngineError,
}

/// Everything a run produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionReport {
    pub outputs: OutputMap,
    /// In plan order.
    pub failures: Vec<NodeFailure>,
    /// Set when a [`CancelToken`] stopped dispatch before every node ran.
    pub cancelled: bool,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }

    pub fn output(&self, node_id: &str, output: &str) -> Option<&Value> {
        self.outputs.get(node_id)?.get(output)
    }

    pub fn failure(&self, node_id: &str) -> Option<&NodeFailure> {
        self.failures.iter().find(|f| f.node_id == node_id)
    }
}

/// The interpretation backend.
pub struct Interpreter<'a> {
    registry: &'a Registry,
    compiler: &'a dyn BehaviorCompiler,
    mode: ExecutionMode,
    policy: OutputPolicy,
    cancel: CancelToken,
}

impl<'a> Interpreter<'a> {
    pub fn new(registry: &'a Registry, compiler: &'a dyn BehaviorCompiler) -> Self {
        Self {
            registry,
            compiler,
            mode: ExecutionMode::default(),
            policy: OutputPolicy::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_output_policy(mut self, policy: OutputPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn run(&self, plan: &ExecutionPlan) -> ExecutionReport {
        let realizer = Realizer::new(self.registry, self.compiler, self.policy);
        let report = match self.mode {
            ExecutionMode::Sequential => self.run_sequential(plan, &realizer),
            ExecutionMode::Parallel { workers } => {
                match parallel::run(plan, &realizer, &self.cancel, workers) {
                    Ok(report) => report,
                    Err(e) => {
                        warn!(error = %e, "could not start worker pool, running sequentially");
                        self.run_sequential(plan, &realizer)
                    }
                }
            }
        };

        info!(
            nodes = plan.len(),
            completed = report.outputs.len(),
            failed = report.failures.len(),
            cancelled = report.cancelled,
            "run finished"
        );
        report
    }

    fn run_sequential(&self, plan: &ExecutionPlan, realizer: &Realizer<'_>) -> ExecutionReport {
        let positions = plan_positions(plan);
        let mut slots: Vec<Option<NodeOutputs>> = vec![None; plan.len()];
        let mut report = ExecutionReport::default();

        for (position, node) in plan.nodes.iter().enumerate() {
            if self.cancel.is_cancelled() {
                debug!(node_id = %node.id, "cancelled before dispatch");
                report.cancelled = true;
                break;
            }

            let lookup = |id: &str, output: &str| {
                positions
                    .get(id)
                    .and_then(|&p| slots[p].as_ref())
                    .and_then(|outputs| outputs.get(output).cloned())
            };
            let outputs = match realizer.realize(node, &lookup) {
                Ok(outputs) => outputs,
                Err(error) => {
                    report.failures.push(record_failure(node, error));
                    null_outputs(node)
                }
            };
            slots[position] = Some(outputs);
        }

        report.outputs = collect_outputs(plan, slots);
        report
    }
}

impl Backend for Interpreter<'_> {
    type Output = ExecutionReport;

    fn execute(&self, plan: &ExecutionPlan) -> Result<ExecutionReport, EngineError> {
        Ok(self.run(plan))
    }
}

type CacheKey = (String, String);

/// Turns one planned node plus upstream values into its outputs.
pub(crate) struct Realizer<'a> {
    registry: &'a Registry,
    compiler: &'a dyn BehaviorCompiler,
    policy: OutputPolicy,
    compiled: Mutex<AHashMap<CacheKey, Arc<dyn Behavior>>>,
}

impl<'a> Realizer<'a> {
    fn new(
        registry: &'a Registry,
        compiler: &'a dyn BehaviorCompiler,
        policy: OutputPolicy,
    ) -> Self {
        Self {
            registry,
            compiler,
            policy,
            compiled: Mutex::new(AHashMap::new()),
        }
    }

    fn realize(
        &self,
        node: &PlannedNode,
        lookup: &dyn Fn(&str, &str) -> Option<Value>,
    ) -> Result<NodeOutputs, EngineError> {
        debug!(node_id = %node.id, node_name = %node.name, "running node");
        node.check_inputs()?;

        let mut args = Arguments::new();
        for (input, binding) in &node.arguments {
            let value = match binding {
                Binding::Connected { node: from, output } => {
                    lookup(from, output).ok_or_else(|| EngineError::MissingInput {
                        node_id: node.id.clone(),
                        node_name: node.name.clone(),
                        input: input.clone(),
                    })?
                }
                Binding::Literal(value) => value.clone(),
                Binding::Missing => Value::Null,
            };
            args.push(input.clone(), value);
        }

        let behavior = self.behavior(node, lookup)?;
        let result =
            contain_panic(|| behavior.call(&args)).map_err(|e| EngineError::InvocationFailure {
                node_id: node.id.clone(),
                node_name: node.name.clone(),
                message: e.to_string(),
            })?;
        shape_outputs(node, result, self.policy)
    }

    fn behavior(
        &self,
        node: &PlannedNode,
        lookup: &dyn Fn(&str, &str) -> Option<Value>,
    ) -> Result<Arc<dyn Behavior>, EngineError> {
        match &node.behavior {
            BehaviorSource::Static { key } => self.registry.get(key).ok_or_else(|| {
                node.unresolved(format!("no behavior registered under '{}'", key))
            }),
            BehaviorSource::External { module, name } => {
                let key = qualified_name(module, name);
                self.registry.get(&key).ok_or_else(|| {
                    node.unresolved(format!("external function '{}' is not available", key))
                })
            }
            BehaviorSource::Inline { source } => self.compile(node, source),
            BehaviorSource::Upstream { node: from, output } => match lookup(from, output) {
                Some(Value::Text(source)) => self.compile(node, &source),
                Some(other) => Err(node.unresolved(format!(
                    "'{}.{}' supplied {} instead of source text",
                    from,
                    output,
                    other.type_name()
                ))),
                None => Err(node.unresolved(format!(
                    "'{}.{}' supplied no source text",
                    from, output
                ))),
            },
        }
    }

    fn compile(&self, node: &PlannedNode, source: &str) -> Result<Arc<dyn Behavior>, EngineError> {
        let key = (node.name.clone(), source.to_string());
        if let Some(hit) = self
            .compiled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(hit.clone());
        }

        let behavior = contain_panic(|| self.compiler.compile(&node.name, source)).map_err(|e| {
            EngineError::InvocationFailure {
                node_id: node.id.clone(),
                node_name: node.name.clone(),
                message: e.to_string(),
            }
        })?;
        self.compiled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, behavior.clone());
        Ok(behavior)
    }
}

fn shape_outputs(
    node: &PlannedNode,
    result: Value,
    policy: OutputPolicy,
) -> Result<NodeOutputs, EngineError> {
    let mismatch = |found: String| EngineError::OutputShapeMismatch {
        node_id: node.id.clone(),
        node_name: node.name.clone(),
        expected: node.outputs.clone(),
        found,
    };

    match node.outputs.as_slice() {
        [] => Ok(NodeOutputs::new()),
        [single] => Ok(NodeOutputs::from([(single.clone(), result)])),
        declared => match result {
            Value::Map(fields) => {
                let matches = fields.len() == declared.len()
                    && declared.iter().all(|name| fields.contains_key(name));
                if policy == OutputPolicy::Lenient || matches {
                    Ok(fields)
                } else {
                    Err(mismatch(format!("a mapping with keys [{}]", fields.keys().join(", "))))
                }
            }
            other => Err(mismatch(other.type_name().to_string())),
        },
    }
}

/// Behaviors and compilers are caller code; a panic in one becomes that node's error.
fn contain_panic<T>(call: impl FnOnce() -> Result<T, BehaviorError>) -> Result<T, BehaviorError> {
    panic::catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| {
        Err(BehaviorError::Custom(format!("panicked: {}", panic_message(&*payload))))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}

fn null_outputs(node: &PlannedNode) -> NodeOutputs {
    node.outputs
        .iter()
        .map(|name| (name.clone(), Value::Null))
        .collect()
}

fn record_failure(node: &PlannedNode, error: EngineError) -> NodeFailure {
    warn!(node_id = %node.id, node_name = %node.name, error = %error, "node failed");
    NodeFailure {
        node_id: node.id.clone(),
        node_name: node.name.clone(),
        error,
    }
}

fn plan_positions(plan: &ExecutionPlan) -> AHashMap<&str, usize> {
    plan.nodes
        .iter()
        .enumerate()
        .map(|(position, node)| (node.id.as_str(), position))
        .collect()
}

fn collect_outputs(
    plan: &ExecutionPlan,
    slots: impl IntoIterator<Item = Option<NodeOutputs>>,
) -> OutputMap {
    plan.nodes
        .iter()
        .zip(slots)
        .filter_map(|(node, slot)| slot.map(|outputs| (node.id.clone(), outputs)))
        .collect()
}
