use super::{
    CancelToken, ExecutionReport, NodeFailure, NodeOutputs, Realizer, collect_outputs, null_outputs,
    plan_positions, record_failure,
};
use crate::plan::ExecutionPlan;
use ahash::AHashMap;
use rayon::{Scope, ThreadPoolBuildError, ThreadPoolBuilder};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};
use tracing::debug;

struct RunState<'p> {
    plan: &'p ExecutionPlan,
    realizer: &'p Realizer<'p>,
    cancel: &'p CancelToken,
    positions: AHashMap<&'p str, usize>,
    slots: Vec<OnceLock<NodeOutputs>>,
    remaining: Vec<AtomicUsize>,
    failures: Mutex<Vec<(usize, NodeFailure)>>,
    cancelled: AtomicBool,
}

/// Runs `plan` on a dedicated pool of `workers` threads.
///
/// A node is spawned by whichever producer takes its remaining-dependency count
/// from one to zero, so it starts exactly once and only after every producer
/// has stored its outputs.
pub(super) fn run(
    plan: &ExecutionPlan,
    realizer: &Realizer<'_>,
    cancel: &CancelToken,
    workers: usize,
) -> Result<ExecutionReport, ThreadPoolBuildError> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("nagare-worker-{}", i))
        .build()?;

    let state = RunState {
        plan,
        realizer,
        cancel,
        positions: plan_positions(plan),
        slots: plan.nodes.iter().map(|_| OnceLock::new()).collect(),
        remaining: plan
            .nodes
            .iter()
            .map(|n| AtomicUsize::new(n.dependency_count))
            .collect(),
        failures: Mutex::new(Vec::new()),
        cancelled: AtomicBool::new(false),
    };

    pool.scope(|scope| {
        for (position, node) in plan.nodes.iter().enumerate() {
            if node.dependency_count == 0 {
                dispatch(scope, &state, position);
            }
        }
    });

    let mut failures = state
        .failures
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner);
    failures.sort_by_key(|(position, _)| *position);

    Ok(ExecutionReport {
        outputs: collect_outputs(plan, state.slots.into_iter().map(OnceLock::into_inner)),
        failures: failures.into_iter().map(|(_, f)| f).collect(),
        cancelled: state.cancelled.into_inner(),
    })
}

fn dispatch<'s, 'p: 's>(scope: &Scope<'s>, state: &'s RunState<'p>, position: usize) {
    scope.spawn(move |scope| {
        let node = &state.plan.nodes[position];
        if state.cancel.is_cancelled() {
            debug!(node_id = %node.id, "cancelled before dispatch");
            state.cancelled.store(true, Ordering::SeqCst);
            return;
        }

        let lookup = |id: &str, output: &str| {
            state
                .positions
                .get(id)
                .and_then(|&p| state.slots[p].get())
                .and_then(|outputs| outputs.get(output).cloned())
        };
        let outputs = match state.realizer.realize(node, &lookup) {
            Ok(outputs) => outputs,
            Err(error) => {
                let failure = record_failure(node, error);
                state
                    .failures
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push((position, failure));
                null_outputs(node)
            }
        };
        // Each slot has exactly one writer: the node's own task.
        let _ = state.slots[position].set(outputs);

        for &next in &node.successors {
            if state.remaining[next].fetch_sub(1, Ordering::AcqRel) == 1 {
                dispatch(scope, state, next);
            }
        }
    });
}
