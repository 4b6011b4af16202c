//! End-to-end tests of the interpretation backend.
mod common;
use common::*;
use nagare::prelude::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn map(pairs: &[(&str, Value)]) -> Value {
    Value::Map(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
}

/// Counts compilations and delegates to the bundled compiler.
struct CountingCompiler {
    calls: Arc<AtomicUsize>,
}

impl BehaviorCompiler for CountingCompiler {
    fn compile(
        &self,
        name: &str,
        source: &str,
    ) -> std::result::Result<Arc<dyn Behavior>, BehaviorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ScriptCompiler.compile(name, source)
    }
}

#[cfg(test)]
mod interpretation_tests {
    use super::*;

    #[test]
    fn test_ab_graph_outputs() {
        let report = ab_engine().run(&ab_graph()).expect("graph is valid");

        let mut expected = OutputMap::new();
        expected.insert("A".to_string(), BTreeMap::from([("x".to_string(), Value::Int(5))]));
        expected.insert("B".to_string(), BTreeMap::from([("result".to_string(), Value::Int(10))]));
        assert_eq!(report.outputs, expected);
        assert!(report.is_success());
    }

    #[test]
    fn test_failing_node_does_not_stop_independent_branch() {
        let graph = Graph::new(
            vec![
                inline_node("bad", "explode", &[], "1 / 0"),
                inline_node("after_bad", "inc", &["v"], "v + 1"),
                inline_node("good", "seven", &[], "7"),
            ],
            vec![Connection::new("bad", "out", "after_bad", "v")],
        )
        .unwrap();

        let report = Engine::builder().build().run(&graph).unwrap();

        assert_eq!(report.output("good", "out"), Some(&Value::Int(7)));
        assert_eq!(report.output("bad", "out"), Some(&Value::Null));

        let failure = report.failure("bad").expect("bad is recorded");
        assert_eq!(failure.node_name, "explode");
        assert!(matches!(failure.error, EngineError::InvocationFailure { .. }));
        assert!(failure.error.to_string().contains("division by zero"));

        // The dependent node receives the null sentinel, and fails on it.
        let downstream = report.failure("after_bad").expect("downstream is recorded");
        assert!(matches!(
            downstream.error,
            EngineError::InvocationFailure { ref message, .. } if message.contains("Type mismatch")
        ));
        assert_eq!(report.failures.len(), 2);
        assert!(!report.is_success());
    }

    #[test]
    fn test_cycle_executes_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = Registry::new()
            .with("A", counting(&calls, Value::Int(1)))
            .with("B", counting(&calls, Value::Int(2)));
        let graph = Graph::new(
            vec![
                NodeDefinition::new("A", "a").input(InputSpec::new("v")).output("o"),
                NodeDefinition::new("B", "b").input(InputSpec::new("v")).output("o"),
            ],
            vec![Connection::new("A", "o", "B", "v"), Connection::new("B", "o", "A", "v")],
        )
        .unwrap();

        let engine = Engine::builder().with_registry(registry).build();
        assert!(matches!(engine.run(&graph), Err(EngineError::CycleDetected { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_missing_input_is_recorded_with_node_and_input() {
        let graph = Graph::new(
            vec![
                NodeDefinition::new("lonely", "double")
                    .input(InputSpec::new("v"))
                    .output("result")
                    .source("def double(v):\n    return v * 2\n"),
            ],
            Vec::new(),
        )
        .unwrap();

        let report = Engine::builder().build().run(&graph).unwrap();
        let failure = report.failure("lonely").expect("recorded");
        match &failure.error {
            EngineError::MissingInput { node_id, input, .. } => {
                assert_eq!(node_id, "lonely");
                assert_eq!(input, "v");
            }
            other => panic!("expected MissingInput, got {other}"),
        }
        assert_eq!(report.output("lonely", "result"), Some(&Value::Null));
    }

    #[test]
    fn test_defaults_fill_unconnected_inputs() {
        let graph = Graph::new(
            vec![
                NodeDefinition::new("scale", "scale")
                    .input(InputSpec::with_default("v", 3i64))
                    .input(InputSpec::with_default("factor", 1.5))
                    .output("y")
                    .source("def scale(v, factor):\n    return v * factor\n"),
            ],
            Vec::new(),
        )
        .unwrap();
        let report = Engine::builder().build().run(&graph).unwrap();
        assert_eq!(report.output("scale", "y"), Some(&Value::Float(4.5)));
    }

    #[test]
    fn test_unregistered_static_behavior_is_unresolved() {
        let report = Engine::builder().build().run(&ab_graph()).unwrap();
        let failure = report.failure("A").expect("A has no behavior");
        assert!(matches!(failure.error, EngineError::UnresolvedBehavior { .. }));
        // B still runs, on the null sentinel.
        assert!(report.failure("B").is_some());
    }

    #[test]
    fn test_upstream_supplied_behavior_runs_after_producer() {
        let producer_source = "def emit():\n    return 'def shout(v):\\n    return v + \\'!\\'\\n'\n";
        let graph = Graph::new(
            vec![
                NodeDefinition::new("consumer", "shout")
                    .input(InputSpec::new("source"))
                    .input(InputSpec::with_default("v", "hey"))
                    .output("y"),
                NodeDefinition::new("producer", "emit").output("code").source(producer_source),
            ],
            vec![Connection::new("producer", "code", "consumer", BEHAVIOR_INPUT)],
        )
        .unwrap();

        let report = Engine::builder().build().run(&graph).unwrap();
        assert!(report.is_success(), "failures: {:?}", report.failures);
        assert_eq!(report.output("consumer", "y"), Some(&Value::from("hey!")));
    }

    #[test]
    fn test_upstream_non_text_is_unresolved() {
        let graph = Graph::new(
            vec![
                inline_node("producer", "number", &[], "42"),
                NodeDefinition::new("consumer", "f").output("y"),
            ],
            vec![Connection::new("producer", "out", "consumer", BEHAVIOR_INPUT)],
        )
        .unwrap();
        let report = Engine::builder().build().run(&graph).unwrap();
        let failure = report.failure("consumer").unwrap();
        assert!(matches!(
            failure.error,
            EngineError::UnresolvedBehavior { ref reason, .. } if reason.contains("int")
        ));
    }

    #[test]
    fn test_external_behavior_resolved_by_qualified_name() {
        let mut registry = Registry::new();
        registry.register_qualified("nodes.plotting", "histogram", |args: &Arguments| {
            let bins = args.require("histogram", "bins")?.clone();
            Ok(map(&[("bins", bins), ("figure", Value::from("fig"))]))
        });
        let graph = Graph::from_json(
            r#"{
                "nodes": [{
                    "id": 1, "name": "histogram", "module": "./nodes/plotting.py",
                    "inputs": [{ "name": "bins", "default": 20 }],
                    "outputs": [{ "name": "bins" }, { "name": "figure" }]
                }]
            }"#,
        )
        .unwrap();

        let report = Engine::builder().with_registry(registry).build().run(&graph).unwrap();
        assert_eq!(report.output("1", "bins"), Some(&Value::Int(20)));
        assert_eq!(report.output("1", "figure"), Some(&Value::from("fig")));
    }

    #[test]
    fn test_strict_and_lenient_output_shapes() {
        let graph = Graph::new(
            vec![
                NodeDefinition::new("split", "split")
                    .output("lo")
                    .output("hi")
                    .source("def split():\n    return {'lo': 1, 'extra': 2}\n"),
            ],
            Vec::new(),
        )
        .unwrap();

        let strict = Engine::builder().build().run(&graph).unwrap();
        let failure = strict.failure("split").expect("shape mismatch");
        assert!(matches!(
            failure.error,
            EngineError::OutputShapeMismatch { ref expected, .. } if expected == &["lo", "hi"]
        ));
        assert_eq!(strict.output("split", "hi"), Some(&Value::Null));

        let lenient = Engine::builder()
            .with_output_policy(OutputPolicy::Lenient)
            .build()
            .run(&graph)
            .unwrap();
        assert!(lenient.is_success());
        assert_eq!(lenient.output("split", "extra"), Some(&Value::Int(2)));
        assert_eq!(lenient.output("split", "hi"), None);
    }

    #[test]
    fn test_zero_output_node_yields_empty_mapping() {
        let graph = Graph::new(
            vec![NodeDefinition::new("sink", "sink").source("def sink():\n    print('done')\n")],
            Vec::new(),
        )
        .unwrap();
        let report = Engine::builder().build().run(&graph).unwrap();
        assert_eq!(report.outputs["sink"], BTreeMap::new());
    }

    #[test]
    fn test_compiled_behaviors_are_cached_per_run() {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = Engine::builder()
            .with_compiler(CountingCompiler { calls: Arc::clone(&calls) })
            .build();

        let report = engine.run(&chain_graph(6)).unwrap();
        assert!(report.is_success());
        assert_eq!(report.output("n5", "out"), Some(&Value::Int(5)));
        // `start` plus one shared `inc` body.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let sequential = Engine::builder().build();
        let parallel = Engine::builder()
            .with_mode(ExecutionMode::Parallel { workers: 4 })
            .build();

        for graph in [fan_graph(12), chain_graph(20), pseudo_random_dag(40, 3)] {
            let a = sequential.run(&graph).unwrap();
            let b = parallel.run(&graph).unwrap();
            assert_eq!(a, b);
        }

        let report = parallel.run(&fan_graph(4)).unwrap();
        // 1*1 + 1*2 + 1*3 + 1*4
        assert_eq!(report.output("s", "out"), Some(&Value::Int(10)));
    }

    #[test]
    fn test_integer_overflow_and_panics_stay_inside_their_node() {
        let graph = Graph::from_json(
            r#"{
                "nodes": [
                    { "id": "neg", "name": "neg",
                      "inputs": [{ "name": "v", "default": -9223372036854775808 }],
                      "outputs": [{ "name": "out" }],
                      "source": "def neg(v):\n    return -v\n" },
                    { "id": "boom", "name": "boom", "outputs": [{ "name": "out" }] },
                    { "id": "ok", "name": "one", "outputs": [{ "name": "out" }],
                      "source": "def one():\n    return 1\n" }
                ]
            }"#,
        )
        .unwrap();
        let registry = Registry::new().with(
            "boom",
            |_: &Arguments| -> std::result::Result<Value, BehaviorError> {
                panic!("registry behavior exploded")
            },
        );

        for mode in [ExecutionMode::Sequential, ExecutionMode::Parallel { workers: 2 }] {
            let engine = Engine::builder()
                .with_registry(registry.clone())
                .with_mode(mode)
                .build();
            let report = engine.run(&graph).unwrap();

            assert_eq!(report.output("ok", "out"), Some(&Value::Int(1)));
            assert_eq!(report.output("neg", "out"), Some(&Value::Null));
            assert_eq!(report.output("boom", "out"), Some(&Value::Null));

            let neg = report.failure("neg").expect("overflow is recorded");
            assert!(matches!(
                neg.error,
                EngineError::InvocationFailure { ref message, .. } if message.contains("overflow")
            ));
            let boom = report.failure("boom").expect("panic is recorded");
            assert!(matches!(
                boom.error,
                EngineError::InvocationFailure { ref message, .. } if message.contains("exploded")
            ));
        }
    }

    #[test]
    fn test_parallel_records_failures_in_plan_order() {
        let graph = Graph::new(
            vec![
                inline_node("f1", "bad1", &[], "missing_name"),
                inline_node("ok", "fine", &[], "1"),
                inline_node("f2", "bad2", &[], "1 / 0"),
            ],
            Vec::new(),
        )
        .unwrap();
        let report = Engine::builder()
            .with_mode(ExecutionMode::Parallel { workers: 3 })
            .build()
            .run(&graph)
            .unwrap();
        let failed: Vec<&str> = report.failures.iter().map(|f| f.node_id.as_str()).collect();
        assert_eq!(failed, vec!["f1", "f2"]);
        assert_eq!(report.output("ok", "out"), Some(&Value::Int(1)));
    }

    fn run_cancelled_after_first(mode: ExecutionMode) -> (ExecutionReport, Vec<&'static str>) {
        let token = CancelToken::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut registry = Registry::new();
        for id in ["a", "b", "c"] {
            let token = token.clone();
            let seen = Arc::clone(&seen);
            registry.register(id, move |_: &Arguments| {
                seen.lock().unwrap().push(id);
                if id == "a" {
                    token.cancel();
                }
                Ok(Value::Int(1))
            });
        }
        let graph = Graph::new(
            vec![
                NodeDefinition::new("a", "a").output("o"),
                NodeDefinition::new("b", "b").input(InputSpec::new("v")).output("o"),
                NodeDefinition::new("c", "c").input(InputSpec::new("v")).output("o"),
            ],
            vec![Connection::new("a", "o", "b", "v"), Connection::new("b", "o", "c", "v")],
        )
        .unwrap();

        let engine = Engine::builder().with_registry(registry).with_mode(mode).build();
        let report = engine.run_with_cancel(&graph, token).unwrap();
        let seen = seen.lock().unwrap().clone();
        (report, seen)
    }

    #[test]
    fn test_cancellation_stops_dispatch() {
        for mode in [ExecutionMode::Sequential, ExecutionMode::Parallel { workers: 2 }] {
            let (report, seen) = run_cancelled_after_first(mode);
            assert!(report.cancelled, "{:?}", mode);
            assert_eq!(seen, vec!["a"]);
            assert!(report.outputs.contains_key("a"));
            assert!(!report.outputs.contains_key("b"));
            assert!(!report.is_success());
        }
    }

    #[test]
    fn test_engines_do_not_share_registries() {
        let first = ab_engine();
        let second = Engine::builder()
            .with_registry(Registry::new().with("A", |_: &Arguments| Ok(Value::Int(21))))
            .build();
        let graph = ab_graph();
        assert_eq!(first.run(&graph).unwrap().output("B", "result"), Some(&Value::Int(10)));
        assert_eq!(second.run(&graph).unwrap().output("B", "result"), Some(&Value::Int(42)));
    }

    #[test]
    fn test_execute_dispatches_on_backend_choice() {
        let engine = ab_engine();
        let graph = ab_graph();
        let run = engine.execute(BackendChoice::Interpreter, &graph).unwrap();
        assert_eq!(run.report().and_then(|r| r.output("A", "x")), Some(&Value::Int(5)));
        let generated = engine.execute(BackendChoice::Generator, &graph).unwrap();
        assert!(generated.program().is_some_and(|p| p.contains("def double")));
    }
}
