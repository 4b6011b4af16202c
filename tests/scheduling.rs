//! Ordering tests: topological validity, determinism and cycle detection.
mod common;
use common::*;
use nagare::prelude::*;
use std::collections::HashMap;

fn assert_valid_order(graph: &Graph, order: &[String]) {
    assert_eq!(order.len(), graph.len(), "every node appears exactly once");
    let position: HashMap<&str, usize> =
        order.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
    for conn in graph.connections() {
        assert!(
            position[conn.from_node.as_str()] < position[conn.to_node.as_str()],
            "{} must run before {}",
            conn.from_node,
            conn.to_node
        );
    }
}

#[cfg(test)]
mod scheduling_tests {
    use super::*;

    #[test]
    fn test_ab_graph_orders_producer_first() {
        let order = ab_engine().order(&ab_graph()).expect("acyclic");
        assert_eq!(order, vec!["A", "B"]);
    }

    #[test]
    fn test_pseudo_random_dags_yield_valid_orders() {
        let engine = Engine::builder().build();
        for seed in 0..25 {
            let graph = pseudo_random_dag(30, seed);
            let order = engine.order(&graph).expect("acyclic");
            assert_valid_order(&graph, &order);
        }
    }

    #[test]
    fn test_ties_break_by_declaration_order() {
        let graph = Graph::new(
            vec![
                NodeDefinition::new("z", "z").output("o"),
                NodeDefinition::new("m", "m").output("o"),
                NodeDefinition::new("a", "a").input(InputSpec::new("v")).output("o"),
                NodeDefinition::new("b", "b").output("o"),
            ],
            vec![Connection::new("m", "o", "a", "v")],
        )
        .unwrap();
        let order = Engine::builder().build().order(&graph).unwrap();
        assert_eq!(order, vec!["z", "m", "b", "a"]);
    }

    #[test]
    fn test_order_is_deterministic() {
        let engine = Engine::builder().build();
        let graph = pseudo_random_dag(40, 7);
        let first = engine.order(&graph).unwrap();
        for _ in 0..5 {
            assert_eq!(engine.order(&graph).unwrap(), first);
        }
    }

    #[test]
    fn test_two_node_cycle_is_detected() {
        let graph = Graph::new(
            vec![
                NodeDefinition::new("A", "a").input(InputSpec::new("v")).output("o"),
                NodeDefinition::new("B", "b").input(InputSpec::new("v")).output("o"),
            ],
            vec![Connection::new("A", "o", "B", "v"), Connection::new("B", "o", "A", "v")],
        )
        .unwrap();

        let err = Engine::builder().build().order(&graph).unwrap_err();
        match err {
            EngineError::CycleDetected { nodes } => assert_eq!(nodes, vec!["A", "B"]),
            other => panic!("expected a cycle, got {other}"),
        }
    }

    #[test]
    fn test_cycle_reports_only_stuck_nodes() {
        let graph = Graph::new(
            vec![
                NodeDefinition::new("free", "free").output("o"),
                NodeDefinition::new("x", "x").input(InputSpec::new("v")).output("o"),
                NodeDefinition::new("y", "y").input(InputSpec::new("v")).output("o"),
            ],
            vec![Connection::new("x", "o", "y", "v"), Connection::new("y", "o", "x", "v")],
        )
        .unwrap();

        let err = Engine::builder().build().order(&graph).unwrap_err();
        assert!(matches!(err, EngineError::CycleDetected { ref nodes } if nodes == &["x", "y"]));
        assert!(err.to_string().contains("x, y"));
    }

    #[test]
    fn test_upstream_behavior_supplier_runs_first() {
        // The consumer is declared first and has no data inputs; only its
        // behavior connection orders it after the producer.
        let graph = Graph::new(
            vec![
                NodeDefinition::new("consumer", "shout")
                    .input(InputSpec::new("source"))
                    .output("y"),
                NodeDefinition::new("producer", "emit").output("code"),
            ],
            vec![Connection::new("producer", "code", "consumer", BEHAVIOR_INPUT)],
        )
        .unwrap();
        let order = Engine::builder().build().order(&graph).unwrap();
        assert_eq!(order, vec!["producer", "consumer"]);
    }

    #[test]
    fn test_empty_graph_has_empty_order() {
        let graph = Graph::new(Vec::new(), Vec::new()).unwrap();
        assert!(Engine::builder().build().order(&graph).unwrap().is_empty());
    }
}
