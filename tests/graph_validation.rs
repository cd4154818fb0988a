// tests/graph_validation.rs

use std::collections::{BTreeMap, HashMap};

use rundag::errors::RundagError;
use rundag::graph::{DependencyGraph, validate_definition, validate_graph, validate_graph_map};
use rundag_test_utils::{GraphBuilder, StepBuilder, graph_from_edges};

fn adjacency(edges: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
    edges
        .iter()
        .map(|(node, deps)| {
            (
                node.to_string(),
                deps.iter().map(|d| d.to_string()).collect(),
            )
        })
        .collect()
}

#[test]
fn diamond_validates() {
    let graph = adjacency(&[("a", &[]), ("b", &["a"]), ("c", &["a"]), ("d", &["b", "c"])]);
    validate_graph(&graph).expect("diamond is acyclic");
}

#[test]
fn disjoint_components_validate() {
    let graph = adjacency(&[("a", &[]), ("b", &["a"]), ("x", &[]), ("y", &["x"])]);
    validate_graph(&graph).expect("two chains are acyclic");
}

#[test]
fn empty_graph_validates() {
    validate_graph(&BTreeMap::new()).expect("no nodes, no cycles");
}

#[test]
fn dangling_dependency_is_unknown_reference() {
    let graph = adjacency(&[("a", &["b"])]);
    match validate_graph(&graph) {
        Err(RundagError::UnknownReference { from, to }) => {
            assert_eq!(from, "a");
            assert_eq!(to, "b");
        }
        other => panic!("expected UnknownReference, got {other:?}"),
    }
}

#[test]
fn two_node_cycle_is_detected() {
    let graph = adjacency(&[("a", &["b"]), ("b", &["a"])]);
    match validate_graph(&graph) {
        Err(RundagError::CycleDetected { path }) => {
            assert!(path.contains(&"a".to_string()));
            assert!(path.contains(&"b".to_string()));
            assert_eq!(path.first(), path.last(), "path should close the cycle");
        }
        other => panic!("expected CycleDetected, got {other:?}"),
    }
}

#[test]
fn self_loop_is_a_cycle() {
    let graph = adjacency(&[("a", &["a"])]);
    match validate_graph(&graph) {
        Err(RundagError::CycleDetected { path }) => {
            assert_eq!(path, vec!["a".to_string(), "a".to_string()]);
        }
        other => panic!("expected CycleDetected, got {other:?}"),
    }
}

#[test]
fn cycle_behind_an_acyclic_prefix_is_detected() {
    // root -> x -> y -> z -> x
    let graph = adjacency(&[
        ("root", &[]),
        ("x", &["root", "z"]),
        ("y", &["x"]),
        ("z", &["y"]),
    ]);
    match validate_graph(&graph) {
        Err(RundagError::CycleDetected { path }) => {
            assert!(!path.contains(&"root".to_string()));
            assert_eq!(path.len(), 4);
        }
        other => panic!("expected CycleDetected, got {other:?}"),
    }
}

#[test]
fn hashmap_adapter_agrees_with_btreemap() {
    let ok: HashMap<String, Vec<String>> = adjacency(&[("a", &[]), ("b", &["a"])])
        .into_iter()
        .collect();
    validate_graph_map(&ok).expect("valid chain");

    let cyclic: HashMap<String, Vec<String>> = adjacency(&[("a", &["b"]), ("b", &["a"])])
        .into_iter()
        .collect();
    assert!(matches!(
        validate_graph_map(&cyclic),
        Err(RundagError::CycleDetected { .. })
    ));
}

#[test]
fn cycle_message_lists_the_path() {
    let graph = adjacency(&[("a", &["b"]), ("b", &["a"])]);
    let err = validate_graph(&graph).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("cycle detected"), "{msg}");
    assert!(msg.contains(" -> "), "{msg}");
}

#[test]
fn definition_schema_bounds_are_enforced() {
    let no_steps = GraphBuilder::new("empty").build();
    assert!(matches!(
        validate_definition(&no_steps),
        Err(RundagError::InvalidDefinition(_))
    ));

    let too_many = GraphBuilder::new("g")
        .with_step(StepBuilder::new("a").replicas(11).build())
        .build();
    assert!(matches!(
        validate_definition(&too_many),
        Err(RundagError::InvalidDefinition(_))
    ));

    let zero = GraphBuilder::new("g")
        .with_step(StepBuilder::new("a").replicas(0).build())
        .build();
    assert!(matches!(
        validate_definition(&zero),
        Err(RundagError::InvalidDefinition(_))
    ));

    let long_name = "s".repeat(41);
    let too_long = GraphBuilder::new("g")
        .with_step(StepBuilder::new(&long_name).build())
        .build();
    assert!(matches!(
        validate_definition(&too_long),
        Err(RundagError::InvalidDefinition(_))
    ));

    let duplicate = GraphBuilder::new("g")
        .with_step(StepBuilder::new("a").build())
        .with_step(StepBuilder::new("a").build())
        .build();
    assert!(matches!(
        validate_definition(&duplicate),
        Err(RundagError::InvalidDefinition(_))
    ));

    let no_image = GraphBuilder::new("g")
        .with_step(StepBuilder::new("a").image("").build())
        .build();
    assert!(matches!(
        validate_definition(&no_image),
        Err(RundagError::InvalidDefinition(_))
    ));
}

#[test]
fn definition_with_dangling_dependency_is_rejected() {
    let graph = graph_from_edges("g", &[("a", &["missing"])]);
    assert!(matches!(
        validate_definition(&graph),
        Err(RundagError::UnknownReference { .. })
    ));
}

#[test]
fn dependency_graph_orders_steps_after_their_dependencies() {
    let graph = graph_from_edges(
        "g",
        &[("d", &["b", "c"]), ("c", &["a"]), ("b", &["a"]), ("a", &[])],
    );
    let deps = DependencyGraph::from_definition(&graph);

    let order = deps.topological_order().expect("acyclic");
    let pos = |name: &str| order.iter().position(|n| n == name).unwrap();
    assert!(pos("a") < pos("b"));
    assert!(pos("a") < pos("c"));
    assert!(pos("b") < pos("d"));
    assert!(pos("c") < pos("d"));

    assert_eq!(deps.roots(), vec!["a"]);
    let mut dependents = deps.dependents_of("a").to_vec();
    dependents.sort();
    assert_eq!(dependents, vec!["b".to_string(), "c".to_string()]);
    assert_eq!(deps.dependencies_of("d").len(), 2);
    assert!(deps.dependencies_of("unknown").is_empty());
}
