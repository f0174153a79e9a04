// tests/dag_graph.rs

use std::collections::BTreeSet;

use proptest::prelude::*;

use genedag::dag::{DagGraph, EdgeKind, TaskSpec};
use genedag::engine::TaskId;
use genedag::errors::PipelineError;
use genedag::task::InputBinding;
use genedag_test_utils::stub_task::StubTask;

fn spec(name: &str) -> TaskSpec {
    TaskSpec::new(name, StubTask::new(name).arc())
}

/// root -> a -> {b, c}, plus root =follow-on=> sink.
fn fan_out_graph() -> (DagGraph, [TaskId; 5]) {
    let mut g = DagGraph::new();
    let root = g.add_task(spec("root"));
    let a = g.add_task(spec("a"));
    let b = g.add_task(spec("b"));
    let c = g.add_task(spec("c"));
    let sink = g.add_task(spec("sink").bind("all", InputBinding::Collect(vec![b, c])));
    g.add_child(root, a).unwrap();
    g.add_child(a, b).unwrap();
    g.add_child(a, c).unwrap();
    g.add_follow_on(root, sink).unwrap();
    (g, [root, a, b, c, sink])
}

#[test]
fn follow_on_gates_on_the_whole_subtree() {
    let (g, [root, a, b, c, sink]) = fan_out_graph();

    assert_eq!(g.gates_of(sink), BTreeSet::from([root, a, b, c]));
    assert_eq!(g.gates_of(b), BTreeSet::from([a]));
    assert_eq!(g.roots(), vec![root]);
    assert!(g.validate().is_ok());
}

#[test]
fn follow_on_is_not_part_of_the_source_subtree() {
    let (g, [root, a, b, c, sink]) = fan_out_graph();
    let subtree = g.subtree_of(root);

    assert_eq!(subtree, BTreeSet::from([root, a, b, c]));
    assert!(!subtree.contains(&sink));
}

#[test]
fn execution_order_places_the_follow_on_last() {
    let (g, ids) = fan_out_graph();
    let order = g.execution_order().unwrap();
    assert_eq!(order, ids.to_vec());
}

#[test]
fn rejected_edge_leaves_graph_unchanged() {
    let (mut g, [root, a, b, _c, sink]) = fan_out_graph();
    let before = g.to_string();

    let err = g.add_child(b, root).unwrap_err();
    assert!(matches!(err, PipelineError::Cycle(_)));

    // sink already waits for a's subtree; making a wait for sink deadlocks.
    let err = g.add_child(sink, a).unwrap_err();
    assert!(matches!(err, PipelineError::Cycle(_)));

    assert_eq!(g.to_string(), before);
    assert!(g.successors_of(b).is_empty());
    assert!(g.validate().is_ok());
}

#[test]
fn self_edge_is_a_cycle() {
    let mut g = DagGraph::new();
    let t = g.add_task(spec("t"));
    assert!(matches!(g.add_child(t, t), Err(PipelineError::Cycle(_))));
    assert!(matches!(g.add_follow_on(t, t), Err(PipelineError::Cycle(_))));
}

#[test]
fn validate_rejects_empty_graph() {
    let g = DagGraph::new();
    assert!(matches!(
        g.validate(),
        Err(PipelineError::UnsatisfiedDependency(_))
    ));
}

#[test]
fn validate_rejects_two_roots() {
    let mut g = DagGraph::new();
    g.add_task(spec("first"));
    g.add_task(spec("second"));

    match g.validate() {
        Err(PipelineError::UnsatisfiedDependency(msg)) => {
            assert!(msg.contains("exactly one root"), "unexpected message: {msg}");
        }
        other => panic!("expected UnsatisfiedDependency, got {other:?}"),
    }
}

#[test]
fn validate_rejects_binding_to_a_sibling() {
    let mut g = DagGraph::new();
    let root = g.add_task(spec("root"));
    let left = g.add_task(spec("left"));
    let right = g.add_task(spec("right").bind("x", InputBinding::Output(left)));
    g.add_child(root, left).unwrap();
    g.add_child(root, right).unwrap();

    match g.validate() {
        Err(PipelineError::UnsatisfiedDependency(msg)) => {
            assert!(msg.contains("left"), "unexpected message: {msg}");
        }
        other => panic!("expected UnsatisfiedDependency, got {other:?}"),
    }
}

#[test]
fn duplicate_edge_is_ignored() {
    let mut g = DagGraph::new();
    let root = g.add_task(spec("root"));
    let child = g.add_task(spec("child"));
    g.add_child(root, child).unwrap();
    g.add_child(root, child).unwrap();

    assert_eq!(g.successors_of(root), &[(child, EdgeKind::Child)]);
    assert_eq!(g.parents_of(child).len(), 1);
}

#[test]
fn find_looks_up_by_name() {
    let (g, [_, a, ..]) = fan_out_graph();
    assert_eq!(g.find("a"), Some(a));
    assert_eq!(g.find("missing"), None);
    assert_eq!(g.name_of(a), "a");
}

/// Task `i > 0` hangs off one earlier task by a child edge and may follow
/// further earlier tasks by follow-on edges.
fn random_graph() -> impl Strategy<Value = (DagGraph, Vec<TaskId>)> {
    (2..12usize).prop_flat_map(|n| {
        proptest::collection::vec(
            (any::<usize>(), proptest::collection::vec(any::<usize>(), 0..3)),
            n,
        )
        .prop_map(move |edges| {
            let mut g = DagGraph::new();
            let ids: Vec<TaskId> = (0..n).map(|i| g.add_task(spec(&format!("t{i}")))).collect();
            for (i, (parent, follows)) in edges.into_iter().enumerate().skip(1) {
                g.add_child(ids[parent % i], ids[i]).unwrap();
                for f in follows {
                    // Follow-ons from an ancestor of i would deadlock and are
                    // rejected; that is fine here.
                    let _ = g.add_follow_on(ids[f % i], ids[i]);
                }
            }
            (g, ids)
        })
    })
}

proptest! {
    #[test]
    fn execution_order_respects_every_gate((g, ids) in random_graph()) {
        prop_assert!(g.validate().is_ok());

        let order = g.execution_order().unwrap();
        prop_assert_eq!(order.len(), ids.len());

        let position: Vec<usize> = {
            let mut pos = vec![0; ids.len()];
            for (p, id) in order.iter().enumerate() {
                pos[id.index()] = p;
            }
            pos
        };

        for id in &ids {
            for gate in g.gates_of(*id) {
                prop_assert!(
                    position[gate.index()] < position[id.index()],
                    "{} must run before {}", g.name_of(gate), g.name_of(*id)
                );
            }
        }
    }
}
