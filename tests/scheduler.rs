// tests/scheduler.rs

use std::collections::HashSet;

use proptest::prelude::*;

use genedag::dag::{DagGraph, Scheduler, TaskRunState, TaskSpec};
use genedag::engine::{RunStatus, TaskFailure, TaskId, TaskOutcome};
use genedag::errors::ErrorKind;
use genedag::stages::build_pipeline;
use genedag::store::{ArtifactStore, MemoryArtifactStore};
use genedag::task::{InputBinding, TaskOutput};
use genedag_test_utils::builders::ConfigFileBuilder;
use genedag_test_utils::init_tracing;
use genedag_test_utils::stub_task::StubTask;

fn pipeline_scheduler(partitions: &[&str]) -> Scheduler {
    let cfg = ConfigFileBuilder::new().with_partitions(partitions).build();
    Scheduler::new(build_pipeline(&cfg).unwrap()).unwrap()
}

fn id(scheduler: &Scheduler, name: &str) -> TaskId {
    scheduler
        .graph()
        .find(name)
        .unwrap_or_else(|| panic!("no task named {name}"))
}

fn success(store: &MemoryArtifactStore, name: &str) -> TaskOutcome {
    TaskOutcome::Succeeded(TaskOutput::Artifact(store.put_bytes(name.as_bytes()).unwrap()))
}

fn failure(stderr: &str) -> TaskOutcome {
    TaskOutcome::Failed(TaskFailure {
        kind: ErrorKind::ExternalCommand,
        message: "external command 'magma' exited with code 1".to_string(),
        stdout: String::new(),
        stderr: stderr.to_string(),
    })
}

/// Start and succeed `name`, returning the names dispatched as a result.
fn succeed(scheduler: &mut Scheduler, store: &MemoryArtifactStore, name: &str) -> Vec<String> {
    let task = id(scheduler, name);
    scheduler.handle_started(task);
    scheduler
        .handle_completion(task, success(store, name))
        .into_iter()
        .map(|t| t.name)
        .collect()
}

#[test]
fn only_the_root_is_ready_at_start() {
    init_tracing();
    let mut scheduler = pipeline_scheduler(&["1", "2", "3"]);

    let ready: Vec<String> = scheduler.start().into_iter().map(|t| t.name).collect();
    assert_eq!(ready, vec!["make_snp_location_file"]);

    let root = id(&scheduler, "make_snp_location_file");
    assert_eq!(scheduler.state_of(root), Some(TaskRunState::Ready));
    scheduler.handle_started(root);
    assert_eq!(scheduler.state_of(root), Some(TaskRunState::Running));
}

#[test]
fn merge_waits_for_every_partition() {
    init_tracing();
    let store = MemoryArtifactStore::new();
    let mut scheduler = pipeline_scheduler(&["1", "2", "3"]);
    scheduler.start();

    assert_eq!(
        succeed(&mut scheduler, &store, "make_snp_location_file"),
        vec!["annotate_summary_stats"]
    );
    assert_eq!(
        succeed(&mut scheduler, &store, "annotate_summary_stats"),
        vec!["test_gene_sets[1]", "test_gene_sets[2]", "test_gene_sets[3]"]
    );

    let merge = id(&scheduler, "merge_test_sets");
    assert!(succeed(&mut scheduler, &store, "test_gene_sets[3]").is_empty());
    assert!(succeed(&mut scheduler, &store, "test_gene_sets[1]").is_empty());
    assert_eq!(scheduler.state_of(merge), Some(TaskRunState::Pending));
    assert_eq!(scheduler.gates_satisfied(merge), Some(false));

    let ready = succeed(&mut scheduler, &store, "test_gene_sets[2]");
    assert_eq!(ready, vec!["merge_test_sets"]);
    assert!(!scheduler.is_finished());

    succeed(&mut scheduler, &store, "merge_test_sets");
    assert!(scheduler.is_finished());

    let report = scheduler.report();
    assert_eq!(report.status, RunStatus::Succeeded);
    assert!(report.failures.is_empty());
    let final_handle = report
        .final_output
        .as_ref()
        .and_then(|o| o.as_artifact())
        .expect("successful run exposes the merge output");
    assert_eq!(store.read_to_vec(final_handle).unwrap(), b"merge_test_sets");
}

#[test]
fn merge_receives_batches_in_declaration_order() {
    let store = MemoryArtifactStore::new();
    let mut scheduler = pipeline_scheduler(&["1", "2", "3"]);
    scheduler.start();
    succeed(&mut scheduler, &store, "make_snp_location_file");
    succeed(&mut scheduler, &store, "annotate_summary_stats");
    succeed(&mut scheduler, &store, "test_gene_sets[2]");
    succeed(&mut scheduler, &store, "test_gene_sets[3]");

    let task = id(&scheduler, "test_gene_sets[1]");
    scheduler.handle_started(task);
    let ready = scheduler.handle_completion(task, success(&store, "test_gene_sets[1]"));
    assert_eq!(ready.len(), 1);

    let batches = match ready[0].inputs.get("batches") {
        Some(genedag::task::ResolvedInput::Collected(outputs)) => outputs.clone(),
        other => panic!("expected collected batches, got {other:?}"),
    };
    let names: Vec<String> = batches
        .iter()
        .map(|o| {
            let bytes = store.read_to_vec(o.as_artifact().unwrap()).unwrap();
            String::from_utf8(bytes).unwrap()
        })
        .collect();
    assert_eq!(
        names,
        vec!["test_gene_sets[1]", "test_gene_sets[2]", "test_gene_sets[3]"]
    );
}

#[test]
fn failed_partition_cancels_merge_and_fails_the_run() {
    init_tracing();
    let store = MemoryArtifactStore::new();
    let mut scheduler = pipeline_scheduler(&["1", "2", "3"]);
    scheduler.start();
    succeed(&mut scheduler, &store, "make_snp_location_file");
    succeed(&mut scheduler, &store, "annotate_summary_stats");
    succeed(&mut scheduler, &store, "test_gene_sets[1]");

    let two = id(&scheduler, "test_gene_sets[2]");
    scheduler.handle_started(two);
    let ready = scheduler.handle_completion(two, failure("ERROR: no valid genes"));
    assert!(ready.is_empty());

    let merge = id(&scheduler, "merge_test_sets");
    assert_eq!(scheduler.state_of(merge), Some(TaskRunState::Cancelled));
    assert!(!scheduler.is_finished(), "partition 3 is still in flight");

    // Siblings keep running to completion.
    succeed(&mut scheduler, &store, "test_gene_sets[3]");
    assert!(scheduler.is_finished());

    assert_eq!(scheduler.tasks_in_state(TaskRunState::Failed), vec![two]);
    assert_eq!(
        scheduler.failure_of(two).map(|f| f.stderr.as_str()),
        Some("ERROR: no valid genes")
    );

    let report = scheduler.report();
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.failures.len(), 1);
    let failed = report.failure_named("test_gene_sets[2]").unwrap();
    assert_eq!(failed.failure.kind, ErrorKind::ExternalCommand);
    assert_eq!(failed.failure.stderr, "ERROR: no valid genes");
    assert_eq!(report.cancelled, vec!["merge_test_sets".to_string()]);
    assert!(report.final_output.is_none());
    assert!(report.to_string().contains("| ERROR: no valid genes"));
}

#[test]
fn root_failure_cancels_everything() {
    let mut scheduler = pipeline_scheduler(&["1", "2"]);
    scheduler.start();
    let root = id(&scheduler, "make_snp_location_file");
    scheduler.handle_started(root);
    scheduler.handle_completion(root, failure("input missing"));

    assert!(scheduler.is_finished());
    let report = scheduler.report();
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.cancelled.len(), 4);
}

#[test]
fn late_completion_of_terminal_task_is_ignored() {
    let store = MemoryArtifactStore::new();
    let mut scheduler = pipeline_scheduler(&["1"]);
    scheduler.start();
    let root = id(&scheduler, "make_snp_location_file");
    scheduler.handle_started(root);
    scheduler.handle_completion(root, failure("boom"));

    let ready = scheduler.handle_completion(root, success(&store, "late"));
    assert!(ready.is_empty());
    assert_eq!(scheduler.state_of(root), Some(TaskRunState::Failed));
}

#[test]
fn abort_cancels_pending_and_terminates_dispatched() {
    let store = MemoryArtifactStore::new();
    let mut scheduler = pipeline_scheduler(&["1", "2"]);
    scheduler.start();
    succeed(&mut scheduler, &store, "make_snp_location_file");
    succeed(&mut scheduler, &store, "annotate_summary_stats");

    let one = id(&scheduler, "test_gene_sets[1]");
    let two = id(&scheduler, "test_gene_sets[2]");
    let merge = id(&scheduler, "merge_test_sets");
    scheduler.handle_started(one);

    let step = scheduler.abort();
    assert!(scheduler.is_aborted());
    assert_eq!(step.to_terminate, vec![one, two]);
    assert!(step.newly_cancelled.contains(&two));
    assert!(step.newly_cancelled.contains(&merge));
    assert!(!step.run_just_finished);
    assert_eq!(scheduler.state_of(one), Some(TaskRunState::Running));

    let step = scheduler.step_completion(one, TaskOutcome::Cancelled);
    assert!(step.run_just_finished);
    assert!(step.newly_scheduled.is_empty());

    let report = scheduler.report();
    assert_eq!(report.status, RunStatus::Cancelled);
    assert!(report.final_output.is_none());
}

#[test]
fn scheduler_rejects_invalid_graph() {
    let mut g = DagGraph::new();
    g.add_task(TaskSpec::new("a", StubTask::new("a").arc()));
    g.add_task(TaskSpec::new("b", StubTask::new("b").arc()));
    assert!(Scheduler::new(g).is_err());
}

/// A chain `t0 -> t1 -> ... -> tn` where every task reads its parent.
fn chain(n: usize) -> DagGraph {
    let mut g = DagGraph::new();
    let mut prev: Option<TaskId> = None;
    for i in 0..n {
        let name = format!("t{i}");
        let mut spec = TaskSpec::new(&name, StubTask::new(&name).arc());
        if let Some(p) = prev {
            spec = spec.bind("in", InputBinding::Output(p));
        }
        let id = g.add_task(spec);
        if let Some(p) = prev {
            g.add_child(p, id).unwrap();
        }
        prev = Some(id);
    }
    g
}

proptest! {
    #[test]
    fn run_always_terminates(
        partitions in 1..6usize,
        failing in proptest::collection::vec(0..8usize, 0..3),
    ) {
        let keys: Vec<String> = (1..=partitions).map(|k| k.to_string()).collect();
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        let mut scheduler = pipeline_scheduler(&keys);
        let failing: HashSet<usize> = failing.into_iter().collect();
        let store = MemoryArtifactStore::new();

        let mut queue: Vec<TaskId> = scheduler.start().into_iter().map(|t| t.id).collect();
        let mut steps = 0;
        while let Some(task) = queue.pop() {
            steps += 1;
            prop_assert!(steps <= 100, "too many steps");
            scheduler.handle_started(task);
            let outcome = if failing.contains(&task.index()) {
                failure("injected")
            } else {
                success(&store, "ok")
            };
            queue.extend(scheduler.handle_completion(task, outcome).into_iter().map(|t| t.id));
        }

        prop_assert!(scheduler.is_finished());
        let report = scheduler.report();
        let any_failed = (0..partitions + 3).any(|i| failing.contains(&i));
        if any_failed {
            prop_assert_eq!(report.status, RunStatus::Failed);
            prop_assert!(report.final_output.is_none());
        } else {
            prop_assert_eq!(report.status, RunStatus::Succeeded);
            prop_assert!(report.final_output.is_some());
        }
    }

    #[test]
    fn chain_runs_in_order(n in 1..10usize) {
        let store = MemoryArtifactStore::new();
        let mut scheduler = Scheduler::new(chain(n)).unwrap();
        let mut ran = Vec::new();
        let mut queue = scheduler.start();
        while let Some(task) = queue.pop() {
            ran.push(task.id.index());
            scheduler.handle_started(task.id);
            queue.extend(scheduler.handle_completion(task.id, success(&store, &task.name)));
        }
        prop_assert_eq!(ran, (0..n).collect::<Vec<_>>());
    }
}
