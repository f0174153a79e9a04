// src/dag/scheduler.rs

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::dag::graph::DagGraph;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::StateManager;
use crate::dag::task_info::{ScheduledTask, TaskInfo, TaskRunState};
use crate::engine::{FailedTask, RunReport, RunStatus, TaskFailure, TaskId, TaskOutcome};
use crate::errors::Result;
use crate::task::TaskOutput;

/// Scheduler holds the frozen DAG plus mutable per-run state.
///
/// It is responsible for:
/// - deciding when a task is "ready" (every gate succeeded)
/// - resolving a ready task's input bindings from upstream outputs
/// - recording outputs, failures and cancellations
/// - cancelling everything downstream of a failed task
/// - cancelling unfinished work on abort
#[derive(Debug)]
pub struct Scheduler {
    graph: DagGraph,
    tasks: Vec<TaskInfo>,
    aborted: bool,
}

impl Scheduler {
    /// Freeze `graph` for execution. Fails if the graph does not validate.
    pub fn new(graph: DagGraph) -> Result<Self> {
        graph.validate()?;

        let mut tasks: Vec<TaskInfo> = Vec::with_capacity(graph.len());
        for id in graph.tasks() {
            let Some(spec) = graph.spec(id) else { continue };
            tasks.push(TaskInfo {
                id,
                name: spec.name.clone(),
                kind: spec.task.kind(),
                task: spec.task.clone(),
                bindings: spec.bindings.clone(),
                gates: graph.gates_of(id),
                gated_by: Vec::new(),
                state: TaskRunState::Pending,
                output: None,
                failure: None,
            });
        }

        for id in graph.tasks() {
            let gates: Vec<TaskId> = tasks[id.index()].gates.iter().copied().collect();
            for gate in gates {
                tasks[gate.index()].gated_by.push(id);
            }
        }

        Ok(Self {
            graph,
            tasks,
            aborted: false,
        })
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }

    /// Read-only view of the given task's run state.
    pub fn state_of(&self, task: TaskId) -> Option<TaskRunState> {
        self.tasks.get(task.index()).map(|t| t.state)
    }

    pub fn output_of(&self, task: TaskId) -> Option<&TaskOutput> {
        self.tasks.get(task.index()).and_then(|t| t.output.as_ref())
    }

    pub fn failure_of(&self, task: TaskId) -> Option<&TaskFailure> {
        self.tasks.get(task.index()).and_then(|t| t.failure.as_ref())
    }

    pub fn name_of(&self, task: TaskId) -> &str {
        self.graph.name_of(task)
    }

    /// Tasks currently in `state`, in id order.
    pub fn tasks_in_state(&self, state: TaskRunState) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|t| t.state == state)
            .map(|t| t.id)
            .collect()
    }

    /// Whether the dependencies of `task` are all satisfied.
    pub fn gates_satisfied(&self, task: TaskId) -> Option<bool> {
        let info = self.tasks.get(task.index())?;
        Some(
            info.gates
                .iter()
                .all(|g| self.state_of(*g) == Some(TaskRunState::Succeeded)),
        )
    }

    /// Every task is terminal.
    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(|t| t.state.is_terminal())
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Initial ready set (production API).
    pub fn start(&mut self) -> Vec<ScheduledTask> {
        self.step_start().newly_scheduled
    }

    /// Handle completion of a task with a concrete outcome (production API).
    pub fn handle_completion(&mut self, task: TaskId, outcome: TaskOutcome) -> Vec<ScheduledTask> {
        self.step_completion(task, outcome).newly_scheduled
    }

    /// Manual-step variant of `start` that returns a rich [`SchedulerStep`].
    pub fn step_start(&mut self) -> SchedulerStep {
        info!(tasks = self.tasks.len(), "scheduler: starting run");
        self.collect_ready()
    }

    /// The executor picked up `task`.
    pub fn handle_started(&mut self, task: TaskId) {
        match self.tasks.get_mut(task.index()) {
            Some(info) if info.state == TaskRunState::Ready => {
                debug!(task = %info.name, "task started");
                info.state = TaskRunState::Running;
            }
            Some(info) => {
                debug!(task = %info.name, state = %info.state, "start report ignored");
            }
            None => warn!(task = %task, "start report for unknown task; ignoring"),
        }
    }

    /// Manual-step variant of `handle_completion`.
    pub fn step_completion(&mut self, task: TaskId, outcome: TaskOutcome) -> SchedulerStep {
        let Some(info) = self.tasks.get_mut(task.index()) else {
            warn!(task = %task, "completion for unknown task; ignoring");
            return SchedulerStep::default();
        };

        if info.state.is_terminal() {
            warn!(
                task = %info.name,
                state = %info.state,
                "completion for task already in a terminal state; ignoring"
            );
            return SchedulerStep::default();
        }

        let mut step = SchedulerStep::default();

        match outcome {
            TaskOutcome::Succeeded(output) => {
                info!(task = %info.name, "task succeeded");
                info.state = TaskRunState::Succeeded;
                info.output = Some(output);
                if !self.aborted {
                    let ready = self.collect_ready();
                    step.newly_scheduled = ready.newly_scheduled;
                    step.newly_failed = ready.newly_failed;
                    step.newly_cancelled = ready.newly_cancelled;
                }
            }
            TaskOutcome::Failed(failure) => {
                warn!(
                    task = %info.name,
                    error = %failure,
                    "task failed; cancelling dependents"
                );
                info.state = TaskRunState::Failed;
                info.failure = Some(failure);
                step.newly_failed.push(task);
                let mut manager = StateManager::new(&mut self.tasks);
                step.newly_cancelled = manager.cancel_dependents(task);
            }
            TaskOutcome::Cancelled => {
                info!(task = %info.name, "task cancelled");
                info.state = TaskRunState::Cancelled;
                step.newly_cancelled.push(task);
                let mut manager = StateManager::new(&mut self.tasks);
                step.newly_cancelled.extend(manager.cancel_dependents(task));
            }
        }

        step.run_just_finished = self.is_finished();
        step
    }

    /// Stop scheduling. `Pending`/`Ready` tasks become `Cancelled`; the
    /// returned step lists the dispatched tasks the executor must terminate.
    pub fn abort(&mut self) -> SchedulerStep {
        if self.aborted {
            return SchedulerStep::default();
        }
        self.aborted = true;

        let mut manager = StateManager::new(&mut self.tasks);
        let (cancelled, to_terminate) = manager.cancel_unfinished();
        warn!(
            cancelled = cancelled.len(),
            terminating = to_terminate.len(),
            "run aborted"
        );

        SchedulerStep {
            newly_cancelled: cancelled,
            to_terminate,
            run_just_finished: self.is_finished(),
            ..SchedulerStep::default()
        }
    }

    fn collect_ready(&mut self) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        loop {
            let mut manager = StateManager::new(&mut self.tasks);
            let (ready, failed) = manager.collect_new_ready_tasks();
            step.newly_scheduled.extend(ready);
            if failed.is_empty() {
                break;
            }
            for id in failed {
                step.newly_failed.push(id);
                step.newly_cancelled.extend(manager.cancel_dependents(id));
            }
        }
        step.run_just_finished = self.is_finished();
        step
    }

    /// Summary of the run so far; complete once [`Self::is_finished`].
    pub fn report(&self) -> RunReport {
        let failures: Vec<FailedTask> = self
            .tasks
            .iter()
            .filter(|t| t.state == TaskRunState::Failed)
            .map(|t| FailedTask {
                id: t.id,
                name: t.name.clone(),
                failure: t.failure.clone().unwrap_or_else(|| TaskFailure {
                    kind: crate::errors::ErrorKind::Other,
                    message: "task failed without diagnostics".to_string(),
                    stdout: String::new(),
                    stderr: String::new(),
                }),
            })
            .collect();

        let cancelled: Vec<String> = self
            .tasks
            .iter()
            .filter(|t| t.state == TaskRunState::Cancelled)
            .map(|t| t.name.clone())
            .collect();

        let unfinished: BTreeSet<TaskId> = self
            .tasks
            .iter()
            .filter(|t| !t.state.is_terminal())
            .map(|t| t.id)
            .collect();

        let status = if !failures.is_empty() {
            RunStatus::Failed
        } else if !cancelled.is_empty() || self.aborted || !unfinished.is_empty() {
            RunStatus::Cancelled
        } else {
            RunStatus::Succeeded
        };

        // Partial results are not reported: only a fully successful run
        // exposes the sink's output.
        let final_output = if status == RunStatus::Succeeded {
            self.graph
                .execution_order()
                .ok()
                .and_then(|order| order.last().copied())
                .and_then(|sink| self.output_of(sink).cloned())
        } else {
            None
        };

        RunReport {
            status,
            failures,
            cancelled,
            task_states: self.tasks.iter().map(|t| (t.name.clone(), t.state)).collect(),
            final_output,
            durable_paths: Vec::new(),
        }
    }
}
