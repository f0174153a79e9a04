// src/dag/state_manager.rs

//! Per-run state transitions for tasks in the scheduler.

use tracing::{debug, info, warn};

use crate::dag::task_info::{ScheduledTask, TaskInfo, TaskRunState};
use crate::engine::TaskId;
use crate::errors::{PipelineError, Result};
use crate::task::{InputBinding, ResolvedInput, ResolvedInputs};

/// Manages state transitions over the scheduler's task table (indexed by
/// [`TaskId`]).
pub struct StateManager<'a> {
    tasks: &'a mut [TaskInfo],
}

impl<'a> StateManager<'a> {
    pub fn new(tasks: &'a mut [TaskInfo]) -> Self {
        Self { tasks }
    }

    fn state(&self, id: TaskId) -> Option<TaskRunState> {
        self.tasks.get(id.index()).map(|t| t.state)
    }

    /// Whether every gate of `info` has succeeded.
    fn gates_succeeded(&self, info: &TaskInfo) -> bool {
        info.gates
            .iter()
            .all(|g| self.state(*g) == Some(TaskRunState::Succeeded))
    }

    /// Turn the task's bindings into concrete inputs using the outputs of
    /// already succeeded producers.
    fn resolve_inputs(&self, info: &TaskInfo) -> Result<ResolvedInputs> {
        let mut resolved = ResolvedInputs::new();
        for (name, binding) in &info.bindings {
            let value = match binding {
                InputBinding::Literal(v) => ResolvedInput::Literal(v.clone()),
                InputBinding::Output(producer) => {
                    ResolvedInput::Output(self.output_of(info, name, *producer)?)
                }
                InputBinding::Collect(producers) => ResolvedInput::Collected(
                    producers
                        .iter()
                        .map(|p| self.output_of(info, name, *p))
                        .collect::<Result<Vec<_>>>()?,
                ),
            };
            resolved.insert(name.clone(), value);
        }
        Ok(resolved)
    }

    fn output_of(
        &self,
        consumer: &TaskInfo,
        input: &str,
        producer: TaskId,
    ) -> Result<crate::task::TaskOutput> {
        self.tasks
            .get(producer.index())
            .and_then(|p| p.output.clone())
            .ok_or_else(|| {
                PipelineError::UnsatisfiedDependency(format!(
                    "input '{input}' of task '{}' has no output from {producer}",
                    consumer.name
                ))
            })
    }

    /// Collect tasks that are `Pending` and whose gates all succeeded, mark
    /// them `Ready`, and return them as `ScheduledTask`s.
    ///
    /// A task whose inputs cannot be resolved is marked `Failed` instead and
    /// returned in the second vector.
    pub fn collect_new_ready_tasks(&mut self) -> (Vec<ScheduledTask>, Vec<TaskId>) {
        let candidates: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|info| info.state == TaskRunState::Pending && self.gates_succeeded(info))
            .map(|info| info.id)
            .collect();

        let mut ready = Vec::new();
        let mut failed = Vec::new();

        for id in candidates {
            let resolved = self.resolve_inputs(&self.tasks[id.index()]);
            let info = &mut self.tasks[id.index()];
            match resolved {
                Ok(inputs) => {
                    info!(task = %info.name, stage = %info.kind, "dependencies satisfied; task ready");
                    info.state = TaskRunState::Ready;
                    ready.push(ScheduledTask::from_task_info(info, inputs));
                }
                Err(err) => {
                    warn!(task = %info.name, error = %err, "could not resolve task inputs");
                    info.state = TaskRunState::Failed;
                    info.failure = Some(err.into());
                    failed.push(id);
                }
            }
        }

        (ready, failed)
    }

    /// Mark every task transitively gated on `failed` as `Cancelled`.
    ///
    /// Returns the newly cancelled tasks.
    pub fn cancel_dependents(&mut self, failed: TaskId) -> Vec<TaskId> {
        let mut stack: Vec<TaskId> = self
            .tasks
            .get(failed.index())
            .map(|t| t.gated_by.clone())
            .unwrap_or_default();
        let mut cancelled = Vec::new();

        while let Some(id) = stack.pop() {
            let Some(info) = self.tasks.get_mut(id.index()) else {
                continue;
            };
            match info.state {
                TaskRunState::Pending | TaskRunState::Ready => {
                    info.state = TaskRunState::Cancelled;
                    debug!(task = %info.name, "cancelled due to upstream failure");
                    cancelled.push(id);
                    stack.extend(info.gated_by.iter().copied());
                }
                TaskRunState::Running => {
                    // Cannot happen while gates are respected.
                    warn!(task = %info.name, "dependent already running while upstream failed");
                }
                TaskRunState::Succeeded | TaskRunState::Failed | TaskRunState::Cancelled => {}
            }
        }

        cancelled
    }

    /// Cancel everything that has not started yet.
    ///
    /// Returns `(cancelled, to_terminate)`: the newly cancelled tasks, and
    /// the dispatched tasks (`Ready` or `Running`) the executor must stop.
    pub fn cancel_unfinished(&mut self) -> (Vec<TaskId>, Vec<TaskId>) {
        let mut cancelled = Vec::new();
        let mut to_terminate = Vec::new();

        for info in self.tasks.iter_mut() {
            match info.state {
                TaskRunState::Pending => {
                    info.state = TaskRunState::Cancelled;
                    cancelled.push(info.id);
                }
                TaskRunState::Ready => {
                    info.state = TaskRunState::Cancelled;
                    cancelled.push(info.id);
                    to_terminate.push(info.id);
                }
                TaskRunState::Running => to_terminate.push(info.id),
                _ => {}
            }
        }

        (cancelled, to_terminate)
    }
}
