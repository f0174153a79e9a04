// src/dag/task_info.rs

//! Task metadata and per-run state management.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::engine::{TaskFailure, TaskId};
use crate::stages::StageKind;
use crate::task::{InputBinding, ResolvedInputs, ResourceHints, Task, TaskOutput};

/// Per-run state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRunState {
    /// Waiting on at least one gate.
    Pending,
    /// All gates succeeded; handed to the executor but not started yet.
    Ready,
    /// The executor reported the task as started.
    Running,
    Succeeded,
    Failed,
    /// Will never run: an upstream task failed or the run was aborted.
    Cancelled,
}

impl TaskRunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskRunState::Succeeded | TaskRunState::Failed | TaskRunState::Cancelled
        )
    }
}

impl fmt::Display for TaskRunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskRunState::Pending => "pending",
            TaskRunState::Ready => "ready",
            TaskRunState::Running => "running",
            TaskRunState::Succeeded => "succeeded",
            TaskRunState::Failed => "failed",
            TaskRunState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Static task information taken from the frozen graph, plus run state.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub id: TaskId,
    pub name: String,
    pub kind: StageKind,
    pub task: Arc<dyn Task>,
    pub bindings: BTreeMap<String, InputBinding>,
    /// Tasks that must succeed before this one is ready.
    pub gates: BTreeSet<TaskId>,
    /// Tasks that list this one among their gates.
    pub gated_by: Vec<TaskId>,

    pub state: TaskRunState,
    pub output: Option<TaskOutput>,
    pub failure: Option<TaskFailure>,
}

/// Description of a task that the scheduler wants the executor to run now.
///
/// Inputs are already resolved: every upstream handle the task reads is in
/// `inputs`.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub name: String,
    pub kind: StageKind,
    pub resources: ResourceHints,
    pub task: Arc<dyn Task>,
    pub inputs: ResolvedInputs,
}

impl ScheduledTask {
    pub fn from_task_info(info: &TaskInfo, inputs: ResolvedInputs) -> Self {
        Self {
            id: info.id,
            name: info.name.clone(),
            kind: info.kind.clone(),
            resources: info.task.resources(),
            task: Arc::clone(&info.task),
            inputs,
        }
    }
}
