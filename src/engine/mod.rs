// src/engine/mod.rs

//! Run orchestration: task identity, outcomes and the events that move a
//! run forward.
//!
//! [`core::CoreRuntime`] decides, [`runtime::Runtime`] performs the IO, and
//! [`report::RunReport`] is what a finished run hands back to the caller.

use std::fmt;

use crate::errors::{ErrorKind, PipelineError};
use crate::stages::ProgressEvent;
use crate::task::TaskOutput;

/// Identifier of a task inside one [`crate::dag::DagGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(usize);

impl TaskId {
    pub(crate) fn new(index: usize) -> Self {
        TaskId(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Diagnostics kept for a failed task after its error has been consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub stdout: String,
    pub stderr: String,
}

impl From<PipelineError> for TaskFailure {
    fn from(err: PipelineError) -> Self {
        let kind = err.kind();
        let message = err.to_string();
        match err {
            PipelineError::ExternalCommand { stdout, stderr, .. } => TaskFailure {
                kind,
                message,
                stdout,
                stderr,
            },
            _ => TaskFailure {
                kind,
                message,
                stdout: String::new(),
                stderr: String::new(),
            },
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Outcome of one task attempt for the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded(TaskOutput),
    Failed(TaskFailure),
    /// The attempt was terminated before it finished (abort).
    Cancelled,
}

/// Events flowing into the runtime from the executor and the signal handler.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// The executor began running a dispatched task.
    TaskStarted { task: TaskId },
    /// A running task reported stage progress.
    TaskProgressed { task: TaskId, event: ProgressEvent },
    /// A task attempt ended.
    TaskCompleted { task: TaskId, outcome: TaskOutcome },
    /// Stop scheduling and terminate whatever is in flight (e.g. Ctrl-C).
    AbortRequested,
}

pub mod core;
pub mod event_handlers;
pub mod report;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use report::{FailedTask, RunReport, RunStatus};
pub use runtime::Runtime;
