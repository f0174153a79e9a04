// src/engine/report.rs

//! End-of-run summary.

use std::fmt;
use std::path::PathBuf;

use crate::dag::TaskRunState;
use crate::engine::{TaskFailure, TaskId};
use crate::task::TaskOutput;

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every task succeeded.
    Succeeded,
    /// At least one task failed.
    Failed,
    /// The run was aborted (or stopped early) without any task failing.
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedTask {
    pub id: TaskId,
    pub name: String,
    pub failure: TaskFailure,
}

/// What a finished run hands back to its caller.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,
    pub failures: Vec<FailedTask>,
    /// Names of tasks that never ran to completion.
    pub cancelled: Vec<String>,
    /// Every task with the state it ended in, in insertion order.
    pub task_states: Vec<(String, TaskRunState)>,
    /// Output of the sink task, only for a successful run. Cleared when the
    /// run's store is removed afterwards; `durable_paths` stays valid.
    pub final_output: Option<TaskOutput>,
    /// Files written to the durable output directory.
    pub durable_paths: Vec<PathBuf>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn failure_named(&self, name: &str) -> Option<&FailedTask> {
        self.failures.iter().find(|f| f.name == name)
    }

    pub fn state_named(&self, name: &str) -> Option<TaskRunState> {
        self.task_states
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, state)| *state)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "run {}", self.status)?;
        for failed in &self.failures {
            writeln!(f, "  failed: {} ({})", failed.name, failed.failure)?;
            let stderr = failed.failure.stderr.trim();
            if !stderr.is_empty() {
                for line in stderr.lines() {
                    writeln!(f, "    | {line}")?;
                }
            }
        }
        if !self.cancelled.is_empty() {
            writeln!(f, "  cancelled: {}", self.cancelled.join(", "))?;
        }
        for path in &self.durable_paths {
            writeln!(f, "  wrote: {}", path.display())?;
        }
        Ok(())
    }
}
