// src/dag/scheduler_step.rs

use crate::dag::task_info::ScheduledTask;
use crate::engine::TaskId;

/// Everything one scheduler transition changed.
///
/// The core runtime turns it into executor commands; tests stepping the
/// scheduler by hand assert on it directly.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Became `Ready`, with inputs resolved; to be dispatched.
    pub newly_scheduled: Vec<ScheduledTask>,
    pub newly_failed: Vec<TaskId>,
    /// Will never run (upstream failure or abort).
    pub newly_cancelled: Vec<TaskId>,
    /// Already dispatched; the executor has to stop them. Only set by abort.
    pub to_terminate: Vec<TaskId>,
    /// This transition left every task terminal.
    pub run_just_finished: bool,
}
