// src/engine/event_handlers.rs

//! One handler per [`crate::engine::RuntimeEvent`] variant.
//!
//! Each takes the scheduler, applies the event and translates the
//! resulting [`SchedulerStep`] into shell commands.

use tracing::{debug, info};

use crate::dag::{ScheduledTask, Scheduler, SchedulerStep};
use crate::engine::{TaskId, TaskOutcome};
use crate::stages::ProgressEvent;

/// Work for the async shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    DispatchTasks(Vec<ScheduledTask>),
    /// The executor answers each of these with a `Cancelled` completion.
    TerminateTasks(Vec<TaskId>),
    RequestExit,
}

#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Executed in order. Terminations come before dispatches.
    pub commands: Vec<CoreCommand>,
    /// `false` once the run has no live tasks left.
    pub keep_running: bool,
}

impl From<SchedulerStep> for CoreStep {
    fn from(step: SchedulerStep) -> Self {
        let SchedulerStep {
            newly_scheduled,
            to_terminate,
            run_just_finished,
            ..
        } = step;

        let mut commands = Vec::with_capacity(3);
        if !to_terminate.is_empty() {
            commands.push(CoreCommand::TerminateTasks(to_terminate));
        }
        if !newly_scheduled.is_empty() {
            commands.push(CoreCommand::DispatchTasks(newly_scheduled));
        }
        if run_just_finished {
            commands.push(CoreCommand::RequestExit);
        }

        CoreStep {
            commands,
            keep_running: !run_just_finished,
        }
    }
}

impl CoreStep {
    fn nothing() -> Self {
        CoreStep {
            commands: Vec::new(),
            keep_running: true,
        }
    }
}

pub fn handle_run_start(scheduler: &mut Scheduler) -> CoreStep {
    scheduler.step_start().into()
}

pub fn handle_task_started(scheduler: &mut Scheduler, task: TaskId) -> CoreStep {
    scheduler.handle_started(task);
    CoreStep::nothing()
}

/// Logged at debug only; the task already reported it at info.
pub fn handle_task_progress(
    scheduler: &mut Scheduler,
    task: TaskId,
    event: ProgressEvent,
) -> CoreStep {
    debug!(task = %scheduler.name_of(task), stage = %event.stage(), "{event}");
    CoreStep::nothing()
}

pub fn handle_task_completion(
    scheduler: &mut Scheduler,
    task: TaskId,
    outcome: TaskOutcome,
) -> CoreStep {
    scheduler.step_completion(task, outcome).into()
}

pub fn handle_abort(scheduler: &mut Scheduler) -> CoreStep {
    info!("abort requested; pending work is cancelled, running work terminated");
    scheduler.abort().into()
}
