// src/engine/core.rs

//! Synchronous heart of the runtime.
//!
//! [`CoreRuntime`] owns the scheduler and nothing else: feed it events, get
//! back [`CoreStep`]s. It never awaits or touches the filesystem, so tests
//! can walk a whole pipeline by hand (see `tests/core_runtime.rs`).

use crate::dag::{Scheduler, TaskRunState};
use crate::engine::event_handlers::{
    CoreStep, handle_abort, handle_run_start, handle_task_completion, handle_task_progress,
    handle_task_started,
};
use crate::engine::{RunReport, RuntimeEvent, TaskId};

#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }

    pub fn start(&mut self) -> CoreStep {
        handle_run_start(&mut self.scheduler)
    }

    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        let scheduler = &mut self.scheduler;
        match event {
            RuntimeEvent::TaskStarted { task } => handle_task_started(scheduler, task),
            RuntimeEvent::TaskProgressed { task, event } => {
                handle_task_progress(scheduler, task, event)
            }
            RuntimeEvent::TaskCompleted { task, outcome } => {
                handle_task_completion(scheduler, task, outcome)
            }
            RuntimeEvent::AbortRequested => handle_abort(scheduler),
        }
    }

    pub fn task_count(&self) -> usize {
        self.scheduler.graph().len()
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    pub fn state_of(&self, task: TaskId) -> Option<TaskRunState> {
        self.scheduler.state_of(task)
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn report(&self) -> RunReport {
        self.scheduler.report()
    }
}
