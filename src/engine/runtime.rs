// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::TaskId;
use crate::errors::Result;
use crate::exec::ExecutorBackend;

use super::core::CoreRuntime;
use super::{CoreCommand, CoreStep, RunReport, RuntimeEvent};

/// Async shell around [`CoreRuntime`].
///
/// Pulls `RuntimeEvent`s off the channel, lets the core decide, and carries
/// the resulting commands out against the executor backend. No scheduling
/// decision is made here.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(core: CoreRuntime, event_rx: mpsc::Receiver<RuntimeEvent>, executor: E) -> Self {
        Self {
            core,
            event_rx,
            executor,
        }
    }

    /// Run the pipeline to completion and return its report.
    ///
    /// A closed event channel counts as an abort: the report then shows the
    /// tasks that never finished as cancelled.
    pub async fn run(mut self) -> Result<RunReport> {
        info!(tasks = self.core.task_count(), "pipeline run started");

        let first = self.core.start();
        let mut running = self.apply(first).await?;

        while running {
            let Some(event) = self.event_rx.recv().await else {
                warn!("event channel closed with tasks outstanding; aborting");
                self.core.step(RuntimeEvent::AbortRequested);
                break;
            };
            debug!(?event, "event");
            let step = self.core.step(event);
            running = self.apply(step).await?;
        }

        let report = self.core.report();
        info!(status = %report.status, "pipeline run finished");
        Ok(report)
    }

    /// Carry out the commands of one core step; returns whether to keep going.
    async fn apply(&mut self, step: CoreStep) -> Result<bool> {
        for command in step.commands {
            match command {
                CoreCommand::DispatchTasks(tasks) if !tasks.is_empty() => {
                    debug!(
                        names = ?tasks.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
                        "dispatch"
                    );
                    self.executor.spawn_ready_tasks(tasks).await?;
                }
                CoreCommand::TerminateTasks(ids) if !ids.is_empty() => {
                    self.stop(ids).await?;
                }
                CoreCommand::RequestExit => debug!("every task is terminal"),
                _ => {}
            }
        }
        Ok(step.keep_running)
    }

    async fn stop(&mut self, ids: Vec<TaskId>) -> Result<()> {
        debug!(?ids, "terminate");
        self.executor.terminate(ids).await
    }
}
