// src/exec/backend.rs

//! The seam between the runtime and whatever actually runs tasks.
//!
//! [`LocalBackend`] hands work to the in-process executor loop. The test
//! utilities provide a backend that answers with canned outcomes instead.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::dag::ScheduledTask;
use crate::engine::{RuntimeEvent, TaskId};
use crate::errors::{Error, Result};
use crate::exec::launcher::CommandLauncher;
use crate::store::ArtifactStore;

use super::executor_loop::{ExecutorMessage, spawn_executor};

/// Future returned by [`ExecutorBackend`] methods.
pub type BackendFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Contract: every dispatched task produces at most one `TaskStarted` and
/// exactly one `TaskCompleted` on the runtime channel, including tasks that
/// were terminated (they complete as `Cancelled`).
pub trait ExecutorBackend: Send {
    fn spawn_ready_tasks(&mut self, tasks: Vec<ScheduledTask>) -> BackendFuture<'_>;

    fn terminate(&mut self, tasks: Vec<TaskId>) -> BackendFuture<'_>;
}

/// What the executor hands to every task attempt.
#[derive(Debug, Clone)]
pub struct ExecutionEnv {
    pub store: Arc<dyn ArtifactStore>,
    pub launcher: Arc<dyn CommandLauncher>,
    /// Parent of the per-task scratch dirs; `None` uses the system temp dir.
    pub scratch_base: Option<PathBuf>,
    pub max_parallel: usize,
}

/// Runs tasks as tokio tasks in this process, `max_parallel` at a time.
pub struct LocalBackend {
    tx: mpsc::Sender<ExecutorMessage>,
}

impl LocalBackend {
    /// Spawns the executor loop; must be called inside a tokio runtime.
    pub fn new(env: ExecutionEnv, runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            tx: spawn_executor(env, runtime_tx),
        }
    }

    fn post(&self, messages: Vec<ExecutorMessage>) -> BackendFuture<'static> {
        let tx = self.tx.clone();
        Box::pin(async move {
            for message in messages {
                tx.send(message)
                    .await
                    .map_err(|_| Error::msg("executor loop has shut down"))?;
            }
            Ok(())
        })
    }
}

impl ExecutorBackend for LocalBackend {
    fn spawn_ready_tasks(&mut self, tasks: Vec<ScheduledTask>) -> BackendFuture<'_> {
        self.post(tasks.into_iter().map(ExecutorMessage::Run).collect())
    }

    fn terminate(&mut self, tasks: Vec<TaskId>) -> BackendFuture<'_> {
        self.post(vec![ExecutorMessage::Terminate(tasks)])
    }
}
