use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use genedag::dag::ScheduledTask;
use genedag::engine::{RuntimeEvent, TaskFailure, TaskId, TaskOutcome};
use genedag::errors::{ErrorKind, PipelineError, Result};
use genedag::exec::{BackendFuture, ExecutorBackend};
use genedag::store::{ArtifactStore, MemoryArtifactStore};
use genedag::task::TaskOutput;
use tokio::sync::mpsc;

/// Backend that never runs anything.
///
/// Each dispatched task is logged by name, reported started, and then
/// completed on the spot: failed if its name was registered with
/// [`FakeExecutor::failing`], otherwise succeeded with an in-memory artifact
/// containing the name. Names registered with [`FakeExecutor::hanging`] stay
/// running until the runtime terminates them.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<String>>>,
    store: Arc<MemoryArtifactStore>,
    failing: HashSet<String>,
    hanging: HashSet<String>,
    terminated: Arc<Mutex<Vec<TaskId>>>,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, executed: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            runtime_tx,
            executed,
            store: Arc::new(MemoryArtifactStore::new()),
            failing: HashSet::new(),
            hanging: HashSet::new(),
            terminated: Arc::default(),
        }
    }

    pub fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_owned());
        self
    }

    pub fn hanging(mut self, name: &str) -> Self {
        self.hanging.insert(name.to_owned());
        self
    }

    pub fn store(&self) -> Arc<MemoryArtifactStore> {
        Arc::clone(&self.store)
    }

    pub fn terminated(&self) -> Arc<Mutex<Vec<TaskId>>> {
        Arc::clone(&self.terminated)
    }

    fn outcome_for(&self, name: &str) -> Result<TaskOutcome> {
        if self.failing.contains(name) {
            return Ok(TaskOutcome::Failed(TaskFailure {
                kind: ErrorKind::ExternalCommand,
                message: format!("{name} exited with code 1"),
                stdout: String::new(),
                stderr: format!("{name} failed"),
            }));
        }
        let handle = self.store.put_bytes(name.as_bytes())?;
        Ok(TaskOutcome::Succeeded(TaskOutput::Artifact(handle)))
    }
}

async fn emit(tx: &mpsc::Sender<RuntimeEvent>, event: RuntimeEvent) -> Result<()> {
    tx.send(event)
        .await
        .map_err(|e| PipelineError::from(anyhow::Error::msg(e.to_string())))
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_tasks(&mut self, tasks: Vec<ScheduledTask>) -> BackendFuture<'_> {
        Box::pin(async move {
            for ScheduledTask { id, name, .. } in tasks {
                self.executed.lock().unwrap().push(name.clone());
                emit(&self.runtime_tx, RuntimeEvent::TaskStarted { task: id }).await?;
                if self.hanging.contains(&name) {
                    continue;
                }
                let outcome = self.outcome_for(&name)?;
                emit(&self.runtime_tx, RuntimeEvent::TaskCompleted { task: id, outcome }).await?;
            }
            Ok(())
        })
    }

    fn terminate(&mut self, tasks: Vec<TaskId>) -> BackendFuture<'_> {
        Box::pin(async move {
            for id in tasks {
                self.terminated.lock().unwrap().push(id);
                let cancelled = RuntimeEvent::TaskCompleted {
                    task: id,
                    outcome: TaskOutcome::Cancelled,
                };
                emit(&self.runtime_tx, cancelled).await?;
            }
            Ok(())
        })
    }
}
