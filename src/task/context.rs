// src/task/context.rs

//! Per-attempt execution context handed to [`super::Task::run`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::engine::{RuntimeEvent, TaskId};
use crate::errors::{PipelineError, Result};
use crate::exec::launcher::{CommandLauncher, CommandOutput, ExternalCommand};
use crate::stages::ProgressEvent;
use crate::store::{ArtifactHandle, ArtifactStore};
use crate::task::{ResolvedInput, ResolvedInputs, ResourceHints, TaskOutput};

/// Everything a task may touch while running: its resolved inputs, the
/// artifact store, a private scratch directory and the command launcher.
///
/// The scratch directory is removed when the context is dropped. Anything a
/// task wants to keep must go into the store.
#[derive(Debug)]
pub struct TaskContext {
    task: TaskId,
    name: String,
    inputs: ResolvedInputs,
    resources: ResourceHints,
    store: Arc<dyn ArtifactStore>,
    launcher: Arc<dyn CommandLauncher>,
    scratch: TempDir,
    progress: Option<mpsc::Sender<RuntimeEvent>>,
}

impl TaskContext {
    /// Build a context with a fresh scratch directory under `scratch_base`
    /// (or the system temp dir when `None`).
    pub fn new(
        task: TaskId,
        name: impl Into<String>,
        inputs: ResolvedInputs,
        resources: ResourceHints,
        store: Arc<dyn ArtifactStore>,
        launcher: Arc<dyn CommandLauncher>,
        scratch_base: Option<&Path>,
    ) -> Result<Self> {
        let scratch = match scratch_base {
            Some(base) => {
                std::fs::create_dir_all(base)?;
                tempfile::Builder::new().prefix("task-").tempdir_in(base)?
            }
            None => tempfile::Builder::new().prefix("genedag-task-").tempdir()?,
        };

        Ok(Self {
            task,
            name: name.into(),
            inputs,
            resources,
            store,
            launcher,
            scratch,
            progress: None,
        })
    }

    /// Forward progress events to the runtime as well as to the log.
    pub fn with_progress(mut self, tx: mpsc::Sender<RuntimeEvent>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn id(&self) -> TaskId {
        self.task
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resources(&self) -> ResourceHints {
        self.resources
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    pub fn inputs(&self) -> &ResolvedInputs {
        &self.inputs
    }

    pub fn input(&self, name: &str) -> Result<&ResolvedInput> {
        self.inputs.get(name).ok_or_else(|| {
            PipelineError::UnsatisfiedDependency(format!(
                "task '{}' has no input named '{name}'",
                self.name
            ))
        })
    }

    pub fn literal(&self, name: &str) -> Result<&str> {
        match self.input(name)? {
            ResolvedInput::Literal(value) => Ok(value),
            _ => Err(self.wrong_shape(name, "a literal")),
        }
    }

    /// The single upstream handle bound to `name`.
    pub fn artifact(&self, name: &str) -> Result<&ArtifactHandle> {
        match self.input(name)? {
            ResolvedInput::Output(TaskOutput::Artifact(handle)) => Ok(handle),
            _ => Err(self.wrong_shape(name, "a single artifact")),
        }
    }

    /// The ordered upstream outputs bound to `name`.
    pub fn collected(&self, name: &str) -> Result<&[TaskOutput]> {
        match self.input(name)? {
            ResolvedInput::Collected(outputs) => Ok(outputs),
            _ => Err(self.wrong_shape(name, "a collection of outputs")),
        }
    }

    fn wrong_shape(&self, name: &str, expected: &str) -> PipelineError {
        PipelineError::UnsatisfiedDependency(format!(
            "input '{name}' of task '{}' is not {expected}",
            self.name
        ))
    }

    /// Materialise `handle` as `file_name` inside the scratch directory.
    pub fn materialize(&self, handle: &ArtifactHandle, file_name: &str) -> Result<PathBuf> {
        let dest = self.scratch.path().join(file_name);
        self.store.materialize(handle, &dest)
    }

    /// Store a file (typically one an external tool wrote into scratch).
    pub fn put_file(&self, path: &Path) -> Result<ArtifactHandle> {
        let handle = self.store.put_file(path)?;
        debug!(task = %self.name, path = %path.display(), handle = %handle, "stored task output");
        Ok(handle)
    }

    /// Run an external binary through the run's launcher.
    pub async fn run_command(&self, command: &ExternalCommand) -> Result<CommandOutput> {
        self.launcher
            .launch(command, &self.resources, &self.name)
            .await
    }

    /// Report stage progress.
    pub fn report(&self, event: ProgressEvent) {
        info!(task = %self.name, stage = %event.stage(), "{event}");
        if let Some(tx) = &self.progress {
            // Progress is advisory; a full channel only loses the echo.
            let _ = tx.try_send(RuntimeEvent::TaskProgressed {
                task: self.task,
                event,
            });
        }
    }
}
