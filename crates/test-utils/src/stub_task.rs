use std::sync::{Arc, Mutex};
use std::time::Duration;

use genedag::errors::{PipelineError, Result};
use genedag::stages::StageKind;
use genedag::task::{BoxFuture, ResolvedInput, Task, TaskContext, TaskOutput};

/// A task that runs no external binary.
///
/// On success it stores `label(<inputs>)` as its artifact, where `<inputs>`
/// are the contents of every upstream output it received, in binding and
/// collection order. That makes the data flow of a run visible in the final
/// artifact.
#[derive(Debug, Clone)]
pub struct StubTask {
    label: String,
    kind: StageKind,
    delay: Duration,
    failure: Option<String>,
    started: Option<Arc<Mutex<Vec<String>>>>,
}

impl StubTask {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            kind: StageKind::SnpLocation,
            delay: Duration::ZERO,
            failure: None,
            started: None,
        }
    }

    pub fn kind(mut self, kind: StageKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail with an `ExternalCommand` error carrying `stderr`.
    pub fn failing(mut self, stderr: &str) -> Self {
        self.failure = Some(stderr.to_string());
        self
    }

    /// Record the label in `log` when the task starts running.
    pub fn record_start(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.started = Some(log);
        self
    }

    pub fn arc(self) -> Arc<dyn Task> {
        Arc::new(self)
    }
}

fn read_output(ctx: &TaskContext, output: &TaskOutput) -> Result<String> {
    let mut parts = Vec::new();
    for handle in output.handles() {
        let bytes = ctx.store().read_to_vec(handle)?;
        parts.push(String::from_utf8_lossy(&bytes).into_owned());
    }
    Ok(parts.join("+"))
}

impl Task for StubTask {
    fn kind(&self) -> StageKind {
        self.kind.clone()
    }

    fn run<'a>(&'a self, ctx: &'a mut TaskContext) -> BoxFuture<'a, Result<TaskOutput>> {
        Box::pin(async move {
            if let Some(log) = &self.started {
                log.lock().unwrap().push(self.label.clone());
            }

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            if let Some(stderr) = &self.failure {
                return Err(PipelineError::ExternalCommand {
                    program: "stub".to_string(),
                    reason: "exited with code 1".to_string(),
                    stdout: String::new(),
                    stderr: stderr.clone(),
                });
            }

            let mut inputs = Vec::new();
            for input in ctx.inputs().values() {
                match input {
                    ResolvedInput::Literal(v) => inputs.push(v.clone()),
                    ResolvedInput::Output(output) => inputs.push(read_output(ctx, output)?),
                    ResolvedInput::Collected(outputs) => {
                        for output in outputs {
                            inputs.push(read_output(ctx, output)?);
                        }
                    }
                }
            }

            let content = format!("{}({})", self.label, inputs.join(","));
            let handle = ctx.store().put_bytes(content.as_bytes())?;
            Ok(TaskOutput::Artifact(handle))
        })
    }
}
