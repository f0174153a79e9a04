// src/exec/task_runner.rs

//! Individual task attempt runner.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Semaphore};
use tracing::{debug, error, info, warn};

use crate::dag::ScheduledTask;
use crate::engine::{RuntimeEvent, TaskFailure, TaskOutcome};
use crate::exec::backend::ExecutionEnv;
use crate::task::TaskContext;

/// Run a single task attempt and emit exactly one `TaskCompleted` event.
///
/// - The attempt waits for a concurrency permit first; `TaskStarted` is sent
///   once it holds one.
/// - If the cancel channel fires (abort), the task future is dropped, which
///   kills any child process it spawned, and the outcome is `Cancelled`.
pub async fn run_task(
    task: ScheduledTask,
    env: ExecutionEnv,
    permits: Arc<Semaphore>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let id = task.id;
    let name = task.name.clone();

    let permit = tokio::select! {
        permit = permits.acquire_owned() => match permit {
            Ok(p) => Some(p),
            Err(e) => {
                error!(task = %name, error = %e, "executor permits closed");
                None
            }
        },
        _ = &mut cancel_rx => {
            info!(task = %name, "task terminated before it started");
            None
        }
    };

    let outcome = match permit {
        Some(_permit) => run_attempt(&task, env, &runtime_tx, &mut cancel_rx).await,
        None => TaskOutcome::Cancelled,
    };

    if runtime_tx
        .send(RuntimeEvent::TaskCompleted { task: id, outcome })
        .await
        .is_err()
    {
        warn!(task = %name, "runtime is gone; dropping TaskCompleted event");
    }
}

async fn run_attempt(
    task: &ScheduledTask,
    env: ExecutionEnv,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
    cancel_rx: &mut oneshot::Receiver<()>,
) -> TaskOutcome {
    let _ = runtime_tx
        .send(RuntimeEvent::TaskStarted { task: task.id })
        .await;

    info!(
        task = %task.name,
        stage = %task.kind,
        resources = %task.resources,
        "starting task"
    );

    let ctx = TaskContext::new(
        task.id,
        task.name.clone(),
        task.inputs.clone(),
        task.resources,
        env.store,
        env.launcher,
        env.scratch_base.as_deref(),
    );
    let mut ctx = match ctx {
        Ok(ctx) => ctx.with_progress(runtime_tx.clone()),
        Err(err) => {
            error!(task = %task.name, error = %err, "could not prepare task context");
            return TaskOutcome::Failed(TaskFailure::from(err));
        }
    };

    // Either the task finishes on its own (normal case), or we receive a
    // termination request and drop the running future.
    let run = task.task.run(&mut ctx);
    tokio::select! {
        result = run => match result {
            Ok(output) => {
                info!(task = %task.name, "task finished");
                TaskOutcome::Succeeded(output)
            }
            Err(err) => {
                error!(task = %task.name, error = %err, "task failed");
                TaskOutcome::Failed(TaskFailure::from(err))
            }
        },
        _ = cancel_rx => {
            debug!(task = %task.name, "dropping running task future");
            info!(task = %task.name, "task terminated");
            TaskOutcome::Cancelled
        }
    }
}
