// src/exec/executor_loop.rs

//! Background loop owning every dispatched task attempt.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::dag::ScheduledTask;
use crate::engine::{RuntimeEvent, TaskId};
use crate::exec::backend::ExecutionEnv;
use crate::exec::task_runner::run_task;

#[derive(Debug)]
pub enum ExecutorMessage {
    Run(ScheduledTask),
    Terminate(Vec<TaskId>),
}

struct Attempt {
    /// Taken on the first terminate request.
    stop: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

struct Executor {
    env: ExecutionEnv,
    permits: Arc<Semaphore>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    attempts: HashMap<TaskId, Attempt>,
}

impl Executor {
    fn launch(&mut self, task: ScheduledTask) {
        let id = task.id;
        let (stop_tx, stop_rx) = oneshot::channel();
        let join = tokio::spawn(run_task(
            task,
            self.env.clone(),
            Arc::clone(&self.permits),
            self.runtime_tx.clone(),
            stop_rx,
        ));
        self.attempts.insert(
            id,
            Attempt {
                stop: Some(stop_tx),
                join,
            },
        );
    }

    fn stop(&mut self, id: TaskId) {
        match self.attempts.get_mut(&id).and_then(|a| a.stop.take()) {
            Some(stop) => {
                info!(task = %id, "terminating");
                // A closed receiver means the attempt already finished.
                let _ = stop.send(());
            }
            None => debug!(task = %id, "nothing to terminate"),
        }
    }

    fn forget_finished(&mut self) {
        self.attempts.retain(|_, a| !a.join.is_finished());
    }
}

/// Start the loop and return the channel feeding it.
///
/// Every `Run` gets its own tokio task straight away; the shared semaphore
/// (`max_parallel` permits) decides when it actually starts running.
pub fn spawn_executor(
    env: ExecutionEnv,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> mpsc::Sender<ExecutorMessage> {
    let (tx, mut rx) = mpsc::channel(32);
    let limit = env.max_parallel.max(1);
    let mut executor = Executor {
        env,
        permits: Arc::new(Semaphore::new(limit)),
        runtime_tx,
        attempts: HashMap::new(),
    };

    tokio::spawn(async move {
        debug!(max_parallel = limit, "executor up");
        while let Some(message) = rx.recv().await {
            executor.forget_finished();
            match message {
                ExecutorMessage::Run(task) => executor.launch(task),
                ExecutorMessage::Terminate(ids) => ids.into_iter().for_each(|id| executor.stop(id)),
            }
        }
        debug!("executor down");
    });

    tx
}
