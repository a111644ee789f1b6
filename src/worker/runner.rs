use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::args::SpawningMode;
use crate::error::AppResult;

use super::{Worker, WorkerHandle, WorkerJoin, WorkerReport};

/// Strategy that puts a worker on an execution unit.
pub trait Runner: Send + Sync {
    /// # Errors
    ///
    /// Returns an error when the execution unit cannot be created.
    fn spawn(&self, worker: Worker) -> AppResult<WorkerHandle>;
}

/// Picks the runner for a spawning mode.
#[must_use]
pub fn runner_for(mode: SpawningMode) -> Arc<dyn Runner> {
    match mode {
        SpawningMode::Tasks => Arc::new(TaskRunner),
        SpawningMode::Threads => Arc::new(ThreadRunner),
    }
}

/// One tokio task per worker on the current runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskRunner;

impl Runner for TaskRunner {
    fn spawn(&self, worker: Worker) -> AppResult<WorkerHandle> {
        let handle = worker.handle_parts();
        let join = tokio::spawn(worker.run());
        Ok(handle.with_join(WorkerJoin::Task(join)))
    }
}

/// One OS thread per worker, each driving its own current-thread runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRunner;

impl Runner for ThreadRunner {
    fn spawn(&self, worker: Worker) -> AppResult<WorkerHandle> {
        let handle = worker.handle_parts();
        let id = worker.id();
        let (tx, rx) = oneshot::channel::<WorkerReport>();
        std::thread::Builder::new()
            .name(format!("pecker-{}", id))
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        error!(pecker = id, "Failed to build worker runtime: {}", err);
                        if tx.send(WorkerReport::failed_to_start(id)).is_err() {
                            debug!(pecker = id, "Worker handle dropped before start failure");
                        }
                        return;
                    }
                };
                let report = runtime.block_on(worker.run());
                if tx.send(report).is_err() {
                    debug!(pecker = id, "Worker handle dropped before report");
                }
            })?;
        Ok(handle.with_join(WorkerJoin::Thread(rx)))
    }
}
