//! Peckers: one execution unit repeatedly running a navigation.
mod runner;
mod status;
mod stop;


use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::args::HookPolicy;
use crate::navigation::{IterationContext, Navigation};
use crate::scenario::Window;

pub use runner::{Runner, TaskRunner, ThreadRunner, runner_for};
pub use status::{StatusCell, WorkerStatus};
pub use stop::StopFlag;

/// Shared origin for elapsed-time checks across a spawner's workers.
#[derive(Debug, Clone, Copy)]
pub struct RunClock {
    started: Instant,
}

impl RunClock {
    #[must_use]
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    #[must_use]
    pub fn at(&self, offset: Duration) -> Instant {
        self.started.checked_add(offset).unwrap_or(self.started)
    }
}

/// Per-worker knobs resolved from settings and the navigation plan.
#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    pub hook_policy: HookPolicy,
    pub each_iteration_is_transaction: bool,
    pub max_iterations: Option<u64>,
    /// Passive mode only.
    pub window: Option<Window>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    pub id: u64,
    pub iterations: u64,
    pub failed: bool,
}

impl WorkerReport {
    const fn failed_to_start(id: u64) -> Self {
        Self {
            id,
            iterations: 0,
            failed: true,
        }
    }
}

pub struct Worker {
    id: u64,
    navigation: Box<dyn Navigation>,
    ctx: IterationContext,
    options: WorkerOptions,
    clock: RunClock,
    stop: StopFlag,
    status: Arc<StatusCell>,
}

impl Worker {
    #[must_use]
    pub fn new(
        navigation: Box<dyn Navigation>,
        ctx: IterationContext,
        options: WorkerOptions,
        clock: RunClock,
    ) -> Self {
        Self {
            id: ctx.identity().pecker_id,
            navigation,
            ctx,
            options,
            clock,
            stop: StopFlag::new(),
            status: Arc::new(StatusCell::default()),
        }
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    fn handle_parts(&self) -> PendingHandle {
        PendingHandle {
            id: self.id,
            stop: self.stop.clone(),
            status: Arc::clone(&self.status),
        }
    }

    /// Runs the worker to completion and reports how it went.
    pub async fn run(mut self) -> WorkerReport {
        let mut report = WorkerReport {
            id: self.id,
            iterations: 0,
            failed: false,
        };

        if let Some(window) = self.options.window {
            self.status.advance(WorkerStatus::Waiting);
            tokio::select! {
                () = self.stop.wait() => {}
                () = tokio::time::sleep_until(self.clock.at(window.start)) => {}
            }
            if self.stop.is_set() {
                self.finish(&report);
                return report;
            }
        }

        self.status.advance(WorkerStatus::Running);
        debug!(pecker = self.id, navigation = %self.ctx.identity().navigation_name, "Pecker running");

        if let Err(err) = self.prepare().await {
            report.failed = true;
            self.fail(err).await;
            self.finish(&report);
            return report;
        }

        while !self.should_exit(report.iterations) {
            self.ctx.set_iteration(report.iterations);
            if let Err(err) = self.iterate().await {
                report.failed = true;
                self.fail(err).await;
                break;
            }
            report.iterations = report.iterations.saturating_add(1);
        }

        self.status.advance(WorkerStatus::Stopping);
        if !report.failed
            && self.options.hook_policy == HookPolicy::PerWorker
            && !self.stop.is_emergency()
            && let Err(err) = self.navigation.teardown(&mut self.ctx).await
        {
            report.failed = true;
            self.fail(err).await;
        }
        self.finish(&report);
        report
    }

    async fn prepare(&mut self) -> Result<(), crate::error::NavigationError> {
        self.navigation.configure(&mut self.ctx).await?;
        if self.options.hook_policy == HookPolicy::PerWorker {
            self.navigation.setup(&mut self.ctx).await?;
        }
        Ok(())
    }

    async fn iterate(&mut self) -> Result<(), crate::error::NavigationError> {
        let per_iteration = self.options.hook_policy == HookPolicy::PerIteration;
        if per_iteration {
            self.navigation.setup(&mut self.ctx).await?;
        }
        let wrapper = self
            .options
            .each_iteration_is_transaction
            .then(|| format!("{}_transaction", self.ctx.identity().navigation_name));
        if let Some(name) = wrapper.as_deref() {
            self.ctx.start_transaction(name);
        }
        self.navigation.steps(&mut self.ctx).await?;
        if let Some(name) = wrapper.as_deref() {
            self.ctx.end_transaction(name).await?;
        }
        if per_iteration {
            self.navigation.teardown(&mut self.ctx).await?;
        }
        Ok(())
    }

    fn should_exit(&self, iterations: u64) -> bool {
        if self.stop.is_set() {
            return true;
        }
        if let Some(window) = self.options.window
            && self.clock.elapsed() >= window.stop
        {
            return true;
        }
        self.options
            .max_iterations
            .is_some_and(|max| iterations >= max)
    }

    async fn fail(&mut self, err: crate::error::NavigationError) {
        error!(
            pecker = self.id,
            navigation = %self.ctx.identity().navigation_name,
            iteration = self.ctx.iteration(),
            "Navigation failed: {}", err
        );
        self.ctx.abandon_open_transactions().await;
        self.ctx.record_event("error", err.to_string()).await;
    }

    fn finish(&self, report: &WorkerReport) {
        self.status.advance(WorkerStatus::Stopping);
        self.status.advance(WorkerStatus::Stopped);
        debug!(
            pecker = self.id,
            iterations = report.iterations,
            "Pecker stopped"
        );
    }
}

/// Handle half that exists before the runner has a join primitive.
struct PendingHandle {
    id: u64,
    stop: StopFlag,
    status: Arc<StatusCell>,
}

impl PendingHandle {
    fn with_join(self, join: WorkerJoin) -> WorkerHandle {
        WorkerHandle {
            id: self.id,
            stop: self.stop,
            status: self.status,
            join,
        }
    }
}

enum WorkerJoin {
    Task(tokio::task::JoinHandle<WorkerReport>),
    Thread(oneshot::Receiver<WorkerReport>),
}

/// Engine-side view of a live worker.
pub struct WorkerHandle {
    id: u64,
    stop: StopFlag,
    status: Arc<StatusCell>,
    join: WorkerJoin,
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .field("status", &self.status.load())
            .finish_non_exhaustive()
    }
}

impl WorkerHandle {
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn status(&self) -> WorkerStatus {
        self.status.load()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status.load().is_terminal()
    }

    /// Sets the cooperative stop flag; the worker reads as stopping from here on.
    pub fn request_stop(&self) {
        self.stop.request_stop();
        self.status.advance(WorkerStatus::Stopping);
    }

    pub fn request_emergency_stop(&self) {
        self.stop.request_emergency_stop();
        self.status.advance(WorkerStatus::Stopping);
    }

    #[must_use]
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Waits until the worker has exited.
    pub async fn join(self) -> WorkerReport {
        let outcome = match self.join {
            WorkerJoin::Task(handle) => handle.await.map_err(|err| err.to_string()),
            WorkerJoin::Thread(rx) => rx.await.map_err(|err| err.to_string()),
        };
        outcome.unwrap_or_else(|err| {
            warn!(pecker = self.id, "Pecker ended abnormally: {}", err);
            self.status.advance(WorkerStatus::Stopped);
            WorkerReport::failed_to_start(self.id)
        })
    }
}
