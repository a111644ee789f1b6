use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::args::{HandlingMode, HookPolicy};
use crate::error::AppResult;
use crate::navigation::{IterationContext, Registry, WorkerIdentity};
use crate::scenario::{NavigationPlan, Scenario, Window};
use crate::telemetry::{SpawnRecord, TelemetryLog, TelemetryRecord, timestamp_now};
use crate::worker::{
    RunClock, Runner, StopFlag, Worker, WorkerHandle, WorkerOptions, WorkerReport,
};

/// External control of a running engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineSignal {
    #[default]
    Run,
    Stop,
    EmergencyStop,
}

/// How an engine run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineExit {
    Completed,
    Stopped,
    EmergencyStopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineReport {
    pub exit: EngineExit,
    pub spawned: u64,
    pub failed: u64,
    pub iterations: u64,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub handling_mode: HandlingMode,
    pub polling_interval: Duration,
    pub host_name: String,
    pub hook_policy: HookPolicy,
    pub each_iteration_is_transaction: bool,
}

/// Per-host control loop keeping live peckers converged to the scenario plan.
///
/// The engine owns every worker handle; nothing else touches them.
pub struct SpawnerEngine {
    scenario: Arc<Scenario>,
    registry: Arc<Registry>,
    runner: Arc<dyn Runner>,
    log: Arc<TelemetryLog>,
    config: EngineConfig,
    live: BTreeMap<String, VecDeque<WorkerHandle>>,
    retired: Vec<WorkerHandle>,
    next_id: u64,
    spawned: u64,
    failed: u64,
    iterations: u64,
}

impl SpawnerEngine {
    #[must_use]
    pub fn new(
        scenario: Arc<Scenario>,
        registry: Arc<Registry>,
        runner: Arc<dyn Runner>,
        log: Arc<TelemetryLog>,
        config: EngineConfig,
    ) -> Self {
        let live = scenario
            .navigations()
            .map(|plan| (plan.name.clone(), VecDeque::new()))
            .collect();
        Self {
            scenario,
            registry,
            runner,
            log,
            config,
            live,
            retired: Vec::new(),
            next_id: 0,
            spawned: 0,
            failed: 0,
            iterations: 0,
        }
    }

    /// Runs the scenario until it ends or `signal` leaves [`EngineSignal::Run`],
    /// then stops and joins every worker.
    ///
    /// # Errors
    ///
    /// Returns an error only when telemetry for the run cannot be flushed.
    pub async fn run(mut self, mut signal: watch::Receiver<EngineSignal>) -> AppResult<EngineReport> {
        let clock = RunClock::start();
        info!(
            scenario = %self.scenario.name(),
            mode = ?self.config.handling_mode,
            "Spawner engine starting ({:?} total)",
            self.scenario.duration()
        );
        let exit = match self.config.handling_mode {
            HandlingMode::Active => self.run_active(clock, &mut signal).await,
            HandlingMode::Passive => self.run_passive(clock, &mut signal).await,
        };
        let report = self.drain(exit, signal).await;
        info!(
            "Spawner engine finished: {:?}, {} peckers, {} iterations, {} failed",
            report.exit, report.spawned, report.iterations, report.failed
        );
        self.log.flush().await?;
        Ok(report)
    }

    async fn run_active(
        &mut self,
        clock: RunClock,
        signal: &mut watch::Receiver<EngineSignal>,
    ) -> EngineExit {
        let duration = self.scenario.duration();
        let mut ticker = tokio::time::interval(self.config.polling_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                exit = wait_for_stop(signal) => return exit,
                _ = ticker.tick() => {}
            }
            let elapsed = clock.elapsed();
            if elapsed > duration {
                return EngineExit::Completed;
            }
            let scenario = Arc::clone(&self.scenario);
            for plan in scenario.navigations() {
                self.reconcile(plan, elapsed, clock).await;
            }
            self.reap_retired().await;
        }
    }

    /// Brings the live workers of `plan` to the planned count for `elapsed`.
    async fn reconcile(&mut self, plan: &NavigationPlan, elapsed: Duration, clock: RunClock) {
        let planned = plan.planned_at(elapsed);
        if let Some(queue) = self.live.get_mut(&plan.name) {
            let (done, running): (Vec<_>, Vec<_>) =
                queue.drain(..).partition(WorkerHandle::is_finished);
            queue.extend(running);
            self.retired.extend(done);
        }

        let running = self.live_count(&plan.name);
        self.record_spawns(&plan.name, planned, running).await;

        if planned > running {
            for _ in running..planned {
                self.spawn_worker(plan, None, clock);
            }
        } else if running > planned {
            let excess = usize::try_from(running.saturating_sub(planned)).unwrap_or(usize::MAX);
            if let Some(queue) = self.live.get_mut(&plan.name) {
                // oldest first
                let stopping: Vec<_> = queue.drain(..excess.min(queue.len())).collect();
                for handle in &stopping {
                    handle.request_stop();
                }
                self.retired.extend(stopping);
            }
        }
        debug!(
            navigation = %plan.name,
            planned,
            running = self.live_count(&plan.name),
            "Reconciled peckers"
        );
    }

    async fn run_passive(
        &mut self,
        clock: RunClock,
        signal: &mut watch::Receiver<EngineSignal>,
    ) -> EngineExit {
        let scenario = Arc::clone(&self.scenario);
        for plan in scenario.navigations() {
            let windows = plan.windows();
            for window in &windows {
                self.spawn_worker(plan, Some(*window), clock);
            }
            let planned = u64::try_from(windows.len()).unwrap_or(u64::MAX);
            let running = self.live_count(&plan.name);
            self.record_spawns(&plan.name, planned, running).await;
        }
        let remaining = scenario.duration().saturating_sub(clock.elapsed());
        tokio::select! {
            exit = wait_for_stop(signal) => exit,
            () = tokio::time::sleep(remaining) => EngineExit::Completed,
        }
    }

    fn spawn_worker(&mut self, plan: &NavigationPlan, window: Option<Window>, clock: RunClock) {
        let navigation = match self.registry.build(plan) {
            Ok(navigation) => navigation,
            Err(err) => {
                warn!(navigation = %plan.name, "Cannot build navigation: {}", err);
                return;
            }
        };
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        let identity = WorkerIdentity {
            host_name: self.config.host_name.clone(),
            pecker_id: id,
            navigation_name: plan.name.clone(),
        };
        let options = WorkerOptions {
            hook_policy: self.config.hook_policy,
            each_iteration_is_transaction: self.config.each_iteration_is_transaction,
            max_iterations: plan.max_iterations,
            window,
        };
        let ctx = IterationContext::new(identity, Arc::clone(&self.log));
        let worker = Worker::new(navigation, ctx, options, clock);
        match self.runner.spawn(worker) {
            Ok(handle) => {
                self.spawned = self.spawned.saturating_add(1);
                self.live
                    .entry(plan.name.clone())
                    .or_default()
                    .push_back(handle);
            }
            Err(err) => warn!(navigation = %plan.name, "Failed to spawn pecker {}: {}", id, err),
        }
    }

    async fn record_spawns(&self, navigation: &str, planned: u64, running: u64) {
        let record = SpawnRecord {
            host_name: self.config.host_name.clone(),
            timestamp: timestamp_now(),
            navigation_name: navigation.to_owned(),
            planned_spawns: planned,
            running_spawns: running,
        };
        if let Err(err) = self.log.append(TelemetryRecord::Spawn(record)).await {
            warn!("Failed to record spawn counts: {}", err);
        }
    }

    fn live_count(&self, navigation: &str) -> u64 {
        self.live.get(navigation).map_or(0, |queue| {
            u64::try_from(queue.len()).unwrap_or(u64::MAX)
        })
    }

    /// Joins retired workers that have already exited.
    async fn reap_retired(&mut self) {
        let (done, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.retired)
            .into_iter()
            .partition(WorkerHandle::is_finished);
        self.retired = pending;
        for handle in done {
            let report = handle.join().await;
            self.tally(report);
        }
    }

    fn tally(&mut self, report: WorkerReport) {
        self.iterations = self.iterations.saturating_add(report.iterations);
        if report.failed {
            self.failed = self.failed.saturating_add(1);
        }
    }

    /// Signals every remaining worker and waits for all of them to exit.
    async fn drain(
        &mut self,
        exit: EngineExit,
        mut signal: watch::Receiver<EngineSignal>,
    ) -> EngineReport {
        let mut handles = std::mem::take(&mut self.retired);
        for queue in self.live.values_mut() {
            handles.extend(queue.drain(..));
        }
        let emergency = exit == EngineExit::EmergencyStopped;
        for handle in &handles {
            if emergency {
                handle.request_emergency_stop();
            } else {
                handle.request_stop();
            }
        }
        let flags: Vec<StopFlag> = handles.iter().map(WorkerHandle::stop_flag).collect();
        let escalate = async {
            loop {
                if signal.changed().await.is_err() {
                    break;
                }
                if *signal.borrow() == EngineSignal::EmergencyStop {
                    for flag in &flags {
                        flag.request_emergency_stop();
                    }
                    break;
                }
            }
            std::future::pending::<()>().await;
        };
        let reports = tokio::select! {
            reports = join_all(handles.into_iter().map(WorkerHandle::join)) => reports,
            () = escalate => Vec::new(),
        };

        for worker in reports {
            self.tally(worker);
        }
        EngineReport {
            exit,
            spawned: self.spawned,
            failed: self.failed,
            iterations: self.iterations,
        }
    }
}

/// Resolves once the signal asks the engine to stop (or its sender is gone).
async fn wait_for_stop(signal: &mut watch::Receiver<EngineSignal>) -> EngineExit {
    loop {
        match *signal.borrow_and_update() {
            EngineSignal::Run => {}
            EngineSignal::Stop => return EngineExit::Stopped,
            EngineSignal::EmergencyStop => return EngineExit::EmergencyStopped,
        }
        if signal.changed().await.is_err() {
            return EngineExit::Stopped;
        }
    }
}
