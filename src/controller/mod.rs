//! Controller side of a distributed run: partitions load and drives spawners.
mod partition;

#[cfg(test)]
mod tests;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{error, info, warn};

use crate::archive::pack_folder;
use crate::config::Settings;
use crate::error::{AppError, AppResult, CommandPhase, ConfigError, DistributedError};
use crate::messenger::{Command, Envelope, Messenger};
use crate::scenario::load_scenario;
use crate::shutdown::{
    ShutdownReceiver, ShutdownSender, setup_signal_shutdown_handler, shutdown_channel,
};
use crate::telemetry::{MessengerSink, TelemetryLog, spawn_flusher, spawn_sysmonitor};
use crate::worker::RunClock;

pub use partition::{partition, partition_weighted, rescale_ratio};

const HOST_TYPE: &str = "controller";
const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// What the controller runs and where it ships it.
#[derive(Debug, Clone)]
pub struct ControllerJob {
    pub scenario_name: String,
    pub scenario_folder: PathBuf,
    /// Collector to shut down once the run is over.
    pub collector: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SpawnerOutcome {
    pub address: String,
    pub quota: u64,
    pub rescale_ratio: f64,
    /// First phase that failed and why.
    pub failure: Option<(CommandPhase, String)>,
}

impl SpawnerOutcome {
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct ControllerReport {
    pub scenario: String,
    pub planned_peak: u64,
    pub duration: Duration,
    pub emergency_stopped: bool,
    pub spawners: Vec<SpawnerOutcome>,
}

impl ControllerReport {
    #[must_use]
    pub fn failures(&self) -> usize {
        self.spawners
            .iter()
            .filter(|outcome| !outcome.is_healthy())
            .count()
    }
}

/// Appends `default_port` to spawner addresses that do not carry one.
#[must_use]
pub fn with_default_port(address: &str, default_port: u16) -> String {
    let has_port = address
        .rsplit_once(':')
        .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
    if has_port {
        address.to_owned()
    } else {
        format!("{}:{}", address, default_port)
    }
}

/// Drives a full run with Ctrl+C mapped to an emergency stop.
///
/// # Errors
///
/// Returns an error when the scenario cannot be loaded or packed, when every
/// spawner fails a phase, or when any spawner failed along the way.
pub async fn run_controller(settings: &Settings, job: &ControllerJob) -> AppResult<ControllerReport> {
    let (shutdown_tx, _) = shutdown_channel();
    let signal_task = setup_signal_shutdown_handler(&shutdown_tx);
    let result = drive_run(settings, job, &shutdown_tx).await;
    drop(shutdown_tx.send(()));
    signal_task.await?;
    result
}

/// Runs the controller protocol; a broadcast on `shutdown_tx` during the
/// run triggers an emergency stop.
///
/// # Errors
///
/// See [`run_controller`].
pub async fn drive_run(
    settings: &Settings,
    job: &ControllerJob,
    shutdown_tx: &ShutdownSender,
) -> AppResult<ControllerReport> {
    if settings.execution.spawners.is_empty() {
        return Err(AppError::config(ConfigError::MissingSpawners));
    }
    let mut interrupt_rx = shutdown_tx.subscribe();
    let scenario = load_scenario(&job.scenario_folder, &job.scenario_name)?;
    let planned_peak = scenario.max_concurrency();
    let duration = scenario.duration();
    let quotas = partition(planned_peak, settings.execution.spawners.len());
    let mut spawners: Vec<SpawnerOutcome> = settings
        .execution
        .spawners
        .iter()
        .zip(quotas)
        .map(|(address, quota)| SpawnerOutcome {
            address: with_default_port(address, settings.execution.controller_port),
            quota,
            rescale_ratio: rescale_ratio(quota, planned_peak),
            failure: None,
        })
        .collect();
    for outcome in &spawners {
        info!(
            "Spawner {} gets {} of {} peckers (ratio {:.4})",
            outcome.address, outcome.quota, planned_peak, outcome.rescale_ratio
        );
    }

    let folder = job.scenario_folder.clone();
    let archive = tokio::task::spawn_blocking(move || pack_folder(&folder)).await??;
    info!(
        "Scenario '{}' packed ({} bytes), runs for {:?}",
        job.scenario_name,
        archive.len(),
        duration
    );

    let messenger = Messenger::new(
        settings.execution.controller_protocol,
        settings.execution.tcp_framing,
    )
    .with_send_timeout(settings.execution.send_timeout);

    let telemetry_messenger = Messenger::new(
        settings.logging.logger_protocol,
        settings.execution.tcp_framing,
    )
    .with_send_timeout(settings.execution.send_timeout);

    let (background_tx, _) = shutdown_channel();
    let log = Arc::new(TelemetryLog::new(
        Arc::new(MessengerSink::new(
            telemetry_messenger,
            settings.logging.collector_address(),
        )),
        settings.logging.max_entries_before_flush,
        settings.logging.flush_interval,
    ));
    let flusher = spawn_flusher(Arc::clone(&log), background_tx.subscribe());
    let monitor = spawn_sysmonitor(
        Arc::clone(&log),
        settings.runtime.host_name.clone(),
        HOST_TYPE,
        settings.logging.sysmonitor_polling_interval,
        background_tx.subscribe(),
    );

    let result = orchestrate(
        &messenger,
        &mut spawners,
        &archive,
        &job.scenario_name,
        duration,
        &mut interrupt_rx,
    )
    .await;

    drop(background_tx.send(()));
    flusher.await?;
    monitor.await?;

    if let Some(collector) = job.collector.as_deref() {
        tokio::time::sleep(settings.logging.collector_grace).await;
        match telemetry_messenger
            .send(collector, &Command::Shutdown.into())
            .await
        {
            Ok(()) => info!("Collector {} asked to shut down", collector),
            Err(err) => warn!("Failed to shut down collector {}: {}", collector, err),
        }
    }

    let emergency_stopped = result?;
    let report = ControllerReport {
        scenario: job.scenario_name.clone(),
        planned_peak,
        duration,
        emergency_stopped,
        spawners,
    };
    let failures = report.failures();
    if failures > 0 {
        for outcome in &report.spawners {
            if let Some((phase, reason)) = &outcome.failure {
                error!("Spawner {} failed during {}: {}", outcome.address, phase, reason);
            }
        }
        return Err(AppError::distributed(DistributedError::RunCompletedWithErrors {
            failures,
        }));
    }
    info!(
        "Run '{}' finished on {} spawner(s){}",
        report.scenario,
        report.spawners.len(),
        if report.emergency_stopped {
            " after an emergency stop"
        } else {
            ""
        }
    );
    Ok(report)
}

/// Sends every phase in order; returns whether the run was emergency stopped.
async fn orchestrate(
    messenger: &Messenger,
    spawners: &mut [SpawnerOutcome],
    archive: &[u8],
    scenario_name: &str,
    duration: Duration,
    interrupt_rx: &mut ShutdownReceiver,
) -> AppResult<bool> {
    broadcast(messenger, spawners, CommandPhase::Unpack, |_| {
        Command::ScenarioUnpack {
            compressed_scenario_folder: archive.to_vec(),
        }
    })
    .await?;
    broadcast(messenger, spawners, CommandPhase::Setup, |outcome| {
        Command::ScenarioSetup {
            scenario_name: scenario_name.to_owned(),
            rescale_ratio: outcome.rescale_ratio,
        }
    })
    .await?;
    broadcast(messenger, spawners, CommandPhase::Start, |_| Command::Start).await?;

    let clock = RunClock::start();
    let mut ticker = tokio::time::interval(WAIT_POLL_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let emergency = loop {
        tokio::select! {
            _ = interrupt_rx.recv() => {
                warn!("Interrupted, emergency stopping every spawner");
                break true;
            }
            _ = ticker.tick() => {
                if clock.elapsed() > duration {
                    break false;
                }
            }
        }
    };

    let (phase, stop) = if emergency {
        (CommandPhase::EmergencyStop, Command::EmergencyStop)
    } else {
        (CommandPhase::Stop, Command::Stop)
    };
    // best effort from here on
    if let Err(err) = broadcast(messenger, spawners, phase, |_| stop.clone()).await {
        warn!("{}", err);
    }
    if let Err(err) = broadcast(messenger, spawners, CommandPhase::Shutdown, |_| {
        Command::Shutdown
    })
    .await
    {
        warn!("{}", err);
    }
    Ok(emergency)
}

/// Sends one command to every healthy spawner concurrently and marks the
/// ones whose send failed.
///
/// # Errors
///
/// Returns [`DistributedError::AllSpawnersFailed`] when no spawner is
/// healthy afterwards.
async fn broadcast<F>(
    messenger: &Messenger,
    spawners: &mut [SpawnerOutcome],
    phase: CommandPhase,
    command_for: F,
) -> AppResult<()>
where
    F: Fn(&SpawnerOutcome) -> Command,
{
    let sends = spawners
        .iter()
        .enumerate()
        .filter(|(_, outcome)| outcome.is_healthy())
        .map(|(idx, outcome)| {
            let envelope = Envelope::from(command_for(outcome));
            let address = outcome.address.clone();
            async move { (idx, messenger.send(&address, &envelope).await) }
        });
    let results = join_all(sends).await;
    for (idx, result) in results {
        let Some(outcome) = spawners.get_mut(idx) else {
            continue;
        };
        match result {
            Ok(()) => info!("Sent {} to {}", phase, outcome.address),
            Err(err) => {
                warn!("Sending {} to {} failed: {}", phase, outcome.address, err);
                outcome.failure = Some((phase, err.to_string()));
            }
        }
    }
    if spawners.iter().any(SpawnerOutcome::is_healthy) {
        Ok(())
    } else {
        Err(AppError::distributed(DistributedError::AllSpawnersFailed {
            phase,
        }))
    }
}
