//! Per-host side of a run: command handling and the reconciliation engine.
mod engine;
mod service;


use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::error::{AppError, AppResult, DistributedError, TelemetryError};
use crate::messenger::{Envelope, Listener, Messenger};
use crate::navigation::Registry;
use crate::scenario::load_scenario;
use crate::shutdown::{ShutdownSender, setup_signal_shutdown_handler, shutdown_channel};
use crate::telemetry::{
    BatchSink, MessengerSink, ResultsStore, StoreSink, TelemetryLog, spawn_flusher,
    spawn_sysmonitor,
};
use crate::worker::runner_for;

pub use engine::{EngineConfig, EngineExit, EngineReport, EngineSignal, SpawnerEngine};
pub use service::{Flow, SpawnerService};

const HOST_TYPE: &str = "spawner";

impl EngineConfig {
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            handling_mode: settings.execution.handling_mode,
            polling_interval: settings.execution.active_polling_interval,
            host_name: settings.runtime.host_name.clone(),
            hook_policy: settings.runtime.hook_policy,
            each_iteration_is_transaction: settings.runtime.each_iteration_is_transaction,
        }
    }
}

fn telemetry_log(settings: &Settings, sink: Arc<dyn BatchSink>) -> Arc<TelemetryLog> {
    Arc::new(TelemetryLog::new(
        sink,
        settings.logging.max_entries_before_flush,
        settings.logging.flush_interval,
    ))
}

/// Binds the control port and serves controller commands until `shutdown`
/// or Ctrl+C.
///
/// # Errors
///
/// Returns an error when the control socket cannot be bound or the final
/// shutdown fails.
pub async fn run_spawner(settings: &Settings, registry: Registry) -> AppResult<()> {
    let address = format!("0.0.0.0:{}", settings.execution.controller_port);
    let listener = Listener::bind(
        &address,
        settings.execution.controller_protocol,
        settings.execution.tcp_framing,
    )
    .await?;
    info!(
        "Spawner '{}' listening on {} ({:?})",
        settings.runtime.host_name,
        listener.local_addr()?,
        settings.execution.controller_protocol
    );
    let (shutdown_tx, _) = shutdown_channel();
    let signal_task = setup_signal_shutdown_handler(&shutdown_tx);
    let result = serve_spawner(listener, settings, registry, &shutdown_tx).await;
    drop(shutdown_tx.send(()));
    signal_task.await?;
    result
}

/// Command loop over an already bound listener.
///
/// Broadcasts on `shutdown_tx` before returning so background tasks end.
///
/// # Errors
///
/// Returns an error when the final shutdown of the service fails.
pub async fn serve_spawner(
    listener: Listener,
    settings: &Settings,
    registry: Registry,
    shutdown_tx: &ShutdownSender,
) -> AppResult<()> {
    let messenger = Messenger::new(
        settings.logging.logger_protocol,
        settings.execution.tcp_framing,
    )
    .with_send_timeout(settings.execution.send_timeout);
    let sink = Arc::new(MessengerSink::new(
        messenger,
        settings.logging.collector_address(),
    ));
    let log = telemetry_log(settings, sink);
    let flusher = spawn_flusher(Arc::clone(&log), shutdown_tx.subscribe());
    let monitor = spawn_sysmonitor(
        Arc::clone(&log),
        settings.runtime.host_name.clone(),
        HOST_TYPE,
        settings.logging.sysmonitor_polling_interval,
        shutdown_tx.subscribe(),
    );
    let mut service = SpawnerService::new(
        Arc::new(registry),
        runner_for(settings.execution.spawning_mode),
        Arc::clone(&log),
        EngineConfig::from_settings(settings),
        settings.execution.max_rescale_ratio,
    );

    let mut shutdown_rx = shutdown_tx.subscribe();
    let result = loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Spawner interrupted, shutting down");
                break service.shutdown().await.map(|_report| ());
            }
            received = listener.recv() => match received {
                Ok((Envelope::Command(command), peer)) => {
                    let phase = command.phase();
                    match service.handle(command).await {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Shutdown) => {
                            info!("Spawner received shutdown from {}", peer);
                            break Ok(());
                        }
                        Err(err) => warn!("Command {} from {} failed: {}", phase, peer, err),
                    }
                }
                Ok((Envelope::Notice(_), peer)) => {
                    warn!("Spawner ignoring notice from {}", peer);
                }
                Err(err) => warn!("Spawner failed to receive command: {}", err),
            }
        }
    };

    drop(shutdown_tx.send(()));
    flusher.await?;
    monitor.await?;
    result
}

/// Runs one scenario on this host with telemetry written straight to the
/// results store. Ctrl+C triggers an emergency stop.
///
/// # Errors
///
/// Returns an error when the scenario cannot be loaded or validated, the
/// store cannot be opened or the engine fails.
pub async fn run_local(
    settings: &Settings,
    registry: Registry,
    folder: &Path,
    scenario_name: &str,
) -> AppResult<EngineReport> {
    let scenario = load_scenario(folder, scenario_name)?;
    registry.validate(&scenario)?;
    let store = Arc::new(
        ResultsStore::open(
            &settings.logging.results_path,
            settings.logging.max_pending_batches,
        )
        .await?,
    );
    let log = telemetry_log(settings, Arc::new(StoreSink::new(Arc::clone(&store))));

    let (shutdown_tx, mut shutdown_rx) = shutdown_channel();
    let signal_task = setup_signal_shutdown_handler(&shutdown_tx);
    let flusher = spawn_flusher(Arc::clone(&log), shutdown_tx.subscribe());
    let monitor = spawn_sysmonitor(
        Arc::clone(&log),
        settings.runtime.host_name.clone(),
        HOST_TYPE,
        settings.logging.sysmonitor_polling_interval,
        shutdown_tx.subscribe(),
    );

    info!(
        "Running scenario '{}' locally: {} peckers at peak, {:?}",
        scenario.name(),
        scenario.max_concurrency(),
        scenario.duration()
    );
    let engine = SpawnerEngine::new(
        Arc::new(scenario),
        Arc::new(registry),
        runner_for(settings.execution.spawning_mode),
        Arc::clone(&log),
        EngineConfig::from_settings(settings),
    );
    let (signal_tx, signal_rx) = watch::channel(EngineSignal::Run);
    let mut overflow_rx = store.overflow_signal();
    let mut engine = tokio::spawn(engine.run(signal_rx));
    let joined = tokio::select! {
        joined = &mut engine => joined,
        _ = shutdown_rx.recv() => {
            warn!("Interrupted, emergency stopping peckers");
            signal_tx.send_replace(EngineSignal::EmergencyStop);
            engine.await
        }
        Ok(_) = overflow_rx.wait_for(|full| *full) => {
            error!("Telemetry retry buffer overflowed, emergency stopping peckers");
            signal_tx.send_replace(EngineSignal::EmergencyStop);
            engine.await
        }
    };

    drop(shutdown_tx.send(()));
    signal_task.await?;
    flusher.await?;
    monitor.await?;
    let report = joined.map_err(|err| {
        AppError::distributed(DistributedError::EngineAborted {
            message: err.to_string(),
        })
    })??;
    store.drain().await?;
    if store.has_overflowed() {
        return Err(AppError::telemetry(TelemetryError::RetryBufferFull {
            pending: store.pending_batches().await,
            max: settings.logging.max_pending_batches,
        }));
    }
    info!(
        "Results written to {}",
        settings.logging.results_path.display()
    );
    Ok(report)
}
