use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::AppResult;
use crate::messenger::{Command, Envelope, Listener, Notice};
use crate::shutdown::{ShutdownReceiver, setup_signal_shutdown_handler, shutdown_channel};

use super::store::ResultsStore;

/// Drains telemetry notices into `store` until a `shutdown` command arrives
/// or shutdown is broadcast locally. Returns the number of batches received.
///
/// # Errors
///
/// Returns an error when the store's retry buffer overflows.
pub async fn run_collector_loop(
    listener: Listener,
    store: Arc<ResultsStore>,
    mut shutdown_rx: ShutdownReceiver,
) -> AppResult<u64> {
    let mut batches = 0u64;
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Collector shutting down");
                break;
            }
            received = listener.recv() => match received {
                Ok((Envelope::Notice(Notice::Telemetry(batch)), peer)) => {
                    debug!("Telemetry batch of {} records from {}", batch.len(), peer);
                    batches = batches.saturating_add(1);
                    store.write(batch).await?;
                }
                Ok((Envelope::Command(Command::Shutdown), peer)) => {
                    info!("Collector received shutdown from {}", peer);
                    break;
                }
                Ok((Envelope::Command(command), peer)) => {
                    warn!("Collector ignoring {} from {}", command.phase(), peer);
                }
                Err(err) => {
                    warn!("Collector failed to receive message: {}", err);
                }
            }
        }
    }
    store.drain().await?;
    Ok(batches)
}

/// Binds the telemetry port and persists batches until a `shutdown` command
/// or Ctrl+C.
///
/// # Errors
///
/// Returns an error when the port cannot be bound, the store cannot be
/// opened or its retry buffer overflows.
pub async fn run_collector(settings: &Settings) -> AppResult<u64> {
    let address = format!("0.0.0.0:{}", settings.logging.logger_port);
    let listener = Listener::bind(
        &address,
        settings.logging.logger_protocol,
        settings.execution.tcp_framing,
    )
    .await?;
    let store = Arc::new(
        ResultsStore::open(
            &settings.logging.results_path,
            settings.logging.max_pending_batches,
        )
        .await?,
    );
    info!(
        "Collector listening on {} ({:?}), writing {}",
        listener.local_addr()?,
        settings.logging.logger_protocol,
        settings.logging.results_path.display()
    );

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let signal_task = setup_signal_shutdown_handler(&shutdown_tx);
    let result = run_collector_loop(listener, store, shutdown_rx).await;
    drop(shutdown_tx.send(()));
    signal_task.await?;
    let batches = result?;
    info!("Collector stored {} batch(es)", batches);
    Ok(batches)
}
