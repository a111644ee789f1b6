use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::AppResult;
use crate::shutdown::ShutdownReceiver;

use super::records::{TelemetryBatch, TelemetryRecord};
use super::sink::BatchSink;

struct Buffer {
    batch: TelemetryBatch,
    last_flush: Instant,
}

/// Process-wide telemetry buffer shared by every worker on a host.
///
/// A flush ships the whole buffer as one batch. It happens on the append
/// that reaches `max_entries`, or once `flush_interval` has passed since the
/// previous flush, whichever comes first.
pub struct TelemetryLog {
    buffer: Mutex<Buffer>,
    sink: Arc<dyn BatchSink>,
    max_entries: usize,
    flush_interval: Duration,
}

impl TelemetryLog {
    #[must_use]
    pub fn new(sink: Arc<dyn BatchSink>, max_entries: usize, flush_interval: Duration) -> Self {
        Self {
            buffer: Mutex::new(Buffer {
                batch: TelemetryBatch::default(),
                last_flush: Instant::now(),
            }),
            sink,
            max_entries: max_entries.max(1),
            flush_interval,
        }
    }

    /// Buffers `record` and, when a trigger fires, awaits delivery of the batch.
    ///
    /// # Errors
    ///
    /// Returns the sink error when a triggered flush fails; the batch is gone.
    pub async fn append(&self, record: TelemetryRecord) -> AppResult<()> {
        let ready = {
            let mut buffer = self.buffer.lock().await;
            buffer.batch.push(record);
            if buffer.batch.len() >= self.max_entries
                || buffer.last_flush.elapsed() >= self.flush_interval
            {
                Some(take(&mut buffer))
            } else {
                None
            }
        };
        match ready {
            Some(batch) => self.deliver(batch).await,
            None => Ok(()),
        }
    }

    /// Flushes only if the time trigger has fired.
    ///
    /// # Errors
    ///
    /// Returns the sink error when delivery fails.
    pub async fn flush_if_due(&self) -> AppResult<()> {
        let ready = {
            let mut buffer = self.buffer.lock().await;
            if !buffer.batch.is_empty() && buffer.last_flush.elapsed() >= self.flush_interval {
                Some(take(&mut buffer))
            } else {
                None
            }
        };
        match ready {
            Some(batch) => self.deliver(batch).await,
            None => Ok(()),
        }
    }

    /// Ships whatever is buffered.
    ///
    /// # Errors
    ///
    /// Returns the sink error when delivery fails.
    pub async fn flush(&self) -> AppResult<()> {
        let batch = {
            let mut buffer = self.buffer.lock().await;
            take(&mut buffer)
        };
        if batch.is_empty() {
            return Ok(());
        }
        self.deliver(batch).await
    }

    pub async fn buffered(&self) -> usize {
        self.buffer.lock().await.batch.len()
    }

    async fn deliver(&self, batch: TelemetryBatch) -> AppResult<()> {
        debug!("Flushing {} telemetry records", batch.len());
        self.sink.deliver(batch).await
    }
}

fn take(buffer: &mut Buffer) -> TelemetryBatch {
    buffer.last_flush = Instant::now();
    std::mem::take(&mut buffer.batch)
}

/// Background task applying the time trigger while workers are idle.
///
/// Performs a final flush when shutdown is broadcast.
pub fn spawn_flusher(
    log: Arc<TelemetryLog>,
    mut shutdown_rx: ShutdownReceiver,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let period = log.flush_interval.max(Duration::from_millis(10));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => {
                    if let Err(err) = log.flush_if_due().await {
                        warn!("Periodic telemetry flush failed: {}", err);
                    }
                }
            }
        }
        if let Err(err) = log.flush().await {
            warn!("Final telemetry flush failed: {}", err);
        }
    })
}
