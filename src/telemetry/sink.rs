use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::messenger::{Messenger, Notice};

use super::records::TelemetryBatch;
use super::store::ResultsStore;

/// Destination of flushed telemetry batches.
#[async_trait]
pub trait BatchSink: Send + Sync {
    async fn deliver(&self, batch: TelemetryBatch) -> AppResult<()>;
}

/// Ships batches to a remote collector as `telemetry` notices.
pub struct MessengerSink {
    messenger: Messenger,
    address: String,
}

impl MessengerSink {
    #[must_use]
    pub const fn new(messenger: Messenger, address: String) -> Self {
        Self { messenger, address }
    }
}

#[async_trait]
impl BatchSink for MessengerSink {
    async fn deliver(&self, batch: TelemetryBatch) -> AppResult<()> {
        self.messenger
            .send(&self.address, &Notice::Telemetry(batch).into())
            .await
    }
}

/// Writes batches straight into a local results store.
pub struct StoreSink {
    store: Arc<ResultsStore>,
}

impl StoreSink {
    #[must_use]
    pub const fn new(store: Arc<ResultsStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl BatchSink for StoreSink {
    async fn deliver(&self, batch: TelemetryBatch) -> AppResult<()> {
        self.store.write(batch).await
    }
}
