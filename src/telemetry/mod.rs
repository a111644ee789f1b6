//! Buffered telemetry: records, the shared flush buffer, sinks, the
//! SQLite results store and the collector that feeds it.
mod collector;
mod log;
mod records;
mod sink;
mod store;
mod sysmonitor;

#[cfg(test)]
mod tests;

pub use collector::{run_collector, run_collector_loop};
pub use log::{TelemetryLog, spawn_flusher};
pub use records::{
    EventRecord, RequestRecord, SpawnRecord, SysmonitorRecord, TIMESTAMP_FORMAT,
    TelemetryBatch, TelemetryRecord, TransactionRecord, timestamp_now,
};
pub use sink::{BatchSink, MessengerSink, StoreSink};
pub use store::ResultsStore;
pub use sysmonitor::{sample as sample_system, spawn_sysmonitor};
