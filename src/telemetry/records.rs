use serde::{Deserialize, Serialize};

/// Wall-clock format shared by every telemetry timestamp column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

#[must_use]
pub fn timestamp_now() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub host_name: String,
    pub pecker_id: u64,
    pub navigation_name: String,
    pub iteration: u64,
    pub transaction_name: String,
    pub start_timestamp: String,
    /// `None` when the iteration failed before the transaction ended.
    pub end_timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub host_name: String,
    pub pecker_id: u64,
    pub navigation_name: String,
    pub iteration: u64,
    pub timestamp: String,
    pub request_name: String,
    pub request_type: String,
    pub request_specs: String,
    /// Seconds.
    pub duration: f64,
    pub status: Option<u16>,
    pub response_size: u64,
    pub assertion_result: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnRecord {
    pub host_name: String,
    pub timestamp: String,
    pub navigation_name: String,
    pub planned_spawns: u64,
    pub running_spawns: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SysmonitorRecord {
    pub host_name: String,
    pub timestamp: String,
    pub host_type: String,
    pub cpu_perc: f64,
    pub memory_used: u64,
    pub memory_avail: u64,
    pub memory_perc: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub host_name: String,
    pub pecker_id: u64,
    pub navigation_name: String,
    pub iteration: u64,
    pub timestamp: String,
    pub event_type: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryRecord {
    Transaction(TransactionRecord),
    Request(RequestRecord),
    Spawn(SpawnRecord),
    Sysmonitor(SysmonitorRecord),
    Event(EventRecord),
}

/// Buffered records keyed by the results table they land in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryBatch {
    #[serde(default)]
    pub transactions: Vec<TransactionRecord>,
    #[serde(default)]
    pub requests: Vec<RequestRecord>,
    #[serde(default)]
    pub spawns: Vec<SpawnRecord>,
    #[serde(default)]
    pub sysmonitor: Vec<SysmonitorRecord>,
    #[serde(default)]
    pub events: Vec<EventRecord>,
}

impl TelemetryBatch {
    pub fn push(&mut self, record: TelemetryRecord) {
        match record {
            TelemetryRecord::Transaction(record) => self.transactions.push(record),
            TelemetryRecord::Request(record) => self.requests.push(record),
            TelemetryRecord::Spawn(record) => self.spawns.push(record),
            TelemetryRecord::Sysmonitor(record) => self.sysmonitor.push(record),
            TelemetryRecord::Event(record) => self.events.push(record),
        }
    }

    /// Moves every record of `other` into `self`, keeping order per section.
    #[cfg(test)]
    pub(crate) fn append(&mut self, other: &mut Self) {
        self.transactions.append(&mut other.transactions);
        self.requests.append(&mut other.requests);
        self.spawns.append(&mut other.spawns);
        self.sysmonitor.append(&mut other.sysmonitor);
        self.events.append(&mut other.events);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.transactions
            .len()
            .saturating_add(self.requests.len())
            .saturating_add(self.spawns.len())
            .saturating_add(self.sysmonitor.len())
            .saturating_add(self.events.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
