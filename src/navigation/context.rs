use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::NavigationError;
use crate::telemetry::{
    EventRecord, RequestRecord, TelemetryLog, TelemetryRecord, TransactionRecord, timestamp_now,
};

/// Who is iterating: stamped on every record the context emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerIdentity {
    pub host_name: String,
    pub pecker_id: u64,
    pub navigation_name: String,
}

/// Pause between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinkTime {
    Fixed(Duration),
    /// Uniformly drawn from `[min, max]`.
    Uniform { min: Duration, max: Duration },
}

impl ThinkTime {
    #[must_use]
    pub fn pick(self) -> Duration {
        match self {
            ThinkTime::Fixed(duration) => duration,
            ThinkTime::Uniform { min, max } if max > min => {
                let low = u64::try_from(min.as_millis()).unwrap_or(u64::MAX);
                let high = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
                Duration::from_millis(rand::thread_rng().gen_range(low..=high))
            }
            ThinkTime::Uniform { min, .. } => min,
        }
    }
}

/// One request as measured by navigation code.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSample {
    pub request_name: String,
    pub request_type: String,
    pub request_specs: String,
    pub duration: Duration,
    pub status: Option<u16>,
    pub response_size: u64,
    pub assertion_result: bool,
}

/// Handle passed to every navigation hook; tracks the current iteration and
/// its open transactions and writes telemetry on the worker's behalf.
pub struct IterationContext {
    identity: WorkerIdentity,
    iteration: u64,
    open_transactions: BTreeMap<String, String>,
    variables: BTreeMap<String, String>,
    log: Arc<TelemetryLog>,
}

/// Names answered from the worker's identity; navigations cannot set them.
pub const RESERVED_VARIABLES: [&str; 4] =
    ["host_name", "pecker_id", "navigation_name", "iteration"];

impl IterationContext {
    #[must_use]
    pub const fn new(identity: WorkerIdentity, log: Arc<TelemetryLog>) -> Self {
        Self {
            identity,
            iteration: 0,
            open_transactions: BTreeMap::new(),
            variables: BTreeMap::new(),
            log,
        }
    }

    #[must_use]
    pub const fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    #[must_use]
    pub const fn iteration(&self) -> u64 {
        self.iteration
    }

    pub(crate) const fn set_iteration(&mut self, iteration: u64) {
        self.iteration = iteration;
    }

    /// Stores a per-pecker variable; values survive across iterations.
    ///
    /// # Errors
    ///
    /// Returns [`NavigationError::ReservedVariable`] for identity names.
    pub fn set_variable(
        &mut self,
        name: &str,
        value: impl Into<String>,
    ) -> Result<(), NavigationError> {
        if RESERVED_VARIABLES.contains(&name) {
            return Err(NavigationError::ReservedVariable {
                name: name.to_owned(),
            });
        }
        self.variables.insert(name.to_owned(), value.into());
        Ok(())
    }

    /// Reads a variable; reserved names read the worker's identity.
    ///
    /// # Errors
    ///
    /// Returns [`NavigationError::VariableNotDefined`] when nothing was set.
    pub fn variable(&self, name: &str) -> Result<String, NavigationError> {
        match name {
            "host_name" => Ok(self.identity.host_name.clone()),
            "pecker_id" => Ok(self.identity.pecker_id.to_string()),
            "navigation_name" => Ok(self.identity.navigation_name.clone()),
            "iteration" => Ok(self.iteration.to_string()),
            _ => self
                .variables
                .get(name)
                .cloned()
                .ok_or_else(|| NavigationError::VariableNotDefined {
                    name: name.to_owned(),
                }),
        }
    }

    pub fn remove_variable(&mut self, name: &str) -> Option<String> {
        self.variables.remove(name)
    }

    /// Marks the start of `name`; restarting an open transaction resets it.
    pub fn start_transaction(&mut self, name: &str) {
        debug!(
            pecker = self.identity.pecker_id,
            "Transaction '{}' started", name
        );
        self.open_transactions
            .insert(name.to_owned(), timestamp_now());
    }

    /// Closes `name` and records it.
    ///
    /// # Errors
    ///
    /// Returns [`NavigationError::TransactionNotStarted`] when `name` is not open.
    pub async fn end_transaction(&mut self, name: &str) -> Result<(), NavigationError> {
        let start = self.open_transactions.remove(name).ok_or_else(|| {
            NavigationError::TransactionNotStarted {
                name: name.to_owned(),
            }
        })?;
        debug!(
            pecker = self.identity.pecker_id,
            "Transaction '{}' ended", name
        );
        self.record_transaction(name.to_owned(), start, Some(timestamp_now()))
            .await;
        Ok(())
    }

    #[must_use]
    pub fn has_open_transactions(&self) -> bool {
        !self.open_transactions.is_empty()
    }

    /// Records every still-open transaction with no end timestamp.
    pub(crate) async fn abandon_open_transactions(&mut self) {
        let open = std::mem::take(&mut self.open_transactions);
        for (name, start) in open {
            self.record_transaction(name, start, None).await;
        }
    }

    pub async fn think_time(&self, think: ThinkTime) {
        let pause = think.pick();
        debug!(pecker = self.identity.pecker_id, "Think time: {:?}", pause);
        tokio::time::sleep(pause).await;
    }

    pub async fn record_request(&self, sample: RequestSample) {
        let record = RequestRecord {
            host_name: self.identity.host_name.clone(),
            pecker_id: self.identity.pecker_id,
            navigation_name: self.identity.navigation_name.clone(),
            iteration: self.iteration,
            timestamp: timestamp_now(),
            request_name: sample.request_name,
            request_type: sample.request_type,
            request_specs: sample.request_specs,
            duration: sample.duration.as_secs_f64(),
            status: sample.status,
            response_size: sample.response_size,
            assertion_result: sample.assertion_result,
        };
        self.append(TelemetryRecord::Request(record)).await;
    }

    pub async fn record_event(&self, event_type: &str, message: String) {
        let record = EventRecord {
            host_name: self.identity.host_name.clone(),
            pecker_id: self.identity.pecker_id,
            navigation_name: self.identity.navigation_name.clone(),
            iteration: self.iteration,
            timestamp: timestamp_now(),
            event_type: event_type.to_owned(),
            message,
        };
        self.append(TelemetryRecord::Event(record)).await;
    }

    async fn record_transaction(&self, name: String, start: String, end: Option<String>) {
        let record = TransactionRecord {
            host_name: self.identity.host_name.clone(),
            pecker_id: self.identity.pecker_id,
            navigation_name: self.identity.navigation_name.clone(),
            iteration: self.iteration,
            transaction_name: name,
            start_timestamp: start,
            end_timestamp: end,
        };
        self.append(TelemetryRecord::Transaction(record)).await;
    }

    async fn append(&self, record: TelemetryRecord) {
        if let Err(err) = self.log.append(record).await {
            warn!(
                pecker = self.identity.pecker_id,
                "Telemetry flush failed: {}", err
            );
        }
    }
}
