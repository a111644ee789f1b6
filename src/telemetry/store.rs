use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio_rusqlite::Connection;
use tracing::{error, warn};

use crate::error::{AppError, AppResult, TelemetryError};

use super::records::TelemetryBatch;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS transactions (
    hostName TEXT DEFAULT 'LOCALHOST',
    peckerID INTEGER,
    navigationName TEXT,
    iteration INTEGER,
    transactionName TEXT,
    startTimestamp TEXT,
    endTimestamp TEXT
);
CREATE INDEX IF NOT EXISTS transactions_mainkeys
    ON transactions (hostName, peckerID, navigationName, iteration, transactionName);

CREATE TABLE IF NOT EXISTS requests (
    hostName TEXT DEFAULT 'LOCALHOST',
    peckerID INTEGER,
    navigationName TEXT,
    iteration INTEGER,
    timestamp TEXT,
    requestName TEXT,
    requestType TEXT,
    requestSpecs TEXT,
    duration REAL,
    status INTEGER,
    responseSize INTEGER,
    assertionResult INTEGER
);
CREATE INDEX IF NOT EXISTS requests_mainkeys
    ON requests (hostName, peckerID, navigationName, iteration, requestName);
CREATE INDEX IF NOT EXISTS requests_timestamp ON requests (timestamp);
CREATE INDEX IF NOT EXISTS requests_status ON requests (status);
CREATE INDEX IF NOT EXISTS requests_assertions ON requests (assertionResult);

CREATE TABLE IF NOT EXISTS spawns (
    hostName TEXT DEFAULT 'LOCALHOST',
    timestamp TEXT,
    navigationName TEXT,
    plannedSpawns INTEGER,
    runningSpawns INTEGER
);
CREATE INDEX IF NOT EXISTS spawns_mainkeys ON spawns (hostName, timestamp);

CREATE TABLE IF NOT EXISTS sysmonitor (
    hostName TEXT DEFAULT 'LOCALHOST',
    timestamp TEXT,
    hostType TEXT,
    CPUperc REAL,
    memoryUsed INTEGER,
    memoryAvail INTEGER,
    memoryPerc REAL
);
CREATE INDEX IF NOT EXISTS sysmonitor_mainkeys ON sysmonitor (hostName, timestamp);

CREATE TABLE IF NOT EXISTS events (
    hostName TEXT DEFAULT 'LOCALHOST',
    peckerID INTEGER,
    navigationName TEXT,
    iteration INTEGER,
    timestamp TEXT,
    eventType TEXT,
    message TEXT
);
CREATE INDEX IF NOT EXISTS events_mainkeys ON events (hostName, peckerID, navigationName);
";

/// SQLite results file with a bounded retry buffer for failed writes.
pub struct ResultsStore {
    conn: Connection,
    pending: Mutex<VecDeque<Arc<TelemetryBatch>>>,
    max_pending: usize,
    overflow: watch::Sender<bool>,
}

impl ResultsStore {
    /// Opens (or creates) the results file and its tables.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be opened or the schema fails.
    pub async fn open(path: &Path, max_pending: usize) -> AppResult<Self> {
        let conn = Connection::open(path).await.map_err(|err| {
            AppError::telemetry(TelemetryError::Store {
                context: "open results db",
                source: Box::new(err),
            })
        })?;
        Self::initialize(conn, max_pending).await
    }

    /// In-memory store; used by tests and dry runs.
    ///
    /// # Errors
    ///
    /// Returns an error when the schema cannot be created.
    pub async fn open_in_memory(max_pending: usize) -> AppResult<Self> {
        let conn = Connection::open_in_memory().await.map_err(|err| {
            AppError::telemetry(TelemetryError::Store {
                context: "open in-memory results db",
                source: Box::new(err),
            })
        })?;
        Self::initialize(conn, max_pending).await
    }

    async fn initialize(conn: Connection, max_pending: usize) -> AppResult<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(|err| {
            AppError::telemetry(TelemetryError::Store {
                context: "initialize results db",
                source: Box::new(err),
            })
        })?;
        Ok(Self {
            conn,
            pending: Mutex::new(VecDeque::new()),
            max_pending,
            overflow: watch::Sender::new(false),
        })
    }

    /// Writes `batch` after any batches still waiting from earlier failures.
    ///
    /// A failed write keeps the batch for the next call, as long as fewer
    /// than `max_pending` batches are already waiting.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::RetryBufferFull`] when a batch cannot be
    /// written and the retry buffer has no room left; that batch is lost.
    pub async fn write(&self, batch: TelemetryBatch) -> AppResult<()> {
        let mut pending = self.pending.lock().await;
        while let Some(next) = pending.front() {
            match write_batch(&self.conn, Arc::clone(next)).await {
                Ok(()) => {
                    pending.pop_front();
                }
                Err(err) => {
                    error!("Results store retry failed ({} pending): {}", pending.len(), err);
                    break;
                }
            }
        }
        if batch.is_empty() {
            return Ok(());
        }
        let batch = Arc::new(batch);
        if pending.is_empty() {
            match write_batch(&self.conn, Arc::clone(&batch)).await {
                Ok(()) => return Ok(()),
                Err(err) => error!("Results store write failed: {}", err),
            }
        }
        if pending.len() >= self.max_pending {
            self.overflow.send_replace(true);
            return Err(AppError::telemetry(TelemetryError::RetryBufferFull {
                pending: pending.len(),
                max: self.max_pending,
            }));
        }
        pending.push_back(batch);
        Ok(())
    }

    /// Resolves once a write has been refused for lack of retry room.
    pub fn overflow_signal(&self) -> watch::Receiver<bool> {
        self.overflow.subscribe()
    }

    #[must_use]
    pub fn has_overflowed(&self) -> bool {
        *self.overflow.borrow()
    }

    pub async fn pending_batches(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Retries whatever is still pending; logs what could not be written.
    ///
    /// # Errors
    ///
    /// Same as [`ResultsStore::write`].
    pub async fn drain(&self) -> AppResult<()> {
        self.write(TelemetryBatch::default()).await?;
        let left = self.pending_batches().await;
        if left > 0 {
            warn!("{} telemetry batches could not be written", left);
        }
        Ok(())
    }

    /// Row count of `table`; only known table names are accepted.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails.
    pub async fn count_rows(&self, table: &'static str) -> AppResult<u64> {
        let known = ["transactions", "requests", "spawns", "sysmonitor", "events"];
        if !known.contains(&table) {
            return Err(AppError::telemetry(TelemetryError::Delivery {
                message: format!("unknown results table '{}'", table),
            }));
        }
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        let count = self
            .conn
            .call(move |conn| {
                let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
                Ok(count)
            })
            .await
            .map_err(|err| {
                AppError::telemetry(TelemetryError::Store {
                    context: "count results rows",
                    source: Box::new(err),
                })
            })?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    #[cfg(test)]
    pub(crate) const fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Writes every section of one batch in a single transaction.
async fn write_batch(conn: &Connection, batch: Arc<TelemetryBatch>) -> AppResult<()> {
    conn.call(move |conn| {
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO transactions (hostName, peckerID, navigationName, iteration,
                    transactionName, startTimestamp, endTimestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for record in &batch.transactions {
                stmt.execute(rusqlite::params![
                    record.host_name,
                    clamp_i64(record.pecker_id),
                    record.navigation_name,
                    clamp_i64(record.iteration),
                    record.transaction_name,
                    record.start_timestamp,
                    record.end_timestamp
                ])?;
            }
        }
        {
            let mut stmt = tx.prepare(
                "INSERT INTO requests (hostName, peckerID, navigationName, iteration, timestamp,
                    requestName, requestType, requestSpecs, duration, status, responseSize,
                    assertionResult)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;
            for record in &batch.requests {
                stmt.execute(rusqlite::params![
                    record.host_name,
                    clamp_i64(record.pecker_id),
                    record.navigation_name,
                    clamp_i64(record.iteration),
                    record.timestamp,
                    record.request_name,
                    record.request_type,
                    record.request_specs,
                    record.duration,
                    record.status.map(i64::from),
                    clamp_i64(record.response_size),
                    i64::from(u8::from(record.assertion_result))
                ])?;
            }
        }
        {
            let mut stmt = tx.prepare(
                "INSERT INTO spawns (hostName, timestamp, navigationName, plannedSpawns,
                    runningSpawns)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for record in &batch.spawns {
                stmt.execute(rusqlite::params![
                    record.host_name,
                    record.timestamp,
                    record.navigation_name,
                    clamp_i64(record.planned_spawns),
                    clamp_i64(record.running_spawns)
                ])?;
            }
        }
        {
            let mut stmt = tx.prepare(
                "INSERT INTO sysmonitor (hostName, timestamp, hostType, CPUperc, memoryUsed,
                    memoryAvail, memoryPerc)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for record in &batch.sysmonitor {
                stmt.execute(rusqlite::params![
                    record.host_name,
                    record.timestamp,
                    record.host_type,
                    record.cpu_perc,
                    clamp_i64(record.memory_used),
                    clamp_i64(record.memory_avail),
                    record.memory_perc
                ])?;
            }
        }
        {
            let mut stmt = tx.prepare(
                "INSERT INTO events (hostName, peckerID, navigationName, iteration, timestamp,
                    eventType, message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for record in &batch.events {
                stmt.execute(rusqlite::params![
                    record.host_name,
                    clamp_i64(record.pecker_id),
                    record.navigation_name,
                    clamp_i64(record.iteration),
                    record.timestamp,
                    record.event_type,
                    record.message
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    })
    .await
    .map_err(|err| {
        AppError::telemetry(TelemetryError::Store {
            context: "write results batch",
            source: Box::new(err),
        })
    })
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
