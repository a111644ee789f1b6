use std::sync::Arc;
use std::time::Duration;

use super::{
    EventRecord, RequestRecord, ResultsStore, SpawnRecord, StoreSink, TelemetryBatch,
    TelemetryLog, TelemetryRecord, TransactionRecord, run_collector_loop, timestamp_now,
};
use crate::args::{TcpFraming, TransportKind};
use crate::error::{AppError, AppResult, TelemetryError};
use crate::messenger::{Command, Listener, Messenger, Notice};
use crate::shutdown::shutdown_channel;
use crate::test_support::{RecordingSink, run_async_test};

fn spawn_record(planned: u64) -> TelemetryRecord {
    TelemetryRecord::Spawn(SpawnRecord {
        host_name: "host".to_owned(),
        timestamp: timestamp_now(),
        navigation_name: "nav".to_owned(),
        planned_spawns: planned,
        running_spawns: planned,
    })
}

fn full_batch() -> TelemetryBatch {
    let mut batch = TelemetryBatch::default();
    batch.push(TelemetryRecord::Transaction(TransactionRecord {
        host_name: "host".to_owned(),
        pecker_id: 1,
        navigation_name: "nav".to_owned(),
        iteration: 0,
        transaction_name: "login".to_owned(),
        start_timestamp: timestamp_now(),
        end_timestamp: None,
    }));
    batch.push(TelemetryRecord::Request(RequestRecord {
        host_name: "host".to_owned(),
        pecker_id: 1,
        navigation_name: "nav".to_owned(),
        iteration: 0,
        timestamp: timestamp_now(),
        request_name: "GET /".to_owned(),
        request_type: "http".to_owned(),
        request_specs: "{}".to_owned(),
        duration: 0.25,
        status: Some(200),
        response_size: 512,
        assertion_result: true,
    }));
    batch.push(spawn_record(3));
    batch.push(TelemetryRecord::Event(EventRecord {
        host_name: "host".to_owned(),
        pecker_id: 1,
        navigation_name: "nav".to_owned(),
        iteration: 0,
        timestamp: timestamp_now(),
        event_type: "error".to_owned(),
        message: "boom".to_owned(),
    }));
    batch
}

#[test]
fn flush_fires_exactly_at_threshold() -> AppResult<()> {
    run_async_test(async {
        let sink = Arc::new(RecordingSink::default());
        let log = TelemetryLog::new(sink.clone(), 5, Duration::from_secs(3_600));

        for planned in 0..4 {
            log.append(spawn_record(planned)).await?;
        }
        if !sink.batches.lock().await.is_empty() {
            return Err(AppError::telemetry("Flushed before reaching the threshold"));
        }
        if log.buffered().await != 4 {
            return Err(AppError::telemetry("Expected four buffered records"));
        }

        log.append(spawn_record(4)).await?;
        let batches = sink.batches.lock().await;
        if batches.len() != 1 {
            return Err(AppError::telemetry(format!(
                "Expected one flush, saw {}",
                batches.len()
            )));
        }
        if batches.first().map(TelemetryBatch::len) != Some(5) {
            return Err(AppError::telemetry("Flushed batch should hold five records"));
        }
        drop(batches);
        if log.buffered().await != 0 {
            return Err(AppError::telemetry("Buffer should be empty after flush"));
        }
        Ok(())
    })
}

#[test]
fn time_trigger_flushes_partial_buffer() -> AppResult<()> {
    run_async_test(async {
        let sink = Arc::new(RecordingSink::default());
        let log = TelemetryLog::new(sink.clone(), 1_000, Duration::from_millis(20));

        log.flush_if_due().await?;
        log.append(spawn_record(1)).await?;
        tokio::time::sleep(Duration::from_millis(40)).await;
        log.flush_if_due().await?;

        let batches = sink.batches.lock().await;
        let delivered: usize = batches.iter().map(TelemetryBatch::len).sum();
        if delivered != 1 {
            return Err(AppError::telemetry("Expected the time trigger to flush"));
        }
        Ok(())
    })
}

#[test]
fn store_writes_every_section() -> AppResult<()> {
    run_async_test(async {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("results.sqlite");
        let store = ResultsStore::open(&path, 4).await?;
        store.write(full_batch()).await?;
        drop(store);

        // reopening keeps existing rows
        let store = ResultsStore::open(&path, 4).await?;
        store.write(full_batch()).await?;
        for table in ["transactions", "requests", "spawns", "events"] {
            if store.count_rows(table).await? != 2 {
                return Err(AppError::telemetry(format!("Unexpected row count in {}", table)));
            }
        }
        if store.count_rows("sysmonitor").await? != 0 {
            return Err(AppError::telemetry("Unexpected sysmonitor rows"));
        }

        let end: Option<String> = store
            .connection()
            .call(|conn| {
                Ok(conn.query_row("SELECT endTimestamp FROM transactions LIMIT 1", [], |row| {
                    row.get(0)
                })?)
            })
            .await
            .map_err(|err| AppError::telemetry(format!("Query failed: {}", err)))?;
        if end.is_some() {
            return Err(AppError::telemetry("Open transaction should store NULL end"));
        }
        Ok(())
    })
}

#[test]
fn failed_writes_are_retried_then_overflow() -> AppResult<()> {
    run_async_test(async {
        let store = ResultsStore::open_in_memory(2).await?;
        store
            .connection()
            .call(|conn| {
                conn.execute_batch("DROP TABLE spawns")?;
                Ok(())
            })
            .await
            .map_err(|err| AppError::telemetry(format!("Drop failed: {}", err)))?;

        store.write(full_batch()).await?;
        store.write(full_batch()).await?;
        if store.pending_batches().await != 2 {
            return Err(AppError::telemetry("Failed batches should stay pending"));
        }
        match store.write(full_batch()).await {
            Err(AppError::Telemetry(TelemetryError::RetryBufferFull { pending, max }))
                if pending == 2 && max == 2 => {}
            other => {
                return Err(AppError::telemetry(format!(
                    "Expected retry overflow, got {:?}",
                    other
                )));
            }
        }

        if store.pending_batches().await != 2 || !store.has_overflowed() {
            return Err(AppError::telemetry("Refused batch must not be buffered"));
        }

        store
            .connection()
            .call(|conn| {
                conn.execute_batch(
                    "CREATE TABLE spawns (hostName TEXT, timestamp TEXT, navigationName TEXT,
                        plannedSpawns INTEGER, runningSpawns INTEGER)",
                )?;
                Ok(())
            })
            .await
            .map_err(|err| AppError::telemetry(format!("Create failed: {}", err)))?;
        store.drain().await?;
        if store.pending_batches().await != 0 {
            return Err(AppError::telemetry("Pending batches should drain"));
        }
        if store.count_rows("spawns").await? != 2 {
            return Err(AppError::telemetry("Every buffered batch should land"));
        }
        Ok(())
    })
}

#[test]
fn store_sink_never_buffers_past_the_limit() -> AppResult<()> {
    run_async_test(async {
        let store = Arc::new(ResultsStore::open_in_memory(2).await?);
        store
            .connection()
            .call(|conn| {
                conn.execute_batch("DROP TABLE spawns")?;
                Ok(())
            })
            .await
            .map_err(|err| AppError::telemetry(format!("Drop failed: {}", err)))?;
        let mut overflow = store.overflow_signal();
        let log = TelemetryLog::new(
            Arc::new(StoreSink::new(store.clone())),
            1,
            Duration::from_secs(60),
        );

        let mut refused = 0usize;
        for planned in 0..20 {
            if log.append(spawn_record(planned)).await.is_err() {
                refused = refused.saturating_add(1);
            }
            if store.pending_batches().await > 2 {
                return Err(AppError::telemetry("Retry buffer grew past its limit"));
            }
        }
        if refused != 18 {
            return Err(AppError::telemetry(format!("Expected 18 refusals, got {}", refused)));
        }
        tokio::time::timeout(Duration::from_secs(1), overflow.wait_for(|full| *full))
            .await
            .map_err(|_elapsed| AppError::telemetry("Overflow was not signalled"))?
            .map_err(|err| AppError::telemetry(format!("Overflow signal lost: {}", err)))?;
        Ok(())
    })
}

#[test]
fn store_sink_feeds_results_store() -> AppResult<()> {
    run_async_test(async {
        let store = Arc::new(ResultsStore::open_in_memory(4).await?);
        let log = TelemetryLog::new(
            Arc::new(StoreSink::new(store.clone())),
            2,
            Duration::from_secs(60),
        );
        log.append(spawn_record(1)).await?;
        log.append(spawn_record(2)).await?;
        log.append(spawn_record(3)).await?;
        log.flush().await?;
        if store.count_rows("spawns").await? != 3 {
            return Err(AppError::telemetry("Expected three spawn rows"));
        }
        Ok(())
    })
}

#[test]
fn collector_persists_batches_until_shutdown() -> AppResult<()> {
    run_async_test(async {
        let listener = Listener::bind("127.0.0.1:0", TransportKind::Tcp, TcpFraming::Eof).await?;
        let address = listener.local_addr()?.to_string();
        let store = Arc::new(ResultsStore::open_in_memory(4).await?);
        let (_shutdown_tx, shutdown_rx) = shutdown_channel();
        let collector = tokio::spawn(run_collector_loop(listener, store.clone(), shutdown_rx));

        let messenger = Messenger::new(TransportKind::Tcp, TcpFraming::Eof);
        messenger
            .send(&address, &Notice::Telemetry(full_batch()).into())
            .await?;
        messenger.send(&address, &Command::Shutdown.into()).await?;

        let batches = tokio::time::timeout(Duration::from_secs(5), collector)
            .await
            .map_err(|_elapsed| AppError::telemetry("Collector did not stop"))???;
        if batches != 1 {
            return Err(AppError::telemetry("Expected one received batch"));
        }
        if store.count_rows("requests").await? != 1 {
            return Err(AppError::telemetry("Expected one request row"));
        }
        Ok(())
    })
}

#[test]
fn system_sample_reports_memory() -> AppResult<()> {
    use sysinfo::{System, SystemExt};

    let mut system = System::new();
    system.refresh_memory();
    let record = super::sample_system(&system, "host", "spawner");
    if record.host_type != "spawner" || record.host_name != "host" {
        return Err(AppError::telemetry("Unexpected sample identity"));
    }
    if record.memory_perc < 0.0 || record.memory_perc > 100.0 {
        return Err(AppError::telemetry("Memory percentage out of range"));
    }
    Ok(())
}
