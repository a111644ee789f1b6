use std::sync::Arc;
use std::time::Duration;

use sysinfo::{CpuExt, System, SystemExt};
use tracing::warn;

use crate::shutdown::ShutdownReceiver;

use super::log::TelemetryLog;
use super::records::{SysmonitorRecord, TelemetryRecord, timestamp_now};

/// Takes one CPU/memory reading from an already-refreshed `System`.
#[must_use]
pub fn sample(system: &System, host_name: &str, host_type: &str) -> SysmonitorRecord {
    let total = system.total_memory();
    let used = system.used_memory();
    SysmonitorRecord {
        host_name: host_name.to_owned(),
        timestamp: timestamp_now(),
        host_type: host_type.to_owned(),
        cpu_perc: f64::from(system.global_cpu_info().cpu_usage()),
        memory_used: used,
        memory_avail: system.available_memory(),
        memory_perc: percent(used, total),
    }
}

#[expect(
    clippy::float_arithmetic,
    reason = "Memory usage is reported as a percentage"
)]
fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 * 100.0 / whole as f64
}

/// Appends a `sysmonitor` record every `interval` until shutdown.
pub fn spawn_sysmonitor(
    log: Arc<TelemetryLog>,
    host_name: String,
    host_type: &'static str,
    interval: Duration,
    mut shutdown_rx: ShutdownReceiver,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut system = System::new();
        // first CPU reading needs a baseline refresh
        system.refresh_cpu();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => {
                    system.refresh_cpu();
                    system.refresh_memory();
                    let record = sample(&system, &host_name, host_type);
                    if let Err(err) = log.append(TelemetryRecord::Sysmonitor(record)).await {
                        warn!("Failed to record system sample: {}", err);
                    }
                }
            }
        }
    })
}
