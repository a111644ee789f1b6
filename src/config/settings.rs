use std::path::PathBuf;
use std::time::Duration;

use crate::args::{HandlingMode, HookPolicy, SpawningMode, TcpFraming, TransportKind};

pub const DEFAULT_CONTROLLER_PORT: u16 = 7877;
pub const DEFAULT_LOGGER_PORT: u16 = 7878;
pub const DEFAULT_MAX_RESCALE_RATIO: f64 = 1_000.0;

/// Explicit runtime configuration handed down from the entry points.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Settings {
    pub execution: ExecutionSettings,
    pub logging: LoggingSettings,
    pub runtime: RuntimeSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionSettings {
    pub spawning_mode: SpawningMode,
    pub handling_mode: HandlingMode,
    pub active_polling_interval: Duration,
    pub controller_port: u16,
    pub controller_protocol: TransportKind,
    pub tcp_framing: TcpFraming,
    pub spawners: Vec<String>,
    pub send_timeout: Duration,
    pub max_rescale_ratio: f64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            spawning_mode: SpawningMode::Tasks,
            handling_mode: HandlingMode::Passive,
            active_polling_interval: Duration::from_millis(100),
            controller_port: DEFAULT_CONTROLLER_PORT,
            controller_protocol: TransportKind::Tcp,
            tcp_framing: TcpFraming::Eof,
            spawners: Vec::new(),
            send_timeout: Duration::from_secs(5),
            max_rescale_ratio: DEFAULT_MAX_RESCALE_RATIO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub max_entries_before_flush: usize,
    pub flush_interval: Duration,
    pub logger_host: String,
    pub logger_port: u16,
    pub logger_protocol: TransportKind,
    pub results_path: PathBuf,
    pub sysmonitor_polling_interval: Duration,
    pub collector_grace: Duration,
    pub max_pending_batches: usize,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            max_entries_before_flush: 100,
            flush_interval: Duration::from_secs(1),
            logger_host: "localhost".to_owned(),
            logger_port: DEFAULT_LOGGER_PORT,
            logger_protocol: TransportKind::Udp,
            results_path: PathBuf::from("results.sqlite"),
            sysmonitor_polling_interval: Duration::from_secs(1),
            collector_grace: Duration::from_secs(2),
            max_pending_batches: 64,
        }
    }
}

impl LoggingSettings {
    #[must_use]
    pub fn collector_address(&self) -> String {
        format!("{}:{}", self.logger_host, self.logger_port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub hook_policy: HookPolicy,
    pub each_iteration_is_transaction: bool,
    pub host_name: String,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            hook_policy: HookPolicy::PerIteration,
            each_iteration_is_transaction: false,
            host_name: default_host_name(),
        }
    }
}

fn default_host_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_owned())
}
