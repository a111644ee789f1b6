use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::args::{HandlingMode, HookPolicy, SpawningMode, TcpFraming, TransportKind};
use crate::error::ConfigError;

#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    pub execution: Option<ExecutionConfig>,
    pub logging: Option<LoggingConfig>,
    pub runtime: Option<RuntimeConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExecutionConfig {
    pub spawning_mode: Option<SpawningMode>,
    pub pecker_handling_mode: Option<HandlingMode>,
    pub active_polling_interval: Option<DurationValue>,
    pub controller_port: Option<u16>,
    pub controller_protocol: Option<TransportKind>,
    pub tcp_framing: Option<TcpFraming>,
    pub spawners: Option<Vec<String>>,
    pub send_timeout: Option<DurationValue>,
    pub max_rescale_ratio: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoggingConfig {
    pub max_entries_before_flush: Option<usize>,
    pub flush_interval: Option<DurationValue>,
    pub logger_host: Option<String>,
    pub logger_port: Option<u16>,
    pub logger_protocol: Option<TransportKind>,
    pub results_path: Option<PathBuf>,
    pub sysmonitor_polling_interval: Option<DurationValue>,
    pub collector_grace: Option<DurationValue>,
    pub max_pending_batches: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RuntimeConfig {
    pub hook_policy: Option<HookPolicy>,
    pub each_iteration_is_transaction: Option<bool>,
    pub host_name: Option<String>,
}

/// A duration given either as whole seconds or as a `ms/s/m/h` string.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum DurationValue {
    Seconds(u64),
    Text(String),
}

impl DurationValue {
    pub(crate) fn to_duration(&self) -> Result<Duration, ConfigError> {
        match self {
            DurationValue::Seconds(secs) => Ok(Duration::from_secs(*secs)),
            DurationValue::Text(text) => super::parse_duration_value(text),
        }
    }
}
