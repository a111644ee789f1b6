use crate::error::{AppError, AppResult, ConfigError};

use super::settings::Settings;
use super::types::{ConfigFile, DurationValue, ExecutionConfig, LoggingConfig, RuntimeConfig};

/// Applies every section present in `config` over `settings`.
///
/// # Errors
///
/// Returns an error when a duration value cannot be parsed.
pub fn apply_config(settings: &mut Settings, config: &ConfigFile) -> AppResult<()> {
    if let Some(execution) = config.execution.as_ref() {
        apply_execution(settings, execution)?;
    }
    if let Some(logging) = config.logging.as_ref() {
        apply_logging(settings, logging)?;
    }
    if let Some(runtime) = config.runtime.as_ref() {
        apply_runtime(settings, runtime);
    }
    Ok(())
}

fn apply_execution(settings: &mut Settings, config: &ExecutionConfig) -> AppResult<()> {
    let execution = &mut settings.execution;
    if let Some(mode) = config.spawning_mode {
        execution.spawning_mode = mode;
    }
    if let Some(mode) = config.pecker_handling_mode {
        execution.handling_mode = mode;
    }
    if let Some(value) = config.active_polling_interval.as_ref() {
        execution.active_polling_interval = duration(value)?;
    }
    if let Some(port) = config.controller_port {
        execution.controller_port = port;
    }
    if let Some(protocol) = config.controller_protocol {
        execution.controller_protocol = protocol;
    }
    if let Some(framing) = config.tcp_framing {
        execution.tcp_framing = framing;
    }
    if let Some(spawners) = config.spawners.as_ref() {
        execution.spawners.clone_from(spawners);
    }
    if let Some(value) = config.send_timeout.as_ref() {
        execution.send_timeout = duration(value)?;
    }
    if let Some(ratio) = config.max_rescale_ratio {
        execution.max_rescale_ratio = ratio;
    }
    Ok(())
}

fn apply_logging(settings: &mut Settings, config: &LoggingConfig) -> AppResult<()> {
    let logging = &mut settings.logging;
    if let Some(entries) = config.max_entries_before_flush {
        logging.max_entries_before_flush = entries;
    }
    if let Some(value) = config.flush_interval.as_ref() {
        logging.flush_interval = duration(value)?;
    }
    if let Some(host) = config.logger_host.as_ref() {
        logging.logger_host.clone_from(host);
    }
    if let Some(port) = config.logger_port {
        logging.logger_port = port;
    }
    if let Some(protocol) = config.logger_protocol {
        logging.logger_protocol = protocol;
    }
    if let Some(path) = config.results_path.as_ref() {
        logging.results_path.clone_from(path);
    }
    if let Some(value) = config.sysmonitor_polling_interval.as_ref() {
        logging.sysmonitor_polling_interval = duration(value)?;
    }
    if let Some(value) = config.collector_grace.as_ref() {
        logging.collector_grace = duration(value)?;
    }
    if let Some(max) = config.max_pending_batches {
        logging.max_pending_batches = max;
    }
    Ok(())
}

fn apply_runtime(settings: &mut Settings, config: &RuntimeConfig) {
    let runtime = &mut settings.runtime;
    if let Some(policy) = config.hook_policy {
        runtime.hook_policy = policy;
    }
    if let Some(flag) = config.each_iteration_is_transaction {
        runtime.each_iteration_is_transaction = flag;
    }
    if let Some(host) = config.host_name.as_ref() {
        runtime.host_name.clone_from(host);
    }
}

fn duration(value: &DurationValue) -> AppResult<std::time::Duration> {
    value.to_duration().map_err(AppError::config)
}

/// Rejects settings the engine cannot run with.
///
/// # Errors
///
/// Returns the first offending field.
pub fn validate_settings(settings: &Settings) -> AppResult<()> {
    let positive_durations = [
        (
            "execution.active_polling_interval",
            settings.execution.active_polling_interval,
        ),
        ("execution.send_timeout", settings.execution.send_timeout),
        ("logging.flush_interval", settings.logging.flush_interval),
        (
            "logging.sysmonitor_polling_interval",
            settings.logging.sysmonitor_polling_interval,
        ),
    ];
    for (field, value) in positive_durations {
        if value.is_zero() {
            return Err(AppError::config(ConfigError::FieldMustBePositive { field }));
        }
    }
    if settings.logging.max_entries_before_flush == 0 {
        return Err(AppError::config(ConfigError::FieldMustBePositive {
            field: "logging.max_entries_before_flush",
        }));
    }
    if settings.logging.max_pending_batches == 0 {
        return Err(AppError::config(ConfigError::FieldMustBePositive {
            field: "logging.max_pending_batches",
        }));
    }
    let ratio = settings.execution.max_rescale_ratio;
    if !ratio.is_finite() || ratio <= 0.0 {
        return Err(AppError::config(ConfigError::FieldMustBePositive {
            field: "execution.max_rescale_ratio",
        }));
    }
    Ok(())
}
