//! Configuration loading and application.
mod apply;
mod loader;
mod parse;
mod settings;
pub mod types;


pub use apply::{apply_config, validate_settings};
pub use loader::load_config;
pub use settings::{
    DEFAULT_CONTROLLER_PORT, DEFAULT_LOGGER_PORT, DEFAULT_MAX_RESCALE_RATIO, ExecutionSettings,
    LoggingSettings, RuntimeSettings, Settings,
};

#[cfg(test)]
pub(crate) use loader::load_config_file;
pub(crate) use parse::parse_duration_value;
