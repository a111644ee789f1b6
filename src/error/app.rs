use thiserror::Error;

use super::{ConfigError, DistributedError, NavigationError, TelemetryError, ValidationError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("CLI error: {source}")]
    Clap {
        #[from]
        source: clap::Error,
    },
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
    #[error("TOML error: {source}")]
    Toml {
        #[from]
        source: toml::de::Error,
    },
    #[error("Join error: {source}")]
    Join {
        #[from]
        source: tokio::task::JoinError,
    },
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Distributed error: {0}")]
    Distributed(#[from] DistributedError),
    #[error("Navigation error: {0}")]
    Navigation(#[from] NavigationError),
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation<E>(error: E) -> Self
    where
        E: Into<ValidationError>,
    {
        error.into().into()
    }

    pub fn config<E>(error: E) -> Self
    where
        E: Into<ConfigError>,
    {
        error.into().into()
    }

    pub fn distributed<E>(error: E) -> Self
    where
        E: Into<DistributedError>,
    {
        error.into().into()
    }

    pub fn navigation<E>(error: E) -> Self
    where
        E: Into<NavigationError>,
    {
        error.into().into()
    }

    pub fn telemetry<E>(error: E) -> Self
    where
        E: Into<TelemetryError>,
    {
        error.into().into()
    }
}
