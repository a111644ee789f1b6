mod app;
mod config;
mod distributed;
mod navigation;
mod telemetry;
mod validation;

#[cfg(test)]
mod test_support;

pub use app::{AppError, AppResult};
pub use config::ConfigError;
pub use distributed::{CommandPhase, DistributedError};
pub use navigation::NavigationError;
pub use telemetry::TelemetryError;
pub use validation::ValidationError;
