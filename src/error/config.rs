use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML config '{path}': {source}")]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to parse JSON config '{path}': {source}")]
    ParseJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unsupported config extension '{ext}'. Use .toml or .json.")]
    UnsupportedExtension { ext: String },
    #[error("Config file must have .toml or .json extension.")]
    MissingExtension,
    #[error("Duration must not be empty.")]
    DurationEmpty,
    #[error("Invalid duration '{value}'.")]
    InvalidDurationFormat { value: String },
    #[error("Invalid duration '{value}': {source}")]
    InvalidDurationNumber {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("Duration overflow.")]
    DurationOverflow,
    #[error("Invalid duration unit '{unit}'.")]
    InvalidDurationUnit { unit: String },
    #[error("Config '{field}' must be > 0.")]
    FieldMustBePositive { field: &'static str },
    #[error("Controller requires at least one spawner address.")]
    MissingSpawners,
    #[error("Failed to read scenario file '{path}': {source}")]
    ReadScenario {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse scenario file '{path}': {source}")]
    ParseScenario {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Scenario '{name}' is not defined.")]
    UnknownScenario { name: String },
    #[error("Scenario '{name}' has no navigations.")]
    ScenarioWithoutNavigations { name: String },
    #[error("Navigation '{name}' is declared twice.")]
    DuplicateNavigation { name: String },
    #[error("Navigation '{navigation}' has no ramps.")]
    NavigationWithoutRamps { navigation: String },
    #[error("Navigation '{navigation}' uses unregistered kind '{kind}'.")]
    UnknownNavigationKind { navigation: String, kind: String },
    #[error("Navigation '{navigation}' option '{option}' is invalid: {message}")]
    InvalidNavigationOption {
        navigation: String,
        option: &'static str,
        message: String,
    },
    #[error("Navigation '{navigation}' ramp {index} has invalid '{field}': {source}")]
    InvalidRamp {
        navigation: String,
        index: usize,
        field: &'static str,
        #[source]
        source: Box<ConfigError>,
    },
    #[cfg(test)]
    #[error("Test expectation failed: {message}")]
    TestExpectation { message: &'static str },
    #[cfg(test)]
    #[error("Test expectation failed: {message}: {value}")]
    TestExpectationValue {
        message: &'static str,
        value: String,
    },
}
