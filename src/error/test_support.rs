use super::{AppError, ConfigError, DistributedError, NavigationError, TelemetryError, ValidationError};

impl From<&'static str> for ValidationError {
    fn from(message: &'static str) -> Self {
        ValidationError::TestExpectation { message }
    }
}

impl From<String> for ValidationError {
    fn from(value: String) -> Self {
        ValidationError::TestExpectationValue {
            message: "Test expectation failed",
            value,
        }
    }
}

impl From<&'static str> for ConfigError {
    fn from(message: &'static str) -> Self {
        ConfigError::TestExpectation { message }
    }
}

impl From<String> for ConfigError {
    fn from(value: String) -> Self {
        ConfigError::TestExpectationValue {
            message: "Test expectation failed",
            value,
        }
    }
}

impl From<&'static str> for DistributedError {
    fn from(message: &'static str) -> Self {
        DistributedError::TestExpectation { message }
    }
}

impl From<String> for DistributedError {
    fn from(value: String) -> Self {
        DistributedError::TestExpectationValue {
            message: "Test expectation failed",
            value,
        }
    }
}

impl From<&'static str> for NavigationError {
    fn from(message: &'static str) -> Self {
        NavigationError::TestExpectation { message }
    }
}

impl From<String> for NavigationError {
    fn from(value: String) -> Self {
        NavigationError::TestExpectationValue {
            message: "Test expectation failed",
            value,
        }
    }
}

impl From<&'static str> for TelemetryError {
    fn from(message: &'static str) -> Self {
        TelemetryError::TestExpectation { message }
    }
}

impl From<String> for TelemetryError {
    fn from(value: String) -> Self {
        TelemetryError::TestExpectationValue {
            message: "Test expectation failed",
            value,
        }
    }
}

impl From<&'static str> for AppError {
    fn from(message: &'static str) -> Self {
        AppError::Validation(ValidationError::TestExpectation { message })
    }
}

impl From<String> for AppError {
    fn from(value: String) -> Self {
        AppError::Validation(ValidationError::TestExpectationValue {
            message: "Test expectation failed",
            value,
        })
    }
}
