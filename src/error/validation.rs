use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid socket address '{value}': {source}")]
    InvalidAddress {
        value: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Socket address '{value}' did not resolve.")]
    UnresolvedAddress { value: String },
    #[error("Rescale ratio {value} is outside [0, {max}].")]
    RescaleRatioOutOfBounds { value: f64, max: f64 },
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
