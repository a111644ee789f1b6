use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Results store error during {context}: {source}")]
    Store {
        context: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Telemetry retry buffer overflowed ({pending} pending batches, max {max}).")]
    RetryBufferFull { pending: usize, max: usize },
    #[error("Telemetry delivery failed: {message}")]
    Delivery { message: String },
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
