use thiserror::Error;

/// Failures raised by navigation code while a worker iterates.
#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("{message}")]
    Failed { message: String },
    #[error("Transaction '{name}' set to end, but never started.")]
    TransactionNotStarted { name: String },
    #[error("Variable '{name}' is reserved and cannot be set.")]
    ReservedVariable { name: String },
    #[error("Variable '{name}' is not defined.")]
    VariableNotDefined { name: String },
    #[error("Request '{name}' failed: {source}")]
    Request {
        name: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Request '{name}' returned status {actual} (expected {expected}).")]
    UnexpectedStatus {
        name: String,
        expected: u16,
        actual: u16,
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

impl NavigationError {
    pub fn failed<M>(message: M) -> Self
    where
        M: Into<String>,
    {
        NavigationError::Failed {
            message: message.into(),
        }
    }
}
