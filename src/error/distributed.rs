use thiserror::Error;

/// Control command a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandPhase {
    Unpack,
    Setup,
    Start,
    Stop,
    EmergencyStop,
    Shutdown,
}

impl CommandPhase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            CommandPhase::Unpack => "scenario_unpack",
            CommandPhase::Setup => "scenario_setup",
            CommandPhase::Start => "start",
            CommandPhase::Stop => "stop",
            CommandPhase::EmergencyStop => "emergency_stop",
            CommandPhase::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for CommandPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum DistributedError {
    #[error("I/O error during {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("Connection error to {addr}: {source}")]
    Connection {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Bind error on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Timed out after {timeout_ms}ms sending to {addr}.")]
    SendTimeout { addr: String, timeout_ms: u64 },
    #[error("Wire message exceeded max size ({max_bytes} bytes).")]
    WireMessageTooLarge { max_bytes: usize },
    #[error("Wire message was empty.")]
    WireMessageEmpty,
    #[error("Serialization error during {context}: {source}")]
    Encode {
        context: &'static str,
        #[source]
        source: rmp_serde::encode::Error,
    },
    #[error("Deserialization error during {context}: {source}")]
    Decode {
        context: &'static str,
        #[source]
        source: rmp_serde::decode::Error,
    },
    #[error("Scenario archive error during {context}: {source}")]
    Archive {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("Received {phase} before scenario_unpack.")]
    ScenarioNotUnpacked { phase: CommandPhase },
    #[error("Received start before scenario_setup.")]
    ScenarioNotReady,
    #[error("Received {phase} while a run is active.")]
    RunAlreadyActive { phase: CommandPhase },
    #[error("Every spawner failed during {phase}.")]
    AllSpawnersFailed { phase: CommandPhase },
    #[error("Distributed run completed with {failures} spawner failure(s).")]
    RunCompletedWithErrors { failures: usize },
    #[error("Spawner engine task ended abnormally: {message}")]
    EngineAborted { message: String },
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
