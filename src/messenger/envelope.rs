use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult, CommandPhase, DistributedError};
use crate::telemetry::TelemetryBatch;

/// Unit of exchange on every control and telemetry socket.
///
/// Encodes as `{"type": "command"|"notice", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Envelope {
    Command(Command),
    Notice(Notice),
}

/// Controller to spawner (and collector) commands, encoded as
/// `{"command": <name>, "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "data", rename_all = "snake_case")]
pub enum Command {
    ScenarioUnpack {
        compressed_scenario_folder: Vec<u8>,
    },
    ScenarioSetup {
        scenario_name: String,
        rescale_ratio: f64,
    },
    Start,
    Stop,
    EmergencyStop,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    Telemetry(TelemetryBatch),
}

impl Command {
    #[must_use]
    pub const fn phase(&self) -> CommandPhase {
        match self {
            Command::ScenarioUnpack { .. } => CommandPhase::Unpack,
            Command::ScenarioSetup { .. } => CommandPhase::Setup,
            Command::Start => CommandPhase::Start,
            Command::Stop => CommandPhase::Stop,
            Command::EmergencyStop => CommandPhase::EmergencyStop,
            Command::Shutdown => CommandPhase::Shutdown,
        }
    }
}

impl From<Command> for Envelope {
    fn from(command: Command) -> Self {
        Envelope::Command(command)
    }
}

impl From<Notice> for Envelope {
    fn from(notice: Notice) -> Self {
        Envelope::Notice(notice)
    }
}

/// Encodes an envelope as a MessagePack map.
///
/// # Errors
///
/// Returns an error when serialization fails.
pub fn encode(envelope: &Envelope) -> AppResult<Vec<u8>> {
    rmp_serde::to_vec_named(envelope).map_err(|err| {
        AppError::distributed(DistributedError::Encode {
            context: "envelope",
            source: err,
        })
    })
}

/// Decodes one envelope from a complete buffer.
///
/// # Errors
///
/// Returns an error when the buffer is empty or not a valid envelope.
pub fn decode(bytes: &[u8]) -> AppResult<Envelope> {
    if bytes.is_empty() {
        return Err(AppError::distributed(DistributedError::WireMessageEmpty));
    }
    rmp_serde::from_slice(bytes).map_err(|err| {
        AppError::distributed(DistributedError::Decode {
            context: "envelope",
            source: err,
        })
    })
}
