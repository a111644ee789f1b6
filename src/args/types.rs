use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// How worker units are backed on a spawner host.
#[derive(Debug, Clone, Copy, ValueEnum, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpawningMode {
    /// Cooperative tokio tasks sharing the runtime.
    #[default]
    Tasks,
    /// One OS thread per worker, each driving its own current-thread runtime.
    Threads,
}

/// Scheduling discipline used by the spawner engine.
#[derive(Debug, Clone, Copy, ValueEnum, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HandlingMode {
    /// Poll-reconciled: the engine compares planned vs running every tick.
    Active,
    /// Precomputed windows: each worker waits for and leaves its own slot.
    #[default]
    Passive,
}

#[derive(Debug, Clone, Copy, ValueEnum, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Tcp,
    Udp,
}

impl TransportKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TransportKind::Tcp => "tcp",
            TransportKind::Udp => "udp",
        }
    }
}

/// Message boundaries on TCP connections.
#[derive(Debug, Clone, Copy, ValueEnum, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TcpFraming {
    /// One message per connection, delimited by the sender closing its half.
    #[default]
    Eof,
    /// A big-endian u32 length precedes the payload.
    LengthPrefixed,
}

/// When navigation setup/teardown hooks run.
#[derive(Debug, Clone, Copy, ValueEnum, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum HookPolicy {
    #[default]
    PerIteration,
    PerWorker,
}
