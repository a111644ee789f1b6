//! CLI argument types and parsing helpers.
mod cli;
mod parsers;
mod types;

pub use cli::{Cli, CollectorArgs, Command, ControllerArgs, RunArgs, SpawnerArgs};
pub use types::{HandlingMode, HookPolicy, SpawningMode, TcpFraming, TransportKind};
