use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use super::parsers::parse_duration_arg;
use super::types::{HandlingMode, SpawningMode, TransportKind};

#[derive(Debug, Parser, Clone)]
#[clap(
    version,
    about = "Distributed load generator - ramp-driven peckers across spawner hosts with buffered SQLite telemetry."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to config file (TOML or JSON); defaults to woodpecker.toml/woodpecker.json
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Enable debug logging (overridden by WOODPECKER_LOG/RUST_LOG)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Disable ANSI colors in log output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Partition a scenario across spawners and drive the run
    Controller(ControllerArgs),
    /// Listen for controller commands and run peckers on this host
    Spawner(SpawnerArgs),
    /// Receive telemetry batches and persist them into the results store
    Collector(CollectorArgs),
    /// Run a scenario on this host with an in-process results store
    Run(RunArgs),
}

#[derive(Debug, Args, Clone)]
pub struct ControllerArgs {
    /// Scenario name as declared in scenario.toml
    #[arg(long)]
    pub scenario: String,

    /// Folder shipped to every spawner (must contain scenario.toml)
    #[arg(long = "scenario-folder", default_value = ".")]
    pub scenario_folder: PathBuf,

    /// Spawner address (host or host:port); repeat for several spawners
    #[arg(long = "spawner")]
    pub spawners: Vec<String>,

    /// Collector address to shut down once the run is over
    #[arg(long)]
    pub collector: Option<String>,

    /// Control transport protocol
    #[arg(long, value_enum)]
    pub protocol: Option<TransportKind>,

    /// Bound on every control send (supports ms/s/m/h)
    #[arg(long = "send-timeout", value_parser = parse_duration_arg)]
    pub send_timeout: Option<Duration>,
}

#[derive(Debug, Args, Clone)]
pub struct SpawnerArgs {
    /// Port to listen on for controller commands
    #[arg(long)]
    pub port: Option<u16>,

    /// Control transport protocol
    #[arg(long, value_enum)]
    pub protocol: Option<TransportKind>,

    /// Worker backing (tasks or threads)
    #[arg(long = "spawning-mode", value_enum)]
    pub spawning_mode: Option<SpawningMode>,

    /// Scheduling discipline (active or passive)
    #[arg(long = "handling-mode", value_enum)]
    pub handling_mode: Option<HandlingMode>,
}

#[derive(Debug, Args, Clone)]
pub struct CollectorArgs {
    /// Port to listen on for telemetry batches
    #[arg(long)]
    pub port: Option<u16>,

    /// Telemetry transport protocol
    #[arg(long, value_enum)]
    pub protocol: Option<TransportKind>,

    /// SQLite results file
    #[arg(long)]
    pub results: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// Scenario name as declared in scenario.toml
    #[arg(long)]
    pub scenario: String,

    /// Folder containing scenario.toml
    #[arg(long = "scenario-folder", default_value = ".")]
    pub scenario_folder: PathBuf,

    /// SQLite results file
    #[arg(long)]
    pub results: Option<PathBuf>,

    /// Worker backing (tasks or threads)
    #[arg(long = "spawning-mode", value_enum)]
    pub spawning_mode: Option<SpawningMode>,

    /// Scheduling discipline (active or passive)
    #[arg(long = "handling-mode", value_enum)]
    pub handling_mode: Option<HandlingMode>,
}
