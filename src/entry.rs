use std::path::PathBuf;

use clap::{CommandFactory, FromArgMatches};
use tracing::{error, info};

use crate::args::{Cli, CollectorArgs, Command, ControllerArgs, RunArgs, SpawnerArgs};
use crate::config::{Settings, apply_config, load_config, validate_settings};
use crate::controller::{ControllerJob, run_controller};
use crate::error::{AppError, AppResult, ConfigError};
use crate::navigation::Registry;
use crate::spawner::{run_local, run_spawner};
use crate::telemetry::run_collector;

enum RunPlan {
    Controller(ControllerJob),
    Spawner,
    Collector,
    Local {
        scenario_folder: PathBuf,
        scenario_name: String,
    },
}

/// Parses the command line, loads settings and runs the chosen role.
///
/// # Errors
///
/// Returns an error when configuration is invalid or the role fails.
pub fn run() -> AppResult<()> {
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches)?;

    crate::logger::init_logging(cli.verbose, cli.no_color);

    let (settings, plan) = build_plan(&cli)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(execute_plan(settings, plan))
}

fn build_plan(cli: &Cli) -> AppResult<(Settings, RunPlan)> {
    let mut settings = Settings::default();
    if let Some(config) = load_config(cli.config.as_deref())? {
        apply_config(&mut settings, &config)?;
    }

    let plan = match &cli.command {
        Command::Controller(args) => {
            apply_controller_overrides(&mut settings, args);
            if settings.execution.spawners.is_empty() {
                error!("No spawners configured (set --spawner or execution.spawners).");
                return Err(AppError::config(ConfigError::MissingSpawners));
            }
            RunPlan::Controller(ControllerJob {
                scenario_name: args.scenario.clone(),
                scenario_folder: args.scenario_folder.clone(),
                collector: args.collector.clone(),
            })
        }
        Command::Spawner(args) => {
            apply_spawner_overrides(&mut settings, args);
            RunPlan::Spawner
        }
        Command::Collector(args) => {
            apply_collector_overrides(&mut settings, args);
            RunPlan::Collector
        }
        Command::Run(args) => {
            apply_run_overrides(&mut settings, args);
            RunPlan::Local {
                scenario_folder: args.scenario_folder.clone(),
                scenario_name: args.scenario.clone(),
            }
        }
    };

    validate_settings(&settings)?;
    Ok((settings, plan))
}

fn apply_controller_overrides(settings: &mut Settings, args: &ControllerArgs) {
    if !args.spawners.is_empty() {
        settings.execution.spawners.clone_from(&args.spawners);
    }
    if let Some(protocol) = args.protocol {
        settings.execution.controller_protocol = protocol;
    }
    if let Some(timeout) = args.send_timeout {
        settings.execution.send_timeout = timeout;
    }
}

fn apply_spawner_overrides(settings: &mut Settings, args: &SpawnerArgs) {
    if let Some(port) = args.port {
        settings.execution.controller_port = port;
    }
    if let Some(protocol) = args.protocol {
        settings.execution.controller_protocol = protocol;
    }
    if let Some(mode) = args.spawning_mode {
        settings.execution.spawning_mode = mode;
    }
    if let Some(mode) = args.handling_mode {
        settings.execution.handling_mode = mode;
    }
}

fn apply_collector_overrides(settings: &mut Settings, args: &CollectorArgs) {
    if let Some(port) = args.port {
        settings.logging.logger_port = port;
    }
    if let Some(protocol) = args.protocol {
        settings.logging.logger_protocol = protocol;
    }
    if let Some(results) = &args.results {
        settings.logging.results_path.clone_from(results);
    }
}

fn apply_run_overrides(settings: &mut Settings, args: &RunArgs) {
    if let Some(results) = &args.results {
        settings.logging.results_path.clone_from(results);
    }
    if let Some(mode) = args.spawning_mode {
        settings.execution.spawning_mode = mode;
    }
    if let Some(mode) = args.handling_mode {
        settings.execution.handling_mode = mode;
    }
}

async fn execute_plan(settings: Settings, plan: RunPlan) -> AppResult<()> {
    match plan {
        RunPlan::Controller(job) => {
            let report = run_controller(&settings, &job).await?;
            info!(
                "Scenario '{}' done: peak {} peckers over {} spawner(s)",
                report.scenario,
                report.planned_peak,
                report.spawners.len()
            );
            Ok(())
        }
        RunPlan::Spawner => run_spawner(&settings, Registry::with_builtins()).await,
        RunPlan::Collector => run_collector(&settings).await.map(|_batches| ()),
        RunPlan::Local {
            scenario_folder,
            scenario_name,
        } => {
            let report = run_local(
                &settings,
                Registry::with_builtins(),
                &scenario_folder,
                &scenario_name,
            )
            .await?;
            info!(
                "Local run finished ({:?}): {} peckers, {} iterations, {} failed",
                report.exit, report.spawned, report.iterations, report.failed
            );
            Ok(())
        }
    }
}
