use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;

use super::{ControllerJob, drive_run, partition, partition_weighted, rescale_ratio, with_default_port};
use crate::args::{TcpFraming, TransportKind};
use crate::config::Settings;
use crate::error::{AppError, AppResult, CommandPhase, ConfigError, DistributedError};
use crate::messenger::Listener;
use crate::navigation::Registry;
use crate::scenario::{NavigationPlan, Ramp, SCENARIO_FILE, Scenario};
use crate::shutdown::shutdown_channel;
use crate::spawner::serve_spawner;
use crate::test_support::{allocate_port, run_async_test};

const RUN_TIMEOUT: Duration = Duration::from_secs(20);

fn scenario_folder(load_duration: &str) -> AppResult<TempDir> {
    let folder = tempfile::tempdir()?;
    let content = format!(
        r#"
[scenarios.smoke.navigations.browse]
kind = "think"
options = {{ think_time = "5ms" }}

[[scenarios.smoke.navigations.browse.ramps]]
peckers = 3
ramp_up = "0s"
load_duration = "{}"
ramp_down = "0s"
"#,
        load_duration
    );
    std::fs::write(folder.path().join(SCENARIO_FILE), content)?;
    Ok(folder)
}

fn job(folder: &Path) -> ControllerJob {
    ControllerJob {
        scenario_name: "smoke".to_owned(),
        scenario_folder: folder.to_path_buf(),
        collector: None,
    }
}

fn quiet_settings() -> AppResult<Settings> {
    let mut settings = Settings::default();
    settings.execution.send_timeout = Duration::from_millis(500);
    settings.logging.logger_host = "127.0.0.1".to_owned();
    settings.logging.logger_port = allocate_port()?;
    settings.logging.sysmonitor_polling_interval = Duration::from_secs(3_600);
    Ok(settings)
}

/// Serves one in-process spawner; returns its address.
async fn start_spawner(settings: &Settings) -> AppResult<String> {
    let listener = Listener::bind("127.0.0.1:0", TransportKind::Tcp, TcpFraming::Eof).await?;
    let address = listener.local_addr()?.to_string();
    let settings = settings.clone();
    tokio::spawn(async move {
        let (shutdown_tx, _) = shutdown_channel();
        serve_spawner(listener, &settings, Registry::with_builtins(), &shutdown_tx).await
    });
    Ok(address)
}

#[test]
fn partition_sums_exactly() -> AppResult<()> {
    if partition(10, 3) != vec![4, 3, 3] {
        return Err(AppError::validation("10 over 3 should be 4/3/3"));
    }
    if partition(0, 2) != vec![0, 0] || !partition(5, 0).is_empty() {
        return Err(AppError::validation("Degenerate partitions"));
    }
    for total in 0..50u64 {
        for spawners in 1..7usize {
            let shares = partition(total, spawners);
            let sum: u64 = shares.iter().sum();
            let max = shares.iter().max().copied().unwrap_or(0);
            let min = shares.iter().min().copied().unwrap_or(0);
            if sum != total || max.saturating_sub(min) > 1 {
                return Err(AppError::validation(format!(
                    "Bad partition of {} over {}: {:?}",
                    total, spawners, shares
                )));
            }
        }
    }
    Ok(())
}

#[test]
fn largest_remainder_wins_the_leftover() -> AppResult<()> {
    // 10/3 = 3.33 and 20/3 = 6.67
    if partition_weighted(10, &[1, 2]) != vec![3, 7] {
        return Err(AppError::validation("Leftover should go to the larger remainder"));
    }
    if partition_weighted(7, &[0, 0]) != vec![0, 0] {
        return Err(AppError::validation("Zero weights take nothing"));
    }
    Ok(())
}

#[test]
fn rescale_ratio_is_quota_over_peak() -> AppResult<()> {
    if rescale_ratio(3, 6).to_bits() != 0.5f64.to_bits() {
        return Err(AppError::validation("3 of 6 should be 0.5"));
    }
    if rescale_ratio(3, 0).to_bits() != 0.0f64.to_bits() {
        return Err(AppError::validation("Empty scenario rescales to zero"));
    }
    Ok(())
}

fn multi_ramp_scenario() -> Result<Scenario, ConfigError> {
    let ramp = |delay: u64, peckers: u64| {
        Ramp::new(
            Duration::from_secs(delay),
            peckers,
            Duration::ZERO,
            Duration::from_secs(10),
            Duration::ZERO,
        )
    };
    let mut scenario = Scenario::new("mixed");
    scenario.add_navigation(NavigationPlan::new(
        "browse",
        "think",
        vec![ramp(0, 5), ramp(0, 5)],
    ))?;
    scenario.add_navigation(NavigationPlan::new(
        "buy",
        "think",
        vec![ramp(0, 3), ramp(20, 7)],
    ))?;
    Ok(scenario)
}

#[test]
fn rescaled_spawners_add_up_to_the_peak() -> AppResult<()> {
    let scenario = multi_ramp_scenario()?;
    let peak = scenario.max_concurrency();
    for total in [peak, 7, 10, 33] {
        for spawners in 1..=6 {
            let mut summed_peak = 0u64;
            for quota in partition(total, spawners) {
                let mut local = scenario.clone();
                local.rescale_by_ratio(rescale_ratio(quota, peak));
                if local.max_concurrency() != quota {
                    return Err(AppError::validation(format!(
                        "Spawner with quota {} runs {}",
                        quota,
                        local.max_concurrency()
                    )));
                }
                summed_peak = summed_peak.saturating_add(local.max_concurrency());
            }
            if summed_peak != total {
                return Err(AppError::validation(format!(
                    "{} spawners run {} peckers, expected {}",
                    spawners, summed_peak, total
                )));
            }
        }
    }
    Ok(())
}

#[test]
fn overlapping_ramps_split_without_rounding_drift() -> AppResult<()> {
    let mut scenario = Scenario::new("twin");
    let ramp = Ramp::new(
        Duration::ZERO,
        5,
        Duration::ZERO,
        Duration::from_secs(10),
        Duration::ZERO,
    );
    scenario.add_navigation(NavigationPlan::new("browse", "think", vec![ramp.clone(), ramp]))?;
    let mut planned = Vec::new();
    for quota in partition(10, 4) {
        let mut local = scenario.clone();
        local.rescale_by_ratio(rescale_ratio(quota, 10));
        planned.push(local.planned_concurrency_at("browse", Duration::from_secs(5)));
    }
    if planned != [3, 3, 2, 2] {
        return Err(AppError::validation(format!("Unexpected plateau split {:?}", planned)));
    }
    Ok(())
}

#[test]
fn default_port_is_appended_only_when_missing() -> AppResult<()> {
    if with_default_port("spawner-1", 7877) != "spawner-1:7877" {
        return Err(AppError::validation("Missing port should be filled"));
    }
    if with_default_port("10.0.0.5:9000", 7877) != "10.0.0.5:9000" {
        return Err(AppError::validation("Explicit port should be kept"));
    }
    if with_default_port("[::1]:9000", 7877) != "[::1]:9000" {
        return Err(AppError::validation("IPv6 with port should be kept"));
    }
    Ok(())
}

#[test]
fn controller_requires_spawners() -> AppResult<()> {
    run_async_test(async {
        let folder = scenario_folder("1s")?;
        let (shutdown_tx, _) = shutdown_channel();
        match drive_run(&Settings::default(), &job(folder.path()), &shutdown_tx).await {
            Err(AppError::Config(ConfigError::MissingSpawners)) => Ok(()),
            _ => Err(AppError::validation("Expected missing spawners error")),
        }
    })
}

#[test]
fn unreachable_spawners_fail_the_first_phase() -> AppResult<()> {
    run_async_test(async {
        let folder = scenario_folder("1s")?;
        let mut settings = quiet_settings()?;
        settings.execution.spawners = vec![format!("127.0.0.1:{}", allocate_port()?)];
        let (shutdown_tx, _) = shutdown_channel();
        match drive_run(&settings, &job(folder.path()), &shutdown_tx).await {
            Err(AppError::Distributed(DistributedError::AllSpawnersFailed {
                phase: CommandPhase::Unpack,
            })) => Ok(()),
            _ => Err(AppError::validation("Expected every spawner to fail unpack")),
        }
    })
}

#[test]
fn run_completes_against_a_live_spawner() -> AppResult<()> {
    run_async_test(async {
        let folder = scenario_folder("300ms")?;
        let mut settings = quiet_settings()?;
        let live = start_spawner(&settings).await?;
        let dead = format!("127.0.0.1:{}", allocate_port()?);
        settings.execution.spawners = vec![live, dead];
        let (shutdown_tx, _) = shutdown_channel();

        let outcome = tokio::time::timeout(
            RUN_TIMEOUT,
            drive_run(&settings, &job(folder.path()), &shutdown_tx),
        )
        .await
        .map_err(|_elapsed| AppError::validation("Controller did not finish"))?;
        match outcome {
            Err(AppError::Distributed(DistributedError::RunCompletedWithErrors {
                failures: 1,
            })) => Ok(()),
            _ => Err(AppError::validation("Expected one failed spawner")),
        }
    })
}

#[test]
fn interrupt_triggers_an_emergency_stop() -> AppResult<()> {
    run_async_test(async {
        let folder = scenario_folder("10m")?;
        let mut settings = quiet_settings()?;
        settings.execution.spawners = vec![start_spawner(&settings).await?];
        let (shutdown_tx, _) = shutdown_channel();
        let run_job = job(folder.path());
        let run_settings = settings.clone();
        let run_tx = shutdown_tx.clone();
        let running =
            tokio::spawn(async move { drive_run(&run_settings, &run_job, &run_tx).await });

        tokio::time::sleep(Duration::from_millis(500)).await;
        shutdown_tx
            .send(())
            .map_err(|_closed| AppError::validation("Controller is not listening"))?;
        let report = tokio::time::timeout(RUN_TIMEOUT, running)
            .await
            .map_err(|_elapsed| AppError::validation("Emergency stop hung"))???;
        if !report.emergency_stopped || report.failures() != 0 {
            return Err(AppError::validation(format!("Unexpected report {:?}", report)));
        }
        if report.planned_peak != 3 || report.spawners.first().map(|s| s.quota) != Some(3) {
            return Err(AppError::validation("Single spawner should carry the whole peak"));
        }
        Ok(())
    })
}
