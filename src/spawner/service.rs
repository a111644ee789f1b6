use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::archive;
use crate::error::{AppError, AppResult, CommandPhase, DistributedError, ValidationError};
use crate::messenger::Command;
use crate::navigation::Registry;
use crate::scenario::{Scenario, load_scenario};
use crate::telemetry::TelemetryLog;
use crate::worker::Runner;

use super::engine::{EngineConfig, EngineReport, EngineSignal, SpawnerEngine};

/// Whether the command loop keeps listening after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Shutdown,
}

enum State {
    Idle,
    Unpacked {
        folder: TempDir,
    },
    Ready {
        folder: TempDir,
        scenario: Scenario,
    },
    Running {
        folder: TempDir,
        signal: watch::Sender<EngineSignal>,
        engine: JoinHandle<AppResult<EngineReport>>,
    },
}

impl State {
    const fn name(&self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::Unpacked { .. } => "unpacked",
            State::Ready { .. } => "ready",
            State::Running { .. } => "running",
        }
    }
}

/// Command-driven lifecycle of one spawner host:
/// idle -> unpacked -> ready -> running -> unpacked.
pub struct SpawnerService {
    registry: Arc<Registry>,
    runner: Arc<dyn Runner>,
    log: Arc<TelemetryLog>,
    engine_config: EngineConfig,
    max_rescale_ratio: f64,
    state: State,
}

impl SpawnerService {
    #[must_use]
    pub fn new(
        registry: Arc<Registry>,
        runner: Arc<dyn Runner>,
        log: Arc<TelemetryLog>,
        engine_config: EngineConfig,
        max_rescale_ratio: f64,
    ) -> Self {
        Self {
            registry,
            runner,
            log,
            engine_config,
            max_rescale_ratio,
            state: State::Idle,
        }
    }

    #[must_use]
    pub const fn state_name(&self) -> &'static str {
        self.state.name()
    }

    /// Applies one controller command.
    ///
    /// # Errors
    ///
    /// Returns an error when the command is out of order or cannot be
    /// carried out; the service stays usable afterwards.
    pub async fn handle(&mut self, command: Command) -> AppResult<Flow> {
        self.reap().await;
        let phase = command.phase();
        info!("Spawner handling {} (state {})", phase, self.state.name());
        match command {
            Command::ScenarioUnpack {
                compressed_scenario_folder,
            } => self.unpack(compressed_scenario_folder).await?,
            Command::ScenarioSetup {
                scenario_name,
                rescale_ratio,
            } => self.setup(&scenario_name, rescale_ratio)?,
            Command::Start => self.start()?,
            Command::Stop => self.signal(EngineSignal::Stop),
            Command::EmergencyStop => self.signal(EngineSignal::EmergencyStop),
            Command::Shutdown => {
                if let Err(err) = self.shutdown().await {
                    warn!("Spawner shut down with an error: {}", err);
                }
                return Ok(Flow::Shutdown);
            }
        }
        Ok(Flow::Continue)
    }

    async fn unpack(&mut self, bytes: Vec<u8>) -> AppResult<()> {
        if matches!(self.state, State::Running { .. }) {
            return Err(AppError::distributed(DistributedError::RunAlreadyActive {
                phase: CommandPhase::Unpack,
            }));
        }
        let folder = TempDir::new().map_err(|err| {
            AppError::distributed(DistributedError::Archive {
                context: "create scenario folder",
                source: err,
            })
        })?;
        let dest = folder.path().to_path_buf();
        let size = bytes.len();
        tokio::task::spawn_blocking(move || archive::unpack_into(&bytes, &dest)).await??;
        info!(
            "Unpacked scenario archive ({} bytes) into {}",
            size,
            folder.path().display()
        );
        self.state = State::Unpacked { folder };
        Ok(())
    }

    fn setup(&mut self, scenario_name: &str, rescale_ratio: f64) -> AppResult<()> {
        if !rescale_ratio.is_finite()
            || rescale_ratio < 0.0
            || rescale_ratio > self.max_rescale_ratio
        {
            return Err(AppError::validation(
                ValidationError::RescaleRatioOutOfBounds {
                    value: rescale_ratio,
                    max: self.max_rescale_ratio,
                },
            ));
        }
        let folder = match std::mem::replace(&mut self.state, State::Idle) {
            State::Unpacked { folder } | State::Ready { folder, .. } => folder,
            running @ State::Running { .. } => {
                self.state = running;
                return Err(AppError::distributed(DistributedError::RunAlreadyActive {
                    phase: CommandPhase::Setup,
                }));
            }
            State::Idle => {
                return Err(AppError::distributed(DistributedError::ScenarioNotUnpacked {
                    phase: CommandPhase::Setup,
                }));
            }
        };
        let loaded = load_scenario(folder.path(), scenario_name)
            .map_err(AppError::from)
            .and_then(|scenario| {
                self.registry.validate(&scenario)?;
                Ok(scenario)
            });
        let mut scenario = match loaded {
            Ok(scenario) => scenario,
            Err(err) => {
                self.state = State::Unpacked { folder };
                return Err(err);
            }
        };
        let quota = scenario.rescale_by_ratio(rescale_ratio);
        info!(
            "Scenario '{}' ready: ratio {}, {} peckers at peak, {:?}",
            scenario.name(),
            rescale_ratio,
            quota,
            scenario.duration()
        );
        self.state = State::Ready { folder, scenario };
        Ok(())
    }

    fn start(&mut self) -> AppResult<()> {
        let (folder, scenario) = match std::mem::replace(&mut self.state, State::Idle) {
            State::Ready { folder, scenario } => (folder, scenario),
            State::Idle => {
                return Err(AppError::distributed(DistributedError::ScenarioNotUnpacked {
                    phase: CommandPhase::Start,
                }));
            }
            State::Unpacked { folder } => {
                self.state = State::Unpacked { folder };
                return Err(AppError::distributed(DistributedError::ScenarioNotReady));
            }
            running @ State::Running { .. } => {
                self.state = running;
                return Err(AppError::distributed(DistributedError::RunAlreadyActive {
                    phase: CommandPhase::Start,
                }));
            }
        };
        let engine = SpawnerEngine::new(
            Arc::new(scenario),
            Arc::clone(&self.registry),
            Arc::clone(&self.runner),
            Arc::clone(&self.log),
            self.engine_config.clone(),
        );
        let (signal, signal_rx) = watch::channel(EngineSignal::Run);
        let engine = tokio::spawn(engine.run(signal_rx));
        self.state = State::Running {
            folder,
            signal,
            engine,
        };
        Ok(())
    }

    fn signal(&self, signal: EngineSignal) {
        match &self.state {
            State::Running { signal: tx, .. } => {
                // only escalate, never downgrade an emergency stop
                let changed = tx.send_if_modified(|current| {
                    if *current == EngineSignal::EmergencyStop || *current == signal {
                        return false;
                    }
                    *current = signal;
                    true
                });
                if !changed {
                    debug!("Engine already signalled, ignoring {:?}", signal);
                }
            }
            State::Idle | State::Unpacked { .. } | State::Ready { .. } => {
                warn!("Ignoring {:?} while {}", signal, self.state.name());
            }
        }
    }

    /// Joins the engine if it already finished on its own.
    async fn reap(&mut self) {
        let finished = matches!(&self.state, State::Running { engine, .. } if engine.is_finished());
        if finished && let Err(err) = self.join_engine().await {
            warn!("Previous run ended with an error: {}", err);
        }
    }

    /// Stops any active run, waits for it and flushes telemetry.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine failed or the final flush fails.
    pub async fn shutdown(&mut self) -> AppResult<Option<EngineReport>> {
        self.signal(EngineSignal::Stop);
        let report = self.join_engine().await?;
        self.state = State::Idle;
        self.log.flush().await?;
        Ok(report)
    }

    async fn join_engine(&mut self) -> AppResult<Option<EngineReport>> {
        let State::Running { folder, engine, .. } = std::mem::replace(&mut self.state, State::Idle)
        else {
            return Ok(None);
        };
        self.state = State::Unpacked { folder };
        let report = engine.await.map_err(|err| {
            AppError::distributed(DistributedError::EngineAborted {
                message: err.to_string(),
            })
        })?;
        match report {
            Ok(report) => {
                info!("Run finished: {:?}", report.exit);
                Ok(Some(report))
            }
            Err(err) => {
                warn!("Spawner engine failed: {}", err);
                Err(err)
            }
        }
    }
}
