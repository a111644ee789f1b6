use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::config::types::DurationValue;
use crate::error::ConfigError;

use super::{NavigationOptions, NavigationPlan, Ramp, Scenario};
use super::{DEFAULT_LOAD_DURATION, DEFAULT_PECKERS, DEFAULT_RAMP_DOWN, DEFAULT_RAMP_UP};

/// File every scenario folder must carry at its root.
pub const SCENARIO_FILE: &str = "scenario.toml";

#[derive(Debug, Deserialize)]
struct ScenarioFile {
    #[serde(default)]
    scenarios: BTreeMap<String, ScenarioEntry>,
}

#[derive(Debug, Deserialize)]
struct ScenarioEntry {
    #[serde(default)]
    navigations: BTreeMap<String, NavigationEntry>,
}

#[derive(Debug, Deserialize)]
struct NavigationEntry {
    kind: String,
    max_iterations: Option<u64>,
    #[serde(default)]
    options: NavigationOptions,
    #[serde(default)]
    ramps: Vec<RampEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct RampEntry {
    initial_delay: Option<DurationValue>,
    peckers: Option<u64>,
    ramp_up: Option<DurationValue>,
    load_duration: Option<DurationValue>,
    ramp_down: Option<DurationValue>,
}

/// Reads `scenario.toml` from `folder` and builds the named scenario.
///
/// # Errors
///
/// Returns an error when the file is missing or malformed, or when the
/// scenario is undefined or structurally invalid.
pub fn load_scenario(folder: &Path, name: &str) -> Result<Scenario, ConfigError> {
    let path = folder.join(SCENARIO_FILE);
    let content = std::fs::read_to_string(&path).map_err(|err| ConfigError::ReadScenario {
        path: path.clone(),
        source: err,
    })?;
    let file: ScenarioFile =
        toml::from_str(&content).map_err(|err| ConfigError::ParseScenario {
            path: path.clone(),
            source: err,
        })?;
    build_scenario(file, name)
}

/// Parses scenario TOML held in memory.
///
/// # Errors
///
/// Same as [`load_scenario`], minus the read step.
pub fn parse_scenario(content: &str, name: &str) -> Result<Scenario, ConfigError> {
    let file: ScenarioFile =
        toml::from_str(content).map_err(|err| ConfigError::ParseScenario {
            path: SCENARIO_FILE.into(),
            source: err,
        })?;
    build_scenario(file, name)
}

fn build_scenario(mut file: ScenarioFile, name: &str) -> Result<Scenario, ConfigError> {
    let entry = file
        .scenarios
        .remove(name)
        .ok_or_else(|| ConfigError::UnknownScenario {
            name: name.to_owned(),
        })?;
    if entry.navigations.is_empty() {
        return Err(ConfigError::ScenarioWithoutNavigations {
            name: name.to_owned(),
        });
    }

    let mut scenario = Scenario::new(name);
    for (nav_name, nav) in entry.navigations {
        let ramps = nav
            .ramps
            .iter()
            .enumerate()
            .map(|(index, ramp)| build_ramp(&nav_name, index, ramp))
            .collect::<Result<Vec<_>, _>>()?;
        scenario.add_navigation(NavigationPlan {
            name: nav_name,
            kind: nav.kind,
            max_iterations: nav.max_iterations,
            options: nav.options,
            ramps,
        })?;
    }
    Ok(scenario)
}

fn build_ramp(navigation: &str, index: usize, entry: &RampEntry) -> Result<Ramp, ConfigError> {
    let phase = |field: &'static str,
                 value: Option<&DurationValue>,
                 default: std::time::Duration| {
        value.map_or(Ok(default), |value| {
            value.to_duration().map_err(|err| ConfigError::InvalidRamp {
                navigation: navigation.to_owned(),
                index,
                field,
                source: Box::new(err),
            })
        })
    };
    Ok(Ramp::new(
        phase(
            "initial_delay",
            entry.initial_delay.as_ref(),
            std::time::Duration::ZERO,
        )?,
        entry.peckers.unwrap_or(DEFAULT_PECKERS),
        phase("ramp_up", entry.ramp_up.as_ref(), DEFAULT_RAMP_UP)?,
        phase(
            "load_duration",
            entry.load_duration.as_ref(),
            DEFAULT_LOAD_DURATION,
        )?,
        phase("ramp_down", entry.ramp_down.as_ref(), DEFAULT_RAMP_DOWN)?,
    ))
}
