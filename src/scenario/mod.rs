//! Declarative load profiles: ramps grouped into navigations grouped into scenarios.
mod loader;
mod ramp;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::time::Duration;

use crate::controller::partition_weighted;
use crate::error::ConfigError;

pub use loader::{SCENARIO_FILE, load_scenario, parse_scenario};
pub use ramp::{
    DEFAULT_LOAD_DURATION, DEFAULT_PECKERS, DEFAULT_RAMP_DOWN, DEFAULT_RAMP_UP, Ramp, Window,
};

/// Free-form options handed to a navigation factory.
pub type NavigationOptions = toml::Table;

/// The load profile of one navigation: which factory builds it and how many
/// peckers run it over time.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationPlan {
    pub name: String,
    pub kind: String,
    pub max_iterations: Option<u64>,
    pub options: NavigationOptions,
    pub ramps: Vec<Ramp>,
}

impl NavigationPlan {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: impl Into<String>, ramps: Vec<Ramp>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            max_iterations: None,
            options: NavigationOptions::new(),
            ramps,
        }
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.ramps
            .iter()
            .map(Ramp::total_duration)
            .max()
            .unwrap_or(Duration::ZERO)
    }

    #[must_use]
    pub fn max_concurrency(&self) -> u64 {
        self.ramps
            .iter()
            .fold(0u64, |acc, ramp| acc.saturating_add(ramp.target()))
    }

    #[must_use]
    pub fn planned_at(&self, elapsed: Duration) -> u64 {
        self.ramps
            .iter()
            .fold(0u64, |acc, ramp| acc.saturating_add(ramp.planned_at(elapsed)))
    }

    /// Passive windows of every ramp, ordered by start time.
    #[must_use]
    pub fn windows(&self) -> Vec<Window> {
        let mut windows: Vec<Window> = self.ramps.iter().flat_map(Ramp::windows).collect();
        windows.sort_by_key(|window| window.start);
        windows
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    name: String,
    navigations: BTreeMap<String, NavigationPlan>,
}

impl Scenario {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            navigations: BTreeMap::new(),
        }
    }

    /// Adds a navigation; names are unique within a scenario.
    ///
    /// # Errors
    ///
    /// Returns an error when the name is taken or the navigation has no ramps.
    pub fn add_navigation(&mut self, plan: NavigationPlan) -> Result<(), ConfigError> {
        if plan.ramps.is_empty() {
            return Err(ConfigError::NavigationWithoutRamps {
                navigation: plan.name,
            });
        }
        if self.navigations.contains_key(&plan.name) {
            return Err(ConfigError::DuplicateNavigation { name: plan.name });
        }
        self.navigations.insert(plan.name.clone(), plan);
        Ok(())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn navigations(&self) -> impl Iterator<Item = &NavigationPlan> {
        self.navigations.values()
    }

    #[must_use]
    pub fn navigation(&self, name: &str) -> Option<&NavigationPlan> {
        self.navigations.get(name)
    }

    /// Longest ramp across every navigation.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.navigations
            .values()
            .map(NavigationPlan::duration)
            .max()
            .unwrap_or(Duration::ZERO)
    }

    #[must_use]
    pub fn max_concurrency(&self) -> u64 {
        self.navigations
            .values()
            .fold(0u64, |acc, nav| acc.saturating_add(nav.max_concurrency()))
    }

    /// Planned peckers for `navigation` at `elapsed`; unknown names plan zero.
    #[must_use]
    pub fn planned_concurrency_at(&self, navigation: &str, elapsed: Duration) -> u64 {
        self.navigations
            .get(navigation)
            .map_or(0, |nav| nav.planned_at(elapsed))
    }

    /// Scales the scenario to `round(ratio * max_concurrency())` peckers and
    /// returns that quota.
    ///
    /// Negative or non-finite ratios collapse the scenario to zero.
    #[expect(
        clippy::float_arithmetic,
        reason = "Rescale ratios are fractional by nature"
    )]
    pub fn rescale_by_ratio(&mut self, ratio: f64) -> u64 {
        let ratio = if ratio.is_finite() && ratio > 0.0 {
            ratio
        } else {
            0.0
        };
        let scaled = (self.max_concurrency() as f64 * ratio).round();
        let quota = if scaled >= u64::MAX as f64 {
            u64::MAX
        } else {
            scaled as u64
        };
        self.rescale_to_quota(quota);
        quota
    }

    /// Spreads exactly `quota` peckers over every ramp by largest remainder,
    /// weighted by the ramp's current target.
    pub fn rescale_to_quota(&mut self, quota: u64) {
        let weights: Vec<u64> = self
            .navigations
            .values()
            .flat_map(|nav| nav.ramps.iter().map(Ramp::target))
            .collect();
        let shares = partition_weighted(quota, &weights);
        for (ramp, share) in self
            .navigations
            .values_mut()
            .flat_map(|nav| nav.ramps.iter_mut())
            .zip(shares)
        {
            ramp.set_target(share);
        }
    }

    /// Rescales every ramp so the scenario peaks near `total` peckers.
    ///
    /// The ratio is clamped to `[0, max_ratio]` and returned.
    #[expect(
        clippy::float_arithmetic,
        reason = "Rescale ratios are fractional by nature"
    )]
    pub fn rescale_to(&mut self, total: u64, max_ratio: f64) -> f64 {
        let current = self.max_concurrency().max(1);
        let ratio = clamp_ratio(total as f64 / current as f64, max_ratio);
        self.rescale_by_ratio(ratio);
        ratio
    }
}

/// Clamps `ratio` into `[0, max_ratio]`, mapping NaN to zero.
#[must_use]
pub fn clamp_ratio(ratio: f64, max_ratio: f64) -> f64 {
    if ratio.is_nan() || ratio <= 0.0 {
        return 0.0;
    }
    let max_ratio = if max_ratio.is_finite() && max_ratio > 0.0 {
        max_ratio
    } else {
        0.0
    };
    ratio.min(max_ratio)
}
