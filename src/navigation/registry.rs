use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::scenario::{NavigationPlan, Scenario};

use super::Navigation;
use super::builtins::{HttpNavigation, ThinkNavigation};

/// Builds one navigation instance per worker from its plan.
pub type NavigationFactory =
    Arc<dyn Fn(&NavigationPlan) -> Result<Box<dyn Navigation>, ConfigError> + Send + Sync>;

/// Named navigation factories linked into the binary; scenarios refer to
/// them through each navigation's `kind`.
#[derive(Clone, Default)]
pub struct Registry {
    factories: BTreeMap<String, NavigationFactory>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("kinds", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the `http` and `think` navigations.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(HttpNavigation::KIND, |plan| {
            Ok(Box::new(HttpNavigation::from_plan(plan)?))
        });
        registry.register(ThinkNavigation::KIND, |plan| {
            Ok(Box::new(ThinkNavigation::from_plan(plan)?))
        });
        registry
    }

    /// Adds or replaces the factory for `kind`.
    pub fn register<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&NavigationPlan) -> Result<Box<dyn Navigation>, ConfigError> + Send + Sync + 'static,
    {
        self.factories.insert(kind.to_owned(), Arc::new(factory));
    }

    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Builds a fresh navigation for one worker.
    ///
    /// # Errors
    ///
    /// Returns an error when the kind is unknown or the factory rejects the
    /// plan's options.
    pub fn build(&self, plan: &NavigationPlan) -> Result<Box<dyn Navigation>, ConfigError> {
        let factory = self
            .factories
            .get(&plan.kind)
            .ok_or_else(|| ConfigError::UnknownNavigationKind {
                navigation: plan.name.clone(),
                kind: plan.kind.clone(),
            })?;
        factory(plan)
    }

    /// Builds every navigation once so bad kinds and options fail before
    /// any worker starts.
    ///
    /// # Errors
    ///
    /// Returns the first build error.
    pub fn validate(&self, scenario: &Scenario) -> Result<(), ConfigError> {
        for plan in scenario.navigations() {
            self.build(plan)?;
        }
        Ok(())
    }
}
