//! Mapping from category and scenario names to scenario factories.

use std::fmt;
use std::sync::Arc;

use crate::config::ALL_CATEGORIES;
use crate::error::BenchError;
use crate::scenario::{Scenario, ScenarioContext};
use crate::scenarios::{
    OrderMixTest, OrderProcessingLoadTest, OrderProcessingTest, VoiceCommandAccuracyTest,
    VoiceCommandProcessingTest,
};

pub type ScenarioFactory = Arc<dyn Fn(ScenarioContext) -> Box<dyn Scenario> + Send + Sync>;

#[derive(Clone)]
pub struct RegistryEntry {
    category: String,
    name: String,
    description: String,
    factory: ScenarioFactory,
}

impl RegistryEntry {
    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn build(&self, ctx: ScenarioContext) -> Box<dyn Scenario> {
        (self.factory)(ctx)
    }
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("category", &self.category)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Registered scenarios, kept in registration order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<RegistryEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The scenarios shipped with the harness.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(
            "order_processing",
            OrderProcessingTest::NAME,
            "quote, place and track single orders",
            |ctx| Box::new(OrderProcessingTest::new(ctx)),
        );
        registry.register(
            "order_mix",
            OrderMixTest::NAME,
            "weighted mix of order, position and market data calls",
            |ctx| Box::new(OrderMixTest::new(ctx)),
        );
        registry.register(
            "scalability",
            OrderProcessingLoadTest::NAME,
            "concurrent virtual users placing market orders",
            |ctx| Box::new(OrderProcessingLoadTest::new(ctx)),
        );
        registry.register(
            "voice_commands",
            VoiceCommandProcessingTest::NAME,
            "speech recognition and command parsing latency",
            |ctx| Box::new(VoiceCommandProcessingTest::new(ctx)),
        );
        registry.register(
            "voice_accuracy",
            VoiceCommandAccuracyTest::NAME,
            "recognition and parsing accuracy per speech engine",
            |ctx| Box::new(VoiceCommandAccuracyTest::new(ctx)),
        );
        registry
    }

    /// Add a scenario under `category`. A scenario already registered under
    /// `name` is replaced in place.
    pub fn register<F>(&mut self, category: &str, name: &str, description: &str, factory: F)
    where
        F: Fn(ScenarioContext) -> Box<dyn Scenario> + Send + Sync + 'static,
    {
        let entry = RegistryEntry {
            category: category.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            factory: Arc::new(factory),
        };
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(existing) => {
                tracing::debug!(scenario = name, "replacing registered scenario");
                *existing = entry;
            }
            None => self.entries.push(entry),
        }
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    /// Category names in first-registration order.
    pub fn categories(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if !seen.contains(&entry.category.as_str()) {
                seen.push(&entry.category);
            }
        }
        seen
    }

    /// Expand `selector` into the scenarios to run.
    ///
    /// `"all"` selects everything; otherwise the selector is matched against
    /// categories, then against scenario names.
    pub fn resolve(&self, selector: &str) -> Result<Vec<&RegistryEntry>, BenchError> {
        if selector == ALL_CATEGORIES {
            return Ok(self.entries.iter().collect());
        }
        let by_category: Vec<&RegistryEntry> =
            self.entries.iter().filter(|e| e.category == selector).collect();
        if !by_category.is_empty() {
            return Ok(by_category);
        }
        if let Some(entry) = self.entries.iter().find(|e| e.name == selector) {
            return Ok(vec![entry]);
        }
        Err(BenchError::Config(format!(
            "unknown category '{selector}' (expected one of: {}, {ALL_CATEGORIES})",
            self.categories().join(", ")
        )))
    }
}
