pub mod data_source;
pub mod sampler;

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::RunConfig;
use crate::error::BenchError;
use crate::metrics::{MetricsCollector, Timing};
use crate::services::Services;

pub use data_source::{LabeledSample, VoiceDataSource, VoiceSample};
pub use sampler::WeightedSampler;

/// Counter suffix incremented once per failed iteration.
pub const ITERATION_ERRORS: &str = "iteration_errors";

/// One workload with a `setup → execute → cleanup` lifecycle.
///
/// The runner calls each method at most once, in order, and always calls
/// `cleanup` once `setup` has been attempted, even when `setup` or `execute`
/// failed or panicked.
#[async_trait]
pub trait Scenario: Send {
    fn name(&self) -> &str;

    /// Acquire service handles and fixtures.
    async fn setup(&mut self) -> Result<(), BenchError>;

    /// Run the workload. `Ok(false)` marks the scenario as failed without an
    /// error message.
    async fn execute(&mut self) -> Result<bool, BenchError>;

    /// Release whatever `setup`/`execute` acquired. Failures are logged by
    /// the runner and never change the scenario outcome.
    async fn cleanup(&mut self) -> Result<(), BenchError>;
}

// ---------------------------------------------------------------------------
// ScenarioContext
// ---------------------------------------------------------------------------

/// Everything a scenario is built from: its name, the run's metrics
/// collector and configuration, the collaborator services and a seed.
#[derive(Clone)]
pub struct ScenarioContext {
    name: Arc<str>,
    metrics: Arc<MetricsCollector>,
    config: Arc<RunConfig>,
    services: Services,
    seed: u64,
}

impl ScenarioContext {
    pub fn new(
        name: impl Into<Arc<str>>,
        metrics: Arc<MetricsCollector>,
        config: Arc<RunConfig>,
        services: Services,
        seed: u64,
    ) -> Self {
        Self {
            name: name.into(),
            metrics,
            config,
            services,
            seed,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// A fresh generator seeded from the scenario seed plus `stream`, so
    /// independent consumers (e.g. virtual users) get distinct sequences.
    pub fn rng(&self, stream: u64) -> StdRng {
        StdRng::seed_from_u64(self.seed.wrapping_add(stream))
    }

    /// Start timing `operation`; the sample is recorded when the guard drops.
    pub fn measure(&self, operation: impl Into<String>) -> Timing {
        Timing::start(Arc::clone(&self.metrics), Arc::clone(&self.name), operation)
    }

    /// Await `fut` while timing it as `operation`.
    pub async fn time<F, T>(&self, operation: impl Into<String>, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let _timing = self.measure(operation);
        fut.await
    }

    /// Log a failed iteration and bump `<scenario>.iteration_errors`.
    pub fn iteration_failed(&self, iteration: u64, err: &dyn Display) {
        tracing::warn!(scenario = %self.name, iteration, "iteration failed: {err}");
        self.metrics
            .increment_counter(&self.counter_name(ITERATION_ERRORS), 1);
    }

    /// Run-global counter name scoped to this scenario.
    pub fn counter_name(&self, suffix: &str) -> String {
        format!("{}.{suffix}", self.name)
    }
}
