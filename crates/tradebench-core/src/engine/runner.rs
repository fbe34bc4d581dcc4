use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;

use crate::config::{validate_config, RunConfig};
use crate::engine::ScenarioState;
use crate::error::BenchError;
use crate::metrics::MetricsCollector;
use crate::registry::Registry;
use crate::results::ScenarioResult;
use crate::scenario::{Scenario, ScenarioContext};
use crate::services::Services;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Everything a run produced: one result per scenario and the metrics
/// collector they all recorded into.
pub struct RunOutcome {
    pub results: BTreeMap<String, ScenarioResult>,
    pub metrics: Arc<MetricsCollector>,
    /// Seed the scenario seeds were derived from.
    pub seed: u64,
}

impl RunOutcome {
    /// `true` iff every scenario succeeded.
    pub fn success(&self) -> bool {
        self.results.values().all(|r| r.success)
    }
}

/// Resolves the configured category and runs its scenarios one after another.
pub struct Runner {
    config: Arc<RunConfig>,
    registry: Registry,
    services: Services,
    seed: u64,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

impl Runner {
    /// A configuration without a seed gets a random one here, so
    /// [`Runner::config`] always reports the seed actually used.
    pub fn new(mut config: RunConfig, services: Services) -> Self {
        let seed = config.resolve_seed();
        Self {
            config: Arc::new(config),
            registry: Registry::builtin(),
            services,
            seed,
        }
    }

    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Validate the configuration, then run every selected scenario
    /// sequentially.
    ///
    /// Only configuration problems are returned as `Err`; scenario failures
    /// are recorded in the outcome.
    pub async fn run(&self) -> Result<RunOutcome, BenchError> {
        let violations = validate_config(&self.config);
        if !violations.is_empty() {
            let joined = violations
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(BenchError::Config(joined));
        }

        let entries = self.registry.resolve(&self.config.category)?;
        let seed = self.seed;
        let metrics = Arc::new(MetricsCollector::new());
        tracing::info!(
            category = %self.config.category,
            scenarios = entries.len(),
            seed,
            "starting run"
        );

        let mut results = BTreeMap::new();
        for (index, entry) in entries.into_iter().enumerate() {
            let ctx = ScenarioContext::new(
                entry.name(),
                Arc::clone(&metrics),
                Arc::clone(&self.config),
                self.services.clone(),
                seed.wrapping_add(index as u64),
            );
            let result = run_scenario(entry.build(ctx), &metrics).await;
            results.insert(result.name.clone(), result);
        }

        let outcome = RunOutcome {
            results,
            metrics,
            seed,
        };
        tracing::info!(success = outcome.success(), "run finished");
        Ok(outcome)
    }
}

/// Drive one scenario through `setup → execute → cleanup`.
///
/// Errors and panics from `setup` or `execute` mark the result failed.
/// `cleanup` runs exactly once on every path; its failure is only logged.
pub async fn run_scenario(
    mut scenario: Box<dyn Scenario>,
    metrics: &MetricsCollector,
) -> ScenarioResult {
    let name = scenario.name().to_string();
    let mut state = ScenarioState::Created;
    let mut error = None;
    let mut execution_time_ms = 0.0;

    tracing::info!(scenario = %name, "setting up");
    match guarded(scenario.setup()).await {
        Ok(()) => {
            state = ScenarioState::SetUp;
            tracing::info!(scenario = %name, "executing");
            let started = Instant::now();
            let executed = guarded(scenario.execute()).await;
            execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;
            match executed {
                Ok(true) => state = ScenarioState::Executed,
                Ok(false) => {
                    state = ScenarioState::Failed;
                    error = Some("scenario reported failure".to_string());
                }
                Err(message) => {
                    state = ScenarioState::Failed;
                    error = Some(message);
                }
            }
        }
        Err(message) => {
            state = ScenarioState::Failed;
            error = Some(message);
        }
    }

    tracing::info!(scenario = %name, "cleaning up");
    match guarded(scenario.cleanup()).await {
        Ok(()) if state == ScenarioState::Executed => state = ScenarioState::CleanedUp,
        Ok(()) => {}
        Err(message) => tracing::warn!(scenario = %name, "cleanup failed: {message}"),
    }

    let success = error.is_none();
    match &error {
        None => tracing::info!(scenario = %name, execution_time_ms, "scenario passed"),
        Some(message) => tracing::error!(scenario = %name, "scenario failed: {message}"),
    }

    ScenarioResult {
        metrics: metrics.get_metrics_for_scenario(&name),
        name,
        success,
        state,
        execution_time_ms,
        error,
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Await a lifecycle step, turning both errors and panics into a message.
async fn guarded<T, F>(step: F) -> Result<T, String>
where
    F: Future<Output = Result<T, BenchError>>,
{
    match AssertUnwindSafe(step).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;

    #[derive(Clone, Copy, PartialEq)]
    enum Fail {
        Nothing,
        Setup,
        Execute,
        ExecuteFalse,
        Panic,
        Cleanup,
    }

    struct Scripted {
        ctx: ScenarioContext,
        fail: Fail,
        cleanups: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Scenario for Scripted {
        fn name(&self) -> &str {
            self.ctx.name()
        }

        async fn setup(&mut self) -> Result<(), BenchError> {
            if self.fail == Fail::Setup {
                return Err(BenchError::Setup("no fixtures".into()));
            }
            Ok(())
        }

        async fn execute(&mut self) -> Result<bool, BenchError> {
            let _t = self.ctx.measure("step");
            tokio::time::sleep(Duration::from_millis(2)).await;
            match self.fail {
                Fail::Execute => Err(BenchError::Execution("exploded".into())),
                Fail::ExecuteFalse => Ok(false),
                Fail::Panic => panic!("scenario bug"),
                _ => Ok(true),
            }
        }

        async fn cleanup(&mut self) -> Result<(), BenchError> {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
            if self.fail == Fail::Cleanup {
                return Err(BenchError::Cleanup("cancel failed".into()));
            }
            Ok(())
        }
    }

    async fn run_scripted(fail: Fail) -> (ScenarioResult, usize) {
        let metrics = Arc::new(MetricsCollector::new());
        let cleanups = Arc::new(AtomicUsize::new(0));
        let ctx = ScenarioContext::new(
            "scripted",
            Arc::clone(&metrics),
            Arc::new(RunConfig::default()),
            Services::new(),
            0,
        );
        let scenario = Box::new(Scripted {
            ctx,
            fail,
            cleanups: Arc::clone(&cleanups),
        });
        let result = run_scenario(scenario, &metrics).await;
        (result, cleanups.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn successful_scenario_is_cleaned_up() {
        let (result, cleanups) = run_scripted(Fail::Nothing).await;
        assert!(result.success);
        assert_eq!(result.state, ScenarioState::CleanedUp);
        assert_eq!(cleanups, 1);
        assert!(result.execution_time_ms >= 2.0);
        assert_eq!(result.metrics["step"].count, 1);
    }

    #[tokio::test]
    async fn setup_failure_skips_execute_but_cleans_up() {
        let (result, cleanups) = run_scripted(Fail::Setup).await;
        assert!(!result.success);
        assert_eq!(result.state, ScenarioState::Failed);
        assert_eq!(cleanups, 1);
        assert!(result.metrics.is_empty());
        assert_eq!(result.error.as_deref(), Some("Setup error: no fixtures"));
    }

    #[tokio::test]
    async fn execute_error_is_recorded() {
        let (result, cleanups) = run_scripted(Fail::Execute).await;
        assert!(!result.success);
        assert_eq!(cleanups, 1);
        assert_eq!(result.error.as_deref(), Some("Execution error: exploded"));
        // The guard inside execute still recorded its sample.
        assert_eq!(result.metrics["step"].count, 1);
    }

    #[tokio::test]
    async fn execute_returning_false_fails_the_scenario() {
        let (result, cleanups) = run_scripted(Fail::ExecuteFalse).await;
        assert!(!result.success);
        assert_eq!(cleanups, 1);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn panic_in_execute_is_contained() {
        let (result, cleanups) = run_scripted(Fail::Panic).await;
        assert!(!result.success);
        assert_eq!(cleanups, 1);
        assert_eq!(result.error.as_deref(), Some("panicked: scenario bug"));
        assert_eq!(result.metrics["step"].count, 1);
    }

    #[tokio::test]
    async fn cleanup_failure_does_not_change_outcome() {
        let (result, cleanups) = run_scripted(Fail::Cleanup).await;
        assert!(result.success);
        assert_eq!(result.state, ScenarioState::Executed);
        assert_eq!(cleanups, 1);
    }

    #[tokio::test]
    async fn invalid_config_aborts_before_any_scenario() {
        let config = RunConfig {
            users: 0,
            ..RunConfig::default()
        };
        let result = Runner::new(config, Services::new()).run().await;
        assert!(matches!(result, Err(BenchError::Config(_))));
    }

    #[tokio::test]
    async fn unknown_category_is_a_config_error() {
        let config = RunConfig {
            category: "does_not_exist".to_string(),
            ..RunConfig::default()
        };
        let result = Runner::new(config, Services::new()).run().await;
        assert!(matches!(result, Err(BenchError::Config(_))));
    }

    #[tokio::test]
    async fn runner_runs_registered_scenarios_in_order() {
        let cleanups = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        for (name, fail) in [("first", Fail::Nothing), ("second", Fail::Execute)] {
            let cleanups = Arc::clone(&cleanups);
            registry.register("scripted", name, "test scenario", move |ctx| {
                Box::new(Scripted {
                    ctx,
                    fail,
                    cleanups: Arc::clone(&cleanups),
                })
            });
        }
        let config = RunConfig {
            category: "scripted".to_string(),
            seed: Some(3),
            ..RunConfig::default()
        };
        let outcome = Runner::new(config, Services::new())
            .with_registry(registry)
            .run()
            .await
            .expect("run should complete");

        assert_eq!(outcome.seed, 3);
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results["first"].success);
        assert!(!outcome.results["second"].success);
        assert!(!outcome.success());
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);
    }
}
