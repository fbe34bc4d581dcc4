pub mod stats;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub use stats::{percentile, TimingStats, STAT_NAMES};

// ---------------------------------------------------------------------------
// MetricsCollector
// ---------------------------------------------------------------------------

type SampleBuckets = HashMap<String, HashMap<String, Vec<Duration>>>;

/// Run-scoped store of timing samples, gauges and counters.
///
/// Shared as an `Arc<MetricsCollector>` between the runner, every scenario
/// and every virtual user. All methods take `&self`; writers from concurrent
/// tasks serialize on internal locks, so no sample is dropped.
///
/// Timing samples are keyed by `(scenario, operation)`. Gauges and counters
/// are global to the run.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    timings: Mutex<SampleBuckets>,
    gauges: Mutex<BTreeMap<String, f64>>,
    counters: Mutex<BTreeMap<String, i64>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one duration sample, creating the bucket on first use.
    pub fn record_timing(&self, scenario: &str, operation: &str, duration: Duration) {
        let mut timings = self.timings.lock();
        timings
            .entry(scenario.to_string())
            .or_default()
            .entry(operation.to_string())
            .or_default()
            .push(duration);
    }

    /// Set a gauge; the last write wins.
    pub fn set_gauge(&self, name: &str, value: f64) {
        self.gauges.lock().insert(name.to_string(), value);
    }

    /// Add `delta` to a counter, starting from zero.
    pub fn increment_counter(&self, name: &str, delta: i64) {
        *self.counters.lock().entry(name.to_string()).or_insert(0) += delta;
    }

    /// Compute per-operation statistics for `scenario`.
    ///
    /// Returns an empty map when the scenario recorded nothing.
    pub fn get_metrics_for_scenario(&self, scenario: &str) -> BTreeMap<String, TimingStats> {
        // Clone under the lock, sort and reduce outside it.
        let buckets = match self.timings.lock().get(scenario) {
            Some(ops) => ops.clone(),
            None => return BTreeMap::new(),
        };
        buckets
            .into_iter()
            .filter_map(|(op, samples)| TimingStats::from_samples(&samples).map(|s| (op, s)))
            .collect()
    }

    /// Number of samples recorded for one operation.
    pub fn sample_count(&self, scenario: &str, operation: &str) -> usize {
        self.timings
            .lock()
            .get(scenario)
            .and_then(|ops| ops.get(operation))
            .map_or(0, Vec::len)
    }

    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.gauges.lock().get(name).copied()
    }

    pub fn counter(&self, name: &str) -> i64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }

    pub fn gauges(&self) -> BTreeMap<String, f64> {
        self.gauges.lock().clone()
    }

    pub fn counters(&self) -> BTreeMap<String, i64> {
        self.counters.lock().clone()
    }
}

// ---------------------------------------------------------------------------
// Timing: scoped measurement guard
// ---------------------------------------------------------------------------

/// Measures one operation from creation until drop.
///
/// The sample is recorded in `Drop`, so it is kept on every exit path: normal
/// completion, early return through `?`, panic unwinding, or cancellation of
/// the enclosing future.
#[must_use = "the operation is timed until this guard is dropped"]
pub struct Timing {
    metrics: Arc<MetricsCollector>,
    scenario: Arc<str>,
    operation: String,
    start: Instant,
}

impl Timing {
    pub fn start(metrics: Arc<MetricsCollector>, scenario: Arc<str>, operation: impl Into<String>) -> Self {
        Self {
            metrics,
            scenario,
            operation: operation.into(),
            start: Instant::now(),
        }
    }
}

impl Drop for Timing {
    fn drop(&mut self) {
        self.metrics
            .record_timing(&self.scenario, &self.operation, self.start.elapsed());
    }
}
