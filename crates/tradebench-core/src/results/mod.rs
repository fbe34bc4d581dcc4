pub mod export;
pub mod reporter;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::RunConfig;
use crate::engine::ScenarioState;
use crate::metrics::{MetricsCollector, TimingStats, STAT_NAMES};

pub use reporter::{load_report, Reporter, COMPARISON_JSON, REPORT_JSON};

// ---------------------------------------------------------------------------
// ScenarioResult / RunReport
// ---------------------------------------------------------------------------

/// Outcome of one scenario, recorded by the runner once the scenario has
/// been cleaned up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub state: ScenarioState,
    /// Wall-clock time of `execute`, in milliseconds.
    pub execution_time_ms: f64,
    pub metrics: BTreeMap<String, TimingStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The persisted record of a whole run (`report.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub config: RunConfig,
    /// `true` iff every scenario succeeded.
    pub success: bool,
    pub scenarios: BTreeMap<String, ScenarioResult>,
    #[serde(default)]
    pub gauges: BTreeMap<String, f64>,
    #[serde(default)]
    pub counters: BTreeMap<String, i64>,
}

impl RunReport {
    pub fn new(
        results: &BTreeMap<String, ScenarioResult>,
        metrics: &MetricsCollector,
        config: &RunConfig,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            config: config.clone(),
            success: results.values().all(|r| r.success),
            scenarios: results.clone(),
            gauges: metrics.gauges(),
            counters: metrics.counters(),
        }
    }
}

// ---------------------------------------------------------------------------
// Comparison: delta between a previous run and the current one
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonStatus {
    /// Present in both runs.
    Compared,
    /// Only in the current run.
    New,
    /// Only in the previous run.
    Removed,
}

/// Change of one statistic between two runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StatDelta {
    pub stat: String,
    pub previous: f64,
    pub current: f64,
    /// `current - previous`.
    pub delta: f64,
    /// `(current - previous) / previous * 100`; `None` when `previous` is 0.
    pub percent_change: Option<f64>,
    pub regression: bool,
}

impl StatDelta {
    pub fn new(stat: impl Into<String>, previous: f64, current: f64) -> Self {
        let percent_change = if previous == 0.0 {
            None
        } else {
            Some((current - previous) / previous * 100.0)
        };
        Self {
            stat: stat.into(),
            previous,
            current,
            delta: current - previous,
            percent_change,
            regression: false,
        }
    }
}

/// One `(scenario, operation)` pair across two runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ComparisonEntry {
    pub scenario: String,
    pub operation: String,
    pub status: ComparisonStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<TimingStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<TimingStats>,
    /// Empty unless `status` is `Compared`.
    #[serde(default)]
    pub stats: Vec<StatDelta>,
}

impl ComparisonEntry {
    pub fn has_regression(&self) -> bool {
        self.stats.iter().any(|s| s.regression)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ComparisonReport {
    pub baseline_run_id: Uuid,
    pub current_run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub threshold_pct: f64,
    pub entries: Vec<ComparisonEntry>,
    /// Gauges present in both runs.
    #[serde(default)]
    pub gauges: Vec<StatDelta>,
    /// Number of entries with at least one latency regression.
    pub regressions: usize,
}

/// Pair every `(scenario, operation)` of `previous` and `current` and compute
/// per-statistic deltas.
///
/// Latency statistics (everything but `count`) whose increase exceeds
/// `threshold_pct` percent are flagged as regressions.
pub fn compare_reports(
    previous: &RunReport,
    current: &RunReport,
    threshold_pct: f64,
) -> ComparisonReport {
    let keys: BTreeSet<(&str, &str)> = [previous, current]
        .into_iter()
        .flat_map(|report| {
            report.scenarios.iter().flat_map(|(scenario, result)| {
                result
                    .metrics
                    .keys()
                    .map(move |op| (scenario.as_str(), op.as_str()))
            })
        })
        .collect();

    let lookup = |report: &RunReport, scenario: &str, op: &str| {
        report
            .scenarios
            .get(scenario)
            .and_then(|r| r.metrics.get(op))
            .copied()
    };

    let entries: Vec<ComparisonEntry> = keys
        .into_iter()
        .map(|(scenario, op)| {
            let old = lookup(previous, scenario, op);
            let new = lookup(current, scenario, op);
            let (status, stats) = match (old, new) {
                (Some(o), Some(n)) => (ComparisonStatus::Compared, stat_deltas(&o, &n, threshold_pct)),
                (None, _) => (ComparisonStatus::New, Vec::new()),
                (_, None) => (ComparisonStatus::Removed, Vec::new()),
            };
            ComparisonEntry {
                scenario: scenario.to_string(),
                operation: op.to_string(),
                status,
                previous: old,
                current: new,
                stats,
            }
        })
        .collect();

    let gauges = current
        .gauges
        .iter()
        .filter_map(|(name, &now)| {
            previous
                .gauges
                .get(name)
                .map(|&before| StatDelta::new(name.clone(), before, now))
        })
        .collect();

    ComparisonReport {
        baseline_run_id: previous.run_id,
        current_run_id: current.run_id,
        generated_at: Utc::now(),
        threshold_pct,
        regressions: entries.iter().filter(|e| e.has_regression()).count(),
        entries,
        gauges,
    }
}

fn stat_deltas(old: &TimingStats, new: &TimingStats, threshold_pct: f64) -> Vec<StatDelta> {
    STAT_NAMES
        .iter()
        .filter_map(|&stat| {
            let mut delta = StatDelta::new(stat, old.get(stat)?, new.get(stat)?);
            // Any rise from a zero baseline is unbounded in percent terms.
            delta.regression = stat != "count"
                && match delta.percent_change {
                    Some(pct) => pct > threshold_pct,
                    None => delta.delta > 0.0,
                };
            Some(delta)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
