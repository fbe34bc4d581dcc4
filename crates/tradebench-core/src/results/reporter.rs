use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Local;

use super::export::{export_comparison_html, export_csv, export_html, export_json};
use super::{compare_reports, ComparisonReport, RunReport, ScenarioResult};
use crate::config::RunConfig;
use crate::error::BenchError;
use crate::metrics::MetricsCollector;

pub const REPORT_JSON: &str = "report.json";
pub const REPORT_HTML: &str = "report.html";
pub const OPERATIONS_CSV: &str = "operations.csv";
pub const COMPARISON_JSON: &str = "comparison.json";
pub const COMPARISON_HTML: &str = "comparison.html";

/// Writes the artifacts of one run into its own timestamped directory.
#[derive(Debug, Clone)]
pub struct Reporter {
    run_dir: PathBuf,
}

impl Reporter {
    /// Create `<output_dir>/<YYYYmmdd_HHMMSS>` (with a numeric suffix if two
    /// runs start within the same second).
    pub async fn prepare(output_dir: impl AsRef<Path>) -> Result<Self, BenchError> {
        let output_dir = output_dir.as_ref();
        tokio::fs::create_dir_all(output_dir).await.map_err(|e| {
            BenchError::Reporting(format!("cannot create {}: {e}", output_dir.display()))
        })?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let mut candidate = output_dir.join(&stamp);
        let mut attempt = 1;
        loop {
            match tokio::fs::create_dir(&candidate).await {
                Ok(()) => break,
                Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt < 100 => {
                    candidate = output_dir.join(format!("{stamp}_{attempt}"));
                    attempt += 1;
                }
                Err(e) => {
                    return Err(BenchError::Reporting(format!(
                        "cannot create {}: {e}",
                        candidate.display()
                    )))
                }
            }
        }

        tracing::info!(dir = %candidate.display(), "prepared run directory");
        Ok(Self { run_dir: candidate })
    }

    /// Use an existing directory as is.
    pub fn in_dir(run_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
        }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Write `report.json`, `report.html` and `operations.csv`. Returns the
    /// path of `report.json`.
    pub async fn generate_report(
        &self,
        results: &BTreeMap<String, ScenarioResult>,
        metrics: &MetricsCollector,
        config: &RunConfig,
    ) -> Result<PathBuf, BenchError> {
        let report = RunReport::new(results, metrics, config);
        let json = export_json(&report)
            .map_err(|e| BenchError::Reporting(format!("cannot serialize report: {e}")))?;

        let json_path = self.write(REPORT_JSON, &json).await?;
        self.write(REPORT_HTML, &export_html(&report)).await?;
        self.write(OPERATIONS_CSV, &export_csv(&report)?).await?;

        tracing::info!(path = %json_path.display(), success = report.success, "report written");
        Ok(json_path)
    }

    /// Compare the report at `current` against a previous report (a
    /// `report.json` or the run directory holding it) and write
    /// `comparison.json` + `comparison.html`. Returns the JSON path.
    pub async fn generate_comparison_report(
        &self,
        current: &Path,
        previous: &Path,
        config: &RunConfig,
    ) -> Result<PathBuf, BenchError> {
        let current = load_report(current).await?;
        let previous = load_report(previous).await?;
        let comparison = compare_reports(&previous, &current, config.regression_threshold_pct);
        self.write_comparison(&comparison).await
    }

    async fn write_comparison(&self, comparison: &ComparisonReport) -> Result<PathBuf, BenchError> {
        let json = serde_json::to_string_pretty(comparison)
            .map_err(|e| BenchError::Reporting(format!("cannot serialize comparison: {e}")))?;
        let json_path = self.write(COMPARISON_JSON, &json).await?;
        self.write(COMPARISON_HTML, &export_comparison_html(comparison))
            .await?;

        if comparison.regressions > 0 {
            tracing::warn!(
                regressions = comparison.regressions,
                threshold_pct = comparison.threshold_pct,
                "latency regressions detected"
            );
        }
        tracing::info!(path = %json_path.display(), "comparison written");
        Ok(json_path)
    }

    async fn write(&self, name: &str, contents: &str) -> Result<PathBuf, BenchError> {
        let path = self.run_dir.join(name);
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| BenchError::Reporting(format!("cannot write {}: {e}", path.display())))?;
        Ok(path)
    }
}

/// Read a `report.json`. A directory is taken to be a run directory.
pub async fn load_report(path: impl AsRef<Path>) -> Result<RunReport, BenchError> {
    let path = path.as_ref();
    let file = if tokio::fs::metadata(path).await.is_ok_and(|m| m.is_dir()) {
        path.join(REPORT_JSON)
    } else {
        path.to_path_buf()
    };
    let content = tokio::fs::read_to_string(&file)
        .await
        .map_err(|e| BenchError::Reporting(format!("cannot read {}: {e}", file.display())))?;
    serde_json::from_str(&content)
        .map_err(|e| BenchError::Reporting(format!("invalid report {}: {e}", file.display())))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::engine::ScenarioState;
    use crate::results::ComparisonStatus;

    fn results_with(metrics: &MetricsCollector, ops: &[&str]) -> BTreeMap<String, ScenarioResult> {
        for (i, op) in ops.iter().enumerate() {
            metrics.record_timing("order_processing", op, Duration::from_millis(10 + i as u64));
        }
        BTreeMap::from([(
            "order_processing".to_string(),
            ScenarioResult {
                name: "order_processing".to_string(),
                success: true,
                state: ScenarioState::CleanedUp,
                execution_time_ms: 5.0,
                metrics: metrics.get_metrics_for_scenario("order_processing"),
                error: None,
            },
        )])
    }

    #[tokio::test]
    async fn prepare_creates_distinct_directories() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let a = Reporter::prepare(tmp.path()).await.expect("prepare");
        let b = Reporter::prepare(tmp.path()).await.expect("prepare");
        assert!(a.run_dir().is_dir());
        assert!(b.run_dir().is_dir());
        assert_ne!(a.run_dir(), b.run_dir());
    }

    #[tokio::test]
    async fn generate_report_writes_all_artifacts() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let reporter = Reporter::prepare(tmp.path().join("reports")).await.expect("prepare");
        let metrics = MetricsCollector::new();
        let results = results_with(&metrics, &["get_quote"]);

        let path = reporter
            .generate_report(&results, &metrics, &RunConfig::default())
            .await
            .expect("report should be written");

        assert_eq!(path, reporter.run_dir().join(REPORT_JSON));
        assert!(reporter.run_dir().join(REPORT_HTML).is_file());
        assert!(reporter.run_dir().join(OPERATIONS_CSV).is_file());
        let loaded = load_report(&path).await.expect("report should load");
        assert!(loaded.success);
        assert_eq!(loaded.scenarios["order_processing"].metrics["get_quote"].count, 1);
    }

    #[tokio::test]
    async fn comparison_accepts_run_directory() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let config = RunConfig::default();

        let old_metrics = MetricsCollector::new();
        let first = Reporter::prepare(tmp.path()).await.expect("prepare");
        first
            .generate_report(&results_with(&old_metrics, &["get_quote"]), &old_metrics, &config)
            .await
            .expect("first report");

        let new_metrics = MetricsCollector::new();
        let second = Reporter::prepare(tmp.path()).await.expect("prepare");
        let current = second
            .generate_report(
                &results_with(&new_metrics, &["get_quote", "cancel_order"]),
                &new_metrics,
                &config,
            )
            .await
            .expect("second report");

        let cmp_path = second
            .generate_comparison_report(&current, first.run_dir(), &config)
            .await
            .expect("comparison should be written");
        assert!(second.run_dir().join(COMPARISON_HTML).is_file());

        let raw = std::fs::read_to_string(cmp_path).expect("read comparison");
        let cmp: ComparisonReport = serde_json::from_str(&raw).expect("valid comparison");
        let added = cmp
            .entries
            .iter()
            .find(|e| e.operation == "cancel_order")
            .expect("new entry");
        assert_eq!(added.status, ComparisonStatus::New);
    }

    #[tokio::test]
    async fn missing_previous_report_is_a_reporting_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let reporter = Reporter::in_dir(tmp.path());
        let metrics = MetricsCollector::new();
        let current = reporter
            .generate_report(&BTreeMap::new(), &metrics, &RunConfig::default())
            .await
            .expect("report");
        let result = reporter
            .generate_comparison_report(&current, &tmp.path().join("nope"), &RunConfig::default())
            .await;
        assert!(matches!(result, Err(BenchError::Reporting(_))));
    }
}
