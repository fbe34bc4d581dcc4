use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use tradebench_core::engine::ScenarioState;
use tradebench_core::results::{ComparisonReport, ComparisonStatus, ScenarioResult};
use tradebench_core::{MetricsCollector, Reporter, RunConfig, Runner, Services};

fn result_for(metrics: &MetricsCollector, scenario: &str) -> ScenarioResult {
    ScenarioResult {
        name: scenario.to_string(),
        success: true,
        state: ScenarioState::CleanedUp,
        execution_time_ms: 1.0,
        metrics: metrics.get_metrics_for_scenario(scenario),
        error: None,
    }
}

async fn write_run(
    output: &Path,
    samples: &[(&str, &[u64])],
    config: &RunConfig,
) -> (Reporter, std::path::PathBuf) {
    let metrics = MetricsCollector::new();
    for (op, millis) in samples {
        for ms in *millis {
            metrics.record_timing("OrderMixTest", op, Duration::from_millis(*ms));
        }
    }
    let results = BTreeMap::from([(
        "OrderMixTest".to_string(),
        result_for(&metrics, "OrderMixTest"),
    )]);
    let reporter = Reporter::prepare(output).await.expect("prepare run dir");
    let path = reporter
        .generate_report(&results, &metrics, config)
        .await
        .expect("report should be written");
    (reporter, path)
}

#[tokio::test]
async fn comparison_uses_percent_of_previous_and_marks_new_operations() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = RunConfig::default();

    let (baseline, _) = write_run(tmp.path(), &[("get_quote", &[100, 100][..])], &config).await;
    let (current, report) = write_run(
        tmp.path(),
        &[("get_quote", &[150, 150][..]), ("get_positions", &[20][..])],
        &config,
    )
    .await;

    let path = current
        .generate_comparison_report(&report, baseline.run_dir(), &config)
        .await
        .expect("comparison should be written");
    let raw = std::fs::read_to_string(path).expect("read comparison");
    let comparison: ComparisonReport = serde_json::from_str(&raw).expect("valid comparison json");

    let quote = comparison
        .entries
        .iter()
        .find(|e| e.operation == "get_quote")
        .expect("get_quote compared");
    assert_eq!(quote.status, ComparisonStatus::Compared);
    let mean = quote
        .stats
        .iter()
        .find(|s| s.stat == "mean_ms")
        .expect("mean delta");
    let pct = mean.percent_change.expect("previous is non-zero");
    assert!((pct - 50.0).abs() < 1.0, "expected ~50%, got {pct}");
    assert!(mean.regression);

    let positions = comparison
        .entries
        .iter()
        .find(|e| e.operation == "get_positions")
        .expect("new operation listed");
    assert_eq!(positions.status, ComparisonStatus::New);
    assert!(positions.stats.is_empty());
    assert_eq!(comparison.regressions, 1);
}

#[tokio::test]
async fn full_run_produces_report_artifacts() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut config = RunConfig {
        category: "order_mix".to_string(),
        output_dir: tmp.path().to_path_buf(),
        seed: Some(2),
        ..RunConfig::default()
    };
    config.options.iterations = Some(12);

    let runner = Runner::new(config, Services::simulated(2).expect("sim"));
    let outcome = runner.run().await.expect("run should complete");
    assert!(outcome.success());

    let reporter = Reporter::prepare(&runner.config().output_dir)
        .await
        .expect("prepare run dir");
    let path = reporter
        .generate_report(&outcome.results, &outcome.metrics, runner.config())
        .await
        .expect("report should be written");

    let report = tradebench_core::results::load_report(&path)
        .await
        .expect("report should load");
    assert!(report.success);
    assert_eq!(report.config.seed, Some(2));
    assert!(report.scenarios["OrderMixTest"].metrics.contains_key("check_account"));

    let csv = std::fs::read_to_string(reporter.run_dir().join("operations.csv")).expect("csv");
    assert!(csv.lines().next().is_some_and(|h| h.starts_with("scenario,operation")));
    let html = std::fs::read_to_string(reporter.run_dir().join("report.html")).expect("html");
    assert!(html.contains("OrderMixTest"));
}
