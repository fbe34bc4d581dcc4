use std::io::Write;

use tradebench_core::config::read_config;
use tradebench_core::results::ScenarioResult;
use tradebench_core::{BenchError, Registry, Reporter, RunConfig, RunOutcome, Runner, Services};

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;

/// Error that stops `run` before any scenario executed.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("{0}")]
    InvalidInput(BenchError),

    #[error("cannot start simulated services: {0}")]
    Services(String),
}

impl RunError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidInput(_) => ExitCode::InvalidInput,
            Self::Services(_) => ExitCode::ScenarioFailures,
        }
    }
}

/// Build the effective configuration: the `--config` file (or defaults)
/// with the given flags on top.
pub async fn effective_config(args: &RunArgs) -> Result<RunConfig, BenchError> {
    let mut config = match &args.config {
        Some(path) => read_config(path).await?,
        None => RunConfig::default(),
    };
    args.apply_to(&mut config);
    Ok(config)
}

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let mut config = effective_config(&args)
        .await
        .map_err(RunError::InvalidInput)?;
    let seed = config.resolve_seed();
    let services = Services::simulated(seed).map_err(|e| RunError::Services(e.to_string()))?;

    let runner = Runner::new(config, services);
    let outcome = runner.run().await.map_err(|e| {
        if e.is_fatal() {
            RunError::InvalidInput(e)
        } else {
            RunError::Services(e.to_string())
        }
    })?;
    let config = runner.config();

    print_summary(&outcome);
    let reporting_ok = match write_reports(&outcome, config).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("{e}");
            false
        }
    };
    Ok(ExitCode::from_run(outcome.success(), reporting_ok))
}

async fn write_reports(outcome: &RunOutcome, config: &RunConfig) -> Result<(), BenchError> {
    let reporter = Reporter::prepare(&config.output_dir).await?;
    let report = reporter
        .generate_report(&outcome.results, &outcome.metrics, config)
        .await?;
    println!("Report: {}", report.display());

    if let Some(previous) = &config.compare_with {
        let comparison = reporter
            .generate_comparison_report(&report, previous, config)
            .await?;
        println!("Comparison: {}", comparison.display());
    }
    Ok(())
}

fn print_summary(outcome: &RunOutcome) {
    let mut out = std::io::stdout().lock();
    let _ = writeln!(out, "Seed: {}", outcome.seed);
    for result in outcome.results.values() {
        let _ = writeln!(out, "{}", summary_line(result));
    }
    let passed = outcome.results.values().filter(|r| r.success).count();
    let _ = writeln!(out, "{passed}/{} scenarios passed", outcome.results.len());
}

fn summary_line(result: &ScenarioResult) -> String {
    let status = if result.success { "PASS" } else { "FAIL" };
    let samples: u64 = result.metrics.values().map(|s| s.count).sum();
    let mut line = format!(
        "[{status}] {:<28} {:>10.1} ms  {samples} samples",
        result.name, result.execution_time_ms
    );
    if let Some(error) = &result.error {
        line.push_str("  ");
        line.push_str(error);
    }
    line
}

/// Print every registered scenario grouped by category.
pub fn list(registry: &Registry) {
    let mut out = std::io::stdout().lock();
    for category in registry.categories() {
        let _ = writeln!(out, "{category}");
        for entry in registry.entries().iter().filter(|e| e.category() == category) {
            let _ = writeln!(out, "  {:<28} {}", entry.name(), entry.description());
        }
    }
}
