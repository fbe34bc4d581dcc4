use chrono::SecondsFormat;

use super::{ComparisonReport, ComparisonStatus, RunReport, StatDelta};
use crate::error::BenchError;
use crate::metrics::STAT_NAMES;

// ---------------------------------------------------------------------------
// CSV export
// ---------------------------------------------------------------------------

/// One row per `(scenario, operation)` with every timing statistic.
pub fn export_csv(report: &RunReport) -> Result<String, BenchError> {
    let csv_err = |e: csv::Error| BenchError::Reporting(format!("CSV export failed: {e}"));

    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut header = vec!["scenario", "operation"];
    header.extend(STAT_NAMES);
    writer.write_record(&header).map_err(csv_err)?;

    for (scenario, result) in &report.scenarios {
        for (operation, stats) in &result.metrics {
            let mut row = vec![scenario.clone(), operation.clone()];
            row.extend(
                STAT_NAMES
                    .iter()
                    .map(|stat| stats.get(stat).map(format_stat).unwrap_or_default()),
            );
            writer.write_record(&row).map_err(csv_err)?;
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| BenchError::Reporting(format!("CSV export failed: {e}")))?;
    String::from_utf8(bytes).map_err(|e| BenchError::Reporting(format!("CSV export failed: {e}")))
}

fn format_stat(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{v:.0}")
    } else {
        format!("{v:.3}")
    }
}

// ---------------------------------------------------------------------------
// JSON export
// ---------------------------------------------------------------------------

pub fn export_json(report: &RunReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

// ---------------------------------------------------------------------------
// HTML export
// ---------------------------------------------------------------------------

const STYLE: &str = r#"
  *, *::before, *::after { box-sizing: border-box; }
  body {
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
    margin: 0; padding: 2rem; background: #111827; color: #e5e7eb; line-height: 1.5;
  }
  h1 { font-size: 1.6rem; margin: 0 0 0.25rem; color: #f9fafb; }
  h2 { font-size: 1rem; text-transform: uppercase; letter-spacing: 0.05em; color: #9ca3af;
       margin: 2rem 0 0.75rem; border-bottom: 1px solid #1f2937; padding-bottom: 0.4rem; }
  h3 { font-size: 0.95rem; color: #d1d5db; margin: 1.25rem 0 0.5rem; }
  .meta { color: #6b7280; font-size: 0.85rem; }
  .meta span { margin-right: 1.25rem; }
  .cards { display: grid; grid-template-columns: repeat(auto-fill, minmax(170px, 1fr)); gap: 1rem; }
  .card { background: #1f2937; border: 1px solid #374151; border-radius: 0.5rem; padding: 0.9rem 1.1rem; }
  .card .label { font-size: 0.7rem; text-transform: uppercase; color: #6b7280; }
  .card .value { font-size: 1.4rem; font-weight: 700; color: #f9fafb; }
  .good .value, td.good { color: #34d399; }
  .bad .value, td.bad { color: #f87171; }
  td.neutral { color: #9ca3af; }
  table { width: 100%; border-collapse: collapse; font-size: 0.8rem; background: #1f2937;
          margin-bottom: 1.5rem; }
  th { text-align: left; padding: 0.5rem 0.75rem; color: #9ca3af; font-size: 0.7rem;
       text-transform: uppercase; background: #111827; }
  td { padding: 0.45rem 0.75rem; border-top: 1px solid #374151; color: #d1d5db; }
  td.num { text-align: right; font-variant-numeric: tabular-nums; }
  tr.failed td { border-left: 3px solid #f87171; }
  tr.regression td { background: #3b1d1d; }
  footer { margin-top: 2.5rem; color: #4b5563; font-size: 0.8rem; }
"#;

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n\
         <title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n{body}\n</body>\n</html>\n",
        title = html_escape(title),
    )
}

/// Standalone HTML rendering of a run report.
pub fn export_html(report: &RunReport) -> String {
    let generated = report
        .generated_at
        .to_rfc3339_opts(SecondsFormat::Secs, true);
    let total = report.scenarios.len();
    let passed = report.scenarios.values().filter(|r| r.success).count();
    let samples: u64 = report
        .scenarios
        .values()
        .flat_map(|r| r.metrics.values())
        .map(|s| s.count)
        .sum();

    let mut body = format!(
        "<h1>tradebench report</h1>\n<div class=\"meta\"><span>Generated: {generated}</span>\
         <span>Category: {category}</span><span>Users: {users}</span>\
         <span>Run ID: {run_id}</span></div>\n",
        category = html_escape(&report.config.category),
        users = report.config.users,
        run_id = report.run_id.hyphenated(),
    );

    body.push_str("<h2>Summary</h2>\n<div class=\"cards\">\n");
    body.push_str(&card("Scenarios", &total.to_string(), ""));
    body.push_str(&card("Passed", &passed.to_string(), if passed == total { "good" } else { "" }));
    body.push_str(&card(
        "Failed",
        &(total - passed).to_string(),
        if passed == total { "good" } else { "bad" },
    ));
    body.push_str(&card("Timing samples", &samples.to_string(), ""));
    body.push_str("</div>\n");

    body.push_str(
        "<h2>Scenarios</h2>\n<table>\n<thead><tr><th>Scenario</th><th>Result</th><th>State</th>\
         <th>Execution (ms)</th><th>Error</th></tr></thead>\n<tbody>\n",
    );
    for r in report.scenarios.values() {
        body.push_str(&format!(
            "<tr class=\"{row}\"><td>{name}</td><td class=\"{cls}\">{verdict}</td><td>{state}</td>\
             <td class=\"num\">{ms:.1}</td><td>{error}</td></tr>\n",
            row = if r.success { "" } else { "failed" },
            name = html_escape(&r.name),
            cls = if r.success { "good" } else { "bad" },
            verdict = if r.success { "passed" } else { "failed" },
            state = r.state,
            ms = r.execution_time_ms,
            error = html_escape(r.error.as_deref().unwrap_or("")),
        ));
    }
    body.push_str("</tbody>\n</table>\n");

    body.push_str("<h2>Operations</h2>\n");
    for r in report.scenarios.values().filter(|r| !r.metrics.is_empty()) {
        body.push_str(&format!("<h3>{}</h3>\n<table>\n<thead><tr><th>Operation</th>", html_escape(&r.name)));
        for stat in STAT_NAMES {
            body.push_str(&format!("<th>{stat}</th>"));
        }
        body.push_str("</tr></thead>\n<tbody>\n");
        for (op, stats) in &r.metrics {
            body.push_str(&format!("<tr><td>{}</td>", html_escape(op)));
            for stat in STAT_NAMES {
                let v = stats.get(stat).unwrap_or_default();
                body.push_str(&format!("<td class=\"num\">{}</td>", format_stat(v)));
            }
            body.push_str("</tr>\n");
        }
        body.push_str("</tbody>\n</table>\n");
    }

    if !report.gauges.is_empty() || !report.counters.is_empty() {
        body.push_str("<h2>Gauges &amp; counters</h2>\n<table>\n<thead><tr><th>Name</th><th>Value</th></tr></thead>\n<tbody>\n");
        for (name, value) in &report.gauges {
            body.push_str(&format!(
                "<tr><td>{}</td><td class=\"num\">{value:.4}</td></tr>\n",
                html_escape(name)
            ));
        }
        for (name, value) in &report.counters {
            body.push_str(&format!(
                "<tr><td>{}</td><td class=\"num\">{value}</td></tr>\n",
                html_escape(name)
            ));
        }
        body.push_str("</tbody>\n</table>\n");
    }

    body.push_str(&format!("<footer>Generated by tradebench &bull; {generated}</footer>"));
    page("tradebench report", &body)
}

fn card(label: &str, value: &str, class: &str) -> String {
    format!(
        "<div class=\"card {class}\"><div class=\"label\">{label}</div><div class=\"value\">{value}</div></div>\n"
    )
}

pub(crate) fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// ---------------------------------------------------------------------------
// Comparison HTML export
// ---------------------------------------------------------------------------

/// Standalone HTML rendering of a comparison. Latency increases are red,
/// decreases green; regressions above the threshold get a highlighted row.
pub fn export_comparison_html(cmp: &ComparisonReport) -> String {
    let mut body = format!(
        "<h1>Comparison report</h1>\n<div class=\"meta\"><span>Baseline: {}</span>\
         <span>Current: {}</span><span>Threshold: {:.1}%</span></div>\n",
        cmp.baseline_run_id.hyphenated(),
        cmp.current_run_id.hyphenated(),
        cmp.threshold_pct,
    );

    body.push_str("<div class=\"cards\">\n");
    body.push_str(&card("Entries", &cmp.entries.len().to_string(), ""));
    body.push_str(&card(
        "Regressions",
        &cmp.regressions.to_string(),
        if cmp.regressions == 0 { "good" } else { "bad" },
    ));
    let count_status = |status: ComparisonStatus| cmp.entries.iter().filter(|e| e.status == status).count();
    body.push_str(&card("New", &count_status(ComparisonStatus::New).to_string(), ""));
    body.push_str(&card("Removed", &count_status(ComparisonStatus::Removed).to_string(), ""));
    body.push_str("</div>\n");

    body.push_str(
        "<h2>Operations</h2>\n<table>\n<thead><tr><th>Scenario</th><th>Operation</th><th>Status</th>\
         <th>Stat</th><th>Previous</th><th>Current</th><th>Delta</th><th>Change</th></tr></thead>\n<tbody>\n",
    );
    for entry in &cmp.entries {
        let scenario = html_escape(&entry.scenario);
        let operation = html_escape(&entry.operation);
        match entry.status {
            ComparisonStatus::Compared => {
                for d in &entry.stats {
                    body.push_str(&delta_row(&scenario, &operation, "compared", d, d.stat != "count"));
                }
            }
            ComparisonStatus::New | ComparisonStatus::Removed => {
                let label = if entry.status == ComparisonStatus::New { "new" } else { "removed" };
                body.push_str(&format!(
                    "<tr><td>{scenario}</td><td>{operation}</td><td>{label}</td>\
                     <td colspan=\"5\" class=\"neutral\">no counterpart in the other run</td></tr>\n"
                ));
            }
        }
    }
    body.push_str("</tbody>\n</table>\n");

    if !cmp.gauges.is_empty() {
        body.push_str(
            "<h2>Gauges</h2>\n<table>\n<thead><tr><th>Gauge</th><th>Previous</th><th>Current</th>\
             <th>Delta</th><th>Change</th></tr></thead>\n<tbody>\n",
        );
        for g in &cmp.gauges {
            body.push_str(&format!(
                "<tr><td>{}</td><td class=\"num\">{:.4}</td><td class=\"num\">{:.4}</td>\
                 <td class=\"num neutral\">{}</td><td class=\"num neutral\">{}</td></tr>\n",
                html_escape(&g.stat),
                g.previous,
                g.current,
                fmt_delta(g.delta),
                fmt_percent(g.percent_change),
            ));
        }
        body.push_str("</tbody>\n</table>\n");
    }

    body.push_str("<footer>Generated by tradebench</footer>");
    page("tradebench comparison", &body)
}

fn delta_row(scenario: &str, operation: &str, status: &str, d: &StatDelta, latency: bool) -> String {
    let class = if latency { delta_class_lower_better(d.delta) } else { "neutral" };
    format!(
        "<tr class=\"{row}\"><td>{scenario}</td><td>{operation}</td><td>{status}</td><td>{stat}</td>\
         <td class=\"num\">{prev}</td><td class=\"num\">{cur}</td>\
         <td class=\"num {class}\">{delta}</td><td class=\"num {class}\">{pct}</td></tr>\n",
        row = if d.regression { "regression" } else { "" },
        stat = d.stat,
        prev = format_stat(d.previous),
        cur = format_stat(d.current),
        delta = fmt_delta(d.delta),
        pct = fmt_percent(d.percent_change),
    )
}

fn fmt_delta(d: f64) -> String {
    if d > 0.0005 {
        format!("+{d:.3}")
    } else if d < -0.0005 {
        format!("{d:.3}")
    } else {
        "±0".to_string()
    }
}

fn fmt_percent(p: Option<f64>) -> String {
    match p {
        Some(p) if p > 0.0 => format!("+{p:.1}%"),
        Some(p) => format!("{p:.1}%"),
        None => "n/a".to_string(),
    }
}

/// Red for an increase, green for a decrease.
fn delta_class_lower_better(d: f64) -> &'static str {
    if d > 0.001 {
        "bad"
    } else if d < -0.001 {
        "good"
    } else {
        "neutral"
    }
}
