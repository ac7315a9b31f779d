use std::path::Path;

use anyhow::Result;

use super::types::RunReport;
use crate::runner::state::OutcomeStatus;

/// Render the report as a standalone HTML page to a file or stdout.
pub async fn generate(report: &RunReport, output: Option<&Path>) -> Result<()> {
    let html = generate_html(report);

    if let Some(path) = output {
        std::fs::write(path, html)?;
        println!("HTML report saved to: {}", path.display());
    } else {
        println!("{}", html);
    }

    Ok(())
}

/// Write `report.html` into the run directory.
pub fn write_report(report: &RunReport, output_dir: &Path) -> Result<()> {
    let path = output_dir.join("report.html");
    std::fs::write(&path, generate_html(report))?;
    log::info!("wrote HTML report: {}", path.display());
    Ok(())
}

fn generate_html(report: &RunReport) -> String {
    let totals = &report.totals;
    let pass_rate = if totals.total > 0 {
        (totals.passed as f64 / totals.total as f64 * 100.0) as u32
    } else {
        0
    };

    let mut scenarios_html = String::new();
    for scenario in &report.scenarios {
        let mut rows_html = String::new();
        for outcome in &scenario.outcomes {
            let (status_class, status_text) = match outcome.status {
                OutcomeStatus::Passed => ("passed", "PASSED"),
                OutcomeStatus::Failed => ("failed", "FAILED"),
                OutcomeStatus::Errored => ("errored", "ERRORED"),
                OutcomeStatus::Skipped => ("skipped", "SKIPPED"),
            };

            let failure_html = outcome
                .failure
                .as_ref()
                .map(|f| {
                    format!(
                        r##"<div class="error-message">[{:?}] {}</div>"##,
                        f.kind,
                        html_escape(&f.message)
                    )
                })
                .unwrap_or_default();

            let artifact_html = outcome
                .artifact
                .as_ref()
                .map(|a| format!(r##"<a class="artifact" href="{a}">screenshot</a>"##))
                .unwrap_or_default();

            rows_html.push_str(&format!(
                r##"
            <tr class="{status_class}">
                <td>row {}</td>
                <td><span class="badge {status_class}">{status_text}</span></td>
                <td>{}ms</td>
                <td>{}</td>
                <td>{failure_html}{artifact_html}</td>
            </tr>"##,
                outcome.row_index, outcome.duration_ms, outcome.attempts,
            ));
        }

        scenarios_html.push_str(&format!(
            r##"
    <section class="scenario">
        <h2>{}</h2>
        <table>
            <thead><tr><th>Data row</th><th>Status</th><th>Duration</th><th>Attempts</th><th>Detail</th></tr></thead>
            <tbody>{rows_html}
            </tbody>
        </table>
    </section>"##,
            html_escape(&scenario.name),
        ));
    }

    let cancelled_html = if report.cancelled {
        r##"<p class="cancelled">Run was cancelled before completion.</p>"##
    } else {
        ""
    };

    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>bluejay run {run_id}</title>
<style>
    body {{ font-family: -apple-system, "Segoe UI", sans-serif; margin: 2rem; color: #222; }}
    h1 {{ font-size: 1.4rem; }}
    .summary {{ display: flex; gap: 1rem; margin: 1rem 0; }}
    .tile {{ border: 1px solid #ddd; border-radius: 6px; padding: 0.8rem 1.2rem; text-align: center; }}
    .tile .num {{ font-size: 1.6rem; font-weight: 600; display: block; }}
    .tile.passed .num {{ color: #2e7d32; }}
    .tile.failed .num, .tile.errored .num {{ color: #c62828; }}
    .tile.skipped .num {{ color: #f9a825; }}
    .meta {{ color: #666; font-size: 0.85rem; }}
    .cancelled {{ color: #c62828; font-weight: 600; }}
    table {{ border-collapse: collapse; width: 100%; margin-top: 0.5rem; }}
    th, td {{ text-align: left; padding: 0.4rem 0.6rem; border-bottom: 1px solid #eee; font-size: 0.9rem; }}
    .badge {{ padding: 0.1rem 0.5rem; border-radius: 4px; font-size: 0.75rem; font-weight: 600; }}
    .badge.passed {{ background: #e8f5e9; color: #2e7d32; }}
    .badge.failed, .badge.errored {{ background: #ffebee; color: #c62828; }}
    .badge.skipped {{ background: #fff8e1; color: #f9a825; }}
    .error-message {{ color: #c62828; font-family: monospace; font-size: 0.8rem; white-space: pre-wrap; }}
    .artifact {{ font-size: 0.8rem; }}
</style>
</head>
<body>
    <h1>bluejay run report</h1>
    <p class="meta">run {run_id} &middot; {browser} &middot; started {started} &middot; {duration}ms</p>
    {cancelled_html}
    <div class="summary">
        <div class="tile"><span class="num">{total}</span>total</div>
        <div class="tile passed"><span class="num">{passed}</span>passed</div>
        <div class="tile failed"><span class="num">{failed}</span>failed</div>
        <div class="tile errored"><span class="num">{errored}</span>errored</div>
        <div class="tile skipped"><span class="num">{skipped}</span>skipped</div>
        <div class="tile"><span class="num">{pass_rate}%</span>pass rate</div>
    </div>
    {scenarios_html}
</body>
</html>
"##,
        run_id = html_escape(&report.run_id),
        browser = report.browser,
        started = html_escape(&report.started_at),
        duration = report.duration_ms,
        total = totals.total,
        passed = totals.passed,
        failed = totals.failed,
        errored = totals.errored,
        skipped = totals.skipped,
    )
}

fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::TestDataRow;
    use crate::report::types::{ScenarioReport, Totals};
    use crate::runner::state::{Outcome, TestUnit};
    use crate::session::BrowserKind;

    #[test]
    fn html_contains_summary_and_escaped_failure() {
        let unit = TestUnit {
            scenario_index: 0,
            scenario_name: "checkout".into(),
            row: TestDataRow::for_tests(2, &[]),
        };
        let failed = Outcome::failed(&unit, "expected '<b>' got ''".into(), 1, 40);
        let report = RunReport {
            run_id: "r-1".into(),
            browser: BrowserKind::Firefox,
            started_at: "2024-01-01T00:00:00Z".into(),
            finished_at: "2024-01-01T00:00:05Z".into(),
            duration_ms: 5000,
            cancelled: false,
            totals: Totals {
                total: 1,
                failed: 1,
                ..Default::default()
            },
            scenarios: vec![ScenarioReport {
                name: "checkout".into(),
                outcomes: vec![failed],
            }],
        };

        let html = generate_html(&report);
        assert!(html.contains("bluejay run report"));
        assert!(html.contains("checkout"));
        assert!(html.contains("FAILED"));
        assert!(html.contains("&lt;b&gt;"));
        assert!(!html.contains("expected '<b>'"));
    }
}
