//! Report aggregation and rendering.
//!
//! The collector is the only state shared across workers: a mutex-guarded
//! append that neither loses nor duplicates outcomes. Rendering consumes the
//! finalized [`types::RunReport`] public fields only.

pub mod html;
pub mod json;
pub mod junit;
pub mod types;

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::runner::state::Outcome;
use crate::session::BrowserKind;
use types::{RunReport, ScenarioReport, Totals};

/// Run-level metadata handed to `finalize`.
#[derive(Debug, Clone)]
pub struct RunMeta {
    pub run_id: String,
    pub browser: BrowserKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cancelled: bool,
}

/// Thread-safe outcome accumulator.
#[derive(Clone, Default)]
pub struct ReportCollector {
    outcomes: Arc<Mutex<Vec<Outcome>>>,
}

impl ReportCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one terminal outcome. Safe to call from any number of workers.
    pub fn record(&self, outcome: Outcome) {
        self.outcomes.lock().unwrap().push(outcome);
    }

    pub fn recorded(&self) -> usize {
        self.outcomes.lock().unwrap().len()
    }

    /// Build the immutable report. Called once, after every unit is
    /// terminal; units may have completed in any order, the per-scenario
    /// lists are re-sorted into original data-row order here.
    pub fn finalize(&self, meta: RunMeta, scenario_names: &[String]) -> RunReport {
        let outcomes = self.outcomes.lock().unwrap();
        let totals = Totals::count(&outcomes);

        let mut scenarios: Vec<ScenarioReport> = scenario_names
            .iter()
            .map(|name| ScenarioReport {
                name: name.clone(),
                outcomes: Vec::new(),
            })
            .collect();
        for outcome in outcomes.iter() {
            if let Some(entry) = scenarios.get_mut(outcome.scenario_index) {
                entry.outcomes.push(outcome.clone());
            }
        }
        for entry in &mut scenarios {
            entry.outcomes.sort_by_key(|o| o.row_index);
        }

        let duration_ms = (meta.finished_at - meta.started_at)
            .num_milliseconds()
            .max(0) as u64;

        RunReport {
            run_id: meta.run_id,
            browser: meta.browser,
            started_at: meta.started_at.to_rfc3339(),
            finished_at: meta.finished_at.to_rfc3339(),
            duration_ms,
            cancelled: meta.cancelled,
            totals,
            scenarios,
        }
    }
}

/// Write every format into the run directory.
pub fn write_all(report: &RunReport, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    json::write_report(report, dir)?;
    html::write_report(report, dir)?;
    junit::write_report(report, dir)?;
    Ok(())
}

/// Re-render a previously saved JSON report.
pub async fn generate_report(results_path: &Path, format: &str, output: Option<&Path>) -> Result<()> {
    let raw = std::fs::read_to_string(results_path)?;
    let report: RunReport = serde_json::from_str(&raw)?;

    match format {
        "json" => json::generate(&report, output).await,
        "html" => html::generate(&report, output).await,
        "junit" => junit::generate(&report, output).await,
        _ => anyhow::bail!("unknown report format: {}", format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::TestDataRow;
    use crate::runner::state::TestUnit;

    fn unit(scenario_index: usize, name: &str, row: usize) -> TestUnit {
        TestUnit {
            scenario_index,
            scenario_name: name.into(),
            row: TestDataRow::for_tests(row, &[]),
        }
    }

    fn meta() -> RunMeta {
        let started_at = Utc::now();
        RunMeta {
            run_id: "run-1".into(),
            browser: BrowserKind::Chrome,
            started_at,
            finished_at: started_at + chrono::Duration::milliseconds(1500),
            cancelled: false,
        }
    }

    #[tokio::test]
    async fn concurrent_recording_neither_loses_nor_duplicates() {
        let collector = ReportCollector::new();
        let mut handles = Vec::new();
        for worker in 0..8 {
            let collector = collector.clone();
            handles.push(tokio::spawn(async move {
                for row in 1..=25 {
                    collector.record(Outcome::passed(&unit(0, "s", worker * 25 + row), 1, 1));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(collector.recorded(), 200);
        let report = collector.finalize(meta(), &["s".to_string()]);
        assert_eq!(report.totals.total, 200);
        assert_eq!(report.scenarios[0].outcomes.len(), 200);
    }

    #[test]
    fn finalize_totals_match_recorded_outcomes() {
        let collector = ReportCollector::new();
        collector.record(Outcome::passed(&unit(0, "a", 1), 1, 10));
        collector.record(Outcome::failed(&unit(0, "a", 2), "boom".into(), 1, 10));
        collector.record(Outcome::skipped(&unit(1, "b", 1), "cancelled".into()));

        let report = collector.finalize(meta(), &["a".to_string(), "b".to_string()]);
        assert_eq!(report.totals.total, 3);
        assert_eq!(report.totals.passed, 1);
        assert_eq!(report.totals.failed, 1);
        assert_eq!(report.totals.skipped, 1);
        assert_eq!(report.scenarios.len(), 2);
        assert_eq!(report.duration_ms, 1500);
        assert!(!report.exit_success());
    }

    #[test]
    fn report_round_trips_through_json() {
        let collector = ReportCollector::new();
        collector.record(Outcome::passed(&unit(0, "a", 1), 1, 10));
        let report = collector.finalize(meta(), &["a".to_string()]);

        let encoded = serde_json::to_string(&report).unwrap();
        let decoded: RunReport = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.run_id, report.run_id);
        assert_eq!(decoded.totals, report.totals);
    }
}
