//! Execution orchestrator: expands scenarios across data rows, fans the
//! resulting units out over a fixed worker pool and collects outcomes.
//!
//! Each worker owns at most one session at a time, acquired before a unit and
//! released after it regardless of outcome. Unit-scoped faults never abort
//! sibling units; only a malformed data source (before execution) or the
//! cancellation signal stop the run as a whole.

pub mod case;
pub mod events;
pub mod state;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::datasource::DataSource;
use crate::error::DataSourceError;
use crate::report::{ReportCollector, RunMeta};
use crate::scenario::Scenario;
use crate::session::{SessionConfig, SessionManager};
use case::CaseRunner;
use events::{EventEmitter, RunEvent};
use state::{FailureKind, Outcome, TestUnit};

/// Knobs for one invocation.
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Number of parallel workers; each runs a sequential
    /// acquire → run → release loop.
    pub concurrency: usize,
    /// Extra attempts granted to units that errored with a retryable kind.
    pub retry_budget: u32,
    /// Backoff between attempts.
    pub retry_delay_ms: u64,
    /// Hard per-unit budget.
    pub unit_timeout_ms: u64,
    /// Implicit element wait budget inside a unit.
    pub element_timeout_ms: u64,
    pub base_url: Option<String>,
    /// Root under which run-scoped artifact directories are created.
    pub output_dir: PathBuf,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            retry_budget: 0,
            retry_delay_ms: 1_000,
            unit_timeout_ms: 60_000,
            element_timeout_ms: 10_000,
            base_url: None,
            output_dir: PathBuf::from("output"),
        }
    }
}

pub struct Orchestrator {
    manager: SessionManager,
    session_config: SessionConfig,
    options: ExecutionOptions,
    emitter: EventEmitter,
    cancel: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(
        manager: SessionManager,
        session_config: SessionConfig,
        options: ExecutionOptions,
    ) -> Self {
        let (emitter, _) = EventEmitter::new();
        Self {
            manager,
            session_config,
            options,
            emitter,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Listen to run events (console reporting, tests).
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RunEvent> {
        self.emitter.subscribe()
    }

    /// Cooperative cancellation signal. Setting it lets in-flight units
    /// finish, starts no new units and records the rest as SKIPPED.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Run every scenario against every data row.
    ///
    /// The only error that can escape is [`DataSourceError`], raised before
    /// any session is acquired; once execution begins every fault is folded
    /// into the report.
    pub async fn execute(
        &self,
        scenarios: Vec<Scenario>,
        source: &DataSource,
    ) -> Result<crate::report::types::RunReport, DataSourceError> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();

        // Materialize up front: a malformed source aborts with no partial
        // execution.
        let rows = source.load()?;

        let mut units = VecDeque::new();
        for (scenario_index, scenario) in scenarios.iter().enumerate() {
            for row in &rows {
                units.push_back(TestUnit {
                    scenario_index,
                    scenario_name: scenario.name.clone(),
                    row: row.clone(),
                });
            }
        }
        let total_units = units.len();

        self.emitter.emit(RunEvent::RunStarted {
            run_id: run_id.clone(),
            total_units,
            concurrency: self.options.concurrency.max(1),
        });
        log::info!(
            "run {}: {} scenarios x {} rows = {} units",
            run_id,
            scenarios.len(),
            rows.len(),
            total_units
        );

        let shared = Arc::new(Shared {
            queue: Mutex::new(units),
            scenarios,
            manager: self.manager.clone(),
            session_config: self.session_config.clone(),
            case_runner: CaseRunner {
                unit_timeout_ms: self.options.unit_timeout_ms,
                element_timeout_ms: self.options.element_timeout_ms,
                artifact_root: self.options.output_dir.join(&run_id),
                base_url: self.options.base_url.clone(),
            },
            retry_budget: self.options.retry_budget,
            retry_delay_ms: self.options.retry_delay_ms,
            collector: ReportCollector::new(),
            emitter: self.emitter.clone(),
            cancel: self.cancel.clone(),
        });

        let workers = self.options.concurrency.max(1).min(total_units.max(1));
        let mut handles = Vec::new();
        for worker_id in 0..workers {
            let shared = shared.clone();
            handles.push(tokio::spawn(worker_loop(shared, worker_id)));
        }
        for handle in handles {
            if let Err(e) = handle.await {
                log::error!("worker task failed: {e}");
            }
        }

        let cancelled = self.cancel.load(Ordering::SeqCst);
        if cancelled {
            self.emitter.emit(RunEvent::RunCancelled);
        }

        // Whatever never started is still accounted for.
        loop {
            let unit = shared.queue.lock().unwrap().pop_front();
            let Some(unit) = unit else { break };
            let outcome = Outcome::skipped(&unit, "run cancelled before unit started".into());
            self.emitter.emit(RunEvent::UnitFinished {
                scenario: outcome.scenario.clone(),
                row_index: outcome.row_index,
                status: outcome.status,
                duration_ms: 0,
            });
            shared.collector.record(outcome);
        }

        let finished_at = Utc::now();
        let names: Vec<String> = shared.scenarios.iter().map(|s| s.name.clone()).collect();
        let report = shared.collector.finalize(
            RunMeta {
                run_id,
                browser: self.session_config.browser,
                started_at,
                finished_at,
                cancelled,
            },
            &names,
        );

        self.emitter.emit(RunEvent::RunFinished {
            totals: report.totals,
        });
        Ok(report)
    }
}

struct Shared {
    queue: Mutex<VecDeque<TestUnit>>,
    scenarios: Vec<Scenario>,
    manager: SessionManager,
    session_config: SessionConfig,
    case_runner: CaseRunner,
    retry_budget: u32,
    retry_delay_ms: u64,
    collector: ReportCollector,
    emitter: EventEmitter,
    cancel: Arc<AtomicBool>,
}

/// Sequential loop of one worker: check cancellation, pop a unit, acquire a
/// session, run, release, record.
async fn worker_loop(shared: Arc<Shared>, worker_id: usize) {
    loop {
        if shared.cancel.load(Ordering::SeqCst) {
            break;
        }
        let unit = shared.queue.lock().unwrap().pop_front();
        let Some(unit) = unit else { break };

        shared.emitter.emit(RunEvent::UnitStarted {
            scenario: unit.scenario_name.clone(),
            row_index: unit.row.index(),
            worker: worker_id,
        });

        let outcome = run_unit(&shared, &unit).await;

        shared.emitter.emit(RunEvent::UnitFinished {
            scenario: outcome.scenario.clone(),
            row_index: outcome.row_index,
            status: outcome.status,
            duration_ms: outcome.duration_ms,
        });
        shared.collector.record(outcome);
    }
}

/// Run one unit to a terminal outcome, applying the retry budget.
///
/// Only outcomes whose failure kind is retryable are re-attempted; an
/// assertion failure ends the unit on the spot.
async fn run_unit(shared: &Shared, unit: &TestUnit) -> Outcome {
    let scenario = &shared.scenarios[unit.scenario_index];
    let max_attempts = shared.retry_budget + 1;
    let mut attempt = 1u32;

    loop {
        let outcome = attempt_once(shared, scenario, unit, attempt).await;

        if outcome.is_retryable()
            && attempt < max_attempts
            && !shared.cancel.load(Ordering::SeqCst)
        {
            shared.emitter.emit(RunEvent::UnitRetrying {
                scenario: unit.scenario_name.clone(),
                row_index: unit.row.index(),
                attempt,
                max_attempts,
            });
            tokio::time::sleep(Duration::from_millis(shared.retry_delay_ms)).await;
            attempt += 1;
            continue;
        }
        return outcome;
    }
}

/// One attempt: acquire, run, release. The release runs on every path,
/// including acquisition of a handle the case runner later tainted.
async fn attempt_once(
    shared: &Shared,
    scenario: &Scenario,
    unit: &TestUnit,
    attempt: u32,
) -> Outcome {
    match shared.manager.acquire(&shared.session_config).await {
        Err(e) => Outcome::errored(
            unit,
            FailureKind::SessionAcquisition,
            e.to_string(),
            attempt,
            0,
        ),
        Ok(mut handle) => {
            let outcome = shared
                .case_runner
                .run(scenario, unit, &mut handle, attempt)
                .await;
            shared.manager.release(&mut handle).await;
            outcome
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::DataSource;
    use crate::runner::state::OutcomeStatus;
    use crate::session::testing::{StubBackend, StubBehavior, StubCounters};
    use std::io::Write;
    use std::sync::atomic::Ordering as AtomicOrdering;

    fn temp_csv(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("bluejay-run-{}.csv", Uuid::new_v4()));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn passing_scenario() -> Scenario {
        Scenario::from_yaml(
            "name: login\nsteps:\n  - navigate:\n      url: \"/login\"\n  - assertVisible:\n      selector: \"#form\"\n",
        )
        .unwrap()
    }

    fn options(concurrency: usize) -> ExecutionOptions {
        ExecutionOptions {
            concurrency,
            unit_timeout_ms: 2_000,
            element_timeout_ms: 50,
            retry_delay_ms: 1,
            output_dir: std::env::temp_dir().join(format!("bluejay-out-{}", Uuid::new_v4())),
            ..Default::default()
        }
    }

    fn orchestrator_with(
        behavior: StubBehavior,
        options: ExecutionOptions,
    ) -> (Orchestrator, Arc<StubCounters>) {
        let backend = StubBackend::new(behavior);
        let counters = backend.counters.clone();
        let manager = SessionManager::new(Arc::new(backend));
        let orchestrator = Orchestrator::new(manager, SessionConfig::default(), options);
        (orchestrator, counters)
    }

    #[tokio::test]
    async fn two_rows_one_passing_scenario_two_workers() {
        let csv = temp_csv("user\na\nb\n");
        let source = DataSource::open(&csv).unwrap();
        let (orchestrator, _) = orchestrator_with(StubBehavior::default(), options(2));

        let report = orchestrator
            .execute(vec![passing_scenario()], &source)
            .await
            .unwrap();

        assert_eq!(report.totals.total, 2);
        assert_eq!(report.totals.passed, 2);
        assert!(report.exit_success());
        assert_eq!(report.exit_code(), 0);
        std::fs::remove_file(csv).ok();
    }

    #[tokio::test]
    async fn report_preserves_row_order_despite_completion_order() {
        // Earlier rows sleep longer, so with parallel workers they finish
        // last; the report must still list rows 1..5 in order.
        let csv = temp_csv("delay\n120\n90\n60\n30\n0\n");
        let source = DataSource::open(&csv).unwrap();
        let scenario =
            Scenario::from_yaml("name: ordered\nsteps:\n  - navigate:\n      url: \"/p/${delay}\"\n")
                .unwrap();
        let (orchestrator, _) = orchestrator_with(
            StubBehavior {
                delay_from_url: true,
                ..Default::default()
            },
            options(5),
        );

        let report = orchestrator.execute(vec![scenario], &source).await.unwrap();

        assert_eq!(report.totals.passed, 5);
        let rows: Vec<usize> = report.scenarios[0]
            .outcomes
            .iter()
            .map(|o| o.row_index)
            .collect();
        assert_eq!(rows, vec![1, 2, 3, 4, 5]);
        std::fs::remove_file(csv).ok();
    }

    #[tokio::test]
    async fn sessions_are_never_shared_across_workers() {
        let csv = temp_csv("user\n1\n2\n3\n4\n5\n6\n7\n8\n9\n10\n11\n12\n");
        let source = DataSource::open(&csv).unwrap();
        let (orchestrator, counters) = orchestrator_with(StubBehavior::default(), options(4));
        let manager_probe = orchestrator.manager.clone();

        let report = orchestrator
            .execute(vec![passing_scenario()], &source)
            .await
            .unwrap();

        assert_eq!(report.totals.passed, 12);
        assert!(counters.peak_concurrent.load(AtomicOrdering::SeqCst) <= 4);
        assert_eq!(counters.launches.load(AtomicOrdering::SeqCst), 12);
        assert_eq!(counters.closed.load(AtomicOrdering::SeqCst), 12);
        assert_eq!(manager_probe.active_sessions(), 0);
        std::fs::remove_file(csv).ok();
    }

    #[tokio::test]
    async fn timeout_is_errored_and_session_is_discarded() {
        let csv = temp_csv("user\na\nb\n");
        let source = DataSource::open(&csv).unwrap();
        let mut opts = options(1);
        opts.unit_timeout_ms = 40;
        let (orchestrator, counters) = orchestrator_with(
            StubBehavior {
                goto_delay_ms: 500,
                ..Default::default()
            },
            opts,
        );

        let report = orchestrator
            .execute(vec![passing_scenario()], &source)
            .await
            .unwrap();

        assert_eq!(report.totals.errored, 2);
        for outcome in report.outcomes() {
            assert_eq!(outcome.status, OutcomeStatus::Errored);
            assert_eq!(outcome.failure.as_ref().unwrap().kind, FailureKind::Timeout);
            assert_eq!(outcome.attempts, 1);
        }
        // Each unit got a fresh session and every session was torn down; a
        // tainted session never reaches a subsequent unit.
        assert_eq!(counters.launches.load(AtomicOrdering::SeqCst), 2);
        assert_eq!(counters.closed.load(AtomicOrdering::SeqCst), 2);
        std::fs::remove_file(csv).ok();
    }

    #[tokio::test]
    async fn retry_budget_yields_exactly_k_plus_one_attempts() {
        let csv = temp_csv("user\na\n");
        let source = DataSource::open(&csv).unwrap();
        let mut opts = options(1);
        opts.retry_budget = 3;
        let (orchestrator, counters) = orchestrator_with(
            StubBehavior {
                always_fail_acquire: true,
                ..Default::default()
            },
            opts,
        );

        let report = orchestrator
            .execute(vec![passing_scenario()], &source)
            .await
            .unwrap();

        assert_eq!(report.totals.errored, 1);
        let outcome = report.outcomes().next().unwrap();
        assert_eq!(outcome.attempts, 4);
        assert_eq!(
            outcome.failure.as_ref().unwrap().kind,
            FailureKind::SessionAcquisition
        );
        assert_eq!(counters.launches.load(AtomicOrdering::SeqCst), 4);
        std::fs::remove_file(csv).ok();
    }

    #[tokio::test]
    async fn assertion_failures_are_never_retried() {
        let csv = temp_csv("user\na\n");
        let source = DataSource::open(&csv).unwrap();
        let scenario = Scenario::from_yaml(
            "name: check\nsteps:\n  - assertText:\n      selector: \"h1\"\n      equals: \"Welcome\"\n",
        )
        .unwrap();
        let mut opts = options(1);
        opts.retry_budget = 5;
        let (orchestrator, counters) = orchestrator_with(
            StubBehavior {
                text: Some("Goodbye".into()),
                ..Default::default()
            },
            opts,
        );

        let report = orchestrator.execute(vec![scenario], &source).await.unwrap();

        assert_eq!(report.totals.failed, 1);
        let outcome = report.outcomes().next().unwrap();
        assert_eq!(outcome.attempts, 1);
        assert_eq!(counters.launches.load(AtomicOrdering::SeqCst), 1);
        std::fs::remove_file(csv).ok();
    }

    #[tokio::test]
    async fn acquisition_failure_hits_only_its_own_unit() {
        let csv = temp_csv("user\na\nb\nc\n");
        let source = DataSource::open(&csv).unwrap();
        let (orchestrator, _) = orchestrator_with(
            StubBehavior {
                acquire_failures: 1,
                ..Default::default()
            },
            options(1),
        );

        let report = orchestrator
            .execute(vec![passing_scenario()], &source)
            .await
            .unwrap();

        assert_eq!(report.totals.total, 3);
        assert_eq!(report.totals.errored, 1);
        assert_eq!(report.totals.passed, 2);
        assert!(!report.exit_success());
        std::fs::remove_file(csv).ok();
    }

    #[tokio::test]
    async fn cancellation_skips_unstarted_units_and_fails_the_exit_code() {
        let csv = temp_csv("user\na\nb\nc\nd\ne\n");
        let source = DataSource::open(&csv).unwrap();

        // The first navigation pulls the trigger, so exactly one unit is in
        // flight when cancellation lands; it is allowed to finish.
        let cancel = Arc::new(AtomicBool::new(false));
        let backend = StubBackend::new(StubBehavior {
            cancel_on_goto: Some(cancel.clone()),
            ..Default::default()
        });
        let orchestrator = Orchestrator {
            manager: SessionManager::new(Arc::new(backend)),
            session_config: SessionConfig::default(),
            options: options(1),
            emitter: EventEmitter::default(),
            cancel,
        };

        let report = orchestrator
            .execute(vec![passing_scenario()], &source)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.totals.total, 5);
        assert_eq!(report.totals.passed, 1);
        assert_eq!(report.totals.skipped, 4);
        assert_eq!(report.exit_code(), 1);
        for outcome in report.outcomes().filter(|o| o.status == OutcomeStatus::Skipped) {
            assert_eq!(outcome.attempts, 0);
        }
        std::fs::remove_file(csv).ok();
    }

    #[tokio::test]
    async fn malformed_source_aborts_before_any_session() {
        let csv = temp_csv("user,age\nalice\n");
        let source = DataSource::open(&csv).unwrap();
        let (orchestrator, counters) = orchestrator_with(StubBehavior::default(), options(2));

        let err = orchestrator
            .execute(vec![passing_scenario()], &source)
            .await
            .unwrap_err();

        assert!(matches!(err, DataSourceError::RowWidth { .. }));
        assert_eq!(counters.launches.load(AtomicOrdering::SeqCst), 0);
        std::fs::remove_file(csv).ok();
    }
}
