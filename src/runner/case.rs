//! Test case runner: executes one scenario against one session with one
//! data row, producing a structured outcome.
//!
//! Every failure mode is converted to an [`Outcome`] at this boundary;
//! nothing escapes to the caller. Assertion mismatches become FAILED, a unit
//! overrunning its budget becomes ERRORED/Timeout with the session handle
//! tainted, and any other fault becomes ERRORED/Engine.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::datasource::TestDataRow;
use crate::error::StepError;
use crate::runner::state::{FailureKind, Outcome, TestUnit};
use crate::scenario::{interpolate, Scenario, Step};
use crate::session::backend::BrowserSession;
use crate::session::SessionHandle;

/// Budget for the best-effort failure screenshot; a wedged session must not
/// stall the worker past the unit it already lost.
const ARTIFACT_TIMEOUT_MS: u64 = 5_000;

pub struct CaseRunner {
    /// Hard budget for one unit, all steps included.
    pub unit_timeout_ms: u64,
    /// Implicit wait budget for element-level waits.
    pub element_timeout_ms: u64,
    /// Run-scoped directory receiving failure artifacts.
    pub artifact_root: PathBuf,
    /// Base URL joined onto relative `navigate` targets.
    pub base_url: Option<String>,
}

impl CaseRunner {
    /// Run one unit to a terminal outcome. Never panics, never errors out.
    pub async fn run(
        &self,
        scenario: &Scenario,
        unit: &TestUnit,
        handle: &mut SessionHandle,
        attempt: u32,
    ) -> Outcome {
        let started = Instant::now();

        let result = {
            let Some(session) = handle.session() else {
                return Outcome::errored(
                    unit,
                    FailureKind::Engine,
                    "session handle is no longer alive".into(),
                    attempt,
                    0,
                );
            };
            tokio::time::timeout(
                Duration::from_millis(self.unit_timeout_ms),
                self.run_steps(scenario, &unit.row, session),
            )
            .await
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(())) => Outcome::passed(unit, attempt, duration_ms),
            Ok(Err(StepError::Assertion(message))) => {
                let artifact = self.capture_artifact(unit, handle).await;
                Outcome::failed(unit, message, attempt, duration_ms).with_artifact(artifact)
            }
            Ok(Err(StepError::Engine(e))) => {
                let artifact = self.capture_artifact(unit, handle).await;
                Outcome::errored(unit, FailureKind::Engine, format!("{e:#}"), attempt, duration_ms)
                    .with_artifact(artifact)
            }
            Err(_elapsed) => {
                // The session may be mid-interaction; mark it untrustworthy so
                // it is discarded instead of handed to another unit.
                handle.taint();
                let artifact = self.capture_artifact(unit, handle).await;
                Outcome::errored(
                    unit,
                    FailureKind::Timeout,
                    format!("unit exceeded its {}ms budget", self.unit_timeout_ms),
                    attempt,
                    duration_ms,
                )
                .with_artifact(artifact)
            }
        }
    }

    async fn run_steps(
        &self,
        scenario: &Scenario,
        row: &TestDataRow,
        session: &dyn BrowserSession,
    ) -> Result<(), StepError> {
        let base_url = scenario.base_url.as_deref().or(self.base_url.as_deref());

        for (index, step) in scenario.steps.iter().enumerate() {
            log::debug!(
                "{}[row {}] step {}: {}",
                scenario.name,
                row.index(),
                index,
                step.display_name()
            );
            self.exec_step(step, row, base_url, session)
                .await
                .map_err(|e| annotate(e, index, step))?;
        }
        Ok(())
    }

    async fn exec_step(
        &self,
        step: &Step,
        row: &TestDataRow,
        base_url: Option<&str>,
        session: &dyn BrowserSession,
    ) -> Result<(), StepError> {
        let sub = |text: &str| {
            interpolate(text, |key| {
                if key == "base_url" {
                    return base_url.map(|b| b.to_string());
                }
                row.get(key).map(|cell| cell.to_string())
            })
        };

        match step {
            Step::Navigate { url } => {
                let target = resolve_url(&sub(url), base_url);
                session.goto(&target).await?;
            }
            Step::Click { selector } => {
                session.click(&sub(selector)).await?;
            }
            Step::Fill { selector, value } => {
                session.fill(&sub(selector), &sub(value)).await?;
            }
            Step::WaitFor {
                selector,
                timeout_ms,
            } => {
                let selector = sub(selector);
                let budget = timeout_ms.unwrap_or(self.element_timeout_ms);
                let appeared = session.wait_for(&selector, budget).await?;
                if !appeared {
                    return Err(StepError::assertion(format!(
                        "element '{selector}' did not appear within {budget}ms"
                    )));
                }
            }
            Step::Pause { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            Step::AssertVisible { selector } => {
                let selector = sub(selector);
                let visible = session
                    .wait_for(&selector, self.element_timeout_ms)
                    .await?;
                if !visible {
                    return Err(StepError::assertion(format!(
                        "expected '{selector}' to be visible"
                    )));
                }
            }
            Step::AssertText { selector, equals } => {
                let selector = sub(selector);
                let expected = sub(equals);
                let actual = session.text_of(&selector).await?;
                if actual.trim() != expected {
                    return Err(StepError::assertion(format!(
                        "text of '{selector}': expected '{expected}', got '{}'",
                        actual.trim()
                    )));
                }
            }
            Step::AssertTitle { equals } => {
                let expected = sub(equals);
                let actual = session.title().await?;
                if actual != expected {
                    return Err(StepError::assertion(format!(
                        "page title: expected '{expected}', got '{actual}'"
                    )));
                }
            }
            Step::AssertUrl { contains } => {
                let needle = sub(contains);
                let actual = session.current_url().await?;
                if !actual.contains(&needle) {
                    return Err(StepError::assertion(format!(
                        "url '{actual}' does not contain '{needle}'"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Best-effort diagnostic screenshot. Capture failure never changes the
    /// outcome's severity.
    async fn capture_artifact(&self, unit: &TestUnit, handle: &SessionHandle) -> Option<String> {
        let session = handle.session()?;
        let relative = Path::new(&unit.scenario_name)
            .join(format!("row-{}", unit.row.index()))
            .join("failure.png");
        let target = self.artifact_root.join(&relative);

        let shot = tokio::time::timeout(
            Duration::from_millis(ARTIFACT_TIMEOUT_MS),
            session.screenshot(&target),
        )
        .await;

        match shot {
            Ok(Ok(())) => Some(relative.display().to_string()),
            Ok(Err(e)) => {
                log::warn!("failed to capture artifact for {}: {e:#}", unit.label());
                None
            }
            Err(_) => {
                log::warn!("artifact capture for {} timed out", unit.label());
                None
            }
        }
    }
}

fn annotate(error: StepError, index: usize, step: &Step) -> StepError {
    match error {
        StepError::Assertion(msg) => {
            StepError::Assertion(format!("step {} ({}): {}", index, step.display_name(), msg))
        }
        StepError::Engine(e) => {
            StepError::Engine(e.context(format!("step {} ({})", index, step.display_name())))
        }
    }
}

fn resolve_url(url: &str, base: Option<&str>) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        return url.to_string();
    }
    match base {
        Some(base) => format!(
            "{}/{}",
            base.trim_end_matches('/'),
            url.trim_start_matches('/')
        ),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::CellValue;
    use crate::runner::state::OutcomeStatus;
    use crate::scenario::Scenario;
    use crate::session::testing::{StubBackend, StubBehavior};
    use crate::session::{SessionConfig, SessionManager};
    use std::sync::Arc;

    fn runner() -> CaseRunner {
        CaseRunner {
            unit_timeout_ms: 1_000,
            element_timeout_ms: 100,
            artifact_root: std::env::temp_dir().join(format!("bluejay-{}", uuid::Uuid::new_v4())),
            base_url: Some("http://localhost:8080".into()),
        }
    }

    fn unit_with_row(pairs: &[(&str, CellValue)]) -> TestUnit {
        TestUnit {
            scenario_index: 0,
            scenario_name: "login".into(),
            row: TestDataRow::for_tests(1, pairs),
        }
    }

    async fn handle_for(backend: StubBackend) -> (SessionManager, SessionHandle) {
        let manager = SessionManager::new(Arc::new(backend));
        let handle = manager.acquire(&SessionConfig::default()).await.unwrap();
        (manager, handle)
    }

    fn scenario(yaml: &str) -> Scenario {
        Scenario::from_yaml(yaml).unwrap()
    }

    #[tokio::test]
    async fn passing_unit_reports_passed() {
        let scenario = scenario(
            "name: login\nsteps:\n  - navigate:\n      url: \"/login\"\n  - assertVisible:\n      selector: \"#form\"\n",
        );
        let unit = unit_with_row(&[]);
        let (manager, mut handle) = handle_for(StubBackend::passing()).await;

        let outcome = runner().run(&scenario, &unit, &mut handle, 1).await;
        assert_eq!(outcome.status, OutcomeStatus::Passed);
        assert!(outcome.failure.is_none());
        assert!(!handle.is_tainted());

        manager.release(&mut handle).await;
    }

    #[tokio::test]
    async fn assertion_mismatch_reports_failed_with_artifact() {
        let scenario = scenario(
            "name: login\nsteps:\n  - assertText:\n      selector: \".welcome\"\n      equals: \"Hello, ${user}\"\n",
        );
        let unit = unit_with_row(&[("user", CellValue::Text("alice".into()))]);
        let backend = StubBackend::new(StubBehavior {
            text: Some("Hello, bob".into()),
            ..Default::default()
        });
        let (manager, mut handle) = handle_for(backend).await;

        let case = runner();
        let outcome = case.run(&scenario, &unit, &mut handle, 1).await;
        assert_eq!(outcome.status, OutcomeStatus::Failed);
        let failure = outcome.failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::Assertion);
        assert!(failure.message.contains("Hello, alice"));
        assert!(failure.message.contains("Hello, bob"));
        let artifact = outcome.artifact.as_ref().expect("artifact captured");
        assert!(case.artifact_root.join(artifact).exists());

        manager.release(&mut handle).await;
        std::fs::remove_dir_all(&case.artifact_root).ok();
    }

    #[tokio::test]
    async fn engine_fault_reports_errored() {
        let scenario = scenario("name: login\nsteps:\n  - navigate:\n      url: \"/login\"\n");
        let unit = unit_with_row(&[]);
        let backend = StubBackend::new(StubBehavior {
            goto_error: true,
            ..Default::default()
        });
        let (manager, mut handle) = handle_for(backend).await;

        let outcome = runner().run(&scenario, &unit, &mut handle, 1).await;
        assert_eq!(outcome.status, OutcomeStatus::Errored);
        assert_eq!(outcome.failure.as_ref().unwrap().kind, FailureKind::Engine);

        manager.release(&mut handle).await;
    }

    #[tokio::test]
    async fn overrunning_unit_times_out_and_taints_the_session() {
        let scenario = scenario("name: slow\nsteps:\n  - navigate:\n      url: \"/slow\"\n");
        let unit = TestUnit {
            scenario_index: 0,
            scenario_name: "slow".into(),
            row: TestDataRow::for_tests(1, &[]),
        };
        let backend = StubBackend::new(StubBehavior {
            goto_delay_ms: 5_000,
            ..Default::default()
        });
        let (manager, mut handle) = handle_for(backend).await;

        let mut case = runner();
        case.unit_timeout_ms = 50;
        let outcome = case.run(&scenario, &unit, &mut handle, 1).await;
        assert_eq!(outcome.status, OutcomeStatus::Errored);
        assert_eq!(outcome.failure.as_ref().unwrap().kind, FailureKind::Timeout);
        assert!(handle.is_tainted());

        manager.release(&mut handle).await;
        std::fs::remove_dir_all(&case.artifact_root).ok();
    }

    #[test]
    fn relative_urls_join_the_base() {
        assert_eq!(
            resolve_url("/login", Some("http://app.local/")),
            "http://app.local/login"
        );
        assert_eq!(
            resolve_url("http://other.local/x", Some("http://app.local")),
            "http://other.local/x"
        );
        assert_eq!(resolve_url("/login", None), "/login");
    }
}
