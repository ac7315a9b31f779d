//! Units of execution and their terminal outcomes.

use serde::{Deserialize, Serialize};

use crate::datasource::TestDataRow;

/// One (scenario, data row) pairing: the atomic unit of execution.
///
/// Created when the orchestrator expands scenarios across rows, dropped once
/// its [`Outcome`] is recorded.
#[derive(Debug, Clone)]
pub struct TestUnit {
    pub scenario_index: usize,
    pub scenario_name: String,
    pub row: TestDataRow,
}

impl TestUnit {
    pub fn label(&self) -> String {
        format!("{}[row {}]", self.scenario_name, self.row.index())
    }
}

/// Terminal status of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Passed,
    Failed,
    Errored,
    Skipped,
}

/// Why a non-passed unit ended the way it did.
///
/// This is the retry discriminator: only `Timeout` and `SessionAcquisition`
/// are infrastructure faults eligible for re-attempts. `Assertion` is a
/// domain failure and is never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    Assertion,
    Timeout,
    SessionAcquisition,
    Engine,
}

impl FailureKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::Timeout | FailureKind::SessionAcquisition)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureDetail {
    pub kind: FailureKind,
    pub message: String,
}

/// Immutable result of one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub scenario: String,
    pub scenario_index: usize,
    pub row_index: usize,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureDetail>,
    pub attempts: u32,
    pub duration_ms: u64,
    /// Path to a captured diagnostic artifact, relative to the run directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
}

impl Outcome {
    pub fn passed(unit: &TestUnit, attempts: u32, duration_ms: u64) -> Self {
        Self {
            scenario: unit.scenario_name.clone(),
            scenario_index: unit.scenario_index,
            row_index: unit.row.index(),
            status: OutcomeStatus::Passed,
            failure: None,
            attempts,
            duration_ms,
            artifact: None,
        }
    }

    pub fn failed(unit: &TestUnit, message: String, attempts: u32, duration_ms: u64) -> Self {
        Self {
            scenario: unit.scenario_name.clone(),
            scenario_index: unit.scenario_index,
            row_index: unit.row.index(),
            status: OutcomeStatus::Failed,
            failure: Some(FailureDetail {
                kind: FailureKind::Assertion,
                message,
            }),
            attempts,
            duration_ms,
            artifact: None,
        }
    }

    pub fn errored(
        unit: &TestUnit,
        kind: FailureKind,
        message: String,
        attempts: u32,
        duration_ms: u64,
    ) -> Self {
        Self {
            scenario: unit.scenario_name.clone(),
            scenario_index: unit.scenario_index,
            row_index: unit.row.index(),
            status: OutcomeStatus::Errored,
            failure: Some(FailureDetail { kind, message }),
            attempts,
            duration_ms,
            artifact: None,
        }
    }

    pub fn skipped(unit: &TestUnit, reason: String) -> Self {
        Self {
            scenario: unit.scenario_name.clone(),
            scenario_index: unit.scenario_index,
            row_index: unit.row.index(),
            status: OutcomeStatus::Skipped,
            failure: Some(FailureDetail {
                kind: FailureKind::Engine,
                message: reason,
            }),
            attempts: 0,
            duration_ms: 0,
            artifact: None,
        }
    }

    pub fn with_artifact(mut self, artifact: Option<String>) -> Self {
        self.artifact = artifact;
        self
    }

    /// True when the outcome's failure kind allows another attempt.
    pub fn is_retryable(&self) -> bool {
        self.status == OutcomeStatus::Errored
            && self
                .failure
                .as_ref()
                .map(|f| f.kind.is_retryable())
                .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::TestDataRow;

    fn unit() -> TestUnit {
        TestUnit {
            scenario_index: 0,
            scenario_name: "login".into(),
            row: TestDataRow::for_tests(3, &[]),
        }
    }

    #[test]
    fn retry_eligibility_is_decided_by_kind_not_message() {
        let timeout =
            Outcome::errored(&unit(), FailureKind::Timeout, "assertion failed".into(), 1, 5);
        assert!(timeout.is_retryable());

        let engine = Outcome::errored(&unit(), FailureKind::Engine, "timeout".into(), 1, 5);
        assert!(!engine.is_retryable());

        let failed = Outcome::failed(&unit(), "expected 'a', got 'b'".into(), 1, 5);
        assert!(!failed.is_retryable());

        let skipped = Outcome::skipped(&unit(), "run cancelled".into());
        assert!(!skipped.is_retryable());
    }

    #[test]
    fn outcome_serializes_with_camel_case_tags() {
        let outcome =
            Outcome::errored(&unit(), FailureKind::SessionAcquisition, "boom".into(), 2, 10);
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"status\":\"errored\""));
        assert!(json.contains("\"kind\":\"sessionAcquisition\""));
        assert!(json.contains("\"rowIndex\":3"));
    }
}
