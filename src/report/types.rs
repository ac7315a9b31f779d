//! Public report structures consumed by the renderers.

use serde::{Deserialize, Serialize};

use crate::runner::state::{Outcome, OutcomeStatus};
use crate::session::BrowserKind;

/// Per-status outcome counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub errored: u32,
    pub skipped: u32,
}

impl Totals {
    pub fn count(outcomes: &[Outcome]) -> Self {
        let mut totals = Totals::default();
        for outcome in outcomes {
            totals.total += 1;
            match outcome.status {
                OutcomeStatus::Passed => totals.passed += 1,
                OutcomeStatus::Failed => totals.failed += 1,
                OutcomeStatus::Errored => totals.errored += 1,
                OutcomeStatus::Skipped => totals.skipped += 1,
            }
        }
        totals
    }
}

/// Outcomes of one scenario, in original data-row order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioReport {
    pub name: String,
    pub outcomes: Vec<Outcome>,
}

/// Aggregated result of one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub browser: BrowserKind,
    pub started_at: String,
    pub finished_at: String,
    pub duration_ms: u64,
    pub cancelled: bool,
    pub totals: Totals,
    pub scenarios: Vec<ScenarioReport>,
}

impl RunReport {
    /// All outcomes across scenarios, scenario order preserved.
    pub fn outcomes(&self) -> impl Iterator<Item = &Outcome> {
        self.scenarios.iter().flat_map(|s| s.outcomes.iter())
    }

    /// Exit contract: success only when the run completed uncancelled with
    /// nothing failed or errored.
    pub fn exit_success(&self) -> bool {
        !self.cancelled && self.totals.failed == 0 && self.totals.errored == 0
    }

    pub fn exit_code(&self) -> i32 {
        if self.exit_success() {
            0
        } else {
            1
        }
    }
}
