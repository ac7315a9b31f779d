use std::io::Cursor;
use std::path::Path;

use anyhow::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use super::types::RunReport;
use crate::runner::state::{FailureKind, OutcomeStatus};

/// Render the report as JUnit XML to a file or stdout.
pub async fn generate(report: &RunReport, output: Option<&Path>) -> Result<()> {
    let xml = generate_junit_xml(report)?;

    if let Some(path) = output {
        std::fs::write(path, xml)?;
        println!("JUnit report saved to: {}", path.display());
    } else {
        println!("{}", xml);
    }

    Ok(())
}

/// Write `junit.xml` into the run directory.
pub fn write_report(report: &RunReport, output_dir: &Path) -> Result<()> {
    let xml = generate_junit_xml(report)?;
    let path = output_dir.join("junit.xml");
    std::fs::write(&path, xml)?;
    log::info!("wrote JUnit report: {}", path.display());
    Ok(())
}

/// One `<testsuite>` per scenario, one `<testcase>` per unit.
pub fn generate_junit_xml(report: &RunReport) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let totals = &report.totals;
    let mut suites_start = BytesStart::new("testsuites");
    suites_start.push_attribute(("name", "bluejay-run"));
    suites_start.push_attribute(("id", report.run_id.as_str()));
    suites_start.push_attribute(("tests", totals.total.to_string().as_str()));
    suites_start.push_attribute(("failures", totals.failed.to_string().as_str()));
    suites_start.push_attribute(("errors", totals.errored.to_string().as_str()));
    suites_start.push_attribute(("skipped", totals.skipped.to_string().as_str()));
    suites_start.push_attribute((
        "time",
        (report.duration_ms as f64 / 1000.0).to_string().as_str(),
    ));
    writer.write_event(Event::Start(suites_start))?;

    for scenario in &report.scenarios {
        let failures = scenario
            .outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Failed)
            .count();
        let errors = scenario
            .outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Errored)
            .count();
        let skipped = scenario
            .outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Skipped)
            .count();
        let suite_time: u64 = scenario.outcomes.iter().map(|o| o.duration_ms).sum();

        let mut suite_start = BytesStart::new("testsuite");
        suite_start.push_attribute(("name", scenario.name.as_str()));
        suite_start.push_attribute(("tests", scenario.outcomes.len().to_string().as_str()));
        suite_start.push_attribute(("failures", failures.to_string().as_str()));
        suite_start.push_attribute(("errors", errors.to_string().as_str()));
        suite_start.push_attribute(("skipped", skipped.to_string().as_str()));
        suite_start.push_attribute(("time", (suite_time as f64 / 1000.0).to_string().as_str()));
        suite_start.push_attribute(("timestamp", report.started_at.as_str()));
        writer.write_event(Event::Start(suite_start))?;

        for outcome in &scenario.outcomes {
            let case_name = format!("{}[row {}]", scenario.name, outcome.row_index);
            let mut case_start = BytesStart::new("testcase");
            case_start.push_attribute(("name", case_name.as_str()));
            case_start.push_attribute(("classname", scenario.name.as_str()));
            case_start.push_attribute((
                "time",
                (outcome.duration_ms as f64 / 1000.0).to_string().as_str(),
            ));
            writer.write_event(Event::Start(case_start))?;

            match outcome.status {
                OutcomeStatus::Failed => {
                    let message = outcome
                        .failure
                        .as_ref()
                        .map(|f| f.message.as_str())
                        .unwrap_or("assertion failed");
                    let mut fail_start = BytesStart::new("failure");
                    fail_start.push_attribute(("message", message));
                    fail_start.push_attribute(("type", "AssertionFailure"));
                    writer.write_event(Event::Start(fail_start))?;
                    writer.write_event(Event::Text(BytesText::new(message)))?;
                    writer.write_event(Event::End(BytesEnd::new("failure")))?;
                }
                OutcomeStatus::Errored => {
                    let (kind, message) = outcome
                        .failure
                        .as_ref()
                        .map(|f| (f.kind, f.message.as_str()))
                        .unwrap_or((FailureKind::Engine, "unknown error"));
                    let mut error_start = BytesStart::new("error");
                    error_start.push_attribute(("message", message));
                    error_start.push_attribute(("type", format!("{kind:?}").as_str()));
                    writer.write_event(Event::Start(error_start))?;
                    writer.write_event(Event::Text(BytesText::new(message)))?;
                    writer.write_event(Event::End(BytesEnd::new("error")))?;
                }
                OutcomeStatus::Skipped => {
                    let message = outcome
                        .failure
                        .as_ref()
                        .map(|f| f.message.as_str())
                        .unwrap_or("skipped");
                    let mut skip_start = BytesStart::new("skipped");
                    skip_start.push_attribute(("message", message));
                    writer.write_event(Event::Empty(skip_start))?;
                }
                OutcomeStatus::Passed => {}
            }

            writer.write_event(Event::End(BytesEnd::new("testcase")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuites")))?;

    let result = writer.into_inner().into_inner();
    let xml = String::from_utf8(result)?;
    Ok(xml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::TestDataRow;
    use crate::report::types::{ScenarioReport, Totals};
    use crate::runner::state::{FailureKind, Outcome, TestUnit};
    use crate::session::BrowserKind;

    fn unit(name: &str, row: usize) -> TestUnit {
        TestUnit {
            scenario_index: 0,
            scenario_name: name.into(),
            row: TestDataRow::for_tests(row, &[]),
        }
    }

    #[test]
    fn junit_xml_carries_failures_errors_and_skips() {
        let outcomes = vec![
            Outcome::passed(&unit("login", 1), 1, 1200),
            Outcome::failed(&unit("login", 2), "welcome text mismatch".into(), 1, 900),
            Outcome::errored(
                &unit("login", 3),
                FailureKind::Timeout,
                "unit exceeded its 60000ms budget".into(),
                2,
                60000,
            ),
            Outcome::skipped(&unit("login", 4), "run cancelled before unit started".into()),
        ];
        let report = RunReport {
            run_id: "run-junit".into(),
            browser: BrowserKind::Chrome,
            started_at: "2024-03-01T10:00:00Z".into(),
            finished_at: "2024-03-01T10:01:02Z".into(),
            duration_ms: 62_000,
            cancelled: true,
            totals: Totals {
                total: 4,
                passed: 1,
                failed: 1,
                errored: 1,
                skipped: 1,
            },
            scenarios: vec![ScenarioReport {
                name: "login".into(),
                outcomes,
            }],
        };

        let xml = generate_junit_xml(&report).expect("xml generated");

        assert!(xml.contains(r#"<testsuites name="bluejay-run""#));
        assert!(xml.contains(r#"tests="4""#));
        assert!(xml.contains(r#"<testsuite name="login""#));
        assert!(xml.contains(r#"<testcase name="login[row 1]""#));
        assert!(xml.contains(r#"message="welcome text mismatch""#));
        assert!(xml.contains(r#"type="Timeout""#));
        assert!(xml.contains("<skipped"));
    }
}
