use std::path::Path;

use anyhow::Result;

use super::types::RunReport;

/// Render the report as pretty JSON to a file or stdout.
pub async fn generate(report: &RunReport, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;

    if let Some(path) = output {
        std::fs::write(path, json)?;
        println!("JSON report saved to: {}", path.display());
    } else {
        println!("{}", json);
    }

    Ok(())
}

/// Write `report.json` into the run directory.
pub fn write_report(report: &RunReport, output_dir: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    let path = output_dir.join("report.json");
    std::fs::write(&path, json)?;
    log::info!("wrote JSON report: {}", path.display());
    Ok(())
}
