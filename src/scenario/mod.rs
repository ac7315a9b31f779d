//! Scenario model: YAML test scenarios expanded across data rows at run time.
//!
//! A scenario is a named sequence of steps over three capabilities: navigate,
//! interact, assert. Step strings may reference data-row columns with
//! `${column}` placeholders, substituted per unit before execution.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// One executable scenario document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Overrides the configured base URL for this scenario only.
    #[serde(default)]
    pub base_url: Option<String>,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_yaml(input: &str) -> Result<Self> {
        let scenario: Scenario =
            serde_yaml::from_str(input).context("failed to parse scenario YAML")?;
        Ok(scenario)
    }

    /// True when the scenario carries every requested tag.
    pub fn matches_tags(&self, required: &[String]) -> bool {
        required.iter().all(|t| self.tags.contains(t))
    }
}

/// Broad capability a step belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Navigate,
    Interact,
    Assert,
}

/// One scenario step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Step {
    /// Load a URL in the session.
    Navigate { url: String },
    /// Click the first element matching the selector.
    Click { selector: String },
    /// Type a value into the element matching the selector.
    Fill { selector: String, value: String },
    /// Wait for an element to appear, up to `timeout_ms` (defaults to the
    /// configured element timeout).
    WaitFor {
        selector: String,
        #[serde(default, rename = "timeoutMs")]
        timeout_ms: Option<u64>,
    },
    /// Unconditional pause.
    Pause { ms: u64 },
    AssertVisible { selector: String },
    AssertText { selector: String, equals: String },
    AssertTitle { equals: String },
    AssertUrl { contains: String },
}

impl Step {
    pub fn kind(&self) -> StepKind {
        match self {
            Step::Navigate { .. } => StepKind::Navigate,
            Step::Click { .. } | Step::Fill { .. } | Step::WaitFor { .. } | Step::Pause { .. } => {
                StepKind::Interact
            }
            Step::AssertVisible { .. }
            | Step::AssertText { .. }
            | Step::AssertTitle { .. }
            | Step::AssertUrl { .. } => StepKind::Assert,
        }
    }

    /// Short human label used in events and logs.
    pub fn display_name(&self) -> String {
        match self {
            Step::Navigate { url } => format!("navigate {}", url),
            Step::Click { selector } => format!("click {}", selector),
            Step::Fill { selector, .. } => format!("fill {}", selector),
            Step::WaitFor { selector, .. } => format!("waitFor {}", selector),
            Step::Pause { ms } => format!("pause {}ms", ms),
            Step::AssertVisible { selector } => format!("assertVisible {}", selector),
            Step::AssertText { selector, .. } => format!("assertText {}", selector),
            Step::AssertTitle { .. } => "assertTitle".to_string(),
            Step::AssertUrl { .. } => "assertUrl".to_string(),
        }
    }
}

/// Substitute `${name}` placeholders using the provided lookup.
///
/// Unknown names are left in place so a typo is visible in the failure
/// message rather than silently collapsing to an empty string.
pub fn interpolate(text: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let re = Regex::new(r"\$\{([A-Za-z0-9_.]+)\}").unwrap();
    re.replace_all(text, |caps: &regex::Captures| {
        let key = &caps[1];
        lookup(key).unwrap_or_else(|| format!("${{{}}}", key))
    })
    .to_string()
}

/// Collect scenarios from a single YAML file or a directory tree.
///
/// Directories are walked for `*.yaml`/`*.yml` in path order so expansion is
/// deterministic. When `tags` is given, scenarios missing any requested tag
/// are dropped before expansion.
pub fn discover(path: &Path, tags: Option<&[String]>) -> Result<Vec<Scenario>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if path.is_dir() {
        for entry in walkdir::WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let p = entry.path();
            let is_yaml = p
                .extension()
                .map_or(false, |ext| ext == "yaml" || ext == "yml");
            if is_yaml {
                files.push(p.to_path_buf());
            }
        }
    } else {
        files.push(path.to_path_buf());
    }

    let mut scenarios = Vec::new();
    for file in files {
        let raw = std::fs::read_to_string(&file)
            .with_context(|| format!("cannot read scenario file {}", file.display()))?;
        let scenario = Scenario::from_yaml(&raw)
            .with_context(|| format!("in scenario file {}", file.display()))?;

        if let Some(required) = tags {
            if !scenario.matches_tags(required) {
                log::debug!(
                    "skipping scenario '{}': missing one of tags {:?}",
                    scenario.name,
                    required
                );
                continue;
            }
        }
        scenarios.push(scenario);
    }
    Ok(scenarios)
}
