//! Layered runner configuration.
//!
//! Sources, lowest priority first:
//! 1. built-in defaults
//! 2. `default.yaml` in the config directory, if present
//! 3. `<env>.yaml` in the config directory, where `<env>` comes from
//!    `BLUEJAY_ENV`
//! 4. `BLUEJAY_*` environment variables
//!
//! CLI flags override all of these at the call site. Missing files are fine;
//! a present-but-malformed file is an error. Unparseable scalar overrides
//! keep the prior value and log the problem instead of failing the run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::session::BrowserKind;

const ENV_PREFIX: &str = "BLUEJAY_";

#[derive(Debug, Clone)]
pub struct Config {
    /// Application under test; feeds `${base_url}` interpolation.
    pub base_url: Option<String>,
    pub browser: BrowserKind,
    pub headless: bool,
    /// Implicit element wait budget (ms).
    pub timeout_ms: u64,
    /// Hard per-unit budget (ms).
    pub unit_timeout_ms: u64,
    /// Extra attempts for retryable unit errors.
    pub retry_count: u32,
    /// Backoff between attempts (ms).
    pub retry_delay_ms: u64,
    pub concurrency: usize,
    pub output_dir: PathBuf,
    /// Engine-specific options passed through to session acquisition.
    pub extra_capabilities: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: None,
            browser: BrowserKind::Chrome,
            headless: false,
            timeout_ms: 10_000,
            unit_timeout_ms: 60_000,
            retry_count: 0,
            retry_delay_ms: 1_000,
            concurrency: 1,
            output_dir: PathBuf::from("output"),
            extra_capabilities: HashMap::new(),
        }
    }
}

/// What a config file may set; everything optional so files can be partial.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ConfigFile {
    base_url: Option<String>,
    browser: Option<String>,
    headless: Option<bool>,
    timeout_ms: Option<u64>,
    unit_timeout_ms: Option<u64>,
    retry_count: Option<u32>,
    retry_delay_ms: Option<u64>,
    concurrency: Option<usize>,
    output_dir: Option<PathBuf>,
    extra_capabilities: Option<HashMap<String, String>>,
}

impl Config {
    /// Load the full layer stack.
    pub fn load(config_dir: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(dir) = config_dir {
            config.apply_file_if_present(&dir.join("default.yaml"))?;

            let env_name = std::env::var(format!("{ENV_PREFIX}ENV"))
                .unwrap_or_else(|_| "default".to_string())
                .to_lowercase();
            if env_name != "default" {
                config.apply_file_if_present(&dir.join(format!("{env_name}.yaml")))?;
            }
        }

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_file_if_present(&mut self, path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            return Ok(());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file: ConfigFile = serde_yaml::from_str(&raw).map_err(|e| ConfigError::Malformed {
            path: path.to_path_buf(),
            source: e,
        })?;
        self.apply_file(file, path);
        Ok(())
    }

    fn apply_file(&mut self, file: ConfigFile, path: &Path) {
        if let Some(v) = file.base_url {
            self.base_url = Some(v);
        }
        if let Some(v) = file.browser {
            match v.parse() {
                Ok(kind) => self.browser = kind,
                Err(e) => log::error!("{}: {e}, keeping {}", path.display(), self.browser),
            }
        }
        if let Some(v) = file.headless {
            self.headless = v;
        }
        if let Some(v) = file.timeout_ms {
            self.timeout_ms = v;
        }
        if let Some(v) = file.unit_timeout_ms {
            self.unit_timeout_ms = v;
        }
        if let Some(v) = file.retry_count {
            self.retry_count = v;
        }
        if let Some(v) = file.retry_delay_ms {
            self.retry_delay_ms = v;
        }
        if let Some(v) = file.concurrency {
            self.concurrency = v.max(1);
        }
        if let Some(v) = file.output_dir {
            self.output_dir = v;
        }
        if let Some(v) = file.extra_capabilities {
            self.extra_capabilities.extend(v);
        }
    }

    /// Apply `BLUEJAY_*` overrides through an injectable lookup so the layer
    /// can be tested without touching process state.
    fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get("BLUEJAY_BASE_URL") {
            self.base_url = Some(v);
        }
        if let Some(v) = get("BLUEJAY_BROWSER") {
            match v.parse() {
                Ok(kind) => self.browser = kind,
                Err(e) => log::error!("BLUEJAY_BROWSER: {e}, keeping {}", self.browser),
            }
        }
        if let Some(v) = get("BLUEJAY_HEADLESS") {
            self.headless = v == "true" || v == "1";
        }
        self.apply_env_u64(&get, "BLUEJAY_TIMEOUT_MS", |c, v| c.timeout_ms = v);
        self.apply_env_u64(&get, "BLUEJAY_UNIT_TIMEOUT_MS", |c, v| c.unit_timeout_ms = v);
        self.apply_env_u64(&get, "BLUEJAY_RETRY_DELAY_MS", |c, v| c.retry_delay_ms = v);
        if let Some(v) = get("BLUEJAY_RETRY_COUNT") {
            match v.parse() {
                Ok(n) => self.retry_count = n,
                Err(_) => log::error!("invalid BLUEJAY_RETRY_COUNT '{v}', keeping {}", self.retry_count),
            }
        }
        if let Some(v) = get("BLUEJAY_CONCURRENCY") {
            match v.parse::<usize>() {
                Ok(n) => self.concurrency = n.max(1),
                Err(_) => log::error!("invalid BLUEJAY_CONCURRENCY '{v}', keeping {}", self.concurrency),
            }
        }
        if let Some(v) = get("BLUEJAY_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
    }

    fn apply_env_u64(
        &mut self,
        get: impl Fn(&str) -> Option<String>,
        key: &str,
        set: impl Fn(&mut Self, u64),
    ) {
        if let Some(v) = get(key) {
            match v.parse() {
                Ok(n) => set(self, n),
                Err(_) => log::error!("invalid {key} '{v}', keeping default"),
            }
        }
    }
}
