use std::path::PathBuf;

use thiserror::Error;

/// Failure reading or decoding a tabular data source.
///
/// Fatal to the whole run: the orchestrator materializes every row before
/// starting execution, so a malformed file never produces partial results.
#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("cannot read data source {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("data source {path} is missing a header row")]
    MissingHeader { path: PathBuf },

    #[error("data source {path}: row {row} has {found} columns, header declares {expected}")]
    RowWidth {
        path: PathBuf,
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("data source {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// The underlying browser engine could not produce a usable session.
///
/// Scoped to one test unit; the orchestrator decides whether to retry.
#[derive(Debug, Error)]
#[error("failed to acquire {browser} session: {reason}")]
pub struct SessionAcquisitionError {
    pub browser: String,
    pub reason: String,
}

/// A browser kind outside the supported set was requested.
#[derive(Debug, Error)]
#[error("browser '{0}' is not supported (expected chrome, firefox, edge or safari)")]
pub struct UnsupportedBrowserError(pub String);

/// Failure loading layered configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Error raised by a single scenario step.
///
/// The variant, not the message, decides how the outcome is classified:
/// `Assertion` becomes a FAILED outcome and is never retried, everything
/// else becomes ERRORED. Keeping the split at the type level means retry
/// policy cannot accidentally match on message text.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),

    #[error(transparent)]
    Engine(#[from] anyhow::Error),
}

impl StepError {
    pub fn assertion(msg: impl Into<String>) -> Self {
        StepError::Assertion(msg.into())
    }

    pub fn is_assertion(&self) -> bool {
        matches!(self, StepError::Assertion(_))
    }
}
