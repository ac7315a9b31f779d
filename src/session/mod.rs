//! Session manager: owns the lifecycle of browser automation sessions.
//!
//! A [`SessionHandle`] is exclusively owned by the worker that acquired it and
//! is never shared across concurrent test units. `release` is idempotent and
//! awaits engine teardown, so resources are reclaimed before it returns on
//! every exit path.

pub mod backend;
pub mod playwright;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SessionAcquisitionError, UnsupportedBrowserError};
use backend::{BrowserSession, SessionBackend};

/// Supported browser engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    Chrome,
    Firefox,
    Edge,
    Safari,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chrome => "chrome",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Edge => "edge",
            BrowserKind::Safari => "safari",
        }
    }
}

impl std::fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BrowserKind {
    type Err = UnsupportedBrowserError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chrome" | "chromium" => Ok(BrowserKind::Chrome),
            "firefox" => Ok(BrowserKind::Firefox),
            "edge" => Ok(BrowserKind::Edge),
            "safari" | "webkit" => Ok(BrowserKind::Safari),
            other => Err(UnsupportedBrowserError(other.to_string())),
        }
    }
}

/// Everything a backend needs to start one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub browser: BrowserKind,
    pub headless: bool,
    /// Implicit wait budget for element lookups inside the session.
    pub timeout_ms: u64,
    /// Engine-specific options passed through verbatim.
    pub extra_capabilities: HashMap<String, String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            browser: BrowserKind::Chrome,
            headless: true,
            timeout_ms: 10_000,
            extra_capabilities: HashMap::new(),
        }
    }
}

/// Exclusive handle to one live session.
pub struct SessionHandle {
    id: Uuid,
    browser: BrowserKind,
    created_at: DateTime<Utc>,
    tainted: bool,
    session: Option<Box<dyn BrowserSession>>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("browser", &self.browser)
            .field("created_at", &self.created_at)
            .field("tainted", &self.tainted)
            .field("alive", &self.session.is_some())
            .finish()
    }
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn browser(&self) -> BrowserKind {
        self.browser
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_alive(&self) -> bool {
        self.session.is_some()
    }

    /// Mark the session as no longer trustworthy (set after a unit timeout).
    /// A tainted handle must be released and never handed to another unit.
    pub fn taint(&mut self) {
        self.tainted = true;
    }

    pub fn is_tainted(&self) -> bool {
        self.tainted
    }

    pub fn session(&self) -> Option<&dyn BrowserSession> {
        self.session.as_deref()
    }
}

/// Creates and tears down sessions through a [`SessionBackend`].
#[derive(Clone)]
pub struct SessionManager {
    backend: Arc<dyn SessionBackend>,
    active: Arc<AtomicUsize>,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn SessionBackend>) -> Self {
        Self {
            backend,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Acquire a fully configured, ready session.
    ///
    /// Engine start failures surface as [`SessionAcquisitionError`]; retrying
    /// is the orchestrator's decision, never done here.
    pub async fn acquire(
        &self,
        config: &SessionConfig,
    ) -> Result<SessionHandle, SessionAcquisitionError> {
        let session = self.backend.launch(config).await?;
        self.active.fetch_add(1, Ordering::SeqCst);
        let handle = SessionHandle {
            id: Uuid::new_v4(),
            browser: config.browser,
            created_at: Utc::now(),
            tainted: false,
            session: Some(session),
        };
        log::debug!("acquired session {} ({})", handle.id, handle.browser);
        Ok(handle)
    }

    /// Release a handle, awaiting engine teardown.
    ///
    /// Idempotent: releasing twice, or releasing an already-dead handle, is a
    /// no-op. Teardown failures are logged, not propagated, so a release is
    /// safe on every exit path.
    pub async fn release(&self, handle: &mut SessionHandle) {
        if let Some(mut session) = handle.session.take() {
            if let Err(e) = session.close().await {
                log::warn!("session {} teardown failed: {e:#}", handle.id);
            }
            self.active.fetch_sub(1, Ordering::SeqCst);
            log::debug!("released session {}", handle.id);
        }
    }

    /// Number of currently live sessions (instrumentation for the
    /// exclusivity property).
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}
