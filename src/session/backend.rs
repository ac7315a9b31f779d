//! The seam between the orchestration layer and the browser engine.
//!
//! Everything below this trait boundary (driver binaries, protocol plumbing,
//! element lookup) belongs to the engine. The runner only sees a live
//! [`BrowserSession`] with the narrow capability set scenarios exercise.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::error::SessionAcquisitionError;
use crate::session::SessionConfig;

/// A live, exclusively-owned browser automation session.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Load a URL.
    async fn goto(&self, url: &str) -> Result<()>;

    /// Click the first element matching a CSS selector.
    async fn click(&self, selector: &str) -> Result<()>;

    /// Replace the value of the element matching a CSS selector.
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    /// Whether a matching element is currently visible.
    async fn is_visible(&self, selector: &str) -> Result<bool>;

    /// Wait up to `timeout_ms` for a matching element to appear.
    ///
    /// Returns false on timeout rather than erroring; the caller decides
    /// whether absence is a failure.
    async fn wait_for(&self, selector: &str, timeout_ms: u64) -> Result<bool>;

    /// Text content (or input value) of the first matching element.
    async fn text_of(&self, selector: &str) -> Result<String>;

    async fn title(&self) -> Result<String>;

    async fn current_url(&self) -> Result<String>;

    /// Write a screenshot of the current viewport to `path`.
    async fn screenshot(&self, path: &Path) -> Result<()>;

    /// Tear the session down, reclaiming engine resources.
    async fn close(&mut self) -> Result<()>;
}

/// Launches sessions for one engine family.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Start a session that is fully configured and ready for use on return.
    async fn launch(
        &self,
        config: &SessionConfig,
    ) -> Result<Box<dyn BrowserSession>, SessionAcquisitionError>;
}
