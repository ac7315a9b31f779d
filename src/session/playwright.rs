//! Playwright-backed session backend.
//!
//! Engine binaries are resolved by Playwright's own driver bundle, outside
//! this crate, and are assumed present by the time `launch` is called. The
//! four supported browser kinds collapse onto Playwright's three engines:
//! Chrome and Edge run on Chromium, Safari on WebKit.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use playwright::api::{Browser, BrowserContext, Page, Viewport};
use playwright::Playwright;

use crate::error::SessionAcquisitionError;
use crate::session::backend::{BrowserSession, SessionBackend};
use crate::session::{BrowserKind, SessionConfig};

const VIEWPORT_WIDTH: i32 = 1280;
const VIEWPORT_HEIGHT: i32 = 720;

/// Launches one Playwright browser per session.
#[derive(Debug, Default)]
pub struct PlaywrightBackend;

impl PlaywrightBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SessionBackend for PlaywrightBackend {
    async fn launch(
        &self,
        config: &SessionConfig,
    ) -> Result<Box<dyn BrowserSession>, SessionAcquisitionError> {
        match start_session(config).await {
            Ok(session) => Ok(Box::new(session)),
            Err(e) => Err(SessionAcquisitionError {
                browser: config.browser.to_string(),
                reason: format!("{e:#}"),
            }),
        }
    }
}

async fn start_session(config: &SessionConfig) -> Result<PlaywrightSession> {
    let playwright = Playwright::initialize()
        .await
        .context("failed to initialize Playwright")?;

    let browser = match config.browser {
        BrowserKind::Chrome | BrowserKind::Edge => {
            let chromium = playwright.chromium();
            let mut launcher = chromium.launcher().headless(config.headless);
            // Engine-specific options ride along as Chromium switches.
            let args: Vec<String> = config
                .extra_capabilities
                .iter()
                .map(|(k, v)| {
                    if v.is_empty() {
                        format!("--{k}")
                    } else {
                        format!("--{k}={v}")
                    }
                })
                .collect();
            if !args.is_empty() {
                launcher = launcher.args(&args);
            }
            launcher.launch().await.context("chromium failed to start")?
        }
        BrowserKind::Firefox => {
            if !config.extra_capabilities.is_empty() {
                log::debug!("extra capabilities are ignored for firefox sessions");
            }
            playwright
                .firefox()
                .launcher()
                .headless(config.headless)
                .launch()
                .await
                .context("firefox failed to start")?
        }
        BrowserKind::Safari => {
            if !config.extra_capabilities.is_empty() {
                log::debug!("extra capabilities are ignored for webkit sessions");
            }
            playwright
                .webkit()
                .launcher()
                .headless(config.headless)
                .launch()
                .await
                .context("webkit failed to start")?
        }
    };

    let context = browser
        .context_builder()
        .build()
        .await
        .context("failed to create browser context")?;
    let page = context.new_page().await.context("failed to open page")?;

    page.set_viewport_size(Viewport {
        width: VIEWPORT_WIDTH,
        height: VIEWPORT_HEIGHT,
    })
    .await
    .context("failed to size viewport")?;

    Ok(PlaywrightSession {
        _playwright: playwright,
        browser,
        _context: context,
        page,
    })
}

struct PlaywrightSession {
    // Keeps the driver process alive for the lifetime of the session.
    _playwright: Playwright,
    browser: Browser,
    _context: BrowserContext,
    page: Page,
}

#[async_trait]
impl BrowserSession for PlaywrightSession {
    async fn goto(&self, url: &str) -> Result<()> {
        self.page
            .goto_builder(url)
            .goto()
            .await
            .with_context(|| format!("failed to navigate to {url}"))?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.page
            .click_builder(selector)
            .click()
            .await
            .with_context(|| format!("failed to click '{selector}'"))?;
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let element = self
            .page
            .query_selector(selector)
            .await?
            .with_context(|| format!("no element matches '{selector}'"))?;
        element
            .fill_builder(value)
            .fill()
            .await
            .with_context(|| format!("failed to fill '{selector}'"))?;
        Ok(())
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        match self.page.query_selector(selector).await? {
            Some(el) => Ok(el.is_visible().await?),
            None => Ok(false),
        }
    }

    async fn wait_for(&self, selector: &str, timeout_ms: u64) -> Result<bool> {
        let result = self
            .page
            .wait_for_selector_builder(selector)
            .timeout(timeout_ms as f64)
            .wait_for_selector()
            .await;
        Ok(result.is_ok())
    }

    async fn text_of(&self, selector: &str) -> Result<String> {
        let js = "el => el.value || el.innerText || el.textContent || ''";
        match self
            .page
            .evaluate_on_selector::<String, _>(selector, js, None::<String>)
            .await
        {
            Ok(text) => Ok(text),
            Err(_) => Ok(String::new()),
        }
    }

    async fn title(&self) -> Result<String> {
        let title: String = self.page.evaluate("() => document.title", ()).await?;
        Ok(title)
    }

    async fn current_url(&self) -> Result<String> {
        let url: String = self
            .page
            .evaluate("() => window.location.href", ())
            .await?;
        Ok(url)
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.page
            .screenshot_builder()
            .path(path.to_path_buf())
            .screenshot()
            .await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.browser.close().await?;
        Ok(())
    }
}
