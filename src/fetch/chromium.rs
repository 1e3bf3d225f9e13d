//! Chromium browser sessions via chromiumoxide.

use super::rendered::{BrowserLauncher, BrowserSession};
use crate::error::{CorpusError, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetScriptExecutionDisabledParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Launches headless Chromium with page scripts disabled.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    executable: Option<PathBuf>,
    navigation_timeout: Duration,
}

impl ChromiumLauncher {
    /// `executable` overrides chromiumoxide's own browser lookup.
    pub fn new(executable: Option<PathBuf>, navigation_timeout: Duration) -> Self {
        Self {
            executable,
            navigation_timeout,
        }
    }
}

impl BrowserLauncher for ChromiumLauncher {
    type Session = ChromiumSession;

    async fn launch(&self) -> Result<ChromiumSession> {
        let mut builder = BrowserConfig::builder()
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking");
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| CorpusError::Browser(format!("failed to build browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| CorpusError::Browser(format!("failed to launch Chromium: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser handler event error");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| CorpusError::Browser(format!("failed to open page: {e}")))?;
        page.execute(SetScriptExecutionDisabledParams::new(true))
            .await
            .map_err(|e| CorpusError::Browser(format!("failed to disable scripts: {e}")))?;

        Ok(ChromiumSession {
            browser,
            page,
            handler,
            navigation_timeout: self.navigation_timeout,
        })
    }
}

/// Run a whole page load (navigation, settling and the source read) under one deadline.
async fn bounded<T>(limit: Duration, load: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(limit, load).await.unwrap_or_else(|_| {
        Err(CorpusError::Browser(format!(
            "page load timed out after {}ms",
            limit.as_millis()
        )))
    })
}

/// One Chromium process with a single tab.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    navigation_timeout: Duration,
}

impl BrowserSession for ChromiumSession {
    async fn page_source(&mut self, url: &str) -> Result<String> {
        let page = &self.page;
        let load = async {
            page.goto(url)
                .await
                .map_err(|e| CorpusError::Browser(format!("navigation failed: {e}")))?;
            page.wait_for_navigation()
                .await
                .map_err(|e| CorpusError::Browser(format!("page load failed: {e}")))?;
            page.content()
                .await
                .map_err(|e| CorpusError::Browser(format!("failed to read page source: {e}")))
        };
        bounded(self.navigation_timeout, load).await
    }

    async fn close(mut self) {
        let _ = self.page.close().await;
        if let Err(e) = self.browser.close().await {
            debug!(error = %e, "Browser close failed");
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
    }
}
