//! Browser-backed fetch strategy for archive.today snapshots.
//!
//! archive.today only serves snapshots to something that looks like a browser
//! and answers suspicious clients with a CAPTCHA page. Each fetch navigates a
//! browser session (script execution disabled) to the snapshot and reads the
//! rendered page source:
//!
//! - body contains the challenge marker: [`TransientReason::ChallengeBlocked`]
//! - navigation or read error: [`TransientReason::Network`]
//! - otherwise: [`FetchOutcome::Success`]
//!
//! Every attempt, successful or not, is followed by a fixed pause. After any
//! failure the driver calls [`FetchStrategy::recover`], which replaces the
//! browser session with a fresh one.

use super::{FetchOutcome, FetchStrategy, TransientReason};
use crate::error::Result;
use crate::models::Source;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

/// Starts browser sessions.
pub trait BrowserLauncher {
    type Session: BrowserSession;

    async fn launch(&self) -> Result<Self::Session>;
}

/// An open browser session.
pub trait BrowserSession {
    /// Navigate to `url` and return the rendered page source.
    async fn page_source(&mut self, url: &str) -> Result<String>;

    async fn close(self);
}

/// Whether a page body is the archive's bot-verification page.
pub fn is_challenge_blocked(body: &str, marker: &str) -> bool {
    body.contains(marker)
}

/// Rendered [`FetchStrategy`] over any [`BrowserLauncher`].
#[derive(Debug)]
pub struct RenderedFetcher<L> {
    launcher: L,
    challenge_marker: String,
    delay: Duration,
}

impl<L: BrowserLauncher> RenderedFetcher<L> {
    /// `delay` is the minimum pause after every fetch attempt.
    pub fn new(launcher: L, challenge_marker: impl Into<String>, delay: Duration) -> Self {
        Self {
            launcher,
            challenge_marker: challenge_marker.into(),
            delay,
        }
    }
}

impl<L: BrowserLauncher> FetchStrategy for RenderedFetcher<L> {
    type Session = L::Session;

    fn source(&self) -> Source {
        Source::Rendered
    }

    async fn open_session(&self) -> Result<L::Session> {
        let session = self.launcher.launch().await?;
        info!("Browser session opened");
        Ok(session)
    }

    #[instrument(level = "debug", skip(self, session))]
    async fn fetch(&self, session: &mut L::Session, url: &str) -> FetchOutcome {
        let outcome = match session.page_source(url).await {
            Ok(body) if is_challenge_blocked(&body, &self.challenge_marker) => {
                FetchOutcome::TransientFailure(TransientReason::ChallengeBlocked)
            }
            Ok(body) => FetchOutcome::Success(body.into_bytes()),
            Err(e) => FetchOutcome::TransientFailure(TransientReason::Network(e.to_string())),
        };
        sleep(self.delay).await;
        outcome
    }

    async fn recover(&self, session: &mut L::Session) -> Result<()> {
        warn!("Resetting browser session");
        let fresh = self.launcher.launch().await?;
        let stale = std::mem::replace(session, fresh);
        stale.close().await;
        Ok(())
    }

    async fn close_session(&self, session: L::Session) {
        session.close().await;
        info!("Browser session closed");
    }
}
