//! Single-document fetch strategies.
//!
//! Both archives are read through the same [`FetchStrategy`] seam so the
//! acquisition driver can run rounds without knowing how a page is obtained:
//!
//! | Strategy | Module | Session | Notes |
//! |----------|--------|---------|-------|
//! | HTTP | [`http`] | shared `reqwest::Client` | web.archive.org snapshots |
//! | Rendered | [`rendered`] | browser session | archive.today, gated by a bot challenge |
//!
//! Expected conditions (challenge pages, 429s, connection resets) are values
//! of [`FetchOutcome`], not errors. Only session setup can fail with an error.

pub mod chromium;
pub mod http;
pub mod rendered;

use crate::error::Result;
use crate::models::Source;
use std::fmt;

/// Why an item failed this round but stays pending for the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransientReason {
    /// TLS failure, connection reset, truncated transfer, navigation error.
    Network(String),
    /// The archive answered with its bot-verification page.
    ChallengeBlocked,
}

impl fmt::Display for TransientReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransientReason::Network(msg) => write!(f, "network: {msg}"),
            TransientReason::ChallengeBlocked => f.write_str("challenge page"),
        }
    }
}

/// Result of one fetch attempt. Only `Success` may be written to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success(Vec<u8>),
    TransientFailure(TransientReason),
    /// The server answered HTTP 429.
    RateLimited,
    /// Any other non-success answer; not retried within this invocation.
    PermanentFailure(String),
    /// No request could be built for the URL, so nothing was sent. Handled
    /// like [`FetchOutcome::PermanentFailure`] but is not a server answer.
    Unrequestable(String),
}

impl FetchOutcome {
    /// `true` when a server actually answered (used by the 429 streak counter).
    pub fn is_response(&self) -> bool {
        !matches!(
            self,
            FetchOutcome::TransientFailure(_) | FetchOutcome::Unrequestable(_)
        )
    }
}

/// A way of retrieving one document at a time within a session.
///
/// The driver owns the session exclusively and passes it into every call;
/// strategies keep no hidden state between calls.
pub trait FetchStrategy {
    type Session;

    fn source(&self) -> Source;

    /// Open the session for one round.
    async fn open_session(&self) -> Result<Self::Session>;

    async fn fetch(&self, session: &mut Self::Session, url: &str) -> FetchOutcome;

    /// Bring the session back to a usable state after a transient failure.
    async fn recover(&self, _session: &mut Self::Session) -> Result<()> {
        Ok(())
    }

    async fn close_session(&self, session: Self::Session);
}
