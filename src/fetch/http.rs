//! Plain HTTP fetch strategy for web.archive.org snapshots.
//!
//! Stateless per call; every call of a batch shares one connection pool. The
//! response status decides the outcome:
//!
//! - `200` is [`FetchOutcome::Success`]
//! - `429` is [`FetchOutcome::RateLimited`] (the driver counts the streak)
//! - anything else is [`FetchOutcome::PermanentFailure`] and is never stored
//! - a URL no request can be built for is [`FetchOutcome::Unrequestable`]
//!
//! Transport failures (TLS, reset, truncated body) are transient.

use super::{FetchOutcome, FetchStrategy, TransientReason};
use crate::error::{CorpusError, Result};
use crate::models::Source;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, instrument};

const USER_AGENT: &str = concat!("syac_corpus/", env!("CARGO_PKG_VERSION"));

/// HTTP [`FetchStrategy`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    delay: Duration,
}

impl HttpFetcher {
    /// Build the shared client. `delay` is slept after every attempt.
    pub fn new(timeout: Duration, delay: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| CorpusError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, delay })
    }
}

impl FetchStrategy for HttpFetcher {
    type Session = Client;

    fn source(&self) -> Source {
        Source::Http
    }

    async fn open_session(&self) -> Result<Client> {
        Ok(self.client.clone())
    }

    #[instrument(level = "debug", skip(self, session))]
    async fn fetch(&self, session: &mut Client, url: &str) -> FetchOutcome {
        let outcome = get(session, url).await;
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        outcome
    }

    async fn close_session(&self, _session: Client) {}
}

async fn get(client: &Client, url: &str) -> FetchOutcome {
    let response = match client.get(url).send().await {
        Ok(response) => response,
        // A URL reqwest refuses to build a request for will never succeed.
        Err(e) if e.is_builder() => return FetchOutcome::Unrequestable(e.to_string()),
        Err(e) => return FetchOutcome::TransientFailure(TransientReason::Network(e.to_string())),
    };

    let status = response.status();
    debug!(%status, "Response received");
    match status {
        StatusCode::OK => match response.bytes().await {
            Ok(body) => FetchOutcome::Success(body.to_vec()),
            Err(e) => FetchOutcome::TransientFailure(TransientReason::Network(format!(
                "truncated body: {e}"
            ))),
        },
        StatusCode::TOO_MANY_REQUESTS => FetchOutcome::RateLimited,
        other => FetchOutcome::PermanentFailure(format!("HTTP {}", other.as_u16())),
    }
}
