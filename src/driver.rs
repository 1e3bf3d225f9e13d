//! Acquisition driver: resumable, rate-limited batch fetching.
//!
//! A batch is a set of [`WorkItem`]s fetched with one [`FetchStrategy`] into
//! one [`DocumentStore`]. The driver runs rounds until nothing is pending or
//! the retry budget is spent:
//!
//! ```text
//! RoundStart ── pending empty ─────────────▶ Done
//!     │       ── rounds >= max_rounds ─────▶ Exhausted
//!     ▼
//! SessionOpen ── open fails ───────────────▶ Aborted
//!     ▼
//! Iterate (ascending ID)
//!     │  Success          → store immediately
//!     │  TransientFailure → log, recover session, continue
//!     │  PermanentFailure → log, drop from this invocation
//!     │  Unrequestable    → same, without touching the 429 streak
//!     │  429 streak hit   ─────────────────▶ Aborted
//!     ▼
//! RoundEnd: close session, round += 1, back to RoundStart
//! ```
//!
//! Pendingness is always recomputed from the store, never from memory, so
//! re-running a batch resumes exactly where an earlier run stopped. Store
//! write failures are the only errors that escape a run.

use crate::error::Result;
use crate::fetch::{FetchOutcome, FetchStrategy};
use crate::models::WorkItem;
use crate::store::DocumentStore;
use crate::utils::{ERROR_MESSAGE_LIMIT, ErrorLog, truncate_for_log};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{info, instrument, warn};

/// Counts consecutive HTTP 429 answers across a whole batch.
///
/// Every 429 increments the streak, every other server answer resets it.
/// Transport failures carry no answer and leave it untouched.
#[derive(Debug, Clone)]
pub struct RateLimitTracker {
    consecutive: u32,
    threshold: u32,
}

impl RateLimitTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive: 0,
            threshold,
        }
    }

    /// Record an outcome; returns `true` once the streak reaches the threshold.
    pub fn observe(&mut self, outcome: &FetchOutcome) -> bool {
        match outcome {
            FetchOutcome::RateLimited => self.consecutive += 1,
            other if other.is_response() => self.consecutive = 0,
            _ => {}
        }
        self.tripped()
    }

    pub fn tripped(&self) -> bool {
        self.consecutive >= self.threshold
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Every requested item is in the store.
    Done,
    /// The retry budget ran out with items still pending.
    Exhausted,
    /// Sustained rate limiting or a session that could not be (re)opened.
    Aborted(String),
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Done => f.write_str("done"),
            Termination::Exhausted => f.write_str("exhausted"),
            Termination::Aborted(reason) => write!(f, "aborted ({reason})"),
        }
    }
}

/// Summary of one driver run.
#[derive(Debug, Clone)]
pub struct AcquisitionReport {
    pub termination: Termination,
    pub rounds: usize,
    /// Documents written during this run.
    pub stored: usize,
    /// Items not in the store when the run stopped (permanent failures included).
    pub pending: BTreeSet<String>,
    /// Items answered with a non-retryable status, with the reason.
    pub permanent_failures: BTreeMap<String, String>,
}

enum RoundEnd {
    Completed,
    Aborted(String),
}

/// Runs batches of work items against one strategy and one store.
///
/// Owns the 429 streak counter and the session of the current round; neither
/// outlives the driver.
pub struct AcquisitionDriver<'a, S: FetchStrategy, D: DocumentStore> {
    strategy: S,
    store: &'a D,
    error_log: Option<&'a ErrorLog>,
    max_rounds: usize,
    rate_limit: RateLimitTracker,
}

impl<'a, S: FetchStrategy, D: DocumentStore> AcquisitionDriver<'a, S, D> {
    pub fn new(strategy: S, store: &'a D, max_rounds: usize, rate_limit_threshold: u32) -> Self {
        Self {
            strategy,
            store,
            error_log: None,
            max_rounds,
            rate_limit: RateLimitTracker::new(rate_limit_threshold),
        }
    }

    /// Also append per-item failures to `log`.
    pub fn with_error_log(mut self, log: &'a ErrorLog) -> Self {
        self.error_log = Some(log);
        self
    }

    /// Compute the items of `requested` that are not stored yet, ascending by ID.
    pub fn pending(&self, requested: &[WorkItem]) -> Result<Vec<WorkItem>> {
        let known = self.store.list_known_ids()?;
        let mut pending: Vec<WorkItem> = requested
            .iter()
            .filter(|item| !known.contains(&item.id))
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.id.cmp(&b.id));
        pending.dedup_by(|a, b| a.id == b.id);
        Ok(pending)
    }

    /// Acquire every item of `requested` that is not stored yet.
    ///
    /// Runs rounds over the pending set until it is empty, the round budget is
    /// spent, or the batch aborts. Documents are stored as soon as they arrive,
    /// so an aborted or killed run keeps everything fetched so far.
    ///
    /// # Arguments
    ///
    /// * `requested` - The batch; duplicates and already stored items are skipped
    ///
    /// # Returns
    ///
    /// An [`AcquisitionReport`] whose `termination` is [`Termination::Done`],
    /// [`Termination::Exhausted`] or [`Termination::Aborted`]. Rate limiting and
    /// session failures end the run this way rather than as errors.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The store cannot be listed
    /// - A fetched document cannot be written ([`crate::error::CorpusError::StorageWrite`])
    #[instrument(level = "info", skip_all, fields(source = %self.strategy.source(), requested = requested.len()))]
    pub async fn run(&mut self, requested: &[WorkItem]) -> Result<AcquisitionReport> {
        let mut permanent_failures = BTreeMap::new();
        let mut stored = 0usize;
        let mut rounds = 0usize;

        let termination = loop {
            let pending: Vec<WorkItem> = self
                .pending(requested)?
                .into_iter()
                .filter(|item| !permanent_failures.contains_key(&item.id))
                .collect();

            if pending.is_empty() {
                break Termination::Done;
            }
            if rounds >= self.max_rounds {
                break Termination::Exhausted;
            }

            info!(round = rounds + 1, pending = pending.len(), "Starting round");
            let end = self
                .run_round(&pending, &mut stored, &mut permanent_failures)
                .await?;
            rounds += 1;

            if let RoundEnd::Aborted(reason) = end {
                break Termination::Aborted(reason);
            }
        };

        let pending: BTreeSet<String> = self
            .pending(requested)?
            .into_iter()
            .map(|item| item.id)
            .collect();

        match &termination {
            Termination::Done => info!(rounds, stored, "Batch complete"),
            Termination::Exhausted => warn!(
                rounds,
                stored,
                pending = pending.len(),
                "Retry budget spent; items remain pending"
            ),
            Termination::Aborted(reason) => warn!(
                rounds,
                stored,
                pending = pending.len(),
                %reason,
                "Batch aborted; partial results kept"
            ),
        }

        Ok(AcquisitionReport {
            termination,
            rounds,
            stored,
            pending,
            permanent_failures,
        })
    }

    async fn run_round(
        &mut self,
        pending: &[WorkItem],
        stored: &mut usize,
        permanent_failures: &mut BTreeMap<String, String>,
    ) -> Result<RoundEnd> {
        let mut session = match self.strategy.open_session().await {
            Ok(session) => session,
            Err(e) => return Ok(RoundEnd::Aborted(format!("session open failed: {e}"))),
        };

        let mut end = RoundEnd::Completed;
        for item in pending {
            let outcome = self.strategy.fetch(&mut session, &item.url).await;
            let tripped = self.rate_limit.observe(&outcome);

            match outcome {
                FetchOutcome::Success(content) => {
                    if let Err(e) = self.store.write(&item.id, &content) {
                        self.strategy.close_session(session).await;
                        return Err(e);
                    }
                    *stored += 1;
                    info!(id = %item.id, bytes = content.len(), "Stored document");
                }
                FetchOutcome::TransientFailure(reason) => {
                    self.record_failure(&item.id, &reason.to_string());
                    if let Err(e) = self.strategy.recover(&mut session).await {
                        end = RoundEnd::Aborted(format!("session recovery failed: {e}"));
                        break;
                    }
                }
                FetchOutcome::RateLimited => {
                    warn!(
                        id = %item.id,
                        consecutive = self.rate_limit.consecutive(),
                        "Rate limited"
                    );
                }
                FetchOutcome::PermanentFailure(reason) | FetchOutcome::Unrequestable(reason) => {
                    self.record_failure(&item.id, &reason);
                    permanent_failures.insert(item.id.clone(), reason);
                }
            }

            if tripped {
                end = RoundEnd::Aborted(format!(
                    "{} consecutive rate-limited responses",
                    self.rate_limit.consecutive()
                ));
                break;
            }
        }

        self.strategy.close_session(session).await;
        Ok(end)
    }

    fn record_failure(&self, id: &str, message: &str) {
        let source = self.strategy.source();
        warn!(
            %id,
            %source,
            error = %truncate_for_log(message, ERROR_MESSAGE_LIMIT),
            "Skipping for now"
        );
        if let Some(log) = self.error_log {
            if let Err(e) = log.append(source, id, message) {
                warn!(error = %e, "Failed to append to error log");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CHALLENGE_MARKER;
    use crate::fetch::http::HttpFetcher;
    use crate::fetch::rendered::RenderedFetcher;
    use crate::fetch::rendered::testing::{Page, ScriptedLauncher};
    use crate::store::FsDocumentStore;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http() -> HttpFetcher {
        HttpFetcher::new(Duration::from_secs(5), Duration::ZERO).unwrap()
    }

    fn items(server: &MockServer, ids: &[&str]) -> Vec<WorkItem> {
        ids.iter()
            .map(|id| WorkItem::new(*id, format!("{}/{id}", server.uri())))
            .collect()
    }

    #[test]
    fn test_rate_limit_tracker_streak() {
        let mut tracker = RateLimitTracker::new(3);
        assert!(!tracker.observe(&FetchOutcome::RateLimited));
        assert!(!tracker.observe(&FetchOutcome::RateLimited));
        // transport failures neither count nor reset
        assert!(!tracker.observe(&FetchOutcome::TransientFailure(
            crate::fetch::TransientReason::Network("reset".into())
        )));
        assert_eq!(tracker.consecutive(), 2);
        // nothing was sent for a malformed URL, so the streak stands
        assert!(!tracker.observe(&FetchOutcome::Unrequestable("empty host".into())));
        assert_eq!(tracker.consecutive(), 2);
        assert!(!tracker.observe(&FetchOutcome::PermanentFailure("HTTP 500".into())));
        assert_eq!(tracker.consecutive(), 0);
        tracker.observe(&FetchOutcome::RateLimited);
        tracker.observe(&FetchOutcome::RateLimited);
        assert!(tracker.observe(&FetchOutcome::RateLimited));
    }

    #[tokio::test]
    async fn test_idempotent_rerun() {
        let server = MockServer::start().await;
        for id in ["a", "b", "c"] {
            Mock::given(method("GET"))
                .and(path(format!("/{id}")))
                .respond_with(ResponseTemplate::new(200).set_body_string(format!("<p>{id}</p>")))
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/d"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::open(dir.path()).unwrap();
        let requested = items(&server, &["c", "a", "d", "b"]);

        let first = AcquisitionDriver::new(http(), &store, 5, 12)
            .run(&requested)
            .await
            .unwrap();
        let after_first = store.list_known_ids().unwrap();

        let second = AcquisitionDriver::new(http(), &store, 5, 12)
            .run(&requested)
            .await
            .unwrap();
        let after_second = store.list_known_ids().unwrap();

        assert_eq!(first.stored, 3);
        assert_eq!(first.termination, Termination::Done);
        assert_eq!(first.rounds, 1);
        assert!(first.permanent_failures.contains_key("d"));
        assert_eq!(after_first, after_second);
        assert_eq!(second.stored, 0);
        assert_eq!(store.read("b").unwrap(), b"<p>b</p>");
    }

    #[tokio::test]
    async fn test_rate_limit_trip_stops_fetching() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::open(dir.path()).unwrap();
        let ids: Vec<String> = (0..20).map(|i| format!("id{i:02}")).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let requested = items(&server, &id_refs);

        let report = AcquisitionDriver::new(http(), &store, 5, 12)
            .run(&requested)
            .await
            .unwrap();

        assert!(matches!(report.termination, Termination::Aborted(_)));
        assert_eq!(report.rounds, 1);
        assert_eq!(report.pending.len(), 20);
        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 12);
        assert!(store.list_known_ids().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_429_answer_resets_streak() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/id05"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::open(dir.path()).unwrap();
        let ids: Vec<String> = (0..10).map(|i| format!("id{i:02}")).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let requested = items(&server, &id_refs);

        let report = AcquisitionDriver::new(http(), &store, 1, 6)
            .run(&requested)
            .await
            .unwrap();

        // 5 x 429, a 200, then 4 x 429: the streak never reaches 6
        assert_eq!(report.termination, Termination::Exhausted);
        assert_eq!(report.stored, 1);
        assert_eq!(server.received_requests().await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_challenge_page_retried_next_round() {
        let challenge = format!("<html>{DEFAULT_CHALLENGE_MARKER}</html>");
        let launcher = ScriptedLauncher::default()
            .with_page(
                "https://archive.ph/a",
                vec![Page::Body(challenge), Page::Body("<p>real a</p>".into())],
            )
            .with_page("https://archive.ph/b", vec![Page::Body("<p>real b</p>".into())]);
        let log = launcher.log.clone();
        let fetcher = RenderedFetcher::new(launcher, DEFAULT_CHALLENGE_MARKER, Duration::ZERO);

        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::open(dir.path()).unwrap();
        let requested = vec![
            WorkItem::new("a", "https://archive.ph/a"),
            WorkItem::new("b", "https://archive.ph/b"),
        ];

        let mut driver = AcquisitionDriver::new(fetcher, &store, 5, 12);
        let report = driver.run(&requested).await.unwrap();

        assert_eq!(report.termination, Termination::Done);
        assert_eq!(report.rounds, 2);
        assert_eq!(store.read("a").unwrap(), b"<p>real a</p>");

        let log = log.borrow();
        // a (challenge), b, then a again in round two
        assert_eq!(
            log.visits,
            vec!["https://archive.ph/a", "https://archive.ph/b", "https://archive.ph/a"]
        );
        // one session per round plus one reset after the challenge
        assert_eq!(log.launched, 3);
        assert_eq!(log.launched, log.closed);
    }

    /// Store that remembers every known-ID listing the driver asked for.
    struct RecordingStore {
        inner: FsDocumentStore,
        listings: std::cell::RefCell<Vec<BTreeSet<String>>>,
    }

    impl DocumentStore for RecordingStore {
        fn exists(&self, id: &str) -> bool {
            self.inner.exists(id)
        }

        fn write(&self, id: &str, content: &[u8]) -> Result<()> {
            self.inner.write(id, content)
        }

        fn list_known_ids(&self) -> Result<BTreeSet<String>> {
            let known = self.inner.list_known_ids()?;
            self.listings.borrow_mut().push(known.clone());
            Ok(known)
        }
    }

    #[tokio::test]
    async fn test_exhausted_keeps_pending_and_shrinks_monotonically() {
        let launcher = ScriptedLauncher::default()
            .with_page(
                "https://archive.ph/a",
                vec![Page::Error("reset".into()), Page::Body("<p>a</p>".into())],
            )
            .with_page("https://archive.ph/b", vec![Page::Error("reset".into())])
            .with_page("https://archive.ph/c", vec![Page::Body("<p>c</p>".into())]);
        let fetcher = RenderedFetcher::new(launcher, DEFAULT_CHALLENGE_MARKER, Duration::ZERO);

        let dir = tempfile::tempdir().unwrap();
        let store = RecordingStore {
            inner: FsDocumentStore::open(dir.path().join("docs")).unwrap(),
            listings: Default::default(),
        };
        let requested = vec![
            WorkItem::new("a", "https://archive.ph/a"),
            WorkItem::new("b", "https://archive.ph/b"),
            WorkItem::new("c", "https://archive.ph/c"),
        ];
        let error_log = ErrorLog::new(dir.path().join("error.log"));

        let mut driver = AcquisitionDriver::new(fetcher, &store, 3, 12).with_error_log(&error_log);
        let report = driver.run(&requested).await.unwrap();

        assert_eq!(report.termination, Termination::Exhausted);
        assert_eq!(report.rounds, 3);
        assert_eq!(report.pending, BTreeSet::from(["b".to_string()]));

        let pending_sets: Vec<BTreeSet<&str>> = store
            .listings
            .borrow()
            .iter()
            .map(|known| {
                requested
                    .iter()
                    .map(|item| item.id.as_str())
                    .filter(|id| !known.contains(*id))
                    .collect()
            })
            .collect();
        // one listing per round start, the budget check and the final report
        assert_eq!(
            pending_sets,
            vec![
                BTreeSet::from(["a", "b", "c"]),
                BTreeSet::from(["a", "b"]),
                BTreeSet::from(["b"]),
                BTreeSet::from(["b"]),
                BTreeSet::from(["b"]),
            ]
        );
        let permanent: BTreeSet<&str> = report.permanent_failures.keys().map(String::as_str).collect();
        for pair in pending_sets.windows(2) {
            let allowed: BTreeSet<&str> = pair[0].union(&permanent).copied().collect();
            assert!(pair[1].is_subset(&allowed));
        }

        let logged = std::fs::read_to_string(dir.path().join("error.log")).unwrap();
        assert_eq!(logged.lines().count(), 4);
    }

    #[tokio::test]
    async fn test_storage_failure_is_fatal() {
        let launcher = ScriptedLauncher::default()
            .with_page("https://archive.ph/a", vec![Page::Body("<p>a</p>".into())]);
        let fetcher = RenderedFetcher::new(launcher, DEFAULT_CHALLENGE_MARKER, Duration::ZERO);

        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::open(dir.path()).unwrap();
        std::fs::create_dir(store.path_for("a")).unwrap();
        let requested = vec![WorkItem::new("a", "https://archive.ph/a")];

        let mut driver = AcquisitionDriver::new(fetcher, &store, 5, 12);
        let err = driver.run(&requested).await.unwrap_err();
        assert!(matches!(err, crate::error::CorpusError::StorageWrite { .. }));
    }
}
