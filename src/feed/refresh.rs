use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::feed::cache::FetchCache;
use crate::feed::dedup::{DedupJudge, DedupPolicy};
use crate::feed::fetcher::{fetch_feed, FetchError, FetchOutcome, DEFAULT_FETCH_TIMEOUT};
use crate::feed::ingest::ingest;
use crate::storage::{Database, Feed};

/// Errors surfaced by an on-demand refresh.
///
/// Distinct from `Ok(RefreshOutcome { inserted: 0 })`, which means the feed
/// was reachable and had nothing new.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("Feed {0} not found")]
    FeedNotFound(i64),
    #[error("Collection {0} not found")]
    CollectionNotFound(i64),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Fetch task failed: {0}")]
    Task(String),
}

fn database_error(e: anyhow::Error) -> RefreshError {
    RefreshError::Database(e.to_string())
}

/// Result of refreshing one feed or one collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshOutcome {
    pub inserted: usize,
}

/// Totals for one pass over many feeds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Feeds attempted
    pub feeds: usize,
    /// Feeds whose fetch or persistence failed
    pub failed: usize,
    /// Feeds answering 304
    pub not_modified: usize,
    /// Articles inserted across all feeds
    pub inserted: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct RefreshSettings {
    /// Bound on one whole fetch
    pub fetch_timeout: Duration,
    /// Feeds fetched in parallel during a sweep or collection refresh
    pub max_concurrent_fetches: usize,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            max_concurrent_fetches: 4,
        }
    }
}

/// How a refresh path treats the fetch cache and which dedup keys it uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshMode {
    /// Send cached validators, store new ones, dedup on link then title
    Conditional,
    /// Always download, never read or write the cache, dedup on link only
    Unconditional,
}

impl RefreshMode {
    fn uses_cache(self) -> bool {
        self == RefreshMode::Conditional
    }

    fn dedup_policy(self) -> DedupPolicy {
        match self {
            RefreshMode::Conditional => DedupPolicy::LinkOrTitle,
            RefreshMode::Unconditional => DedupPolicy::LinkOnly,
        }
    }
}

/// What happened to one feed that refreshed without error
enum FeedResult {
    NotModified,
    Inserted(usize),
}

/// Releases the sweep flag when dropped, including on panic
struct SweepGuard<'a>(&'a AtomicBool);

impl<'a> SweepGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SweepGuard(flag))
    }
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Refresh orchestrator: fetches feeds, filters duplicates and stores new
/// articles, one transaction per feed.
///
/// Shared between the scheduler task and on-demand callers behind an
/// `Arc`. Owns the [`FetchCache`] for the lifetime of the process.
pub struct Refresher {
    db: Database,
    client: reqwest::Client,
    cache: FetchCache,
    settings: RefreshSettings,
    sweeping: AtomicBool,
}

impl Refresher {
    pub fn new(db: Database, client: reqwest::Client, settings: RefreshSettings) -> Self {
        Self {
            db,
            client,
            cache: FetchCache::new(),
            settings,
            sweeping: AtomicBool::new(false),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn cache(&self) -> &FetchCache {
        &self.cache
    }

    /// Delete a feed and forget its cached validators.
    ///
    /// Returns `false` if the feed did not exist.
    pub async fn remove_feed(&self, feed_id: i64) -> Result<bool, RefreshError> {
        let removed = self.db.delete_feed(feed_id).await.map_err(database_error)?;
        self.cache.remove(feed_id);
        Ok(removed)
    }

    /// Delete a collection with all its feeds and forget their cached
    /// validators. Returns `false` if the collection did not exist.
    pub async fn remove_collection(&self, collection_id: i64) -> Result<bool, RefreshError> {
        let feeds = self
            .db
            .list_feeds_in_collection(collection_id)
            .await
            .map_err(database_error)?;
        let removed = self
            .db
            .delete_collection(collection_id)
            .await
            .map_err(database_error)?;
        for feed in &feeds {
            self.cache.remove(feed.id);
        }
        Ok(removed)
    }

    /// Whether a sweep is currently running
    pub fn is_sweeping(&self) -> bool {
        self.sweeping.load(Ordering::Acquire)
    }

    /// Refresh one feed on demand, using and updating the fetch cache.
    ///
    /// Returns `inserted: 0` without touching storage when the server
    /// answers 304. A fetch or storage failure is recorded on the feed and
    /// returned as an error.
    pub async fn refresh_feed(&self, feed_id: i64) -> Result<RefreshOutcome, RefreshError> {
        let feed = self
            .db
            .get_feed(feed_id)
            .await
            .map_err(database_error)?
            .ok_or(RefreshError::FeedNotFound(feed_id))?;

        let fetched = self
            .fetch(&feed, RefreshMode::Conditional)
            .await
            .map_err(RefreshError::from);
        match self.settle(&feed, fetched, RefreshMode::Conditional).await {
            Ok(FeedResult::NotModified) => Ok(RefreshOutcome { inserted: 0 }),
            Ok(FeedResult::Inserted(inserted)) => Ok(RefreshOutcome { inserted }),
            Err(e) => {
                self.record_failure(&feed, &e).await;
                Err(e)
            }
        }
    }

    /// Refresh every feed of a collection unconditionally.
    ///
    /// Ignores the fetch cache entirely and deduplicates on link only.
    /// Failing feeds are logged and skipped.
    pub async fn refresh_collection(
        &self,
        collection_id: i64,
    ) -> Result<RefreshOutcome, RefreshError> {
        self.db
            .get_collection(collection_id)
            .await
            .map_err(database_error)?
            .ok_or(RefreshError::CollectionNotFound(collection_id))?;

        let feeds = self
            .db
            .list_feeds_in_collection(collection_id)
            .await
            .map_err(database_error)?;

        let report = self.refresh_many(feeds, RefreshMode::Unconditional).await;
        tracing::info!(
            collection_id,
            feeds = report.feeds,
            failed = report.failed,
            inserted = report.inserted,
            "Collection refresh complete"
        );
        Ok(RefreshOutcome {
            inserted: report.inserted,
        })
    }

    /// Refresh every known feed, conditionally.
    ///
    /// Returns `None` without doing anything if another sweep is still
    /// running.
    pub async fn sweep(&self) -> Option<SweepReport> {
        let Some(_guard) = SweepGuard::acquire(&self.sweeping) else {
            tracing::debug!("Sweep already in progress, skipping");
            return None;
        };

        let feeds = match self.db.list_feeds().await {
            Ok(feeds) => feeds,
            Err(e) => {
                tracing::warn!(error = %e, "Sweep could not list feeds");
                return Some(SweepReport::default());
            }
        };

        let report = self.refresh_many(feeds, RefreshMode::Conditional).await;
        tracing::info!(
            feeds = report.feeds,
            failed = report.failed,
            not_modified = report.not_modified,
            inserted = report.inserted,
            "Sweep complete"
        );
        Some(report)
    }

    // Fetches run concurrently; results are persisted one at a time as they
    // arrive, so at most one write transaction is open.
    async fn refresh_many(&self, feeds: Vec<Feed>, mode: RefreshMode) -> SweepReport {
        let mut report = SweepReport {
            feeds: feeds.len(),
            ..SweepReport::default()
        };

        let mut fetches = stream::iter(feeds)
            .map(|feed| {
                let task = self.spawn_fetch(&feed, mode);
                async move {
                    let fetched = match task.await {
                        Ok(fetched) => fetched.map_err(RefreshError::from),
                        Err(e) => Err(RefreshError::Task(e.to_string())),
                    };
                    (feed, fetched)
                }
            })
            .buffer_unordered(self.settings.max_concurrent_fetches.max(1));

        while let Some((feed, fetched)) = fetches.next().await {
            match self.settle(&feed, fetched, mode).await {
                Ok(FeedResult::NotModified) => report.not_modified += 1,
                Ok(FeedResult::Inserted(n)) => report.inserted += n,
                Err(e) => {
                    report.failed += 1;
                    self.record_failure(&feed, &e).await;
                }
            }
        }

        report
    }

    async fn fetch(&self, feed: &Feed, mode: RefreshMode) -> Result<FetchOutcome, FetchError> {
        let cached = mode.uses_cache().then(|| self.cache.get(feed.id));
        fetch_feed(
            &self.client,
            &feed.url,
            cached.as_ref(),
            self.settings.fetch_timeout,
        )
        .await
    }

    // Runs on its own task: the fetch and its timeout keep going while the
    // loop in `refresh_many` is busy persisting an earlier feed.
    fn spawn_fetch(
        &self,
        feed: &Feed,
        mode: RefreshMode,
    ) -> JoinHandle<Result<FetchOutcome, FetchError>> {
        let client = self.client.clone();
        let url = feed.url.clone();
        let cached = mode.uses_cache().then(|| self.cache.get(feed.id));
        let timeout = self.settings.fetch_timeout;
        tokio::spawn(async move { fetch_feed(&client, &url, cached.as_ref(), timeout).await })
    }

    async fn settle(
        &self,
        feed: &Feed,
        fetched: Result<FetchOutcome, RefreshError>,
        mode: RefreshMode,
    ) -> Result<FeedResult, RefreshError> {
        match fetched? {
            FetchOutcome::NotModified { validators } => {
                tracing::debug!(feed_id = feed.id, "Feed not modified, skipping ingestion");
                if mode.uses_cache() {
                    self.cache.merge(feed.id, validators);
                }
                self.db
                    .mark_feed_fetched(feed.id)
                    .await
                    .map_err(database_error)?;
                Ok(FeedResult::NotModified)
            }
            FetchOutcome::Fetched {
                entries,
                validators,
            } => {
                let mut batch = self
                    .db
                    .begin_ingest(feed.id)
                    .await
                    .map_err(database_error)?;
                let mut judge = DedupJudge::new(mode.dedup_policy());

                for entry in &entries {
                    if judge
                        .is_duplicate(&mut batch, &entry.link, &entry.title)
                        .await
                        .map_err(database_error)?
                    {
                        continue;
                    }
                    ingest(&mut batch, entry).await.map_err(database_error)?;
                    judge.remember(&entry.link, &entry.title);
                }

                let inserted = batch.commit().await.map_err(database_error)?;
                if mode.uses_cache() {
                    self.cache.merge(feed.id, validators);
                }
                tracing::debug!(
                    feed_id = feed.id,
                    entries = entries.len(),
                    inserted,
                    "Feed refreshed"
                );
                Ok(FeedResult::Inserted(inserted))
            }
        }
    }

    async fn record_failure(&self, feed: &Feed, error: &RefreshError) {
        tracing::warn!(feed_id = feed.id, url = %feed.url, error = %error, "Feed refresh failed");
        if let Err(e) = self.db.set_feed_error(feed.id, Some(&error.to_string())).await {
            tracing::warn!(feed_id = feed.id, error = %e, "Failed to record feed error");
        }
    }
}
