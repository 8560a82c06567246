//! Feed synchronization engine.
//!
//! Pulls RSS/Atom sources, drops entries that are already stored and
//! persists the rest, one transaction per feed.
//!
//! # Architecture
//!
//! - [`cache`] - per-feed HTTP validators for conditional requests
//! - [`fetcher`] - HTTP retrieval with `If-None-Match`/`If-Modified-Since`
//! - [`parser`] - RSS/Atom parsing via `feed-rs` into normalized entries
//! - [`dedup`] - link-then-title duplicate detection
//! - [`ingest`] - entry → article conversion and insertion
//! - [`refresh`] - single-feed, per-collection and all-feeds refresh paths
//! - [`scheduler`] - background task running the sweep on a timer
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use suprss::feed::{build_client, spawn_scheduler, Refresher, RefreshSettings};
//!
//! let client = build_client("SUPRSS/1.0")?;
//! let refresher = Arc::new(Refresher::new(db, client, RefreshSettings::default()));
//!
//! // On demand
//! let outcome = refresher.refresh_feed(feed_id).await?;
//!
//! // Every ten minutes in the background
//! let scheduler = spawn_scheduler(refresher.clone(), Some(DEFAULT_SWEEP_INTERVAL));
//! ```

pub mod cache;
pub mod dedup;
pub mod fetcher;
pub mod ingest;
pub mod parser;
pub mod refresh;
pub mod scheduler;

pub use cache::{FetchCache, Validators};
pub use dedup::{DedupJudge, DedupPolicy};
pub use fetcher::{
    build_client, fetch_feed, FetchError, FetchOutcome, DEFAULT_FETCH_TIMEOUT, DEFAULT_USER_AGENT,
};
pub use ingest::{ingest, to_new_article, MAX_TITLE_CHARS};
pub use parser::{parse_feed, NormalizedEntry, UNTITLED};
pub use refresh::{RefreshError, RefreshOutcome, RefreshSettings, Refresher, SweepReport};
pub use scheduler::{spawn_scheduler, SchedulerHandle, DEFAULT_SWEEP_INTERVAL};
