//! Feed synchronization and deduplication engine for a shared RSS
//! aggregator.
//!
//! - [`storage`] - SQLite store for collections, feeds, articles and flags
//! - [`feed`] - conditional fetching, dedup, ingestion and the sweep scheduler
//! - [`config`] - TOML configuration
//! - [`util`] - text and URL helpers

pub mod config;
pub mod feed;
pub mod storage;
pub mod util;
