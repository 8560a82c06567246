use anyhow::Result;
use std::collections::HashSet;

use crate::feed::ingest::MAX_TITLE_CHARS;
use crate::storage::IngestBatch;
use crate::util::truncate_chars;

/// Which keys identify an already-known entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupPolicy {
    /// Exact link first, then truncated title. Used by single-feed refresh
    /// and the scheduled sweep.
    LinkOrTitle,
    /// Exact link only. Used by the interactive per-collection refresh.
    LinkOnly,
}

/// Decides, entry by entry, whether a feed entry is already stored.
///
/// One judge lives for one feed's batch. Besides querying storage it
/// remembers the keys of entries accepted earlier in the batch, so an entry
/// repeated within a single fetch is ingested once. Link-less entries are
/// keyed by their truncated title under both policies.
#[derive(Debug)]
pub struct DedupJudge {
    policy: DedupPolicy,
    seen_links: HashSet<String>,
    seen_titles: HashSet<String>,
    seen_linkless_titles: HashSet<String>,
}

impl DedupJudge {
    pub fn new(policy: DedupPolicy) -> Self {
        Self {
            policy,
            seen_links: HashSet::new(),
            seen_titles: HashSet::new(),
            seen_linkless_titles: HashSet::new(),
        }
    }

    /// Returns `true` when the entry should be skipped.
    ///
    /// 1. A stored article of the feed has exactly this link (the empty
    ///    link included), or an earlier entry of this batch had this
    ///    non-empty link. An empty link also matches an earlier link-less
    ///    entry of this batch with the same truncated title.
    /// 2. Under [`DedupPolicy::LinkOrTitle`], for a non-empty title: a
    ///    stored article or an earlier entry has the same title once
    ///    truncated to [`MAX_TITLE_CHARS`].
    pub async fn is_duplicate(
        &self,
        batch: &mut IngestBatch,
        link: &str,
        title: &str,
    ) -> Result<bool> {
        if link.is_empty() {
            let title = truncate_chars(title, MAX_TITLE_CHARS);
            if self.seen_linkless_titles.contains(title.as_ref()) {
                return Ok(true);
            }
        } else if self.seen_links.contains(link) {
            return Ok(true);
        }
        if batch.find_by_link(link).await?.is_some() {
            return Ok(true);
        }

        if self.policy == DedupPolicy::LinkOnly || title.is_empty() {
            return Ok(false);
        }

        let title = truncate_chars(title, MAX_TITLE_CHARS);
        if self.seen_titles.contains(title.as_ref()) {
            return Ok(true);
        }
        Ok(batch.find_by_title(&title).await?.is_some())
    }

    /// Record an entry that was accepted into the batch
    pub fn remember(&mut self, link: &str, title: &str) {
        if link.is_empty() {
            self.seen_linkless_titles
                .insert(truncate_chars(title, MAX_TITLE_CHARS).into_owned());
        } else {
            self.seen_links.insert(link.to_string());
        }
        if self.policy == DedupPolicy::LinkOrTitle && !title.is_empty() {
            self.seen_titles
                .insert(truncate_chars(title, MAX_TITLE_CHARS).into_owned());
        }
    }
}
