use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// HTTP cache validators last seen for one feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validators {
    /// Value of the last `ETag` response header, sent back as `If-None-Match`
    pub etag: Option<String>,
    /// Last `Last-Modified` value in IMF-fixdate form, sent back as `If-Modified-Since`
    pub last_modified: Option<String>,
}

impl Validators {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }

    /// Fold a newer observation into this one.
    ///
    /// A value present in `newer` replaces the stored one; an absent value
    /// never erases what was already known.
    pub fn merge(&mut self, newer: Validators) {
        if newer.etag.is_some() {
            self.etag = newer.etag;
        }
        if newer.last_modified.is_some() {
            self.last_modified = newer.last_modified;
        }
    }
}

/// Process-lifetime map of feed ID → [`Validators`].
///
/// Cloning yields another handle to the same map. Shared between the
/// scheduled sweep and on-demand refreshes; each write is a re-derivation
/// of remote server state, so last-writer-wins per feed is acceptable.
/// Nothing is persisted: after a restart every feed gets one unconditional
/// fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchCache {
    entries: Arc<Mutex<HashMap<i64, Validators>>>,
}

impl FetchCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validators for a feed; empty if the feed has never yielded any
    pub fn get(&self, feed_id: i64) -> Validators {
        self.lock().get(&feed_id).cloned().unwrap_or_default()
    }

    /// Replace the validators stored for a feed
    pub fn put(&self, feed_id: i64, validators: Validators) {
        self.lock().insert(feed_id, validators);
    }

    /// Merge newly observed validators into the entry for a feed.
    ///
    /// An observation with no validators leaves the map untouched.
    pub fn merge(&self, feed_id: i64, validators: Validators) {
        if validators.is_empty() {
            return;
        }
        self.lock().entry(feed_id).or_default().merge(validators);
    }

    pub fn remove(&self, feed_id: i64) -> Option<Validators> {
        self.lock().remove(&feed_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // Critical sections never await or panic midway, so a poisoned map is
    // still consistent.
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<i64, Validators>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
