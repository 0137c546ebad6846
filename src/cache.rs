//! Time-bounded snapshots of databases.
//!
//! `TreeCache` maps a uid to the last document read from or written to the backend,
//! together with the instant it was stored. An entry answers reads only while it is
//! younger than the cache's TTL; after that the engine reloads from the backend.
//!
//! Timestamps come from `tokio::time::Instant`, so expiry follows tokio's clock and can
//! be driven with a paused clock in tests.

use crate::data::Document;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct CacheEntry {
    tree: Document,
    last_update: Instant,
}

/// Per-uid document cache with a fixed time-to-live.
#[derive(Debug)]
pub struct TreeCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl TreeCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns a copy of the cached document for `uid` if it has not expired.
    pub fn get(&self, uid: &str) -> Option<Document> {
        let entries = self.lock();
        let entry = entries.get(uid)?;
        if entry.last_update.elapsed() < self.ttl {
            Some(entry.tree.clone())
        } else {
            None
        }
    }

    /// Stores `tree` for `uid` and restarts its TTL.
    pub fn insert(&self, uid: &str, tree: Document) {
        self.lock().insert(
            uid.to_string(),
            CacheEntry {
                tree,
                last_update: Instant::now(),
            },
        );
    }

    /// Drops the entry for `uid`. Returns true if there was one.
    pub fn invalidate(&self, uid: &str) -> bool {
        self.lock().remove(uid).is_some()
    }

    /// Number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // The map holds plain data, so a panic elsewhere cannot leave it inconsistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
