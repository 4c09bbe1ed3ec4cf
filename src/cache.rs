//! Response cache with TTL expiry and write-order eviction.
//!
//! Eviction is by write timestamp, not access: a hot entry written early is
//! still the first to go once the cache is over capacity.

use std::collections::HashMap;
use std::sync::Arc;

use crate::types::ContextResponse;

#[derive(Debug, Clone)]
struct CacheEntry {
    response: Arc<ContextResponse>,
    written_at_ms: i64,
    expires_at_ms: i64,
}

#[derive(Debug)]
pub struct ResponseCache {
    entries: HashMap<String, CacheEntry>,
    ttl_ms: i64,
    max_entries: usize,
}

/// A fresh cache hit.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub response: Arc<ContextResponse>,
    /// Milliseconds since the entry was written.
    pub age_ms: i64,
}

impl ResponseCache {
    pub fn new(ttl_ms: i64, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl_ms,
            max_entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the entry if it has not expired at `now_ms`.
    pub fn get(&self, key: &str, now_ms: i64) -> Option<CacheHit> {
        let entry = self.entries.get(key)?;
        if entry.expires_at_ms <= now_ms {
            return None;
        }
        Some(CacheHit {
            response: entry.response.clone(),
            age_ms: (now_ms - entry.written_at_ms).max(0),
        })
    }

    pub fn insert(&mut self, key: String, response: Arc<ContextResponse>, now_ms: i64) {
        self.entries.insert(
            key,
            CacheEntry {
                response,
                written_at_ms: now_ms,
                expires_at_ms: now_ms + self.ttl_ms,
            },
        );
    }

    /// Drops expired entries, then evicts the oldest writes until the cache
    /// is within `max_entries`. Returns the number of entries removed.
    pub fn prune(&mut self, now_ms: i64) -> usize {
        if self.is_empty() {
            return 0;
        }
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at_ms > now_ms);

        if self.entries.len() > self.max_entries {
            let excess = self.entries.len() - self.max_entries;
            let mut by_age: Vec<(i64, String)> = self
                .entries
                .iter()
                .map(|(k, e)| (e.written_at_ms, k.clone()))
                .collect();
            by_age.sort();
            for (_, key) in by_age.into_iter().take(excess) {
                self.entries.remove(&key);
            }
        }

        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
