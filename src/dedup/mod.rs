// src/dedup/mod.rs
// DedupCache: short-TTL keyed store for webhook fingerprints and
// idempotency keys. In-memory rather than DB-backed: lookups are single-key
// operations with no compound transactions required, so a
// `parking_lot::Mutex` is used over a plain
// `std::sync::Mutex` for exactly this kind of short-critical-section shared
// state (see `api/ws/chat/heartbeat.rs`'s own `parking_lot::Mutex` over
// shared handler state). Also backs the ConversationCore hot window of
// recent turns.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::domain::ModuleKind;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// A process-local TTL cache. Not shared across replicas — acceptable since a
/// cache miss on a cold replica just falls through to the database's unique
/// constraint, which is the authoritative dedup mechanism.
pub struct DedupCache {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl DedupCache {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: Duration::from_secs(ttl_seconds),
        }
    }

    pub fn webhook_key(module: ModuleKind, external_id: &str, fingerprint: &str) -> String {
        format!("seen:{module}:{external_id}:{fingerprint}")
    }

    /// Probe for a key, returning whether it is present and unexpired.
    pub fn contains(&self, key: &str) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => true,
            Some(_) => {
                entries.remove(key);
                false
            }
            None => false,
        }
    }

    /// Mark a key as seen with the cache's configured TTL.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut entries = self.entries.lock();
        entries.insert(
            key.into(),
            Entry {
                value: value.into(),
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Sweep expired entries; run periodically from a maintenance loop
    /// rather than on every access, to bound memory without a per-get cost
    /// on the hot webhook path.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_contains_within_ttl() {
        let cache = DedupCache::new(600);
        let key = DedupCache::webhook_key(ModuleKind::Leads, "100200300", "abc123");
        assert!(!cache.contains(&key));
        cache.insert(&key, "1");
        assert!(cache.contains(&key));
    }

    #[test]
    fn sweep_removes_expired_entries() {
        let cache = DedupCache::new(0);
        cache.insert("k", "v");
        std::thread::sleep(Duration::from_millis(5));
        let removed = cache.sweep();
        assert_eq!(removed, 1);
        assert!(cache.is_empty());
    }
}
