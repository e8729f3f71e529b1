//! Fingerprint-keyed entry table with TTL and LRU bookkeeping

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use super::fingerprint::Fingerprint;
use super::policy::CachePolicy;

/// Counters describing cache behavior since creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Calls answered from a stored result
    pub hits: u64,
    /// Calls that ran the wrapped function
    pub misses: u64,
    /// Entries dropped to respect the capacity bound
    pub evictions: u64,
    /// Entries dropped because their TTL ran out
    pub expirations: u64,
    /// Entries currently stored
    pub entries: usize,
}

#[derive(Debug)]
struct CacheEntry<V> {
    value: Arc<V>,
    inserted_at: Instant,
    /// Logical access time, higher is more recent
    last_access: u64,
}

#[derive(Debug)]
pub(crate) struct EntryTable<V> {
    entries: HashMap<Fingerprint, CacheEntry<V>>,
    tick: u64,
    stats: CacheStats,
}

impl<V> Default for EntryTable<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            tick: 0,
            stats: CacheStats::default(),
        }
    }
}

impl<V> EntryTable<V> {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Look up a live entry, counting a hit. Expired entries are removed.
    pub(crate) fn lookup(
        &mut self,
        fingerprint: &Fingerprint,
        now: Instant,
        policy: &CachePolicy,
    ) -> Option<Arc<V>> {
        let expired = match self.entries.get(fingerprint) {
            None => return None,
            Some(entry) => policy.is_expired(now.saturating_duration_since(entry.inserted_at)),
        };

        if expired {
            self.entries.remove(fingerprint);
            self.stats.expirations += 1;
            tracing::debug!(fingerprint = %fingerprint.short(), "Cache entry expired");
            return None;
        }

        let tick = self.next_tick();
        let entry = self.entries.get_mut(fingerprint)?;
        entry.last_access = tick;
        self.stats.hits += 1;
        Some(entry.value.clone())
    }

    pub(crate) fn record_miss(&mut self) {
        self.stats.misses += 1;
    }

    /// Store a freshly computed value, making room first if the table is full
    pub(crate) fn insert(
        &mut self,
        fingerprint: Fingerprint,
        value: Arc<V>,
        now: Instant,
        policy: &CachePolicy,
    ) {
        if let Some(capacity) = policy.max_entries {
            if !self.entries.contains_key(&fingerprint) && self.entries.len() >= capacity.get() {
                self.purge_expired(now, policy);
            }
            while !self.entries.contains_key(&fingerprint) && self.entries.len() >= capacity.get()
            {
                if !self.evict_least_recent() {
                    break;
                }
            }
        }

        let tick = self.next_tick();
        self.entries.insert(
            fingerprint,
            CacheEntry {
                value,
                inserted_at: now,
                last_access: tick,
            },
        );
    }

    fn evict_least_recent(&mut self) -> bool {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(fingerprint, _)| *fingerprint);

        match oldest {
            Some(fingerprint) => {
                self.entries.remove(&fingerprint);
                self.stats.evictions += 1;
                tracing::debug!(fingerprint = %fingerprint.short(), "Evicted least recently used cache entry");
                true
            }
            None => false,
        }
    }

    /// Drop every entry whose TTL has run out. Returns how many were dropped.
    pub(crate) fn purge_expired(&mut self, now: Instant, policy: &CachePolicy) -> usize {
        if policy.ttl.is_none() {
            return 0;
        }
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !policy.is_expired(now.saturating_duration_since(entry.inserted_at)));
        let purged = before - self.entries.len();
        self.stats.expirations += purged as u64;
        purged
    }

    pub(crate) fn remove(&mut self, fingerprint: &Fingerprint) -> bool {
        self.entries.remove(fingerprint).is_some()
    }

    pub(crate) fn clear(&mut self) -> usize {
        let cleared = self.entries.len();
        self.entries.clear();
        cleared
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            ..self.stats
        }
    }
}
