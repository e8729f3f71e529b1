//! Cache eviction policy

use std::num::NonZeroUsize;
use std::time::Duration;

/// How long memoized results stay valid and how many are kept.
///
/// The default is unbounded: entries live until cleared. That keeps cached
/// results correct but lets memory grow with the number of distinct
/// arguments, so long-running hosts should set a TTL or a capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CachePolicy {
    /// Entries older than this (since insertion) are treated as misses
    pub ttl: Option<Duration>,
    /// Least-recently-used entries are evicted beyond this many
    pub max_entries: Option<NonZeroUsize>,
}

impl CachePolicy {
    pub const fn unbounded() -> Self {
        Self {
            ttl: None,
            max_entries: None,
        }
    }

    pub const fn ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            max_entries: None,
        }
    }

    pub const fn lru(capacity: NonZeroUsize) -> Self {
        Self {
            ttl: None,
            max_entries: Some(capacity),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_max_entries(mut self, capacity: NonZeroUsize) -> Self {
        self.max_entries = Some(capacity);
        self
    }

    pub fn is_unbounded(&self) -> bool {
        self.ttl.is_none() && self.max_entries.is_none()
    }

    /// Whether an entry inserted `age` ago has outlived the TTL
    pub fn is_expired(&self, age: Duration) -> bool {
        self.ttl.is_some_and(|ttl| age >= ttl)
    }
}
