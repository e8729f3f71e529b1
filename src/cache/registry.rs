//! Registry of live caches for clear-everything operations

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;

use super::memo::Memoized;

/// A cache that can be emptied without knowing its argument or value types
pub trait ClearableCache: Send + Sync {
    fn cache_name(&self) -> &str;

    /// Drop every entry, returning how many were dropped
    fn clear_entries(&self) -> usize;
}

impl<A, V, E> ClearableCache for Memoized<A, V, E>
where
    A: Serialize + ?Sized,
    V: Send + Sync,
{
    fn cache_name(&self) -> &str {
        self.name()
    }

    fn clear_entries(&self) -> usize {
        self.clear()
    }
}

/// Weakly tracks caches so they can all be cleared at once.
///
/// Registration does not keep a cache alive; dropped caches are pruned on
/// the next sweep.
#[derive(Default)]
pub struct CacheRegistry {
    caches: Mutex<Vec<Weak<dyn ClearableCache>>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C>(&self, cache: &Arc<C>)
    where
        C: ClearableCache + 'static,
    {
        let cache: Arc<dyn ClearableCache> = cache.clone();
        tracing::debug!(cache = %cache.cache_name(), "Registered cache");
        self.caches.lock().push(Arc::downgrade(&cache));
    }

    /// Clear every live cache. Returns the number of caches cleared.
    pub fn clear_all(&self) -> usize {
        let live = self.live();
        let mut entries = 0;
        for cache in &live {
            entries += cache.clear_entries();
        }
        tracing::info!(caches = live.len(), entries, "Cleared all caches");
        live.len()
    }

    /// Number of registered caches still alive
    pub fn len(&self) -> usize {
        self.live().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live(&self) -> Vec<Arc<dyn ClearableCache>> {
        let mut caches = self.caches.lock();
        caches.retain(|weak| weak.strong_count() > 0);
        caches.iter().filter_map(Weak::upgrade).collect()
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("caches", &self.caches.lock().len())
            .finish()
    }
}
