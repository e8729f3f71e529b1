//! Memoized function wrapper
//!
//! [`Memoized`] owns a function and the cache of its results. Each call
//! fingerprints the function identity plus the arguments; a stored result
//! for that fingerprint is returned without running the function again.
//!
//! A cache hit suppresses the function body entirely. Anything the body
//! does besides computing its result (logging, counting, printing) happens
//! only on misses.

use std::any::type_name;
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use super::clock::{Clock, SystemClock};
use super::fingerprint::{fingerprint, Fingerprint, UnhashableError};
use super::policy::CachePolicy;
use super::table::{CacheStats, EntryTable};

/// Error returned by [`Memoized::invoke`]
#[derive(Error, Debug)]
pub enum InvokeError<E> {
    /// The arguments could not be fingerprinted; the function did not run
    #[error(transparent)]
    Unhashable(#[from] UnhashableError),
    /// The wrapped function failed. Nothing was cached.
    #[error("{0}")]
    Failed(E),
}

impl<E> InvokeError<E> {
    pub fn is_unhashable(&self) -> bool {
        matches!(self, InvokeError::Unhashable(_))
    }

    /// The wrapped function's own error, if that is what failed
    pub fn into_failure(self) -> Option<E> {
        match self {
            InvokeError::Failed(err) => Some(err),
            InvokeError::Unhashable(_) => None,
        }
    }
}

type InFlightSlots = HashMap<Fingerprint, InFlight>;

/// Computation lock for one fingerprint and the number of callers using it
struct InFlight {
    lock: Arc<Mutex<()>>,
    holders: usize,
}

/// A function paired with its result cache.
///
/// The wrapper is `Sync` and may be shared across threads and sessions.
/// Concurrent calls with the same fingerprint run the function at most once
/// at a time; the others wait and then read the stored result. The function
/// must not call back into the same wrapper with the same arguments.
pub struct Memoized<A: ?Sized, V, E = Infallible> {
    name: String,
    identity: String,
    func: Box<dyn Fn(&A) -> Result<V, E> + Send + Sync>,
    policy: CachePolicy,
    clock: Arc<dyn Clock>,
    table: Mutex<EntryTable<V>>,
    in_flight: Mutex<InFlightSlots>,
}

/// Identity used in fingerprints: the caller's name plus the function type
fn identity_of<F>(name: &str) -> String {
    format!("{}@{}", name, type_name::<F>())
}

impl<A, V, E> Memoized<A, V, E>
where
    A: Serialize + ?Sized,
{
    /// Wrap a fallible function. Failures are returned to the caller and
    /// never cached.
    ///
    /// `name` is part of every fingerprint, so each wrapped function needs
    /// its own name. Closures defined in the same scope share a type name and
    /// are told apart only by it.
    ///
    /// Unordered sets are fingerprinted in iteration order, so equal
    /// `HashSet` arguments may miss each other. Take a `BTreeSet` instead.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&A) -> Result<V, E> + Send + Sync + 'static,
    {
        let name = name.into();
        let identity = identity_of::<F>(&name);
        Self::from_parts(name, identity, Box::new(func))
    }

    fn from_parts(
        name: String,
        identity: String,
        func: Box<dyn Fn(&A) -> Result<V, E> + Send + Sync>,
    ) -> Self {
        Self {
            name,
            identity,
            func,
            policy: CachePolicy::default(),
            clock: Arc::new(SystemClock),
            table: Mutex::new(EntryTable::default()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Fingerprint these arguments would be cached under
    pub fn fingerprint(&self, args: &A) -> Result<Fingerprint, UnhashableError> {
        fingerprint(&self.identity, args)
    }

    /// Call through the cache, sharing the stored instance.
    ///
    /// Every hit hands out the same `Arc`, which suits results that are
    /// expensive resources rather than plain data.
    pub fn invoke_shared(&self, args: &A) -> Result<Arc<V>, InvokeError<E>> {
        let fingerprint = self.fingerprint(args)?;

        if let Some(hit) = self.lookup(&fingerprint) {
            return Ok(hit);
        }

        let slot = self.claim_slot(&fingerprint);
        let _computing = slot.lock();

        // Another caller may have stored the result while we waited
        if let Some(hit) = self.lookup(&fingerprint) {
            return Ok(hit);
        }

        self.table.lock().record_miss();
        tracing::debug!(
            function = %self.name,
            fingerprint = %fingerprint.short(),
            "Cache miss, running function"
        );

        match (self.func)(args) {
            Ok(value) => {
                let value = Arc::new(value);
                self.table.lock().insert(
                    fingerprint,
                    value.clone(),
                    self.clock.now(),
                    &self.policy,
                );
                Ok(value)
            }
            Err(err) => {
                tracing::debug!(
                    function = %self.name,
                    fingerprint = %fingerprint.short(),
                    "Function failed, result not cached"
                );
                Err(InvokeError::Failed(err))
            }
        }
    }

    /// Remove the cached result for `args`. Returns whether one existed.
    pub fn invalidate(&self, args: &A) -> Result<bool, UnhashableError> {
        let fingerprint = self.fingerprint(args)?;
        Ok(self.table.lock().remove(&fingerprint))
    }

    /// Drop every cached result. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let cleared = self.table.lock().clear();
        tracing::debug!(function = %self.name, cleared, "Cache cleared");
        cleared
    }

    /// Drop results whose TTL has run out
    pub fn purge_expired(&self) -> usize {
        self.table
            .lock()
            .purge_expired(self.clock.now(), &self.policy)
    }

    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.table.lock().stats()
    }

    fn lookup(&self, fingerprint: &Fingerprint) -> Option<Arc<V>> {
        let hit = self
            .table
            .lock()
            .lookup(fingerprint, self.clock.now(), &self.policy);
        if hit.is_some() {
            tracing::debug!(
                function = %self.name,
                fingerprint = %fingerprint.short(),
                "Cache hit"
            );
        }
        hit
    }

    fn claim_slot(&self, fingerprint: &Fingerprint) -> SlotGuard<'_> {
        let mut slots = self.in_flight.lock();
        let entry = slots.entry(*fingerprint).or_insert_with(|| InFlight {
            lock: Arc::new(Mutex::new(())),
            holders: 0,
        });
        entry.holders += 1;
        SlotGuard {
            slots: &self.in_flight,
            fingerprint: *fingerprint,
            lock: entry.lock.clone(),
        }
    }
}

impl<A, V, E> Memoized<A, V, E>
where
    A: Serialize + ?Sized,
    V: Clone,
{
    /// Call through the cache, returning an owned copy of the result
    pub fn invoke(&self, args: &A) -> Result<V, InvokeError<E>> {
        self.invoke_shared(args).map(|value| V::clone(&value))
    }
}

impl<A, V> Memoized<A, V, Infallible>
where
    A: Serialize + ?Sized,
{
    /// Wrap a function that cannot fail
    pub fn infallible<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&A) -> V + Send + Sync + 'static,
    {
        let name = name.into();
        let identity = identity_of::<F>(&name);
        Self::from_parts(
            name,
            identity,
            Box::new(move |args: &A| -> Result<V, Infallible> { Ok(func(args)) }),
        )
    }
}

impl<A: ?Sized, V, E> fmt::Debug for Memoized<A, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("entries", &self.table.lock().len())
            .finish()
    }
}

/// Claim on a fingerprint's computation lock. The in-flight entry is removed
/// when the last claim is dropped.
struct SlotGuard<'a> {
    slots: &'a Mutex<InFlightSlots>,
    fingerprint: Fingerprint,
    lock: Arc<Mutex<()>>,
}

impl SlotGuard<'_> {
    fn lock(&self) -> parking_lot::MutexGuard<'_, ()> {
        self.lock.lock()
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let mut slots = self.slots.lock();
        if let Some(entry) = slots.get_mut(&self.fingerprint) {
            entry.holders = entry.holders.saturating_sub(1);
            if entry.holders == 0 {
                slots.remove(&self.fingerprint);
            }
        }
    }
}
