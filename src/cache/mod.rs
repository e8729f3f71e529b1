//! Argument-keyed memoization
//!
//! - [`fingerprint`]: canonical argument encoding and hashing
//! - [`Memoized`]: a function wrapped together with its result cache
//! - [`CachePolicy`]: unbounded, TTL, LRU capacity, or both
//! - [`CacheRegistry`]: clear every registered cache at once

mod clock;
pub mod fingerprint;
mod memo;
mod policy;
mod registry;
mod table;

pub use clock::{Clock, ManualClock, SystemClock};
pub use fingerprint::{Fingerprint, UnhashableError};
pub use memo::{InvokeError, Memoized};
pub use policy::CachePolicy;
pub use registry::{CacheRegistry, ClearableCache};
pub use table::CacheStats;
