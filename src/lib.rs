pub mod cache;
pub mod config;
pub mod demo;
pub mod session;
pub mod state;
pub mod util;

pub use cache::{
    CachePolicy, CacheRegistry, CacheStats, Fingerprint, InvokeError, Memoized, UnhashableError,
};
pub use config::{Config, ConfigError, SessionConfig};
pub use session::{RerunContext, SessionHandle, SessionId, SessionRegistry};
pub use state::{StateError, StateStore};
