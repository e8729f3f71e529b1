//! Session lifecycle
//!
//! The [`SessionRegistry`] plays the host's part: it creates a session on
//! first contact, hands out [`SessionHandle`]s that run reruns against the
//! session's [`StateStore`](crate::state::StateStore), and drops sessions on
//! disconnect or after they sit idle too long.

mod id;
mod registry;

pub use id::SessionId;
pub use registry::{RerunContext, Session, SessionHandle, SessionRegistry};
