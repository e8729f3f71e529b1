//! Rerun-persistent keyed state
//!
//! A [`StateStore`] belongs to exactly one session and keeps its entries
//! across reruns of that session's script.

mod store;

pub use store::{StateError, StateStore};
