//! Shared test utilities for rerunkit
//!
//! - Call counters for observing how often a memoized body runs
//! - Isolated data directories and environment for driving the binary
