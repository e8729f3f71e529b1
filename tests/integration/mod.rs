//! Integration tests for rerunkit
//!
//! These tests verify that multiple components work together correctly.

#[path = "../common/mod.rs"]
pub mod common;

pub mod cli;
pub mod memo_flow;
pub mod rerun_flow;
