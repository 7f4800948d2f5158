//! # Simcast Test Utilities
//!
//! Shared testing utilities for all crates:
//! - Determinism test harness
//! - Ability and unit fixtures
//! - Test logging setup
//! - Property-based testing strategies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod determinism;
pub mod fixtures;
pub mod logging;

/// Re-export proptest for convenience.
pub use proptest;
