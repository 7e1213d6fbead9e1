//! # Battle Test Utilities
//!
//! Shared testing utilities for the battle crates:
//! - Determinism test harness
//! - Layout and session fixtures
//! - Property-based testing strategies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod determinism;
pub mod fixtures;

/// Re-export proptest for convenience.
pub use proptest;
