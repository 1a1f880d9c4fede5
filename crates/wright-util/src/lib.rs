//! Shared utilities for wright.
//!
//! This crate provides cross-cutting concerns used by the other wright crates:
//! the error taxonomy, bounded retry with backoff for flaky collaborators,
//! and terminal status output.

pub mod errors;
pub mod progress;
pub mod retry;
