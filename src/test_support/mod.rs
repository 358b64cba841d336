//! Shared fixtures for drydock unit tests.
//!
//! Everything here materializes under a [`tempfile::TempDir`], so tests
//! never read from or write to the real checkout. The module is only
//! compiled for tests.

pub mod fixtures;

// Re-export fixtures for convenience
pub use fixtures::*;
