//! Time provider abstraction for polling loops and deadlines.
//!
//! Every suspension point in the harness goes through [`TimeProvider`], so
//! tests can shrink intervals to milliseconds without touching the
//! orchestration logic.

/// Core time provider trait and implementations
pub mod provider;

// Re-export main types
pub use provider::{TimeProvider, TokioTimeProvider};
