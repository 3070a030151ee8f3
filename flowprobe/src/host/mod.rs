//! Host runtime capability layer.
//!
//! Trait-based access to the container runtime that stands in external
//! gateway hosts, with a real `docker`-backed implementation and an
//! in-memory fake for harness self-tests.

/// Real implementation driving the `docker` CLI
pub mod docker;

/// In-memory fake implementation for testing
pub mod fake;

/// Core host runtime capability trait
pub mod traits;

// Re-export main trait
pub use traits::HostRuntime;

// Re-export implementations
pub use docker::{DockerRuntime, HOST_IMAGE};
pub use fake::FakeHostRuntime;
