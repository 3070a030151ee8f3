//! Time provider implementations for harness polling and deadlines.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Provider trait for time operations.
///
/// Every polling loop suspends between attempts through `sleep`, and every
/// rendezvous carries a hard bound through `timeout`; there is no
/// unbounded wait anywhere in the harness.
#[async_trait]
pub trait TimeProvider: Clone + Send + Sync + 'static {
    /// Sleep for the specified duration.
    async fn sleep(&self, duration: Duration);

    /// Elapsed time since this provider was created.
    fn now(&self) -> Duration;

    /// Run a future with a timeout.
    ///
    /// Returns `Ok(result)` if the future completes within the timeout,
    /// or `Err(())` if it times out.
    async fn timeout<F, T>(&self, duration: Duration, future: F) -> Result<T, ()>
    where
        F: Future<Output = T> + Send;
}

/// Real time provider using Tokio's time facilities.
#[derive(Debug, Clone)]
pub struct TokioTimeProvider {
    /// Start time for calculating elapsed duration
    start_time: std::time::Instant,
}

impl TokioTimeProvider {
    /// Create a new Tokio time provider.
    pub fn new() -> Self {
        Self {
            start_time: std::time::Instant::now(),
        }
    }
}

impl Default for TokioTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TimeProvider for TokioTimeProvider {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn now(&self) -> Duration {
        self.start_time.elapsed()
    }

    async fn timeout<F, T>(&self, duration: Duration, future: F) -> Result<T, ()>
    where
        F: Future<Output = T> + Send,
    {
        match tokio::time::timeout(duration, future).await {
            Ok(result) => Ok(result),
            Err(_) => Err(()),
        }
    }
}
