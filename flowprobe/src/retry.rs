//! Budgeted polling for eventually consistent collaborator queries.

use std::fmt::Display;
use std::future::Future;

use crate::config::RetryBudget;
use crate::time::TimeProvider;

/// Drive `attempt` until it yields a value or the budget is exhausted.
///
/// The attempt contract:
/// - `Ok(Some(value))`: the awaited condition holds; polling stops and no
///   further sleep is performed.
/// - `Ok(None)`: the collaborator answered but the condition does not
///   hold yet; retried after the budget interval.
/// - `Err(_)`: a transient query failure; logged and retried, never
///   aborting the loop.
///
/// Only exhausting the attempt budget is terminal, and it returns `None`
/// so the caller surfaces its own domain-specific timeout error; an
/// exhausted budget is never folded into a default value.
pub async fn poll_until<T, E, F, Fut, Tm>(
    budget: &RetryBudget,
    time: &Tm,
    what: &str,
    mut attempt: F,
) -> Option<T>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    Tm: TimeProvider,
{
    for attempt_no in 1..=budget.max_attempts {
        match attempt().await {
            Ok(Some(value)) => {
                tracing::debug!("{what}: ready on attempt {attempt_no}");
                return Some(value);
            }
            Ok(None) => {
                tracing::debug!(
                    "{what}: not ready (attempt {attempt_no}/{})",
                    budget.max_attempts
                );
            }
            Err(err) => {
                tracing::warn!("{what}: transient query failure on attempt {attempt_no}: {err}");
            }
        }
        if attempt_no < budget.max_attempts {
            time.sleep(budget.interval).await;
        }
    }
    tracing::warn!(
        "{what}: budget exhausted after {} attempts",
        budget.max_attempts
    );
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::TokioTimeProvider;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn tight_budget(max_attempts: u32) -> RetryBudget {
        RetryBudget::new(max_attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn stops_polling_after_the_first_hit() {
        let time = TokioTimeProvider::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in_attempt = calls.clone();

        let found = poll_until(&tight_budget(20), &time, "value", move || {
            let calls = calls_in_attempt.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok::<_, String>((n == 3).then_some(n))
            }
        })
        .await;

        assert_eq!(found, Some(3));
        // No further polling once the value was observed.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_returns_none_after_exactly_max_attempts() {
        let time = TokioTimeProvider::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in_attempt = calls.clone();

        let found: Option<u32> = poll_until(&tight_budget(4), &time, "never", move || {
            let calls = calls_in_attempt.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(None)
            }
        })
        .await;

        assert_eq!(found, None);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn transient_failures_do_not_abort_the_loop() {
        let time = TokioTimeProvider::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in_attempt = calls.clone();

        let found = poll_until(&tight_budget(5), &time, "flaky", move || {
            let calls = calls_in_attempt.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err("collaborator hiccup".to_string())
                } else {
                    Ok(Some("ready"))
                }
            }
        })
        .await;

        assert_eq!(found, Some("ready"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
