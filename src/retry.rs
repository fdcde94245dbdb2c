use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio_retry::strategy::FixedInterval;

/// Fixed-interval retry policy for the purchase funnel.
///
/// The "don't retry these kinds" rule is carried as a predicate, not as
/// exception clauses scattered through the funnel: an error for which
/// `give_up_on` returns true propagates immediately, everything else is
/// logged and retried until the attempt budget is exhausted. Fixed delays
/// are intentional; the attempt windows are short and bounded, so
/// exponential backoff buys nothing here.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Run `op` until it succeeds, fails definitively, or the budget runs
    /// out. On exhaustion the caller maps the outcome through `exhausted`
    /// (e.g. into `BuyError::CallFailed`).
    pub async fn run<T, E, F, Fut, P, X>(
        &self,
        what: &str,
        give_up_on: P,
        exhausted: X,
        mut op: F,
    ) -> Result<T, E>
    where
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        X: FnOnce(u32) -> E,
    {
        let mut delays = FixedInterval::new(self.delay);

        for attempt in 1..=self.max_attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if give_up_on(&e) => return Err(e),
                Err(e) => {
                    tracing::warn!(what, attempt, max = self.max_attempts, "attempt failed: {}", e);
                }
            }

            if attempt < self.max_attempts {
                if let Some(delay) = delays.next() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        tracing::error!(what, "max attempts reached ({})", self.max_attempts);
        Err(exhausted(self.max_attempts))
    }
}
