//! Retrying idempotent GitHub reads.
//!
//! A webhook delivery has about ten seconds before GitHub gives up on it, so
//! reads made while handling one get a short doubling schedule: two retries,
//! 250 ms and 500 ms apart. Comment posts never come through here.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use super::error::GitHubApiError;

/// A doubling wait schedule: `first`, `2 * first`, `4 * first`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Wait before the first retry.
    pub first: Duration,
    /// How many times a read is repeated after the initial attempt.
    pub retries: u32,
}

impl Backoff {
    /// The schedule used while answering a webhook.
    pub const WEBHOOK: Self = Self {
        first: Duration::from_millis(250),
        retries: 2,
    };

    /// Never retry.
    pub const NONE: Self = Self {
        first: Duration::ZERO,
        retries: 0,
    };

    /// The wait before retry number `retry`, counting from zero.
    pub fn delay_before(&self, retry: u32) -> Duration {
        self.first.saturating_mul(1u32 << retry.min(16))
    }

    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.retries).map(|retry| self.delay_before(retry))
    }

    /// Longest time a read can spend waiting between attempts.
    pub fn worst_case(&self) -> Duration {
        self.schedule().sum()
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::WEBHOOK
    }
}

/// Runs `read` until it succeeds, fails permanently, or the schedule runs
/// out. The last error is returned in the latter two cases.
pub async fn read_with_retry<T, F, Fut>(
    backoff: Backoff,
    url: &str,
    mut read: F,
) -> Result<T, GitHubApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GitHubApiError>>,
{
    let mut waits = backoff.schedule();
    loop {
        let err = match read().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.kind.is_retriable() => return Err(err),
            Err(err) => err,
        };

        let Some(wait) = waits.next() else {
            warn!(url, error = %err, "GET failed after {} retries", backoff.retries);
            return Err(err);
        };
        debug!(url, error = %err, ?wait, "Transient GET failure; retrying");
        tokio::time::sleep(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::GitHubErrorKind;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn bad_gateway() -> GitHubApiError {
        GitHubApiError::from_status(Some(502), "Bad Gateway")
    }

    #[test]
    fn webhook_schedule() {
        let waits: Vec<_> = Backoff::WEBHOOK.schedule().collect();
        assert_eq!(waits, vec![Duration::from_millis(250), Duration::from_millis(500)]);
        assert_eq!(Backoff::WEBHOOK.worst_case(), Duration::from_millis(750));
    }

    #[test]
    fn none_has_no_waits() {
        assert_eq!(Backoff::NONE.schedule().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_then_success() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = read_with_retry(Backoff::WEBHOOK, "repos/o/r", || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                match call {
                    0 => Err(bad_gateway()),
                    n => Ok(n),
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(start.elapsed() >= Duration::from_millis(250));
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_returned_at_once() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let err = read_with_retry(Backoff::WEBHOOK, "repos/o/r", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(GitHubApiError::from_status(Some(404), "Not Found")) }
        })
        .await
        .unwrap_err();

        assert_eq!(err.kind, GitHubErrorKind::Permanent);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_runs_out() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let err = read_with_retry(Backoff::WEBHOOK, "repos/o/r", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(bad_gateway()) }
        })
        .await
        .unwrap_err();

        assert_eq!(err.status_code, Some(502));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Backoff::WEBHOOK.worst_case());
    }

    proptest! {
        #[test]
        fn each_wait_doubles_the_last(first_ms in 1u64..1_000, retries in 1u32..8) {
            let backoff = Backoff { first: Duration::from_millis(first_ms), retries };
            let waits: Vec<_> = backoff.schedule().collect();

            prop_assert_eq!(waits.len(), retries as usize);
            prop_assert_eq!(waits[0], backoff.first);
            for pair in waits.windows(2) {
                prop_assert_eq!(pair[1], pair[0] * 2);
            }
        }
    }
}
