//! Bounded-retry wrapper for outbound requests made from tool bodies.
//!
//! A fixed attempt budget with linear backoff (`base_delay * attempt` after
//! the failing attempt). Only transient failures are retried; a well-formed
//! application response (4xx) fails immediately, and once the budget is
//! exhausted the last error surfaces unchanged.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::config::config;
use crate::logging;

/// Attempt budget and backoff base for one wrapped request.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, first try included. Zero is treated as one.
    pub attempts: u32,
    /// Backoff base; sleep `base_delay * n` after failing attempt `n`.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts,
            base_delay,
        }
    }

    /// Policy from the `[retry]` config section.
    pub fn from_config() -> Self {
        let retry = &config().retry;
        Self {
            attempts: retry.attempts,
            base_delay: Duration::from_millis(retry.base_delay_ms),
        }
    }
}

/// A failed outbound request, classified for retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RequestError {
    pub kind: RequestErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestErrorKind {
    /// The request deadline elapsed.
    Timeout,
    /// Connection-level failure (reset, refused, broken pipe).
    Transport,
    /// The peer answered with an HTTP status.
    Status(u16),
}

impl RequestError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: RequestErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: RequestErrorKind::Transport,
            message: message.into(),
        }
    }

    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: RequestErrorKind::Status(status),
            message: message.into(),
        }
    }

    /// Whether retrying can plausibly help. Timeouts and transport failures
    /// are transient, as are server-side (5xx) statuses; 4xx responses are
    /// answers, not failures of delivery.
    pub fn is_transient(&self) -> bool {
        match self.kind {
            RequestErrorKind::Timeout | RequestErrorKind::Transport => true,
            RequestErrorKind::Status(status) => status >= 500,
        }
    }
}

/// Run `op` until it succeeds, a non-transient error occurs, or the attempt
/// budget runs out.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let budget = policy.attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_transient() || attempt >= budget {
                    return Err(err);
                }
                logging::debug(&format!(
                    "Transient error on attempt {}/{}, will retry: {}",
                    attempt, budget, err
                ));
                tokio::time::sleep(policy.base_delay * attempt).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn flaky(
        calls: &AtomicU32,
        failures: u32,
    ) -> impl Future<Output = Result<&'static str, RequestError>> + '_ {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if n <= failures {
                Err(RequestError::timeout(format!("attempt {} timed out", n)))
            } else {
                Ok("ok")
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_within_budget() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let result = retry(&policy, || flaky(&calls, 2)).await;
        assert_eq!(result, Ok("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhaustion_surfaces_last_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2, Duration::from_millis(10));
        let err = retry(&policy, || flaky(&calls, 2)).await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(err.kind, RequestErrorKind::Timeout);
        assert_eq!(err.message, "attempt 2 timed out");
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_transient_fails_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::from_millis(10));
        let err = retry(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(RequestError::status(404, "not found")) }
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.kind, RequestErrorKind::Status(404));
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_errors_are_transient() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2, Duration::from_millis(10));
        let err = retry(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(RequestError::status(503, "service unavailable")) }
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(err.kind, RequestErrorKind::Status(503));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_linear() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        let start = tokio::time::Instant::now();
        let _ = retry(&policy, || flaky(&calls, 2)).await;
        // 100ms after attempt 1, 200ms after attempt 2.
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_budget_still_tries_once() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(0, Duration::from_millis(10));
        let _ = retry(&policy, || flaky(&calls, 5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
