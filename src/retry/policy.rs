use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::proto::error::{Error, ErrorKind, Result};
use crate::retry::backoff::Backoff;

const DEFAULT_MAX_RETRIES: u32 = 3;

/// Bounded retry of operations failing with transient errors.
///
/// # Example
///
/// ```
/// use shardwire::{Backoff, Error, RetryPolicy};
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let policy = RetryPolicy::new(Backoff::equal(Duration::from_millis(1)), 3);
/// let calls = AtomicU32::new(0);
/// let value = policy
///     .call_with_retry(|| async {
///         if calls.fetch_add(1, Ordering::SeqCst) < 2 {
///             Err(Error::Timeout { endpoint: "node".into() })
///         } else {
///             Ok(7)
///         }
///     })
///     .await
///     .unwrap();
/// assert_eq!(value, 7);
/// assert_eq!(calls.load(Ordering::SeqCst), 3);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    backoff: Backoff,
    max_retries: u32,
    retryable: Vec<ErrorKind>,
}

impl RetryPolicy {
    /// Retries connection and timeout failures up to `max_retries` times
    /// after the first attempt.
    pub fn new(backoff: Backoff, max_retries: u32) -> Self {
        Self {
            backoff,
            max_retries,
            retryable: vec![ErrorKind::Connection, ErrorKind::Timeout],
        }
    }

    /// A policy that never retries.
    pub fn never() -> Self {
        Self::new(Backoff::NoBackoff, 0)
    }

    /// Replaces the set of retryable error kinds.
    pub fn with_retryable(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retryable = kinds.into_iter().collect();
        self
    }

    /// The backoff strategy.
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Maximum number of retries after the first attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns true if `err` is of a retryable kind.
    pub fn is_retryable(&self, err: &Error) -> bool {
        self.retryable.contains(&err.kind())
    }

    /// Fresh failure tracking for one operation.
    pub fn state(&self) -> RetryState<'_> {
        RetryState {
            policy: self,
            failures: 0,
        }
    }

    /// Runs `op`, retrying retryable failures after the backoff delay.
    ///
    /// Non-retryable failures are returned at once; once retries are
    /// exhausted the last failure is returned.
    pub async fn call_with_retry<F, Fut, T>(&self, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.call_with_retry_until(&CancellationToken::new(), op)
            .await
    }

    /// Like [`call_with_retry`](RetryPolicy::call_with_retry) but gives up
    /// with [`Error::Cancelled`] once `cancel` fires. Cancellation is
    /// observed before each attempt and during backoff sleeps, never in
    /// the middle of an attempt.
    pub async fn call_with_retry_until<F, Fut, T>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut state = self.state();
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            let delay = match state.record_failure(&err) {
                Some(delay) => delay,
                None => return Err(err),
            };
            debug!(
                attempt = state.failures(),
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying after failure"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Backoff::default(), DEFAULT_MAX_RETRIES)
    }
}

/// Consecutive-failure counter driving a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryState<'a> {
    policy: &'a RetryPolicy,
    failures: u32,
}

impl RetryState<'_> {
    /// Records a failure. Returns the delay before the next attempt, or
    /// `None` if the error must be surfaced.
    pub fn record_failure(&mut self, err: &Error) -> Option<Duration> {
        if !self.policy.is_retryable(err) || self.failures >= self.policy.max_retries {
            return None;
        }
        let delay = self.policy.backoff.compute(self.failures);
        self.failures += 1;
        Some(delay)
    }

    /// Resets the counter after a success.
    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    /// Consecutive failures recorded so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}
