//! Backoff strategy
//!
//! Delay before retry `n` (0-based) is `initial_delay_ms * 2^n` capped at
//! `max_delay_ms`, plus a uniform jitter in `0..=max_jitter_ms`.

use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use rand::Rng;
use tokio_util::sync::CancellationToken;

use super::RetryError;
use super::circuit_breaker::CircuitBreaker;
use super::classifier::RetryClassifiable;

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Upper bound of the additive random jitter.
    pub max_jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            max_jitter_ms: 1000,
        }
    }
}

/// Reported to the status callback before each backoff sleep.
#[derive(Debug, Clone)]
pub struct RetryStatus {
    /// Attempt that just failed (1-indexed)
    pub attempt: u32,
    /// Sleep before the next attempt, jitter included
    pub delay: Duration,
    /// Breaker counter after recording this failure
    pub consecutive_failures: u32,
    pub reason: String,
}

/// Run `operation` with retries and the shared circuit breaker.
///
/// Returns the first success, `ServiceUnavailable` when the breaker is (or
/// becomes) open, `NonRetryable` for errors that retrying cannot fix, or
/// `Exhausted` once `max_retries` attempts have failed.
pub async fn execute_with_retry<F, Fut, T, E>(
    operation: F,
    config: &RetryConfig,
    breaker: &CircuitBreaker,
) -> super::Result<T, E>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<T, E>> + Send,
    E: std::error::Error + RetryClassifiable + Send + Sync + 'static,
{
    let never = CancellationToken::new();
    execute_with_retry_cancellable(operation, config, breaker, &never, |_| {}).await
}

/// [`execute_with_retry`] with external cancellation and a status callback.
///
/// The token is checked before every attempt and raced against every backoff
/// sleep; an in-flight attempt is not interrupted.
pub async fn execute_with_retry_cancellable<F, Fut, T, E, StatusCb>(
    mut operation: F,
    config: &RetryConfig,
    breaker: &CircuitBreaker,
    cancel: &CancellationToken,
    mut status_cb: StatusCb,
) -> super::Result<T, E>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<T, E>> + Send,
    E: std::error::Error + RetryClassifiable + Send + Sync + 'static,
    StatusCb: FnMut(RetryStatus) + Send,
{
    let mut delays = backoff_schedule(config);
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        if let Err(open) = breaker.check() {
            tracing::debug!(
                failures = open.failures,
                retry_after_ms = open.retry_after.as_millis() as u64,
                "circuit open, failing fast"
            );
            return Err(RetryError::ServiceUnavailable {
                retry_after: open.retry_after,
            });
        }

        attempt = attempt.saturating_add(1);
        let err = match operation().await {
            Ok(value) => {
                breaker.record_success();
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_retryable() {
            tracing::debug!(attempt, error = %err, "non-retryable error");
            return Err(RetryError::NonRetryable(err));
        }

        if breaker.record_failure() {
            tracing::error!(
                attempt,
                failures = breaker.failure_count(),
                cooldown_secs = breaker.cooldown().as_secs(),
                error = %err,
                "circuit breaker opened"
            );
            return Err(RetryError::ServiceUnavailable {
                retry_after: breaker.remaining_open(),
            });
        }

        let Some(base) = delays.next() else {
            tracing::warn!(attempts = attempt, error = %err, "retries exhausted");
            return Err(RetryError::Exhausted {
                attempts: attempt,
                source: err,
            });
        };

        let delay = base + jitter(config.max_jitter_ms);
        tracing::warn!(
            attempt,
            max_retries = config.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "remote query failed, retrying"
        );

        status_cb(RetryStatus {
            attempt,
            delay,
            consecutive_failures: breaker.failure_count(),
            reason: err.to_string(),
        });

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
        }
    }
}

/// Base delays between attempts (one fewer than `max_retries`).
fn backoff_schedule(config: &RetryConfig) -> impl Iterator<Item = Duration> {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(config.initial_delay_ms))
        .with_max_delay(Duration::from_millis(config.max_delay_ms))
        .with_factor(2.0)
        .with_max_times(config.max_retries.saturating_sub(1) as usize)
        .build()
}

fn jitter(max_jitter_ms: u64) -> Duration {
    if max_jitter_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=max_jitter_ms))
}
