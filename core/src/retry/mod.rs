//! Resilient remote query wrapper
//!
//! Every remote call in the data layer goes through [`execute_with_retry`]:
//! - Error classification (retryable vs permanent)
//! - Exponential backoff with additive jitter
//! - Max attempt limit (3 attempts default)
//! - A consecutive-failure circuit breaker shared by all callers
//! - Optional cancellation and per-retry status callbacks

pub mod circuit_breaker;
pub mod classifier;
pub mod strategy;

pub use circuit_breaker::{CircuitBreaker, CircuitOpen, CircuitState};
pub use classifier::{ErrorClass, PermanentError, RetryClassifiable, RetryableError};
pub use strategy::{RetryConfig, RetryStatus, execute_with_retry, execute_with_retry_cancellable};

use std::time::Duration;

/// Retry module result type
pub type Result<T, E> = std::result::Result<T, RetryError<E>>;

/// Errors surfaced by the retry wrapper.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// The circuit breaker is open; the operation was not attempted.
    #[error("Service temporarily unavailable, retry in {}s", retry_after.as_secs())]
    ServiceUnavailable { retry_after: Duration },

    /// A retryable error persisted through every attempt.
    #[error("Remote query failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: E,
    },

    /// The operation failed with an error that retrying cannot fix.
    #[error(transparent)]
    NonRetryable(E),

    /// External cancellation requested while waiting to retry.
    #[error("Remote query cancelled")]
    Cancelled,
}

impl<E> RetryError<E> {
    /// Short message suitable for an end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            RetryError::ServiceUnavailable { .. } => {
                "Service temporarily unavailable. Please try again later."
            }
            RetryError::Exhausted { .. } => "The server could not be reached. Please try again.",
            RetryError::NonRetryable(_) => "The request could not be completed.",
            RetryError::Cancelled => "The request was cancelled.",
        }
    }
}
