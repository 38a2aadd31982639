//! Error classification for retry decisions

/// Top-level error classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient errors that should be retried with backoff
    Retryable(RetryableError),

    /// Permanent errors that should NOT be retried
    Permanent(PermanentError),
}

/// Transient errors (retry recommended)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetryableError {
    #[error("Network failure")]
    NetworkFailure,

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limit exceeded (HTTP 429)")]
    RateLimited,

    #[error("Connection error")]
    Connection,
}

/// Permanent errors (do NOT retry)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermanentError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Other(String),
}

/// Trait for error classification
pub trait RetryClassifiable {
    fn classify(&self) -> ErrorClass;

    fn is_retryable(&self) -> bool {
        matches!(self.classify(), ErrorClass::Retryable(_))
    }
}

/// Classify a free-form error message.
///
/// Used for errors that only carry text (transport errors from other layers,
/// messages relayed by the backend without a code).
pub fn classify_message(msg: &str) -> ErrorClass {
    let msg_lower = msg.to_lowercase();

    if msg_lower.contains("rate limit")
        || msg_lower.contains("429")
        || msg_lower.contains("too many requests")
    {
        return ErrorClass::Retryable(RetryableError::RateLimited);
    }

    if msg_lower.contains("timeout") || msg_lower.contains("timed out") {
        return ErrorClass::Retryable(RetryableError::Timeout);
    }

    if msg_lower.contains("connection")
        || msg_lower.contains("econnreset")
        || msg_lower.contains("econnrefused")
    {
        return ErrorClass::Retryable(RetryableError::Connection);
    }

    if msg_lower.contains("network") || msg_lower.contains("failed to fetch") {
        return ErrorClass::Retryable(RetryableError::NetworkFailure);
    }

    if msg_lower.contains("permission") || msg_lower.contains("unauthorized") {
        return ErrorClass::Permanent(PermanentError::PermissionDenied(msg.to_string()));
    }

    if msg_lower.contains("not found") {
        return ErrorClass::Permanent(PermanentError::NotFound(msg.to_string()));
    }

    if msg_lower.contains("duplicate") {
        return ErrorClass::Permanent(PermanentError::Duplicate(msg.to_string()));
    }

    ErrorClass::Permanent(PermanentError::Other(msg.to_string()))
}
