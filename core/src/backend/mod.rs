//! Backend collaborator
//!
//! The hosted backend is seen as four operations over named collections.
//! Rows travel as JSON objects; errors carry a machine-readable code that the
//! retry wrapper classifies.

mod filter;
mod http;
mod memory;

pub use filter::{Condition, Filter, FilterOp, Order};
pub use http::HttpBackend;
pub use memory::MemoryBackend;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::BackendSettings;
use crate::retry::classifier::{
    ErrorClass, PermanentError, RetryClassifiable, RetryableError, classify_message,
};

/// One record as stored by the backend.
pub type Row = serde_json::Map<String, serde_json::Value>;

pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[async_trait]
pub trait Backend: Send + Sync {
    async fn query(&self, collection: &str, filter: &Filter, order: &[Order])
    -> BackendResult<Vec<Row>>;

    async fn insert(&self, collection: &str, record: Row) -> BackendResult<Row>;

    async fn update(&self, collection: &str, id: &str, patch: Row) -> BackendResult<Row>;

    async fn delete(&self, collection: &str, id: &str) -> BackendResult<()>;
}

/// Machine-readable backend error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendErrorCode {
    Network,
    Timeout,
    RateLimited,
    Connection,
    NotFound,
    Duplicate,
    PermissionDenied,
    Validation,
    Server,
    Unknown,
}

impl BackendErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::Connection => "connection",
            Self::NotFound => "not_found",
            Self::Duplicate => "duplicate",
            Self::PermissionDenied => "permission_denied",
            Self::Validation => "validation",
            Self::Server => "server",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for BackendErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct BackendError {
    pub code: BackendErrorCode,
    pub message: String,
}

impl BackendError {
    pub fn new(code: BackendErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(BackendErrorCode::NotFound, message)
    }
}

impl RetryClassifiable for BackendError {
    fn classify(&self) -> ErrorClass {
        match self.code {
            BackendErrorCode::Network => ErrorClass::Retryable(RetryableError::NetworkFailure),
            BackendErrorCode::Timeout => ErrorClass::Retryable(RetryableError::Timeout),
            BackendErrorCode::RateLimited => ErrorClass::Retryable(RetryableError::RateLimited),
            BackendErrorCode::Connection => ErrorClass::Retryable(RetryableError::Connection),
            BackendErrorCode::NotFound => {
                ErrorClass::Permanent(PermanentError::NotFound(self.message.clone()))
            }
            BackendErrorCode::Duplicate => {
                ErrorClass::Permanent(PermanentError::Duplicate(self.message.clone()))
            }
            BackendErrorCode::PermissionDenied => {
                ErrorClass::Permanent(PermanentError::PermissionDenied(self.message.clone()))
            }
            BackendErrorCode::Validation => {
                ErrorClass::Permanent(PermanentError::InvalidInput(self.message.clone()))
            }
            BackendErrorCode::Server => {
                ErrorClass::Permanent(PermanentError::Other(self.message.clone()))
            }
            // No code: fall back to what the message says.
            BackendErrorCode::Unknown => classify_message(&self.message),
        }
    }
}

/// Build the backend named by the settings. An empty URL selects the
/// in-memory store.
pub fn from_settings(settings: &BackendSettings) -> BackendResult<Arc<dyn Backend>> {
    if settings.url.trim().is_empty() {
        tracing::info!("no backend url configured, using in-memory store");
        return Ok(Arc::new(MemoryBackend::new()));
    }
    tracing::info!(url = %settings.url, "using remote backend");
    Ok(Arc::new(HttpBackend::new(settings)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_codes_are_retryable() {
        for code in [
            BackendErrorCode::Network,
            BackendErrorCode::Timeout,
            BackendErrorCode::RateLimited,
            BackendErrorCode::Connection,
        ] {
            assert!(BackendError::new(code, "x").is_retryable(), "{code}");
        }
    }

    #[test]
    fn logic_codes_are_permanent() {
        for code in [
            BackendErrorCode::NotFound,
            BackendErrorCode::Duplicate,
            BackendErrorCode::PermissionDenied,
            BackendErrorCode::Validation,
            BackendErrorCode::Server,
        ] {
            assert!(!BackendError::new(code, "x").is_retryable(), "{code}");
        }
    }

    #[test]
    fn unknown_code_falls_back_to_message() {
        let err = BackendError::new(BackendErrorCode::Unknown, "upstream request timed out");
        assert!(err.is_retryable());
        let err = BackendError::new(BackendErrorCode::Unknown, "bad things");
        assert!(!err.is_retryable());
    }

    #[test]
    fn display_includes_code() {
        let err = BackendError::new(BackendErrorCode::Duplicate, "agencies_name_key");
        assert_eq!(err.to_string(), "duplicate: agencies_name_key");
    }

    #[test]
    fn empty_url_selects_memory_backend() {
        let settings = BackendSettings::default();
        assert!(from_settings(&settings).is_ok());
    }
}
