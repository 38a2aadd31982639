//! Data layer for the study-abroad consultancy directory.
//!
//! The web shell talks to a hosted backend-as-a-service; this crate holds the
//! pieces of that data layer that carry a failure-handling contract:
//!
//! - [`retry`]: exponential backoff with jitter behind a circuit breaker shared
//!   by every remote call.
//! - [`import`]: the admin bulk-upload pipeline (CSV parse, validation,
//!   sequential ingestion with progress counters).
//! - [`backend`]: the backend seen as `query / insert / update / delete` over
//!   named collections, with an HTTP and an in-memory implementation.
//! - [`agencies`]: listing reload plus the search / sort / paginate pass the
//!   directory pages run over it.
//! - [`config`]: layered configuration (defaults, TOML file, `EDUDIR_*` env).

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod agencies;
pub mod backend;
pub mod config;
pub mod import;
pub mod retry;

pub use backend::{Backend, BackendError, BackendErrorCode, Row};
pub use import::{BulkUploader, CsvRecord, UploadReport, UploadStatus, parse_agencies_csv};
pub use retry::{CircuitBreaker, RetryConfig, RetryError, execute_with_retry};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
