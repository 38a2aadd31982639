use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::record::CsvRecord;
use super::status::{RowFailure, UploadReport, UploadStatus};
use crate::backend::{Backend, BackendError, Row};
use crate::retry::{self, CircuitBreaker, RetryConfig, RetryError};

pub const DEFAULT_COLLECTION: &str = "agencies";

/// Feeds parsed records into the backend one at a time.
///
/// A rejected row is counted and recorded, never fatal: the loop always
/// reaches the end of the input unless cancelled.
pub struct BulkUploader {
    backend: Arc<dyn Backend>,
    collection: String,
    owner_id: String,
    row_retry: Option<RowRetry>,
    cancel: CancellationToken,
}

struct RowRetry {
    config: RetryConfig,
    breaker: Arc<CircuitBreaker>,
}

impl BulkUploader {
    pub fn new(backend: Arc<dyn Backend>, owner_id: impl Into<String>) -> Self {
        Self {
            backend,
            collection: DEFAULT_COLLECTION.to_string(),
            owner_id: owner_id.into(),
            row_retry: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Route each insert through the retry wrapper instead of a single attempt.
    pub fn with_row_retry(mut self, config: RetryConfig, breaker: Arc<CircuitBreaker>) -> Self {
        self.row_retry = Some(RowRetry { config, breaker });
        self
    }

    /// Stop between rows once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Insert every record in order, reporting progress after each row.
    pub async fn upload<F>(&self, records: &[CsvRecord], mut on_progress: F) -> UploadReport
    where
        F: FnMut(&UploadStatus),
    {
        let mut status = UploadStatus::new(records.len());
        let mut inserted_ids = Vec::new();
        let mut failures = Vec::new();

        status.start();
        tracing::info!(
            collection = %self.collection,
            total = records.len(),
            retry_rows = self.row_retry.is_some(),
            "bulk upload started"
        );

        for (index, record) in records.iter().enumerate() {
            let row = index + 1;
            if self.cancel.is_cancelled() {
                status.cancel();
                tracing::warn!(processed = status.processed(), total = status.total(), "bulk upload cancelled");
                break;
            }

            match self.insert(record.to_row(&self.owner_id)).await {
                Ok(inserted) => {
                    if let Some(id) = inserted.get("id").and_then(|v| v.as_str()) {
                        inserted_ids.push(id.to_string());
                    }
                    status.record_success();
                }
                Err(InsertError::Cancelled) => {
                    status.cancel();
                    tracing::warn!(row, "bulk upload cancelled during retry");
                    break;
                }
                Err(InsertError::Failed(error)) => {
                    tracing::warn!(row, name = %record.name, %error, "row insert failed");
                    failures.push(RowFailure {
                        row,
                        name: record.name.clone(),
                        error,
                    });
                    status.record_failure();
                }
            }
            on_progress(&status);
        }

        tracing::info!(
            success = status.success(),
            failed = status.failed(),
            phase = ?status.phase(),
            "bulk upload finished"
        );

        UploadReport {
            status,
            inserted_ids,
            failures,
        }
    }

    async fn insert(&self, record: Row) -> Result<Row, InsertError> {
        let Some(retry) = &self.row_retry else {
            return self
                .backend
                .insert(&self.collection, record)
                .await
                .map_err(|e| InsertError::Failed(e.to_string()));
        };

        let backend = &self.backend;
        let collection = self.collection.as_str();
        let result: retry::Result<Row, BackendError> = retry::execute_with_retry_cancellable(
            || {
                let record = record.clone();
                async move { backend.insert(collection, record).await }
            },
            &retry.config,
            &retry.breaker,
            &self.cancel,
            |_| {},
        )
        .await;

        result.map_err(|err| match err {
            RetryError::Cancelled => InsertError::Cancelled,
            other => InsertError::Failed(other.to_string()),
        })
    }
}

enum InsertError {
    Failed(String),
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendErrorCode, Filter, MemoryBackend};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn record(name: &str) -> CsvRecord {
        CsvRecord {
            name: name.to_string(),
            location: "Pune".to_string(),
            description: "Study abroad counselling".to_string(),
            contact_email: "hello@example.com".to_string(),
            trust_score: 70.0,
            price: 1500.0,
            contact_phone: None,
            website: None,
            business_hours: None,
        }
    }

    fn records(n: usize) -> Vec<CsvRecord> {
        (0..n).map(|i| record(&format!("Agency {i}"))).collect()
    }

    #[tokio::test]
    async fn k_failures_out_of_m() {
        let backend = Arc::new(MemoryBackend::new());
        for name in ["Agency 1", "Agency 4", "Agency 5"] {
            backend
                .reject_inserts_matching("name", name, BackendErrorCode::Duplicate)
                .await;
        }
        let uploader = BulkUploader::new(backend.clone(), "owner-1");

        let mut seen = Vec::new();
        let report = uploader
            .upload(&records(8), |status| seen.push(status.processed()))
            .await;

        assert_eq!(report.status.processed(), 8);
        assert_eq!(report.status.success(), 5);
        assert_eq!(report.status.failed(), 3);
        assert!(report.status.is_complete());
        assert_eq!(report.summary(), "5 succeeded, 3 failed");
        assert_eq!(seen, (1..=8).collect::<Vec<_>>());
        assert_eq!(
            report.failures.iter().map(|f| f.row).collect::<Vec<_>>(),
            vec![2, 5, 6]
        );
        assert_eq!(report.inserted_ids.len(), 5);
        assert_eq!(backend.len("agencies").await, 5);
    }

    #[tokio::test]
    async fn rows_are_stamped_with_owner_and_collection() {
        let backend = Arc::new(MemoryBackend::new());
        let uploader = BulkUploader::new(backend.clone(), "owner-7").with_collection("consultancies");

        let report = uploader.upload(&records(2), |_| {}).await;
        assert_eq!(report.status.success(), 2);

        let rows = backend
            .query("consultancies", &Filter::new().eq("owner_id", "owner-7"), &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "Agency 0");
    }

    #[tokio::test]
    async fn one_shot_insert_does_not_retry() {
        let backend = Arc::new(MemoryBackend::new());
        backend.inject_fault(BackendErrorCode::Timeout).await;
        let uploader = BulkUploader::new(backend.clone(), "owner-1");

        let report = uploader.upload(&records(2), |_| {}).await;

        assert_eq!(report.status.failed(), 1);
        assert_eq!(report.status.success(), 1);
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn row_retry_recovers_transient_failures() {
        let backend = Arc::new(MemoryBackend::new());
        backend.inject_faults(BackendErrorCode::Network, 2).await;
        let uploader = BulkUploader::new(backend.clone(), "owner-1").with_row_retry(
            RetryConfig::default(),
            Arc::new(CircuitBreaker::new()),
        );

        let report = uploader.upload(&records(1), |_| {}).await;

        assert_eq!(report.status.success(), 1);
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn cancellation_stops_between_rows() {
        let backend = Arc::new(MemoryBackend::new());
        let cancel = CancellationToken::new();
        let uploader =
            BulkUploader::new(backend.clone(), "owner-1").with_cancellation(cancel.clone());

        let report = uploader
            .upload(&records(5), |status| {
                if status.processed() == 2 {
                    cancel.cancel();
                }
            })
            .await;

        assert_eq!(report.status.phase(), crate::import::UploadPhase::Cancelled);
        assert_eq!(report.status.processed(), 2);
        assert_eq!(report.status.total(), 5);
        assert_eq!(backend.len("agencies").await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_row_backoff() {
        let backend = Arc::new(MemoryBackend::new());
        backend.inject_faults(BackendErrorCode::RateLimited, 1).await;
        let cancel = CancellationToken::new();
        let uploader = BulkUploader::new(backend.clone(), "owner-1")
            .with_row_retry(RetryConfig::default(), Arc::new(CircuitBreaker::new()))
            .with_cancellation(cancel.clone());

        let canceller = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                cancel.cancel();
            }
        });

        let report = uploader.upload(&records(3), |_| {}).await;
        canceller.await.unwrap();

        assert_eq!(report.status.phase(), crate::import::UploadPhase::Cancelled);
        assert_eq!(report.status.processed(), 0);
    }
}
