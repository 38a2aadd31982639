use serde::Serialize;

/// Phase of one bulk upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadPhase {
    NotStarted,
    InProgress,
    Completed,
    Cancelled,
}

/// Progress counters of one bulk upload, serialised as
/// `{total, processed, success, failed}`.
///
/// Counters only move forward and `processed == success + failed` holds
/// after every update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadStatus {
    total: usize,
    processed: usize,
    success: usize,
    failed: usize,
    #[serde(skip)]
    phase: UploadPhase,
}

impl UploadStatus {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            processed: 0,
            success: 0,
            failed: 0,
            phase: UploadPhase::NotStarted,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn success(&self) -> usize {
        self.success
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn phase(&self) -> UploadPhase {
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        self.phase == UploadPhase::Completed
    }

    pub(crate) fn start(&mut self) {
        self.phase = if self.total == 0 {
            UploadPhase::Completed
        } else {
            UploadPhase::InProgress
        };
    }

    pub(crate) fn record_success(&mut self) {
        self.success += 1;
        self.advance();
    }

    pub(crate) fn record_failure(&mut self) {
        self.failed += 1;
        self.advance();
    }

    pub(crate) fn cancel(&mut self) {
        if self.phase != UploadPhase::Completed {
            self.phase = UploadPhase::Cancelled;
        }
    }

    fn advance(&mut self) {
        self.processed += 1;
        debug_assert!(self.processed <= self.total);
        if self.processed >= self.total {
            self.phase = UploadPhase::Completed;
        }
    }
}

/// A row the backend rejected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowFailure {
    /// 1-based data row
    pub row: usize,
    pub name: String,
    pub error: String,
}

/// Outcome of [`BulkUploader::upload`](super::BulkUploader::upload).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadReport {
    pub status: UploadStatus,
    pub inserted_ids: Vec<String>,
    pub failures: Vec<RowFailure>,
}

impl UploadReport {
    /// "N succeeded, M failed"
    pub fn summary(&self) -> String {
        format!(
            "{} succeeded, {} failed",
            self.status.success(),
            self.status.failed()
        )
    }
}
