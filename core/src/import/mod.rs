//! Agency bulk upload
//!
//! ```text
//! file ──size check──▶ text ──parse (all or nothing)──▶ [CsvRecord] ──insert each──▶ UploadReport
//! ```
//!
//! Parsing never touches the network: a bad document is rejected before the
//! first insert. Ingestion is the opposite: every row is attempted and
//! failures only show up in the counters.

mod csv;
mod ingest;
mod record;
mod status;

pub use csv::{CsvError, parse_agencies_csv};
pub use ingest::{BulkUploader, DEFAULT_COLLECTION};
pub use record::{Column, CsvRecord};
pub use status::{RowFailure, UploadPhase, UploadReport, UploadStatus};

use std::path::{Path, PathBuf};

/// Largest upload accepted by default (5 MB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("File is too large ({size} bytes); the limit is {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File is not valid UTF-8 text")]
    NotUtf8,

    #[error(transparent)]
    Parse(#[from] CsvError),
}

pub type Result<T> = std::result::Result<T, ImportError>;

pub fn check_upload_size(size: u64, limit: u64) -> Result<()> {
    if size > limit {
        return Err(ImportError::FileTooLarge { size, limit });
    }
    Ok(())
}

/// Read an upload from disk, enforcing the size cap before reading it.
pub fn read_upload(path: &Path, max_bytes: u64) -> Result<String> {
    let read_err = |source| ImportError::Read {
        path: path.to_path_buf(),
        source,
    };
    let size = std::fs::metadata(path).map_err(read_err)?.len();
    check_upload_size(size, max_bytes)?;

    let bytes = std::fs::read(path).map_err(read_err)?;
    check_upload_size(bytes.len() as u64, max_bytes)?;
    String::from_utf8(bytes).map_err(|_| ImportError::NotUtf8)
}

/// Parse `text` and upload every record.
///
/// A parse failure returns before any backend call.
pub async fn import_csv<F>(text: &str, uploader: &BulkUploader, on_progress: F) -> Result<UploadReport>
where
    F: FnMut(&UploadStatus),
{
    let records = parse_agencies_csv(text)?;
    tracing::debug!(records = records.len(), "upload parsed");
    Ok(uploader.upload(&records, on_progress).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendErrorCode, MemoryBackend};
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use std::sync::Arc;

    #[test]
    fn size_cap_is_inclusive() {
        assert!(check_upload_size(DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_MAX_UPLOAD_BYTES).is_ok());
        assert!(matches!(
            check_upload_size(DEFAULT_MAX_UPLOAD_BYTES + 1, DEFAULT_MAX_UPLOAD_BYTES),
            Err(ImportError::FileTooLarge { .. })
        ));
    }

    #[test]
    fn read_upload_rejects_large_and_binary_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"name,location\n").unwrap();
        let err = read_upload(file.path(), 4).unwrap_err();
        assert!(matches!(err, ImportError::FileTooLarge { size: 14, limit: 4 }));

        let mut binary = tempfile::NamedTempFile::new().unwrap();
        binary.write_all(&[0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(
            read_upload(binary.path(), DEFAULT_MAX_UPLOAD_BYTES),
            Err(ImportError::NotUtf8)
        ));

        assert!(matches!(
            read_upload(Path::new("/nonexistent/upload.csv"), DEFAULT_MAX_UPLOAD_BYTES),
            Err(ImportError::Read { .. })
        ));
    }

    #[tokio::test]
    async fn parse_failure_makes_no_backend_calls() {
        let backend = Arc::new(MemoryBackend::new());
        let uploader = BulkUploader::new(backend.clone(), "owner-1");

        let err = import_csv(
            "name,location,description,contact_email,trust_score\nA,B,C,d@e.com,150",
            &uploader,
            |_| {},
        )
        .await
        .unwrap_err();

        assert_eq!(err.to_string(), "Row 1: Trust score must be between 0 and 100");
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn import_end_to_end() {
        let backend = Arc::new(MemoryBackend::new().with_unique("agencies", "name").await);
        let uploader = BulkUploader::new(backend.clone(), "owner-1");
        let csv = "name,location,description,contact_email\n\
                   Acme Edu,Pune,\"Great, agency\",a@b.com\n\
                   Acme Edu,Pune,Again,a@b.com\n\
                   Beta,Delhi,Visa help,b@b.com\n";

        let report = import_csv(csv, &uploader, |_| {}).await.unwrap();

        assert_eq!(report.summary(), "2 succeeded, 1 failed");
        assert_eq!(report.failures[0].row, 2);
        assert!(report.failures[0].error.starts_with(BackendErrorCode::Duplicate.as_str()));
    }
}
