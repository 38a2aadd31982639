//! `validate` and `import` subcommands.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use edudir_core::agencies::{AgencyQuery, list_agencies};
use edudir_core::backend;
use edudir_core::config::AppConfig;
use edudir_core::import::{
    BulkUploader, ImportError, UploadPhase, import_csv, parse_agencies_csv, read_upload,
};
use tokio_util::sync::CancellationToken;

/// Conventional exit status after SIGINT.
const EXIT_CANCELLED: u8 = 130;

#[derive(Debug, Parser)]
pub struct ValidateArgs {
    /// CSV file to check.
    pub file: PathBuf,

    /// Output as JSON.
    #[arg(long = "json", short = 'j')]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct ImportArgs {
    /// CSV file to upload.
    pub file: PathBuf,

    /// Owner id stamped on every created row.
    #[arg(long = "owner")]
    pub owner: String,

    /// Target collection (defaults to import.collection).
    #[arg(long = "collection")]
    pub collection: Option<String>,

    /// Retry transient insert failures with backoff.
    #[arg(long = "retry-rows")]
    pub retry_rows: bool,

    /// Output as JSON.
    #[arg(long = "json", short = 'j')]
    pub json: bool,
}

pub fn run_validate(args: &ValidateArgs, config: &AppConfig) -> anyhow::Result<ExitCode> {
    let parsed = read_upload(&args.file, config.import.max_upload_bytes)
        .and_then(|text| parse_agencies_csv(&text).map_err(ImportError::from));

    match parsed {
        Ok(records) => {
            if args.json {
                let out = serde_json::json!({ "valid": true, "records": records.len() });
                println!("{out}");
            } else {
                println!("{}: {} records", args.file.display(), records.len());
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            if args.json {
                let row = match &err {
                    ImportError::Parse(e) => e.row(),
                    _ => None,
                };
                let out = serde_json::json!({ "valid": false, "error": err.to_string(), "row": row });
                println!("{out}");
            } else {
                eprintln!("{}: {err}", args.file.display());
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

pub async fn run_import(args: ImportArgs, config: &AppConfig) -> anyhow::Result<ExitCode> {
    let text = read_upload(&args.file, config.import.max_upload_bytes)?;

    let backend = backend::from_settings(&config.backend).context("connecting to backend")?;
    let breaker = config.retry.build_breaker();
    let retry_config = config.retry.to_retry_config();
    let collection = args
        .collection
        .as_deref()
        .unwrap_or(&config.import.collection)
        .to_string();

    let cancel = CancellationToken::new();
    let ctrl_c = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping after the current row");
                cancel.cancel();
            }
        }
    });

    let mut uploader = BulkUploader::new(Arc::clone(&backend), args.owner.as_str())
        .with_collection(collection.clone())
        .with_cancellation(cancel.clone());
    if args.retry_rows || config.import.retry_rows {
        uploader = uploader.with_row_retry(retry_config.clone(), Arc::clone(&breaker));
    }

    let report = import_csv(&text, &uploader, |status| {
        tracing::info!(
            processed = status.processed(),
            total = status.total(),
            success = status.success(),
            failed = status.failed(),
            "progress"
        );
    })
    .await;
    ctrl_c.abort();
    let report = report?;

    // Reload the canonical listing rather than trusting local counts.
    let listing = list_agencies(
        backend.as_ref(),
        &collection,
        &breaker,
        &retry_config,
        &AgencyQuery::default(),
    )
    .await;

    if args.json {
        let out = serde_json::json!({
            "status": report.status,
            "phase": report.status.phase(),
            "inserted_ids": report.inserted_ids,
            "failures": report.failures,
            "listing_total": listing.as_ref().ok().map(|page| page.total),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", report.summary());
        for failure in &report.failures {
            println!("  row {} ({}): {}", failure.row, failure.name, failure.error);
        }
        match &listing {
            Ok(page) => println!("{collection}: {} agencies listed", page.total),
            Err(err) => println!("{collection}: listing unavailable: {}", err.user_message()),
        }
    }

    if let Err(err) = &listing {
        tracing::warn!(error = %err, "listing reload failed");
    }

    if report.status.phase() == UploadPhase::Cancelled {
        return Ok(ExitCode::from(EXIT_CANCELLED));
    }
    Ok(ExitCode::SUCCESS)
}
