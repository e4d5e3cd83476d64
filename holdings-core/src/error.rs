//! Structured error types for ingestion, storage, and fetching.
//!
//! File- and batch-level failures are errors. Row-level problems are not:
//! they are reported as `SkippedRow` diagnostics on the validated batch.

use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::CanonicalField;

/// Errors that abort ingestion of one source.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("source format error: {0}")]
    SourceFormat(String),

    #[error("missing required columns: {}", format_fields(missing))]
    MissingColumns { missing: Vec<CanonicalField> },

    #[error("unable to infer as-of date for {source_name}")]
    AmbiguousDate { source_name: String },

    #[error("I/O error reading {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("dataframe error: {0}")]
    Frame(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<polars::prelude::PolarsError> for IngestError {
    fn from(e: polars::prelude::PolarsError) -> Self {
        IngestError::Frame(e.to_string())
    }
}

fn format_fields(fields: &[CanonicalField]) -> String {
    fields
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors from the snapshot store. A failed write never touches the
/// previously stored snapshot for its date.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no holdings rows to load")]
    EmptyBatch,

    #[error("batch mixes dates: expected {expected}, found {found}")]
    MixedDates { expected: NaiveDate, found: NaiveDate },

    #[error("store I/O error: {0}")]
    Io(String),

    #[error("parquet I/O error: {0}")]
    Parquet(String),

    #[error("corrupt snapshot for {date}: {reason}")]
    Corrupt { date: NaiveDate, reason: String },
}

/// Errors from a web holdings provider.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("no holdings data found at {0}")]
    NoHoldings(String),

    #[error(transparent)]
    Parse(#[from] IngestError),
}
