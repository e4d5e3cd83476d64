//! Ingestion pipeline: raw source → schema mapper → numeric normalizer →
//! validator → snapshot store.

pub mod dates;
pub mod mapper;
pub mod normalize;
pub mod reader;
pub mod table;
pub mod validate;

pub use dates::{extract_as_of_date, infer_date_from_filename, DateFallback};
pub use mapper::{map_columns, map_table, pick_holdings_table, ColumnMapping, MappedTable};
pub use normalize::{parse_number, parse_text};
pub use reader::{load_holdings_table, SourceFormat, INPUT_EXTENSIONS};
pub use validate::{validate, HoldingsValidator, SkipReason, SkippedRow, ValidatedBatch};

use chrono::NaiveDate;
use polars::prelude::DataFrame;
use std::path::PathBuf;
use tracing::info;

use crate::error::IngestError;
use crate::store::SnapshotStore;

/// Anything the pipeline can ingest.
#[derive(Debug, Clone)]
pub enum IngestSource {
    /// A `.csv`, `.xlsx`, `.xlsm` or `.xls` file. The file name may carry
    /// the as-of date.
    Path(PathBuf),
    /// Raw bytes from a provider, with a label for diagnostics.
    Bytes {
        bytes: Vec<u8>,
        format: SourceFormat,
        label: String,
    },
    /// An already-parsed table.
    Frame { frame: DataFrame, label: String },
}

impl IngestSource {
    pub fn label(&self) -> String {
        match self {
            IngestSource::Path(path) => path.display().to_string(),
            IngestSource::Bytes { label, .. } | IngestSource::Frame { label, .. } => label.clone(),
        }
    }

    fn filename_date(&self) -> Option<NaiveDate> {
        match self {
            IngestSource::Path(path) => infer_date_from_filename(path),
            _ => None,
        }
    }

    /// Parse the source down to its holdings table.
    pub fn load(&self) -> Result<DataFrame, IngestError> {
        match self {
            IngestSource::Path(path) => {
                let format = SourceFormat::from_path(path)
                    .filter(|f| *f != SourceFormat::Html)
                    .ok_or_else(|| {
                        IngestError::SourceFormat(format!(
                            "unsupported file extension: {}",
                            path.display()
                        ))
                    })?;
                let bytes = std::fs::read(path).map_err(|e| IngestError::Io {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
                load_holdings_table(&bytes, format)
            }
            IngestSource::Bytes { bytes, format, .. } => load_holdings_table(bytes, *format),
            IngestSource::Frame { frame, .. } => {
                if frame.height() == 0 {
                    return Err(IngestError::SourceFormat("no rows found in input".into()));
                }
                Ok(frame.clone())
            }
        }
    }
}

/// Outcome of one successful ingestion.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub source: String,
    pub date: NaiveDate,
    pub count: usize,
    pub skipped: Vec<SkippedRow>,
}

/// Runs sources through validation and writes them to a store.
pub struct Ingestor<'a> {
    store: &'a SnapshotStore,
    validator: HoldingsValidator,
}

impl<'a> Ingestor<'a> {
    pub fn new(store: &'a SnapshotStore, fallback: DateFallback) -> Self {
        Self {
            store,
            validator: HoldingsValidator::new(fallback),
        }
    }

    /// Load and validate without writing.
    ///
    /// As-of date precedence: explicit, file name, in-data column, fallback.
    pub fn prepare(
        &self,
        source: &IngestSource,
        as_of: Option<NaiveDate>,
    ) -> Result<ValidatedBatch, IngestError> {
        let df = source.load()?;
        let as_of = as_of.or_else(|| source.filename_date());
        self.validator.validate(&df, as_of, &source.label())
    }

    /// Load, validate and upsert one source. Nothing is written on failure.
    pub fn ingest(
        &self,
        source: &IngestSource,
        as_of: Option<NaiveDate>,
    ) -> Result<IngestReport, IngestError> {
        let label = source.label();
        let batch = self.prepare(source, as_of)?;
        self.store.upsert(&batch.records, &label)?;

        info!(
            source = %label,
            date = %batch.date,
            count = batch.records.len(),
            skipped = batch.skipped.len(),
            "ingested holdings"
        );

        Ok(IngestReport {
            source: label,
            date: batch.date,
            count: batch.records.len(),
            skipped: batch.skipped,
        })
    }
}
