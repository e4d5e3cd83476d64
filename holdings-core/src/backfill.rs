//! Backfill orchestrator: ingest a set of saved holdings files with
//! per-file progress reporting.
//!
//! A failing file is reported and skipped; the run continues with the rest.

use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::IngestError;
use crate::ingest::{DateFallback, IngestReport, IngestSource, Ingestor, INPUT_EXTENSIONS};
use crate::store::SnapshotStore;

/// Progress callback for multi-file backfills.
pub trait BackfillProgress {
    /// Called when starting a file.
    fn on_start(&self, path: &Path, index: usize, total: usize);

    /// Called when a file completes.
    fn on_complete(
        &self,
        path: &Path,
        index: usize,
        total: usize,
        result: &Result<IngestReport, IngestError>,
    );

    /// Called when the entire batch is done.
    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize);
}

/// Prints progress to stdout.
pub struct StdoutProgress;

impl BackfillProgress for StdoutProgress {
    fn on_start(&self, path: &Path, index: usize, total: usize) {
        println!("[{}/{}] Loading {}...", index + 1, total, path.display());
    }

    fn on_complete(
        &self,
        path: &Path,
        _index: usize,
        _total: usize,
        result: &Result<IngestReport, IngestError>,
    ) {
        match result {
            Ok(report) => {
                println!(
                    "  OK: {} -> {} rows for {}",
                    path.display(),
                    report.count,
                    report.date
                );
                if !report.skipped.is_empty() {
                    println!("      ({} rows skipped)", report.skipped.len());
                }
            }
            Err(e) => println!("  FAIL: {}: {e}", path.display()),
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        println!("\nBackfill complete: {succeeded}/{total} succeeded, {failed} failed");
    }
}

/// Discards all progress events.
pub struct SilentProgress;

impl BackfillProgress for SilentProgress {
    fn on_start(&self, _: &Path, _: usize, _: usize) {}
    fn on_complete(&self, _: &Path, _: usize, _: usize, _: &Result<IngestReport, IngestError>) {}
    fn on_batch_complete(&self, _: usize, _: usize, _: usize) {}
}

/// Summary of a backfill run.
#[derive(Debug)]
pub struct BackfillSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<(PathBuf, IngestError)>,
}

impl BackfillSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

fn has_input_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| INPUT_EXTENSIONS.contains(&e.as_str()))
}

/// Files to backfill from `path`.
///
/// A file is returned as-is. A directory yields its spreadsheet and CSV
/// files sorted by path, descending into subdirectories when `recursive`.
pub fn collect_input_files(path: &Path, recursive: bool) -> Result<Vec<PathBuf>, IngestError> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files = Vec::new();
    walk(path, recursive, &mut files)?;
    files.sort();
    Ok(files)
}

fn walk(dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) -> Result<(), IngestError> {
    let io_err = |e: std::io::Error| IngestError::Io {
        path: dir.display().to_string(),
        reason: e.to_string(),
    };
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_dir() {
            if recursive {
                walk(&path, recursive, out)?;
            }
        } else if has_input_extension(&path) {
            out.push(path);
        }
    }
    Ok(())
}

/// Ingest each file into the store.
///
/// Dates come from `date_override`, else the file name, else the data.
/// A file with no inferable date fails rather than defaulting to today.
pub fn backfill(
    store: &SnapshotStore,
    files: &[PathBuf],
    date_override: Option<NaiveDate>,
    progress: &dyn BackfillProgress,
) -> BackfillSummary {
    let ingestor = Ingestor::new(store, DateFallback::Reject);
    let total = files.len();
    let mut succeeded = 0;
    let mut failed = 0;
    let mut errors = Vec::new();

    for (i, path) in files.iter().enumerate() {
        progress.on_start(path, i, total);

        let result = ingestor.ingest(&IngestSource::Path(path.clone()), date_override);
        progress.on_complete(path, i, total, &result);

        match result {
            Ok(_) => succeeded += 1,
            Err(e) => {
                errors.push((path.clone(), e));
                failed += 1;
            }
        }
    }

    progress.on_batch_complete(succeeded, failed, total);

    BackfillSummary {
        total,
        succeeded,
        failed,
        errors,
    }
}
