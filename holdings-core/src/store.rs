//! Date-partitioned Parquet snapshot store.
//!
//! Layout: `{store_dir}/date={YYYY-MM-DD}/holdings.parquet`
//!
//! Features:
//! - Upsert-by-date: a write replaces every row for its date
//! - Atomic replacement: the Parquet file and its sidecar are staged as
//!   .tmp files, and renaming the Parquet file into place commits the write.
//!   Readers see the old snapshot or the new one, never a partial date
//! - Metadata sidecar per date (count, total, hash, source)
//! - Reads never modify the store

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::domain::{HoldingRecord, SnapshotTotals};
use crate::error::StoreError;
use crate::ingest::validate::records_to_dataframe;

const HOLDINGS_FILE: &str = "holdings.parquet";
const META_FILE: &str = "meta.json";
const PARTITION_PREFIX: &str = "date=";

/// Store columns, in order.
pub const STORE_COLUMNS: [&str; 6] = ["date", "ticker", "name", "shares", "market_value", "weight"];

/// Metadata sidecar for a stored snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub date: NaiveDate,
    pub holdings_count: usize,
    pub total_market_value: f64,
    pub data_hash: String,
    pub source: String,
    pub ingested_at: NaiveDateTime,
}

/// Handle to a snapshot store directory. Each operation opens and closes
/// its own files; the handle holds no open resources.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    /// The directory is created on first write.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{store_dir}/date={YYYY-MM-DD}/`
    fn partition_dir(&self, date: NaiveDate) -> PathBuf {
        self.root.join(format!("{PARTITION_PREFIX}{date}"))
    }

    fn snapshot_path(&self, date: NaiveDate) -> PathBuf {
        self.partition_dir(date).join(HOLDINGS_FILE)
    }

    fn meta_path(&self, date: NaiveDate) -> PathBuf {
        self.partition_dir(date).join(META_FILE)
    }

    pub fn has_snapshot(&self, date: NaiveDate) -> bool {
        self.snapshot_path(date).is_file()
    }

    /// Replace the snapshot for the records' date.
    ///
    /// All records must share one date. An empty batch is rejected rather
    /// than treated as "delete the date": it almost always means an upstream
    /// parse failure.
    pub fn upsert(&self, records: &[HoldingRecord], source: &str) -> Result<SnapshotMeta, StoreError> {
        let first = records.first().ok_or(StoreError::EmptyBatch)?;
        let date = first.date;
        if let Some(other) = records.iter().find(|r| r.date != date) {
            return Err(StoreError::MixedDates {
                expected: date,
                found: other.date,
            });
        }

        let dir = self.partition_dir(date);
        fs::create_dir_all(&dir)
            .map_err(|e| StoreError::Io(format!("failed to create {}: {e}", dir.display())))?;

        let totals = SnapshotTotals::from_records(records);
        let meta = SnapshotMeta {
            date,
            holdings_count: totals.holdings_count,
            total_market_value: totals.total_market_value,
            data_hash: blake3::hash(
                &serde_json::to_vec(records)
                    .map_err(|e| StoreError::Io(format!("hash serialization: {e}")))?,
            )
            .to_hex()
            .to_string(),
            source: source.to_string(),
            ingested_at: chrono::Local::now().naive_local(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| StoreError::Io(format!("meta serialization: {e}")))?;
        let mut df = records_to_dataframe(records)
            .map_err(|e| StoreError::Parquet(format!("dataframe creation: {e}")))?;

        let path = self.snapshot_path(date);
        let tmp_path = path.with_extension("parquet.tmp");
        let meta_path = self.meta_path(date);
        let meta_tmp = meta_path.with_extension("json.tmp");

        // Both files are staged before anything live is touched.
        write_parquet(&mut df, &tmp_path)?;
        if let Err(e) = fs::write(&meta_tmp, meta_json) {
            discard(&[tmp_path.as_path(), meta_tmp.as_path()]);
            return Err(StoreError::Io(format!("meta write: {e}")));
        }

        let previous_meta = fs::read(&meta_path).ok();
        if let Err(e) = replace_file(&meta_tmp, &meta_path) {
            discard(&[tmp_path.as_path()]);
            return Err(e);
        }
        // The snapshot rename commits the write.
        if let Err(e) = replace_file(&tmp_path, &path) {
            restore_meta(&meta_path, previous_meta);
            return Err(e);
        }

        info!(%date, count = records.len(), source, "snapshot written");
        Ok(meta)
    }

    /// All records for a date, in stored order. Empty when the date has no
    /// snapshot.
    pub fn load_snapshot(&self, date: NaiveDate) -> Result<Vec<HoldingRecord>, StoreError> {
        let path = self.snapshot_path(date);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(format!("open {}: {e}", path.display()))),
        };
        let df = ParquetReader::new(file).finish().map_err(|e| StoreError::Corrupt {
            date,
            reason: format!("read: {e}"),
        })?;
        dataframe_to_records(&df).map_err(|reason| StoreError::Corrupt { date, reason })
    }

    /// Distinct stored dates, ascending.
    pub fn list_available_dates(&self) -> Result<Vec<NaiveDate>, StoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(format!("read dir: {e}"))),
        };

        let mut dates = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::Io(format!("dir entry: {e}")))?;
            let name = entry.file_name();
            let Some(date) = name
                .to_str()
                .and_then(|n| n.strip_prefix(PARTITION_PREFIX))
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            else {
                continue;
            };
            // Partitions whose first write never completed have no live file.
            if self.has_snapshot(date) {
                dates.push(date);
            }
        }
        dates.sort();
        dates.dedup();
        Ok(dates)
    }

    /// Total market value (0 when the date has no rows) and row count.
    pub fn totals_for_date(&self, date: NaiveDate) -> Result<SnapshotTotals, StoreError> {
        let path = self.snapshot_path(date);
        if !path.is_file() {
            return Ok(SnapshotTotals::default());
        }
        let corrupt = |e: PolarsError| StoreError::Corrupt {
            date,
            reason: format!("totals: {e}"),
        };

        let df = LazyFrame::scan_parquet(&path, Default::default())
            .and_then(|lf| {
                lf.select([
                    col("market_value").sum().alias("total_market_value"),
                    len().alias("holdings_count"),
                ])
                .collect()
            })
            .map_err(corrupt)?;

        let total_market_value = df
            .column("total_market_value")
            .and_then(|c| c.get(0))
            .map_err(corrupt)?
            .extract::<f64>()
            .unwrap_or(0.0);
        let holdings_count = df
            .column("holdings_count")
            .and_then(|c| c.get(0))
            .map_err(corrupt)?
            .extract::<u64>()
            .unwrap_or(0) as usize;

        Ok(SnapshotTotals {
            total_market_value,
            holdings_count,
        })
    }

    /// Metadata sidecar for a date, if one was written.
    pub fn snapshot_meta(&self, date: NaiveDate) -> Option<SnapshotMeta> {
        let content = fs::read_to_string(self.meta_path(date)).ok()?;
        serde_json::from_str(&content).ok()
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), StoreError> {
    let file =
        fs::File::create(path).map_err(|e| StoreError::Parquet(format!("create file: {e}")))?;
    if let Err(e) = ParquetWriter::new(file).finish(df) {
        let _ = fs::remove_file(path);
        return Err(StoreError::Parquet(format!("write parquet: {e}")));
    }
    Ok(())
}

/// Rename `tmp` over `path`; the temp file is removed if the rename fails.
fn replace_file(tmp: &Path, path: &Path) -> Result<(), StoreError> {
    fs::rename(tmp, path).map_err(|e| {
        let _ = fs::remove_file(tmp);
        StoreError::Io(format!("atomic rename failed: {e}"))
    })
}

fn discard(paths: &[&Path]) {
    for path in paths {
        let _ = fs::remove_file(path);
    }
}

/// Put back the sidecar that matched the still-live snapshot.
fn restore_meta(meta_path: &Path, previous: Option<Vec<u8>>) {
    let _ = match previous {
        Some(bytes) => fs::write(meta_path, bytes),
        None => fs::remove_file(meta_path),
    };
}

fn dataframe_to_records(df: &DataFrame) -> Result<Vec<HoldingRecord>, String> {
    for name in STORE_COLUMNS {
        if df.column(name).is_err() {
            return Err(format!("missing column '{name}'"));
        }
    }
    let typed = |name: &str, e: PolarsError| format!("{name} column type: {e}");

    let dates = df
        .column("date")
        .and_then(|c| c.date())
        .map_err(|e| typed("date", e))?;
    let tickers = df
        .column("ticker")
        .and_then(|c| c.str())
        .map_err(|e| typed("ticker", e))?;
    let names = df
        .column("name")
        .and_then(|c| c.str())
        .map_err(|e| typed("name", e))?;
    let shares = df
        .column("shares")
        .and_then(|c| c.f64())
        .map_err(|e| typed("shares", e))?;
    let market_values = df
        .column("market_value")
        .and_then(|c| c.f64())
        .map_err(|e| typed("market_value", e))?;
    let weights = df
        .column("weight")
        .and_then(|c| c.f64())
        .map_err(|e| typed("weight", e))?;

    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    let null = |name: &str, i: usize| format!("null {name} at row {i}");

    (0..df.height())
        .map(|i| {
            let days = dates.get(i).ok_or_else(|| null("date", i))?;
            Ok(HoldingRecord {
                date: epoch + chrono::Duration::days(i64::from(days)),
                ticker: tickers.get(i).ok_or_else(|| null("ticker", i))?.to_string(),
                name: names.get(i).ok_or_else(|| null("name", i))?.to_string(),
                shares: shares.get(i).ok_or_else(|| null("shares", i))?,
                market_value: market_values.get(i).ok_or_else(|| null("market_value", i))?,
                weight: weights.get(i).ok_or_else(|| null("weight", i))?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(date: NaiveDate, ticker: &str, shares: f64, market_value: f64) -> HoldingRecord {
        HoldingRecord {
            date,
            ticker: ticker.into(),
            name: format!("{ticker} Corp"),
            shares,
            market_value,
            weight: 1.0,
        }
    }

    #[test]
    fn upsert_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path());
        let d = ymd(2024, 1, 31);
        let records = vec![record(d, "AAPL", 100.0, 1000.0), record(d, "MSFT", 50.0, 900.0)];

        store.upsert(&records, "test").unwrap();

        assert_eq!(store.load_snapshot(d).unwrap(), records);
        assert!(dir.path().join("date=2024-01-31/holdings.parquet").is_file());
        assert!(!dir.path().join("date=2024-01-31/holdings.parquet.tmp").exists());
    }

    #[test]
    fn upsert_replaces_the_whole_date() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path());
        let d = ymd(2024, 1, 31);

        store
            .upsert(&[record(d, "AAPL", 1.0, 10.0), record(d, "MSFT", 1.0, 10.0)], "first")
            .unwrap();
        store.upsert(&[record(d, "NVDA", 2.0, 20.0)], "second").unwrap();

        let loaded = store.load_snapshot(d).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].ticker, "NVDA");
        assert_eq!(store.snapshot_meta(d).unwrap().source, "second");
    }

    #[test]
    fn empty_batch_is_rejected_and_keeps_old_data() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path());
        let d = ymd(2024, 1, 31);
        store.upsert(&[record(d, "AAPL", 1.0, 10.0)], "first").unwrap();

        let err = store.upsert(&[], "empty").unwrap_err();
        assert!(matches!(err, StoreError::EmptyBatch));
        assert_eq!(store.load_snapshot(d).unwrap().len(), 1);
    }

    #[test]
    fn mixed_dates_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path());
        let err = store
            .upsert(
                &[
                    record(ymd(2024, 1, 30), "AAPL", 1.0, 10.0),
                    record(ymd(2024, 1, 31), "MSFT", 1.0, 10.0),
                ],
                "mixed",
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::MixedDates { .. }));
        assert!(store.list_available_dates().unwrap().is_empty());
    }

    #[test]
    fn dates_are_listed_ascending() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path());
        for d in [ymd(2024, 3, 1), ymd(2023, 12, 29), ymd(2024, 1, 31)] {
            store.upsert(&[record(d, "AAPL", 1.0, 10.0)], "test").unwrap();
        }
        fs::create_dir_all(dir.path().join("date=2024-06-30")).unwrap();
        fs::create_dir_all(dir.path().join("scratch")).unwrap();

        assert_eq!(
            store.list_available_dates().unwrap(),
            vec![ymd(2023, 12, 29), ymd(2024, 1, 31), ymd(2024, 3, 1)]
        );
    }

    #[test]
    fn missing_store_and_missing_date_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path().join("not-created-yet"));
        assert!(store.list_available_dates().unwrap().is_empty());
        assert!(store.load_snapshot(ymd(2024, 1, 1)).unwrap().is_empty());
        assert_eq!(
            store.totals_for_date(ymd(2024, 1, 1)).unwrap(),
            SnapshotTotals::default()
        );
    }

    #[test]
    fn totals_sum_market_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path());
        let d = ymd(2024, 1, 31);
        store
            .upsert(
                &[record(d, "AAPL", 1.0, 1000.0), record(d, "TSLA", -3.0, -250.5)],
                "test",
            )
            .unwrap();

        let totals = store.totals_for_date(d).unwrap();
        assert_eq!(totals.holdings_count, 2);
        assert!((totals.total_market_value - 749.5).abs() < 1e-9);
    }

    #[test]
    fn failed_sidecar_write_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path());
        let d = ymd(2024, 1, 31);
        store.upsert(&[record(d, "OLD", 1.0, 10.0)], "first").unwrap();

        // A directory where meta.json belongs cannot be renamed over.
        let meta = dir.path().join("date=2024-01-31/meta.json");
        fs::remove_file(&meta).unwrap();
        fs::create_dir_all(meta.join("blocked")).unwrap();

        let err = store.upsert(&[record(d, "NEW", 2.0, 20.0)], "second").unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));

        let loaded = store.load_snapshot(d).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].ticker, "OLD");
        let part = dir.path().join("date=2024-01-31");
        assert!(!part.join("holdings.parquet.tmp").exists());
        assert!(!part.join("meta.json.tmp").exists());
    }

    #[test]
    fn meta_totals_match_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path());
        let d = ymd(2024, 1, 31);
        let meta = store
            .upsert(&[record(d, "AAPL", 1.0, 1000.0), record(d, "TSLA", -3.0, -250.0)], "test")
            .unwrap();
        assert_eq!(meta.holdings_count, 2);
        assert_eq!(meta.total_market_value, 750.0);
        assert_eq!(store.snapshot_meta(d), Some(meta));
    }

    #[test]
    fn corrupt_snapshot_is_reported_not_removed() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path());
        let d = ymd(2024, 1, 31);
        let part = dir.path().join("date=2024-01-31");
        fs::create_dir_all(&part).unwrap();
        fs::write(part.join("holdings.parquet"), b"not parquet").unwrap();

        assert!(matches!(
            store.load_snapshot(d).unwrap_err(),
            StoreError::Corrupt { .. }
        ));
        assert!(part.join("holdings.parquet").is_file());
    }
}
