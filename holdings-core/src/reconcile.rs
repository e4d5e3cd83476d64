//! Reconciliation engine: full outer join of two snapshots on ticker.
//!
//! Absence on one side is represented as `None`, never as an error. Deltas
//! treat absence as zero, so an added position's delta is its full end value
//! and a removed position's delta is the negation of its start value.

use chrono::NaiveDate;
use polars::prelude::*;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::warn;

use crate::domain::{HoldingRecord, PositionStatus, ReconciliationRow, SnapshotTotals};
use crate::error::StoreError;
use crate::store::SnapshotStore;

/// Result of comparing two snapshots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Market value delta, descending.
    pub added: Vec<ReconciliationRow>,
    /// Market value delta, ascending (largest exits first).
    pub removed: Vec<ReconciliationRow>,
    /// Market value delta, descending.
    pub changed: Vec<ReconciliationRow>,
    /// Every ticker from either side exactly once, by ticker.
    pub combined: Vec<ReconciliationRow>,
    /// Start and end were the same date; every row is a zero-delta change.
    pub same_date: bool,
}

impl Reconciliation {
    pub fn is_empty(&self) -> bool {
        self.combined.is_empty()
    }
}

/// Join two snapshots on ticker and classify each row.
///
/// Duplicate tickers within one side resolve last-wins.
pub fn reconcile(start: &[HoldingRecord], end: &[HoldingRecord]) -> Reconciliation {
    let start_by_ticker: BTreeMap<&str, &HoldingRecord> =
        start.iter().map(|r| (r.ticker.as_str(), r)).collect();
    let end_by_ticker: BTreeMap<&str, &HoldingRecord> =
        end.iter().map(|r| (r.ticker.as_str(), r)).collect();

    let mut tickers: Vec<&str> = start_by_ticker
        .keys()
        .chain(end_by_ticker.keys())
        .copied()
        .collect();
    tickers.sort_unstable();
    tickers.dedup();

    let combined: Vec<ReconciliationRow> = tickers
        .into_iter()
        .map(|ticker| {
            join_row(
                ticker,
                start_by_ticker.get(ticker).copied(),
                end_by_ticker.get(ticker).copied(),
            )
        })
        .collect();

    let partition = |status: PositionStatus| -> Vec<ReconciliationRow> {
        combined
            .iter()
            .filter(|row| row.status == status)
            .cloned()
            .collect()
    };
    let mut added = partition(PositionStatus::Added);
    let mut removed = partition(PositionStatus::Removed);
    let mut changed = partition(PositionStatus::Changed);

    // Stable sorts: ties keep ticker order.
    added.sort_by(|a, b| by_market_value_delta(b, a));
    removed.sort_by(by_market_value_delta);
    changed.sort_by(|a, b| by_market_value_delta(b, a));

    Reconciliation {
        added,
        removed,
        changed,
        combined,
        same_date: false,
    }
}

fn by_market_value_delta(a: &ReconciliationRow, b: &ReconciliationRow) -> Ordering {
    a.market_value_delta.total_cmp(&b.market_value_delta)
}

fn join_row(
    ticker: &str,
    start: Option<&HoldingRecord>,
    end: Option<&HoldingRecord>,
) -> ReconciliationRow {
    let status = match (start, end) {
        (None, _) => PositionStatus::Added,
        (_, None) => PositionStatus::Removed,
        _ => PositionStatus::Changed,
    };
    let name = end
        .or(start)
        .map(|r| r.name.clone())
        .unwrap_or_default();

    let start_shares = start.map(|r| r.shares);
    let end_shares = end.map(|r| r.shares);
    let start_market_value = start.map(|r| r.market_value);
    let end_market_value = end.map(|r| r.market_value);

    ReconciliationRow {
        ticker: ticker.to_string(),
        name,
        start_shares,
        end_shares,
        start_market_value,
        end_market_value,
        start_weight: start.map(|r| r.weight),
        end_weight: end.map(|r| r.weight),
        status,
        shares_delta: end_shares.unwrap_or(0.0) - start_shares.unwrap_or(0.0),
        market_value_delta: end_market_value.unwrap_or(0.0) - start_market_value.unwrap_or(0.0),
    }
}

// ── Store-backed query surface ──────────────────────────────────────

/// Load both snapshots and reconcile them. A date without a snapshot is an
/// empty side, not an error.
pub fn compare_holdings(
    store: &SnapshotStore,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Reconciliation, StoreError> {
    if start == end {
        warn!(%start, "comparing a snapshot with itself");
    }
    let start_rows = store.load_snapshot(start)?;
    let end_rows = if start == end {
        start_rows.clone()
    } else {
        store.load_snapshot(end)?
    };

    let mut result = reconcile(&start_rows, &end_rows);
    result.same_date = start == end;
    Ok(result)
}

pub fn get_available_dates(store: &SnapshotStore) -> Result<Vec<NaiveDate>, StoreError> {
    store.list_available_dates()
}

pub fn get_totals_for_date(
    store: &SnapshotStore,
    date: NaiveDate,
) -> Result<SnapshotTotals, StoreError> {
    store.totals_for_date(date)
}

/// Rows as a frame for tabular consumers (export, display).
pub fn to_dataframe(rows: &[ReconciliationRow]) -> PolarsResult<DataFrame> {
    let opt = |f: fn(&ReconciliationRow) -> Option<f64>| rows.iter().map(f).collect::<Vec<_>>();

    DataFrame::new(vec![
        Column::new(
            "ticker".into(),
            rows.iter().map(|r| r.ticker.as_str()).collect::<Vec<_>>(),
        ),
        Column::new(
            "name".into(),
            rows.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
        ),
        Column::new("start_shares".into(), opt(|r| r.start_shares)),
        Column::new("end_shares".into(), opt(|r| r.end_shares)),
        Column::new("start_market_value".into(), opt(|r| r.start_market_value)),
        Column::new("end_market_value".into(), opt(|r| r.end_market_value)),
        Column::new("start_weight".into(), opt(|r| r.start_weight)),
        Column::new("end_weight".into(), opt(|r| r.end_weight)),
        Column::new(
            "status".into(),
            rows.iter().map(|r| r.status.as_str()).collect::<Vec<_>>(),
        ),
        Column::new(
            "shares_delta".into(),
            rows.iter().map(|r| r.shares_delta).collect::<Vec<_>>(),
        ),
        Column::new(
            "market_value_delta".into(),
            rows.iter().map(|r| r.market_value_delta).collect::<Vec<_>>(),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rec(date: NaiveDate, ticker: &str, shares: f64, market_value: f64) -> HoldingRecord {
        HoldingRecord {
            date,
            ticker: ticker.into(),
            name: format!("{ticker} Inc"),
            shares,
            market_value,
            weight: 5.0,
        }
    }

    fn tickers(rows: &[ReconciliationRow]) -> Vec<&str> {
        rows.iter().map(|r| r.ticker.as_str()).collect()
    }

    #[test]
    fn added_and_changed_positions() {
        let d0 = ymd(2024, 1, 1);
        let d1 = ymd(2024, 1, 2);
        let start = vec![rec(d0, "AAPL", 100.0, 1000.0)];
        let end = vec![rec(d1, "AAPL", 150.0, 1600.0), rec(d1, "MSFT", 50.0, 900.0)];

        let result = reconcile(&start, &end);

        assert!(result.removed.is_empty());
        assert_eq!(tickers(&result.added), ["MSFT"]);
        assert_eq!(result.added[0].shares_delta, 50.0);
        assert_eq!(result.added[0].market_value_delta, 900.0);
        assert_eq!(result.added[0].start_shares, None);

        assert_eq!(tickers(&result.changed), ["AAPL"]);
        assert_eq!(result.changed[0].shares_delta, 50.0);
        assert_eq!(result.changed[0].market_value_delta, 600.0);
        assert_eq!(tickers(&result.combined), ["AAPL", "MSFT"]);
    }

    #[test]
    fn removed_position_has_negated_start_values() {
        let d = ymd(2024, 1, 1);
        let result = reconcile(&[rec(d, "X", 40.0, 400.0)], &[]);

        assert_eq!(result.removed.len(), 1);
        let x = &result.removed[0];
        assert_eq!(x.status, PositionStatus::Removed);
        assert_eq!(x.end_shares, None);
        assert_eq!(x.shares_delta, -40.0);
        assert_eq!(x.market_value_delta, -400.0);
        assert_eq!(x.name, "X Inc");
    }

    #[test]
    fn partitions_are_sorted_by_market_value_delta() {
        let d = ymd(2024, 1, 1);
        let start = vec![
            rec(d, "R1", 1.0, 100.0),
            rec(d, "R2", 1.0, 900.0),
            rec(d, "C1", 1.0, 100.0),
            rec(d, "C2", 1.0, 100.0),
        ];
        let end = vec![
            rec(d, "A1", 1.0, 50.0),
            rec(d, "A2", 1.0, 500.0),
            rec(d, "C1", 1.0, 90.0),
            rec(d, "C2", 1.0, 300.0),
        ];
        let result = reconcile(&start, &end);

        assert_eq!(tickers(&result.added), ["A2", "A1"]);
        assert_eq!(tickers(&result.removed), ["R2", "R1"]);
        assert_eq!(tickers(&result.changed), ["C2", "C1"]);
        assert_eq!(result.combined.len(), 6);
    }

    #[test]
    fn name_prefers_end_snapshot() {
        let d = ymd(2024, 1, 1);
        let mut old = rec(d, "META", 1.0, 1.0);
        old.name = "Facebook".into();
        let mut new = rec(d, "META", 1.0, 1.0);
        new.name = "Meta Platforms".into();

        let result = reconcile(&[old], &[new]);
        assert_eq!(result.combined[0].name, "Meta Platforms");
    }

    #[test]
    fn empty_sides_are_not_errors() {
        let d = ymd(2024, 1, 1);
        let all_added = reconcile(&[], &[rec(d, "A", 1.0, 1.0)]);
        assert_eq!(all_added.added.len(), 1);
        assert!(reconcile(&[], &[]).is_empty());
    }

    #[test]
    fn weight_delta_counts_absence_as_zero() {
        let d = ymd(2024, 1, 1);
        let result = reconcile(&[], &[rec(d, "A", 1.0, 1.0)]);
        assert_eq!(result.added[0].weight_delta(), 5.0);
    }

    #[test]
    fn frame_has_presentation_columns() {
        let d = ymd(2024, 1, 1);
        let result = reconcile(&[rec(d, "X", 1.0, 10.0)], &[rec(d, "Y", 2.0, 20.0)]);
        let df = to_dataframe(&result.combined).unwrap();
        assert_eq!(df.shape(), (2, 11));
        let statuses = df.column("status").unwrap().str().unwrap();
        assert_eq!(statuses.get(0), Some("removed"));
        assert_eq!(statuses.get(1), Some("added"));
        assert_eq!(df.column("end_shares").unwrap().null_count(), 1);
    }

    #[test]
    fn same_date_comparison_is_all_zero_changes() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path());
        let d = ymd(2024, 2, 29);
        store
            .upsert(&[rec(d, "AAPL", 1.0, 10.0), rec(d, "MSFT", 2.0, 20.0)], "test")
            .unwrap();

        let result = compare_holdings(&store, d, d).unwrap();
        assert!(result.same_date);
        assert_eq!(result.changed.len(), 2);
        assert!(result.added.is_empty() && result.removed.is_empty());
        assert!(result.combined.iter().all(|r| r.market_value_delta == 0.0));
    }

    #[test]
    fn compare_against_missing_date_is_all_removed() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path());
        let d = ymd(2024, 2, 29);
        store.upsert(&[rec(d, "AAPL", 1.0, 10.0)], "test").unwrap();

        let result = compare_holdings(&store, d, ymd(2024, 3, 1)).unwrap();
        assert!(!result.same_date);
        assert_eq!(tickers(&result.removed), ["AAPL"]);
        assert_eq!(get_available_dates(&store).unwrap(), vec![d]);
        assert_eq!(get_totals_for_date(&store, d).unwrap().holdings_count, 1);
    }
}
