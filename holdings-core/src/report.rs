//! Presentation helpers over reconciliation results: position filters,
//! totals re-derived from a filtered table, and biggest movers.

use serde::{Deserialize, Serialize};

use crate::domain::{ReconciliationRow, Side, SnapshotTotals};
use crate::reconcile::Reconciliation;

/// Rows to hide from display or leave out of totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionFilter {
    /// Hide rows whose ticker or name mentions "cash" (any case).
    pub hide_cash: bool,
    /// Tickers to hide, compared case-insensitively.
    pub excluded_tickers: Vec<String>,
}

impl PositionFilter {
    pub fn is_active(&self) -> bool {
        self.hide_cash || !self.excluded_tickers.is_empty()
    }

    pub fn is_hidden(&self, row: &ReconciliationRow) -> bool {
        if self.hide_cash && (contains_cash(&row.ticker) || contains_cash(&row.name)) {
            return true;
        }
        self.excluded_tickers
            .iter()
            .any(|t| t.eq_ignore_ascii_case(row.ticker.trim()))
    }

    /// Visible rows, order preserved.
    pub fn filter_rows(&self, rows: &[ReconciliationRow]) -> Vec<ReconciliationRow> {
        rows.iter().filter(|r| !self.is_hidden(r)).cloned().collect()
    }

    /// Apply to every partition of a result.
    pub fn apply(&self, result: &Reconciliation) -> Reconciliation {
        if !self.is_active() {
            return result.clone();
        }
        Reconciliation {
            added: self.filter_rows(&result.added),
            removed: self.filter_rows(&result.removed),
            changed: self.filter_rows(&result.changed),
            combined: self.filter_rows(&result.combined),
            same_date: result.same_date,
        }
    }
}

fn contains_cash(text: &str) -> bool {
    text.to_lowercase().contains("cash")
}

/// Totals for one side of a (possibly filtered) combined table: the sum of
/// present market values and the count of present share figures.
pub fn totals_from_combined(rows: &[ReconciliationRow], side: Side) -> SnapshotTotals {
    SnapshotTotals {
        total_market_value: rows.iter().filter_map(|r| r.market_value(side)).sum(),
        holdings_count: rows.iter().filter(|r| r.shares(side).is_some()).count(),
    }
}

/// Headline figures for a comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComparisonSummary {
    pub start: SnapshotTotals,
    pub end: SnapshotTotals,
    pub added_count: usize,
    pub removed_count: usize,
}

impl ComparisonSummary {
    pub fn new(
        start: SnapshotTotals,
        end: SnapshotTotals,
        result: &Reconciliation,
    ) -> Self {
        Self {
            start,
            end,
            added_count: result.added.len(),
            removed_count: result.removed.len(),
        }
    }

    pub fn market_value_delta(&self) -> f64 {
        self.end.total_market_value - self.start.total_market_value
    }

    pub fn holdings_delta(&self) -> i64 {
        self.end.holdings_count as i64 - self.start.holdings_count as i64
    }
}

/// Delta used to rank movers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoverMetric {
    Shares,
    #[default]
    MarketValue,
}

impl MoverMetric {
    pub fn delta(self, row: &ReconciliationRow) -> f64 {
        match self {
            MoverMetric::Shares => row.shares_delta,
            MoverMetric::MarketValue => row.market_value_delta,
        }
    }
}

/// The `limit` largest non-zero moves by absolute delta, largest first.
pub fn biggest_movers(
    rows: &[ReconciliationRow],
    metric: MoverMetric,
    limit: usize,
) -> Vec<ReconciliationRow> {
    let mut movers: Vec<ReconciliationRow> = rows
        .iter()
        .filter(|r| metric.delta(r) != 0.0)
        .cloned()
        .collect();
    movers.sort_by(|a, b| metric.delta(b).abs().total_cmp(&metric.delta(a).abs()));
    movers.truncate(limit);
    movers
}
