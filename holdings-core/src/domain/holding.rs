//! HoldingRecord — one position in the fund on one as-of date.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single validated position.
///
/// Within one date, `ticker` is unique. Records are written verbatim by the
/// snapshot store and only ever replaced as part of a whole-date upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingRecord {
    pub date: NaiveDate,
    /// Upper-cased, trimmed, non-empty.
    pub ticker: String,
    /// Trimmed, non-empty.
    pub name: String,
    /// Negative for short positions.
    pub shares: f64,
    /// In the fund's base currency.
    pub market_value: f64,
    /// Percent of net asset value (nominally 0-100).
    pub weight: f64,
}

/// The five fields every source is mapped into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Ticker,
    Name,
    Shares,
    MarketValue,
    Weight,
}

impl CanonicalField {
    /// Fields without which a source cannot be ingested.
    pub const REQUIRED: [CanonicalField; 4] = [
        CanonicalField::Ticker,
        CanonicalField::Name,
        CanonicalField::Shares,
        CanonicalField::MarketValue,
    ];

    /// Column name in the canonical frame and in the store.
    pub fn as_str(self) -> &'static str {
        match self {
            CanonicalField::Ticker => "ticker",
            CanonicalField::Name => "name",
            CanonicalField::Shares => "shares",
            CanonicalField::MarketValue => "market_value",
            CanonicalField::Weight => "weight",
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate figures for one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SnapshotTotals {
    pub total_market_value: f64,
    pub holdings_count: usize,
}

impl SnapshotTotals {
    pub fn from_records(records: &[HoldingRecord]) -> Self {
        Self {
            total_market_value: records.iter().map(|r| r.market_value).sum(),
            holdings_count: records.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ticker: &str, shares: f64, market_value: f64) -> HoldingRecord {
        HoldingRecord {
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            ticker: ticker.into(),
            name: format!("{ticker} Inc"),
            shares,
            market_value,
            weight: 0.0,
        }
    }

    #[test]
    fn totals_sum_market_value_and_count_rows() {
        let totals = SnapshotTotals::from_records(&[
            record("AAPL", 10.0, 1500.0),
            record("MSFT", -5.0, -250.0),
        ]);
        assert_eq!(totals.total_market_value, 1250.0);
        assert_eq!(totals.holdings_count, 2);
    }

    #[test]
    fn empty_snapshot_totals_are_zero() {
        assert_eq!(SnapshotTotals::from_records(&[]), SnapshotTotals::default());
    }

    #[test]
    fn canonical_field_names_match_store_columns() {
        let names: Vec<&str> = CanonicalField::REQUIRED.iter().map(|f| f.as_str()).collect();
        assert_eq!(names, ["ticker", "name", "shares", "market_value"]);
        assert_eq!(CanonicalField::Weight.to_string(), "weight");
        assert!(!CanonicalField::REQUIRED.contains(&CanonicalField::Weight));
    }
}
