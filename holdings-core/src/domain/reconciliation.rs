//! ReconciliationRow — one ticker's movement between two snapshots.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a ticker moved between the start and end snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    /// Absent at start.
    Added,
    /// Absent at end.
    Removed,
    /// Present on both sides (whether or not anything moved).
    Changed,
}

impl PositionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PositionStatus::Added => "added",
            PositionStatus::Removed => "removed",
            PositionStatus::Changed => "changed",
        }
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which snapshot of a comparison a figure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Start,
    End,
}

/// Derived, never persisted.
///
/// `None` on a side means the ticker was absent from that snapshot. Deltas
/// treat absence as zero and are therefore always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationRow {
    pub ticker: String,
    pub name: String,
    pub start_shares: Option<f64>,
    pub end_shares: Option<f64>,
    pub start_market_value: Option<f64>,
    pub end_market_value: Option<f64>,
    pub start_weight: Option<f64>,
    pub end_weight: Option<f64>,
    pub status: PositionStatus,
    pub shares_delta: f64,
    pub market_value_delta: f64,
}

impl ReconciliationRow {
    pub fn shares(&self, side: Side) -> Option<f64> {
        match side {
            Side::Start => self.start_shares,
            Side::End => self.end_shares,
        }
    }

    pub fn market_value(&self, side: Side) -> Option<f64> {
        match side {
            Side::Start => self.start_market_value,
            Side::End => self.end_market_value,
        }
    }

    pub fn weight(&self, side: Side) -> Option<f64> {
        match side {
            Side::Start => self.start_weight,
            Side::End => self.end_weight,
        }
    }

    /// Weight change in percentage points; absent sides count as zero.
    pub fn weight_delta(&self) -> f64 {
        self.end_weight.unwrap_or(0.0) - self.start_weight.unwrap_or(0.0)
    }
}
