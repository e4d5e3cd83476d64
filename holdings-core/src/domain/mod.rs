//! Domain types for holdings snapshots

pub mod holding;
pub mod reconciliation;

pub use holding::{CanonicalField, HoldingRecord, SnapshotTotals};
pub use reconciliation::{PositionStatus, ReconciliationRow, Side};
