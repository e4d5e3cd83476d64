//! Holdings Core — ingestion, snapshot storage and reconciliation for ETF
//! holdings files.
//!
//! This crate contains:
//! - Domain types (holding records, reconciliation rows, totals)
//! - Source readers for CSV, Excel workbooks and HTML tables
//! - Schema mapping, numeric normalization and row validation
//! - A date-partitioned Parquet snapshot store with upsert-by-date
//! - The reconciliation engine and presentation helpers
//! - A web provider and a file backfill orchestrator

pub mod backfill;
pub mod config;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod provider;
pub mod reconcile;
pub mod report;
pub mod store;

pub use config::TrackerConfig;
pub use domain::{HoldingRecord, PositionStatus, ReconciliationRow, Side, SnapshotTotals};
pub use error::{FetchError, IngestError, StoreError};
pub use reconcile::{compare_holdings, reconcile, Reconciliation};
pub use store::SnapshotStore;
