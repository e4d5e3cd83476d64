//! Holdings provider trait.
//!
//! Providers turn a remote source into a raw holdings table. Mapping,
//! validation and storage happen downstream in the ingest pipeline, so
//! providers don't know about the store.

pub mod amplify;

pub use amplify::AmplifyProvider;

use polars::prelude::DataFrame;

use crate::error::FetchError;

/// A raw table and where it came from.
#[derive(Debug, Clone)]
pub struct FetchedTable {
    pub frame: DataFrame,
    /// URL the table was read from.
    pub origin: String,
}

/// Trait for remote holdings sources.
pub trait HoldingsProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch the current holdings table. No internal retries.
    fn fetch(&self) -> Result<FetchedTable, FetchError>;
}
