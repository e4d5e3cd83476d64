//! Tracker configuration, stored as TOML.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration. Command-line flags override file values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_HOLDINGS_URL: &str = "https://amplifyetfs.com/yyy-holdings/";
pub const DEFAULT_FEED_URL: &str =
    "https://amplifyetfs.com/wp-content/uploads/feeds/AmplifyWeb.40XL.XL_Holdings.csv";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Snapshot store directory.
    pub store_dir: PathBuf,
    /// Fund ticker used to filter the shared holdings feed when the page
    /// doesn't name one.
    pub fund_ticker: String,
    pub holdings_url: String,
    pub feed_url: String,
    /// HTTP timeout per request.
    pub timeout_secs: u64,
    /// Tickers hidden by `compare --hide-excluded`.
    pub excluded_tickers: Vec<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("holdings"),
            fund_ticker: "YYY".into(),
            holdings_url: DEFAULT_HOLDINGS_URL.into(),
            feed_url: DEFAULT_FEED_URL.into(),
            timeout_secs: 30,
            excluded_tickers: vec!["AGPXX".into()],
        }
    }
}

impl TrackerConfig {
    /// Load a configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("read config file {}: {e}", path.display()))?;
        Self::from_toml(&content)
    }

    /// Parse a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| format!("parse config TOML: {e}"))
    }

    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("serialize config: {e}"))
    }
}
