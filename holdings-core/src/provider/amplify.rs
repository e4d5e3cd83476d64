//! Amplify ETFs holdings provider.
//!
//! Source preference, first hit wins:
//! 1. a `.csv` link on the fund's holdings page
//! 2. the shared holdings feed, filtered to the fund's rows
//! 3. HTML tables on the holdings page
//!
//! A failed page request is not fatal: the feed needs only the fund ticker,
//! which falls back to the configured default.

use polars::prelude::*;
use regex::Regex;
use reqwest::Url;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{FetchedTable, HoldingsProvider};
use crate::config::TrackerConfig;
use crate::error::FetchError;
use crate::ingest::mapper::{cell_text, pick_holdings_table};
use crate::ingest::reader::{read_csv, read_html_tables};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Feed columns naming the fund a row belongs to, by preference.
const FEED_FUND_COLUMNS: [&str; 3] = ["Account", "Account Ticker", "Fund Ticker"];

pub struct AmplifyProvider {
    client: reqwest::blocking::Client,
    holdings_url: String,
    feed_url: String,
    default_fund_ticker: String,
}

impl AmplifyProvider {
    pub fn new(
        holdings_url: impl Into<String>,
        feed_url: impl Into<String>,
        default_fund_ticker: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            holdings_url: holdings_url.into(),
            feed_url: feed_url.into(),
            default_fund_ticker: default_fund_ticker.into(),
        })
    }

    pub fn from_config(config: &TrackerConfig) -> Result<Self, FetchError> {
        Self::new(
            config.holdings_url.clone(),
            config.feed_url.clone(),
            config.fund_ticker.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Point at a different holdings page (e.g. `ingest --url`).
    pub fn with_holdings_url(mut self, url: impl Into<String>) -> Self {
        self.holdings_url = url.into();
        self
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response, FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| FetchError::Network(format!("{url}: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(resp)
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.get(url)?
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| FetchError::Network(format!("{url}: {e}")))
    }

    fn get_text(&self, url: &str) -> Result<String, FetchError> {
        self.get(url)?
            .text()
            .map_err(|e| FetchError::Network(format!("{url}: {e}")))
    }

    /// Shared feed rows for one fund. `None` when the feed is unreachable.
    fn fetch_feed(&self, fund_ticker: &str) -> Result<Option<DataFrame>, FetchError> {
        let bytes = match self.get_bytes(&self.feed_url) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(url = %self.feed_url, error = %e, "holdings feed unavailable");
                return Ok(None);
            }
        };
        let Some(feed) = read_csv(&bytes)? else {
            return Ok(None);
        };
        Ok(Some(filter_feed(&feed, fund_ticker).map_err(crate::error::IngestError::from)?))
    }
}

impl HoldingsProvider for AmplifyProvider {
    fn name(&self) -> &str {
        "Amplify ETFs"
    }

    fn fetch(&self) -> Result<FetchedTable, FetchError> {
        let page = match self.get_text(&self.holdings_url) {
            Ok(html) => Some(html),
            Err(e) => {
                warn!(url = %self.holdings_url, error = %e, "holdings page unavailable");
                None
            }
        };
        let fund_ticker = page
            .as_deref()
            .and_then(extract_fund_ticker)
            .unwrap_or_else(|| self.default_fund_ticker.clone());
        debug!(%fund_ticker, "resolved fund ticker");

        if let Some(link) = page
            .as_deref()
            .and_then(|html| find_csv_link(html, &self.holdings_url))
        {
            info!(url = %link, "downloading linked holdings CSV");
            let bytes = self.get_bytes(&link)?;
            let frame = read_csv(&bytes)?
                .ok_or_else(|| FetchError::NoHoldings(link.clone()))?;
            return Ok(FetchedTable {
                frame,
                origin: link,
            });
        }

        if let Some(frame) = self.fetch_feed(&fund_ticker)? {
            if frame.height() > 0 {
                info!(url = %self.feed_url, rows = frame.height(), "using shared holdings feed");
                return Ok(FetchedTable {
                    frame,
                    origin: self.feed_url.clone(),
                });
            }
        }

        if let Some(html) = page {
            let tables = read_html_tables(&html)?;
            if let Some(frame) = pick_holdings_table(tables) {
                info!(url = %self.holdings_url, "using holdings page table");
                return Ok(FetchedTable {
                    frame,
                    origin: self.holdings_url.clone(),
                });
            }
        }

        Err(FetchError::NoHoldings(self.holdings_url.clone()))
    }
}

// ── Page scraping helpers ───────────────────────────────────────────

fn csv_href_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)href=["']([^"']+\.csv[^"']*)["']"#).ok())
        .as_ref()
}

fn fund_name_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"AmplifyFundName\s*=\s*['"]([^'"]+)['"]"#).ok())
        .as_ref()
}

/// First `.csv` href on the page, resolved against the page URL.
pub fn find_csv_link(html: &str, base_url: &str) -> Option<String> {
    let href = csv_href_re()?.captures(html)?.get(1)?.as_str();
    let base = Url::parse(base_url).ok()?;
    base.join(href).ok().map(String::from)
}

/// Fund ticker from the page's `AmplifyFundName = '...'` script variable.
pub fn extract_fund_ticker(html: &str) -> Option<String> {
    let name = fund_name_re()?.captures(html)?.get(1)?.as_str().trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Keep feed rows belonging to `fund_ticker` (case-insensitive), using the
/// first fund column present. A feed without any fund column is kept whole.
pub fn filter_feed(feed: &DataFrame, fund_ticker: &str) -> PolarsResult<DataFrame> {
    let Some(column) = FEED_FUND_COLUMNS
        .iter()
        .find_map(|name| feed.column(name).ok())
    else {
        return Ok(feed.clone());
    };

    let wanted = fund_ticker.trim().to_uppercase();
    let series = column.as_materialized_series();
    let mask: Vec<bool> = (0..series.len())
        .map(|i| {
            series
                .get(i)
                .ok()
                .and_then(|v| cell_text(&v))
                .is_some_and(|t| t.trim().to_uppercase() == wanted)
        })
        .collect();
    feed.filter(&BooleanChunked::from_slice("mask".into(), &mask))
}
