//! Schema mapper: inconsistent source columns → the canonical five.
//!
//! Matching works on normalized keys (lower-case, alphanumerics only) and an
//! explicit, ordered alias table per canonical field. The first alias present
//! in the source wins.

use polars::prelude::*;
use std::collections::BTreeMap;
use tracing::debug;

use super::normalize::parse_number;
use super::validate::{SkipReason, SkippedRow};
use crate::domain::CanonicalField;
use crate::error::IngestError;

pub const TICKER_ALIASES: &[&str] = &["ticker", "symbol", "stockticker"];
pub const NAME_ALIASES: &[&str] = &["name", "holding", "security", "securityname"];
pub const SHARES_ALIASES: &[&str] = &["shares", "shs", "sharesparvalue"];
pub const MARKET_VALUE_ALIASES: &[&str] = &["marketvalue", "marketvalueusd"];
pub const WEIGHT_ALIASES: &[&str] = &[
    "weight",
    "weighting",
    "weightings",
    "percentofnav",
    "weightofnav",
    "percentofnetassets",
    "pctofnav",
    "percentmarketvalue",
];

/// Alias table, evaluated in this order.
pub const FIELD_ALIASES: [(CanonicalField, &[&str]); 5] = [
    (CanonicalField::Ticker, TICKER_ALIASES),
    (CanonicalField::Name, NAME_ALIASES),
    (CanonicalField::Shares, SHARES_ALIASES),
    (CanonicalField::MarketValue, MARKET_VALUE_ALIASES),
    (CanonicalField::Weight, WEIGHT_ALIASES),
];

/// Tickers that mark footer/summary rows rather than positions.
const SUMMARY_TICKERS: [&str; 2] = ["total", "nan"];

/// Normalize a column name for alias matching.
///
/// A leading `%` reads as "percent" (`"% of NAV"` → `"percentofnav"`); every
/// other non-alphanumeric character is dropped.
pub fn normalize_key(name: &str) -> String {
    let trimmed = name.trim();
    let (prefix, rest) = match trimmed.strip_prefix('%') {
        Some(rest) => ("percent", rest),
        None => ("", trimmed),
    };
    let mut key = String::from(prefix);
    key.extend(
        rest.chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase),
    );
    key
}

/// Which source column feeds each canonical field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnMapping {
    columns: BTreeMap<CanonicalField, String>,
}

impl ColumnMapping {
    pub fn source(&self, field: CanonicalField) -> Option<&str> {
        self.columns.get(&field).map(String::as_str)
    }

    /// Required fields that no source column maps to.
    pub fn missing_required(&self) -> Vec<CanonicalField> {
        CanonicalField::REQUIRED
            .into_iter()
            .filter(|f| !self.columns.contains_key(f))
            .collect()
    }
}

/// Resolve the alias table against a frame's column names.
pub fn resolve_columns(df: &DataFrame) -> ColumnMapping {
    let keyed: Vec<(String, &str)> = df
        .get_columns()
        .iter()
        .map(|c| (normalize_key(c.name().as_str()), c.name().as_str()))
        .collect();
    let lookup = |key: &str| keyed.iter().find(|(k, _)| k == key).map(|(_, name)| *name);

    let mut columns = BTreeMap::new();
    for (field, aliases) in FIELD_ALIASES {
        if let Some(source) = aliases.iter().find_map(|alias| lookup(*alias)) {
            columns.insert(field, source.to_string());
        }
    }

    // Best-effort: any unclaimed "...weight..." column that isn't an average.
    if !columns.contains_key(&CanonicalField::Weight) {
        let claimed: Vec<&String> = columns.values().collect();
        let fallback = keyed.iter().find(|(key, name)| {
            key.contains("weight")
                && !key.contains("average")
                && !key.contains("avg")
                && !claimed.iter().any(|c| c.as_str() == *name)
        });
        if let Some((_, name)) = fallback {
            debug!(column = *name, "weight mapped by substring fallback");
            columns.insert(CanonicalField::Weight, name.to_string());
        }
    }

    ColumnMapping { columns }
}

/// Whether a frame's columns include a ticker-like alias.
pub fn has_ticker_column(df: &DataFrame) -> bool {
    df.get_columns()
        .iter()
        .any(|c| TICKER_ALIASES.contains(&normalize_key(c.name().as_str()).as_str()))
}

/// Choose the holdings table among several parsed tables or sheets.
///
/// The first table with a ticker-like column wins; otherwise the first table.
pub fn pick_holdings_table(tables: Vec<DataFrame>) -> Option<DataFrame> {
    let idx = tables.iter().position(has_ticker_column).unwrap_or(0);
    tables.into_iter().nth(idx)
}

/// Mapped, cleaned canonical rows plus what was dropped on the way.
#[derive(Debug, Clone)]
pub struct MappedTable {
    /// Columns: ticker, name, shares, market_value, weight.
    pub frame: DataFrame,
    /// Source data-row index of each frame row.
    pub source_rows: Vec<usize>,
    pub dropped: Vec<SkippedRow>,
    pub mapping: ColumnMapping,
}

/// Map a source frame onto the canonical schema, keeping diagnostics.
pub fn map_table(df: &DataFrame) -> Result<MappedTable, IngestError> {
    let mapping = resolve_columns(df);
    let missing = mapping.missing_required();
    if !missing.is_empty() {
        return Err(IngestError::MissingColumns { missing });
    }
    debug!(?mapping, "resolved canonical columns");

    let tickers = source_series(df, &mapping, CanonicalField::Ticker)?;
    let names = source_series(df, &mapping, CanonicalField::Name)?;
    let shares = source_series(df, &mapping, CanonicalField::Shares)?;
    let market_values = source_series(df, &mapping, CanonicalField::MarketValue)?;
    let weights = source_series(df, &mapping, CanonicalField::Weight)?;

    let mut rows: Vec<PendingRow> = Vec::with_capacity(df.height());
    let mut dropped = Vec::new();

    for i in 0..df.height() {
        let ticker = text_at(tickers, i).to_uppercase();
        if ticker.is_empty() || SUMMARY_TICKERS.contains(&ticker.to_lowercase().as_str()) {
            dropped.push(SkippedRow::new(i, &ticker, SkipReason::SummaryRow));
            continue;
        }
        rows.push(PendingRow {
            source_row: i,
            ticker,
            name: text_at(names, i),
            shares: number_at(shares, i),
            market_value: number_at(market_values, i),
            weight: number_at(weights, i),
        });
    }

    backfill_weights(&mut rows);

    let mut kept = Vec::with_capacity(rows.len());
    for row in rows {
        let reason = if row.shares.is_none() {
            Some(SkipReason::MissingShares)
        } else if row.market_value.is_none() {
            Some(SkipReason::MissingMarketValue)
        } else if row.weight.is_none() {
            Some(SkipReason::MissingWeight)
        } else {
            None
        };
        match reason {
            Some(reason) => dropped.push(SkippedRow::new(row.source_row, &row.ticker, reason)),
            None => kept.push(row),
        }
    }

    let frame = DataFrame::new(vec![
        Column::new(
            CanonicalField::Ticker.as_str().into(),
            kept.iter().map(|r| r.ticker.as_str()).collect::<Vec<_>>(),
        ),
        Column::new(
            CanonicalField::Name.as_str().into(),
            kept.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
        ),
        Column::new(
            CanonicalField::Shares.as_str().into(),
            kept.iter().map(|r| r.shares).collect::<Vec<_>>(),
        ),
        Column::new(
            CanonicalField::MarketValue.as_str().into(),
            kept.iter().map(|r| r.market_value).collect::<Vec<_>>(),
        ),
        Column::new(
            CanonicalField::Weight.as_str().into(),
            kept.iter().map(|r| r.weight).collect::<Vec<_>>(),
        ),
    ])?;

    Ok(MappedTable {
        frame,
        source_rows: kept.iter().map(|r| r.source_row).collect(),
        dropped,
        mapping,
    })
}

/// Map a source frame onto exactly the canonical columns.
pub fn map_columns(df: &DataFrame) -> Result<DataFrame, IngestError> {
    map_table(df).map(|mapped| mapped.frame)
}

fn source_series<'a>(
    df: &'a DataFrame,
    mapping: &ColumnMapping,
    field: CanonicalField,
) -> Result<Option<&'a Series>, IngestError> {
    match mapping.source(field) {
        Some(name) => Ok(Some(df.column(name)?.as_materialized_series())),
        None => Ok(None),
    }
}

fn text_at(series: Option<&Series>, idx: usize) -> String {
    series
        .and_then(|s| s.get(idx).ok())
        .and_then(|v| cell_text(&v))
        .map(|t| t.trim().to_string())
        .unwrap_or_default()
}

fn number_at(series: Option<&Series>, idx: usize) -> Option<f64> {
    series
        .and_then(|s| s.get(idx).ok())
        .and_then(|v| parse_number(&v))
}

struct PendingRow {
    source_row: usize,
    ticker: String,
    name: String,
    shares: Option<f64>,
    market_value: Option<f64>,
    weight: Option<f64>,
}

/// Missing weights become `market_value / sum(market_value) * 100`.
fn backfill_weights(rows: &mut [PendingRow]) {
    if rows.iter().all(|r| r.weight.is_some()) {
        return;
    }
    let total: f64 = rows.iter().filter_map(|r| r.market_value).sum();
    if total == 0.0 {
        return;
    }
    for row in rows.iter_mut().filter(|r| r.weight.is_none()) {
        row.weight = row.market_value.map(|mv| mv * 100.0 / total);
    }
}

/// Render a cell as text; `None` for nulls.
pub(crate) fn cell_text(value: &AnyValue<'_>) -> Option<String> {
    match value {
        AnyValue::Null => None,
        AnyValue::String(s) => Some(s.to_string()),
        AnyValue::StringOwned(s) => Some(s.to_string()),
        AnyValue::Float64(v) if v.fract() == 0.0 && v.abs() < 1e15 => Some(format!("{}", *v as i64)),
        AnyValue::Float64(v) => Some(v.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_key_strips_punctuation_and_case() {
        assert_eq!(normalize_key("% of NAV"), "percentofnav");
        assert_eq!(normalize_key(" Market Value ($) "), "marketvalue");
        assert_eq!(normalize_key("Shares/Par Value"), "sharesparvalue");
        assert_eq!(normalize_key("Weight (%)"), "weight");
    }

    #[test]
    fn aliases_resolve_in_priority_order() {
        let df = df!(
            "Symbol" => &["AAPL"],
            "Security Name" => &["Apple"],
            "Holding" => &["Apple Inc"],
            "Shs" => &["10"],
            "Market Value (USD)" => &["1500"],
            "% of Net Assets" => &["50"],
        )
        .unwrap();
        let mapping = resolve_columns(&df);
        assert_eq!(mapping.source(CanonicalField::Ticker), Some("Symbol"));
        // "holding" precedes "securityname" in the alias list.
        assert_eq!(mapping.source(CanonicalField::Name), Some("Holding"));
        assert_eq!(mapping.source(CanonicalField::Shares), Some("Shs"));
        assert_eq!(mapping.source(CanonicalField::MarketValue), Some("Market Value (USD)"));
        assert_eq!(mapping.source(CanonicalField::Weight), Some("% of Net Assets"));
    }

    #[test]
    fn weight_fallback_skips_average_columns() {
        let df = df!(
            "Ticker" => &["AAPL"],
            "Name" => &["Apple"],
            "Shares" => &["10"],
            "Market Value" => &["1500"],
            "Avg Weight" => &["1"],
            "Portfolio Weight %" => &["2"],
        )
        .unwrap();
        let mapping = resolve_columns(&df);
        assert_eq!(mapping.source(CanonicalField::Weight), Some("Portfolio Weight %"));
    }

    #[test]
    fn missing_required_columns_are_named() {
        let df = df!("Ticker" => &["AAPL"], "Weight" => &["1"]).unwrap();
        let err = map_columns(&df).unwrap_err();
        match err {
            IngestError::MissingColumns { missing } => assert_eq!(
                missing,
                vec![
                    CanonicalField::Name,
                    CanonicalField::Shares,
                    CanonicalField::MarketValue
                ]
            ),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn summary_rows_and_unusable_rows_are_dropped() {
        let df = df!(
            "Ticker" => &[Some(" aapl "), Some("Total"), None, Some("nan"), Some("msft"), Some("bad")],
            "Name" => &["Apple", "", "", "", "Microsoft", "Broken"],
            "Shares" => &["1,000", "", "", "", "(50)", "n/a"],
            "Market Value" => &["$150,000.00", "$1", "", "", "$20,000", "$5"],
            "Weight" => &["60%", "", "", "", "40%", "1%"],
        )
        .unwrap();
        let mapped = map_table(&df).unwrap();

        assert_eq!(mapped.frame.height(), 2);
        assert_eq!(mapped.source_rows, vec![0, 4]);
        let tickers = mapped.frame.column("ticker").unwrap().str().unwrap();
        assert_eq!(tickers.get(0), Some("AAPL"));
        assert_eq!(tickers.get(1), Some("MSFT"));
        let shares = mapped.frame.column("shares").unwrap().f64().unwrap();
        assert_eq!(shares.get(1), Some(-50.0));

        let reasons: Vec<SkipReason> = mapped.dropped.iter().map(|d| d.reason).collect();
        assert_eq!(
            reasons,
            vec![
                SkipReason::SummaryRow,
                SkipReason::SummaryRow,
                SkipReason::SummaryRow,
                SkipReason::MissingShares
            ]
        );
    }

    #[test]
    fn weights_backfilled_from_market_value() {
        let df = df!(
            "Ticker" => &["A", "B", "C"],
            "Name" => &["Alpha", "Beta", "Gamma"],
            "Shares" => &[1.0, 2.0, 3.0],
            "Market Value" => &[100.0, 200.0, 700.0],
        )
        .unwrap();
        let frame = map_columns(&df).unwrap();
        let weights: Vec<Option<f64>> = frame
            .column("weight")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(weights, vec![Some(10.0), Some(20.0), Some(70.0)]);
    }

    #[test]
    fn partial_weights_only_fill_the_gaps() {
        let df = df!(
            "Ticker" => &["A", "B"],
            "Name" => &["Alpha", "Beta"],
            "Shares" => &["1", "1"],
            "Market Value" => &["300", "100"],
            "Weight" => &["55.5", "-"],
        )
        .unwrap();
        let frame = map_columns(&df).unwrap();
        let weights = frame.column("weight").unwrap().f64().unwrap();
        assert_eq!(weights.get(0), Some(55.5));
        assert_eq!(weights.get(1), Some(25.0));
    }

    #[test]
    fn zero_total_market_value_leaves_weights_missing() {
        let df = df!(
            "Ticker" => &["A"],
            "Name" => &["Alpha"],
            "Shares" => &["1"],
            "Market Value" => &["0"],
        )
        .unwrap();
        let mapped = map_table(&df).unwrap();
        assert_eq!(mapped.frame.height(), 0);
        assert_eq!(mapped.dropped[0].reason, SkipReason::MissingWeight);
    }

    #[test]
    fn pick_table_prefers_ticker_columns() {
        let notes = df!("Date" => &["2024-01-31"], "Notes" => &["n/a"]).unwrap();
        let holdings = df!(
            "Ticker" => &["AAPL"],
            "Shares" => &["10"],
            "Market Value" => &["1500"],
        )
        .unwrap();
        let picked = pick_holdings_table(vec![notes.clone(), holdings]).unwrap();
        assert!(picked.column("Ticker").is_ok());

        let fallback = pick_holdings_table(vec![notes.clone(), notes]).unwrap();
        assert!(fallback.column("Notes").is_ok());
        assert!(pick_holdings_table(Vec::new()).is_none());
    }
}
