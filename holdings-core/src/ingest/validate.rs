//! Holdings validator: mapped frame → typed, de-duplicated records.
//!
//! Column problems are fatal to the batch (`MissingColumns`). Row problems
//! are not: the row is dropped and reported in `ValidatedBatch::skipped`.

use chrono::NaiveDate;
use polars::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

use super::dates::{extract_as_of_date, DateFallback};
use super::mapper::map_table;
use crate::domain::HoldingRecord;
use crate::error::IngestError;

/// Why a source row did not become a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Blank, `total` or `nan` ticker: a footer, not a position.
    SummaryRow,
    MissingShares,
    MissingMarketValue,
    MissingWeight,
    EmptyName,
    /// A later row carried the same ticker.
    SupersededDuplicate,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::SummaryRow => "summary or blank ticker",
            SkipReason::MissingShares => "missing shares",
            SkipReason::MissingMarketValue => "missing market value",
            SkipReason::MissingWeight => "missing weight",
            SkipReason::EmptyName => "empty name",
            SkipReason::SupersededDuplicate => "superseded by a later duplicate",
        };
        f.write_str(text)
    }
}

/// Row-level diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRow {
    /// Zero-based data row in the source table.
    pub row: usize,
    pub ticker: String,
    pub reason: SkipReason,
}

impl SkippedRow {
    pub fn new(row: usize, ticker: &str, reason: SkipReason) -> Self {
        Self {
            row,
            ticker: ticker.to_string(),
            reason,
        }
    }
}

/// Accepted records for one date plus the rows that were left out.
#[derive(Debug, Clone)]
pub struct ValidatedBatch {
    pub date: NaiveDate,
    pub records: Vec<HoldingRecord>,
    pub skipped: Vec<SkippedRow>,
}

impl ValidatedBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records as a frame with the store's column layout.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        records_to_dataframe(&self.records)
    }
}

/// Validator with an explicit policy for sources that carry no date.
#[derive(Debug, Clone, Copy, Default)]
pub struct HoldingsValidator {
    pub fallback: DateFallback,
}

impl HoldingsValidator {
    pub fn new(fallback: DateFallback) -> Self {
        Self { fallback }
    }

    /// Resolve the as-of date: explicit value, then an in-data date column,
    /// then the fallback policy.
    pub fn resolve_date(
        &self,
        df: &DataFrame,
        as_of: Option<NaiveDate>,
        source_name: &str,
    ) -> Result<NaiveDate, IngestError> {
        if let Some(date) = as_of.or_else(|| extract_as_of_date(df)) {
            return Ok(date);
        }
        match self.fallback {
            DateFallback::Today => Ok(chrono::Local::now().date_naive()),
            DateFallback::Reject => Err(IngestError::AmbiguousDate {
                source_name: source_name.to_string(),
            }),
        }
    }

    /// Map, type and de-duplicate one source table.
    pub fn validate(
        &self,
        df: &DataFrame,
        as_of: Option<NaiveDate>,
        source_name: &str,
    ) -> Result<ValidatedBatch, IngestError> {
        let date = self.resolve_date(df, as_of, source_name)?;
        let mapped = map_table(df)?;
        let mut skipped = mapped.dropped;

        let frame = &mapped.frame;
        let tickers = frame.column("ticker")?.str()?;
        let names = frame.column("name")?.str()?;
        let shares = frame.column("shares")?.f64()?;
        let market_values = frame.column("market_value")?.f64()?;
        let weights = frame.column("weight")?.f64()?;

        let mut candidates: Vec<(usize, HoldingRecord)> = Vec::with_capacity(frame.height());
        for (i, &source_row) in mapped.source_rows.iter().enumerate() {
            let ticker = tickers.get(i).unwrap_or_default().trim().to_uppercase();
            let name = names.get(i).unwrap_or_default().trim().to_string();
            if ticker.is_empty() {
                skipped.push(SkippedRow::new(source_row, &ticker, SkipReason::SummaryRow));
                continue;
            }
            if name.is_empty() {
                skipped.push(SkippedRow::new(source_row, &ticker, SkipReason::EmptyName));
                continue;
            }
            let finite = |v: Option<f64>| v.filter(|x| x.is_finite());
            let (sh, mv, wt) = match (
                finite(shares.get(i)),
                finite(market_values.get(i)),
                finite(weights.get(i)),
            ) {
                (Some(sh), Some(mv), Some(wt)) => (sh, mv, wt),
                (None, _, _) => {
                    skipped.push(SkippedRow::new(source_row, &ticker, SkipReason::MissingShares));
                    continue;
                }
                (_, None, _) => {
                    skipped.push(SkippedRow::new(
                        source_row,
                        &ticker,
                        SkipReason::MissingMarketValue,
                    ));
                    continue;
                }
                (_, _, None) => {
                    skipped.push(SkippedRow::new(source_row, &ticker, SkipReason::MissingWeight));
                    continue;
                }
            };
            candidates.push((
                source_row,
                HoldingRecord {
                    date,
                    ticker,
                    name,
                    shares: sh,
                    market_value: mv,
                    weight: wt,
                },
            ));
        }

        let (records, superseded) = dedupe_last_wins(candidates);
        skipped.extend(superseded);
        skipped.sort_by_key(|s| s.row);

        if !skipped.is_empty() {
            warn!(
                source = source_name,
                %date,
                skipped = skipped.len(),
                accepted = records.len(),
                "rows skipped during validation"
            );
        }

        Ok(ValidatedBatch {
            date,
            records,
            skipped,
        })
    }
}

/// Validate with the live-ingestion policy (no date → today).
pub fn validate(df: &DataFrame, as_of: Option<NaiveDate>) -> Result<ValidatedBatch, IngestError> {
    HoldingsValidator::default().validate(df, as_of, "dataframe")
}

/// Keep the last occurrence of each ticker, in source order.
fn dedupe_last_wins(
    candidates: Vec<(usize, HoldingRecord)>,
) -> (Vec<HoldingRecord>, Vec<SkippedRow>) {
    let mut last_seen: HashMap<String, usize> = HashMap::new();
    for (idx, (_, record)) in candidates.iter().enumerate() {
        last_seen.insert(record.ticker.clone(), idx);
    }

    let mut records = Vec::with_capacity(last_seen.len());
    let mut superseded = Vec::new();
    for (idx, (source_row, record)) in candidates.into_iter().enumerate() {
        if last_seen.get(&record.ticker) == Some(&idx) {
            records.push(record);
        } else {
            superseded.push(SkippedRow::new(
                source_row,
                &record.ticker,
                SkipReason::SupersededDuplicate,
            ));
        }
    }
    (records, superseded)
}

/// Records → frame with columns date, ticker, name, shares, market_value, weight.
pub fn records_to_dataframe(records: &[HoldingRecord]) -> PolarsResult<DataFrame> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    let dates: Vec<i32> = records
        .iter()
        .map(|r| (r.date - epoch).num_days() as i32)
        .collect();

    DataFrame::new(vec![
        Column::new("date".into(), dates).cast(&DataType::Date)?,
        Column::new(
            "ticker".into(),
            records.iter().map(|r| r.ticker.as_str()).collect::<Vec<_>>(),
        ),
        Column::new(
            "name".into(),
            records.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
        ),
        Column::new(
            "shares".into(),
            records.iter().map(|r| r.shares).collect::<Vec<_>>(),
        ),
        Column::new(
            "market_value".into(),
            records.iter().map(|r| r.market_value).collect::<Vec<_>>(),
        ),
        Column::new(
            "weight".into(),
            records.iter().map(|r| r.weight).collect::<Vec<_>>(),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample() -> DataFrame {
        df!(
            "Ticker" => &["aapl", "MSFT", "AAPL", "GOOG", "Total"],
            "Name" => &["Apple", "Microsoft", "Apple Inc.", "  ", ""],
            "Shares" => &["100", "50", "150", "10", ""],
            "Market Value" => &["1,000", "900", "1,600", "1,200", "4,700"],
            "Weight" => &["10", "9", "16", "12", "100"],
        )
        .unwrap()
    }

    #[test]
    fn explicit_date_wins_and_duplicates_keep_last() {
        let batch = validate(&sample(), Some(ymd(2024, 1, 31))).unwrap();

        assert_eq!(batch.date, ymd(2024, 1, 31));
        let tickers: Vec<&str> = batch.records.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["MSFT", "AAPL"]);

        let apple = &batch.records[1];
        assert_eq!(apple.name, "Apple Inc.");
        assert_eq!(apple.shares, 150.0);
        assert_eq!(apple.market_value, 1600.0);
        assert!(batch.records.iter().all(|r| r.date == ymd(2024, 1, 31)));
    }

    #[test]
    fn skipped_rows_carry_reasons_in_row_order() {
        let batch = validate(&sample(), Some(ymd(2024, 1, 31))).unwrap();
        let skipped: Vec<(usize, SkipReason)> =
            batch.skipped.iter().map(|s| (s.row, s.reason)).collect();
        assert_eq!(
            skipped,
            vec![
                (0, SkipReason::SupersededDuplicate),
                (3, SkipReason::EmptyName),
                (4, SkipReason::SummaryRow),
            ]
        );
    }

    #[test]
    fn date_taken_from_data_column() {
        let df = df!(
            "As Of" => &["03/28/2024", "03/28/2024"],
            "Symbol" => &["NVDA", "AMD"],
            "Security" => &["Nvidia", "AMD"],
            "Shares" => &[5.0, 8.0],
            "MarketValue" => &[4500.0, 1400.0],
        )
        .unwrap();
        let batch = validate(&df, None).unwrap();
        assert_eq!(batch.date, ymd(2024, 3, 28));
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn reject_policy_without_any_date() {
        let validator = HoldingsValidator::new(DateFallback::Reject);
        let err = validator.validate(&sample(), None, "holdings.csv").unwrap_err();
        assert!(matches!(err, IngestError::AmbiguousDate { .. }));
    }

    #[test]
    fn today_policy_without_any_date() {
        let batch = validate(&sample(), None).unwrap();
        assert_eq!(batch.date, chrono::Local::now().date_naive());
    }

    #[test]
    fn missing_columns_abort_the_batch() {
        let df = df!("Ticker" => &["AAPL"], "Shares" => &["1"]).unwrap();
        let err = validate(&df, Some(ymd(2024, 1, 1))).unwrap_err();
        assert!(matches!(err, IngestError::MissingColumns { .. }));
    }

    #[test]
    fn batch_renders_store_layout() {
        let batch = validate(&sample(), Some(ymd(2024, 1, 31))).unwrap();
        let df = batch.to_dataframe().unwrap();
        assert_eq!(df.shape(), (2, 6));
        assert_eq!(df.column("date").unwrap().dtype(), &DataType::Date);
    }
}
