//! Export of comparison results: CSV table and Markdown report.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::Path;

use holdings_core::domain::ReconciliationRow;
use holdings_core::report::ComparisonSummary;
use holdings_core::Reconciliation;

use crate::format;

/// Export reconciliation rows as CSV.
///
/// Columns: ticker, name, status, start_shares, end_shares, shares_delta,
/// start_market_value, end_market_value, market_value_delta, start_weight,
/// end_weight. Absent sides are empty cells.
pub fn export_reconciliation_csv(rows: &[ReconciliationRow]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "ticker",
        "name",
        "status",
        "start_shares",
        "end_shares",
        "shares_delta",
        "start_market_value",
        "end_market_value",
        "market_value_delta",
        "start_weight",
        "end_weight",
    ])?;

    let opt = |v: Option<f64>| v.map(|x| x.to_string()).unwrap_or_default();
    for r in rows {
        wtr.write_record([
            r.ticker.as_str(),
            r.name.as_str(),
            r.status.as_str(),
            &opt(r.start_shares),
            &opt(r.end_shares),
            &r.shares_delta.to_string(),
            &opt(r.start_market_value),
            &opt(r.end_market_value),
            &format!("{:.2}", r.market_value_delta),
            &opt(r.start_weight),
            &opt(r.end_weight),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Generate a Markdown report for one comparison.
pub fn generate_report(
    start: NaiveDate,
    end: NaiveDate,
    summary: &ComparisonSummary,
    result: &Reconciliation,
) -> String {
    let mut md = String::new();

    md.push_str("# Holdings Report\n\n");
    md.push_str(&format!("Baseline: {start}  \nComparison: {end}\n\n"));
    if result.same_date {
        md.push_str("> Baseline and comparison dates are the same.\n\n");
    }

    md.push_str("## Summary\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!(
        "| Baseline AUM | {} |\n",
        format::currency(summary.start.total_market_value)
    ));
    md.push_str(&format!(
        "| Comparison AUM | {} |\n",
        format::currency(summary.end.total_market_value)
    ));
    md.push_str(&format!(
        "| AUM Change | {} |\n",
        format::currency(summary.market_value_delta())
    ));
    md.push_str(&format!(
        "| Holdings Delta | {:+} ({} new / {} sold) |\n",
        summary.holdings_delta(),
        summary.added_count,
        summary.removed_count
    ));
    md.push('\n');

    md.push_str(&position_section("New Positions", &result.added));
    md.push_str(&position_section("Exited Positions", &result.removed));
    md.push_str(&position_section("Changed Positions", &result.changed));
    md
}

fn position_section(title: &str, rows: &[ReconciliationRow]) -> String {
    let mut md = format!("## {title}\n\n");
    if rows.is_empty() {
        md.push_str("None.\n\n");
        return md;
    }
    md.push_str("| Ticker | Name | Start Shares | End Shares | Share Δ | Market Value Δ |\n");
    md.push_str("| --- | --- | ---: | ---: | ---: | ---: |\n");
    for r in rows {
        md.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            r.ticker,
            r.name.replace('|', "\\|"),
            format::number(r.start_shares, 0),
            format::number(r.end_shares, 0),
            format::share_delta(r.shares_delta),
            format::value_delta(r.market_value_delta),
        ));
    }
    md.push('\n');
    md
}

pub fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}
