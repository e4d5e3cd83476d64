//! Holdings CLI — ingest, backfill and compare fund holdings snapshots.
//!
//! Commands:
//! - `ingest` — fetch the live holdings (or read one file) and store it
//! - `backfill` — load a directory of saved holdings files
//! - `dates` — list stored snapshot dates
//! - `totals` — aggregate figures for one date
//! - `compare` — reconcile two dates, optionally exporting CSV / Markdown

mod export;
mod format;

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use holdings_core::backfill::{backfill, collect_input_files, StdoutProgress};
use holdings_core::domain::{ReconciliationRow, Side};
use holdings_core::ingest::{DateFallback, IngestReport, IngestSource, Ingestor};
use holdings_core::provider::{AmplifyProvider, HoldingsProvider};
use holdings_core::reconcile::{compare_holdings, get_available_dates, get_totals_for_date};
use holdings_core::report::{
    biggest_movers, totals_from_combined, ComparisonSummary, MoverMetric, PositionFilter,
};
use holdings_core::{SnapshotStore, TrackerConfig};

const LOG_ENV: &str = "HOLDINGS_LOG";

#[derive(Parser)]
#[command(name = "holdings", about = "Holdings CLI — ETF holdings snapshots and reconciliation")]
struct Cli {
    /// TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Snapshot store directory (overrides the config file).
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the current holdings from the fund website and store them.
    Ingest {
        /// Holdings page URL. Defaults to the configured page.
        #[arg(long)]
        url: Option<String>,

        /// Override the as-of date (YYYY-MM-DD).
        #[arg(long)]
        date: Option<String>,

        /// Ingest a local CSV/Excel file instead of fetching.
        #[arg(long, conflicts_with = "url")]
        file: Option<PathBuf>,
    },
    /// Load saved holdings files (CSV/Excel) into the store.
    Backfill {
        /// A file, or a directory of files.
        path: PathBuf,

        /// Override the as-of date for every file (YYYY-MM-DD).
        #[arg(long)]
        date: Option<String>,

        /// Scan subdirectories.
        #[arg(long, default_value_t = false)]
        recursive: bool,
    },
    /// List stored snapshot dates.
    Dates,
    /// Show total market value and holdings count for a date.
    Totals {
        /// Snapshot date (YYYY-MM-DD).
        date: String,
    },
    /// Compare two snapshots.
    Compare {
        /// Baseline date (YYYY-MM-DD). Defaults to the second-latest snapshot.
        #[arg(long)]
        start: Option<String>,

        /// Comparison date (YYYY-MM-DD). Defaults to the latest snapshot.
        #[arg(long)]
        end: Option<String>,

        /// Hide positions whose ticker or name mentions cash.
        #[arg(long, default_value_t = false)]
        hide_cash: bool,

        /// Hide a ticker (repeatable).
        #[arg(long = "exclude", value_name = "TICKER")]
        exclude: Vec<String>,

        /// Also hide the configured excluded tickers.
        #[arg(long, default_value_t = false)]
        hide_excluded: bool,

        /// Leave hidden positions out of the totals as well.
        #[arg(long, default_value_t = false)]
        exclude_from_totals: bool,

        /// Number of biggest movers to show.
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Rank movers by share change instead of market value change.
        #[arg(long, default_value_t = false)]
        movers_by_shares: bool,

        /// Write the combined table as CSV.
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Write a Markdown report.
        #[arg(long)]
        markdown: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            info!(path = %path.display(), "loading config");
            TrackerConfig::from_file(path).map_err(|e| anyhow!(e))?
        }
        None => TrackerConfig::default(),
    };
    if let Some(dir) = cli.store_dir {
        config.store_dir = dir;
    }
    let store = SnapshotStore::open(&config.store_dir);

    match cli.command {
        Commands::Ingest { url, date, file } => run_ingest(&config, &store, url, date, file),
        Commands::Backfill {
            path,
            date,
            recursive,
        } => run_backfill(&store, path, date, recursive),
        Commands::Dates => run_dates(&store),
        Commands::Totals { date } => run_totals(&store, &date),
        Commands::Compare {
            start,
            end,
            hide_cash,
            exclude,
            hide_excluded,
            exclude_from_totals,
            top,
            movers_by_shares,
            csv,
            markdown,
        } => {
            let mut excluded_tickers = exclude;
            if hide_excluded {
                excluded_tickers.extend(config.excluded_tickers.iter().cloned());
            }
            let options = CompareOptions {
                filter: PositionFilter {
                    hide_cash,
                    excluded_tickers,
                },
                exclude_from_totals,
                top,
                metric: if movers_by_shares {
                    MoverMetric::Shares
                } else {
                    MoverMetric::MarketValue
                },
                csv,
                markdown,
            };
            run_compare(&store, start, end, &options)
        }
    }
}

/// Log to stderr; `HOLDINGS_LOG` takes an env-filter directive, default `info`.
fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{s}' (expected YYYY-MM-DD)"))
}

fn parse_opt_date(s: Option<&str>) -> Result<Option<NaiveDate>> {
    s.map(parse_date).transpose()
}

fn run_ingest(
    config: &TrackerConfig,
    store: &SnapshotStore,
    url: Option<String>,
    date: Option<String>,
    file: Option<PathBuf>,
) -> Result<()> {
    let as_of = parse_opt_date(date.as_deref())?;

    let source = match file {
        Some(path) => IngestSource::Path(path),
        None => {
            let mut provider = AmplifyProvider::from_config(config)?;
            if let Some(url) = url {
                provider = provider.with_holdings_url(url);
            }
            let fetched = provider
                .fetch()
                .with_context(|| format!("fetching holdings from {}", provider.name()))?;
            IngestSource::Frame {
                frame: fetched.frame,
                label: fetched.origin,
            }
        }
    };

    let report = Ingestor::new(store, DateFallback::Today).ingest(&source, as_of)?;
    print_ingest_report(&report, store);
    Ok(())
}

fn print_ingest_report(report: &IngestReport, store: &SnapshotStore) {
    println!(
        "Ingested {} holdings for {} into {}.",
        report.count,
        report.date,
        store.root().display()
    );
    if !report.skipped.is_empty() {
        println!("Skipped {} row(s):", report.skipped.len());
        for s in &report.skipped {
            let ticker: &str = if s.ticker.is_empty() { "(blank)" } else { &s.ticker };
            println!("  row {:>4}  {:<12} {}", s.row, ticker, s.reason);
        }
    }
}

fn run_backfill(
    store: &SnapshotStore,
    path: PathBuf,
    date: Option<String>,
    recursive: bool,
) -> Result<()> {
    if !path.exists() {
        bail!("path not found: {}", path.display());
    }
    let date_override = parse_opt_date(date.as_deref())?;
    let files = collect_input_files(&path, recursive)?;
    if files.is_empty() {
        bail!("no Excel/CSV files found in {}", path.display());
    }

    let summary = backfill(store, &files, date_override, &StdoutProgress);

    if !summary.all_succeeded() {
        for (file, err) in &summary.errors {
            eprintln!("Error for {}: {err}", file.display());
        }
        std::process::exit(1);
    }
    Ok(())
}

fn run_dates(store: &SnapshotStore) -> Result<()> {
    let dates = get_available_dates(store)?;
    if dates.is_empty() {
        println!("No snapshots in {}", store.root().display());
        return Ok(());
    }
    println!("{:<12} {:>10} {:>18}", "Date", "Holdings", "Market Value");
    println!("{}", "-".repeat(42));
    for date in &dates {
        let totals = get_totals_for_date(store, *date)?;
        println!(
            "{:<12} {:>10} {:>18}",
            date.to_string(),
            totals.holdings_count,
            format::currency(totals.total_market_value)
        );
    }
    println!("\n{} snapshot(s)", dates.len());
    Ok(())
}

fn run_totals(store: &SnapshotStore, date: &str) -> Result<()> {
    let date = parse_date(date)?;
    let totals = get_totals_for_date(store, date)?;
    println!("Date:           {date}");
    println!("Holdings:       {}", totals.holdings_count);
    println!("Market Value:   {}", format::currency(totals.total_market_value));
    if let Some(meta) = store.snapshot_meta(date) {
        println!("Source:         {}", meta.source);
        println!("Ingested At:    {}", meta.ingested_at.format("%Y-%m-%d %H:%M:%S"));
    }
    Ok(())
}

struct CompareOptions {
    filter: PositionFilter,
    exclude_from_totals: bool,
    top: usize,
    metric: MoverMetric,
    csv: Option<PathBuf>,
    markdown: Option<PathBuf>,
}

/// Default comparison pair: second-latest → latest snapshot.
fn default_dates(store: &SnapshotStore) -> Result<(NaiveDate, NaiveDate)> {
    let dates = get_available_dates(store)?;
    match dates.as_slice() {
        [] => bail!("no snapshots in {}", store.root().display()),
        [only] => Ok((*only, *only)),
        [.., prev, last] => Ok((*prev, *last)),
    }
}

fn run_compare(
    store: &SnapshotStore,
    start: Option<String>,
    end: Option<String>,
    options: &CompareOptions,
) -> Result<()> {
    let (start, end) = match (parse_opt_date(start.as_deref())?, parse_opt_date(end.as_deref())?) {
        (Some(s), Some(e)) => (s, e),
        (s, e) => {
            let (default_start, default_end) = default_dates(store)?;
            (s.unwrap_or(default_start), e.unwrap_or(default_end))
        }
    };

    let raw = compare_holdings(store, start, end)?;
    if raw.same_date {
        println!("Note: baseline and comparison dates are the same.");
    }
    let visible = options.filter.apply(&raw);

    // Totals come from the store unless hidden rows should not count.
    let (start_totals, end_totals, counted) = if options.exclude_from_totals {
        (
            totals_from_combined(&visible.combined, Side::Start),
            totals_from_combined(&visible.combined, Side::End),
            &visible,
        )
    } else {
        (
            get_totals_for_date(store, start)?,
            get_totals_for_date(store, end)?,
            &raw,
        )
    };
    let summary = ComparisonSummary::new(start_totals, end_totals, counted);

    println!("=== Holdings Comparison: {start} → {end} ===");
    println!("Baseline AUM:   {}", format::currency(summary.start.total_market_value));
    println!("Comparison AUM: {}", format::currency(summary.end.total_market_value));
    println!("AUM Change:     {}", format::currency(summary.market_value_delta()));
    println!(
        "Holdings Delta: {:+} ({} new / {} sold)",
        summary.holdings_delta(),
        summary.added_count,
        summary.removed_count
    );

    let movers = biggest_movers(&visible.combined, options.metric, options.top);
    println!();
    println!("--- Biggest Movers ---");
    if movers.is_empty() {
        println!("No changes between the selected dates.");
    } else {
        for r in &movers {
            let shown = match options.metric {
                MoverMetric::Shares => format::share_delta(r.shares_delta),
                MoverMetric::MarketValue => format::value_delta(r.market_value_delta),
            };
            println!("{:<12} {:>18}", r.ticker, shown);
        }
    }

    print_rows("New Positions", &visible.added);
    print_rows("Exited Positions", &visible.removed);
    print_rows("Changed Positions", &visible.changed);

    if let Some(path) = &options.csv {
        export::write_file(path, &export::export_reconciliation_csv(&visible.combined)?)?;
        println!("\nCSV written to: {}", path.display());
    }
    if let Some(path) = &options.markdown {
        let md = export::generate_report(start, end, &summary, &visible);
        export::write_file(path, &md)?;
        println!("Report written to: {}", path.display());
    }
    Ok(())
}

fn print_rows(title: &str, rows: &[ReconciliationRow]) {
    println!();
    println!("--- {title} ({}) ---", rows.len());
    if rows.is_empty() {
        return;
    }
    println!(
        "{:<12} {:<32} {:>14} {:>14} {:>12} {:>18}",
        "Ticker", "Name", "Start Shares", "End Shares", "Share Δ", "Value Δ"
    );
    println!("{}", "-".repeat(107));
    for r in rows {
        println!(
            "{:<12} {:<32} {:>14} {:>14} {:>12} {:>18}",
            r.ticker,
            truncate(&r.name, 32),
            format::number(r.start_shares, 0),
            format::number(r.end_shares, 0),
            format::share_delta(r.shares_delta),
            format::value_delta(r.market_value_delta),
        );
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(width.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}
