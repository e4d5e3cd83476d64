//! Source readers: CSV, Excel workbooks and HTML pages → frames.

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use polars::prelude::DataFrame;
use scraper::{Html, Selector};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

use super::dates::excel_serial_to_date;
use super::mapper::pick_holdings_table;
use super::table::{frame_from_grid, Cell};
use crate::error::IngestError;

/// File extensions accepted by file ingestion (lower-case, no dot).
pub const INPUT_EXTENSIONS: [&str; 4] = ["csv", "xlsx", "xlsm", "xls"];

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Raw tabular formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Excel,
    Html,
}

impl SourceFormat {
    /// Format implied by a file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(SourceFormat::Csv),
            "xlsx" | "xlsm" | "xls" => Some(SourceFormat::Excel),
            "html" | "htm" => Some(SourceFormat::Html),
            _ => None,
        }
    }
}

/// Parse every table in a source. The result is never empty.
pub fn read_tables(bytes: &[u8], format: SourceFormat) -> Result<Vec<DataFrame>, IngestError> {
    let tables: Vec<DataFrame> = match format {
        SourceFormat::Csv => read_csv(bytes)?.into_iter().collect(),
        SourceFormat::Excel => read_workbook(bytes)?,
        SourceFormat::Html => read_html_tables(&String::from_utf8_lossy(bytes))?,
    };
    if tables.is_empty() {
        return Err(IngestError::SourceFormat(format!(
            "no tabular content found in {format:?} source"
        )));
    }
    Ok(tables)
}

/// Parse a source and choose its holdings table.
pub fn load_holdings_table(bytes: &[u8], format: SourceFormat) -> Result<DataFrame, IngestError> {
    let tables = read_tables(bytes, format)?;
    debug!(count = tables.len(), ?format, "parsed source tables");
    let table = pick_holdings_table(tables)
        .ok_or_else(|| IngestError::SourceFormat("no tables to choose from".into()))?;
    if table.height() == 0 {
        return Err(IngestError::SourceFormat("no rows found in input".into()));
    }
    Ok(table)
}

/// Parse CSV bytes. Header detection skips title lines above the real
/// header; ragged rows are tolerated and invalid UTF-8 is replaced.
pub fn read_csv(bytes: &[u8]) -> Result<Option<DataFrame>, IngestError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut grid = Vec::new();
    for record in reader.byte_records() {
        let record = record.map_err(|e| IngestError::SourceFormat(format!("csv: {e}")))?;
        grid.push(
            record
                .iter()
                .map(|field| Cell::text(String::from_utf8_lossy(field).into_owned()))
                .collect(),
        );
    }
    Ok(frame_from_grid(grid)?)
}

/// Parse every non-empty sheet of a workbook (xlsx, xlsm, xls).
pub fn read_workbook(bytes: &[u8]) -> Result<Vec<DataFrame>, IngestError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| IngestError::SourceFormat(format!("open workbook: {e}")))?;

    let mut tables = Vec::new();
    for sheet in workbook.sheet_names().to_vec() {
        let range = match workbook.worksheet_range(&sheet) {
            Ok(range) => range,
            Err(e) => {
                debug!(%sheet, error = %e, "skipping unreadable sheet");
                continue;
            }
        };
        if let Some(df) = frame_from_range(&range)? {
            if df.height() > 0 {
                tables.push(df);
            }
        }
    }
    Ok(tables)
}

fn frame_from_range(range: &calamine::Range<Data>) -> Result<Option<DataFrame>, IngestError> {
    let grid = range
        .rows()
        .map(|row| row.iter().map(sheet_cell).collect())
        .collect();
    Ok(frame_from_grid(grid)?)
}

fn sheet_cell(cell: &Data) -> Cell {
    match cell {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::text(b.to_string()),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64())
            .map(|d| Cell::text(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Cell::Empty),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::text(s.clone()),
        _ => Cell::Empty,
    }
}

/// Parse every `<table>` in an HTML document.
pub fn read_html_tables(html: &str) -> Result<Vec<DataFrame>, IngestError> {
    let selector = |css: &str| {
        Selector::parse(css).map_err(|e| IngestError::SourceFormat(format!("selector {css}: {e}")))
    };
    let table_sel = selector("table")?;
    let row_sel = selector("tr")?;
    let cell_sel = selector("th, td")?;

    let document = Html::parse_document(html);
    let mut tables = Vec::new();
    for table in document.select(&table_sel) {
        let grid: Vec<Vec<Cell>> = table
            .select(&row_sel)
            .map(|tr| {
                tr.select(&cell_sel)
                    .map(|td| Cell::text(td.text().collect::<String>().trim().to_string()))
                    .collect()
            })
            .collect();
        if let Some(df) = frame_from_grid(grid)? {
            if df.height() > 0 {
                tables.push(df);
            }
        }
    }
    Ok(tables)
}
