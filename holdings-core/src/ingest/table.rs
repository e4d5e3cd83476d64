//! Raw tabular content → polars `DataFrame`.
//!
//! Every reader (CSV, Excel, HTML) produces a grid of [`Cell`]s. This module
//! finds the header row, cleans up header names, and types each column:
//! `Float64` when every non-empty cell is numeric, `String` otherwise.

use polars::prelude::*;

/// One cell of a raw source grid.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.trim().is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value)
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => Some(s.clone()),
            Cell::Number(v) => Some(format_number(*v)),
        }
    }
}

fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

/// Index of the header row in a grid.
///
/// The first row mentioning `ticker`, `name` and `market` wins; holdings
/// exports often carry a few title lines above the real header. Falls back
/// to the first non-empty row.
pub fn detect_header_row(rows: &[Vec<Cell>]) -> Option<usize> {
    let joined = |row: &Vec<Cell>| -> String {
        row.iter()
            .filter_map(Cell::as_text)
            .collect::<Vec<_>>()
            .join(",")
            .to_lowercase()
            .replace(['"', '\''], "")
    };

    rows.iter()
        .position(|row| {
            let line = joined(row);
            line.contains("ticker") && line.contains("name") && line.contains("market")
        })
        .or_else(|| rows.iter().position(|row| row.iter().any(|c| !c.is_empty())))
}

/// Build a frame from a grid, using [`detect_header_row`] to find the header.
///
/// Returns `Ok(None)` when the grid has no non-empty row.
pub fn frame_from_grid(rows: Vec<Vec<Cell>>) -> PolarsResult<Option<DataFrame>> {
    let Some(header_idx) = detect_header_row(&rows) else {
        return Ok(None);
    };
    let mut rows = rows;
    let body = rows.split_off(header_idx + 1);
    let header = rows.pop().unwrap_or_default();
    frame_from_rows(&header, body).map(Some)
}

/// Build a frame from an explicit header row and data rows.
///
/// Fully blank data rows are dropped; short rows are padded with empty
/// cells, long rows widen the frame with generated column names.
pub fn frame_from_rows(header: &[Cell], rows: Vec<Vec<Cell>>) -> PolarsResult<DataFrame> {
    let rows: Vec<Vec<Cell>> = rows
        .into_iter()
        .filter(|row| row.iter().any(|c| !c.is_empty()))
        .collect();

    let width = rows
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(header.len()))
        .max()
        .unwrap_or(0);
    let names = header_names(header, width);

    let columns = names
        .into_iter()
        .enumerate()
        .map(|(idx, name)| {
            let cells: Vec<&Cell> = rows
                .iter()
                .map(|row| row.get(idx).unwrap_or(&Cell::Empty))
                .collect();
            build_column(name, &cells)
        })
        .collect::<Vec<_>>();

    DataFrame::new(columns)
}

/// Blank headers become `column_{idx}`; repeats get a `.{n}` suffix.
fn header_names(header: &[Cell], width: usize) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(width);
    for idx in 0..width {
        let base = header
            .get(idx)
            .and_then(Cell::as_text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("column_{idx}"));

        let mut candidate = base.clone();
        let mut n = 1;
        while seen.contains(&candidate) {
            candidate = format!("{base}.{n}");
            n += 1;
        }
        seen.push(candidate);
    }
    seen
}

fn build_column(name: String, cells: &[&Cell]) -> Column {
    let numeric = cells
        .iter()
        .all(|c| matches!(c, Cell::Empty | Cell::Number(_)));
    let has_values = cells.iter().any(|c| !c.is_empty());

    if numeric && has_values {
        let values: Vec<Option<f64>> = cells
            .iter()
            .map(|c| match c {
                Cell::Number(v) => Some(*v),
                _ => None,
            })
            .collect();
        Column::new(name.into(), values)
    } else {
        let values: Vec<Option<String>> = cells.iter().map(|c| c.as_text()).collect();
        Column::new(name.into(), values)
    }
}
