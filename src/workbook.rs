use std::collections::HashMap;
use std::path::Path;

use calamine::{open_workbook_auto, Data, DataType as _, Reader};
use chrono::{NaiveDateTime, NaiveTime};
use polars::prelude::*;

use crate::error::PlannerError;

const WORKBOOK_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xls", "xlsb", "ods"];

/// A named ledger table. Sheet names are lower-cased; headers have their
/// internal spaces replaced with underscores.
#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    pub table: DataFrame,
}

/// Read a ledger file, picking the reader from the file extension.
pub fn read_ledger(path: &Path) -> Result<Vec<Sheet>, PlannerError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if ext == "csv" {
        Ok(vec![read_csv(path)?])
    } else if WORKBOOK_EXTENSIONS.contains(&ext.as_str()) {
        read_workbook(path)
    } else {
        Err(PlannerError::Config(format!(
            "unsupported ledger file '{}': expected .csv or one of .{}",
            path.display(),
            WORKBOOK_EXTENSIONS.join(", .")
        )))
    }
}

/// Load every worksheet of a spreadsheet, all cells as strings.
///
/// The first row of each worksheet is the header. Worksheets without any
/// cells are skipped.
pub fn read_workbook(path: &Path) -> Result<Vec<Sheet>, PlannerError> {
    let mut workbook = open_workbook_auto(path)?;
    let mut sheets = Vec::new();

    for name in workbook.sheet_names() {
        let range = workbook.worksheet_range(&name)?;
        let mut rows = range.rows();
        let Some(header) = rows.next() else {
            log::debug!("sheet '{}' is empty, skipping", name);
            continue;
        };

        let headers = normalize_headers(header.iter().map(|cell| cell.to_string()));
        let mut columns: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
        for row in rows {
            for (i, values) in columns.iter_mut().enumerate() {
                values.push(row.get(i).and_then(cell_to_string));
            }
        }

        let table = DataFrame::new(
            headers
                .iter()
                .zip(columns)
                .map(|(h, values)| Column::new(h.as_str().into(), values))
                .collect(),
        )?;

        log::info!(
            "loaded sheet '{}' ({} rows x {} columns)",
            name,
            table.height(),
            table.width()
        );
        sheets.push(Sheet {
            name: name.to_lowercase(),
            table,
        });
    }

    Ok(sheets)
}

/// Load a CSV file as a single sheet named after the file stem, with all
/// columns as String dtype.
pub fn read_csv(path: &Path) -> Result<Sheet, PlannerError> {
    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0)) // all columns as String
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    let normalized = normalize_headers(df.get_column_names_str().iter().map(|c| c.to_string()));
    df.set_column_names(normalized.as_slice())?;

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("sheet")
        .to_lowercase();
    log::info!(
        "loaded sheet '{}' ({} rows x {} columns)",
        name,
        df.height(),
        df.width()
    );
    Ok(Sheet { name, table: df })
}

/// Trim headers, replace internal spaces with underscores, name blank
/// headers by position and suffix duplicates so column names stay unique.
fn normalize_headers(raw: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    raw.enumerate()
        .map(|(i, h)| {
            let trimmed = h.trim();
            let base = if trimmed.is_empty() {
                format!("column_{i}")
            } else {
                trimmed.replace(' ', "_")
            };
            let count = seen.entry(base.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                base
            } else {
                format!("{base}_{count}")
            }
        })
        .collect()
}

fn cell_to_string(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => Some(s.clone()),
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) => Some(format_float(*f)),
        Data::DateTime(_) | Data::DateTimeIso(_) => Some(
            cell.as_datetime()
                .map(format_datetime)
                .unwrap_or_else(|| cell.to_string()),
        ),
        other => Some(other.to_string()),
    }
}

fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

fn format_datetime(dt: NaiveDateTime) -> String {
    if dt.time() == NaiveTime::MIN {
        dt.format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}
