//! Calendar import from tabular files.
//!
//! Rows need a date, a time of day and a value. Columns are matched by any
//! of several synonymous header names, case-insensitively. Rows missing a
//! field or failing to parse are skipped; the import as a whole only fails
//! when the file cannot be read.
use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use tracing::debug;

use crate::calendar::{DaySchedule, TimeOfDay};
use crate::error::CalendarError;

pub const DATE_COLUMNS: &[&str] = &["date", "fecha", "dia", "d"];
pub const TIME_COLUMNS: &[&str] = &["time", "hora", "t"];
pub const VALUE_COLUMNS: &[&str] = &["value", "valor", "v"];

pub const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"];

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    // spreadsheets exported as text often carry a midnight time part
    let raw = raw.split_whitespace().next().unwrap_or(raw);
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(raw, f).ok())
}

struct Columns {
    date: Vec<usize>,
    time: Vec<usize>,
    value: Vec<usize>,
}

impl Columns {
    fn locate<S: AsRef<str>>(headers: &[S]) -> Self {
        let find = |names: &[&str]| -> Vec<usize> {
            names
                .iter()
                .filter_map(|n| {
                    headers
                        .iter()
                        .position(|h| h.as_ref().trim().eq_ignore_ascii_case(n))
                })
                .collect()
        };
        Self {
            date: find(DATE_COLUMNS),
            time: find(TIME_COLUMNS),
            value: find(VALUE_COLUMNS),
        }
    }

    fn pick<'a, S: AsRef<str>>(idx: &[usize], row: &'a [S]) -> Option<&'a str> {
        idx.iter()
            .filter_map(|&i| row.get(i).map(|cell| cell.as_ref().trim()))
            .find(|s| !s.is_empty())
    }
}

/// Build a schedule from a header row and data rows.
pub fn events_from_rows<V, S, R>(headers: &[S], rows: R) -> DaySchedule<V>
where
    V: FromStr + Copy,
    S: AsRef<str>,
    R: IntoIterator,
    R::Item: AsRef<[S]>,
{
    let cols = Columns::locate(headers);
    let mut out = DaySchedule::new();
    let mut skipped = 0usize;
    for row in rows {
        let row = row.as_ref();
        let parsed = (|| {
            let date = parse_date(Columns::pick(&cols.date, row)?)?;
            let time: TimeOfDay = Columns::pick(&cols.time, row)?.parse().ok()?;
            let value: V = Columns::pick(&cols.value, row)?.parse().ok()?;
            Some((date, time, value))
        })();
        match parsed {
            Some((date, time, value)) => out.insert(date, time, value),
            None => skipped += 1,
        }
    }
    debug!(events = out.len(), skipped, "calendar rows parsed");
    out
}

/// Pick the delimiter that occurs most on the header line.
pub fn sniff_delimiter(text: &str) -> u8 {
    let first = text.lines().next().unwrap_or("");
    [b',', b';', b'\t']
        .into_iter()
        .max_by_key(|d| first.bytes().filter(|b| b == d).count())
        .unwrap_or(b',')
}

pub fn events_from_delimited<V: FromStr + Copy>(text: &str) -> Result<DaySchedule<V>, CalendarError> {
    let text = text.trim_start_matches('\u{feff}');
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(text))
        .flexible(true)
        .has_headers(true)
        .from_reader(text.as_bytes());
    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_owned).collect();
    let rows: Vec<Vec<String>> = rdr
        .records()
        .filter_map(std::result::Result::ok)
        .map(|r| r.iter().map(str::to_owned).collect())
        .collect();
    Ok(events_from_rows(&headers, rows))
}

/// Import a calendar file, choosing the parser by extension.
pub fn import_file<V: FromStr + Copy>(path: &Path) -> Result<DaySchedule<V>, CalendarError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "csv" | "txt" => {
            let text = std::fs::read_to_string(path)?;
            events_from_delimited(&text)
        }
        "xlsx" | "xlsm" | "xls" | "ods" => import_spreadsheet(path),
        other => Err(CalendarError::UnsupportedFormat(other.to_owned())),
    }
}

#[cfg(feature = "xlsx")]
fn import_spreadsheet<V: FromStr + Copy>(path: &Path) -> Result<DaySchedule<V>, CalendarError> {
    use calamine::{Data, DataType, Reader, open_workbook_auto};

    let sheet_err = |e: calamine::Error| CalendarError::Spreadsheet(e.to_string());
    let mut wb = open_workbook_auto(path).map_err(sheet_err)?;
    let range = wb
        .worksheet_range_at(0)
        .ok_or_else(|| CalendarError::Spreadsheet("workbook has no sheets".into()))?
        .map_err(sheet_err)?;
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(DaySchedule::new());
    };
    let headers: Vec<String> = header.iter().map(ToString::to_string).collect();
    let cols = Columns::locate(&headers);
    let text = |i: usize, cell: &Data| -> String {
        match cell {
            Data::DateTime(_) if cols.date.contains(&i) => cell
                .as_date()
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            Data::DateTime(_) if cols.time.contains(&i) => cell
                .as_time()
                .map(|t| t.format("%H:%M").to_string())
                .unwrap_or_default(),
            other => other.to_string(),
        }
    };
    let body: Vec<Vec<String>> = rows
        .map(|r| r.iter().enumerate().map(|(i, c)| text(i, c)).collect())
        .collect();
    Ok(events_from_rows(&headers, body))
}

#[cfg(not(feature = "xlsx"))]
fn import_spreadsheet<V: FromStr + Copy>(path: &Path) -> Result<DaySchedule<V>, CalendarError> {
    Err(CalendarError::UnsupportedFormat(format!(
        "{} (spreadsheet import needs the `xlsx` feature; export to CSV instead)",
        path.display()
    )))
}
