use calamine::{open_workbook_auto, Data, Range, Reader, Sheets};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::path::Path;

use super::types::*;

/// Read the first worksheet of a workbook as a header row plus data rows.
///
/// Row numbers on the returned rows are absolute 1-based spreadsheet rows,
/// so the first data row under a header in row 1 is row 2.
pub fn read_sheet_table(path: &Path) -> Result<SheetTable, ExcelError> {
    if !path.exists() {
        return Err(ExcelError::file_not_found(&path.display().to_string()));
    }

    let mut workbook: Sheets<_> = open_workbook_auto(path)
        .map_err(|e| ExcelError::read_error(format!("Failed to open workbook: {}", e)))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ExcelError::sheet_not_found("#1"))?
        .map_err(|e| ExcelError::read_error(format!("Failed to read first sheet: {}", e)))?;

    Ok(range_to_table(&range))
}

/// Split a used range into headers (its first row) and data rows
fn range_to_table(range: &Range<Data>) -> SheetTable {
    let (row_count, col_count) = range.get_size();
    if row_count == 0 {
        return SheetTable::default();
    }
    let start_row = range.start().map(|(row, _)| row).unwrap_or(0);

    let headers = unique_headers((0..col_count).map(|col| convert_cell_value(range.get((0, col)))));

    let mut rows: Vec<RawRow> = (1..row_count)
        .map(|row_idx| RawRow {
            row_number: start_row + row_idx as u32 + 1,
            cells: (0..col_count)
                .map(|col| convert_cell_value(range.get((row_idx, col))))
                .collect(),
        })
        .collect();

    // Blank rows at the bottom of the used range are not data
    while rows
        .last()
        .map(|row| row.cells.iter().all(|c| matches!(c, CellValue::Empty)))
        .unwrap_or(false)
    {
        rows.pop();
    }

    SheetTable { headers, rows }
}

/// Header names as column labels: blanks become `Unnamed: <n>` and repeated
/// names get `.1`, `.2`, ... suffixes.
fn unique_headers(cells: impl Iterator<Item = CellValue>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();

    cells
        .enumerate()
        .map(|(idx, cell)| {
            let base = match cell {
                CellValue::Empty => format!("Unnamed: {}", idx),
                other => other.as_text(),
            };
            let count = seen.entry(base.clone()).or_insert(0);
            let name = if *count == 0 {
                base
            } else {
                format!("{}.{}", base, count)
            };
            *count += 1;
            name
        })
        .collect()
}

/// Convert calamine Data to our CellValue
fn convert_cell_value(cell: Option<&Data>) -> CellValue {
    match cell {
        None => CellValue::Empty,
        Some(data) => match data {
            Data::Empty => CellValue::Empty,
            Data::String(s) => CellValue::String(s.clone()),
            Data::Float(f) => CellValue::Number(*f),
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Bool(b) => CellValue::Boolean(*b),
            Data::DateTime(dt) => {
                let serial = dt.as_f64();
                excel_serial_to_datetime(serial)
                    .map(CellValue::DateTime)
                    .unwrap_or(CellValue::Number(serial))
            }
            Data::DateTimeIso(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
                .map(CellValue::DateTime)
                .unwrap_or_else(|_| CellValue::String(s.clone())),
            Data::DurationIso(s) => CellValue::String(s.clone()),
            Data::Error(e) => CellValue::Error(format!("{:?}", e)),
        },
    }
}

/// Excel datetime (days since 1899-12-30) to a calendar datetime
fn excel_serial_to_datetime(value: f64) -> Option<NaiveDateTime> {
    let days = value.floor() as i64;
    let seconds = (value.fract() * 86400.0).round() as i64;

    NaiveDate::from_ymd_opt(1899, 12, 30)?
        .and_hms_opt(0, 0, 0)?
        .checked_add_signed(Duration::try_days(days)?)?
        .checked_add_signed(Duration::try_seconds(seconds)?)
}

/// Convert column index (0-based) to Excel column letter (A, B, ..., Z, AA, AB, ...)
pub(crate) fn column_index_to_letter(index: u32) -> String {
    let mut result = String::new();
    let mut n = index + 1;

    while n > 0 {
        n -= 1;
        let c = (b'A' + (n % 26) as u8) as char;
        result.insert(0, c);
        n /= 26;
    }

    result
}
