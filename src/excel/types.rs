use chrono::NaiveDateTime;
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;

/// Represents a cell value with type information
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    String(String),
    Number(f64),
    Boolean(bool),
    DateTime(NaiveDateTime),
    Error(String),
}

static EMPTY_CELL: CellValue = CellValue::Empty;

impl CellValue {
    /// Text form of the cell as the catalog pipeline sees it.
    ///
    /// Missing and error cells read as `"nan"`, integral numbers drop their
    /// fractional part and booleans print as `True`/`False`.
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty | CellValue::Error(_) => "nan".to_string(),
            CellValue::String(s) => s.clone(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Boolean(b) => String::from(if *b { "True" } else { "False" }),
            CellValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    /// JSON form used when a cell is copied into a record unchanged
    pub fn to_json(&self) -> Value {
        match self {
            CellValue::Empty | CellValue::Error(_) => Value::Null,
            CellValue::String(s) => Value::String(s.clone()),
            CellValue::Number(n) => number_to_json(*n),
            CellValue::Boolean(b) => Value::Bool(*b),
            CellValue::DateTime(dt) => Value::String(dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
        }
    }
}

/// Largest magnitude still printed as a plain integer
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

fn is_integral(n: f64) -> bool {
    n.is_finite() && n.fract() == 0.0 && n.abs() < MAX_EXACT_INTEGER
}

fn format_number(n: f64) -> String {
    if is_integral(n) {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn number_to_json(n: f64) -> Value {
    if is_integral(n) {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// One data row of a sheet, keyed by its 1-based spreadsheet row number
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub row_number: u32,
    pub cells: Vec<CellValue>,
}

impl RawRow {
    /// Cell at a header position; short rows read as empty
    pub fn get(&self, col: usize) -> &CellValue {
        self.cells.get(col).unwrap_or(&EMPTY_CELL)
    }
}

/// Header names and data rows of a worksheet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl SheetTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

/// Excel-specific errors
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ExcelError {
    pub message: String,
    pub error_type: ExcelErrorType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExcelErrorType {
    FileNotFound,
    SheetNotFound,
    ReadError,
    WriteError,
    WatchError,
}

impl ExcelError {
    pub fn new(message: impl Into<String>, error_type: ExcelErrorType) -> Self {
        ExcelError {
            message: message.into(),
            error_type,
        }
    }

    pub fn file_not_found(path: &str) -> Self {
        ExcelError::new(format!("File not found: {}", path), ExcelErrorType::FileNotFound)
    }

    pub fn sheet_not_found(sheet: &str) -> Self {
        ExcelError::new(format!("Sheet not found: {}", sheet), ExcelErrorType::SheetNotFound)
    }

    pub fn read_error(message: impl Into<String>) -> Self {
        ExcelError::new(message, ExcelErrorType::ReadError)
    }

    pub fn write_error(message: impl Into<String>) -> Self {
        ExcelError::new(message, ExcelErrorType::WriteError)
    }

    pub fn watch_error(message: impl Into<String>) -> Self {
        ExcelError::new(message, ExcelErrorType::WatchError)
    }
}

/// File change event from watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChangeEvent {
    pub path: PathBuf,
    pub change_type: FileChangeType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeType {
    Modified,
    Deleted,
    Renamed,
}
