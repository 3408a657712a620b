use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum FermentError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("timeout waiting for sensor")]
    Timeout,
    #[error("unknown vessel: {0}")]
    UnknownVessel(String),
    #[error("io error: {0}")]
    Io(String),
}

/// Calendar edits and imports.
#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("invalid time {0:?} (expected HH:MM, 00:00-23:59)")]
    InvalidTime(String),
    #[error("cannot schedule on past date {0}")]
    PastDate(chrono::NaiveDate),
    #[error("no event #{index} on {date}")]
    NoSuchEvent { date: chrono::NaiveDate, index: usize },
    #[error("unsupported calendar file type {0:?}")]
    UnsupportedFormat(String),
    #[error("no valid rows found (need date, time and value columns)")]
    Empty,
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("spreadsheet: {0}")]
    Spreadsheet(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Operator commands refused by a controller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("manual mode is off; enable it before forcing outputs")]
    NotManual,
    #[error("log is running; pause it first")]
    LogRunning,
    #[error("{0}")]
    Rejected(String),
}

/// CSV sink failures.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("log {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("csv encode: {0}")]
    Csv(#[from] csv::Error),
    #[error("record is missing column {0:?}")]
    MissingColumn(String),
    #[error("record has unexpected column {0:?}")]
    UnexpectedColumn(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
