//! Append-only CSV sinks.
//!
//! Each append builds the whole row (plus the header for a new or empty
//! file) in memory and hands it to the file in one `write_all`, so a failed
//! append never leaves a partial row behind. Parent directories are created
//! before every attempt.
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info};

use crate::atomic::copy_atomic;
use crate::error::{ControlError, LogError, Result};
use crate::flow::FlowSample;
use crate::util::format_ts;

pub const INSTRUMENT_COLUMNS: &[&str] = &[
    "timestamp",
    "vessel",
    "temperature",
    "setpoint",
    "band",
    "cold",
    "hot",
    "dosing",
    "frequency",
];

pub const FLOW_COLUMNS: &[&str] = &[
    "timestamp",
    "vessel",
    "flow",
    "rate",
    "current",
    "voltage",
    "status",
];

pub const BACKUP_COLUMNS: &[&str] = INSTRUMENT_COLUMNS;

/// Flat field mapping; field order is irrelevant to the sinks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogRecord {
    fields: Vec<(String, String)>,
}

impl LogRecord {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn field(mut self, name: &str, value: impl ToString) -> Self {
        let value = value.to_string();
        match self.fields.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name.to_owned(), value)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }
}

fn flag(on: bool) -> u8 {
    u8::from(on)
}

/// One instrument row for a vessel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstrumentRow<'a> {
    pub timestamp: NaiveDateTime,
    pub vessel: &'a str,
    pub temperature: f64,
    pub setpoint: f64,
    pub band: f64,
    pub cold: bool,
    pub hot: bool,
    pub dosing: bool,
    pub frequency: f32,
}

impl InstrumentRow<'_> {
    pub fn to_record(&self) -> LogRecord {
        LogRecord::new()
            .field("timestamp", format_ts(self.timestamp))
            .field("vessel", self.vessel)
            .field("temperature", format!("{:.2}", self.temperature))
            .field("setpoint", format!("{:.2}", self.setpoint))
            .field("band", format!("{:.2}", self.band))
            .field("cold", flag(self.cold))
            .field("hot", flag(self.hot))
            .field("dosing", flag(self.dosing))
            .field("frequency", format!("{:.0}", self.frequency))
    }
}

pub fn flow_record(vessel: &str, s: &FlowSample) -> LogRecord {
    LogRecord::new()
        .field("timestamp", format_ts(s.timestamp))
        .field("vessel", vessel)
        .field("flow", format!("{:.3}", s.flow))
        .field("rate", format!("{:.4}", s.rate))
        .field("current", format!("{:.3}", s.current_ma))
        .field("voltage", format!("{:.4}", s.voltage))
        .field("status", s.status)
}

/// How a sink treats records that do not match its columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    /// Every column required, nothing else allowed.
    Strict,
    /// Unknown fields ignored, missing ones written empty.
    Lenient,
}

#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
    columns: &'static [&'static str],
    schema: Schema,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>, columns: &'static [&'static str], schema: Schema) -> Self {
        Self {
            path: path.into(),
            columns,
            schema,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn columns(&self) -> &'static [&'static str] {
        self.columns
    }

    fn io_err(&self, source: std::io::Error) -> LogError {
        LogError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn project<'r>(&self, rec: &'r LogRecord) -> std::result::Result<Vec<&'r str>, LogError> {
        if self.schema == Schema::Strict
            && let Some(extra) = rec.names().find(|n| !self.columns.contains(n))
        {
            return Err(LogError::UnexpectedColumn(extra.to_owned()));
        }
        self.columns
            .iter()
            .map(|c| match (rec.get(c), self.schema) {
                (Some(v), _) => Ok(v),
                (None, Schema::Lenient) => Ok(""),
                (None, Schema::Strict) => Err(LogError::MissingColumn((*c).to_owned())),
            })
            .collect()
    }

    fn needs_header(&self) -> bool {
        fs::metadata(&self.path).map_or(true, |m| m.len() == 0)
    }

    /// Append one record, writing the header first when the file is new or empty.
    pub fn append(&self, rec: &LogRecord) -> std::result::Result<(), LogError> {
        let row = self.project(rec)?;
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir).map_err(|e| self.io_err(e))?;
        }
        let header = self.needs_header();
        let mut wtr = csv::Writer::from_writer(Vec::new());
        if header {
            wtr.write_record(self.columns)?;
        }
        wtr.write_record(&row)?;
        let bytes = wtr
            .into_inner()
            .map_err(|e| self.io_err(std::io::Error::other(e.to_string())))?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        f.write_all(&bytes).map_err(|e| self.io_err(e))?;
        if header {
            debug!(path = %self.path.display(), "log created");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogState {
    #[default]
    Stopped,
    Running,
    Paused,
}

/// Operator-controlled recording into one sink.
#[derive(Debug, Clone)]
pub struct LogSession {
    sink: CsvSink,
    state: LogState,
}

impl LogSession {
    pub fn new(sink: CsvSink) -> Self {
        Self {
            sink,
            state: LogState::Stopped,
        }
    }

    pub fn state(&self) -> LogState {
        self.state
    }

    pub fn path(&self) -> &Path {
        self.sink.path()
    }

    pub fn start(&mut self) {
        self.state = LogState::Running;
        info!(path = %self.sink.path().display(), "log started");
    }

    pub fn pause(&mut self) {
        if self.state == LogState::Running {
            self.state = LogState::Paused;
        }
    }

    /// Delete the file and return to `Stopped`.
    pub fn restart(&mut self) -> Result<()> {
        self.state = LogState::Stopped;
        match fs::remove_file(self.sink.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(eyre::Report::new(self.sink.io_err(e))),
        }
    }

    /// Copy the log into `dest_dir` under its own file name.
    pub fn export(&self, dest_dir: &Path) -> Result<PathBuf> {
        if self.state == LogState::Running {
            return Err(eyre::Report::new(ControlError::LogRunning));
        }
        let name = self
            .sink
            .path()
            .file_name()
            .ok_or_else(|| eyre::eyre!("log path has no file name"))?;
        fs::create_dir_all(dest_dir)?;
        let dest = dest_dir.join(name);
        copy_atomic(self.sink.path(), &dest).map_err(|e| eyre::Report::new(self.sink.io_err(e)))?;
        info!(dest = %dest.display(), "log exported");
        Ok(dest)
    }

    /// Append when running; returns whether a row was written.
    pub fn record(&self, rec: &LogRecord) -> std::result::Result<bool, LogError> {
        if self.state != LogState::Running {
            return Ok(false);
        }
        self.sink.append(rec).map(|()| true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 10)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap()
    }

    fn row() -> LogRecord {
        InstrumentRow {
            timestamp: ts(),
            vessel: "F1",
            temperature: 20.456,
            setpoint: 20.0,
            band: 0.5,
            cold: true,
            hot: false,
            dosing: false,
            frequency: 8000.0,
        }
        .to_record()
    }

    #[test]
    fn header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path().join("a/b/F1.csv"), INSTRUMENT_COLUMNS, Schema::Strict);
        sink.append(&row()).unwrap();
        sink.append(&row()).unwrap();
        let text = fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "timestamp,vessel,temperature,setpoint,band,cold,hot,dosing,frequency");
        assert_eq!(lines[1], "2025-06-10 08:30:00,F1,20.46,20.00,0.50,1,0,0,8000");
    }

    #[test]
    fn empty_file_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("F1.csv");
        fs::write(&p, "").unwrap();
        CsvSink::new(&p, INSTRUMENT_COLUMNS, Schema::Strict)
            .append(&row())
            .unwrap();
        assert!(fs::read_to_string(&p).unwrap().starts_with("timestamp,"));
    }

    #[test]
    fn strict_sink_rejects_mismatched_records() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path().join("F1.csv"), INSTRUMENT_COLUMNS, Schema::Strict);
        let extra = row().field("manual", 1);
        assert!(matches!(sink.append(&extra), Err(LogError::UnexpectedColumn(c)) if c == "manual"));
        let missing = LogRecord::new().field("timestamp", "x");
        assert!(matches!(sink.append(&missing), Err(LogError::MissingColumn(_))));
        assert!(!sink.path().exists());
    }

    #[test]
    fn lenient_sink_ignores_unknown_and_blanks_missing() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path().join("backup.csv"), BACKUP_COLUMNS, Schema::Lenient);
        let rec = LogRecord::new()
            .field("vessel", "F2")
            .field("timestamp", "2025-06-10 08:30:00")
            .field("flow", 12.5);
        sink.append(&rec).unwrap();
        let text = fs::read_to_string(sink.path()).unwrap();
        assert_eq!(text.lines().nth(1), Some("2025-06-10 08:30:00,F2,,,,,,,"));
    }

    #[test]
    fn unwritable_target_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let sink = CsvSink::new(blocker.join("F1.csv"), INSTRUMENT_COLUMNS, Schema::Strict);
        assert!(matches!(sink.append(&row()), Err(LogError::Io { .. })));
    }

    #[test]
    fn session_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path().join("F1.csv"), INSTRUMENT_COLUMNS, Schema::Strict);
        let mut s = LogSession::new(sink);
        assert!(!s.record(&row()).unwrap());
        s.start();
        assert!(s.record(&row()).unwrap());
        assert!(s.export(&dir.path().join("out")).is_err());
        s.pause();
        assert_eq!(s.state(), LogState::Paused);
        assert!(!s.record(&row()).unwrap());
        let dest = s.export(&dir.path().join("out")).unwrap();
        assert_eq!(fs::read_to_string(&dest).unwrap().lines().count(), 2);
        s.restart().unwrap();
        assert_eq!(s.state(), LogState::Stopped);
        assert!(!s.path().exists());
        s.restart().unwrap();
    }
}
