//! Reading the shared backup log for trend views.
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use chrono::{NaiveDateTime, TimeDelta};
use serde::Serialize;
use tracing::debug;

use crate::error::Result;

pub const HISTORY_TS_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub timestamp: NaiveDateTime,
    pub temperature: f64,
    pub setpoint: f64,
}

pub fn parse_history_ts(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    HISTORY_TS_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
}

/// Points per vessel from the backup file within `lookback` of `now`, in file order.
///
/// A missing file is an empty history. Rows with a bad timestamp or
/// non-numeric readings are skipped.
pub fn read_recent_backup(
    path: &Path,
    now: NaiveDateTime,
    lookback: Duration,
    vessel: Option<&str>,
) -> Result<BTreeMap<String, Vec<HistoryPoint>>> {
    let mut out: BTreeMap<String, Vec<HistoryPoint>> = BTreeMap::new();
    let mut rdr = match csv::ReaderBuilder::new().flexible(true).from_path(path) {
        Ok(r) => r,
        Err(e) if matches!(e.kind(), csv::ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::NotFound) => {
            return Ok(out);
        }
        Err(e) => return Err(e.into()),
    };
    let cutoff = TimeDelta::from_std(lookback)
        .ok()
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(NaiveDateTime::MIN);
    let headers = rdr.headers()?.clone();
    let col = |name: &str| headers.iter().position(|h| h.trim() == name);
    let (Some(ts_i), Some(v_i), Some(t_i), Some(sp_i)) =
        (col("timestamp"), col("vessel"), col("temperature"), col("setpoint"))
    else {
        debug!(path = %path.display(), "backup file has no usable header");
        return Ok(out);
    };
    let mut skipped = 0usize;
    for rec in rdr.records() {
        let Ok(rec) = rec else {
            skipped += 1;
            continue;
        };
        let field = |i: usize| rec.get(i).map(str::trim);
        let name = field(v_i).unwrap_or_default();
        if vessel.is_some_and(|v| v != name) {
            continue;
        }
        let point = (|| {
            let timestamp = parse_history_ts(field(ts_i)?)?;
            Some(HistoryPoint {
                timestamp,
                temperature: field(t_i)?.parse().ok()?,
                setpoint: field(sp_i)?.parse().ok()?,
            })
        })();
        match point {
            Some(p) if p.timestamp >= cutoff && p.timestamp <= now => {
                out.entry(name.to_owned()).or_default().push(p);
            }
            Some(_) => {}
            None => skipped += 1,
        }
    }
    debug!(vessels = out.len(), skipped, "backup history loaded");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn now() -> NaiveDateTime {
        parse_history_ts("2025-06-10 12:00:00").unwrap()
    }

    #[test]
    fn missing_file_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let h = read_recent_backup(&dir.path().join("nope.csv"), now(), Duration::from_secs(3600), None).unwrap();
        assert!(h.is_empty());
    }

    #[test]
    fn filters_window_vessel_and_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("backup.csv");
        fs::write(
            &p,
            "timestamp,vessel,temperature,setpoint,band,cold,hot,dosing,frequency\n\
             2025-06-09 11:00:00,F1,19.0,20.0,0.5,0,1,0,8000\n\
             2025-06-10 11:00:00,F1,19.5,20.0,0.5,0,1,0,8000\n\
             2025/06/10 11:30:00,F2,21.0,20.0,0.5,1,0,0,8000\n\
             garbage,F1,19.5,20.0,0.5,0,1,0,8000\n\
             2025-06-10 11:45:00,F1,n/a,20.0,0.5,0,1,0,8000\n\
             2025-06-10 11:50:00,F1,19.8,20.0\n",
        )
        .unwrap();
        let h = read_recent_backup(&p, now(), Duration::from_secs(2 * 3600), None).unwrap();
        assert_eq!(h["F1"].len(), 2);
        assert_eq!(h["F1"][1].temperature, 19.8);
        assert_eq!(h["F2"].len(), 1);

        let only = read_recent_backup(&p, now(), Duration::from_secs(2 * 3600), Some("F2")).unwrap();
        assert_eq!(only.keys().collect::<Vec<_>>(), ["F2"]);
    }

    #[test]
    fn accepts_both_timestamp_formats() {
        assert!(parse_history_ts("2025/06/10 01:02:03").is_some());
        assert!(parse_history_ts("2025-06-10T01:02:03").is_none());
    }
}
