//! One-shot subcommands: config loading, self-check, health, calendar
//! preview and backup history.
use std::fs;
use std::path::Path;
use std::time::Duration;

use eyre::{Result, WrapErr};
use ferment_config::Config;
use ferment_core::calendar_import::import_file;
use ferment_core::error::{CalendarError, FermentError};
use ferment_core::history::read_recent_backup;
use ferment_core::{DaySchedule, bridge_config};
use ferment_hardware::HardwareBridge;
use ferment_traits::{AnalogAddr, Clock, SystemClock};
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::CalendarKindArg;

fn config_error(msg: impl std::fmt::Display) -> eyre::Report {
    eyre::Report::new(FermentError::Config(msg.to_string()))
}

/// Defaults, then the TOML file if present, then environment overrides.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut cfg = match fs::read_to_string(path) {
        Ok(text) => ferment_config::load_toml(&text)
            .map_err(|e| config_error(format!("{}: {e}", path.display())))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
        Err(e) => return Err(e).wrap_err_with(|| format!("reading config {}", path.display())),
    };
    cfg.apply_env().map_err(config_error)?;
    cfg.validate().map_err(config_error)?;
    Ok(cfg)
}

/// Bind every domain the way `run` would and report it.
pub fn self_check(cfg: &Config, json: bool) -> Result<()> {
    let now = SystemClock::new().now();
    let mut bridge = HardwareBridge::init(bridge_config(cfg));
    for (i, v) in cfg.vessels.iter().enumerate() {
        if let Some(fa) = cfg.flow_addr(i) {
            let addr = AnalogAddr {
                address: fa.address,
                channel: fa.channel,
                gain: fa.gain,
            };
            bridge.add_flow_channel(&v.name, addr, now);
        }
    }
    let status = bridge.status();
    bridge.release_all();

    if json {
        println!("{}", serde_json::to_string(&status)?);
    } else {
        println!("temperature: {}", status.temperature);
        for p in &status.probes {
            println!("  probe {p}");
        }
        println!("actuators:   {}", status.actuators);
        for ch in &status.flow {
            println!(
                "flow {:<6} 0x{:02x}/ch{} gain {}: {}",
                ch.name, ch.address, ch.channel, ch.gain, ch.mode
            );
        }
    }
    Ok(())
}

fn probe_writable(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).wrap_err_with(|| format!("creating {}", dir.display()))?;
    let probe = dir.join(".fermentctl-health");
    fs::write(&probe, b"ok").wrap_err_with(|| format!("{} is not writable", dir.display()))?;
    fs::remove_file(&probe).wrap_err_with(|| format!("cleaning up {}", probe.display()))?;
    Ok(())
}

pub fn health(cfg: &Config, json: bool) -> Result<()> {
    probe_writable(&cfg.paths.process_dir)?;
    let backup_dir = cfg
        .paths
        .backup_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    probe_writable(backup_dir)?;
    if json {
        println!("{}", serde_json::json!({ "status": "ok", "vessels": cfg.vessels.len() }));
    } else {
        println!("ok: {} vessels, logs writable", cfg.vessels.len());
    }
    Ok(())
}

#[derive(Serialize)]
struct EventRow {
    date: String,
    time: String,
    value: f64,
}

pub fn calendar_import(file: &Path, kind: CalendarKindArg, json: bool) -> Result<()> {
    let cal: DaySchedule<f64> = import_file(file).wrap_err_with(|| format!("importing {}", file.display()))?;
    if cal.is_empty() {
        return Err(eyre::Report::new(CalendarError::Empty));
    }
    if kind == CalendarKindArg::Dosing {
        let ignored = cal.iter().filter(|(_, e)| e.value <= 0.0).count();
        if ignored > 0 {
            warn!(ignored, "dosing events with non-positive durations never run the pump");
        }
    }
    info!(events = cal.len(), days = cal.dates().count(), "calendar parsed");
    let rows: Vec<EventRow> = cal
        .iter()
        .map(|(date, e)| EventRow {
            date: date.format("%Y-%m-%d").to_string(),
            time: e.time.to_string(),
            value: e.value,
        })
        .collect();
    if json {
        println!("{}", serde_json::to_string(&rows)?);
    } else {
        for r in &rows {
            println!("{} {} {}", r.date, r.time, r.value);
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct VesselHistory {
    vessel: String,
    rows: usize,
    first: String,
    last: String,
    min_temperature: f64,
    max_temperature: f64,
    mean_temperature: f64,
    last_setpoint: f64,
}

pub fn history(cfg: &Config, days: f64, vessel: Option<&str>, json: bool) -> Result<()> {
    if !days.is_finite() || days <= 0.0 {
        eyre::bail!("--days must be a positive number");
    }
    let now = SystemClock::new().local_now();
    let lookback = Duration::from_secs_f64((days * 86_400.0).min(1e12));
    let groups = read_recent_backup(&cfg.paths.backup_file, now, lookback, vessel)?;
    let summary: Vec<VesselHistory> = groups
        .into_iter()
        .filter_map(|(name, points)| {
            let first = points.first()?;
            let last = points.last()?;
            let temps = points.iter().map(|p| p.temperature);
            let min = temps.clone().fold(f64::INFINITY, f64::min);
            let max = temps.clone().fold(f64::NEG_INFINITY, f64::max);
            #[allow(clippy::cast_precision_loss)]
            let mean = temps.sum::<f64>() / points.len() as f64;
            Some(VesselHistory {
                vessel: name,
                rows: points.len(),
                first: ferment_core::util::format_ts(first.timestamp),
                last: ferment_core::util::format_ts(last.timestamp),
                min_temperature: min,
                max_temperature: max,
                mean_temperature: mean,
                last_setpoint: last.setpoint,
            })
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string(&summary)?);
    } else if summary.is_empty() {
        println!("no history in the last {days} day(s)");
    } else {
        for h in &summary {
            println!(
                "{}: {} rows {} .. {}  T min {:.2} mean {:.2} max {:.2}  SP {:.2}",
                h.vessel,
                h.rows,
                h.first,
                h.last,
                h.min_temperature,
                h.mean_temperature,
                h.max_temperature,
                h.last_setpoint
            );
        }
    }
    Ok(())
}
