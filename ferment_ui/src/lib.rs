#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Operator surface: a plain-text panel rendered from engine snapshots and a
//! line parser turning operator input into queued core commands.
//!
//! Nothing here decides anything about automation; it only renders state
//! and forwards commands.
use std::fmt::Write as _;
use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use ferment_core::calendar_import::import_file;
use ferment_core::{
    CalendarKind, Command, ForceMode, LogAction, LogState, LogTarget, PumpCommand, Snapshot,
    ThermalOutput, VesselCommand, VesselSnapshot,
};

/// One parsed operator line.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Command(Command),
    Status,
    Help,
    Quit,
    Empty,
}

#[derive(Debug, Parser)]
#[command(no_binary_name = true, disable_help_flag = true, disable_help_subcommand = true)]
struct Line {
    #[command(subcommand)]
    op: Op,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PumpArg {
    On,
    Off,
    Toggle,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ForceArg {
    Cold,
    Hot,
    Close,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Setpoint,
    Dosing,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogArg {
    Instrument,
    Flow,
}

#[derive(Debug, Subcommand)]
enum LogOp {
    Start,
    Pause,
    Restart,
    Export { dir: PathBuf },
}

#[derive(Debug, Subcommand)]
enum Op {
    #[command(alias = "exit")]
    Quit,
    Help,
    Status,
    Manual { vessel: String, state: Switch },
    Force { vessel: String, mode: ForceArg },
    Pump { vessel: String, action: PumpArg },
    #[command(alias = "sp")]
    Setpoint {
        vessel: String,
        #[arg(allow_negative_numbers = true)]
        celsius: f64,
    },
    Band { vessel: String, celsius: f64 },
    #[command(alias = "freq")]
    Frequency { vessel: String, hz: f32 },
    Event {
        vessel: String,
        kind: KindArg,
        date: NaiveDate,
        time: String,
        #[arg(allow_negative_numbers = true)]
        value: f64,
    },
    Edit {
        vessel: String,
        kind: KindArg,
        date: NaiveDate,
        index: usize,
        time: String,
        #[arg(allow_negative_numbers = true)]
        value: f64,
    },
    Delete {
        vessel: String,
        kind: KindArg,
        date: NaiveDate,
        index: usize,
    },
    Clear {
        vessel: String,
        kind: KindArg,
        date: NaiveDate,
    },
    Import {
        vessel: String,
        kind: KindArg,
        file: PathBuf,
    },
    Log {
        vessel: String,
        target: LogArg,
        #[command(subcommand)]
        action: LogOp,
    },
    Stop { vessel: Option<String> },
}

pub const HELP: &str = "\
commands:
  status                                   print the panel now
  manual <vessel> on|off                   manual override
  force <vessel> cold|hot|close            force relays (manual only)
  pump <vessel> on|off|toggle              manual dosing pump
  setpoint <vessel> <celsius>              alias: sp
  band <vessel> <celsius>
  frequency <vessel> <hz>                  alias: freq
  event <vessel> setpoint|dosing <date> <HH:MM> <value>
  edit <vessel> setpoint|dosing <date> <n> <HH:MM> <value>
  delete <vessel> setpoint|dosing <date> <n>
                                           n: position in the day's time-sorted listing
  clear <vessel> setpoint|dosing <date>
  import <vessel> setpoint|dosing <file>   replace a calendar from csv/xlsx
  log <vessel> instrument|flow start|pause|restart|export <dir>
  stop [<vessel>]                          stop-all, one vessel or every vessel
  quit";

/// Parse one operator line. Errors carry a message ready to print.
pub fn parse_command(line: &str) -> Result<Input, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.is_empty() {
        return Ok(Input::Empty);
    }
    let parsed = Line::try_parse_from(words).map_err(|e| first_line(&e.to_string()))?;
    let vessel = |name: String, cmd: VesselCommand| Input::Command(Command::vessel(name, cmd));
    Ok(match parsed.op {
        Op::Quit => Input::Quit,
        Op::Help => Input::Help,
        Op::Status => Input::Status,
        Op::Manual { vessel: v, state } => vessel(v, VesselCommand::SetManual(matches!(state, Switch::On))),
        Op::Force { vessel: v, mode } => vessel(
            v,
            VesselCommand::Force(match mode {
                ForceArg::Cold => ForceMode::Cold,
                ForceArg::Hot => ForceMode::Hot,
                ForceArg::Close => ForceMode::CloseAll,
            }),
        ),
        Op::Pump { vessel: v, action } => vessel(
            v,
            VesselCommand::Pump(match action {
                PumpArg::On => PumpCommand::On,
                PumpArg::Off => PumpCommand::Off,
                PumpArg::Toggle => PumpCommand::Toggle,
            }),
        ),
        Op::Setpoint { vessel: v, celsius } => vessel(v, VesselCommand::SetSetpoint(celsius)),
        Op::Band { vessel: v, celsius } => vessel(v, VesselCommand::SetBand(celsius)),
        Op::Frequency { vessel: v, hz } => vessel(v, VesselCommand::SetPumpFrequency(hz)),
        Op::Event {
            vessel: v,
            kind,
            date,
            time,
            value,
        } => vessel(
            v,
            VesselCommand::AddEvent {
                kind: kind.into(),
                date,
                time,
                value,
            },
        ),
        Op::Edit {
            vessel: v,
            kind,
            date,
            index,
            time,
            value,
        } => vessel(
            v,
            VesselCommand::EditEvent {
                kind: kind.into(),
                date,
                index,
                time,
                value,
            },
        ),
        Op::Delete {
            vessel: v,
            kind,
            date,
            index,
        } => vessel(
            v,
            VesselCommand::DeleteEvent {
                kind: kind.into(),
                date,
                index,
            },
        ),
        Op::Clear { vessel: v, kind, date } => vessel(
            v,
            VesselCommand::ClearDay {
                kind: kind.into(),
                date,
            },
        ),
        Op::Import { vessel: v, kind, file } => {
            let cal = import_file::<f64>(&file).map_err(|e| format!("{}: {e}", file.display()))?;
            if cal.is_empty() {
                return Err(format!("{}: no valid rows", file.display()));
            }
            vessel(v, VesselCommand::ReplaceCalendar(kind.into(), cal))
        }
        Op::Log {
            vessel: v,
            target,
            action,
        } => {
            let target = match target {
                LogArg::Instrument => LogTarget::Instrument,
                LogArg::Flow => LogTarget::Flow,
            };
            let action = match action {
                LogOp::Start => LogAction::Start,
                LogOp::Pause => LogAction::Pause,
                LogOp::Restart => LogAction::Restart,
                LogOp::Export { dir } => LogAction::Export(dir),
            };
            vessel(v, VesselCommand::Log(target, action))
        }
        Op::Stop { vessel: Some(v) } => vessel(v, VesselCommand::StopAll),
        Op::Stop { vessel: None } => Input::Command(Command::StopAll),
    })
}

impl From<KindArg> for CalendarKind {
    fn from(k: KindArg) -> Self {
        match k {
            KindArg::Setpoint => Self::Setpoint,
            KindArg::Dosing => Self::Dosing,
        }
    }
}

fn first_line(msg: &str) -> String {
    msg.lines().next().unwrap_or_default().trim_start_matches("error: ").to_owned()
}

fn output_label(out: ThermalOutput) -> &'static str {
    match out {
        ThermalOutput::Rest => "rest",
        ThermalOutput::Cold => "COLD",
        ThermalOutput::Hot => "HOT",
    }
}

fn log_label(state: LogState) -> &'static str {
    match state {
        LogState::Stopped => "stop",
        LogState::Running => "rec",
        LogState::Paused => "pause",
    }
}

fn pump_cell(v: &VesselSnapshot) -> String {
    if !v.pump_running {
        return "off".into();
    }
    if v.dosing_remaining_s > 0.0 {
        format!("on {:.0}s", v.dosing_remaining_s.ceil())
    } else if v.manual_pump {
        "on man".into()
    } else {
        "on".into()
    }
}

fn flow_cells(v: &VesselSnapshot) -> (String, String, String) {
    match (&v.flow, &v.flow_error) {
        (_, Some(err)) => ("--".into(), "--".into(), format!("ERR {err}")),
        (Some(s), None) => (format!("{:.2}", s.flow), format!("{:.3}", s.rate), s.status.as_str().into()),
        (None, None) => ("--".into(), "--".into(), "-".into()),
    }
}

/// Render the operator panel for one snapshot.
pub fn render_panel(snap: &Snapshot) -> String {
    let mut out = String::new();
    let hw = &snap.hardware;
    let _ = writeln!(
        out,
        "tick {}  {}  probes: {}  actuators: {}",
        snap.tick,
        snap.taken_at.format("%Y-%m-%d %H:%M:%S"),
        hw.temperature,
        hw.actuators
    );
    let _ = writeln!(
        out,
        "{:<8} {:>7} {:>7} {:>5} {:<5} {:<6} {:<9} {:>8} {:>7} {:<10} {:<5} {:<5}",
        "VESSEL", "TEMP", "SP", "BAND", "OUT", "MODE", "PUMP", "FLOW", "RATE", "STATUS", "LOG", "CO2"
    );
    for v in &snap.vessels {
        let (flow, rate, status) = flow_cells(v);
        let _ = writeln!(
            out,
            "{:<8} {:>7.2} {:>7.2} {:>5.2} {:<5} {:<6} {:<9} {:>8} {:>7} {:<10} {:<5} {:<5}",
            v.name,
            v.temperature,
            v.setpoint,
            v.band,
            output_label(v.output),
            if v.manual { "manual" } else { "auto" },
            pump_cell(v),
            flow,
            rate,
            status,
            log_label(v.instrument_log),
            log_label(v.flow_log),
        );
    }
    for ch in hw.flow.iter().filter(|c| c.mode.is_simulated()) {
        let _ = writeln!(out, "flow {}: {}", ch.name, ch.mode);
    }
    if let Some(r) = &snap.last_rejection {
        let _ = writeln!(out, "rejected: {r}");
    }
    if let Some(e) = &snap.last_log_error {
        let _ = writeln!(out, "log error: {e}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn cmd(line: &str) -> Command {
        match parse_command(line).unwrap() {
            Input::Command(c) => c,
            other => panic!("expected a command, got {other:?}"),
        }
    }

    #[rstest]
    #[case("manual F1 on", VesselCommand::SetManual(true))]
    #[case("force F1 close", VesselCommand::Force(ForceMode::CloseAll))]
    #[case("pump F1 toggle", VesselCommand::Pump(PumpCommand::Toggle))]
    #[case("sp F1 -1.5", VesselCommand::SetSetpoint(-1.5))]
    #[case("band F1 0.3", VesselCommand::SetBand(0.3))]
    #[case("freq F1 4000", VesselCommand::SetPumpFrequency(4000.0))]
    #[case("stop F1", VesselCommand::StopAll)]
    #[case("edit F1 setpoint 2025-06-10 0 07:30 -2", VesselCommand::EditEvent { kind: CalendarKind::Setpoint, date: NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(), index: 0, time: "07:30".into(), value: -2.0 })]
    #[case("delete F1 dosing 2025-06-10 2", VesselCommand::DeleteEvent { kind: CalendarKind::Dosing, date: NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(), index: 2 })]
    #[case("clear F1 setpoint 2025-06-10", VesselCommand::ClearDay { kind: CalendarKind::Setpoint, date: NaiveDate::from_ymd_opt(2025, 6, 10).unwrap() })]
    #[case("log F1 flow export /tmp/out", VesselCommand::Log(LogTarget::Flow, LogAction::Export("/tmp/out".into())))]
    fn vessel_commands(#[case] line: &str, #[case] expected: VesselCommand) {
        assert_eq!(cmd(line), Command::vessel("F1", expected));
    }

    #[test]
    fn calendar_event_keeps_raw_time() {
        let c = cmd("event F2 dosing 2025-06-10 9:5 30");
        assert_eq!(
            c,
            Command::vessel(
                "F2",
                VesselCommand::AddEvent {
                    kind: CalendarKind::Dosing,
                    date: NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
                    time: "9:5".into(),
                    value: 30.0,
                }
            )
        );
    }

    #[rstest]
    #[case("", Input::Empty)]
    #[case("   ", Input::Empty)]
    #[case("quit", Input::Quit)]
    #[case("exit", Input::Quit)]
    #[case("help", Input::Help)]
    #[case("status", Input::Status)]
    #[case("stop", Input::Command(Command::StopAll))]
    fn session_inputs(#[case] line: &str, #[case] expected: Input) {
        assert_eq!(parse_command(line).unwrap(), expected);
    }

    #[rstest]
    #[case("force F1 sideways")]
    #[case("setpoint F1 warm")]
    #[case("frobnicate")]
    #[case("event F1 setpoint 10/06/2025 08:00 18")]
    fn bad_lines_are_errors(#[case] line: &str) {
        let err = parse_command(line).unwrap_err();
        assert!(!err.is_empty());
        assert!(!err.contains('\n'));
    }

    #[test]
    fn import_missing_file_is_an_error() {
        let err = parse_command("import F1 setpoint /nonexistent/cal.csv").unwrap_err();
        assert!(err.contains("cal.csv"));
    }
}
