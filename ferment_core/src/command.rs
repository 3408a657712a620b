//! Operator commands.
//!
//! Commands are queued from any thread and applied by the engine at the start
//! of the next tick, never while a tick is running.
use std::path::PathBuf;

use chrono::NaiveDate;
use crossbeam_channel as xch;

use crate::calendar::DaySchedule;
use crate::thermal::ForceMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpCommand {
    On,
    Off,
    Toggle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarKind {
    Setpoint,
    Dosing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Instrument,
    Flow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogAction {
    Start,
    Pause,
    Restart,
    Export(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub enum VesselCommand {
    SetManual(bool),
    Force(ForceMode),
    Pump(PumpCommand),
    SetSetpoint(f64),
    SetBand(f64),
    SetPumpFrequency(f32),
    ReplaceCalendar(CalendarKind, DaySchedule<f64>),
    AddEvent {
        kind: CalendarKind,
        date: NaiveDate,
        time: String,
        value: f64,
    },
    /// `index` is the position in the time-sorted listing of `date`.
    EditEvent {
        kind: CalendarKind,
        date: NaiveDate,
        index: usize,
        time: String,
        value: f64,
    },
    DeleteEvent {
        kind: CalendarKind,
        date: NaiveDate,
        index: usize,
    },
    ClearDay {
        kind: CalendarKind,
        date: NaiveDate,
    },
    Log(LogTarget, LogAction),
    StopAll,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Vessel { vessel: String, cmd: VesselCommand },
    StopAll,
}

impl Command {
    pub fn vessel(name: impl Into<String>, cmd: VesselCommand) -> Self {
        Self::Vessel {
            vessel: name.into(),
            cmd,
        }
    }
}

/// Cloneable handle for queueing commands.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: xch::Sender<Command>,
}

impl CommandSender {
    /// Queue a command; false once the engine is gone.
    pub fn send(&self, cmd: Command) -> bool {
        self.tx.send(cmd).is_ok()
    }
}

#[derive(Debug)]
pub struct CommandReceiver {
    rx: xch::Receiver<Command>,
}

impl CommandReceiver {
    /// Everything queued so far, in order.
    pub fn drain(&self) -> Vec<Command> {
        self.rx.try_iter().collect()
    }
}

pub fn command_channel() -> (CommandSender, CommandReceiver) {
    let (tx, rx) = xch::unbounded();
    (CommandSender { tx }, CommandReceiver { rx })
}
