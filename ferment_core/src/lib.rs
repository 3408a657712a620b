#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Fermentation automation core (hardware-agnostic).
//!
//! All device access goes through `ferment_hardware::HardwareBridge`, which
//! in turn talks to the `ferment_traits` device traits or their simulated
//! stand-ins.
//!
//! ## Architecture
//!
//! - **Flow**: 4-20 mA linearization (`linearize`), sample cadence
//!   (`scheduler`) and the retention ring (`flow`)
//! - **Calendars**: per-day setpoint and dosing events (`calendar`), file
//!   import (`calendar_import`)
//! - **Control**: relay hysteresis (`thermal`) and pump windows (`dosing`),
//!   aggregated per vessel (`vessel`)
//! - **Persistence**: CSV sinks and log sessions (`logger`), backup history
//!   reader (`history`)
//! - **Runtime**: the tick `Engine`, operator commands and published
//!   snapshots
//!
//! Time comes from a `ferment_traits::Clock`, so the whole tick runs under a
//! `ManualClock` in tests.

pub mod atomic;
pub mod calendar;
pub mod calendar_import;
pub mod command;
pub mod dosing;
pub mod engine;
pub mod error;
pub mod flow;
pub mod history;
pub mod hw_error;
pub mod linearize;
pub mod logger;
pub mod plant;
pub mod scheduler;
pub mod snapshot;
pub mod thermal;
pub mod util;
pub mod vessel;

pub use calendar::{CalendarEvent, DaySchedule, MinuteGate, TimeOfDay};
pub use command::{
    CalendarKind, Command, CommandSender, LogAction, LogTarget, PumpCommand, VesselCommand,
};
pub use engine::{Engine, bridge_config};
pub use error::{CalendarError, ControlError, FermentError, LogError, Report, Result};
pub use flow::{FlowRing, FlowSample, FlowStats};
pub use linearize::{FlowReading, FlowStatus, Linearizer};
pub use logger::LogState;
pub use snapshot::{Snapshot, SnapshotReader, VesselSnapshot};
pub use thermal::{ForceMode, ThermalOutput};
pub use vessel::Vessel;
