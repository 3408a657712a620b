//! Read-only views of engine state for renderers.
//!
//! The engine publishes one snapshot per tick into a single-slot channel.
//! Readers take the newest and never block the tick.
use std::sync::Arc;

use chrono::NaiveDateTime;
use crossbeam_channel as xch;
use ferment_hardware::HardwareStatus;
use serde::Serialize;

use crate::flow::{FlowSample, FlowStats};
use crate::logger::LogState;
use crate::thermal::ThermalOutput;

#[derive(Debug, Clone, Serialize)]
pub struct VesselSnapshot {
    pub name: String,
    pub temperature: f64,
    pub setpoint: f64,
    pub band: f64,
    pub output: ThermalOutput,
    pub manual: bool,
    pub pump_running: bool,
    pub manual_pump: bool,
    pub dosing_remaining_s: f64,
    pub pump_frequency_hz: f32,
    pub flow: Option<FlowSample>,
    pub flow_stats: Option<FlowStats>,
    pub flow_error: Option<String>,
    pub flow_period_s: f64,
    /// Seconds until the next flow sample is due.
    pub flow_due_in_s: f64,
    pub instrument_log: LogState,
    pub flow_log: LogState,
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub taken_at: NaiveDateTime,
    pub tick: u64,
    pub vessels: Vec<VesselSnapshot>,
    pub hardware: HardwareStatus,
    /// Most recent refused operator command.
    pub last_rejection: Option<String>,
    pub last_log_error: Option<String>,
}

impl Snapshot {
    pub fn vessel(&self, name: &str) -> Option<&VesselSnapshot> {
        self.vessels.iter().find(|v| v.name == name)
    }
}

pub struct SnapshotPublisher {
    tx: xch::Sender<Arc<Snapshot>>,
    // kept to evict a stale snapshot nobody picked up
    rx: xch::Receiver<Arc<Snapshot>>,
}

#[derive(Clone)]
pub struct SnapshotReader {
    rx: xch::Receiver<Arc<Snapshot>>,
    last: Option<Arc<Snapshot>>,
}

pub fn snapshot_channel() -> (SnapshotPublisher, SnapshotReader) {
    let (tx, rx) = xch::bounded(1);
    (
        SnapshotPublisher { tx, rx: rx.clone() },
        SnapshotReader { rx, last: None },
    )
}

impl SnapshotPublisher {
    pub fn publish(&self, snap: Snapshot) {
        let snap = Arc::new(snap);
        if let Err(xch::TrySendError::Full(snap)) = self.tx.try_send(snap) {
            let _ = self.rx.try_recv();
            let _ = self.tx.try_send(snap);
        }
    }
}

impl SnapshotReader {
    /// Newest snapshot published so far, if any.
    pub fn latest(&mut self) -> Option<Arc<Snapshot>> {
        if let Some(s) = self.rx.try_iter().last() {
            self.last = Some(s);
        }
        self.last.clone()
    }
}
