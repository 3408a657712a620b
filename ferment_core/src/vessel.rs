//! Per-vessel automation state.
use std::path::Path;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveDateTime};
use ferment_config::{Config, VesselCfg};
use tracing::info;

use crate::calendar::{DaySchedule, MinuteGate};
use crate::command::{CalendarKind, LogAction, LogTarget, PumpCommand, VesselCommand};
use crate::dosing::{DosingController, PumpEdge};
use crate::error::ControlError;
use crate::flow::FlowRing;
use crate::logger::{CsvSink, FLOW_COLUMNS, INSTRUMENT_COLUMNS, InstrumentRow, LogRecord, LogSession, Schema};
use crate::plant::ThermalPlant;
use crate::scheduler::SampleSchedule;
use crate::snapshot::VesselSnapshot;
use crate::thermal::{ThermalController, ThermalOutput};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VesselPins {
    pub relay_cold: u8,
    pub relay_hot: u8,
    pub pump_pul: u8,
    pub pump_dir: u8,
}

/// Flow channel bookkeeping owned by its vessel.
#[derive(Debug)]
pub struct FlowChannel {
    /// Index in the hardware bridge.
    pub index: usize,
    pub schedule: SampleSchedule,
    pub ring: FlowRing,
    pub last_error: Option<String>,
    pub log: LogSession,
}

#[derive(Debug)]
pub struct Vessel {
    name: String,
    pins: VesselPins,
    probe_index: usize,
    pub(crate) temperature: f64,
    setpoint: f64,
    band: f64,
    pump_frequency: f32,
    thermal: ThermalController,
    dosing: DosingController,
    cal_setpoint: DaySchedule<f64>,
    cal_dosing: DaySchedule<f64>,
    minute_gate: MinuteGate,
    /// Relay state last written to hardware; `None` forces a write.
    applied: Option<ThermalOutput>,
    restart_pump: bool,
    pub(crate) last_tick: Instant,
    pub(crate) plant: Option<ThermalPlant>,
    instrument_log: LogSession,
    pub(crate) flow: Option<FlowChannel>,
}

impl Vessel {
    pub fn new(index: usize, vcfg: &VesselCfg, cfg: &Config, now: Instant) -> Self {
        let dir = &cfg.paths.process_dir;
        Self {
            name: vcfg.name.clone(),
            pins: VesselPins {
                relay_cold: vcfg.relay_cold,
                relay_hot: vcfg.relay_hot,
                pump_pul: vcfg.pump_pul,
                pump_dir: vcfg.pump_dir,
            },
            probe_index: vcfg.probe_index.unwrap_or(index),
            temperature: f64::from(cfg.control.temperature_fallback_c),
            setpoint: f64::from(cfg.control.default_setpoint_c),
            band: f64::from(cfg.control.default_band_c),
            pump_frequency: cfg.control.pump_frequency_hz,
            thermal: ThermalController::new(f64::from(cfg.control.band_floor_c)),
            dosing: DosingController::new(),
            cal_setpoint: DaySchedule::new(),
            cal_dosing: DaySchedule::new(),
            minute_gate: MinuteGate::default(),
            applied: None,
            restart_pump: false,
            last_tick: now,
            plant: None,
            instrument_log: LogSession::new(CsvSink::new(
                dir.join(format!("{}.csv", vcfg.name)),
                INSTRUMENT_COLUMNS,
                Schema::Strict,
            )),
            flow: None,
        }
    }

    pub fn flow_log_sink(dir: &Path, name: &str) -> CsvSink {
        CsvSink::new(dir.join(format!("{name}_co2.csv")), FLOW_COLUMNS, Schema::Strict)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pins(&self) -> VesselPins {
        self.pins
    }

    pub fn probe_index(&self) -> usize {
        self.probe_index
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    pub fn band(&self) -> f64 {
        self.band
    }

    pub fn output(&self) -> ThermalOutput {
        self.thermal.output()
    }

    pub fn is_manual(&self) -> bool {
        self.thermal.is_manual()
    }

    pub fn pump_frequency(&self) -> f32 {
        self.pump_frequency
    }

    pub fn pump_running(&self) -> bool {
        self.dosing.running()
    }

    pub fn calendar(&self, kind: CalendarKind) -> &DaySchedule<f64> {
        match kind {
            CalendarKind::Setpoint => &self.cal_setpoint,
            CalendarKind::Dosing => &self.cal_dosing,
        }
    }

    fn calendar_mut(&mut self, kind: CalendarKind) -> &mut DaySchedule<f64> {
        match kind {
            CalendarKind::Setpoint => &mut self.cal_setpoint,
            CalendarKind::Dosing => &mut self.cal_dosing,
        }
    }

    /// Apply an operator command. Relay and pump effects land in the same tick.
    pub fn apply(&mut self, cmd: VesselCommand, today: NaiveDate) -> Result<(), ControlError> {
        let rejected = |e: &dyn std::fmt::Display| ControlError::Rejected(e.to_string());
        match cmd {
            VesselCommand::SetManual(on) => self.thermal.set_manual(on),
            VesselCommand::Force(mode) => {
                self.thermal.force(mode)?;
            }
            VesselCommand::Pump(PumpCommand::On) => self.dosing.set_manual(true),
            VesselCommand::Pump(PumpCommand::Off) => self.dosing.set_manual(false),
            VesselCommand::Pump(PumpCommand::Toggle) => {
                self.dosing.toggle_manual();
            }
            VesselCommand::SetSetpoint(sp) if sp.is_finite() => self.setpoint = sp,
            VesselCommand::SetBand(b) if b.is_finite() && b >= 0.0 => self.band = b,
            VesselCommand::SetPumpFrequency(hz) if hz.is_finite() && hz > 0.0 => {
                self.restart_pump = self.pump_frequency != hz && self.dosing.running();
                self.pump_frequency = hz;
            }
            VesselCommand::SetSetpoint(_) | VesselCommand::SetBand(_) | VesselCommand::SetPumpFrequency(_) => {
                return Err(ControlError::Rejected("value out of range".into()));
            }
            VesselCommand::ReplaceCalendar(kind, cal) => *self.calendar_mut(kind) = cal,
            VesselCommand::AddEvent {
                kind,
                date,
                time,
                value,
            } => self
                .calendar_mut(kind)
                .add_event(date, &time, value, today)
                .map_err(|e| rejected(&e))?,
            VesselCommand::EditEvent {
                kind,
                date,
                index,
                time,
                value,
            } => self
                .calendar_mut(kind)
                .edit_event(date, index, &time, value, today)
                .map_err(|e| rejected(&e))?,
            VesselCommand::DeleteEvent { kind, date, index } => {
                self.calendar_mut(kind)
                    .delete_event(date, index)
                    .map_err(|e| rejected(&e))?;
            }
            VesselCommand::ClearDay { kind, date } => {
                let removed = self.calendar_mut(kind).clear_day(date);
                info!(vessel = %self.name, %date, removed, "calendar day cleared");
            }
            VesselCommand::Log(target, action) => {
                let session = match target {
                    LogTarget::Instrument => &mut self.instrument_log,
                    LogTarget::Flow => match self.flow.as_mut() {
                        Some(f) => &mut f.log,
                        None => return Err(ControlError::Rejected("vessel has no flow channel".into())),
                    },
                };
                match action {
                    LogAction::Start => session.start(),
                    LogAction::Pause => session.pause(),
                    LogAction::Restart => session.restart().map_err(|e| rejected(&e))?,
                    LogAction::Export(dir) => {
                        session.export(&dir).map_err(|e| match e.downcast_ref::<ControlError>() {
                            Some(c) => c.clone(),
                            None => rejected(&e),
                        })?;
                    }
                }
            }
            VesselCommand::StopAll => self.stop_all(),
        }
        Ok(())
    }

    /// Close both relays, drop every pump request and freeze automatic control.
    pub fn stop_all(&mut self) {
        self.thermal.stop_all();
        self.dosing.stop_all();
        info!(vessel = %self.name, "stop-all");
    }

    /// Follow the setpoint calendar unless in manual mode.
    pub fn follow_setpoint_calendar(&mut self, ts: NaiveDateTime) {
        if self.thermal.is_manual() {
            return;
        }
        if let Some(sp) = self.cal_setpoint.lookup(ts) {
            self.setpoint = sp;
        }
    }

    /// Fire dosing events for a new minute; returns the opened window.
    pub fn fire_dosing(&mut self, ts: NaiveDateTime, now: Instant) -> Option<Duration> {
        if !self.minute_gate.enter(ts) {
            return None;
        }
        let doses = self.cal_dosing.fire_at_minute(ts);
        if doses.is_empty() {
            return None;
        }
        let window = self.dosing.fire(&doses, now);
        if let Some(w) = window {
            info!(vessel = %self.name, seconds = w.as_secs_f64(), "scheduled dose");
        }
        window
    }

    /// Pump transition to apply this tick, including a restart after a frequency change.
    pub fn pump_edge(&mut self, now: Instant) -> Option<PumpEdge> {
        let edge = self.dosing.update(now);
        if edge.is_none() && std::mem::take(&mut self.restart_pump) && self.dosing.running() {
            return Some(PumpEdge::Start);
        }
        self.restart_pump = false;
        edge
    }

    /// Run the thermal step; returns the output if the relays must be rewritten.
    pub fn control(&mut self) -> Option<ThermalOutput> {
        let out = self.thermal.step(self.temperature, self.setpoint, self.band);
        (self.applied != Some(out)).then_some(out)
    }

    pub(crate) fn mark_applied(&mut self, out: ThermalOutput) {
        self.applied = Some(out);
    }

    pub(crate) fn mark_released(&mut self) {
        self.applied = None;
        self.dosing.mark_stopped();
    }

    pub fn instrument_record(&self, ts: NaiveDateTime) -> LogRecord {
        let out = self.thermal.output();
        InstrumentRow {
            timestamp: ts,
            vessel: &self.name,
            temperature: self.temperature,
            setpoint: self.setpoint,
            band: self.thermal.effective_band(self.band),
            cold: out.cold_on(),
            hot: out.hot_on(),
            dosing: self.dosing.running(),
            frequency: self.pump_frequency,
        }
        .to_record()
    }

    pub(crate) fn instrument_log(&self) -> &LogSession {
        &self.instrument_log
    }

    pub fn snapshot(&self, now: Instant, plot_window_hours: Option<f64>) -> VesselSnapshot {
        VesselSnapshot {
            name: self.name.clone(),
            temperature: self.temperature,
            setpoint: self.setpoint,
            band: self.band,
            output: self.thermal.output(),
            manual: self.thermal.is_manual(),
            pump_running: self.dosing.running(),
            manual_pump: self.dosing.manual_on(),
            dosing_remaining_s: self.dosing.remaining(now).as_secs_f64(),
            pump_frequency_hz: self.pump_frequency,
            flow: self.flow.as_ref().and_then(|f| f.ring.last().copied()),
            flow_stats: self.flow.as_ref().and_then(|f| f.ring.stats(plot_window_hours)),
            flow_error: self.flow.as_ref().and_then(|f| f.last_error.clone()),
            flow_period_s: self
                .flow
                .as_ref()
                .map_or(0.0, |f| f.schedule.period().as_secs_f64()),
            flow_due_in_s: self
                .flow
                .as_ref()
                .map_or(0.0, |f| f.schedule.wait(now).as_secs_f64()),
            instrument_log: self.instrument_log.state(),
            flow_log: self
                .flow
                .as_ref()
                .map_or(crate::logger::LogState::Stopped, |f| f.log.state()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thermal::ForceMode;

    fn vessel() -> Vessel {
        let cfg = Config::default();
        Vessel::new(0, &cfg.vessels[0], &cfg, Instant::now())
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 10).unwrap()
    }

    #[test]
    fn force_without_manual_is_rejected() {
        let mut v = vessel();
        assert_eq!(
            v.apply(VesselCommand::Force(ForceMode::Cold), today()),
            Err(ControlError::NotManual)
        );
        v.apply(VesselCommand::SetManual(true), today()).unwrap();
        v.apply(VesselCommand::Force(ForceMode::Cold), today()).unwrap();
        assert_eq!(v.output(), ThermalOutput::Cold);
    }

    #[test]
    fn calendar_setpoint_ignored_in_manual() {
        let mut v = vessel();
        v.apply(
            VesselCommand::AddEvent {
                kind: CalendarKind::Setpoint,
                date: today(),
                time: "06:00".into(),
                value: 18.0,
            },
            today(),
        )
        .unwrap();
        let ts = today().and_hms_opt(7, 0, 0).unwrap();
        v.apply(VesselCommand::SetManual(true), today()).unwrap();
        v.follow_setpoint_calendar(ts);
        assert_eq!(v.setpoint(), 20.0);
        v.apply(VesselCommand::SetManual(false), today()).unwrap();
        v.follow_setpoint_calendar(ts);
        assert_eq!(v.setpoint(), 18.0);
    }

    #[test]
    fn dosing_fires_once_per_minute() {
        let mut v = vessel();
        let mut cal = DaySchedule::new();
        cal.insert(today(), "09:00".parse().unwrap(), 30.0);
        v.apply(VesselCommand::ReplaceCalendar(CalendarKind::Dosing, cal), today())
            .unwrap();
        let t0 = Instant::now();
        let ts = today().and_hms_opt(9, 0, 0).unwrap();
        assert!(v.fire_dosing(ts, t0).is_some());
        assert_eq!(v.pump_edge(t0), Some(PumpEdge::Start));
        let later = t0 + Duration::from_secs(30);
        assert!(v.fire_dosing(ts + chrono::TimeDelta::seconds(30), later).is_none());
        assert_eq!(v.pump_edge(later), Some(PumpEdge::Stop));
    }

    #[test]
    fn frequency_change_restarts_running_pump() {
        let mut v = vessel();
        let t0 = Instant::now();
        v.apply(VesselCommand::Pump(PumpCommand::On), today()).unwrap();
        assert_eq!(v.pump_edge(t0), Some(PumpEdge::Start));
        v.apply(VesselCommand::SetPumpFrequency(4000.0), today()).unwrap();
        assert_eq!(v.pump_edge(t0), Some(PumpEdge::Start));
        assert_eq!(v.pump_edge(t0), None);
        assert!(v.apply(VesselCommand::SetPumpFrequency(-1.0), today()).is_err());
    }

    #[test]
    fn calendar_edits_by_sorted_index() {
        let mut v = vessel();
        let day = today();
        for (t, sp) in [("14:00", 22.0), ("08:00", 18.0)] {
            v.apply(
                VesselCommand::AddEvent {
                    kind: CalendarKind::Setpoint,
                    date: day,
                    time: t.into(),
                    value: sp,
                },
                day,
            )
            .unwrap();
        }
        v.apply(
            VesselCommand::EditEvent {
                kind: CalendarKind::Setpoint,
                date: day,
                index: 0,
                time: "09:30".into(),
                value: 19.0,
            },
            day,
        )
        .unwrap();
        let cal = v.calendar(CalendarKind::Setpoint);
        assert_eq!(cal.events_on(day)[0].time.to_string(), "09:30");
        assert_eq!(cal.events_on(day)[0].value, 19.0);

        let err = v
            .apply(
                VesselCommand::DeleteEvent {
                    kind: CalendarKind::Setpoint,
                    date: day,
                    index: 5,
                },
                day,
            )
            .unwrap_err();
        assert!(matches!(err, ControlError::Rejected(_)));
        v.apply(
            VesselCommand::ClearDay {
                kind: CalendarKind::Setpoint,
                date: day,
            },
            day,
        )
        .unwrap();
        assert!(v.calendar(CalendarKind::Setpoint).is_empty());
        assert!(v.calendar(CalendarKind::Dosing).is_empty());
    }

    #[test]
    fn past_calendar_edit_is_rejected() {
        let mut v = vessel();
        let err = v
            .apply(
                VesselCommand::AddEvent {
                    kind: CalendarKind::Dosing,
                    date: today().pred_opt().unwrap(),
                    time: "06:00".into(),
                    value: 5.0,
                },
                today(),
            )
            .unwrap_err();
        assert!(err.to_string().contains("past date"));
    }
}
