//! The automation tick.
//!
//! One `Engine` owns every vessel, the hardware bridge and the log sinks.
//! Each tick runs to completion in this order: queued commands, flow
//! sampling, then per vessel setpoint calendar, dosing window, temperature,
//! relay/pump actuation and log rows. Renderers only see published
//! snapshots.
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveDateTime};
use ferment_config::Config;
use ferment_hardware::{BridgeConfig, HardwareBridge};
use ferment_traits::{AnalogAddr, Clock};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::command::{Command, CommandReceiver, CommandSender, command_channel};
use crate::dosing::PumpEdge;
use crate::flow::{FlowRing, FlowSample};
use crate::hw_error::map_hw_error;
use crate::linearize::Linearizer;
use crate::logger::{BACKUP_COLUMNS, CsvSink, LogSession, Schema, flow_record};
use crate::plant::ThermalPlant;
use crate::scheduler::SampleSchedule;
use crate::snapshot::{Snapshot, SnapshotPublisher, SnapshotReader, snapshot_channel};
use crate::thermal::ThermalOutput;
use crate::vessel::{FlowChannel, Vessel, VesselPins};

/// Bridge settings derived from the process configuration.
pub fn bridge_config(cfg: &Config) -> BridgeConfig {
    BridgeConfig {
        force_sim: cfg.simulation.force,
        seed: cfg.simulation.seed,
        sim_probes: cfg.vessels.len(),
        read_timeout: Duration::from_millis(cfg.hardware.sensor_read_timeout_ms),
        fallback_c: cfg.control.temperature_fallback_c,
        w1_root: cfg.hardware.w1_root.clone(),
        i2c_bus: cfg.bus.i2c_bus,
        shunt_ohms: cfg.flow.shunt_ohms,
        min_flow: cfg.flow.min_sccm,
        max_flow: cfg.flow.max_sccm,
    }
}

pub struct Engine<C: Clock> {
    clock: C,
    bridge: HardwareBridge,
    vessels: Vec<Vessel>,
    linearizer: Linearizer,
    backup: CsvSink,
    commands: CommandReceiver,
    snapshots: SnapshotPublisher,
    rng: StdRng,
    plot_window: Option<f64>,
    tick_period: Duration,
    tick_count: u64,
    last_rejection: Option<String>,
    last_log_error: Option<String>,
    shut_down: bool,
}

impl<C: Clock> Engine<C> {
    /// Build the vessels and bind their actuators and flow channels.
    pub fn new(cfg: &Config, mut bridge: HardwareBridge, clock: C) -> (Self, CommandSender, SnapshotReader) {
        let now = clock.now();
        let mut rng = match cfg.simulation.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let use_plant = cfg.simulation.thermal_plant && bridge.temperature_simulated();
        let mut vessels = Vec::with_capacity(cfg.vessels.len());
        for (i, vcfg) in cfg.vessels.iter().enumerate() {
            let mut v = Vessel::new(i, vcfg, cfg, now);
            let pins = v.pins();
            bridge.setup_relay(pins.relay_cold);
            bridge.setup_relay(pins.relay_hot);
            bridge.setup_pump(v.name(), pins.pump_pul, pins.pump_dir);

            if let Some(fa) = cfg.flow_addr(i) {
                let addr = AnalogAddr {
                    address: fa.address,
                    channel: fa.channel,
                    gain: fa.gain,
                };
                let index = bridge.add_flow_channel(v.name(), addr, now);
                let period = cfg.flow.period_s(bridge.flow_channel_simulated(index));
                v.flow = Some(FlowChannel {
                    index,
                    schedule: SampleSchedule::new(Duration::from_secs(period)),
                    ring: FlowRing::new(cfg.flow.retention_hours),
                    last_error: None,
                    log: LogSession::new(Vessel::flow_log_sink(&cfg.paths.process_dir, v.name())),
                });
            }
            if use_plant {
                let plant = ThermalPlant::randomized(&mut rng);
                v.temperature = plant.temperature();
                v.plant = Some(plant);
            }
            vessels.push(v);
        }
        info!(
            vessels = vessels.len(),
            plant = use_plant,
            simulated = bridge.status().any_simulated(),
            "engine ready"
        );

        let (cmd_tx, cmd_rx) = command_channel();
        let (snap_tx, snap_rx) = snapshot_channel();
        let engine = Self {
            clock,
            bridge,
            vessels,
            linearizer: Linearizer::from_config(cfg),
            backup: CsvSink::new(cfg.paths.backup_file.clone(), BACKUP_COLUMNS, Schema::Lenient),
            commands: cmd_rx,
            snapshots: snap_tx,
            rng,
            plot_window: cfg.flow.plot_window_hours.filter(|h| *h > 0.0),
            tick_period: Duration::from_millis(cfg.control.tick_ms.max(1)),
            tick_count: 0,
            last_rejection: None,
            last_log_error: None,
            shut_down: false,
        };
        (engine, cmd_tx, snap_rx)
    }

    pub fn vessels(&self) -> &[Vessel] {
        &self.vessels
    }

    pub fn vessel(&self, name: &str) -> Option<&Vessel> {
        self.vessels.iter().find(|v| v.name() == name)
    }

    pub fn bridge(&self) -> &HardwareBridge {
        &self.bridge
    }

    pub fn ticks(&self) -> u64 {
        self.tick_count
    }

    pub fn tick_period(&self) -> Duration {
        self.tick_period
    }

    /// Run one automation tick.
    pub fn tick(&mut self) {
        if self.shut_down {
            return;
        }
        let now = self.clock.now();
        let ts = self.clock.local_now();
        self.apply_commands(ts.date());
        self.sample_flows(now, ts);
        for i in 0..self.vessels.len() {
            self.step_vessel(i, now, ts);
        }
        self.tick_count += 1;
        self.publish(now, ts);
    }

    fn apply_commands(&mut self, today: NaiveDate) {
        for cmd in self.commands.drain() {
            match cmd {
                Command::StopAll => {
                    warn!("global stop-all");
                    for v in &mut self.vessels {
                        v.stop_all();
                    }
                }
                Command::Vessel { vessel, cmd } => {
                    let result = match self.vessels.iter_mut().find(|v| v.name() == vessel) {
                        Some(v) => v.apply(cmd, today).map_err(|e| e.to_string()),
                        None => Err("unknown vessel".to_owned()),
                    };
                    if let Err(reason) = result {
                        warn!(vessel = %vessel, reason = %reason, "command rejected");
                        self.last_rejection = Some(format!("{vessel}: {reason}"));
                    }
                }
            }
        }
    }

    fn sample_flows(&mut self, now: Instant, ts: NaiveDateTime) {
        let Self {
            vessels,
            bridge,
            linearizer,
            last_log_error,
            ..
        } = self;
        for v in vessels.iter_mut() {
            let name = v.name().to_owned();
            let Some(ch) = v.flow.as_mut() else { continue };
            if !ch.schedule.is_due(now) {
                continue;
            }
            ch.schedule.mark_attempt(now);
            match bridge.read_flow_voltage(ch.index, now) {
                Ok(volts) => {
                    let sample = FlowSample::from_reading(ts, &linearizer.reading(volts));
                    debug!(vessel = %name, flow = sample.flow, status = %sample.status, "flow sample");
                    ch.ring.push(sample);
                    if ch.last_error.take().is_some() {
                        info!(vessel = %name, "flow channel recovered");
                    }
                    if let Err(e) = ch.log.record(&flow_record(&name, &sample)) {
                        note_log_error(last_log_error, &e.to_string());
                    }
                }
                Err(e) => {
                    let msg = map_hw_error(&e).to_string();
                    if ch.last_error.as_deref() != Some(msg.as_str()) {
                        warn!(vessel = %name, error = %msg, "flow read failed");
                    }
                    ch.last_error = Some(msg);
                }
            }
        }
    }

    fn step_vessel(&mut self, i: usize, now: Instant, ts: NaiveDateTime) {
        let Self {
            vessels,
            bridge,
            backup,
            rng,
            last_log_error,
            ..
        } = self;
        let Some(v) = vessels.get_mut(i) else { return };

        v.follow_setpoint_calendar(ts);
        v.fire_dosing(ts, now);
        match v.pump_edge(now) {
            Some(PumpEdge::Start) => {
                bridge.start_pump(v.name(), v.pump_frequency());
            }
            Some(PumpEdge::Stop) => {
                bridge.stop_pump(v.name());
            }
            None => {}
        }

        let dt = now.saturating_duration_since(v.last_tick).as_secs_f64();
        v.last_tick = now;
        let (setpoint, output) = (v.setpoint(), v.output());
        v.temperature = match v.plant.as_mut() {
            Some(plant) => plant.step(dt, setpoint, output, rng),
            None => f64::from(bridge.read_temperature(v.probe_index())),
        };

        if let Some(out) = v.control() {
            apply_relays(bridge, v.pins(), out);
            v.mark_applied(out);
        }

        let rec = v.instrument_record(ts);
        if let Err(e) = v.instrument_log().record(&rec) {
            note_log_error(last_log_error, &e.to_string());
        }
        if let Err(e) = backup.append(&rec) {
            note_log_error(last_log_error, &e.to_string());
        }
    }

    fn publish(&mut self, now: Instant, ts: NaiveDateTime) {
        let vessels = self
            .vessels
            .iter()
            .map(|v| v.snapshot(now, self.plot_window))
            .collect();
        self.snapshots.publish(Snapshot {
            taken_at: ts,
            tick: self.tick_count,
            vessels,
            hardware: self.bridge.status(),
            last_rejection: self.last_rejection.clone(),
            last_log_error: self.last_log_error.clone(),
        });
    }

    /// Tick at a fixed cadence until `stop` is raised or `max_ticks` ran.
    ///
    /// Deadlines advance by whole periods from the start, so a slow tick does
    /// not shift later ones; ticks missed entirely are skipped. The shutdown
    /// sequence has completed when this returns.
    pub fn run(&mut self, stop: &AtomicBool, max_ticks: Option<u64>) -> u64 {
        let mut ran = 0u64;
        let mut next = self.clock.now();
        while !stop.load(Ordering::SeqCst) && max_ticks.is_none_or(|n| ran < n) {
            let now = self.clock.now();
            if now < next {
                self.clock.sleep(next - now);
                continue;
            }
            self.tick();
            ran += 1;
            next += self.tick_period;
            let after = self.clock.now();
            if after > next {
                let behind = after.duration_since(next);
                let skipped = behind.as_nanos() / self.tick_period.as_nanos().max(1);
                if skipped > 0 {
                    warn!(skipped = %skipped, "tick overran; skipping missed ticks");
                    next += self.tick_period * u32::try_from(skipped).unwrap_or(u32::MAX);
                }
            }
        }
        self.shutdown();
        ran
    }

    /// Close every relay, stop every pump, then release the hardware.
    ///
    /// Best effort and idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        for v in &mut self.vessels {
            let pins = v.pins();
            bridge_off(&mut self.bridge, pins);
            self.bridge.stop_pump(v.name());
            v.mark_released();
        }
        self.bridge.release_all();
        info!(ticks = self.tick_count, "engine shut down");
    }
}

impl<C: Clock> Drop for Engine<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Write a thermal output to the relays, opening before closing.
fn apply_relays(bridge: &mut HardwareBridge, pins: VesselPins, out: ThermalOutput) {
    match out {
        ThermalOutput::Rest => bridge_off(bridge, pins),
        ThermalOutput::Cold => {
            bridge.set_relay(pins.relay_hot, false);
            bridge.set_relay(pins.relay_cold, true);
        }
        ThermalOutput::Hot => {
            bridge.set_relay(pins.relay_cold, false);
            bridge.set_relay(pins.relay_hot, true);
        }
    }
}

fn bridge_off(bridge: &mut HardwareBridge, pins: VesselPins) {
    bridge.set_relay(pins.relay_cold, false);
    bridge.set_relay(pins.relay_hot, false);
}

fn note_log_error(slot: &mut Option<String>, msg: &str) {
    if slot.as_deref() != Some(msg) {
        warn!(error = %msg, "log write failed");
        *slot = Some(msg.to_owned());
    }
}
