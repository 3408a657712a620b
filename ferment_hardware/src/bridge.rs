//! Hardware/simulation bridge.
//!
//! Three independent domains: temperature probes, actuators (relays and
//! pumps) and the analog flow channels. Each is bound to real hardware at
//! startup or runs simulated for a recorded reason. A fault in one domain
//! never changes the others.
//!
//! The analog bus is shared by all flow channels. It is opened lazily the
//! first time a channel binds to real hardware and released exactly once,
//! by [`HardwareBridge::release_all`] or on drop.
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use ferment_traits::{ActuatorBus, AnalogAddr, AnalogBus, BoxError, TemperatureBus};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backend::{Backend, DomainMode, SimReason};
use crate::error::HwError;
use crate::sim::{FlowCurve, SimTemperature};

pub type AnalogOpener = Box<dyn FnMut() -> Result<Box<dyn AnalogBus>, BoxError>>;

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Simulate every domain regardless of what hardware is present.
    pub force_sim: bool,
    pub seed: Option<u64>,
    /// Number of temperature probes to simulate.
    pub sim_probes: usize,
    pub read_timeout: Duration,
    /// Returned by a real temperature read that fails.
    pub fallback_c: f32,
    pub w1_root: PathBuf,
    pub i2c_bus: u8,
    pub shunt_ohms: f64,
    pub min_flow: f64,
    pub max_flow: f64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            force_sim: false,
            seed: None,
            sim_probes: 3,
            read_timeout: Duration::from_millis(150),
            fallback_c: 20.0,
            w1_root: PathBuf::from("/sys/bus/w1/devices"),
            i2c_bus: 1,
            shunt_ohms: 147.0,
            min_flow: 0.0,
            max_flow: 50.0,
        }
    }
}

enum AnalogSlot {
    Closed(AnalogOpener),
    Open(Box<dyn AnalogBus>),
    Failed(String),
    Released,
}

struct FlowChannel {
    name: String,
    addr: AnalogAddr,
    backend: Backend<()>,
    curve: FlowCurve,
    started: Instant,
}

/// Serializable status of one flow channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowChannelStatus {
    pub name: String,
    pub address: u16,
    pub channel: u8,
    pub gain: u8,
    #[serde(flatten)]
    pub mode: DomainMode,
}

/// Per-domain binding state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HardwareStatus {
    pub temperature: DomainMode,
    pub actuators: DomainMode,
    pub flow: Vec<FlowChannelStatus>,
    pub probes: Vec<String>,
}

impl HardwareStatus {
    pub fn any_simulated(&self) -> bool {
        self.temperature.is_simulated()
            || self.actuators.is_simulated()
            || self.flow.iter().any(|f| f.mode.is_simulated())
    }
}

pub struct HardwareBridge {
    cfg: BridgeConfig,
    temperature: Backend<Box<dyn TemperatureBus>>,
    sim_temperature: SimTemperature,
    /// Probes whose last read failed and already logged a warning.
    temp_warned: HashSet<usize>,
    actuators: Backend<Box<dyn ActuatorBus>>,
    analog: AnalogSlot,
    flow: Vec<FlowChannel>,
    rng: StdRng,
}

impl HardwareBridge {
    /// Bind every domain to the platform drivers, falling back to simulation per domain.
    pub fn init(cfg: BridgeConfig) -> Self {
        if cfg.force_sim {
            info!("simulation forced; hardware domains not probed");
            return Self::from_parts(
                cfg,
                Backend::Simulated(SimReason::Forced),
                Backend::Simulated(SimReason::Forced),
                None,
            );
        }
        let temperature = match crate::w1::W1Probes::open(&cfg.w1_root) {
            Ok(p) => Backend::Real(Box::new(p) as Box<dyn TemperatureBus>),
            Err(e) => Backend::Simulated(SimReason::Fallback(e.to_string())),
        };
        let actuators = open_actuators();
        let opener = analog_opener(cfg.i2c_bus);
        Self::from_parts(cfg, temperature, actuators, Some(opener))
    }

    /// Assemble a bridge from already-bound backends.
    ///
    /// `analog` is `None` when flow channels must always be simulated.
    pub fn from_parts(
        cfg: BridgeConfig,
        temperature: Backend<Box<dyn TemperatureBus>>,
        actuators: Backend<Box<dyn ActuatorBus>>,
        analog: Option<AnalogOpener>,
    ) -> Self {
        let rng = match cfg.seed {
            Some(s) => StdRng::seed_from_u64(s.wrapping_add(1)),
            None => StdRng::from_entropy(),
        };
        let analog = match analog {
            Some(open) => AnalogSlot::Closed(open),
            None => AnalogSlot::Failed("no analog bus configured".into()),
        };
        for (domain, mode) in [("temperature", temperature.mode()), ("actuators", actuators.mode())] {
            match &mode {
                DomainMode::Real => info!(domain, "hardware bound"),
                DomainMode::Simulated { reason } => warn!(domain, %reason, "running simulated"),
            }
        }
        Self {
            sim_temperature: SimTemperature::new(cfg.sim_probes, cfg.seed),
            cfg,
            temperature,
            temp_warned: HashSet::new(),
            actuators,
            analog,
            flow: Vec::new(),
            rng,
        }
    }

    fn acquire_bus(&mut self) -> Result<&mut Box<dyn AnalogBus>, String> {
        if let AnalogSlot::Closed(open) = &mut self.analog {
            self.analog = match open() {
                Ok(bus) => {
                    debug!("analog bus acquired");
                    AnalogSlot::Open(bus)
                }
                Err(e) => AnalogSlot::Failed(e.to_string()),
            };
        }
        match &mut self.analog {
            AnalogSlot::Open(bus) => Ok(bus),
            AnalogSlot::Failed(cause) => Err(cause.clone()),
            AnalogSlot::Released => Err(HwError::Released.to_string()),
            AnalogSlot::Closed(_) => Err("analog bus not opened".into()),
        }
    }

    /// Register a flow channel and bind it; returns its index.
    pub fn add_flow_channel(&mut self, name: &str, addr: AnalogAddr, now: Instant) -> usize {
        let backend = if self.cfg.force_sim {
            Backend::Simulated(SimReason::Forced)
        } else {
            match self.acquire_bus().and_then(|bus| bus.probe(addr).map_err(|e| e.to_string())) {
                Ok(()) => Backend::Real(()),
                Err(cause) => Backend::Simulated(SimReason::Fallback(cause)),
            }
        };
        match &backend {
            Backend::Real(()) => info!(channel = name, address = addr.address, ch = addr.channel, "flow channel bound"),
            Backend::Simulated(reason) => warn!(channel = name, %reason, "flow channel simulated"),
        }
        self.flow.push(FlowChannel {
            name: name.to_owned(),
            addr,
            backend,
            curve: FlowCurve::new(self.cfg.min_flow, self.cfg.max_flow, self.cfg.shunt_ohms),
            started: now,
        });
        self.flow.len() - 1
    }

    pub fn flow_channel_simulated(&self, index: usize) -> bool {
        self.flow.get(index).is_none_or(|c| c.backend.is_simulated())
    }

    /// Shunt voltage of flow channel `index`.
    ///
    /// A failed real read is returned as an error and the channel stays bound;
    /// the caller retries at its normal cadence.
    pub fn read_flow_voltage(&mut self, index: usize, now: Instant) -> Result<f64, HwError> {
        let timeout = self.cfg.read_timeout;
        let ch = self
            .flow
            .get(index)
            .ok_or_else(|| HwError::NoDevice(format!("flow channel {index}")))?;
        if ch.backend.is_simulated() {
            let hours = now.saturating_duration_since(ch.started).as_secs_f64() / 3600.0;
            let curve = ch.curve.clone();
            return Ok(curve.voltage(hours, &mut self.rng));
        }
        let addr = ch.addr;
        let bus = self.acquire_bus().map_err(HwError::I2c)?;
        bus.read_voltage(addr, timeout)
            .map(f64::from)
            .map_err(|e| HwError::I2c(e.to_string()))
    }

    pub fn temperature_simulated(&self) -> bool {
        self.temperature.is_simulated()
    }

    /// Temperature of probe `index` in °C.
    ///
    /// A real read failure yields the configured fallback value. The warning
    /// is logged once per probe and re-armed by that probe's next successful
    /// read.
    pub fn read_temperature(&mut self, index: usize) -> f32 {
        let timeout = self.cfg.read_timeout;
        match &mut self.temperature {
            Backend::Simulated(_) => self.sim_temperature.read(index),
            Backend::Real(bus) => match bus.read_celsius(index, timeout) {
                Ok(t) => {
                    if self.temp_warned.remove(&index) {
                        info!(probe = index, "temperature probe recovered");
                    }
                    t
                }
                Err(e) => {
                    if self.temp_warned.insert(index) {
                        warn!(probe = index, error = %e, fallback = self.cfg.fallback_c, "temperature read failed");
                    }
                    self.cfg.fallback_c
                }
            },
        }
    }

    pub fn actuators_simulated(&self) -> bool {
        self.actuators.is_simulated()
    }

    fn actuate(&mut self, op: &str, f: impl FnOnce(&mut dyn ActuatorBus) -> Result<(), BoxError>) -> bool {
        let Backend::Real(bus) = &mut self.actuators else {
            return true;
        };
        match f(bus.as_mut()) {
            Ok(()) => true,
            Err(e) => {
                if let Err(re) = bus.release() {
                    debug!(error = %re, "actuator release after fault failed");
                }
                warn!(op, error = %e, "actuator fault; actuators now simulated");
                self.actuators = Backend::Simulated(SimReason::Fallback(e.to_string()));
                false
            }
        }
    }

    pub fn setup_relay(&mut self, pin: u8) -> bool {
        self.actuate("setup_relay", |b| b.setup_relay(pin))
    }

    pub fn set_relay(&mut self, pin: u8, on: bool) -> bool {
        self.actuate("set_relay", |b| b.set_relay(pin, on))
    }

    pub fn setup_pump(&mut self, name: &str, pul_pin: u8, dir_pin: u8) -> bool {
        self.actuate("setup_pump", |b| b.setup_pump(name, pul_pin, dir_pin))
    }

    pub fn start_pump(&mut self, name: &str, frequency_hz: f32) -> bool {
        self.actuate("start_pump", |b| b.start_pump(name, frequency_hz))
    }

    pub fn stop_pump(&mut self, name: &str) -> bool {
        self.actuate("stop_pump", |b| b.stop_pump(name))
    }

    pub fn status(&self) -> HardwareStatus {
        let probes = match &self.temperature {
            Backend::Real(bus) => bus.probe_labels(),
            Backend::Simulated(_) => Vec::new(),
        };
        HardwareStatus {
            temperature: self.temperature.mode(),
            actuators: self.actuators.mode(),
            flow: self
                .flow
                .iter()
                .map(|c| FlowChannelStatus {
                    name: c.name.clone(),
                    address: c.addr.address,
                    channel: c.addr.channel,
                    gain: c.addr.gain,
                    mode: c.backend.mode(),
                })
                .collect(),
            probes,
        }
    }

    /// Release the actuator drivers and the shared analog bus.
    ///
    /// Best effort and idempotent: the bus is released at most once and
    /// failures are only logged.
    pub fn release_all(&mut self) {
        if let Backend::Real(bus) = &mut self.actuators {
            if let Err(e) = bus.release() {
                warn!(error = %e, "actuator release failed");
            }
            self.actuators = Backend::Simulated(SimReason::Released);
        }
        match std::mem::replace(&mut self.analog, AnalogSlot::Released) {
            AnalogSlot::Open(mut bus) => match bus.release() {
                Ok(()) => info!("analog bus released"),
                Err(e) => warn!(error = %e, "analog bus release failed"),
            },
            AnalogSlot::Closed(_) | AnalogSlot::Failed(_) | AnalogSlot::Released => {}
        }
    }
}

impl Drop for HardwareBridge {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn open_actuators() -> Backend<Box<dyn ActuatorBus>> {
    match crate::gpio::GpioActuators::open() {
        Ok(g) => Backend::Real(Box::new(g) as Box<dyn ActuatorBus>),
        Err(e) => Backend::Simulated(SimReason::Fallback(e.to_string())),
    }
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn open_actuators() -> Backend<Box<dyn ActuatorBus>> {
    Backend::Simulated(SimReason::Fallback(
        "gpio support not compiled in (enable the `hardware` feature)".into(),
    ))
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn analog_opener(bus: u8) -> AnalogOpener {
    Box::new(move || -> Result<Box<dyn AnalogBus>, BoxError> {
        let b = crate::ads1115::Ads1115Bus::open(bus)?;
        Ok(Box::new(b) as Box<dyn AnalogBus>)
    })
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn analog_opener(_bus: u8) -> AnalogOpener {
    Box::new(|| -> Result<Box<dyn AnalogBus>, BoxError> {
        Err("i2c support not compiled in (enable the `hardware` feature)".into())
    })
}
