#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the fermentation controller.
//!
//! - `Config` and sub-structs are deserialized from TOML; every section is
//!   optional and falls back to the documented defaults.
//! - Environment-style overrides (`SHUNT_OHMS`, `ADS1115_ADDR_F1`, ...) are
//!   applied on top of the file with [`Config::apply_env_with`].
//! - [`Config::validate`] rejects inconsistent settings before anything is
//!   bound to hardware.
use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Highest single-ended input on an ADS1115.
pub const MAX_ADC_CHANNEL: u8 = 3;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationCfg {
    /// Simulate every hardware domain without probing.
    pub force: bool,
    /// Drive simulated vessel temperatures with the first-order plant model.
    pub thermal_plant: bool,
    /// Seed for every simulation RNG; random when absent.
    pub seed: Option<u64>,
}

impl Default for SimulationCfg {
    fn default() -> Self {
        Self {
            force: false,
            thermal_plant: true,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FlowCfg {
    pub shunt_ohms: f64,
    pub min_sccm: f64,
    pub max_sccm: f64,
    /// Sample period in seconds; when absent 1 s for simulated channels, 10 s otherwise.
    pub sample_period_s: Option<u64>,
    /// Display window in hours; absent or 0 shows every retained sample.
    pub plot_window_hours: Option<f64>,
    pub retention_hours: f64,
}

impl Default for FlowCfg {
    fn default() -> Self {
        Self {
            shunt_ohms: 147.0,
            min_sccm: 0.0,
            max_sccm: 50.0,
            sample_period_s: None,
            plot_window_hours: None,
            retention_hours: 24.0 * 21.0,
        }
    }
}

impl FlowCfg {
    /// Sample period for a channel, given whether it is simulated.
    pub fn period_s(&self, simulated: bool) -> u64 {
        self.sample_period_s
            .unwrap_or(if simulated { 1 } else { 10 })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateCfg {
    pub co2_density_g_m3: f64,
    pub broth_volume_l: f64,
}

impl Default for RateCfg {
    fn default() -> Self {
        Self {
            co2_density_g_m3: 1964.0,
            broth_volume_l: 5.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BusCfg {
    pub ads1115_addr: u16,
    pub ads1115_gain: u8,
    /// Input used by vessels that do not name a flow channel.
    pub ads1115_channel: u8,
    pub i2c_bus: u8,
}

impl Default for BusCfg {
    fn default() -> Self {
        Self {
            ads1115_addr: 0x48,
            ads1115_gain: 1,
            ads1115_channel: 1,
            i2c_bus: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Hardware {
    /// Upper bound for a single sensor read (probe or ADC conversion).
    pub sensor_read_timeout_ms: u64,
    pub w1_root: PathBuf,
}

impl Default for Hardware {
    fn default() -> Self {
        Self {
            sensor_read_timeout_ms: 150,
            w1_root: PathBuf::from("/sys/bus/w1/devices"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlCfg {
    pub tick_ms: u64,
    pub default_setpoint_c: f32,
    pub default_band_c: f32,
    /// Smallest hysteresis band ever applied.
    pub band_floor_c: f32,
    pub pump_frequency_hz: f32,
    /// Reported when a real probe read fails.
    pub temperature_fallback_c: f32,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            tick_ms: 1000,
            default_setpoint_c: 20.0,
            default_band_c: 0.5,
            band_floor_c: 0.05,
            pump_frequency_hz: 8000.0,
            temperature_fallback_c: 20.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsCfg {
    /// Directory holding the per-vessel instrument and flow logs.
    pub process_dir: PathBuf,
    /// Shared history file across all vessels.
    pub backup_file: PathBuf,
}

impl Default for PathsCfg {
    fn default() -> Self {
        Self {
            process_dir: PathBuf::from("./process"),
            backup_file: PathBuf::from("./backup/backup_global.csv"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VesselCfg {
    pub name: String,
    pub relay_cold: u8,
    pub relay_hot: u8,
    pub pump_pul: u8,
    pub pump_dir: u8,
    /// Index into the discovered probe list; defaults to the vessel's position.
    #[serde(default)]
    pub probe_index: Option<usize>,
    #[serde(default)]
    pub flow_channel: Option<u8>,
    #[serde(default)]
    pub ads1115_addr: Option<u16>,
    #[serde(default)]
    pub ads1115_gain: Option<u8>,
}

impl VesselCfg {
    fn preset(name: &str, cold: u8, hot: u8, pul: u8, dir: u8, channel: u8) -> Self {
        Self {
            name: name.to_owned(),
            relay_cold: cold,
            relay_hot: hot,
            pump_pul: pul,
            pump_dir: dir,
            probe_index: None,
            flow_channel: Some(channel),
            ads1115_addr: None,
            ads1115_gain: None,
        }
    }
}

fn default_vessels() -> Vec<VesselCfg> {
    vec![
        VesselCfg::preset("F1", 7, 8, 13, 26, 1),
        VesselCfg::preset("F2", 24, 23, 21, 20, 2),
        VesselCfg::preset("F3", 18, 15, 12, 16, 3),
    ]
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub simulation: SimulationCfg,
    pub flow: FlowCfg,
    pub rate: RateCfg,
    pub bus: BusCfg,
    pub hardware: Hardware,
    pub control: ControlCfg,
    pub paths: PathsCfg,
    pub logging: Logging,
    pub vessels: Vec<VesselCfg>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            simulation: SimulationCfg::default(),
            flow: FlowCfg::default(),
            rate: RateCfg::default(),
            bus: BusCfg::default(),
            hardware: Hardware::default(),
            control: ControlCfg::default(),
            paths: PathsCfg::default(),
            logging: Logging::default(),
            vessels: default_vessels(),
        }
    }
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Parse an integer in decimal or `0x` hexadecimal.
pub fn parse_int(raw: &str) -> Option<u64> {
    let raw = raw.trim().to_ascii_lowercase();
    match raw.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}

pub fn parse_truthy(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

/// Resolved ADC address of a vessel's flow channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowAddr {
    pub address: u16,
    pub channel: u8,
    pub gain: u8,
}

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
    }

    fn first(&self, keys: &[&str]) -> Option<(String, String)> {
        keys.iter()
            .find_map(|k| self.get(k).map(|v| ((*k).to_owned(), v)))
    }

    fn float(&self, keys: &[&str]) -> eyre::Result<Option<f64>> {
        match self.first(keys) {
            None => Ok(None),
            Some((k, v)) => v
                .parse::<f64>()
                .map(Some)
                .map_err(|_| eyre::eyre!("{k}: expected a number, got {v:?}")),
        }
    }

    fn int<T: TryFrom<u64>>(&self, key: &str) -> eyre::Result<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => parse_int(&v)
                .and_then(|n| T::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| eyre::eyre!("{key}: expected an integer in range, got {v:?}")),
        }
    }
}

impl Config {
    /// Resolve the ADC address of vessel `index` from its overrides and the bus defaults.
    pub fn flow_addr(&self, index: usize) -> Option<FlowAddr> {
        let v = self.vessels.get(index)?;
        Some(FlowAddr {
            address: v.ads1115_addr.unwrap_or(self.bus.ads1115_addr),
            channel: v.flow_channel.unwrap_or(self.bus.ads1115_channel),
            gain: v.ads1115_gain.unwrap_or(self.bus.ads1115_gain),
        })
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> eyre::Result<()> {
        self.apply_env_with(|k| std::env::var(k).ok())
    }

    /// Apply environment-style overrides read through `lookup`.
    ///
    /// Empty values are ignored. A value that does not parse is an error
    /// naming the key.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> eyre::Result<()> {
        let env = Env { lookup };
        if let Some((_, v)) = env.first(&["SIMULATOR", "SIMULADOR"]) {
            self.simulation.force = parse_truthy(&v);
        }
        if let Some(a) = env.int::<u16>("ADS1115_ADDR")? {
            self.bus.ads1115_addr = a;
        }
        if let Some(c) = env.int::<u8>("ADS1115_CH")? {
            self.bus.ads1115_channel = c;
        }
        if let Some(g) = env.int::<u8>("ADS1115_GAIN")? {
            self.bus.ads1115_gain = g;
        }
        for v in &mut self.vessels {
            let name = v.name.to_ascii_uppercase();
            if let Some(a) = env.int::<u16>(&format!("ADS1115_ADDR_{name}"))? {
                v.ads1115_addr = Some(a);
            }
            if let Some(c) = env.int::<u8>(&format!("ADS1115_CH_{name}"))? {
                v.flow_channel = Some(c);
            }
            if let Some(g) = env.int::<u8>(&format!("ADS1115_GAIN_{name}"))? {
                v.ads1115_gain = Some(g);
            }
        }
        if let Some(x) = env.float(&["SHUNT_OHMS"])? {
            self.flow.shunt_ohms = x;
        }
        if let Some(x) = env.float(&["FLOW_MIN_SCCM", "FLOW_MIN_M3H"])? {
            self.flow.min_sccm = x;
        }
        if let Some(x) = env.float(&["FLOW_MAX_SCCM", "FLOW_MAX_M3H"])? {
            self.flow.max_sccm = x;
        }
        if let Some(x) = env.float(&["CO2_DENSITY_G_M3"])? {
            self.rate.co2_density_g_m3 = x;
        }
        if let Some(x) = env.float(&["BROTH_VOLUME_L"])? {
            self.rate.broth_volume_l = x;
        }
        if let Some(p) = env.int::<u64>("SAMPLE_PERIOD_SEC")? {
            self.flow.sample_period_s = Some(p);
        }
        if let Some(x) = env.float(&["PLOT_WINDOW_HOURS"])? {
            self.flow.plot_window_hours = Some(x);
        }
        if let Some(x) = env.float(&["HISTORY_RETENTION_HOURS"])? {
            self.flow.retention_hours = x;
        }
        Ok(())
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Control
        if self.control.tick_ms == 0 {
            eyre::bail!("control.tick_ms must be > 0");
        }
        if self.control.band_floor_c.is_nan() || self.control.band_floor_c <= 0.0 {
            eyre::bail!("control.band_floor_c must be > 0");
        }
        if self.control.default_band_c.is_sign_negative() {
            eyre::bail!("control.default_band_c must be >= 0");
        }
        if !(self.control.pump_frequency_hz > 0.0) {
            eyre::bail!("control.pump_frequency_hz must be > 0");
        }

        // Flow
        if !(self.flow.shunt_ohms > 0.0) {
            eyre::bail!("flow.shunt_ohms must be > 0");
        }
        if self.flow.retention_hours < 0.0 || !self.flow.retention_hours.is_finite() {
            eyre::bail!("flow.retention_hours must be >= 0");
        }
        if self.flow.sample_period_s == Some(0) {
            eyre::bail!("flow.sample_period_s must be >= 1");
        }
        if let Some(w) = self.flow.plot_window_hours
            && w < 0.0
        {
            eyre::bail!("flow.plot_window_hours must be >= 0");
        }

        // Hardware
        if self.hardware.sensor_read_timeout_ms == 0 {
            eyre::bail!("hardware.sensor_read_timeout_ms must be >= 1");
        }
        if self.bus.ads1115_channel > MAX_ADC_CHANNEL {
            eyre::bail!("bus.ads1115_channel must be in 0..={MAX_ADC_CHANNEL}");
        }

        // Vessels
        if self.vessels.is_empty() {
            eyre::bail!("at least one [[vessels]] entry is required");
        }
        let mut seen = HashSet::new();
        for v in &self.vessels {
            if v.name.trim().is_empty() {
                eyre::bail!("vessel name must not be empty");
            }
            if !seen.insert(v.name.as_str()) {
                eyre::bail!("duplicate vessel name {:?}", v.name);
            }
            if let Some(ch) = v.flow_channel
                && ch > MAX_ADC_CHANNEL
            {
                eyre::bail!("vessel {}: flow_channel must be in 0..={MAX_ADC_CHANNEL}", v.name);
            }
            if v.relay_cold == v.relay_hot {
                eyre::bail!("vessel {}: relay_cold and relay_hot must differ", v.name);
            }
        }

        // max_sccm <= min_sccm is accepted; flow computation degrades to zero.
        Ok(())
    }
}
