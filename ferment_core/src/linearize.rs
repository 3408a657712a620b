//! 4–20 mA flow transmitter linearization.
//!
//! The transmitter drives a loop current through a shunt resistor; the ADC
//! reads the shunt voltage. Flow is affine in the clamped current, while the
//! range status is judged on the raw current so an open loop or an
//! over-range transmitter is still visible.
use serde::Serialize;

pub const LOOP_MIN_MA: f64 = 4.0;
pub const LOOP_MAX_MA: f64 = 20.0;
const LOOP_SPAN_MA: f64 = LOOP_MAX_MA - LOOP_MIN_MA;

/// Raw current below this is reported as low-range.
pub const LOW_RANGE_MA: f64 = 3.8;
/// Raw current above this is reported as high-range.
pub const HIGH_RANGE_MA: f64 = 20.5;

/// cc/min → m³/h.
const SCCM_TO_M3H: f64 = 6e-5;

pub fn voltage_to_current_ma(voltage: f64, shunt_ohms: f64) -> f64 {
    if shunt_ohms <= 0.0 {
        return 0.0;
    }
    voltage / shunt_ohms * 1000.0
}

/// Map loop current to flow. Degenerate ranges (`max <= min`) give 0.
pub fn current_to_flow(current_ma: f64, min_flow: f64, max_flow: f64) -> f64 {
    if max_flow <= min_flow {
        return 0.0;
    }
    let ma = current_ma.clamp(LOOP_MIN_MA, LOOP_MAX_MA);
    min_flow + (ma - LOOP_MIN_MA) * (max_flow - min_flow) / LOOP_SPAN_MA
}

/// Production rate in g/L/h for a CO2 flow in cc/min.
pub fn flow_to_rate(flow_sccm: f64, density_g_m3: f64, volume_l: f64) -> f64 {
    if density_g_m3 <= 0.0 || volume_l <= 0.0 {
        return 0.0;
    }
    flow_sccm * SCCM_TO_M3H * density_g_m3 / volume_l
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlowStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "Low-range")]
    LowRange,
    #[serde(rename = "High-range")]
    HighRange,
}

impl FlowStatus {
    /// Classify the unclamped loop current.
    pub fn classify(current_ma: f64) -> Self {
        if current_ma < LOW_RANGE_MA {
            Self::LowRange
        } else if current_ma > HIGH_RANGE_MA {
            Self::HighRange
        } else {
            Self::Ok
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::LowRange => "Low-range",
            Self::HighRange => "High-range",
        }
    }
}

impl std::fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of pushing one voltage through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FlowReading {
    pub voltage: f64,
    pub current_ma: f64,
    pub flow: f64,
    pub rate: f64,
    pub status: FlowStatus,
}

/// Linearization constants for one installation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Linearizer {
    pub shunt_ohms: f64,
    pub min_flow: f64,
    pub max_flow: f64,
    pub density_g_m3: f64,
    pub volume_l: f64,
}

impl Linearizer {
    pub fn from_config(cfg: &ferment_config::Config) -> Self {
        Self {
            shunt_ohms: cfg.flow.shunt_ohms,
            min_flow: cfg.flow.min_sccm,
            max_flow: cfg.flow.max_sccm,
            density_g_m3: cfg.rate.co2_density_g_m3,
            volume_l: cfg.rate.broth_volume_l,
        }
    }

    pub fn reading(&self, voltage: f64) -> FlowReading {
        let current_ma = voltage_to_current_ma(voltage, self.shunt_ohms);
        let flow = current_to_flow(current_ma, self.min_flow, self.max_flow);
        FlowReading {
            voltage,
            current_ma,
            flow,
            rate: flow_to_rate(flow, self.density_g_m3, self.volume_l),
            status: FlowStatus::classify(current_ma),
        }
    }
}
