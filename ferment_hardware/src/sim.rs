//! Simulation models used when a hardware domain is not bound.
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Centre of the simulated probe readings.
pub const SIM_BASE_C: f32 = 20.0;

/// Per-probe biased random walk around [`SIM_BASE_C`].
///
/// Each probe gets a fixed bias in ±1 °C. The excursion is pulled back
/// towards zero every step so it stays smooth and bounded; a small
/// symmetric noise is laid on top of the walk.
pub struct SimTemperature {
    rng: StdRng,
    bias: Vec<f32>,
    excursion: Vec<f32>,
}

impl SimTemperature {
    const PULL: f32 = 0.08;
    const STEP: f32 = 0.06;
    const MAX_EXCURSION: f32 = 0.5;
    const NOISE: f32 = 0.05;

    pub fn new(probes: usize, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let bias = (0..probes).map(|_| rng.gen_range(-1.0..=1.0)).collect();
        Self {
            rng,
            bias,
            excursion: vec![0.0; probes],
        }
    }

    pub fn bias(&self, index: usize) -> f32 {
        self.bias.get(index).copied().unwrap_or(0.0)
    }

    /// Next reading for probe `index`; out-of-range indices reuse the last bias.
    pub fn read(&mut self, index: usize) -> f32 {
        if self.bias.is_empty() {
            return SIM_BASE_C;
        }
        let i = index.min(self.bias.len() - 1);
        let step = self.rng.gen_range(-Self::STEP..=Self::STEP);
        let e = &mut self.excursion[i];
        *e = (*e - *e * Self::PULL + step).clamp(-Self::MAX_EXCURSION, Self::MAX_EXCURSION);
        let noise = self.rng.gen_range(-Self::NOISE..=Self::NOISE);
        SIM_BASE_C + self.bias[i] + *e + noise
    }
}

/// Impulse-response model of CO2 off-gas flow for one channel.
///
/// Flow follows `A·(e^(−t/td) − e^(−t/tr))` over hours since the reader was
/// created, scaled so the peak equals the configured maximum, with uniform
/// jitter and clamped to the configured range. The value is mapped back to the
/// 4–20 mA loop and then to the shunt voltage, so downstream linearization is
/// the same in both modes.
#[derive(Debug, Clone)]
pub struct FlowCurve {
    pub min_flow: f64,
    pub max_flow: f64,
    pub shunt_ohms: f64,
    pub rise_h: f64,
    pub decay_h: f64,
    pub jitter: f64,
}

impl FlowCurve {
    pub fn new(min_flow: f64, max_flow: f64, shunt_ohms: f64) -> Self {
        Self {
            min_flow,
            max_flow,
            shunt_ohms,
            rise_h: 0.2,
            decay_h: 4.0,
            jitter: 0.3,
        }
    }

    fn shape(&self, hours: f64) -> f64 {
        (-hours / self.decay_h).exp() - (-hours / self.rise_h).exp()
    }

    fn decay(&self) -> f64 {
        if self.decay_h <= self.rise_h {
            self.rise_h + 0.1
        } else {
            self.decay_h
        }
    }

    /// Time of the curve maximum, in hours.
    pub fn peak_hours(&self) -> f64 {
        let (tr, td) = (self.rise_h, self.decay());
        (tr * td / (td - tr)) * (td / tr).ln()
    }

    /// Noise-free flow after `hours`, before clamping.
    pub fn ideal_flow(&self, hours: f64) -> f64 {
        let model = Self {
            decay_h: self.decay(),
            ..self.clone()
        };
        let peak = model.shape(model.peak_hours());
        let peak = if peak > 0.0 { peak } else { 1.0 };
        (self.max_flow / peak) * model.shape(hours.max(0.0))
    }

    /// Flow with jitter, clamped to `[min_flow, max_flow]`.
    pub fn flow<R: Rng>(&self, hours: f64, rng: &mut R) -> f64 {
        let jitter = if self.jitter > 0.0 {
            rng.gen_range(-self.jitter..=self.jitter)
        } else {
            0.0
        };
        let f = self.ideal_flow(hours) + jitter;
        f.min(self.max_flow).max(self.min_flow)
    }

    /// Loop current equivalent to `flow`, clamped to 4–20 mA.
    pub fn flow_to_current_ma(&self, flow: f64) -> f64 {
        if self.max_flow <= self.min_flow {
            return 4.0;
        }
        let ma = 4.0 + (flow - self.min_flow) * 16.0 / (self.max_flow - self.min_flow);
        ma.clamp(4.0, 20.0)
    }

    /// Shunt voltage for the simulated flow after `hours`.
    pub fn voltage<R: Rng>(&self, hours: f64, rng: &mut R) -> f64 {
        let flow = self.flow(hours, rng);
        self.flow_to_current_ma(flow) / 1000.0 * self.shunt_ohms
    }
}
