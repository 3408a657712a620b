//! First-order thermal model of a fermenting vessel.
//!
//! Used in place of a probe when the temperature domain is simulated, so
//! the relay decisions have a visible effect. All rates are per second.
use rand::Rng;

use crate::thermal::ThermalOutput;

const AMBIENT_PULL: f64 = 0.0008;
const FERMENT_GAIN: f64 = 0.018;
/// Fermentation heat drives the broth at least this far above ambient.
const FERMENT_LIFT_C: f64 = 4.0;
const HEATING_C_PER_S: f64 = 0.22;
const COOLING_C_PER_S: f64 = 0.28;
const NOISE_C_PER_S: f64 = 0.008;
const T_MIN_C: f64 = -5.0;
const T_MAX_C: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermalPlant {
    temperature: f64,
    ambient: f64,
}

impl ThermalPlant {
    pub fn new(temperature: f64, ambient: f64) -> Self {
        Self {
            temperature,
            ambient,
        }
    }

    /// Start near 21.5 °C in a room near 21 °C.
    pub fn randomized<R: Rng>(rng: &mut R) -> Self {
        Self::new(21.5 + rng.gen_range(-0.3..=0.3), 21.0 + rng.gen_range(-0.4..=0.4))
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn ambient(&self) -> f64 {
        self.ambient
    }

    /// Deterministic part of dT/dt.
    pub fn drift(&self, setpoint: f64, output: ThermalOutput) -> f64 {
        let ambient_pull = (self.ambient - self.temperature) * AMBIENT_PULL;
        let target = setpoint.max(self.ambient + FERMENT_LIFT_C);
        let ferment = (target - self.temperature) * FERMENT_GAIN;
        let relay = match output {
            ThermalOutput::Hot => HEATING_C_PER_S,
            ThermalOutput::Cold => -COOLING_C_PER_S,
            ThermalOutput::Rest => 0.0,
        };
        ambient_pull + ferment + relay
    }

    /// Advance by `dt_s` seconds and return the new temperature.
    pub fn step<R: Rng>(&mut self, dt_s: f64, setpoint: f64, output: ThermalOutput, rng: &mut R) -> f64 {
        if dt_s <= 0.0 {
            return self.temperature;
        }
        let noise = rng.gen_range(-NOISE_C_PER_S..=NOISE_C_PER_S);
        let delta = (self.drift(setpoint, output) + noise) * dt_s;
        self.temperature = (self.temperature + delta).clamp(T_MIN_C, T_MAX_C);
        self.temperature
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn relays_push_in_expected_direction() {
        let p = ThermalPlant::new(20.0, 21.0);
        let rest = p.drift(20.0, ThermalOutput::Rest);
        assert!(p.drift(20.0, ThermalOutput::Hot) > rest);
        assert!(p.drift(20.0, ThermalOutput::Cold) < rest);
        assert!(p.drift(20.0, ThermalOutput::Cold) < 0.0);
    }

    #[test]
    fn free_running_vessel_warms_towards_ferment_target() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut p = ThermalPlant::new(21.0, 21.0);
        for _ in 0..600 {
            p.step(1.0, 18.0, ThermalOutput::Rest, &mut rng);
        }
        assert!(p.temperature() > 23.0 && p.temperature() < 25.5, "{}", p.temperature());
    }

    #[test]
    fn clamps_to_physical_range() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut p = ThermalPlant::new(39.9, 21.0);
        for _ in 0..100 {
            p.step(10.0, 40.0, ThermalOutput::Hot, &mut rng);
        }
        assert_eq!(p.temperature(), 40.0);
        let mut p = ThermalPlant::new(-4.9, -30.0);
        p.step(100.0, -40.0, ThermalOutput::Cold, &mut rng);
        assert_eq!(p.temperature(), -5.0);
    }

    #[test]
    fn randomized_start_is_near_room() {
        let mut rng = StdRng::seed_from_u64(3);
        let p = ThermalPlant::randomized(&mut rng);
        assert!((21.2..=21.8).contains(&p.temperature()));
        assert!((20.6..=21.4).contains(&p.ambient()));
    }
}
