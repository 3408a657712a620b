//! Hysteresis relay control of vessel temperature.
//!
//! Two relays per vessel, cooling and heating. The output is a single enum so
//! "both on" has no representation. Automatic control runs once per tick
//! unless manual mode is on; in manual mode the output only changes through
//! [`ThermalController::force`].
use serde::Serialize;

use crate::error::ControlError;

/// Smallest band floor ever applied, whatever the configuration says.
pub const MIN_BAND_FLOOR_C: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThermalOutput {
    #[default]
    Rest,
    Cold,
    Hot,
}

impl ThermalOutput {
    pub fn cold_on(self) -> bool {
        self == Self::Cold
    }

    pub fn hot_on(self) -> bool {
        self == Self::Hot
    }

    fn from_flags(cold: bool, hot: bool) -> Self {
        match (cold, hot) {
            (true, false) => Self::Cold,
            (false, true) => Self::Hot,
            // both requested only happens with a zero band; close everything
            (false, false) | (true, true) => Self::Rest,
        }
    }
}

/// Operator forcing in manual mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceMode {
    Cold,
    Hot,
    CloseAll,
}

impl From<ForceMode> for ThermalOutput {
    fn from(m: ForceMode) -> Self {
        match m {
            ForceMode::Cold => Self::Cold,
            ForceMode::Hot => Self::Hot,
            ForceMode::CloseAll => Self::Rest,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ThermalController {
    output: ThermalOutput,
    manual: bool,
    band_floor: f64,
}

impl ThermalController {
    pub fn new(band_floor: f64) -> Self {
        Self {
            output: ThermalOutput::Rest,
            manual: false,
            band_floor: if band_floor.is_finite() {
                band_floor.max(MIN_BAND_FLOOR_C)
            } else {
                MIN_BAND_FLOOR_C
            },
        }
    }

    pub fn output(&self) -> ThermalOutput {
        self.output
    }

    pub fn is_manual(&self) -> bool {
        self.manual
    }

    /// Band actually applied for a requested band.
    pub fn effective_band(&self, band: f64) -> f64 {
        if band.is_finite() {
            band.max(self.band_floor)
        } else {
            self.band_floor
        }
    }

    /// Toggle manual mode. The output is kept as-is in both directions.
    pub fn set_manual(&mut self, on: bool) {
        self.manual = on;
    }

    /// Automatic step; a no-op in manual mode.
    pub fn step(&mut self, temperature: f64, setpoint: f64, band: f64) -> ThermalOutput {
        if self.manual {
            return self.output;
        }
        let band = self.effective_band(band);
        let (lo, hi) = (setpoint - band, setpoint + band);
        let mut cold = self.output.cold_on();
        let mut hot = self.output.hot_on();

        if cold && temperature <= lo {
            cold = false;
        } else if !cold && temperature >= hi {
            cold = true;
        }
        if hot && temperature >= hi {
            hot = false;
        } else if !hot && temperature <= lo {
            hot = true;
        }

        self.output = ThermalOutput::from_flags(cold, hot);
        self.output
    }

    /// Operator override; rejected unless manual mode is on.
    pub fn force(&mut self, mode: ForceMode) -> Result<ThermalOutput, ControlError> {
        if !self.manual {
            return Err(ControlError::NotManual);
        }
        self.output = mode.into();
        Ok(self.output)
    }

    /// Enter manual mode with every relay closed.
    pub fn stop_all(&mut self) {
        self.manual = true;
        self.output = ThermalOutput::Rest;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn boundary_sequence() {
        let mut c = ThermalController::new(0.05);
        assert_eq!(c.step(20.6, 20.0, 0.5), ThermalOutput::Cold);
        assert_eq!(c.step(19.6, 20.0, 0.5), ThermalOutput::Cold);
        assert_eq!(c.step(19.5, 20.0, 0.5), ThermalOutput::Hot);
        assert_eq!(c.step(20.0, 20.0, 0.5), ThermalOutput::Hot);
        assert_eq!(c.step(20.5, 20.0, 0.5), ThermalOutput::Cold);
    }

    #[test]
    fn inside_band_from_rest_stays_at_rest() {
        let mut c = ThermalController::new(0.05);
        assert_eq!(c.step(20.2, 20.0, 0.5), ThermalOutput::Rest);
        assert_eq!(c.step(19.8, 20.0, 0.5), ThermalOutput::Rest);
    }

    #[test]
    fn band_is_floored() {
        let mut c = ThermalController::new(0.05);
        assert_eq!(c.effective_band(0.0), 0.05);
        assert_eq!(c.effective_band(f64::NAN), 0.05);
        assert_eq!(c.step(20.04, 20.0, 0.0), ThermalOutput::Rest);
        assert_eq!(c.step(20.06, 20.0, 0.0), ThermalOutput::Cold);
    }

    #[test]
    fn zero_floor_still_keeps_a_positive_band() {
        let mut c = ThermalController::new(0.0);
        assert_eq!(c.effective_band(0.0), MIN_BAND_FLOOR_C);
        assert_eq!(ThermalController::new(f64::NAN).effective_band(-1.0), MIN_BAND_FLOOR_C);
        assert_eq!(c.step(20.0, 20.0, 0.0), ThermalOutput::Rest);
        assert_eq!(c.step(20.005, 20.0, 0.0), ThermalOutput::Rest);
        assert_eq!(c.step(20.02, 20.0, 0.0), ThermalOutput::Cold);
    }

    #[test]
    fn force_requires_manual() {
        let mut c = ThermalController::new(0.05);
        assert_eq!(c.force(ForceMode::Hot), Err(ControlError::NotManual));
        c.set_manual(true);
        assert_eq!(c.force(ForceMode::Hot), Ok(ThermalOutput::Hot));
        // automatic step is frozen
        assert_eq!(c.step(30.0, 20.0, 0.5), ThermalOutput::Hot);
        assert_eq!(c.force(ForceMode::CloseAll), Ok(ThermalOutput::Rest));
        c.set_manual(false);
        assert_eq!(c.step(30.0, 20.0, 0.5), ThermalOutput::Cold);
    }

    #[test]
    fn stop_all_closes_and_freezes() {
        let mut c = ThermalController::new(0.05);
        c.step(30.0, 20.0, 0.5);
        c.stop_all();
        assert!(c.is_manual());
        assert_eq!(c.output(), ThermalOutput::Rest);
        assert_eq!(c.step(30.0, 20.0, 0.5), ThermalOutput::Rest);
    }

    proptest! {
        #[test]
        fn never_both_and_settles_correctly(
            seq in proptest::collection::vec((-10.0f64..50.0, 0.0f64..40.0, 0.0f64..3.0), 1..200),
            floor in 0.0f64..0.2,
        ) {
            let mut c = ThermalController::new(floor);
            for (t, sp, band) in seq {
                let out = c.step(t, sp, band);
                prop_assert!(!(out.cold_on() && out.hot_on()));
                let b = c.effective_band(band);
                if sp - b < sp + b {
                    if t >= sp + b { prop_assert_eq!(out, ThermalOutput::Cold); }
                    if t <= sp - b { prop_assert_eq!(out, ThermalOutput::Hot); }
                }
            }
        }
    }
}
