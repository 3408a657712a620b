//! Relay and stepper-pump outputs on the Raspberry Pi GPIO header.
//!
//! Relay boards are active-low. Pumps are driven by a software PWM square
//! wave on the PUL pin at the requested step frequency; DIR is held low.
use std::collections::HashMap;

use ferment_traits::{ActuatorBus, BoxError};
use rppal::gpio::{Gpio, OutputPin};
use tracing::debug;

use crate::error::{HwError, Result};

const PUMP_DUTY: f64 = 0.5;

struct Pump {
    pul: OutputPin,
    _dir: OutputPin,
    running: bool,
}

pub struct GpioActuators {
    gpio: Gpio,
    relays: HashMap<u8, OutputPin>,
    pumps: HashMap<String, Pump>,
}

fn gpio_err(e: rppal::gpio::Error) -> HwError {
    HwError::Gpio(e.to_string())
}

impl GpioActuators {
    pub fn open() -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        Ok(Self {
            gpio,
            relays: HashMap::new(),
            pumps: HashMap::new(),
        })
    }

    fn relay(&mut self, pin: u8) -> Result<&mut OutputPin> {
        self.relays
            .get_mut(&pin)
            .ok_or_else(|| HwError::NoDevice(format!("relay pin {pin} not set up")))
    }

    fn pump(&mut self, name: &str) -> Result<&mut Pump> {
        self.pumps
            .get_mut(name)
            .ok_or_else(|| HwError::NoDevice(format!("pump {name} not set up")))
    }
}

impl ActuatorBus for GpioActuators {
    fn setup_relay(&mut self, pin: u8) -> std::result::Result<(), BoxError> {
        let out = self.gpio.get(pin).map_err(gpio_err)?.into_output_high();
        self.relays.insert(pin, out);
        debug!(pin, "relay configured");
        Ok(())
    }

    fn set_relay(&mut self, pin: u8, on: bool) -> std::result::Result<(), BoxError> {
        let out = self.relay(pin)?;
        if on {
            out.set_low();
        } else {
            out.set_high();
        }
        Ok(())
    }

    fn setup_pump(
        &mut self,
        name: &str,
        pul_pin: u8,
        dir_pin: u8,
    ) -> std::result::Result<(), BoxError> {
        let pul = self.gpio.get(pul_pin).map_err(gpio_err)?.into_output_low();
        let dir = self.gpio.get(dir_pin).map_err(gpio_err)?.into_output_low();
        self.pumps.insert(
            name.to_owned(),
            Pump {
                pul,
                _dir: dir,
                running: false,
            },
        );
        debug!(pump = name, pul_pin, dir_pin, "pump configured");
        Ok(())
    }

    fn start_pump(&mut self, name: &str, frequency_hz: f32) -> std::result::Result<(), BoxError> {
        let pump = self.pump(name)?;
        pump.pul
            .set_pwm_frequency(f64::from(frequency_hz), PUMP_DUTY)
            .map_err(gpio_err)?;
        pump.running = true;
        Ok(())
    }

    fn stop_pump(&mut self, name: &str) -> std::result::Result<(), BoxError> {
        let pump = self.pump(name)?;
        if pump.running {
            pump.pul.clear_pwm().map_err(gpio_err)?;
            pump.running = false;
        }
        pump.pul.set_low();
        Ok(())
    }

    fn release(&mut self) -> std::result::Result<(), BoxError> {
        for pin in self.relays.values_mut() {
            pin.set_high();
        }
        for pump in self.pumps.values_mut() {
            if pump.running {
                pump.pul.clear_pwm().map_err(gpio_err)?;
                pump.running = false;
            }
            pump.pul.set_low();
        }
        self.relays.clear();
        self.pumps.clear();
        debug!("gpio released");
        Ok(())
    }
}
