//! ADS1115 16-bit ADC on I2C, single-shot single-ended reads.
//!
//! The register math is plain functions so it is tested on any host; the
//! bus driver itself needs the `hardware` feature.

pub const REG_CONVERSION: u8 = 0x00;
pub const REG_CONFIG: u8 = 0x01;

const OS_START: u16 = 1 << 15;
const MODE_SINGLE: u16 = 1 << 8;
const DR_128SPS: u16 = 0b100 << 5;
const COMP_DISABLE: u16 = 0b11;

/// PGA field for a gain code (1, 2, 4, 8, 16; anything else is ±6.144 V).
pub fn pga_bits(gain: u8) -> u16 {
    let code: u16 = match gain {
        1 => 0b001,
        2 => 0b010,
        4 => 0b011,
        8 => 0b100,
        16 => 0b101,
        _ => 0b000,
    };
    code << 9
}

/// Full-scale range in volts for a gain code.
pub fn full_scale_volts(gain: u8) -> f32 {
    match gain {
        1 => 4.096,
        2 => 2.048,
        4 => 1.024,
        8 => 0.512,
        16 => 0.256,
        _ => 6.144,
    }
}

/// Config register value that starts a single-shot conversion of AIN`channel` against GND.
pub fn config_word(channel: u8, gain: u8) -> u16 {
    let mux = (0b100 | u16::from(channel & 0b11)) << 12;
    OS_START | mux | pga_bits(gain) | MODE_SINGLE | DR_128SPS | COMP_DISABLE
}

pub fn raw_to_volts(raw: i16, gain: u8) -> f32 {
    f32::from(raw) * full_scale_volts(gain) / 32768.0
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use driver::Ads1115Bus;

#[cfg(all(feature = "hardware", target_os = "linux"))]
mod driver {
    use std::time::Duration;

    use ferment_traits::{AnalogAddr, AnalogBus, BoxError};
    use rppal::i2c::I2c;
    use tracing::{debug, trace};

    use super::{REG_CONFIG, REG_CONVERSION, config_word, raw_to_volts};
    use crate::error::{HwError, Result};
    use crate::util::wait_until_ready_with_timeout;

    /// Shared I2C handle serving every ADS1115 on the bus.
    pub struct Ads1115Bus {
        i2c: Option<I2c>,
    }

    impl Ads1115Bus {
        pub fn open(bus: u8) -> Result<Self> {
            let i2c = I2c::with_bus(bus).map_err(|e| HwError::I2c(e.to_string()))?;
            debug!(bus, "i2c bus opened");
            Ok(Self { i2c: Some(i2c) })
        }

        fn i2c(&mut self, address: u16) -> Result<&mut I2c> {
            let i2c = self.i2c.as_mut().ok_or(HwError::Released)?;
            i2c.set_slave_address(address)
                .map_err(|e| HwError::I2c(e.to_string()))?;
            Ok(i2c)
        }

        fn read_register(&mut self, address: u16, reg: u8) -> Result<u16> {
            let mut buf = [0u8; 2];
            self.i2c(address)?
                .write_read(&[reg], &mut buf)
                .map_err(|e| HwError::I2c(e.to_string()))?;
            Ok(u16::from_be_bytes(buf))
        }

        fn sample(&mut self, addr: AnalogAddr, timeout: Duration) -> Result<f32> {
            let [hi, lo] = config_word(addr.channel, addr.gain).to_be_bytes();
            self.i2c(addr.address)?
                .write(&[REG_CONFIG, hi, lo])
                .map_err(|e| HwError::I2c(e.to_string()))?;
            wait_until_ready_with_timeout(
                || Ok(self.read_register(addr.address, REG_CONFIG)? & (1 << 15) != 0),
                timeout,
                Duration::from_millis(1),
            )?;
            let raw = self.read_register(addr.address, REG_CONVERSION)? as i16;
            trace!(address = addr.address, channel = addr.channel, raw, "ads1115 sample");
            Ok(raw_to_volts(raw, addr.gain))
        }
    }

    impl AnalogBus for Ads1115Bus {
        fn probe(&mut self, addr: AnalogAddr) -> std::result::Result<(), BoxError> {
            self.read_register(addr.address, REG_CONFIG)?;
            Ok(())
        }

        fn read_voltage(
            &mut self,
            addr: AnalogAddr,
            timeout: Duration,
        ) -> std::result::Result<f32, BoxError> {
            Ok(self.sample(addr, timeout)?)
        }

        fn release(&mut self) -> std::result::Result<(), BoxError> {
            if self.i2c.take().is_some() {
                debug!("i2c bus released");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 1, 0xC383)]
    #[case(1, 1, 0xD383)]
    #[case(3, 1, 0xF383)]
    #[case(0, 2, 0xC583)]
    #[case(2, 16, 0xEB83)]
    #[case(0, 0, 0xC183)]
    fn config_word_layout(#[case] channel: u8, #[case] gain: u8, #[case] expected: u16) {
        assert_eq!(config_word(channel, gain), expected);
    }

    #[rstest]
    #[case(1, 4.096)]
    #[case(2, 2.048)]
    #[case(4, 1.024)]
    #[case(8, 0.512)]
    #[case(16, 0.256)]
    #[case(3, 6.144)]
    fn full_scale_by_gain(#[case] gain: u8, #[case] fs: f32) {
        assert_eq!(full_scale_volts(gain), fs);
    }

    #[test]
    fn raw_conversion_scales_by_gain() {
        assert_eq!(raw_to_volts(0, 1), 0.0);
        assert!((raw_to_volts(16384, 1) - 2.048).abs() < 1e-6);
        assert!((raw_to_volts(-32768, 2) + 2.048).abs() < 1e-6);
    }
}
