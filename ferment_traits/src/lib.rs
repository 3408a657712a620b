pub mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

use std::time::Duration;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Temperature probes on a shared sensor bus (1-Wire on the reference rig).
pub trait TemperatureBus {
    /// Number of probes the bus exposes.
    fn probe_count(&self) -> usize;
    /// Human-readable probe identifiers, in index order.
    fn probe_labels(&self) -> Vec<String> {
        Vec::new()
    }
    /// Read probe `index` in degrees Celsius.
    fn read_celsius(&mut self, index: usize, timeout: Duration) -> Result<f32, BoxError>;
}

/// Analog-to-digital converter address of one flow channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnalogAddr {
    pub address: u16,
    pub channel: u8,
    pub gain: u8,
}

/// Shared analog bus (I2C on the reference rig) carrying the flow channels.
pub trait AnalogBus {
    /// Check the converter answers at `addr`; called once per channel at startup.
    fn probe(&mut self, addr: AnalogAddr) -> Result<(), BoxError>;
    /// Single-ended voltage on `addr`.
    fn read_voltage(&mut self, addr: AnalogAddr, timeout: Duration) -> Result<f32, BoxError>;
    /// Release the bus handle. Called exactly once at shutdown.
    fn release(&mut self) -> Result<(), BoxError>;
}

/// Relays and pump drivers.
pub trait ActuatorBus {
    fn setup_relay(&mut self, pin: u8) -> Result<(), BoxError>;
    fn set_relay(&mut self, pin: u8, on: bool) -> Result<(), BoxError>;
    fn setup_pump(&mut self, name: &str, pul_pin: u8, dir_pin: u8) -> Result<(), BoxError>;
    fn start_pump(&mut self, name: &str, frequency_hz: f32) -> Result<(), BoxError>;
    fn stop_pump(&mut self, name: &str) -> Result<(), BoxError>;
    /// Return every pin to its safe state and drop the driver handles.
    fn release(&mut self) -> Result<(), BoxError>;
}
