#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Sensor and actuator drivers plus their simulation models.
//!
//! Everything that touches pins or buses lives behind the `hardware`
//! feature. The 1-Wire reader only needs sysfs and is always built, so a
//! host without the feature still reads probes when they are present.

pub mod ads1115;
pub mod backend;
pub mod bridge;
pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;
pub mod sim;
pub mod util;
pub mod w1;

pub use backend::{Backend, DomainMode, SimReason};
pub use bridge::{AnalogOpener, BridgeConfig, FlowChannelStatus, HardwareBridge, HardwareStatus};
pub use error::HwError;
