use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("i2c error: {0}")]
    I2c(String),
    #[error("sensor read timeout")]
    Timeout,
    #[error("ads1115 conversion-ready timeout")]
    ConversionTimeout,
    #[error("invalid sensor packet: {0}")]
    Packet(String),
    #[error("no such device: {0}")]
    NoDevice(String),
    #[error("bus released")]
    Released,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
