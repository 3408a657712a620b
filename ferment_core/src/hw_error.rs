//! Maps `Box<dyn Error>` from trait boundaries to typed `FermentError`.
//!
//! The traits in `ferment_traits` use `Box<dyn Error + Send + Sync>`; this
//! module converts those to our typed error enum, downcasting
//! `ferment_hardware::HwError` when the `hardware-errors` feature is on.

use crate::error::FermentError;

/// Map a trait-boundary error to a typed `FermentError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> FermentError {
    #[cfg(feature = "hardware-errors")]
    {
        use ferment_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout | HwError::ConversionTimeout => FermentError::Timeout,
                HwError::Io(io) => FermentError::Io(io.to_string()),
                other => FermentError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        FermentError::Timeout
    } else {
        FermentError::Hardware(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferment_hardware::error::HwError;

    #[test]
    fn downcasts_hardware_errors() {
        let e = HwError::ConversionTimeout;
        assert!(matches!(map_hw_error(&e), FermentError::Timeout));
        let e = HwError::I2c("nack".into());
        match map_hw_error(&e) {
            FermentError::HardwareFault(s) => assert!(s.contains("nack")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn falls_back_to_message() {
        let e: Box<dyn std::error::Error + Send + Sync> = "bus timeout".into();
        assert!(matches!(map_hw_error(e.as_ref()), FermentError::Timeout));
        let e: Box<dyn std::error::Error + Send + Sync> = "weird".into();
        assert!(matches!(map_hw_error(e.as_ref()), FermentError::Hardware(_)));
    }
}
