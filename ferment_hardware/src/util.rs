use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// Wait until the provided `ready` predicate returns true, or a timeout expires.
/// Sleeps in small intervals to avoid CPU spinning.
pub fn wait_until_ready_with_timeout(
    mut ready: impl FnMut() -> Result<bool>,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while !ready()? {
        if Instant::now() >= deadline {
            return Err(HwError::ConversionTimeout);
        }
        std::thread::sleep(poll_interval);
    }
    Ok(())
}
