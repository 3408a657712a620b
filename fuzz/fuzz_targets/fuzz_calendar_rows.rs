#![no_main]
use libfuzzer_sys::fuzz_target;

use ferment_core::calendar_import::events_from_delimited;

fuzz_target!(|data: &str| {
    // Arbitrary delimited text yields a (possibly empty) schedule or an error, never a panic.
    if let Ok(cal) = events_from_delimited::<f64>(data) {
        for (date, event) in cal.iter() {
            let ts = date.and_time(event.time.as_naive());
            let _ = cal.value_at(ts, 0.0);
            let _ = cal.fire_at_minute(ts);
        }
    }
});
