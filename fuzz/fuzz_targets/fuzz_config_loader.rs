#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse, override and validate must reject bad input without panicking.
    if let Ok(mut cfg) = ferment_config::load_toml(data) {
        let _ = cfg.apply_env_with(|key| (key == "ADS1115_CH").then(|| data.chars().take(8).collect()));
        if cfg.validate().is_ok() {
            for i in 0..cfg.vessels.len() {
                let _ = cfg.flow_addr(i);
            }
        }
    }
});
