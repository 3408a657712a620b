//! Human-readable error descriptions and structured JSON error formatting.

use ferment_core::error::{CalendarError, FermentError, LogError};

/// Exit code for a run that completed.
pub const EXIT_OK: i32 = 0;
/// Any failure not covered below.
pub const EXIT_FAILURE: i32 = 1;
/// Invalid configuration (file, environment override or validation).
pub const EXIT_CONFIG: i32 = 3;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(fe) = err.downcast_ref::<FermentError>() {
        return match fe {
            FermentError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: A TOML value or environment override is missing, malformed or out of range.\nHow to fix: Edit the config file or unset the offending variable, then run `fermentctl health`."
            ),
            FermentError::Timeout => "What happened: A sensor read timed out.\nLikely causes: Probe or converter not wired, bus not enabled, or timeout configured too low.\nHow to fix: Check wiring and raise hardware.sensor_read_timeout_ms in the config.".to_string(),
            FermentError::UnknownVessel(name) => format!(
                "What happened: No vessel named {name:?}.\nLikely causes: Typo, or the vessel is not listed under [[vessels]].\nHow to fix: Use one of the configured vessel names."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    if let Some(ce) = err.downcast_ref::<CalendarError>() {
        return match ce {
            CalendarError::Empty => "What happened: The calendar file has no usable rows.\nLikely causes: Missing date/time/value columns, unsupported date format, or times outside 00:00-23:59.\nHow to fix: Use headers date,time,value (or fecha,hora,valor) with dates like 2025-06-10.".to_string(),
            CalendarError::UnsupportedFormat(what) => format!(
                "What happened: Unsupported calendar file ({what}).\nHow to fix: Use a .csv or .txt file, or build with the `xlsx` feature for spreadsheets."
            ),
            other => format!("What happened: Calendar import failed: {other}."),
        };
    }

    if let Some(le) = err.downcast_ref::<LogError>() {
        return format!(
            "What happened: {le}.\nLikely causes: Directory not writable or disk full.\nHow to fix: Check [paths] in the config and the directory permissions."
        );
    }

    // Generic fallback
    let msg = err.to_string();
    let mut cause = String::new();
    if let Some(src) = err.chain().nth(1) {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 3 for configuration problems, 1 otherwise.
///
/// Usage errors exit with 2 from clap before any of this runs.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<FermentError>() {
        Some(FermentError::Config(_)) => EXIT_CONFIG,
        _ => EXIT_FAILURE,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(fe) = err.downcast_ref::<FermentError>() {
        return match fe {
            FermentError::Config(_) => "InvalidConfig",
            FermentError::Timeout => "Timeout",
            FermentError::UnknownVessel(_) => "UnknownVessel",
            FermentError::Hardware(_) | FermentError::HardwareFault(_) => "Hardware",
            FermentError::Io(_) => "Io",
        };
    }
    if err.downcast_ref::<CalendarError>().is_some() {
        return "Calendar";
    }
    if err.downcast_ref::<LogError>().is_some() {
        return "Log";
    }
    "Error"
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
