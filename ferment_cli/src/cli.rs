//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "fermentctl", version, about = "Fermentation process automation")]
pub struct Cli {
    /// Path to config TOML; a missing file means built-in defaults
    #[arg(long, value_name = "FILE", default_value = "etc/ferment.toml")]
    pub config: PathBuf,

    /// Log and report as JSON lines instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); RUST_LOG wins when set
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CalendarKindArg {
    Setpoint,
    Dosing,
}

#[derive(Subcommand, Debug)]
pub enum CalendarCmd {
    /// Parse a calendar file and list the events it yields
    Import {
        file: PathBuf,
        #[arg(long, value_enum, default_value = "setpoint")]
        kind: CalendarKindArg,
    },
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the automation loop until Ctrl-C, `quit` on stdin, or --ticks
    Run {
        /// Stop after this many ticks
        #[arg(long, value_name = "N")]
        ticks: Option<u64>,
        /// Simulate every hardware domain
        #[arg(long, action = ArgAction::SetTrue)]
        simulate: bool,
        /// Seconds between panel refreshes
        #[arg(long, value_name = "S", default_value_t = 5)]
        panel_secs: u64,
        /// Do not print the status panel
        #[arg(long, action = ArgAction::SetTrue)]
        no_panel: bool,
        /// Do not read operator commands from stdin
        #[arg(long, action = ArgAction::SetTrue)]
        no_stdin: bool,
    },
    /// Bind the hardware, report each domain, release it
    SelfCheck,
    /// Validate the config and that the log paths are writable
    Health,
    /// Calendar file tools
    #[command(subcommand)]
    Calendar(CalendarCmd),
    /// Summarise the shared backup log
    History {
        /// Lookback window in days
        #[arg(long, value_name = "D", default_value_t = 1.0)]
        days: f64,
        /// Only this vessel
        #[arg(long, value_name = "NAME")]
        vessel: Option<String>,
    },
}
