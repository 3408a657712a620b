mod cli;
mod error_fmt;
mod logging;
mod ops;
mod run;

use clap::Parser;
use eyre::Result;

use crate::cli::{CalendarCmd, Cli, Commands, JSON_MODE};
use crate::error_fmt::{EXIT_OK, exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    let code = match real_main(cli) {
        Ok(()) => EXIT_OK,
        Err(e) => {
            if JSON_MODE.get().copied().unwrap_or(false) {
                eprintln!("{}", format_error_json(&e));
            } else {
                eprintln!("{}", humanize(&e));
            }
            exit_code_for_error(&e)
        }
    };
    std::process::exit(code);
}

fn real_main(cli: Cli) -> Result<()> {
    color_eyre::install()?;

    // Calendar preview does not need a valid process config.
    if let Commands::Calendar(CalendarCmd::Import { file, kind }) = &cli.cmd {
        logging::init_tracing(&cli.log_level, cli.json, &ferment_config::Logging::default())?;
        return ops::calendar_import(file, *kind, cli.json);
    }

    let mut cfg = ops::load_config(&cli.config)?;
    if let Commands::Run { simulate: true, .. } = cli.cmd {
        cfg.simulation.force = true;
    }
    let level = cfg.logging.level.clone().filter(|_| cli.log_level == "info");
    logging::init_tracing(level.as_deref().unwrap_or(&cli.log_level), cli.json, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), "configuration loaded");

    match cli.cmd {
        Commands::Run {
            ticks,
            panel_secs,
            no_panel,
            no_stdin,
            ..
        } => run::run(
            &cfg,
            &run::RunOpts {
                ticks,
                panel_secs,
                panel: !no_panel,
                stdin: !no_stdin,
                json: cli.json,
            },
        ),
        Commands::SelfCheck => ops::self_check(&cfg, cli.json),
        Commands::Health => ops::health(&cfg, cli.json),
        Commands::History { days, vessel } => ops::history(&cfg, days, vessel.as_deref(), cli.json),
        Commands::Calendar(_) => Ok(()),
    }
}
