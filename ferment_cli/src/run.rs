//! The `run` subcommand: automation loop plus panel and operator threads.
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use eyre::{Result, WrapErr};
use ferment_config::Config;
use ferment_core::{CommandSender, Engine, Snapshot, SnapshotReader, bridge_config};
use ferment_hardware::HardwareBridge;
use ferment_traits::SystemClock;
use ferment_ui::{HELP, Input, parse_command, render_panel};
use tracing::{info, warn};

pub struct RunOpts {
    pub ticks: Option<u64>,
    pub panel_secs: u64,
    pub panel: bool,
    pub stdin: bool,
    pub json: bool,
}

type SharedReader = Arc<Mutex<SnapshotReader>>;

fn latest(reader: &SharedReader) -> Option<Arc<Snapshot>> {
    reader
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .latest()
}

fn print_snapshot(snap: &Snapshot, json: bool) {
    if json {
        match serde_json::to_string(snap) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "snapshot serialization failed"),
        }
    } else {
        print!("{}", render_panel(snap));
    }
}

fn spawn_panel(reader: SharedReader, stop: Arc<AtomicBool>, every: Duration, json: bool) -> Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("panel".into())
        .spawn(move || {
            let mut last_tick = None;
            let mut due = Instant::now() + every;
            while !stop.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(100));
                if Instant::now() < due {
                    continue;
                }
                due += every;
                if let Some(snap) = latest(&reader) {
                    if last_tick != Some(snap.tick) {
                        last_tick = Some(snap.tick);
                        print_snapshot(&snap, json);
                    }
                }
            }
        })
        .wrap_err("spawning panel thread")
}

/// Operator input. Not joined: a blocking read cannot be interrupted.
/// End of input leaves the loop running; only `quit` stops it.
fn spawn_stdin(reader: SharedReader, tx: CommandSender, stop: Arc<AtomicBool>, json: bool) -> Result<()> {
    thread::Builder::new()
        .name("operator".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match parse_command(&line) {
                    Ok(Input::Command(cmd)) => {
                        if !tx.send(cmd) {
                            break;
                        }
                    }
                    Ok(Input::Status) => match latest(&reader) {
                        Some(snap) => print_snapshot(&snap, json),
                        None => println!("no snapshot yet"),
                    },
                    Ok(Input::Help) => println!("{HELP}"),
                    Ok(Input::Quit) => {
                        stop.store(true, Ordering::SeqCst);
                        break;
                    }
                    Ok(Input::Empty) => {}
                    Err(msg) => eprintln!("{msg}"),
                }
            }
        })
        .wrap_err("spawning operator thread")?;
    Ok(())
}

pub fn run(cfg: &Config, opts: &RunOpts) -> Result<()> {
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::SeqCst);
        })
        .wrap_err("installing Ctrl-C handler")?;
    }

    let bridge = HardwareBridge::init(bridge_config(cfg));
    let (mut engine, tx, reader) = Engine::new(cfg, bridge, SystemClock::new());
    let reader: SharedReader = Arc::new(Mutex::new(reader));

    let panel = if opts.panel {
        let every = Duration::from_secs(opts.panel_secs.max(1));
        Some(spawn_panel(reader.clone(), stop.clone(), every, opts.json)?)
    } else {
        None
    };
    if opts.stdin {
        spawn_stdin(reader.clone(), tx, stop.clone(), opts.json)?;
    }

    info!(tick_ms = engine.tick_period().as_millis(), "automation running");
    let ran = engine.run(&stop, opts.ticks);
    stop.store(true, Ordering::SeqCst);
    if let Some(handle) = panel {
        if handle.join().is_err() {
            warn!("panel thread panicked");
        }
    }
    info!(ticks = ran, "automation stopped");
    Ok(())
}
