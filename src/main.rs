// Copyright 2026 PPS Discipline Contributors
// SPDX-License-Identifier: Apache-2.0

//! PPS Discipline daemon
//!
//! Plays the disciplined pulse program, steers it to the wall clock and
//! broadcasts the time after every pulse.
//!
//! # Usage
//!
//! ```bash
//! # Run with four cameras at 0, 90, 180 and 270 degrees
//! pps-discipline run 0 90 180 270
//!
//! # Run with a custom config and a drift journal
//! pps-discipline --config /path/to/config.yaml run --drift-log-dir /var/log/pps
//!
//! # Show the composed program
//! pps-discipline program 0 45 --json
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pps_discipline::broadcast::{TimeBroadcaster, UdpBroadcaster};
use pps_discipline::config::{Config, EngineKind};
use pps_discipline::dispatch::EdgeDispatcher;
use pps_discipline::engine::{PulseEngine, SimulatedEngine};
use pps_discipline::journal::DriftJournal;
use pps_discipline::sync::{SystemWallClock, WallClock};
use pps_discipline::waveform::{PulseProgram, WaveformComposer};
use pps_discipline::{Result, VERSION};

/// PPS pulse discipline daemon
#[derive(Parser)]
#[command(name = "pps-discipline")]
#[command(author = "PPS Discipline Contributors")]
#[command(version = VERSION)]
#[command(about = "Disciplines a 1 PPS pulse train and derives camera triggers")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play the program and discipline it until interrupted
    Run {
        /// Camera phase offsets in degrees, one per camera line
        phases: Vec<f64>,

        /// Do not send time broadcasts
        #[arg(long)]
        no_broadcast: bool,

        /// Directory for the per-day drift journal
        #[arg(long)]
        drift_log_dir: Option<String>,
    },

    /// Print the composed program without starting it
    Program {
        /// Camera phase offsets in degrees
        phases: Vec<f64>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show effective configuration
    Config,

    /// Validate configuration and program composition
    Validate {
        /// Camera phase offsets in degrees
        phases: Vec<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load(cli.config.as_deref())?;

    // Initialize logging
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    init_logging(&level);

    match cli.command {
        Commands::Run {
            phases,
            no_broadcast,
            drift_log_dir,
        } => {
            // Override config with CLI args
            set_phases(&mut config, phases);
            if no_broadcast {
                config.broadcast.enabled = false;
            }
            if drift_log_dir.is_some() {
                config.logging.drift_log_dir = drift_log_dir;
            }

            config.validate()?;
            let program = compose(&config)?;
            run(&config, program).await?;
        }

        Commands::Program { phases, json } => {
            set_phases(&mut config, phases);
            config.validate()?;
            let program = compose(&config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&program)?);
            } else {
                print_program(&program);
            }
        }

        Commands::Config => {
            // Show effective configuration
            println!("{}", serde_yaml::to_string(&config)?);
        }

        Commands::Validate { phases } => {
            set_phases(&mut config, phases);
            match config.validate().and_then(|()| compose(&config)) {
                Ok(_) => {
                    println!("Configuration is valid");
                }
                Err(e) => {
                    eprintln!("Configuration error: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

/// Initialize logging with tracing.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}

fn set_phases(config: &mut Config, phases: Vec<f64>) {
    if !phases.is_empty() {
        config.cameras.phases_degrees = phases;
    }
}

/// Build the pulse program, logging the camera table.
fn compose(config: &Config) -> Result<PulseProgram> {
    let (cameras, ignored) = config.camera_specs();
    info!(count = cameras.len(), "Cameras defined");
    for (i, spec) in cameras.iter().enumerate() {
        info!(
            cam = i,
            gpio = spec.channel_id,
            phase = spec.phase_offset_degrees,
            "Camera channel"
        );
    }
    if ignored > 0 {
        warn!(
            ignored,
            limit = config.cameras.lines.len(),
            "More phases than camera lines; extra phases ignored"
        );
    }

    let composer = WaveformComposer::from_timing(&config.timing, config.cameras.lines.len());
    let program =
        composer.build_program(&cameras, &config.base_channel, &config.trigger_channel)?;
    Ok(program)
}

/// Create the configured pulse engine.
fn create_engine(config: &Config) -> Arc<dyn PulseEngine> {
    match config.engine.kind {
        EngineKind::Simulated => Arc::new(SimulatedEngine::new(config.timing.tick_units_per_micro)),
    }
}

/// Bring up the engine and dispatcher and run until Ctrl-C.
async fn run(config: &Config, program: PulseProgram) -> Result<()> {
    let engine = create_engine(config);
    let clock: Arc<dyn WallClock> = Arc::new(SystemWallClock);

    let handle = engine.load_program(program.clone())?;
    let mut dispatcher =
        EdgeDispatcher::new(engine.clone(), handle, &program, config, clock.clone());

    if config.broadcast.enabled {
        let transport = UdpBroadcaster::from_config(&config.broadcast)?;
        dispatcher = dispatcher.with_broadcaster(TimeBroadcaster::new(clock, Box::new(transport)));
    }
    if let Some(dir) = &config.logging.drift_log_dir {
        dispatcher = dispatcher.with_journal(DriftJournal::open(dir)?);
    }

    let dispatcher = Arc::new(dispatcher);
    dispatcher.install()?;
    engine.start_repeating(handle)?;

    info!(
        version = VERSION,
        engine = engine.name(),
        interval_micros = config.timing.interval_micros,
        target_slack_micros = config.timing.target_slack_micros,
        broadcast = config.broadcast.enabled,
        "Pulse discipline running"
    );

    tokio::signal::ctrl_c().await?;
    engine.stop();

    let state = dispatcher.sync_state();
    info!(
        cycles = state.cycle_count,
        drift = state.drift_micros,
        "Pulse discipline stopped"
    );
    Ok(())
}

/// Print one block per channel: segment index, level, duration.
fn print_program(program: &PulseProgram) {
    println!(
        "interval {} us, slack segment #{} ({} us)",
        program.interval_micros(),
        program.slack_index(),
        program.slack_micros()
    );
    for track in program.tracks() {
        println!();
        println!("line {:>2}  {}", track.line, track.role);
        for (index, segment) in track.indices().zip(program.track_segments(track)) {
            let level = if segment.mask_on.contains(track.line) {
                "high"
            } else {
                "low"
            };
            let mut notes = Vec::new();
            if index == program.slack_index() {
                notes.push("slack");
            }
            if segment.capture_tick_on_start {
                notes.push("capture");
            }
            println!(
                "  #{:<4} {:<4} {:>9} us  {}",
                index,
                level,
                segment.duration_micros,
                notes.join(",")
            );
        }
    }
}
