use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use marker_pose::overlay::io::{read_correspondences_csv, write_reports_jsonl};
use marker_pose::{FrameState, SessionConfig};

#[cfg(not(feature = "tracing"))]
use log::info;
#[cfg(feature = "tracing")]
use tracing::info;

#[cfg(feature = "tracing")]
use marker_pose::core::init_tracing;
#[cfg(not(feature = "tracing"))]
use marker_pose::core::init_with_level;

#[derive(Debug, Parser)]
#[command(name = "marker-pose", version, about = "Track a planar marker and project a cube overlay")]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Log verbosity (`RUST_LOG` takes precedence with the tracing feature).
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Process a correspondence CSV and write one JSON record per frame.
    Run {
        /// Session config (JSON).
        #[arg(short, long)]
        config: PathBuf,
        /// Detector output: `frame,marker_id,px,py[,X,Y,Z]` rows.
        #[arg(long)]
        correspondences: PathBuf,
        /// JSON Lines report; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write a default session config for the reference camera.
    InitConfig {
        /// Destination; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let level = LevelFilter::from(cli.log_level);

    #[cfg(not(feature = "tracing"))]
    init_with_level(level)?;

    // The subscriber also forwards `log` records from the library crates.
    #[cfg(feature = "tracing")]
    init_tracing(&level.as_str().to_ascii_lowercase(), false);

    match cli.command {
        Command::Run {
            config,
            correspondences,
            output,
        } => run(config, correspondences, output),
        Command::InitConfig { output } => init_config(output),
    }
}

#[cfg_attr(feature = "tracing", tracing::instrument(level = "info"))]
fn run(
    config: PathBuf,
    correspondences: PathBuf,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = SessionConfig::load_json(&config)?;
    let frames = read_correspondences_csv(&correspondences, &cfg.ring)?;
    info!(
        "loaded {} frames from {}",
        frames.len(),
        correspondences.display()
    );

    let outputs = marker_pose::track(&cfg, frames).map_err(|e| e as Box<dyn std::error::Error>)?;

    let emitted = outputs
        .iter()
        .filter(|o| o.state == FrameState::OverlayEmitted)
        .count();
    info!(
        "{} frames, {} overlays, {} tracking lost",
        outputs.len(),
        emitted,
        outputs.len() - emitted
    );

    match output {
        Some(path) => {
            write_reports_jsonl(fs::File::create(&path)?, &outputs)?;
            info!("report written to {}", path.display());
        }
        None => write_reports_jsonl(io::stdout().lock(), &outputs)?,
    }
    Ok(())
}

fn init_config(output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = SessionConfig::reference();
    match output {
        Some(path) => {
            cfg.write_json(&path)?;
            info!("config written to {}", path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", cfg.to_json_pretty()?)?;
        }
    }
    Ok(())
}
