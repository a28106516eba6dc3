//! Stderr logging for the tracking tools.
//!
//! Records from the `marker_pose*` crates are filtered at the requested
//! level; everything else (solver back ends, CSV, serde) is capped at
//! [`LoggerConfig::dependencies`] so `--log-level trace` stays readable.
//!
//! Lines look like `[elapsed LEVEL crate] message`. Install once at startup
//! with [`init_with_level`] or [`init`]; with the `tracing` feature,
//! [`init_tracing`] installs a `tracing-subscriber` with the same split.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

/// Target prefix shared by the workspace crates.
const WORKSPACE_TARGET: &str = "marker_pose";

#[cfg(feature = "tracing")]
const WORKSPACE_CRATES: [&str; 4] = [
    "marker_pose",
    "marker_pose_core",
    "marker_pose_pnp",
    "marker_pose_overlay",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoggerConfig {
    /// Level for the workspace crates.
    pub level: LevelFilter,
    /// Ceiling for every other target.
    pub dependencies: LevelFilter,
}

impl LoggerConfig {
    pub fn new(level: LevelFilter) -> Self {
        Self {
            level,
            dependencies: LevelFilter::Warn,
        }
    }

    fn filter_for(&self, target: &str) -> LevelFilter {
        if crate_of(target).starts_with(WORKSPACE_TARGET) {
            self.level
        } else {
            self.dependencies.min(self.level)
        }
    }
}

fn crate_of(target: &str) -> &str {
    target.split("::").next().unwrap_or(target)
}

struct StderrLogger {
    config: LoggerConfig,
    started: Instant,
}

impl StderrLogger {
    fn line(&self, record: &Record) -> String {
        format!(
            "[{:8.3}s {:>5} {}] {}",
            self.started.elapsed().as_secs_f64(),
            record.level(),
            crate_of(record.target()),
            record.args()
        )
    }
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.config.filter_for(metadata.target())
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let _ = writeln!(std::io::stderr().lock(), "{}", self.line(record));
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger. Later calls are no-ops; the first config wins.
pub fn init(config: LoggerConfig) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| StderrLogger {
        config,
        started: Instant::now(),
    });
    log::set_logger(logger)?;
    log::set_max_level(logger.config.level);
    Ok(())
}

/// [`init`] with dependencies capped at `warn`.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    init(LoggerConfig::new(level))
}

/// `tracing` directive equivalent to [`LoggerConfig::new`].
#[cfg(feature = "tracing")]
fn default_directive(level: &str) -> String {
    WORKSPACE_CRATES
        .iter()
        .fold(String::from("warn"), |acc, krate| format!("{acc},{krate}={level}"))
}

/// Install a `tracing` subscriber; `RUST_LOG` overrides the default of
/// `default_level` for the workspace crates and `warn` elsewhere.
///
/// Span close events are emitted so `#[instrument]`ed solver calls report
/// their duration.
#[cfg(feature = "tracing")]
pub fn init_tracing(default_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(default_level)));
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init()
    };
}
