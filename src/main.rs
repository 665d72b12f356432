//! # mavviz
//!
//! Ground-station telemetry client for MAVLink autopilots over UDP.
//!
//! Connects to the autopilot, records streamed telemetry, downloads the
//! mission and periodically logs a status summary.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use mavviz::config::{Config, MissionMode, PlotPreset};
use mavviz::connection::{ConnectionManager, ConnectionStatus};
use mavviz::telemetry::{Channel, TelemetryView};

/// Command line options; values given here override the config file
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Connection used when neither --conn-active nor --conn-passive is set
    #[arg(long)]
    conn: Option<String>,

    /// Active (bidirectional) connection for heartbeats and mission requests
    #[arg(long)]
    conn_active: Option<String>,

    /// Passive (receive-only) connection for telemetry
    #[arg(long)]
    conn_passive: Option<String>,

    /// Samples kept per channel
    #[arg(long)]
    window: Option<usize>,

    /// Poll interval in milliseconds
    #[arg(long)]
    interval: Option<u64>,

    /// Channel preset
    #[arg(long, value_enum)]
    plots: Option<PlotPreset>,

    /// Mission handling mode
    #[arg(long, value_enum)]
    mission_mode: Option<MissionMode>,

    /// Log file path (empty disables file logging)
    #[arg(long)]
    log: Option<String>,
}

impl Args {
    /// Active and passive addresses after applying `--conn`.
    fn addresses(&self) -> (Option<String>, Option<String>) {
        match (&self.conn_active, &self.conn_passive) {
            (None, None) => (self.conn.clone(), None),
            (active, passive) => (active.clone(), passive.clone()),
        }
    }

    /// Loads the config file (or defaults) and applies command line overrides.
    fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => Config::default(),
        };

        let (active, passive) = self.addresses();
        config.link.apply_addresses(active, passive);

        if let Some(window) = self.window {
            config.telemetry.capacity = window;
        }
        if let Some(interval) = self.interval {
            config.link.poll_interval_ms = interval;
        }
        if let Some(preset) = self.plots {
            config.telemetry.apply_preset(preset);
        }
        if let Some(mode) = self.mission_mode {
            config.mission.mode = mode;
        }
        if let Some(log) = self.log {
            config.logging.file = log;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

/// Installs the stderr and file log layers.
///
/// A log file that cannot be created is reported as a warning and logging
/// continues on stderr only.
fn init_logging(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let mut file_warning = None;
    let (file_layer, guard) = if config.logging.file.is_empty() {
        (None, None)
    } else {
        match open_log_file(Path::new(&config.logging.file)) {
            Ok((writer, guard)) => (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            ),
            Err(e) => {
                file_warning = Some(format!("Log file {} unavailable: {}", config.logging.file, e));
                (None, None)
            }
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    if let Some(msg) = file_warning {
        warn!("{}", msg);
    }
    guard
}

fn open_log_file(path: &Path) -> std::io::Result<(NonBlocking, WorkerGuard)> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let file_name = path
        .file_name()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "no file name"))?;

    // Open once here so permission problems surface as a warning
    std::fs::OpenOptions::new().create(true).append(true).open(path)?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

/// Logs the status line and buffer fill for the rendering consumer.
fn log_status(status: &ConnectionStatus, view: &TelemetryView) {
    info!("{}", status.summary());

    let fill: Vec<String> = Channel::ALL
        .iter()
        .map(|c| format!("{}={}", c, view.len(*c)))
        .collect();
    info!(
        "Samples ({} max): {} | mission items: {}",
        view.capacity(),
        fill.join(" "),
        view.mission().len()
    );
}

/// Main entry point for mavviz
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Parse command line and load configuration
///    - Set up logging (stderr plus optional file)
///    - Connect and wait for the autopilot heartbeat
///    - Request the mission in `active` mission mode
///
/// 2. **Main Loop**
///    - Poll the links at the configured interval
///    - Log a status summary periodically
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Graceful Shutdown**
///    - Cancel any in-flight mission download
///    - Close both links
///
/// # Errors
///
/// Returns error if:
/// - Configuration is invalid
/// - No heartbeat arrives within the handshake timeout
#[tokio::main]
async fn main() -> Result<()> {
    let config = Args::parse().into_config()?;
    let _log_guard = init_logging(&config);

    info!("mavviz v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut manager = ConnectionManager::new(config.clone());
    manager.connect().await.context("MAVLink connection failed")?;

    match config.mission.mode {
        MissionMode::Active => {
            manager.request_mission();
        }
        MissionMode::Passive => info!("Passive mission mode: observing mission items only"),
        MissionMode::Off => info!("Mission handling disabled"),
    }

    let view = manager.view();
    let mut poll_interval = interval(Duration::from_millis(config.link.poll_interval_ms));
    poll_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut status_interval = interval(Duration::from_millis(config.logging.status_interval_ms));

    info!("Polling every {} ms", config.link.poll_interval_ms);
    info!("Press Ctrl+C to exit");

    loop {
        tokio::select! {
            _ = poll_interval.tick() => {
                manager.poll();
            }

            _ = status_interval.tick() => {
                log_status(&manager.status(), &view);
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    manager.close();
    log_status(&manager.status(), &view);
    Ok(())
}
