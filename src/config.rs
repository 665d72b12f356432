//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and key is optional; missing values fall back to the
//! `default_*` functions below. Command-line options are applied on top of
//! the loaded file by the binary, which then re-validates.

use clap::ValueEnum;
use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{MavvizError, Result};
use crate::link::address::LinkAddress;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub link: LinkConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub mission: MissionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    /// Bidirectional link used for heartbeats and mission requests
    #[serde(default = "default_active_address")]
    pub active_address: String,

    /// Receive-only link; `None` or equal to `active_address` means single link
    #[serde(default)]
    pub passive_address: Option<String>,

    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    #[serde(default = "default_source_system")]
    pub source_system: u8,

    #[serde(default = "default_source_component")]
    pub source_component: u8,

    #[serde(default = "default_passive_component")]
    pub passive_component: u8,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Telemetry buffer configuration
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Samples kept per channel
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    #[serde(default = "default_enabled")]
    pub enable_velocity: bool,

    #[serde(default = "default_enabled")]
    pub enable_imu: bool,

    #[serde(default = "default_enabled")]
    pub enable_altitude: bool,

    #[serde(default = "default_enabled")]
    pub enable_gps: bool,

    #[serde(default = "default_enabled")]
    pub enable_servo: bool,

    #[serde(default = "default_enabled")]
    pub enable_attitude: bool,
}

/// Mission handling configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct MissionConfig {
    #[serde(default)]
    pub mode: MissionMode,
}

/// How mission traffic is handled
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MissionMode {
    /// Mission frames are ignored
    Off,

    /// Mission items are only observed, never requested
    Passive,

    /// The mission is downloaded over the active link
    #[default]
    Active,
}

impl std::fmt::Display for MissionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MissionMode::Off => f.write_str("off"),
            MissionMode::Passive => f.write_str("passive"),
            MissionMode::Active => f.write_str("active"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log file path; empty disables file logging
    #[serde(default = "default_log_file")]
    pub file: String,

    #[serde(default = "default_log_level")]
    pub level: String,

    /// Interval between status summaries
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
}

/// Channel sets for the display
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlotPreset {
    /// Position and attitude only
    Basic,

    /// Adds velocity and altitude
    Nav,

    /// Adds IMU
    Imu,

    /// Every channel
    Full,
}

// Default value functions
fn default_active_address() -> String { "udpin:127.0.0.1:14551".to_string() }
fn default_handshake_timeout_ms() -> u64 { 5000 }
fn default_source_system() -> u8 { 252 }
fn default_source_component() -> u8 { 191 }
fn default_passive_component() -> u8 { 200 }
fn default_poll_interval_ms() -> u64 { 60 }

fn default_capacity() -> usize { 300 }
fn default_enabled() -> bool { true }

fn default_log_file() -> String { "./logs/mavviz.log".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_status_interval_ms() -> u64 { 2000 }

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            active_address: default_active_address(),
            passive_address: None,
            handshake_timeout_ms: default_handshake_timeout_ms(),
            source_system: default_source_system(),
            source_component: default_source_component(),
            passive_component: default_passive_component(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            enable_velocity: default_enabled(),
            enable_imu: default_enabled(),
            enable_altitude: default_enabled(),
            enable_gps: default_enabled(),
            enable_servo: default_enabled(),
            enable_attitude: default_enabled(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            level: default_log_level(),
            status_interval_ms: default_status_interval_ms(),
        }
    }
}

impl LinkConfig {
    /// Applies command-line addresses.
    ///
    /// When only one of the two is given the other collapses onto it, which
    /// leaves a single link.
    pub fn apply_addresses(&mut self, active: Option<String>, passive: Option<String>) {
        match (active, passive) {
            (Some(active), Some(passive)) => {
                self.active_address = active;
                self.passive_address = Some(passive);
            }
            (Some(active), None) => {
                self.active_address = active;
                self.passive_address = None;
            }
            (None, Some(passive)) => {
                self.active_address = passive;
                self.passive_address = None;
            }
            (None, None) => {}
        }
    }

    /// Passive address if it names a second link.
    #[must_use]
    pub fn separate_passive_address(&self) -> Option<&str> {
        self.passive_address
            .as_deref()
            .filter(|p| !p.is_empty() && *p != self.active_address)
    }
}

impl TelemetryConfig {
    /// Sets the optional channel flags for a preset.
    ///
    /// `enable_attitude` is left alone.
    pub fn apply_preset(&mut self, preset: PlotPreset) {
        let (velocity, imu, altitude, gps, servo) = match preset {
            PlotPreset::Basic => (false, false, false, false, false),
            PlotPreset::Nav => (true, false, true, false, false),
            PlotPreset::Imu => (false, true, false, false, false),
            PlotPreset::Full => (true, true, true, true, true),
        };
        self.enable_velocity = velocity;
        self.enable_imu = imu;
        self.enable_altitude = altitude;
        self.enable_gps = gps;
        self.enable_servo = servo;
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use mavviz::config::Config;
    ///
    /// let config = Config::load("config/mavviz.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns `Config` if any value is out of range and `InvalidAddress`
    /// if a connection string does not parse.
    pub fn validate(&self) -> Result<()> {
        // Addresses
        if self.link.active_address.is_empty() {
            return Err(config_error("active_address cannot be empty"));
        }
        self.link.active_address.parse::<LinkAddress>()?;
        if let Some(passive) = self.link.separate_passive_address() {
            passive.parse::<LinkAddress>()?;
        }

        // Timing
        if self.link.handshake_timeout_ms == 0 || self.link.handshake_timeout_ms > 60000 {
            return Err(config_error("handshake_timeout_ms must be between 1 and 60000"));
        }

        if self.link.poll_interval_ms == 0 || self.link.poll_interval_ms > 1000 {
            return Err(config_error("poll_interval_ms must be between 1 and 1000"));
        }

        if self.logging.status_interval_ms == 0 || self.logging.status_interval_ms > 60000 {
            return Err(config_error("status_interval_ms must be between 1 and 60000"));
        }

        // Identity
        if self.link.source_system == 0 {
            return Err(config_error("source_system must be between 1 and 255"));
        }

        if self.link.source_component == 0 || self.link.passive_component == 0 {
            return Err(config_error("component ids must be between 1 and 255"));
        }

        if self.link.source_component == self.link.passive_component {
            return Err(config_error("passive_component must differ from source_component"));
        }

        // Buffers
        if self.telemetry.capacity == 0 || self.telemetry.capacity > 100_000 {
            return Err(config_error("capacity must be between 1 and 100000"));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(config_error(format!(
                "log level must be one of: {}",
                LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }
}

fn config_error(msg: impl std::fmt::Display) -> MavvizError {
    MavvizError::Config(toml::de::Error::custom(msg))
}
