//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Baud rates the ground radio supports; anything else is a typo
pub const BAUD_PRESETS: &[u32] = &[
    9_600, 19_200, 38_400, 57_600, 115_200, 230_400, 250_000, 460_800, 921_600,
];

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_team_id")]
    pub team_id: u16,

    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub hub: HubConfig,

    #[serde(default)]
    pub command: CommandConfig,

    #[serde(default)]
    pub sim: SimConfig,
}

/// Serial link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
}

/// Broadcast hub configuration
#[derive(Debug, Deserialize, Clone)]
pub struct HubConfig {
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

/// Command uplink configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CommandConfig {
    #[serde(default = "default_echo_timeout_ms")]
    pub echo_timeout_ms: u64,
}

/// Simulation source configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SimConfig {
    #[serde(default = "default_sim_period_ms")]
    pub period_ms: u64,
}

// Default value functions
fn default_team_id() -> u16 { 1043 }
fn default_data_dir() -> String { "./data".to_string() }
fn default_log_dir() -> String { "./logs".to_string() }

fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { 115_200 }
fn default_reconnect_interval_ms() -> u64 { 2000 }

fn default_subscriber_buffer() -> usize { 256 }

fn default_echo_timeout_ms() -> u64 { 10_000 }

fn default_sim_period_ms() -> u64 { 1000 }

impl Default for Config {
    fn default() -> Self {
        Self {
            team_id: default_team_id(),
            data_dir: default_data_dir(),
            log_dir: default_log_dir(),
            serial: SerialConfig::default(),
            hub: HubConfig::default(),
            command: CommandConfig::default(),
            sim: SimConfig::default(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self { subscriber_buffer: default_subscriber_buffer() }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self { echo_timeout_ms: default_echo_timeout_ms() }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self { period_ms: default_sim_period_ms() }
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
    /// use daedalus_gs::config::Config;
    ///
    /// let config = Config::load("gs.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Returns
    ///
    /// * `Result<()>` - Ok if valid, Err if invalid
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Team id is zero-padded to four digits on the wire
        if self.team_id > 9999 {
            return Err(crate::error::GroundStationError::Config(
                toml::de::Error::custom("team_id must be between 0 and 9999")
            ));
        }

        if self.data_dir.is_empty() {
            return Err(crate::error::GroundStationError::Config(
                toml::de::Error::custom("data_dir cannot be empty")
            ));
        }

        if self.log_dir.is_empty() {
            return Err(crate::error::GroundStationError::Config(
                toml::de::Error::custom("log_dir cannot be empty")
            ));
        }

        // Validate serial link configuration
        if self.serial.port.is_empty() {
            return Err(crate::error::GroundStationError::Config(
                toml::de::Error::custom("serial port cannot be empty")
            ));
        }

        if !BAUD_PRESETS.contains(&self.serial.baud_rate) {
            return Err(crate::error::GroundStationError::Config(
                toml::de::Error::custom(format!(
                    "baud_rate {} is not a supported preset", self.serial.baud_rate
                ))
            ));
        }

        if self.serial.reconnect_interval_ms == 0 || self.serial.reconnect_interval_ms > 60000 {
            return Err(crate::error::GroundStationError::Config(
                toml::de::Error::custom("reconnect_interval_ms must be between 1 and 60000")
            ));
        }

        // Validate hub configuration
        if self.hub.subscriber_buffer == 0 || self.hub.subscriber_buffer > 65536 {
            return Err(crate::error::GroundStationError::Config(
                toml::de::Error::custom("subscriber_buffer must be between 1 and 65536")
            ));
        }

        // Validate command uplink configuration
        if self.command.echo_timeout_ms == 0 || self.command.echo_timeout_ms > 60000 {
            return Err(crate::error::GroundStationError::Config(
                toml::de::Error::custom("echo_timeout_ms must be between 1 and 60000")
            ));
        }

        // Validate simulation configuration
        if self.sim.period_ms < 10 || self.sim.period_ms > 60000 {
            return Err(crate::error::GroundStationError::Config(
                toml::de::Error::custom("sim period_ms must be between 10 and 60000")
            ));
        }

        Ok(())
    }
}
