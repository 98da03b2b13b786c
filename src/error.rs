//! # Error Types
//!
//! Custom error types for the ground station using `thiserror`.

use thiserror::Error;

/// Main error type for the ground station
#[derive(Debug, Error)]
pub enum GroundStationError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial link errors
    #[error("Serial link error: {0}")]
    Serial(String),

    /// Flight log cannot be written; live telemetry keeps flowing
    #[error("Persistence unavailable: {0}")]
    PersistenceUnavailable(#[source] std::io::Error),

    /// Command submitted with an empty body
    #[error("Command body is empty")]
    EmptyCommand,
}

/// Result type alias for the ground station
pub type Result<T> = std::result::Result<T, GroundStationError>;
