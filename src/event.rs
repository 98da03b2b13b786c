//! # Station Events
//!
//! Everything the broadcast hub fans out to viewers. Events serialize as a
//! JSON object tagged by record type, so a dashboard can switch on `type`.

use serde::Serialize;

use crate::frame::schema::TelemetryRecord;

/// One broadcast event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StationEvent {
    /// An accepted telemetry record
    Telemetry(TelemetryRecord),

    /// Command uplink lifecycle notice
    Command(CommandNotice),

    /// Ingestion source lifecycle notice
    Source(SourceNotice),
}

/// Command uplink outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    /// The payload echoed the pending command back
    Confirmed,

    /// An echo arrived that matches no pending command
    Unsolicited,

    /// The pending command saw no echo within the timeout
    TimedOut,

    /// No uplink path was available; the frame was not transmitted
    Dropped,
}

/// Notice about a submitted command or an observed echo
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandNotice {
    pub outcome: CommandOutcome,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub echo: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl CommandNotice {
    pub fn confirmed(command: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            outcome: CommandOutcome::Confirmed,
            command: Some(command.into()),
            echo: None,
            latency_ms: Some(latency_ms),
        }
    }

    pub fn unsolicited(echo: impl Into<String>) -> Self {
        Self {
            outcome: CommandOutcome::Unsolicited,
            command: None,
            echo: Some(echo.into()),
            latency_ms: None,
        }
    }

    pub fn timed_out(command: impl Into<String>) -> Self {
        Self {
            outcome: CommandOutcome::TimedOut,
            command: Some(command.into()),
            echo: None,
            latency_ms: None,
        }
    }

    pub fn dropped(command: impl Into<String>) -> Self {
        Self {
            outcome: CommandOutcome::Dropped,
            command: Some(command.into()),
            echo: None,
            latency_ms: None,
        }
    }
}

/// Ingestion source state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceNotice {
    pub status: SourceStatus,

    /// Human-readable source descriptor (port path or "simulation")
    pub source: String,
}

/// Source lifecycle states a viewer cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Connected,
    Disconnected,
    Stopped,
}

impl SourceNotice {
    pub fn connected(source: impl Into<String>) -> Self {
        Self { status: SourceStatus::Connected, source: source.into() }
    }

    pub fn disconnected(source: impl Into<String>) -> Self {
        Self { status: SourceStatus::Disconnected, source: source.into() }
    }

    pub fn stopped(source: impl Into<String>) -> Self {
        Self { status: SourceStatus::Stopped, source: source.into() }
    }
}
