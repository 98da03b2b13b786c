//! # Command Uplink Manager
//!
//! Builds wire frames for operator commands and correlates them with the
//! `CMD_ECHO` field the payload reports back. At most one command is
//! pending at a time; a newer submission supersedes it, and a pending
//! command with no echo inside the timeout is surfaced once and discarded.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::{GroundStationError, Result};

/// A transmitted command awaiting its echo
#[derive(Debug, Clone)]
pub struct PendingCommand {
    /// Operator command body as submitted (trimmed)
    pub body: String,

    /// Full frame handed to the transport: `CMD,<team>,<body>`
    pub wire_frame: String,

    /// Wall-clock submission time, for operators
    pub submitted_at: DateTime<Utc>,

    /// Whether the payload has echoed this command back
    pub matched: bool,

    /// Monotonic submission instant, for latency and timeout math
    submitted_instant: Instant,
}

/// How an observed echo relates to the pending command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EchoOutcome {
    /// Echo matches the pending command; round trip measured
    Confirmed { body: String, latency: Duration },

    /// Same echo text as the previous frame; payloads repeat it every frame
    Duplicate,

    /// Echo matches nothing we sent; informational, not an error
    Unsolicited { echo: String },
}

/// Confirmation lifecycle of the most recent command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandState {
    Pending,
    Confirmed,
    TimedOut,
}

/// Read-only view of the most recent command for the health boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSnapshot {
    pub body: String,
    pub wire_frame: String,
    pub state: CommandState,
    pub submitted_at: DateTime<Utc>,
}

/// Single-slot command uplink state machine
#[derive(Debug)]
pub struct CommandUplink {
    team_id: u16,
    echo_timeout: Duration,
    pending: Option<PendingCommand>,
    last_echo: Option<String>,
    last_result: Option<CommandSnapshot>,
}

impl CommandUplink {
    /// Create an uplink manager for the given team
    ///
    /// # Arguments
    ///
    /// * `team_id` - Team identifier, zero-padded to four digits on the wire
    /// * `echo_timeout` - How long a pending command may wait for its echo
    pub fn new(team_id: u16, echo_timeout: Duration) -> Self {
        Self {
            team_id,
            echo_timeout,
            pending: None,
            last_echo: None,
            last_result: None,
        }
    }

    /// Register a command and build its wire frame
    ///
    /// Any previous pending command is superseded. The caller transmits the
    /// returned frame plus a CRLF terminator; the manager never transmits.
    ///
    /// # Arguments
    ///
    /// * `body` - Operator command text, e.g. "CX,ON"
    ///
    /// # Returns
    ///
    /// * `Result<String>` - The wire frame `CMD,<team>,<body>`
    ///
    /// # Errors
    ///
    /// Returns [`GroundStationError::EmptyCommand`] if the body is blank
    pub fn submit(&mut self, body: &str) -> Result<String> {
        let body = body.trim();
        if body.is_empty() {
            return Err(GroundStationError::EmptyCommand);
        }

        let wire_frame = format!("CMD,{:04},{}", self.team_id, body);

        if let Some(previous) = self.pending.take() {
            if !previous.matched {
                info!("command '{}' superseded before any echo", previous.body);
            }
        }

        self.pending = Some(PendingCommand {
            body: body.to_string(),
            wire_frame: wire_frame.clone(),
            submitted_at: Utc::now(),
            matched: false,
            submitted_instant: Instant::now(),
        });

        // Re-sending the same command must be confirmable by the same echo
        self.last_echo = None;

        Ok(wire_frame)
    }

    /// Evaluate a non-empty echo field observed on an ingested record
    ///
    /// Payloads repeat the last echo on every frame, so only a change of
    /// echo text is evaluated. A change that equals the pending command's
    /// body, or its full wire frame, confirms it; anything else is an
    /// unsolicited echo.
    pub fn on_echo(&mut self, echo: &str) -> EchoOutcome {
        if self.last_echo.as_deref() == Some(echo) {
            return EchoOutcome::Duplicate;
        }
        self.last_echo = Some(echo.to_string());

        if let Some(pending) = &mut self.pending {
            if !pending.matched && (echo == pending.body || echo == pending.wire_frame) {
                pending.matched = true;
                let latency = pending.submitted_instant.elapsed();
                debug!(
                    "command '{}' confirmed after {} ms",
                    pending.body,
                    latency.as_millis()
                );
                return EchoOutcome::Confirmed {
                    body: pending.body.clone(),
                    latency,
                };
            }
        }

        EchoOutcome::Unsolicited { echo: echo.to_string() }
    }

    /// Discard the pending command if it has outlived the echo timeout
    ///
    /// Fires at most once per command; a discarded command is never
    /// retried or retransmitted.
    ///
    /// # Returns
    ///
    /// * `Option<String>` - The expired command body, if one just expired
    pub fn check_timeout(&mut self) -> Option<String> {
        let expired = match &self.pending {
            Some(pending) => {
                !pending.matched && pending.submitted_instant.elapsed() >= self.echo_timeout
            }
            None => false,
        };

        if !expired {
            return None;
        }

        let pending = self.pending.take()?;
        self.last_result = Some(CommandSnapshot {
            body: pending.body.clone(),
            wire_frame: pending.wire_frame,
            state: CommandState::TimedOut,
            submitted_at: pending.submitted_at,
        });
        Some(pending.body)
    }

    /// Read-only view of the most recent command, if any
    pub fn snapshot(&self) -> Option<CommandSnapshot> {
        match &self.pending {
            Some(pending) => Some(CommandSnapshot {
                body: pending.body.clone(),
                wire_frame: pending.wire_frame.clone(),
                state: if pending.matched {
                    CommandState::Confirmed
                } else {
                    CommandState::Pending
                },
                submitted_at: pending.submitted_at,
            }),
            None => self.last_result.clone(),
        }
    }
}
