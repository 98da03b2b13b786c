//! # Station Status
//!
//! Shared health state written by the ingest pipeline and source sessions
//! and read by operator health queries. Counters are atomics so the hot
//! path never takes a lock for them.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::uplink::CommandSnapshot;

/// Where telemetry currently comes from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceState {
    /// No session running
    Idle,

    /// Serial link open and pumping
    Serial { port: String, baud_rate: u32 },

    /// Serial link lost; reopen attempts in progress
    Reconnecting { port: String },

    /// Locally generated telemetry
    Sim { period_ms: u64 },
}

/// One-shot health report for the operator boundary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub source: SourceState,
    pub received: u64,
    pub lost: u64,
    pub persist_ok: bool,
    pub log_path: Option<PathBuf>,
    pub command: Option<CommandSnapshot>,
}

/// Live station health, shared between the pipeline and query paths
#[derive(Debug)]
pub struct StationStatus {
    received: AtomicU64,
    lost: AtomicU64,
    persist_ok: AtomicBool,
    source: Mutex<SourceState>,
    log_path: Mutex<Option<PathBuf>>,
}

impl StationStatus {
    pub fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            lost: AtomicU64::new(0),
            persist_ok: AtomicBool::new(true),
            source: Mutex::new(SourceState::Idle),
            log_path: Mutex::new(None),
        }
    }

    fn source_guard(&self) -> MutexGuard<'_, SourceState> {
        match self.source.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn log_path_guard(&self) -> MutexGuard<'_, Option<PathBuf>> {
        match self.log_path.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Store the pipeline's cumulative accepted and lost counts
    pub fn set_counts(&self, received: u64, lost: u64) {
        self.received.store(received, Ordering::Relaxed);
        self.lost.store(lost, Ordering::Relaxed);
    }

    /// Zero the counters; a new session starts with a clean slate
    pub fn reset_counts(&self) {
        self.set_counts(0, 0);
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn lost(&self) -> u64 {
        self.lost.load(Ordering::Relaxed)
    }

    pub fn set_persist_ok(&self, ok: bool) {
        self.persist_ok.store(ok, Ordering::Relaxed);
    }

    pub fn persist_ok(&self) -> bool {
        self.persist_ok.load(Ordering::Relaxed)
    }

    pub fn set_source(&self, state: SourceState) {
        *self.source_guard() = state;
    }

    pub fn source(&self) -> SourceState {
        self.source_guard().clone()
    }

    pub fn set_log_path(&self, path: Option<PathBuf>) {
        *self.log_path_guard() = path;
    }

    /// Assemble a health report, folding in the uplink's command view
    pub fn health(&self, command: Option<CommandSnapshot>) -> HealthSnapshot {
        HealthSnapshot {
            source: self.source(),
            received: self.received(),
            lost: self.lost(),
            persist_ok: self.persist_ok(),
            log_path: self.log_path_guard().clone(),
            command,
        }
    }
}

impl Default for StationStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_status_is_idle_and_clean() {
        let status = StationStatus::new();
        assert_eq!(status.source(), SourceState::Idle);
        assert_eq!(status.received(), 0);
        assert_eq!(status.lost(), 0);
        assert!(status.persist_ok());
    }

    #[test]
    fn test_counts_update_and_reset() {
        let status = StationStatus::new();
        status.set_counts(42, 3);
        assert_eq!(status.received(), 42);
        assert_eq!(status.lost(), 3);

        status.reset_counts();
        assert_eq!(status.received(), 0);
        assert_eq!(status.lost(), 0);
    }

    #[test]
    fn test_source_transitions() {
        let status = StationStatus::new();
        status.set_source(SourceState::Serial {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
        });
        assert_eq!(
            status.source(),
            SourceState::Serial {
                port: "/dev/ttyUSB0".to_string(),
                baud_rate: 115_200,
            }
        );

        status.set_source(SourceState::Reconnecting {
            port: "/dev/ttyUSB0".to_string(),
        });
        assert!(matches!(status.source(), SourceState::Reconnecting { .. }));
    }

    #[test]
    fn test_health_reflects_current_state() {
        let status = StationStatus::new();
        status.set_counts(10, 1);
        status.set_persist_ok(false);
        status.set_log_path(Some(PathBuf::from("/tmp/data/Flight_1043.csv")));

        let health = status.health(None);
        assert_eq!(health.received, 10);
        assert_eq!(health.lost, 1);
        assert!(!health.persist_ok);
        assert_eq!(
            health.log_path,
            Some(PathBuf::from("/tmp/data/Flight_1043.csv"))
        );
        assert!(health.command.is_none());
    }

    #[test]
    fn test_source_state_serialization_tags() {
        let json = serde_json::to_value(SourceState::Sim { period_ms: 1000 }).unwrap();
        assert_eq!(json["kind"], "sim");
        assert_eq!(json["period_ms"], 1000);

        let json = serde_json::to_value(SourceState::Idle).unwrap();
        assert_eq!(json["kind"], "idle");
    }
}
