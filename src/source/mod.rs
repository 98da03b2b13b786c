//! # Telemetry Sources
//!
//! Session tasks that feed the ingest pipeline: the serial downlink and the
//! built-in simulation generator. At most one session runs at a time; each
//! is driven by a spawned task and controlled through a [`SessionHandle`].

pub mod serial;
pub mod sim;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

/// Which kind of session a handle controls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Serial,
    Sim,
}

/// Control handle for a running source session
///
/// Holding the handle keeps the session's uplink queue open; consuming it
/// with [`SessionHandle::stop`] ends the session and waits for the task to
/// wind down.
#[derive(Debug)]
pub struct SessionHandle {
    kind: SourceKind,
    stop: watch::Sender<bool>,
    uplink_tx: Option<mpsc::Sender<String>>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub(crate) fn new(
        kind: SourceKind,
        stop: watch::Sender<bool>,
        uplink_tx: Option<mpsc::Sender<String>>,
        task: JoinHandle<()>,
    ) -> Self {
        Self { kind, stop, uplink_tx, task }
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Queue for outbound command frames, present only on serial sessions
    pub fn uplink_tx(&self) -> Option<&mpsc::Sender<String>> {
        self.uplink_tx.as_ref()
    }

    /// Signal the session to stop and wait for its task to finish
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(error) = self.task.await {
            debug!("Source task ended abnormally: {}", error);
        }
    }
}
