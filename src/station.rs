//! # Ground Station Wiring
//!
//! `GroundStation` owns the long-lived pieces (hub, uplink manager, status
//! cell) and runs at most one source session at a time. Viewers subscribe
//! through it, operators send commands and poll health through it; the
//! sessions themselves live in [`crate::source`].

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::event::{CommandNotice, StationEvent};
use crate::hub::{BroadcastHub, SubscriberId, Subscription};
use crate::ingest::IngestPipeline;
use crate::source::{self, SessionHandle};
use crate::status::{HealthSnapshot, StationStatus};
use crate::uplink::CommandUplink;

/// How often expired commands are swept into timeout notices
const COMMAND_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// The assembled ground station
pub struct GroundStation {
    config: Config,
    hub: Arc<BroadcastHub>,
    uplink: Arc<Mutex<CommandUplink>>,
    status: Arc<StationStatus>,
    active: tokio::sync::Mutex<Option<SessionHandle>>,
    sweep: JoinHandle<()>,
}

impl GroundStation {
    /// Assemble a station from its configuration
    ///
    /// No source session is started; call [`GroundStation::start_serial`]
    /// or [`GroundStation::start_sim`] for that. Must run inside a tokio
    /// runtime because the command timeout sweep is spawned here.
    pub fn new(config: Config) -> Self {
        let hub = Arc::new(BroadcastHub::new(config.hub.subscriber_buffer));
        let uplink = Arc::new(Mutex::new(CommandUplink::new(
            config.team_id,
            Duration::from_millis(config.command.echo_timeout_ms),
        )));
        let status = Arc::new(StationStatus::new());

        let sweep = tokio::spawn(sweep_expired_commands(
            Arc::clone(&uplink),
            Arc::clone(&hub),
        ));

        Self {
            config,
            hub,
            uplink,
            status,
            active: tokio::sync::Mutex::new(None),
            sweep,
        }
    }

    fn lock_uplink(&self) -> MutexGuard<'_, CommandUplink> {
        match self.uplink.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn pipeline(&self) -> IngestPipeline {
        IngestPipeline::new(
            self.config.team_id,
            Path::new(&self.config.data_dir),
            Arc::clone(&self.hub),
            Arc::clone(&self.uplink),
            Arc::clone(&self.status),
        )
    }

    /// Start the serial session, stopping whatever session was running
    pub async fn start_serial(&self) {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            info!("Stopping {:?} session before starting serial", previous.kind());
            previous.stop().await;
        }

        info!(
            "Starting serial session on {} at {} baud",
            self.config.serial.port, self.config.serial.baud_rate
        );
        *active = Some(source::serial::spawn(
            self.config.serial.clone(),
            self.pipeline(),
            Arc::clone(&self.hub),
            Arc::clone(&self.status),
        ));
    }

    /// Start the simulation session, stopping whatever session was running
    pub async fn start_sim(&self, period_ms: u64) {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            info!("Stopping {:?} session before starting simulation", previous.kind());
            previous.stop().await;
        }

        info!("Starting simulation session at {} ms per record", period_ms);
        *active = Some(source::sim::spawn(
            self.config.team_id,
            period_ms,
            self.pipeline(),
            Arc::clone(&self.hub),
            Arc::clone(&self.status),
        ));
    }

    /// Stop the active session, if any; safe to call repeatedly
    pub async fn stop(&self) {
        let mut active = self.active.lock().await;
        if let Some(handle) = active.take() {
            info!("Stopping {:?} session", handle.kind());
            handle.stop().await;
        }
    }

    /// Attach a viewer to the live event feed
    pub fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    /// Detach a viewer; unknown ids are ignored
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.hub.unsubscribe(id);
    }

    /// Frame a command and hand it to the serial uplink
    ///
    /// The command registers with the uplink manager either way; without a
    /// serial session the frame is not transmitted and a dropped notice is
    /// broadcast, mirroring what an operator would want to know.
    ///
    /// # Arguments
    ///
    /// * `body` - Operator command text, e.g. "CX,ON"
    ///
    /// # Returns
    ///
    /// * `Result<String>` - The framed command as queued for transmission
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::GroundStationError::EmptyCommand`] if the
    /// body is blank
    pub async fn send_command(&self, body: &str) -> Result<String> {
        let frame = self.lock_uplink().submit(body)?;

        let active = self.active.lock().await;
        let delivered = match active.as_ref().and_then(|handle| handle.uplink_tx()) {
            Some(tx) => tx.try_send(frame.clone()).is_ok(),
            None => false,
        };
        drop(active);

        if !delivered {
            warn!("No serial uplink available, command frame not transmitted: {}", frame);
            self.hub
                .publish(&StationEvent::Command(CommandNotice::dropped(body.trim())));
        }

        Ok(frame)
    }

    /// One-shot health report for operator tooling
    pub fn health(&self) -> HealthSnapshot {
        let command = self.lock_uplink().snapshot();
        self.status.health(command)
    }
}

impl Drop for GroundStation {
    fn drop(&mut self) {
        self.sweep.abort();
    }
}

/// Periodically turn expired pending commands into timeout notices
async fn sweep_expired_commands(uplink: Arc<Mutex<CommandUplink>>, hub: Arc<BroadcastHub>) {
    let mut ticker = tokio::time::interval(COMMAND_SWEEP_INTERVAL);
    loop {
        ticker.tick().await;

        let expired = match uplink.lock() {
            Ok(mut guard) => guard.check_timeout(),
            Err(poisoned) => poisoned.into_inner().check_timeout(),
        };

        if let Some(body) = expired {
            warn!("Command '{}' saw no echo before timing out", body);
            hub.publish(&StationEvent::Command(CommandNotice::timed_out(body)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GroundStationError;
    use crate::event::{CommandOutcome, SourceStatus};
    use crate::status::SourceState;
    use crate::uplink::CommandState;
    use tempfile::TempDir;
    use tokio::time::timeout;

    fn test_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.data_dir = dir.path().join("data").to_string_lossy().into_owned();
        config.log_dir = dir.path().join("logs").to_string_lossy().into_owned();
        config.serial.port = "/dev/nonexistent0".to_string();
        config.serial.reconnect_interval_ms = 10;
        config.sim.period_ms = 1;
        config
    }

    async fn recv_within(subscription: &mut Subscription) -> StationEvent {
        timeout(Duration::from_secs(5), subscription.recv())
            .await
            .expect("event within deadline")
            .expect("feed still open")
    }

    #[tokio::test]
    async fn test_initial_health_is_idle() {
        let dir = TempDir::new().unwrap();
        let station = GroundStation::new(test_config(&dir));

        let health = station.health();
        assert_eq!(health.source, SourceState::Idle);
        assert_eq!(health.received, 0);
        assert_eq!(health.lost, 0);
        assert!(health.persist_ok);
        assert!(health.command.is_none());
        assert!(health.log_path.is_none());
    }

    #[tokio::test]
    async fn test_sim_session_lifecycle() {
        let dir = TempDir::new().unwrap();
        let station = GroundStation::new(test_config(&dir));
        let mut subscription = station.subscribe();

        station.start_sim(1).await;

        match recv_within(&mut subscription).await {
            StationEvent::Source(notice) => {
                assert_eq!(notice.status, SourceStatus::Connected)
            }
            other => panic!("Expected source notice, got: {:?}", other),
        }
        match recv_within(&mut subscription).await {
            StationEvent::Telemetry(record) => assert_eq!(record.mode, "S"),
            other => panic!("Expected telemetry event, got: {:?}", other),
        }
        assert!(matches!(station.health().source, SourceState::Sim { .. }));

        station.stop().await;
        assert_eq!(station.health().source, SourceState::Idle);
        assert!(station.health().received >= 1);
        assert!(station.health().log_path.is_some());

        // A second stop with nothing running is a no-op
        station.stop().await;
    }

    #[tokio::test]
    async fn test_starting_serial_stops_sim_first() {
        let dir = TempDir::new().unwrap();
        let station = GroundStation::new(test_config(&dir));
        let mut subscription = station.subscribe();

        station.start_sim(1).await;
        station.start_serial().await;

        // The sim stops cleanly before serial takes over
        loop {
            match recv_within(&mut subscription).await {
                StationEvent::Source(notice)
                    if notice.status == SourceStatus::Stopped && notice.source == "simulation" =>
                {
                    break;
                }
                _ => {}
            }
        }

        // With no device present the serial session sits in reconnect
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(
            station.health().source,
            SourceState::Reconnecting { .. }
        ));

        station.stop().await;
        assert_eq!(station.health().source, SourceState::Idle);
    }

    #[tokio::test]
    async fn test_send_command_without_serial_is_dropped() {
        let dir = TempDir::new().unwrap();
        let station = GroundStation::new(test_config(&dir));
        let mut subscription = station.subscribe();

        let frame = station.send_command("CX,ON").await.unwrap();
        assert_eq!(frame, "CMD,1043,CX,ON");

        match recv_within(&mut subscription).await {
            StationEvent::Command(notice) => {
                assert_eq!(notice.outcome, CommandOutcome::Dropped);
                assert_eq!(notice.command.as_deref(), Some("CX,ON"));
            }
            other => panic!("Expected command notice, got: {:?}", other),
        }

        // The command still registers and shows up in health
        let command = station.health().command.unwrap();
        assert_eq!(command.body, "CX,ON");
        assert_eq!(command.state, CommandState::Pending);
    }

    #[tokio::test]
    async fn test_send_command_rejects_empty_body() {
        let dir = TempDir::new().unwrap();
        let station = GroundStation::new(test_config(&dir));
        assert!(matches!(
            station.send_command("  ").await,
            Err(GroundStationError::EmptyCommand)
        ));
    }

    #[tokio::test]
    async fn test_expired_command_swept_into_timeout_notice() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.command.echo_timeout_ms = 0;
        let station = GroundStation::new(config);
        let mut subscription = station.subscribe();

        station.send_command("CX,ON").await.unwrap();

        loop {
            match recv_within(&mut subscription).await {
                StationEvent::Command(notice) if notice.outcome == CommandOutcome::TimedOut => {
                    assert_eq!(notice.command.as_deref(), Some("CX,ON"));
                    break;
                }
                _ => {}
            }
        }

        let command = station.health().command.unwrap();
        assert_eq!(command.state, CommandState::TimedOut);
    }

    #[tokio::test]
    async fn test_unsubscribe_ends_viewer_feed() {
        let dir = TempDir::new().unwrap();
        let station = GroundStation::new(test_config(&dir));

        let mut subscription = station.subscribe();
        station.unsubscribe(subscription.id());
        assert!(subscription.recv().await.is_none());
    }
}
