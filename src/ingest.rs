//! # Ingest Pipeline
//!
//! The single path every downlink line takes: decode, track sequence
//! numbers, stamp ground-side fields, persist, broadcast, and correlate
//! command echoes. One pipeline exists per source session and exclusively
//! owns its tracker and flight log, so the hot path takes no locks except
//! a short one around the shared uplink manager when an echo changes.

use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::event::{CommandNotice, StationEvent};
use crate::flight_log::FlightLog;
use crate::frame::decoder::{Decoded, FrameDecoder};
use crate::frame::schema::TelemetryRecord;
use crate::hub::BroadcastHub;
use crate::sequence::SequenceTracker;
use crate::status::StationStatus;
use crate::uplink::{CommandUplink, EchoOutcome};

/// Per-session ingestion state
pub struct IngestPipeline {
    decoder: FrameDecoder,
    tracker: SequenceTracker,
    flight_log: FlightLog,
    hub: Arc<BroadcastHub>,
    uplink: Arc<Mutex<CommandUplink>>,
    status: Arc<StationStatus>,
    last_timestamp: Option<DateTime<Utc>>,
    decode_failures: u64,
}

impl IngestPipeline {
    /// Build a pipeline for a fresh source session
    ///
    /// Session counters start at zero and the flight log is opened eagerly
    /// so a bad data directory shows up in the logs at session start, not
    /// at the first packet. Persistence trouble degrades the session; it
    /// never prevents one.
    pub fn new(
        team_id: u16,
        data_dir: &Path,
        hub: Arc<BroadcastHub>,
        uplink: Arc<Mutex<CommandUplink>>,
        status: Arc<StationStatus>,
    ) -> Self {
        let mut flight_log = FlightLog::new(data_dir, team_id);

        status.reset_counts();
        status.set_log_path(Some(flight_log.path().to_path_buf()));
        match flight_log.ensure_open() {
            Ok(()) => status.set_persist_ok(true),
            Err(error) => {
                warn!(
                    "Flight log unavailable, telemetry will broadcast without persistence: {}",
                    error
                );
                status.set_persist_ok(false);
            }
        }

        Self {
            decoder: FrameDecoder::new(team_id),
            tracker: SequenceTracker::new(),
            flight_log,
            hub,
            uplink,
            status,
            last_timestamp: None,
            decode_failures: 0,
        }
    }

    fn lock_uplink(&self) -> MutexGuard<'_, CommandUplink> {
        match self.uplink.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Ingest one raw line from the active source
    pub fn process_line(&mut self, raw: &str) {
        match self.decoder.decode_line(raw) {
            Decoded::Telemetry(record) => self.process_record(record),
            Decoded::Failure(failure) => {
                self.decode_failures += 1;
                warn!(
                    "Discarding malformed telemetry line ({} so far): {}",
                    self.decode_failures, failure
                );
            }
            Decoded::PlainText(text) => {
                info!("Non-telemetry line from source: {}", text);
            }
        }
    }

    /// Enrich, persist, and broadcast one record, decoded or synthesized
    pub(crate) fn process_record(&mut self, mut record: TelemetryRecord) {
        let counts = self.tracker.observe(record.packet_count);
        record.gs_rx_count = Some(counts.accepted);
        record.gs_loss_total = Some(counts.lost);
        record.gs_timestamp = Some(self.next_timestamp());
        self.status.set_counts(counts.accepted, counts.lost);

        match self.flight_log.append(&record) {
            Ok(()) => {
                if !self.status.persist_ok() {
                    info!(
                        "Flight log writable again: {}",
                        self.flight_log.path().display()
                    );
                    self.status.set_persist_ok(true);
                }
            }
            Err(error) => {
                if self.status.persist_ok() {
                    warn!("Flight log write failed, continuing without persistence: {}", error);
                } else {
                    debug!("Flight log still unavailable: {}", error);
                }
                self.status.set_persist_ok(false);
            }
        }

        let echo = record.cmd_echo.clone();
        self.hub.publish(&StationEvent::Telemetry(record));

        if let Some(echo) = echo {
            self.correlate_echo(&echo);
        }
    }

    /// Ground timestamps never run backwards within a session
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_timestamp {
            if now < last {
                now = last;
            }
        }
        self.last_timestamp = Some(now);
        now
    }

    fn correlate_echo(&mut self, echo: &str) {
        let outcome = self.lock_uplink().on_echo(echo);
        match outcome {
            EchoOutcome::Confirmed { body, latency } => {
                let latency_ms = latency.as_millis() as u64;
                info!("Command '{}' confirmed by payload after {} ms", body, latency_ms);
                self.hub
                    .publish(&StationEvent::Command(CommandNotice::confirmed(body, latency_ms)));
            }
            EchoOutcome::Unsolicited { echo } => {
                debug!("Unsolicited command echo: {}", echo);
                self.hub
                    .publish(&StationEvent::Command(CommandNotice::unsolicited(echo)));
            }
            EchoOutcome::Duplicate => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::CommandOutcome;
    use crate::hub::Subscription;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    fn wire_line(packet: u32, echo: &str) -> String {
        format!(
            "1043,00:12:45,{},F,ASCENT,512.3,21.4,96.1,5.02,\
             0.5,-0.3,0.1,0.02,0.01,9.81,0.12,0.33,0.41,4.5,\
             00:12:44,508.2,13.7563,100.5018,7,{}",
            packet, echo
        )
    }

    struct Fixture {
        pipeline: IngestPipeline,
        subscription: Subscription,
        uplink: Arc<Mutex<CommandUplink>>,
        status: Arc<StationStatus>,
    }

    fn fixture(data_dir: &Path) -> Fixture {
        let hub = Arc::new(BroadcastHub::new(64));
        let uplink = Arc::new(Mutex::new(CommandUplink::new(1043, Duration::from_secs(10))));
        let status = Arc::new(StationStatus::new());
        let subscription = hub.subscribe();
        let pipeline = IngestPipeline::new(
            1043,
            data_dir,
            Arc::clone(&hub),
            Arc::clone(&uplink),
            Arc::clone(&status),
        );
        Fixture { pipeline, subscription, uplink, status }
    }

    fn expect_telemetry(event: StationEvent) -> TelemetryRecord {
        match event {
            StationEvent::Telemetry(record) => record,
            other => panic!("Expected telemetry event, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_record_persisted_and_broadcast() {
        let dir = tempdir().unwrap();
        let mut fx = fixture(dir.path());

        fx.pipeline.process_line(&wire_line(17, ""));

        let record = expect_telemetry(fx.subscription.recv().await.unwrap());
        assert_eq!(record.packet_count, Some(17));
        assert_eq!(record.gs_rx_count, Some(1));
        assert_eq!(record.gs_loss_total, Some(0));
        assert!(record.gs_timestamp.is_some());

        let content = fs::read_to_string(dir.path().join("Flight_1043.csv")).unwrap();
        assert_eq!(content.split("\r\n").filter(|l| !l.is_empty()).count(), 2);
    }

    #[tokio::test]
    async fn test_persists_with_no_subscribers() {
        let dir = tempdir().unwrap();
        let hub = Arc::new(BroadcastHub::new(64));
        let uplink = Arc::new(Mutex::new(CommandUplink::new(1043, Duration::from_secs(10))));
        let status = Arc::new(StationStatus::new());
        let mut pipeline =
            IngestPipeline::new(1043, dir.path(), Arc::clone(&hub), uplink, Arc::clone(&status));

        pipeline.process_line(&wire_line(1, ""));
        pipeline.process_line(&wire_line(2, ""));

        let content = fs::read_to_string(dir.path().join("Flight_1043.csv")).unwrap();
        let rows: Vec<&str> = content.split("\r\n").filter(|l| !l.is_empty()).collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[1].contains(",1,F,"));
        assert!(rows[2].contains(",2,F,"));
        assert_eq!(status.received(), 2);
    }

    #[tokio::test]
    async fn test_gap_and_duplicate_accounting() {
        let dir = tempdir().unwrap();
        let mut fx = fixture(dir.path());

        for packet in [1, 2, 3, 5, 5, 7] {
            fx.pipeline.process_line(&wire_line(packet, ""));
        }

        assert_eq!(fx.status.received(), 6);
        assert_eq!(fx.status.lost(), 2);

        let mut last = None;
        for _ in 0..6 {
            last = Some(expect_telemetry(fx.subscription.recv().await.unwrap()));
        }
        let last = last.unwrap();
        assert_eq!(last.gs_rx_count, Some(6));
        assert_eq!(last.gs_loss_total, Some(2));
    }

    #[tokio::test]
    async fn test_malformed_line_never_stops_the_session() {
        let dir = tempdir().unwrap();
        let mut fx = fixture(dir.path());

        fx.pipeline.process_line("1043,only,three");
        fx.pipeline.process_line(&wire_line(9, ""));

        let record = expect_telemetry(fx.subscription.recv().await.unwrap());
        assert_eq!(record.packet_count, Some(9));
        assert_eq!(fx.status.received(), 1);
    }

    #[tokio::test]
    async fn test_plain_text_logged_not_broadcast() {
        let dir = tempdir().unwrap();
        let mut fx = fixture(dir.path());

        fx.pipeline.process_line("payload booting");
        fx.pipeline.process_line(&wire_line(1, ""));

        // The first event in the feed is the telemetry record
        let record = expect_telemetry(fx.subscription.recv().await.unwrap());
        assert_eq!(record.packet_count, Some(1));
    }

    #[tokio::test]
    async fn test_persistence_failure_degrades_but_broadcasts() {
        let dir = tempdir().unwrap();
        // Occupy the CSV path so every open fails
        fs::create_dir(dir.path().join("Flight_1043.csv")).unwrap();
        let mut fx = fixture(dir.path());

        assert!(!fx.status.persist_ok());

        fx.pipeline.process_line(&wire_line(4, ""));
        let record = expect_telemetry(fx.subscription.recv().await.unwrap());
        assert_eq!(record.packet_count, Some(4));
        assert!(!fx.status.persist_ok());
    }

    #[tokio::test]
    async fn test_persistence_recovers_when_path_clears() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("Flight_1043.csv");
        fs::create_dir(&blocker).unwrap();
        let mut fx = fixture(dir.path());

        fx.pipeline.process_line(&wire_line(1, ""));
        assert!(!fx.status.persist_ok());

        fs::remove_dir(&blocker).unwrap();
        fx.pipeline.process_line(&wire_line(2, ""));
        assert!(fx.status.persist_ok());

        // Only the record after recovery made it to disk
        let content = fs::read_to_string(&blocker).unwrap();
        assert_eq!(content.split("\r\n").filter(|l| !l.is_empty()).count(), 2);
    }

    #[tokio::test]
    async fn test_echo_confirms_pending_command() {
        let dir = tempdir().unwrap();
        let mut fx = fixture(dir.path());

        fx.uplink.lock().unwrap().submit("CXON").unwrap();
        fx.pipeline.process_line(&wire_line(17, "CXON"));

        let record = expect_telemetry(fx.subscription.recv().await.unwrap());
        assert_eq!(record.cmd_echo.as_deref(), Some("CXON"));

        match fx.subscription.recv().await.unwrap() {
            StationEvent::Command(notice) => {
                assert_eq!(notice.outcome, CommandOutcome::Confirmed);
                assert_eq!(notice.command.as_deref(), Some("CXON"));
                assert!(notice.latency_ms.is_some());
            }
            other => panic!("Expected command notice, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_repeated_echo_notifies_once() {
        let dir = tempdir().unwrap();
        let mut fx = fixture(dir.path());

        fx.uplink.lock().unwrap().submit("CXON").unwrap();
        fx.pipeline.process_line(&wire_line(17, "CXON"));
        fx.pipeline.process_line(&wire_line(18, "CXON"));
        fx.pipeline.process_line(&wire_line(19, ""));

        // One confirmation between the telemetry records, nothing more
        expect_telemetry(fx.subscription.recv().await.unwrap());
        assert!(matches!(
            fx.subscription.recv().await.unwrap(),
            StationEvent::Command(_)
        ));
        assert_eq!(
            expect_telemetry(fx.subscription.recv().await.unwrap()).packet_count,
            Some(18)
        );
        assert_eq!(
            expect_telemetry(fx.subscription.recv().await.unwrap()).packet_count,
            Some(19)
        );
    }

    #[tokio::test]
    async fn test_unsolicited_echo_broadcast() {
        let dir = tempdir().unwrap();
        let mut fx = fixture(dir.path());

        fx.pipeline.process_line(&wire_line(17, "CXOFF"));

        expect_telemetry(fx.subscription.recv().await.unwrap());
        match fx.subscription.recv().await.unwrap() {
            StationEvent::Command(notice) => {
                assert_eq!(notice.outcome, CommandOutcome::Unsolicited);
                assert_eq!(notice.echo.as_deref(), Some("CXOFF"));
            }
            other => panic!("Expected command notice, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_new_pipeline_resets_session_counters() {
        let dir = tempdir().unwrap();
        let mut fx = fixture(dir.path());
        fx.pipeline.process_line(&wire_line(1, ""));
        fx.pipeline.process_line(&wire_line(5, ""));
        assert_eq!(fx.status.lost(), 3);

        let hub = Arc::new(BroadcastHub::new(64));
        let uplink = Arc::new(Mutex::new(CommandUplink::new(1043, Duration::from_secs(10))));
        let _second = IngestPipeline::new(
            1043,
            dir.path(),
            hub,
            uplink,
            Arc::clone(&fx.status),
        );
        assert_eq!(fx.status.received(), 0);
        assert_eq!(fx.status.lost(), 0);
    }

    #[tokio::test]
    async fn test_ground_timestamps_never_decrease() {
        let dir = tempdir().unwrap();
        let mut fx = fixture(dir.path());

        for packet in 1..=5 {
            fx.pipeline.process_line(&wire_line(packet, ""));
        }

        let mut previous: Option<DateTime<Utc>> = None;
        for _ in 0..5 {
            let record = expect_telemetry(fx.subscription.recv().await.unwrap());
            let stamp = record.gs_timestamp.unwrap();
            if let Some(previous) = previous {
                assert!(stamp >= previous);
            }
            previous = Some(stamp);
        }
    }
}
