//! # Simulation Source
//!
//! Generates plausible telemetry without a radio so dashboards and the
//! persistence path can be exercised on a desk. The generator walks a
//! simple flight profile: a hold on the pad, powered ascent to a
//! randomized apogee, auto-gyro descent, landing. Records carry mode "S"
//! and feed the same pipeline a live downlink would.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::info;

use crate::event::{SourceNotice, StationEvent};
use crate::frame::schema::{GpsFix, TelemetryRecord, PACKET_COUNTER_MODULUS};
use crate::hub::BroadcastHub;
use crate::ingest::IngestPipeline;
use crate::source::{SessionHandle, SourceKind};
use crate::status::{SourceState, StationStatus};

/// Source descriptor shown in notices and health reports
const SIM_SOURCE_NAME: &str = "simulation";

/// Launch site reference coordinates for the generated GPS track
const BASE_LATITUDE: f64 = 38.4108;
const BASE_LONGITUDE: f64 = -79.5806;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    LaunchPad,
    Ascent,
    Apogee,
    Descent,
    Landed,
}

impl Phase {
    fn state_name(self) -> &'static str {
        match self {
            Phase::LaunchPad => "LAUNCH_PAD",
            Phase::Ascent => "ASCENT",
            Phase::Apogee => "APOGEE",
            Phase::Descent => "DESCENT",
            Phase::Landed => "LANDED",
        }
    }
}

/// Stateful telemetry generator walking one simulated flight
#[derive(Debug)]
pub struct SimTelemetry {
    team_id: u16,
    period_ms: u64,
    rng: StdRng,
    packet: u32,
    elapsed_ms: u64,
    phase: Phase,
    altitude: f64,
    climb_rate: f64,
    apogee_target: f64,
    temperature: f64,
    voltage: f64,
}

impl SimTelemetry {
    /// Generator with an operating-system seeded flight
    pub fn new(team_id: u16, period_ms: u64) -> Self {
        Self::with_rng(team_id, period_ms, StdRng::from_entropy())
    }

    /// Generator with a fixed seed, for reproducible flights
    pub fn seeded(team_id: u16, period_ms: u64, seed: u64) -> Self {
        Self::with_rng(team_id, period_ms, StdRng::seed_from_u64(seed))
    }

    fn with_rng(team_id: u16, period_ms: u64, mut rng: StdRng) -> Self {
        let apogee_target = rng.gen_range(480.0..560.0);
        Self {
            team_id,
            period_ms: period_ms.max(1),
            rng,
            packet: 0,
            elapsed_ms: 0,
            phase: Phase::LaunchPad,
            altitude: 0.0,
            climb_rate: 0.0,
            apogee_target,
            temperature: 24.0,
            voltage: 8.2,
        }
    }

    /// Produce the next record of the flight
    pub fn next_record(&mut self) -> TelemetryRecord {
        self.packet = (self.packet + 1) % PACKET_COUNTER_MODULUS;
        let mission_time = format_mission_time(self.elapsed_ms);
        let dt = self.period_ms as f64 / 1000.0;
        self.advance_profile(dt);

        self.temperature = (self.temperature + self.rng.gen_range(-0.05..0.05))
            .clamp(15.0, 30.0);
        self.voltage = (self.voltage - 0.0002 * dt).max(6.4);

        let in_flight = matches!(self.phase, Phase::Ascent | Phase::Apogee | Phase::Descent);
        let gyro_span = if in_flight { 25.0 } else { 2.0 };
        let auto_gyro_rate = if self.phase == Phase::Descent {
            round1(self.rng.gen_range(6.0..9.0))
        } else {
            0.0
        };

        // Standard atmosphere, in kPa
        let pressure = 101.325 * (1.0 - 2.25577e-5 * self.altitude).powf(5.25588)
            + self.rng.gen_range(-0.05..0.05);

        let record = TelemetryRecord {
            team_id: self.team_id,
            mission_time: Some(mission_time.clone()),
            packet_count: Some(self.packet),
            mode: "S".to_string(),
            state: self.phase.state_name().to_string(),
            altitude: Some(round1(self.altitude)),
            temperature: Some(round1(self.temperature - self.altitude * 0.0065)),
            pressure: Some(round1(pressure)),
            voltage: Some(round2(self.voltage + self.rng.gen_range(-0.02..0.02))),
            current: Some(round2(self.rng.gen_range(0.18..0.35))),
            gyro_r: Some(round2(self.rng.gen_range(-gyro_span..gyro_span))),
            gyro_p: Some(round2(self.rng.gen_range(-gyro_span..gyro_span))),
            gyro_y: Some(round2(self.rng.gen_range(-gyro_span..gyro_span))),
            accel_r: Some(round2(self.rng.gen_range(-1.5..1.5))),
            accel_p: Some(round2(self.rng.gen_range(-1.5..1.5))),
            accel_y: Some(round2(9.81 + self.climb_rate * 0.08 + self.rng.gen_range(-0.3..0.3))),
            mag_r: Some(round2(22.0 + self.rng.gen_range(-1.0..1.0))),
            mag_p: Some(round2(-4.0 + self.rng.gen_range(-1.0..1.0))),
            mag_y: Some(round2(43.0 + self.rng.gen_range(-1.0..1.0))),
            auto_gyro_rate: Some(auto_gyro_rate),
            gps: GpsFix {
                time: Some(mission_time),
                altitude: Some(round1(self.altitude + self.rng.gen_range(-3.0..3.0))),
                latitude: Some(round6(BASE_LATITUDE + self.rng.gen_range(-0.0005..0.0005))),
                longitude: Some(round6(BASE_LONGITUDE + self.rng.gen_range(-0.0005..0.0005))),
                sats: Some(self.rng.gen_range(5..13)),
            },
            cmd_echo: None,
            ..Default::default()
        };

        self.elapsed_ms += self.period_ms;
        record
    }

    fn advance_profile(&mut self, dt: f64) {
        match self.phase {
            Phase::LaunchPad => {
                if self.elapsed_ms >= 5_000 {
                    self.phase = Phase::Ascent;
                }
            }
            Phase::Ascent => {
                self.climb_rate = (self.climb_rate + self.rng.gen_range(1.5..3.0)).min(16.0);
                self.altitude += self.climb_rate * dt;
                if self.altitude >= self.apogee_target {
                    self.phase = Phase::Apogee;
                }
            }
            Phase::Apogee => {
                self.climb_rate = 0.0;
                self.phase = Phase::Descent;
            }
            Phase::Descent => {
                self.climb_rate = -self.rng.gen_range(4.0..6.0);
                self.altitude += self.climb_rate * dt;
                if self.altitude <= 0.0 {
                    self.altitude = 0.0;
                    self.climb_rate = 0.0;
                    self.phase = Phase::Landed;
                }
            }
            Phase::Landed => {}
        }
    }
}

fn format_mission_time(elapsed_ms: u64) -> String {
    let total_s = elapsed_ms / 1000;
    format!(
        "{:02}:{:02}:{:02}",
        total_s / 3600 % 24,
        total_s / 60 % 60,
        total_s % 60
    )
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// Start a simulation session task and hand back its control handle
pub fn spawn(
    team_id: u16,
    period_ms: u64,
    pipeline: IngestPipeline,
    hub: Arc<BroadcastHub>,
    status: Arc<StationStatus>,
) -> SessionHandle {
    let (stop_tx, stop_rx) = watch::channel(false);
    let generator = SimTelemetry::new(team_id, period_ms);

    let task = tokio::spawn(run(generator, period_ms, pipeline, hub, status, stop_rx));
    SessionHandle::new(SourceKind::Sim, stop_tx, None, task)
}

async fn run(
    mut generator: SimTelemetry,
    period_ms: u64,
    mut pipeline: IngestPipeline,
    hub: Arc<BroadcastHub>,
    status: Arc<StationStatus>,
    mut stop_rx: watch::Receiver<bool>,
) {
    info!("Simulation source running at {} ms per record", period_ms);
    status.set_source(SourceState::Sim { period_ms });
    hub.publish(&StationEvent::Source(SourceNotice::connected(SIM_SOURCE_NAME)));

    let mut ticker = interval(Duration::from_millis(period_ms.max(1)));
    loop {
        tokio::select! {
            biased;

            changed = stop_rx.changed() => {
                let _ = changed;
                break;
            }

            _ = ticker.tick() => {
                let record = generator.next_record();
                pipeline.process_record(record);
            }
        }
    }

    info!("Simulation source stopped");
    hub.publish(&StationEvent::Source(SourceNotice::stopped(SIM_SOURCE_NAME)));
    status.set_source(SourceState::Idle);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::SourceStatus;
    use crate::uplink::CommandUplink;
    use std::sync::Mutex;
    use tempfile::tempdir;
    use tokio::time::timeout;

    #[test]
    fn test_packets_start_at_one_and_wrap() {
        let mut generator = SimTelemetry::seeded(1043, 1000, 7);

        for call in 1..=10_000u32 {
            let record = generator.next_record();
            match call {
                1 => assert_eq!(record.packet_count, Some(1)),
                9_999 => assert_eq!(record.packet_count, Some(9_999)),
                10_000 => assert_eq!(record.packet_count, Some(0)),
                _ => {}
            }
        }
    }

    #[test]
    fn test_seeded_flights_are_reproducible() {
        let mut first = SimTelemetry::seeded(1043, 1000, 42);
        let mut second = SimTelemetry::seeded(1043, 1000, 42);

        for _ in 0..50 {
            assert_eq!(first.next_record(), second.next_record());
        }
    }

    #[test]
    fn test_profile_flies_pad_to_landing() {
        let mut generator = SimTelemetry::seeded(1043, 1000, 11);
        let mut states_seen = Vec::new();

        for _ in 0..2_000 {
            let record = generator.next_record();
            assert_eq!(record.mode, "S");
            assert!(record.altitude.unwrap() >= 0.0);

            if states_seen.last() != Some(&record.state) {
                states_seen.push(record.state.clone());
            }
            if record.state == "DESCENT" {
                assert!(record.auto_gyro_rate.unwrap() > 0.0);
            }
            if record.state == "LANDED" {
                assert_eq!(record.altitude, Some(0.0));
                break;
            }
        }

        assert_eq!(
            states_seen,
            vec!["LAUNCH_PAD", "ASCENT", "APOGEE", "DESCENT", "LANDED"]
        );
    }

    #[test]
    fn test_generated_values_stay_plausible() {
        let mut generator = SimTelemetry::seeded(1043, 1000, 3);

        for _ in 0..200 {
            let record = generator.next_record();
            let voltage = record.voltage.unwrap();
            let pressure = record.pressure.unwrap();
            let temperature = record.temperature.unwrap();

            assert!((6.0..9.0).contains(&voltage), "voltage {}", voltage);
            assert!((80.0..110.0).contains(&pressure), "pressure {}", pressure);
            assert!((0.0..40.0).contains(&temperature), "temperature {}", temperature);
            assert!(record.gps.sats.unwrap() >= 5);
            assert!(record.cmd_echo.is_none());
        }
    }

    #[test]
    fn test_mission_time_formats_as_hms() {
        assert_eq!(format_mission_time(0), "00:00:00");
        assert_eq!(format_mission_time(59_000), "00:00:59");
        assert_eq!(format_mission_time(3_723_000), "01:02:03");
    }

    #[tokio::test]
    async fn test_session_emits_records_until_stopped() {
        let dir = tempdir().unwrap();
        let hub = Arc::new(BroadcastHub::new(256));
        let uplink = Arc::new(Mutex::new(CommandUplink::new(1043, Duration::from_secs(10))));
        let status = Arc::new(StationStatus::new());
        let mut subscription = hub.subscribe();
        let pipeline = IngestPipeline::new(
            1043,
            dir.path(),
            Arc::clone(&hub),
            uplink,
            Arc::clone(&status),
        );

        let handle = spawn(1043, 1, pipeline, Arc::clone(&hub), Arc::clone(&status));

        match timeout(Duration::from_secs(5), subscription.recv())
            .await
            .unwrap()
            .unwrap()
        {
            StationEvent::Source(notice) => {
                assert_eq!(notice.status, SourceStatus::Connected);
                assert_eq!(notice.source, SIM_SOURCE_NAME);
            }
            other => panic!("Expected source notice, got: {:?}", other),
        }

        for _ in 0..3 {
            match timeout(Duration::from_secs(5), subscription.recv())
                .await
                .unwrap()
                .unwrap()
            {
                StationEvent::Telemetry(record) => assert_eq!(record.mode, "S"),
                other => panic!("Expected telemetry event, got: {:?}", other),
            }
        }

        timeout(Duration::from_secs(5), handle.stop()).await.unwrap();
        assert_eq!(status.source(), SourceState::Idle);
        assert!(status.received() >= 3);

        // Drain until the stopped notice arrives
        loop {
            match timeout(Duration::from_secs(5), subscription.recv())
                .await
                .unwrap()
                .unwrap()
            {
                StationEvent::Source(notice) if notice.status == SourceStatus::Stopped => break,
                _ => {}
            }
        }
    }
}
