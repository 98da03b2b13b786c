//! # Telemetry Frame Schema
//!
//! Canonical column layout and record types for the CanSat telemetry link.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Total columns in the canonical CSV layout (wire fields + ground-assigned)
pub const TELEMETRY_COLUMNS: usize = 28;

/// Columns a live radio line carries; the ground station appends the rest
pub const WIRE_COLUMNS: usize = 25;

/// Source packet counters are small and cyclic; gap math wraps at this width
pub const PACKET_COUNTER_MODULUS: u32 = 10_000;

/// Header row of the flight CSV, one name per canonical column
pub const CSV_HEADER: &str = "TEAM_ID,MISSION_TIME,PACKET_COUNT,MODE,STATE,\
ALTITUDE,TEMPERATURE,PRESSURE,VOLTAGE,\
GYRO_R,GYRO_P,GYRO_Y,ACCEL_R,ACCEL_P,ACCEL_Y,MAG_R,MAG_P,MAG_Y,\
AUTO_GYRO_ROTATION_RATE,\
GPS_TIME,GPS_ALTITUDE,GPS_LATITUDE,GPS_LONGITUDE,GPS_SATS,\
CMD_ECHO,GS_TIMESTAMP,GS_RX_COUNT,GS_LOSS_TOTAL";

/// GPS sub-record reported by the payload
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GpsFix {
    /// GPS time of day (HH:MM:SS), if the receiver has a fix
    pub time: Option<String>,

    /// GPS altitude in meters
    pub altitude: Option<f64>,

    /// Latitude in decimal degrees
    pub latitude: Option<f64>,

    /// Longitude in decimal degrees
    pub longitude: Option<f64>,

    /// Number of satellites in the fix
    pub sats: Option<u32>,
}

/// One decoded telemetry record
///
/// Wire fields come off the radio; the `gs_*` fields are assigned by the
/// ground station when the record is accepted. Any wire field the payload
/// left blank or garbled is `None`; the record is still usable.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetryRecord {
    /// Numeric team identifier (zero-padded to four digits on the wire)
    pub team_id: u16,

    /// Mission time since power-on (HH:MM:SS)
    pub mission_time: Option<String>,

    /// Source packet counter, wraps at [`PACKET_COUNTER_MODULUS`]
    pub packet_count: Option<u32>,

    /// Flight mode flag ("F" flight, "S" simulation)
    pub mode: String,

    /// Flight software state (e.g. ASCENT, DESCENT, LANDED)
    pub state: String,

    /// Barometric altitude in meters
    pub altitude: Option<f64>,

    /// Air temperature in degrees Celsius
    pub temperature: Option<f64>,

    /// Air pressure in kPa
    pub pressure: Option<f64>,

    /// Bus voltage in volts
    pub voltage: Option<f64>,

    /// Bus current in amperes; carried by the JSON frame form only,
    /// the CSV layout has no current column
    pub current: Option<f64>,

    /// Gyro roll rate in deg/s
    pub gyro_r: Option<f64>,

    /// Gyro pitch rate in deg/s
    pub gyro_p: Option<f64>,

    /// Gyro yaw rate in deg/s
    pub gyro_y: Option<f64>,

    /// Accelerometer roll axis in m/s^2
    pub accel_r: Option<f64>,

    /// Accelerometer pitch axis in m/s^2
    pub accel_p: Option<f64>,

    /// Accelerometer yaw axis in m/s^2
    pub accel_y: Option<f64>,

    /// Magnetometer roll axis in gauss
    pub mag_r: Option<f64>,

    /// Magnetometer pitch axis in gauss
    pub mag_p: Option<f64>,

    /// Magnetometer yaw axis in gauss
    pub mag_y: Option<f64>,

    /// Auto-gyro rotation rate in deg/s
    pub auto_gyro_rate: Option<f64>,

    /// GPS sub-record
    pub gps: GpsFix,

    /// Last command the payload echoed back, if any
    pub cmd_echo: Option<String>,

    /// Ground receive timestamp, assigned on acceptance
    pub gs_timestamp: Option<DateTime<Utc>>,

    /// Ground receive counter, assigned on acceptance
    pub gs_rx_count: Option<u64>,

    /// Ground cumulative loss counter, assigned on acceptance
    pub gs_loss_total: Option<u64>,

    /// Raw input line the record was decoded from, when it came off the wire
    pub raw_line: Option<String>,
}
