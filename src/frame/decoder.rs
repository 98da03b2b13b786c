//! # Telemetry Line Decoder
//!
//! Classifies raw downlink lines into telemetry records, recoverable decode
//! failures, or plain text (boot banners, header rows, debug prints).

use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

use super::schema::{GpsFix, TelemetryRecord, TELEMETRY_COLUMNS, WIRE_COLUMNS};

/// Why a line that looked like telemetry could not be decoded
///
/// Failures are data, not errors: the line is counted, logged, and dropped
/// while ingestion continues.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeFailure {
    /// CSV line with fewer than [`WIRE_COLUMNS`] fields
    TooFewFields { columns: usize },

    /// Line started with `{` but is not valid JSON
    NotJson(String),

    /// Valid JSON object without a `telemetry` key
    MissingTelemetryKey,

    /// A value had the wrong shape where a whole record depends on it
    TypeMismatch(String),
}

impl fmt::Display for DecodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFewFields { columns } => {
                write!(f, "too few fields: {} of {} required", columns, WIRE_COLUMNS)
            }
            Self::NotJson(detail) => write!(f, "not valid JSON: {}", detail),
            Self::MissingTelemetryKey => write!(f, "JSON object has no \"telemetry\" key"),
            Self::TypeMismatch(detail) => write!(f, "type mismatch: {}", detail),
        }
    }
}

/// Outcome of classifying one raw input line
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A well-formed telemetry record
    Telemetry(TelemetryRecord),

    /// A line that claimed to be telemetry but could not be decoded
    Failure(DecodeFailure),

    /// Anything else; surfaced for diagnostics, never an error
    PlainText(String),
}

/// Decodes raw downlink lines against the canonical schema
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    /// Team id assumed when a frame does not carry one
    default_team_id: u16,
}

impl FrameDecoder {
    /// Create a decoder for the given team id
    pub fn new(default_team_id: u16) -> Self {
        Self { default_team_id }
    }

    /// Classify and decode one raw input line
    ///
    /// The line is expected to be stripped of its trailing CR/LF by the
    /// reader; leading and trailing whitespace is ignored here anyway.
    ///
    /// # Arguments
    ///
    /// * `raw` - One line of downlink text
    ///
    /// # Returns
    ///
    /// * `Decoded` - Telemetry record, decode failure, or plain text
    pub fn decode_line(&self, raw: &str) -> Decoded {
        let line = raw.trim();

        if line.starts_with('{') {
            return self.decode_json(line);
        }

        if is_csv_candidate(line) {
            return self.decode_csv(line);
        }

        Decoded::PlainText(line.to_string())
    }

    /// Decode a comma-separated telemetry line
    ///
    /// Requires at least [`WIRE_COLUMNS`] fields; the ground-assigned
    /// columns are parsed when present so a persisted row re-ingests
    /// losslessly. Extra columns are ignored. Blank or garbled fields
    /// null that field only.
    fn decode_csv(&self, line: &str) -> Decoded {
        let cols: Vec<&str> = line.split(',').map(str::trim).collect();

        if cols.len() < WIRE_COLUMNS {
            return Decoded::Failure(DecodeFailure::TooFewFields { columns: cols.len() });
        }

        if cols.len() > TELEMETRY_COLUMNS {
            debug!(
                "CSV line has {} columns, ignoring {} extra",
                cols.len(),
                cols.len() - TELEMETRY_COLUMNS
            );
        }

        let col = |index: usize| cols.get(index).copied().unwrap_or("");

        let record = TelemetryRecord {
            // The candidate gate guarantees digits; out-of-range ids fall back
            team_id: cols[0].parse().unwrap_or(self.default_team_id),
            mission_time: opt_string(col(1)),
            packet_count: opt_u32(col(2), "PACKET_COUNT"),
            mode: col(3).to_string(),
            state: col(4).to_string(),
            altitude: opt_f64(col(5), "ALTITUDE"),
            temperature: opt_f64(col(6), "TEMPERATURE"),
            pressure: opt_f64(col(7), "PRESSURE"),
            voltage: opt_f64(col(8), "VOLTAGE"),
            current: None,
            gyro_r: opt_f64(col(9), "GYRO_R"),
            gyro_p: opt_f64(col(10), "GYRO_P"),
            gyro_y: opt_f64(col(11), "GYRO_Y"),
            accel_r: opt_f64(col(12), "ACCEL_R"),
            accel_p: opt_f64(col(13), "ACCEL_P"),
            accel_y: opt_f64(col(14), "ACCEL_Y"),
            mag_r: opt_f64(col(15), "MAG_R"),
            mag_p: opt_f64(col(16), "MAG_P"),
            mag_y: opt_f64(col(17), "MAG_Y"),
            auto_gyro_rate: opt_f64(col(18), "AUTO_GYRO_ROTATION_RATE"),
            gps: GpsFix {
                time: opt_string(col(19)),
                altitude: opt_f64(col(20), "GPS_ALTITUDE"),
                latitude: opt_f64(col(21), "GPS_LATITUDE"),
                longitude: opt_f64(col(22), "GPS_LONGITUDE"),
                sats: opt_u32(col(23), "GPS_SATS"),
            },
            cmd_echo: opt_string(col(24)),
            gs_timestamp: opt_timestamp(col(25)),
            gs_rx_count: opt_u64(col(26), "GS_RX_COUNT"),
            gs_loss_total: opt_u64(col(27), "GS_LOSS_TOTAL"),
            raw_line: Some(line.to_string()),
        };

        Decoded::Telemetry(record)
    }

    /// Decode a JSON telemetry frame
    ///
    /// The channels live under the `telemetry` key; identity and GPS fields
    /// sit beside it. Present but non-numeric channel values null that
    /// field only.
    fn decode_json(&self, line: &str) -> Decoded {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => return Decoded::Failure(DecodeFailure::NotJson(e.to_string())),
        };

        let obj = match value.as_object() {
            Some(obj) => obj,
            None => {
                return Decoded::Failure(DecodeFailure::TypeMismatch(
                    "top-level JSON value is not an object".to_string(),
                ))
            }
        };

        let telemetry = match obj.get("telemetry") {
            None => return Decoded::Failure(DecodeFailure::MissingTelemetryKey),
            Some(value) => match value.as_object() {
                Some(map) => map,
                None => {
                    return Decoded::Failure(DecodeFailure::TypeMismatch(
                        "\"telemetry\" value is not an object".to_string(),
                    ))
                }
            },
        };

        let gps = match obj.get("gps").and_then(Value::as_object) {
            Some(map) => GpsFix {
                time: json_string(map, "time"),
                altitude: json_f64(map, "altitude"),
                latitude: json_f64(map, "latitude"),
                longitude: json_f64(map, "longitude"),
                sats: json_u32(map, "sats"),
            },
            None => GpsFix::default(),
        };

        let record = TelemetryRecord {
            team_id: obj
                .get("team_id")
                .and_then(Value::as_u64)
                .and_then(|id| u16::try_from(id).ok())
                .unwrap_or(self.default_team_id),
            mission_time: json_string(obj, "mission_time"),
            packet_count: json_u32(obj, "packet_count"),
            mode: json_string(obj, "mode").unwrap_or_default(),
            state: json_string(obj, "state").unwrap_or_default(),
            altitude: json_f64(telemetry, "altitude"),
            temperature: json_f64(telemetry, "temperature"),
            pressure: json_f64(telemetry, "pressure"),
            voltage: json_f64(telemetry, "voltage"),
            current: json_f64(telemetry, "current"),
            gyro_r: json_f64(telemetry, "gyro_r"),
            gyro_p: json_f64(telemetry, "gyro_p"),
            gyro_y: json_f64(telemetry, "gyro_y"),
            accel_r: json_f64(telemetry, "accel_r"),
            accel_p: json_f64(telemetry, "accel_p"),
            accel_y: json_f64(telemetry, "accel_y"),
            mag_r: json_f64(telemetry, "mag_r"),
            mag_p: json_f64(telemetry, "mag_p"),
            mag_y: json_f64(telemetry, "mag_y"),
            auto_gyro_rate: json_f64(telemetry, "auto_gyro_rate"),
            gps,
            cmd_echo: json_string(obj, "cmd_echo"),
            gs_timestamp: None,
            gs_rx_count: None,
            gs_loss_total: None,
            raw_line: Some(line.to_string()),
        };

        Decoded::Telemetry(record)
    }
}

/// CSV candidate: has a comma and the first field is an all-digit team id.
/// Header rows and prose never pass this gate.
fn is_csv_candidate(line: &str) -> bool {
    match line.split_once(',') {
        Some((first, _)) => {
            let first = first.trim();
            !first.is_empty() && first.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

fn opt_string(field: &str) -> Option<String> {
    if field.is_empty() {
        None
    } else {
        Some(field.to_string())
    }
}

fn opt_f64(field: &str, name: &str) -> Option<f64> {
    if field.is_empty() {
        return None;
    }
    match field.parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        Ok(_) => {
            debug!("{} is not finite ({}), field nulled", name, field);
            None
        }
        Err(_) => {
            debug!("{} type mismatch ({}), field nulled", name, field);
            None
        }
    }
}

fn opt_u32(field: &str, name: &str) -> Option<u32> {
    opt_integer(field, name).and_then(|value| u32::try_from(value).ok())
}

fn opt_u64(field: &str, name: &str) -> Option<u64> {
    opt_integer(field, name)
}

/// Integer columns occasionally arrive as floats ("17.0"); accept those too
fn opt_integer(field: &str, name: &str) -> Option<u64> {
    if field.is_empty() {
        return None;
    }
    if let Ok(value) = field.parse::<u64>() {
        return Some(value);
    }
    match field.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Some(value as u64),
        _ => {
            debug!("{} type mismatch ({}), field nulled", name, field);
            None
        }
    }
}

fn opt_timestamp(field: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    if field.is_empty() {
        return None;
    }
    match chrono::DateTime::parse_from_rfc3339(field) {
        Ok(ts) => Some(ts.with_timezone(&chrono::Utc)),
        Err(_) => {
            debug!("GS_TIMESTAMP type mismatch ({}), field nulled", field);
            None
        }
    }
}

fn json_f64(map: &Map<String, Value>, key: &str) -> Option<f64> {
    let value = map.get(key)?;
    if value.is_null() {
        return None;
    }
    match value.as_f64() {
        Some(v) if v.is_finite() => Some(v),
        _ => {
            debug!("JSON field {} is not a finite number, field nulled", key);
            None
        }
    }
}

fn json_u32(map: &Map<String, Value>, key: &str) -> Option<u32> {
    let value = map.get(key)?;
    if value.is_null() {
        return None;
    }
    match value.as_u64().and_then(|v| u32::try_from(v).ok()) {
        Some(v) => Some(v),
        None => {
            debug!("JSON field {} is not an unsigned integer, field nulled", key);
            None
        }
    }
}

fn json_string(map: &Map<String, Value>, key: &str) -> Option<String> {
    let value = map.get(key)?;
    if value.is_null() {
        return None;
    }
    match value.as_str() {
        Some(s) if !s.is_empty() => Some(s.to_string()),
        Some(_) => None,
        None => {
            debug!("JSON field {} is not a string, field nulled", key);
            None
        }
    }
}
