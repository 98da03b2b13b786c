//! # Flight CSV Row Encoder
//!
//! Renders telemetry records back into the canonical 28-column layout used
//! by the flight log. Null fields render as empty columns so a persisted
//! row decodes back to the same record.

use super::schema::{TelemetryRecord, TELEMETRY_COLUMNS};
use chrono::SecondsFormat;

/// Encode a record as one canonical CSV row (no line terminator)
///
/// # Arguments
///
/// * `record` - Record to render
///
/// # Returns
///
/// * `String` - 28 comma-separated columns in schema order
pub fn encode_csv_row(record: &TelemetryRecord) -> String {
    let mut cols: Vec<String> = Vec::with_capacity(TELEMETRY_COLUMNS);

    cols.push(format!("{:04}", record.team_id));
    cols.push(text_col(record.mission_time.as_deref()));
    cols.push(u64_col(record.packet_count.map(u64::from)));
    cols.push(text_col(Some(&record.mode)));
    cols.push(text_col(Some(&record.state)));
    cols.push(f64_col(record.altitude));
    cols.push(f64_col(record.temperature));
    cols.push(f64_col(record.pressure));
    cols.push(f64_col(record.voltage));
    cols.push(f64_col(record.gyro_r));
    cols.push(f64_col(record.gyro_p));
    cols.push(f64_col(record.gyro_y));
    cols.push(f64_col(record.accel_r));
    cols.push(f64_col(record.accel_p));
    cols.push(f64_col(record.accel_y));
    cols.push(f64_col(record.mag_r));
    cols.push(f64_col(record.mag_p));
    cols.push(f64_col(record.mag_y));
    cols.push(f64_col(record.auto_gyro_rate));
    cols.push(text_col(record.gps.time.as_deref()));
    cols.push(f64_col(record.gps.altitude));
    cols.push(f64_col(record.gps.latitude));
    cols.push(f64_col(record.gps.longitude));
    cols.push(u64_col(record.gps.sats.map(u64::from)));
    cols.push(text_col(record.cmd_echo.as_deref()));
    cols.push(match record.gs_timestamp {
        Some(ts) => ts.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => String::new(),
    });
    cols.push(u64_col(record.gs_rx_count));
    cols.push(u64_col(record.gs_loss_total));

    cols.join(",")
}

/// The layout is unquoted CSV, so text fields must not carry the delimiter.
/// Payload echoes drop commas on the wire anyway; this enforces the same
/// rule for locally synthesized records.
fn text_col(field: Option<&str>) -> String {
    match field {
        Some(text) => text.replace(',', ""),
        None => String::new(),
    }
}

fn f64_col(field: Option<f64>) -> String {
    match field {
        Some(value) => value.to_string(),
        None => String::new(),
    }
}

fn u64_col(field: Option<u64>) -> String {
    match field {
        Some(value) => value.to_string(),
        None => String::new(),
    }
}
