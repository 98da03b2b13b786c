//! # Telemetry Frame Module
//!
//! Wire formats for the CanSat downlink.
//!
//! This module handles:
//! - The canonical 28-column CSV layout (25 wire columns + 3 ground-assigned)
//! - JSON telemetry frames carrying channels under a `telemetry` key
//! - Line classification: telemetry record, decode failure, or plain text
//! - Rendering accepted records back to flight log rows

pub mod schema;
pub mod decoder;
pub mod encoder;
