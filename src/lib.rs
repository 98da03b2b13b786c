//! # Daedalus Ground Station Library
//!
//! Bridge between a CanSat's serial telemetry downlink and live dashboard
//! viewers.
//!
//! This library provides the core functionality for receiving, decoding,
//! persisting, and fanning out CanSat telemetry, along with command uplink
//! with echo confirmation and a built-in simulation source for desk
//! testing without a radio.

pub mod config;
pub mod error;
pub mod event;
pub mod flight_log;
pub mod frame;
pub mod hub;
pub mod ingest;
pub mod sequence;
pub mod source;
pub mod station;
pub mod status;
pub mod uplink;
