//! # mavviz Library
//!
//! Ground-station telemetry client for MAVLink autopilots over UDP.
//!
//! This library keeps live links to a flight controller, records streamed
//! telemetry into bounded per-channel buffers, and downloads the stored
//! mission with the MAVLink mission protocol. A rendering consumer reads the
//! buffers through a [`telemetry::TelemetryView`].

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod link;
pub mod mission;
pub mod protocol;
pub mod telemetry;
