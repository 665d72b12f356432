//! # Telemetry Module
//!
//! Bounded in-memory telemetry for the rendering consumer.
//!
//! This module handles:
//! - Session time axis (strictly increasing timestamps)
//! - Fixed-capacity FIFO series per channel
//! - Shared store with read-only snapshots for the renderer

pub mod sample;
pub mod series;
pub mod store;
pub mod time;

pub use sample::{Channel, TelemetrySample};
pub use store::{TelemetryStore, TelemetryView};
pub use time::TimeNormalizer;
