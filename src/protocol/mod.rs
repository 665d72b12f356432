//! # Protocol Module
//!
//! MAVLink message handling on top of the `mavlink` crate.
//!
//! This module handles:
//! - Typed inbound frames for the consumed message kinds
//! - Outbound heartbeat and mission-protocol frames
//! - Mapping to and from `mavlink::common::MavMessage`

pub mod codec;
pub mod frame;

pub use frame::{Frame, Identity, Inbound, Outbound};
