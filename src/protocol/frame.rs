//! # Protocol Frames
//!
//! Typed view of the MAVLink messages the client consumes and sends.
//!
//! Inbound messages are a closed enum keyed by message kind, so every kind
//! the client understands has exactly one handler in the dispatcher.

/// System/component identity of a protocol endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity {
    pub system_id: u8,
    pub component_id: u8,
}

impl Identity {
    #[must_use]
    pub const fn new(system_id: u8, component_id: u8) -> Self {
        Self { system_id, component_id }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.system_id, self.component_id)
    }
}

/// Three-axis value
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// HEARTBEAT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatFrame {
    /// `false` when the sender reports `MAV_AUTOPILOT_INVALID` (another GCS)
    pub is_vehicle: bool,
}

/// LOCAL_POSITION_NED or ODOMETRY
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionFrame {
    pub position: Option<Vec3>,
    pub velocity: Option<Vec3>,
}

/// POSITION_TARGET_LOCAL_NED
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionTargetFrame {
    pub velocity: Vec3,
}

/// ATTITUDE
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttitudeFrame {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

/// HIGHRES_IMU
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuFrame {
    pub accel: Vec3,
    pub gyro: Vec3,
}

/// ALTITUDE (meters)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AltitudeFrame {
    pub amsl: f32,
    pub relative: f32,
}

/// GLOBAL_POSITION_INT (millimeters)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalPositionFrame {
    pub alt_mm: i32,
    pub relative_alt_mm: i32,
}

/// GPS_RAW_INT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpsRawFrame {
    pub satellites_visible: u8,

    /// Horizontal dilution in centimeters
    pub eph_cm: u16,

    /// Vertical dilution in centimeters
    pub epv_cm: u16,

    pub fix_type: u8,
}

/// SERVO_OUTPUT_RAW, outputs 1-8
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServoFrame {
    pub outputs: [Option<u16>; 8],
}

/// MISSION_COUNT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissionCountFrame {
    pub count: u16,
}

/// MISSION_ITEM (float coordinates)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MissionItemFrame {
    pub seq: u16,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// MISSION_ITEM_INT (coordinates in degrees × 10^7)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MissionItemIntFrame {
    pub seq: u16,
    pub x: i32,
    pub y: i32,
    pub z: f32,
}

/// Inbound frame, one variant per consumed message kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Frame {
    Heartbeat(HeartbeatFrame),
    LocalPositionNed(PositionFrame),
    Odometry(PositionFrame),
    PositionTargetLocalNed(PositionTargetFrame),
    Attitude(AttitudeFrame),
    HighresImu(ImuFrame),
    Altitude(AltitudeFrame),
    GlobalPositionInt(GlobalPositionFrame),
    GpsRawInt(GpsRawFrame),
    ServoOutputRaw(ServoFrame),
    MissionCount(MissionCountFrame),
    MissionItem(MissionItemFrame),
    MissionItemInt(MissionItemIntFrame),
    MissionCurrent { seq: u16 },
}

impl Frame {
    /// MAVLink message name of this frame
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Heartbeat(_) => "HEARTBEAT",
            Frame::LocalPositionNed(_) => "LOCAL_POSITION_NED",
            Frame::Odometry(_) => "ODOMETRY",
            Frame::PositionTargetLocalNed(_) => "POSITION_TARGET_LOCAL_NED",
            Frame::Attitude(_) => "ATTITUDE",
            Frame::HighresImu(_) => "HIGHRES_IMU",
            Frame::Altitude(_) => "ALTITUDE",
            Frame::GlobalPositionInt(_) => "GLOBAL_POSITION_INT",
            Frame::GpsRawInt(_) => "GPS_RAW_INT",
            Frame::ServoOutputRaw(_) => "SERVO_OUTPUT_RAW",
            Frame::MissionCount(_) => "MISSION_COUNT",
            Frame::MissionItem(_) => "MISSION_ITEM",
            Frame::MissionItemInt(_) => "MISSION_ITEM_INT",
            Frame::MissionCurrent { .. } => "MISSION_CURRENT",
        }
    }

    /// Whether this frame belongs to the mission protocol
    #[must_use]
    pub fn is_mission(&self) -> bool {
        matches!(
            self,
            Frame::MissionCount(_) | Frame::MissionItem(_) | Frame::MissionItemInt(_)
        )
    }
}

/// Frame received on a link, with the sender's identity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Inbound {
    pub sender: Identity,
    pub frame: Frame,
}

impl Inbound {
    #[must_use]
    pub fn new(sender: Identity, frame: Frame) -> Self {
        Self { sender, frame }
    }
}

/// MISSION_ACK result sent when every expected item arrived
pub const MISSION_ACK_ACCEPTED: u8 = 0;

/// MISSION_ACK result sent on timeout or incomplete download
pub const MISSION_ACK_ERROR: u8 = 1;

/// Frames the client sends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outbound {
    /// GCS heartbeat (once per second on the active link)
    Heartbeat,

    /// MISSION_REQUEST_LIST
    MissionRequestList,

    /// MISSION_REQUEST_INT for one sequence number
    MissionRequest { seq: u16 },

    /// MISSION_ACK with result code
    MissionAck { result: u8 },
}

impl Outbound {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Outbound::Heartbeat => "HEARTBEAT",
            Outbound::MissionRequestList => "MISSION_REQUEST_LIST",
            Outbound::MissionRequest { .. } => "MISSION_REQUEST_INT",
            Outbound::MissionAck { .. } => "MISSION_ACK",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mission_kinds() {
        assert!(Frame::MissionCount(MissionCountFrame { count: 1 }).is_mission());
        let item = MissionItemFrame { seq: 0, x: 0.0, y: 0.0, z: 0.0 };
        assert!(Frame::MissionItem(item).is_mission());
        assert!(!Frame::MissionCurrent { seq: 0 }.is_mission());
        assert!(!Frame::Heartbeat(HeartbeatFrame { is_vehicle: true }).is_mission());
    }

    #[test]
    fn test_identity_display() {
        assert_eq!(Identity::new(1, 1).to_string(), "1/1");
    }

    #[test]
    fn test_outbound_kind() {
        assert_eq!(Outbound::MissionRequest { seq: 3 }.kind(), "MISSION_REQUEST_INT");
        assert_eq!(Outbound::MissionAck { result: MISSION_ACK_ERROR }.kind(), "MISSION_ACK");
    }
}
