//! # Telemetry Samples
//!
//! One sample type per telemetry channel. Every sample carries the session
//! timestamp assigned at dispatch (`t`, seconds since session start).

/// Local position in meters (NED frame)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    pub t: f64,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Measured velocity with the setpoint that was current at the same index
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocitySample {
    pub t: f64,

    /// Measured velocity in m/s
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,

    /// Velocity setpoint in m/s
    pub vx_sp: f32,
    pub vy_sp: f32,
    pub vz_sp: f32,
}

/// Vehicle attitude in radians
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttitudeSample {
    pub t: f64,
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

/// High-resolution IMU reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuSample {
    pub t: f64,

    /// Acceleration in m/s²
    pub ax: f32,
    pub ay: f32,
    pub az: f32,

    /// Angular rate in rad/s
    pub gx: f32,
    pub gy: f32,
    pub gz: f32,
}

/// Altitude in meters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AltitudeSample {
    pub t: f64,

    /// Altitude above mean sea level
    pub amsl: f32,

    /// Altitude relative to home
    pub relative: f32,
}

/// GPS receiver quality
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsSample {
    pub t: f64,

    /// Number of visible satellites
    pub satellites: u8,

    /// Horizontal dilution in meters
    pub eph: f32,

    /// Vertical dilution in meters
    pub epv: f32,

    /// Fix type (0 = no GPS, 3 = 3D fix, ...)
    pub fix_type: u8,
}

/// Number of servo outputs recorded
pub const SERVO_CHANNELS: usize = 8;

/// PWM value recorded for a servo output the autopilot did not report
pub const SERVO_DEFAULT_PWM: u16 = 1500;

/// Raw servo outputs (PWM microseconds)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServoSample {
    pub t: f64,
    pub channels: [u16; SERVO_CHANNELS],
}

/// Any telemetry sample, tagged by channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TelemetrySample {
    Position(PositionSample),
    Velocity(VelocitySample),
    Attitude(AttitudeSample),
    Imu(ImuSample),
    Altitude(AltitudeSample),
    Gps(GpsSample),
    Servo(ServoSample),
}

impl TelemetrySample {
    /// Channel this sample belongs to.
    #[must_use]
    pub fn channel(&self) -> Channel {
        match self {
            Self::Position(_) => Channel::Position,
            Self::Velocity(_) => Channel::Velocity,
            Self::Attitude(_) => Channel::Attitude,
            Self::Imu(_) => Channel::Imu,
            Self::Altitude(_) => Channel::Altitude,
            Self::Gps(_) => Channel::Gps,
            Self::Servo(_) => Channel::Servo,
        }
    }

    /// Session timestamp of this sample.
    #[must_use]
    pub fn timestamp(&self) -> f64 {
        match self {
            Self::Position(s) => s.t,
            Self::Velocity(s) => s.t,
            Self::Attitude(s) => s.t,
            Self::Imu(s) => s.t,
            Self::Altitude(s) => s.t,
            Self::Gps(s) => s.t,
            Self::Servo(s) => s.t,
        }
    }
}

/// Telemetry channel identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Position,
    Velocity,
    Attitude,
    Imu,
    Altitude,
    Gps,
    Servo,
}

impl Channel {
    /// All channels, in display order.
    pub const ALL: [Channel; 7] = [
        Channel::Position,
        Channel::Velocity,
        Channel::Attitude,
        Channel::Imu,
        Channel::Altitude,
        Channel::Gps,
        Channel::Servo,
    ];

    /// Lowercase channel name used in logs
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Channel::Position => "position",
            Channel::Velocity => "velocity",
            Channel::Attitude => "attitude",
            Channel::Imu => "imu",
            Channel::Altitude => "altitude",
            Channel::Gps => "gps",
            Channel::Servo => "servo",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
