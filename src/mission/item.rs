//! # Mission Items
//!
//! A mission item is one waypoint of the mission stored on the autopilot.

/// Scale of integer-encoded coordinates in `MISSION_ITEM_INT` (degrees × 10^7)
pub const COORDINATE_SCALE: f64 = 1e7;

/// One waypoint, identified by its sequence number
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MissionItem {
    /// Position in the mission (0-based)
    pub seq: u16,

    /// Latitude or local x
    pub x: f64,

    /// Longitude or local y
    pub y: f64,

    /// Altitude in meters
    pub z: f64,
}

impl MissionItem {
    #[must_use]
    pub fn new(seq: u16, x: f64, y: f64, z: f64) -> Self {
        Self { seq, x, y, z }
    }

    /// Builds an item from integer-encoded coordinates (degrees × 10^7).
    ///
    /// # Examples
    ///
    /// ```
    /// use mavviz::mission::item::MissionItem;
    ///
    /// let item = MissionItem::from_scaled(3, 473_977_418, 85_455_939, 20.0);
    /// assert!((item.x - 47.3977418).abs() < 1e-9);
    /// assert!((item.y - 8.5455939).abs() < 1e-9);
    /// ```
    #[must_use]
    pub fn from_scaled(seq: u16, x: i32, y: i32, z: f32) -> Self {
        Self {
            seq,
            x: f64::from(x) / COORDINATE_SCALE,
            y: f64::from(y) / COORDINATE_SCALE,
            z: f64::from(z),
        }
    }
}

impl std::fmt::Display for MissionItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "seq={} x={} y={} z={}", self.seq, self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_scaled_negative_coordinates() {
        let item = MissionItem::from_scaled(0, -1_224_194_000, -377_749_000, 15.5);
        assert!((item.x - (-122.4194)).abs() < 1e-9);
        assert!((item.y - (-37.7749)).abs() < 1e-9);
        assert!((item.z - 15.5).abs() < 1e-6);
    }

    #[test]
    fn test_display() {
        let item = MissionItem::new(2, 1.0, 2.0, 3.0);
        assert_eq!(item.to_string(), "seq=2 x=1 y=2 z=3");
    }
}
