//! # MAVLink Frame Codec
//!
//! Converts between `mavlink::common::MavMessage` and the client's typed
//! [`Frame`]/[`Outbound`] values. Wire encoding itself is done by the
//! `mavlink` crate; this module only maps fields and units.

use mavlink::common::{
    MavAutopilot, MavMessage, MavMissionResult, MavModeFlag, MavState, MavType, HEARTBEAT_DATA,
    MISSION_ACK_DATA, MISSION_REQUEST_INT_DATA, MISSION_REQUEST_LIST_DATA,
};

use super::frame::*;

/// Converts a received message into a [`Frame`].
///
/// Returns `None` for message kinds the client does not consume.
///
/// Non-finite position or velocity triples (PX4 marks invalid estimates
/// with NaN) decode as absent.
pub fn decode_message(msg: &MavMessage) -> Option<Frame> {
    let frame = match msg {
        MavMessage::HEARTBEAT(d) => Frame::Heartbeat(HeartbeatFrame {
            is_vehicle: d.autopilot != MavAutopilot::MAV_AUTOPILOT_INVALID,
        }),
        MavMessage::LOCAL_POSITION_NED(d) => Frame::LocalPositionNed(PositionFrame {
            position: finite(d.x, d.y, d.z),
            velocity: finite(d.vx, d.vy, d.vz),
        }),
        MavMessage::ODOMETRY(d) => Frame::Odometry(PositionFrame {
            position: finite(d.x, d.y, d.z),
            velocity: finite(d.vx, d.vy, d.vz),
        }),
        MavMessage::POSITION_TARGET_LOCAL_NED(d) => {
            Frame::PositionTargetLocalNed(PositionTargetFrame {
                velocity: Vec3::new(d.vx, d.vy, d.vz),
            })
        }
        MavMessage::ATTITUDE(d) => Frame::Attitude(AttitudeFrame {
            roll: d.roll,
            pitch: d.pitch,
            yaw: d.yaw,
        }),
        MavMessage::HIGHRES_IMU(d) => Frame::HighresImu(ImuFrame {
            accel: Vec3::new(d.xacc, d.yacc, d.zacc),
            gyro: Vec3::new(d.xgyro, d.ygyro, d.zgyro),
        }),
        MavMessage::ALTITUDE(d) => Frame::Altitude(AltitudeFrame {
            amsl: d.altitude_amsl,
            relative: d.altitude_relative,
        }),
        MavMessage::GLOBAL_POSITION_INT(d) => Frame::GlobalPositionInt(GlobalPositionFrame {
            alt_mm: d.alt,
            relative_alt_mm: d.relative_alt,
        }),
        MavMessage::GPS_RAW_INT(d) => Frame::GpsRawInt(GpsRawFrame {
            satellites_visible: d.satellites_visible,
            eph_cm: d.eph,
            epv_cm: d.epv,
            fix_type: d.fix_type as u8,
        }),
        MavMessage::SERVO_OUTPUT_RAW(d) => Frame::ServoOutputRaw(ServoFrame {
            outputs: [
                Some(d.servo1_raw),
                Some(d.servo2_raw),
                Some(d.servo3_raw),
                Some(d.servo4_raw),
                Some(d.servo5_raw),
                Some(d.servo6_raw),
                Some(d.servo7_raw),
                Some(d.servo8_raw),
            ],
        }),
        MavMessage::MISSION_COUNT(d) => Frame::MissionCount(MissionCountFrame { count: d.count }),
        MavMessage::MISSION_ITEM(d) => Frame::MissionItem(MissionItemFrame {
            seq: d.seq,
            x: d.x,
            y: d.y,
            z: d.z,
        }),
        MavMessage::MISSION_ITEM_INT(d) => Frame::MissionItemInt(MissionItemIntFrame {
            seq: d.seq,
            x: d.x,
            y: d.y,
            z: d.z,
        }),
        MavMessage::MISSION_CURRENT(d) => Frame::MissionCurrent { seq: d.seq },
        _ => return None,
    };
    Some(frame)
}

fn finite(x: f32, y: f32, z: f32) -> Option<Vec3> {
    (x.is_finite() && y.is_finite() && z.is_finite()).then(|| Vec3::new(x, y, z))
}

/// Builds the message for an outbound frame addressed to `target`.
pub fn encode_outbound(outbound: Outbound, target: Identity) -> MavMessage {
    match outbound {
        Outbound::Heartbeat => MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: MavType::MAV_TYPE_GCS,
            autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
            base_mode: MavModeFlag::empty(),
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        }),
        Outbound::MissionRequestList => {
            MavMessage::MISSION_REQUEST_LIST(MISSION_REQUEST_LIST_DATA {
                target_system: target.system_id,
                target_component: target.component_id,
                ..Default::default()
            })
        }
        Outbound::MissionRequest { seq } => {
            MavMessage::MISSION_REQUEST_INT(MISSION_REQUEST_INT_DATA {
                seq,
                target_system: target.system_id,
                target_component: target.component_id,
                ..Default::default()
            })
        }
        Outbound::MissionAck { result } => MavMessage::MISSION_ACK(MISSION_ACK_DATA {
            target_system: target.system_id,
            target_component: target.component_id,
            mavtype: mission_result(result),
            ..Default::default()
        }),
    }
}

fn mission_result(result: u8) -> MavMissionResult {
    if result == MISSION_ACK_ACCEPTED {
        MavMissionResult::MAV_MISSION_ACCEPTED
    } else {
        MavMissionResult::MAV_MISSION_ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mavlink::common::{
        GLOBAL_POSITION_INT_DATA, LOCAL_POSITION_NED_DATA, MISSION_ITEM_INT_DATA,
        PARAM_REQUEST_LIST_DATA,
    };

    #[test]
    fn test_decode_local_position() {
        let msg = MavMessage::LOCAL_POSITION_NED(LOCAL_POSITION_NED_DATA {
            x: 1.0,
            y: 2.0,
            z: -3.0,
            vx: 0.5,
            ..Default::default()
        });

        match decode_message(&msg) {
            Some(Frame::LocalPositionNed(p)) => {
                assert_eq!(p.position, Some(Vec3::new(1.0, 2.0, -3.0)));
                assert_eq!(p.velocity, Some(Vec3::new(0.5, 0.0, 0.0)));
            }
            other => panic!("Expected LocalPositionNed, got: {:?}", other),
        }
    }

    #[test]
    fn test_decode_nan_velocity_is_absent() {
        let msg = MavMessage::LOCAL_POSITION_NED(LOCAL_POSITION_NED_DATA {
            x: 1.0,
            vx: f32::NAN,
            ..Default::default()
        });

        match decode_message(&msg) {
            Some(Frame::LocalPositionNed(p)) => {
                assert!(p.position.is_some());
                assert!(p.velocity.is_none());
            }
            other => panic!("Expected LocalPositionNed, got: {:?}", other),
        }
    }

    #[test]
    fn test_decode_global_position_keeps_millimeters() {
        let msg = MavMessage::GLOBAL_POSITION_INT(GLOBAL_POSITION_INT_DATA {
            alt: 488_500,
            relative_alt: 12_250,
            ..Default::default()
        });

        assert_eq!(
            decode_message(&msg),
            Some(Frame::GlobalPositionInt(GlobalPositionFrame {
                alt_mm: 488_500,
                relative_alt_mm: 12_250,
            }))
        );
    }

    #[test]
    fn test_decode_mission_item_int_keeps_raw_coordinates() {
        let msg = MavMessage::MISSION_ITEM_INT(MISSION_ITEM_INT_DATA {
            seq: 2,
            x: 473_977_418,
            y: 85_455_939,
            z: 20.0,
            ..Default::default()
        });

        assert_eq!(
            decode_message(&msg),
            Some(Frame::MissionItemInt(MissionItemIntFrame {
                seq: 2,
                x: 473_977_418,
                y: 85_455_939,
                z: 20.0,
            }))
        );
    }

    #[test]
    fn test_decode_gcs_heartbeat_is_not_vehicle() {
        let gcs = encode_outbound(Outbound::Heartbeat, Identity::new(1, 1));
        assert_eq!(
            decode_message(&gcs),
            Some(Frame::Heartbeat(HeartbeatFrame { is_vehicle: false }))
        );
    }

    #[test]
    fn test_decode_unconsumed_kind() {
        let msg = MavMessage::PARAM_REQUEST_LIST(PARAM_REQUEST_LIST_DATA::default());
        assert_eq!(decode_message(&msg), None);
    }

    #[test]
    fn test_encode_mission_request_targets_vehicle() {
        let msg = encode_outbound(Outbound::MissionRequest { seq: 7 }, Identity::new(1, 1));
        match msg {
            MavMessage::MISSION_REQUEST_INT(d) => {
                assert_eq!(d.seq, 7);
                assert_eq!(d.target_system, 1);
                assert_eq!(d.target_component, 1);
            }
            other => panic!("Expected MISSION_REQUEST_INT, got: {:?}", other),
        }
    }

    #[test]
    fn test_encode_mission_ack_results() {
        let target = Identity::new(1, 1);
        match encode_outbound(Outbound::MissionAck { result: MISSION_ACK_ACCEPTED }, target) {
            MavMessage::MISSION_ACK(d) => {
                assert_eq!(d.mavtype, MavMissionResult::MAV_MISSION_ACCEPTED)
            }
            other => panic!("Expected MISSION_ACK, got: {:?}", other),
        }
        match encode_outbound(Outbound::MissionAck { result: MISSION_ACK_ERROR }, target) {
            MavMessage::MISSION_ACK(d) => {
                assert_eq!(d.mavtype, MavMissionResult::MAV_MISSION_ERROR)
            }
            other => panic!("Expected MISSION_ACK, got: {:?}", other),
        }
    }
}
