//! # Message Dispatcher
//!
//! Routes each inbound frame to the telemetry store or the mission download.
//!
//! Every recorded sample is stamped by the session clock at dispatch time;
//! no timestamp field of the frame is used.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, trace};

use crate::config::{Config, MissionMode, TelemetryConfig};
use crate::link::{Link, LinkRole};
use crate::mission::{MissionDownload, MissionItem};
use crate::protocol::frame::{
    AltitudeFrame, GlobalPositionFrame, GpsRawFrame, ImuFrame, PositionFrame, ServoFrame, Vec3,
};
use crate::protocol::{Frame, Inbound};
use crate::telemetry::sample::{
    AltitudeSample, AttitudeSample, GpsSample, ImuSample, PositionSample, ServoSample,
    VelocitySample, SERVO_CHANNELS, SERVO_DEFAULT_PWM,
};
use crate::telemetry::{Channel, TelemetrySample, TelemetryStore, TimeNormalizer};

/// What the dispatcher did with a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// Samples appended to these channels
    Recorded(&'static [Channel]),

    /// Handed to the in-flight mission download
    MissionForwarded,

    /// Mission item observed outside a download; `inserted` is false for a
    /// sequence already in the mission list
    MissionObserved { seq: u16, inserted: bool },

    /// Accepted but not recorded
    Ignored(&'static str),

    /// Missing required fields
    Dropped(&'static str),
}

/// Last measured and commanded velocity, used to fill the half of a
/// velocity sample a frame does not carry
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VelocityMerge {
    pub last_measured: Vec3,
    pub last_setpoint: Vec3,
}

impl VelocityMerge {
    fn sample(&self, t: f64) -> VelocitySample {
        VelocitySample {
            t,
            vx: self.last_measured.x,
            vy: self.last_measured.y,
            vz: self.last_measured.z,
            vx_sp: self.last_setpoint.x,
            vy_sp: self.last_setpoint.y,
            vz_sp: self.last_setpoint.z,
        }
    }
}

/// Millimeters to meters, divided in `f64` so large altitudes keep precision.
fn mm_to_m(mm: i32) -> f32 {
    (f64::from(mm) / 1000.0) as f32
}

/// Classifies inbound frames and updates the store or the mission download
#[derive(Debug)]
pub struct MessageDispatcher {
    telemetry: TelemetryConfig,
    mission_mode: MissionMode,
    clock: TimeNormalizer,
    store: Arc<TelemetryStore>,
    velocity: VelocityMerge,
}

impl MessageDispatcher {
    /// Creates a dispatcher writing to `store`, with the session clock
    /// starting at `start`.
    pub fn new(config: &Config, store: Arc<TelemetryStore>, start: Instant) -> Self {
        Self {
            telemetry: config.telemetry.clone(),
            mission_mode: config.mission.mode,
            clock: TimeNormalizer::starting_at(start),
            store,
            velocity: VelocityMerge::default(),
        }
    }

    /// Current velocity merge state.
    #[must_use]
    pub fn velocity_merge(&self) -> VelocityMerge {
        self.velocity
    }

    /// Handles one frame.
    ///
    /// # Arguments
    ///
    /// * `inbound` - Frame and sender
    /// * `role` - Link the frame arrived on
    /// * `now` - Dispatch instant, for the sample timestamp and mission timers
    /// * `download` - Mission download session
    /// * `active` - Active link, for requests the download issues
    pub fn dispatch(
        &mut self,
        inbound: Inbound,
        role: LinkRole,
        now: Instant,
        download: &mut MissionDownload,
        active: Option<&mut Link>,
    ) -> Dispatched {
        if inbound.frame.is_mission() && self.mission_mode == MissionMode::Off {
            return Dispatched::Ignored("mission mode off");
        }

        let result = match inbound.frame {
            Frame::LocalPositionNed(frame) | Frame::Odometry(frame) => {
                self.on_position(frame, now)
            }
            Frame::PositionTargetLocalNed(frame) => {
                if !self.telemetry.enable_velocity {
                    return Dispatched::Ignored("velocity disabled");
                }
                self.velocity.last_setpoint = frame.velocity;
                let t = self.clock.at(now);
                self.store.append(TelemetrySample::Velocity(self.velocity.sample(t)));
                Dispatched::Recorded(&[Channel::Velocity])
            }
            Frame::Attitude(frame) => {
                if !self.telemetry.enable_attitude {
                    return Dispatched::Ignored("attitude disabled");
                }
                let t = self.clock.at(now);
                self.store.append(TelemetrySample::Attitude(AttitudeSample {
                    t,
                    roll: frame.roll,
                    pitch: frame.pitch,
                    yaw: frame.yaw,
                }));
                Dispatched::Recorded(&[Channel::Attitude])
            }
            Frame::HighresImu(frame) => self.on_imu(frame, now),
            Frame::Altitude(AltitudeFrame { amsl, relative }) => {
                self.on_altitude(amsl, relative, now)
            }
            Frame::GlobalPositionInt(GlobalPositionFrame { alt_mm, relative_alt_mm }) => {
                self.on_altitude(mm_to_m(alt_mm), mm_to_m(relative_alt_mm), now)
            }
            Frame::GpsRawInt(frame) => self.on_gps(frame, now),
            Frame::ServoOutputRaw(frame) => self.on_servo(frame, now),
            Frame::MissionCount(frame) => match active {
                Some(link) if role == LinkRole::Active && download.is_in_flight() => {
                    download.handle_count(frame.count, link, now);
                    Dispatched::MissionForwarded
                }
                _ => Dispatched::Ignored("no mission download in flight"),
            },
            Frame::MissionItem(frame) => {
                let item = MissionItem::new(
                    frame.seq,
                    f64::from(frame.x),
                    f64::from(frame.y),
                    f64::from(frame.z),
                );
                self.on_mission_item(item, role, now, download, active)
            }
            Frame::MissionItemInt(frame) => {
                let item = MissionItem::from_scaled(frame.seq, frame.x, frame.y, frame.z);
                self.on_mission_item(item, role, now, download, active)
            }
            Frame::Heartbeat(_) | Frame::MissionCurrent { .. } => {
                Dispatched::Ignored("control frame")
            }
        };

        trace!(
            "{} from {} on {} link: {:?}",
            inbound.frame.kind(),
            inbound.sender,
            role,
            result
        );
        result
    }

    fn on_position(&mut self, frame: PositionFrame, now: Instant) -> Dispatched {
        let velocity = frame.velocity.filter(|_| self.telemetry.enable_velocity);
        if frame.position.is_none() && velocity.is_none() {
            return if frame.velocity.is_some() {
                Dispatched::Ignored("velocity disabled")
            } else {
                Dispatched::Dropped("no position or velocity")
            };
        }

        let t = self.clock.at(now);
        if let Some(p) = frame.position {
            self.store.append(TelemetrySample::Position(PositionSample {
                t,
                x: p.x,
                y: p.y,
                z: p.z,
            }));
        }
        if let Some(v) = velocity {
            self.velocity.last_measured = v;
            self.store.append(TelemetrySample::Velocity(self.velocity.sample(t)));
        }

        match (frame.position.is_some(), velocity.is_some()) {
            (true, true) => Dispatched::Recorded(&[Channel::Position, Channel::Velocity]),
            (true, false) => Dispatched::Recorded(&[Channel::Position]),
            _ => Dispatched::Recorded(&[Channel::Velocity]),
        }
    }

    fn on_imu(&mut self, frame: ImuFrame, now: Instant) -> Dispatched {
        if !self.telemetry.enable_imu {
            return Dispatched::Ignored("imu disabled");
        }
        let t = self.clock.at(now);
        self.store.append(TelemetrySample::Imu(ImuSample {
            t,
            ax: frame.accel.x,
            ay: frame.accel.y,
            az: frame.accel.z,
            gx: frame.gyro.x,
            gy: frame.gyro.y,
            gz: frame.gyro.z,
        }));
        Dispatched::Recorded(&[Channel::Imu])
    }

    fn on_altitude(&mut self, amsl: f32, relative: f32, now: Instant) -> Dispatched {
        if !self.telemetry.enable_altitude {
            return Dispatched::Ignored("altitude disabled");
        }
        let t = self.clock.at(now);
        self.store.append(TelemetrySample::Altitude(AltitudeSample { t, amsl, relative }));
        Dispatched::Recorded(&[Channel::Altitude])
    }

    fn on_gps(&mut self, frame: GpsRawFrame, now: Instant) -> Dispatched {
        if !self.telemetry.enable_gps {
            return Dispatched::Ignored("gps disabled");
        }
        let t = self.clock.at(now);
        self.store.append(TelemetrySample::Gps(GpsSample {
            t,
            satellites: frame.satellites_visible,
            // Centimeters to meters
            eph: f32::from(frame.eph_cm) / 100.0,
            epv: f32::from(frame.epv_cm) / 100.0,
            fix_type: frame.fix_type,
        }));
        Dispatched::Recorded(&[Channel::Gps])
    }

    fn on_servo(&mut self, frame: ServoFrame, now: Instant) -> Dispatched {
        if !self.telemetry.enable_servo {
            return Dispatched::Ignored("servo disabled");
        }
        let mut channels = [SERVO_DEFAULT_PWM; SERVO_CHANNELS];
        for (slot, output) in channels.iter_mut().zip(frame.outputs) {
            if let Some(pwm) = output {
                *slot = pwm;
            }
        }
        let t = self.clock.at(now);
        self.store.append(TelemetrySample::Servo(ServoSample { t, channels }));
        Dispatched::Recorded(&[Channel::Servo])
    }

    fn on_mission_item(
        &mut self,
        item: MissionItem,
        role: LinkRole,
        now: Instant,
        download: &mut MissionDownload,
        active: Option<&mut Link>,
    ) -> Dispatched {
        if role == LinkRole::Active && download.is_in_flight() {
            if let Some(link) = active {
                download.handle_item(item, link, now);
                return Dispatched::MissionForwarded;
            }
        }

        let inserted = self.store.observe_mission_item(item);
        if inserted {
            debug!("Observed mission item on {} link: {}", role, item);
        }
        Dispatched::MissionObserved { seq: item.seq, inserted }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::mocks::ScriptedTransport;
    use crate::mission::DownloadState;
    use crate::protocol::frame::{
        AttitudeFrame, HeartbeatFrame, MissionCountFrame, MissionItemFrame, MissionItemIntFrame,
        PositionTargetFrame,
    };
    use crate::protocol::{Identity, Outbound};
    use std::time::Duration;

    const VEHICLE: Identity = Identity::new(1, 1);

    struct Fixture {
        dispatcher: MessageDispatcher,
        store: Arc<TelemetryStore>,
        download: MissionDownload,
        transport: ScriptedTransport,
        link: Link,
        t0: Instant,
    }

    fn fixture_with(config: Config) -> Fixture {
        let store = TelemetryStore::shared(config.telemetry.capacity);
        let t0 = Instant::now();
        let transport = ScriptedTransport::new();
        let mut link = Link::new(
            LinkRole::Active,
            "udpin:127.0.0.1:14551",
            Identity::new(252, 191),
            Box::new(transport.clone()),
        );
        link.set_target(VEHICLE);
        Fixture {
            dispatcher: MessageDispatcher::new(&config, store.clone(), t0),
            store,
            download: MissionDownload::new(),
            transport,
            link,
            t0,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Config::default())
    }

    impl Fixture {
        fn send(&mut self, frame: Frame, role: LinkRole, after_ms: u64) -> Dispatched {
            let now = self.t0 + Duration::from_millis(after_ms);
            self.dispatcher.dispatch(
                Inbound::new(VEHICLE, frame),
                role,
                now,
                &mut self.download,
                Some(&mut self.link),
            )
        }
    }

    fn measured(position: Option<Vec3>, velocity: Option<Vec3>) -> Frame {
        Frame::LocalPositionNed(PositionFrame { position, velocity })
    }

    #[test]
    fn test_setpoint_forward_fills_measured_velocity() {
        let mut f = fixture();
        f.send(measured(Some(Vec3::ZERO), Some(Vec3::new(0.1, 0.1, 0.1))), LinkRole::Active, 10);
        let result = f.send(
            Frame::PositionTargetLocalNed(PositionTargetFrame {
                velocity: Vec3::new(1.0, 2.0, 3.0),
            }),
            LinkRole::Active,
            20,
        );
        assert_eq!(result, Dispatched::Recorded(&[Channel::Velocity]));

        let velocities = f.store.velocities();
        assert_eq!(velocities.len(), 2);
        let first = velocities[0];
        assert_eq!((first.vx_sp, first.vy_sp, first.vz_sp), (0.0, 0.0, 0.0));

        let second = velocities[1];
        assert_eq!((second.vx, second.vy, second.vz), (0.1, 0.1, 0.1));
        assert_eq!((second.vx_sp, second.vy_sp, second.vz_sp), (1.0, 2.0, 3.0));
    }

    #[test]
    fn test_measured_velocity_forward_fills_setpoint() {
        let mut f = fixture();
        f.send(
            Frame::PositionTargetLocalNed(PositionTargetFrame {
                velocity: Vec3::new(1.0, 2.0, 3.0),
            }),
            LinkRole::Active,
            10,
        );
        f.send(measured(None, Some(Vec3::new(0.5, 0.0, -0.5))), LinkRole::Passive, 20);

        let last = *f.store.velocities().last().unwrap();
        assert_eq!((last.vx, last.vy, last.vz), (0.5, 0.0, -0.5));
        assert_eq!((last.vx_sp, last.vy_sp, last.vz_sp), (1.0, 2.0, 3.0));
        assert_eq!(f.dispatcher.velocity_merge().last_setpoint, Vec3::new(1.0, 2.0, 3.0));
        assert!(f.store.positions().is_empty());
    }

    #[test]
    fn test_position_with_velocity_records_both() {
        let mut f = fixture();
        let result = f.send(
            Frame::Odometry(PositionFrame {
                position: Some(Vec3::new(1.0, 2.0, -3.0)),
                velocity: Some(Vec3::new(0.2, 0.0, 0.0)),
            }),
            LinkRole::Active,
            5,
        );
        assert_eq!(result, Dispatched::Recorded(&[Channel::Position, Channel::Velocity]));

        let position = f.store.positions()[0];
        assert_eq!((position.x, position.y, position.z), (1.0, 2.0, -3.0));
        assert_eq!(position.t, f.store.velocities()[0].t);
    }

    #[test]
    fn test_position_without_fields_is_dropped() {
        let mut f = fixture();
        let result = f.send(measured(None, None), LinkRole::Active, 5);
        assert!(matches!(result, Dispatched::Dropped(_)));
        assert_eq!(f.store.len(Channel::Position), 0);
        assert_eq!(f.store.len(Channel::Velocity), 0);
    }

    #[test]
    fn test_velocity_disabled() {
        let mut config = Config::default();
        config.telemetry.enable_velocity = false;
        let mut f = fixture_with(config);

        let frame = measured(Some(Vec3::ZERO), Some(Vec3::new(1.0, 0.0, 0.0)));
        let result = f.send(frame, LinkRole::Active, 5);
        assert_eq!(result, Dispatched::Recorded(&[Channel::Position]));
        assert!(f.store.velocities().is_empty());

        let result = f.send(
            Frame::PositionTargetLocalNed(PositionTargetFrame { velocity: Vec3::ZERO }),
            LinkRole::Active,
            6,
        );
        assert!(matches!(result, Dispatched::Ignored(_)));
    }

    #[test]
    fn test_global_position_converts_millimeters() {
        let mut f = fixture();
        f.send(
            Frame::GlobalPositionInt(GlobalPositionFrame {
                alt_mm: 488_500,
                relative_alt_mm: 10_250,
            }),
            LinkRole::Active,
            5,
        );
        let altitude = f.store.altitudes()[0];
        assert!((altitude.amsl - 488.5).abs() < 1e-3);
        assert!((altitude.relative - 10.25).abs() < 1e-3);
    }

    #[test]
    fn test_global_position_large_altitude_keeps_precision() {
        let mut f = fixture();
        f.send(
            Frame::GlobalPositionInt(GlobalPositionFrame {
                alt_mm: 300_021_234,
                relative_alt_mm: -1,
            }),
            LinkRole::Active,
            5,
        );
        let altitude = f.store.altitudes()[0];
        assert_eq!(altitude.amsl, 300_021.218_75);
        assert!((altitude.relative + 0.001).abs() < 1e-6);
    }

    #[test]
    fn test_altitude_direct() {
        let mut f = fixture();
        let frame = Frame::Altitude(AltitudeFrame { amsl: 500.0, relative: 12.0 });
        f.send(frame, LinkRole::Passive, 5);
        let altitude = f.store.altitudes()[0];
        assert_eq!((altitude.amsl, altitude.relative), (500.0, 12.0));
    }

    #[test]
    fn test_gps_converts_centimeters() {
        let mut f = fixture();
        f.send(
            Frame::GpsRawInt(GpsRawFrame {
                satellites_visible: 14,
                eph_cm: 85,
                epv_cm: 130,
                fix_type: 3,
            }),
            LinkRole::Active,
            5,
        );
        let gps = f.store.gps()[0];
        assert_eq!(gps.satellites, 14);
        assert!((gps.eph - 0.85).abs() < 1e-6);
        assert!((gps.epv - 1.30).abs() < 1e-6);
        assert_eq!(gps.fix_type, 3);
    }

    #[test]
    fn test_servo_missing_outputs_default() {
        let mut f = fixture();
        let mut outputs = [None; 8];
        outputs[0] = Some(1100);
        outputs[3] = Some(1900);
        f.send(Frame::ServoOutputRaw(ServoFrame { outputs }), LinkRole::Active, 5);

        let servo = f.store.servos()[0];
        assert_eq!(servo.channels, [1100, 1500, 1500, 1900, 1500, 1500, 1500, 1500]);
    }

    #[test]
    fn test_imu_and_attitude() {
        let mut f = fixture();
        f.send(
            Frame::HighresImu(ImuFrame {
                accel: Vec3::new(0.0, 0.0, -9.81),
                gyro: Vec3::new(0.01, 0.02, 0.03),
            }),
            LinkRole::Active,
            5,
        );
        let frame = Frame::Attitude(AttitudeFrame { roll: 0.1, pitch: -0.1, yaw: 1.5 });
        f.send(frame, LinkRole::Active, 6);

        let imu = f.store.imu()[0];
        assert_eq!((imu.az, imu.gz), (-9.81, 0.03));
        let attitude = f.store.attitudes()[0];
        assert_eq!(attitude.yaw, 1.5);
    }

    #[test]
    fn test_disabled_channels_are_ignored() {
        let mut config = Config::default();
        config.telemetry.enable_imu = false;
        config.telemetry.enable_gps = false;
        config.telemetry.enable_attitude = false;
        let mut f = fixture_with(config);

        let imu = Frame::HighresImu(ImuFrame { accel: Vec3::ZERO, gyro: Vec3::ZERO });
        assert!(matches!(f.send(imu, LinkRole::Active, 1), Dispatched::Ignored(_)));
        let gps = Frame::GpsRawInt(GpsRawFrame {
            satellites_visible: 1,
            eph_cm: 0,
            epv_cm: 0,
            fix_type: 0,
        });
        assert!(matches!(f.send(gps, LinkRole::Active, 2), Dispatched::Ignored(_)));
        let attitude = Frame::Attitude(AttitudeFrame { roll: 0.0, pitch: 0.0, yaw: 0.0 });
        assert!(matches!(f.send(attitude, LinkRole::Active, 3), Dispatched::Ignored(_)));

        assert!(Channel::ALL.iter().all(|c| f.store.len(*c) == 0));
    }

    #[test]
    fn test_timestamps_strictly_increase_within_same_instant() {
        let mut f = fixture();
        for _ in 0..5 {
            let frame = Frame::Attitude(AttitudeFrame { roll: 0.0, pitch: 0.0, yaw: 0.0 });
            f.send(frame, LinkRole::Active, 100);
        }
        let stamps: Vec<f64> = f.store.attitudes().iter().map(|a| a.t).collect();
        assert!(stamps.windows(2).all(|w| w[1] > w[0]), "{:?}", stamps);
    }

    #[test]
    fn test_passive_item_observed_once() {
        let mut f = fixture();
        let frame = Frame::MissionItemInt(MissionItemIntFrame {
            seq: 4,
            x: 473_977_418,
            y: 85_455_939,
            z: 20.0,
        });

        assert_eq!(
            f.send(frame, LinkRole::Passive, 5),
            Dispatched::MissionObserved { seq: 4, inserted: true }
        );
        assert_eq!(
            f.send(frame, LinkRole::Passive, 6),
            Dispatched::MissionObserved { seq: 4, inserted: false }
        );

        let mission = f.store.mission();
        assert_eq!(mission.len(), 1);
        assert!((mission[0].x - 47.3977418).abs() < 1e-9);
    }

    #[test]
    fn test_active_item_without_download_is_observed() {
        let mut f = fixture();
        let frame = Frame::MissionItem(MissionItemFrame { seq: 2, x: 47.0, y: 8.0, z: 15.0 });
        assert_eq!(
            f.send(frame, LinkRole::Active, 5),
            Dispatched::MissionObserved { seq: 2, inserted: true }
        );
        assert_eq!(f.store.mission()[0].z, 15.0);
    }

    #[test]
    fn test_mission_frames_ignored_when_mode_off() {
        let mut config = Config::default();
        config.mission.mode = MissionMode::Off;
        let mut f = fixture_with(config);
        f.download.start(&mut f.link, f.t0);

        let off = Dispatched::Ignored("mission mode off");
        let item = Frame::MissionItem(MissionItemFrame { seq: 0, x: 0.0, y: 0.0, z: 0.0 });
        assert_eq!(f.send(item, LinkRole::Passive, 5), off);
        let item_int = Frame::MissionItemInt(MissionItemIntFrame { seq: 0, x: 0, y: 0, z: 0.0 });
        assert_eq!(f.send(item_int, LinkRole::Active, 6), off);
        let count = Frame::MissionCount(MissionCountFrame { count: 1 });
        assert_eq!(f.send(count, LinkRole::Active, 7), off);
        let current = Frame::MissionCurrent { seq: 0 };
        assert_eq!(f.send(current, LinkRole::Active, 8), Dispatched::Ignored("control frame"));

        assert!(f.store.mission().is_empty());
        assert_eq!(f.download.state(), DownloadState::AwaitingCount);
    }

    #[test]
    fn test_active_mission_frames_feed_download() {
        let mut f = fixture();
        f.download.start(&mut f.link, f.t0);

        let count = Frame::MissionCount(MissionCountFrame { count: 1 });
        assert_eq!(f.send(count, LinkRole::Active, 10), Dispatched::MissionForwarded);
        assert_eq!(f.download.state(), DownloadState::AwaitingItem);

        let item = Frame::MissionItemInt(MissionItemIntFrame { seq: 0, x: 0, y: 0, z: 5.0 });
        assert_eq!(f.send(item, LinkRole::Active, 20), Dispatched::MissionForwarded);
        assert_eq!(f.download.state(), DownloadState::Complete);
        assert!(f.store.mission().is_empty(), "published only when the download finishes");

        assert_eq!(
            f.transport.sent(),
            vec![Outbound::MissionRequestList, Outbound::MissionRequest { seq: 0 }]
        );
    }

    #[test]
    fn test_passive_count_does_not_feed_download() {
        let mut f = fixture();
        f.download.start(&mut f.link, f.t0);
        let count = Frame::MissionCount(MissionCountFrame { count: 3 });
        assert!(matches!(f.send(count, LinkRole::Passive, 10), Dispatched::Ignored(_)));
        assert_eq!(f.download.state(), DownloadState::AwaitingCount);
    }

    #[test]
    fn test_heartbeat_after_handshake_is_ignored() {
        let mut f = fixture();
        let frame = Frame::Heartbeat(HeartbeatFrame { is_vehicle: true });
        let result = f.send(frame, LinkRole::Active, 5);
        assert!(matches!(result, Dispatched::Ignored(_)));
        let result = f.send(Frame::MissionCurrent { seq: 3 }, LinkRole::Active, 6);
        assert!(matches!(result, Dispatched::Ignored(_)));
    }
}
