//! # Telemetry Store
//!
//! Holds one [`BoundedSeries`] per channel plus the externally visible
//! mission list. The dispatcher writes, the rendering consumer reads through
//! a [`TelemetryView`]. A reader-writer lock guards the series so a render
//! thread can take snapshots while the poll loop appends.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::sample::*;
use super::series::BoundedSeries;
use crate::mission::item::MissionItem;

/// Default number of samples kept per channel
pub const DEFAULT_CAPACITY: usize = 300;

#[derive(Debug)]
struct Series {
    position: BoundedSeries<PositionSample>,
    velocity: BoundedSeries<VelocitySample>,
    attitude: BoundedSeries<AttitudeSample>,
    imu: BoundedSeries<ImuSample>,
    altitude: BoundedSeries<AltitudeSample>,
    gps: BoundedSeries<GpsSample>,
    servo: BoundedSeries<ServoSample>,
}

impl Series {
    fn new(capacity: usize) -> Self {
        Self {
            position: BoundedSeries::new(capacity),
            velocity: BoundedSeries::new(capacity),
            attitude: BoundedSeries::new(capacity),
            imu: BoundedSeries::new(capacity),
            altitude: BoundedSeries::new(capacity),
            gps: BoundedSeries::new(capacity),
            servo: BoundedSeries::new(capacity),
        }
    }

    fn len(&self, channel: Channel) -> usize {
        match channel {
            Channel::Position => self.position.len(),
            Channel::Velocity => self.velocity.len(),
            Channel::Attitude => self.attitude.len(),
            Channel::Imu => self.imu.len(),
            Channel::Altitude => self.altitude.len(),
            Channel::Gps => self.gps.len(),
            Channel::Servo => self.servo.len(),
        }
    }
}

/// Per-channel bounded telemetry plus the published mission list
#[derive(Debug)]
pub struct TelemetryStore {
    capacity: usize,
    series: RwLock<Series>,
    mission: RwLock<Vec<MissionItem>>,
}

impl TelemetryStore {
    /// Creates an empty store keeping `capacity` samples per channel.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            series: RwLock::new(Series::new(capacity)),
            mission: RwLock::new(Vec::new()),
        }
    }

    /// Creates an empty shared store.
    #[must_use]
    pub fn shared(capacity: usize) -> Arc<Self> {
        Arc::new(Self::new(capacity))
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn read(&self) -> RwLockReadGuard<'_, Series> {
        self.series.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Series> {
        self.series.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a sample to its channel, evicting the oldest sample once the
    /// channel is full.
    pub fn append(&self, sample: TelemetrySample) {
        let mut series = self.write();
        match sample {
            TelemetrySample::Position(s) => series.position.push(s),
            TelemetrySample::Velocity(s) => series.velocity.push(s),
            TelemetrySample::Attitude(s) => series.attitude.push(s),
            TelemetrySample::Imu(s) => series.imu.push(s),
            TelemetrySample::Altitude(s) => series.altitude.push(s),
            TelemetrySample::Gps(s) => series.gps.push(s),
            TelemetrySample::Servo(s) => series.servo.push(s),
        }
    }

    /// Copies a channel out, oldest first.
    #[must_use]
    pub fn snapshot(&self, channel: Channel) -> Vec<TelemetrySample> {
        let series = self.read();
        match channel {
            Channel::Position => {
                series.position.iter().copied().map(TelemetrySample::Position).collect()
            }
            Channel::Velocity => {
                series.velocity.iter().copied().map(TelemetrySample::Velocity).collect()
            }
            Channel::Attitude => {
                series.attitude.iter().copied().map(TelemetrySample::Attitude).collect()
            }
            Channel::Imu => series.imu.iter().copied().map(TelemetrySample::Imu).collect(),
            Channel::Altitude => {
                series.altitude.iter().copied().map(TelemetrySample::Altitude).collect()
            }
            Channel::Gps => series.gps.iter().copied().map(TelemetrySample::Gps).collect(),
            Channel::Servo => series.servo.iter().copied().map(TelemetrySample::Servo).collect(),
        }
    }

    #[must_use]
    pub fn positions(&self) -> Vec<PositionSample> {
        self.read().position.to_vec()
    }

    #[must_use]
    pub fn velocities(&self) -> Vec<VelocitySample> {
        self.read().velocity.to_vec()
    }

    #[must_use]
    pub fn attitudes(&self) -> Vec<AttitudeSample> {
        self.read().attitude.to_vec()
    }

    #[must_use]
    pub fn imu(&self) -> Vec<ImuSample> {
        self.read().imu.to_vec()
    }

    #[must_use]
    pub fn altitudes(&self) -> Vec<AltitudeSample> {
        self.read().altitude.to_vec()
    }

    #[must_use]
    pub fn gps(&self) -> Vec<GpsSample> {
        self.read().gps.to_vec()
    }

    #[must_use]
    pub fn servos(&self) -> Vec<ServoSample> {
        self.read().servo.to_vec()
    }

    /// Number of samples currently held on `channel`.
    #[must_use]
    pub fn len(&self, channel: Channel) -> usize {
        self.read().len(channel)
    }

    /// Replaces the mission list with `items`, sorted by sequence.
    pub fn publish_mission(&self, mut items: Vec<MissionItem>) {
        items.sort_by_key(|item| item.seq);
        *self.mission.write().unwrap_or_else(PoisonError::into_inner) = items;
    }

    /// Adds an observed mission item unless its sequence is already present.
    ///
    /// Returns `true` if the item was added.
    pub fn observe_mission_item(&self, item: MissionItem) -> bool {
        let mut mission = self.mission.write().unwrap_or_else(PoisonError::into_inner);
        match mission.binary_search_by_key(&item.seq, |m| m.seq) {
            Ok(_) => false,
            Err(pos) => {
                mission.insert(pos, item);
                true
            }
        }
    }

    /// Copies the mission list out, sorted by sequence.
    #[must_use]
    pub fn mission(&self) -> Vec<MissionItem> {
        self.mission.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Read-only handle for the rendering consumer
#[derive(Debug, Clone)]
pub struct TelemetryView {
    store: Arc<TelemetryStore>,
}

impl TelemetryView {
    #[must_use]
    pub fn new(store: Arc<TelemetryStore>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    #[must_use]
    pub fn snapshot(&self, channel: Channel) -> Vec<TelemetrySample> {
        self.store.snapshot(channel)
    }

    #[must_use]
    pub fn len(&self, channel: Channel) -> usize {
        self.store.len(channel)
    }

    #[must_use]
    pub fn positions(&self) -> Vec<PositionSample> {
        self.store.positions()
    }

    #[must_use]
    pub fn velocities(&self) -> Vec<VelocitySample> {
        self.store.velocities()
    }

    #[must_use]
    pub fn attitudes(&self) -> Vec<AttitudeSample> {
        self.store.attitudes()
    }

    #[must_use]
    pub fn imu(&self) -> Vec<ImuSample> {
        self.store.imu()
    }

    #[must_use]
    pub fn altitudes(&self) -> Vec<AltitudeSample> {
        self.store.altitudes()
    }

    #[must_use]
    pub fn gps(&self) -> Vec<GpsSample> {
        self.store.gps()
    }

    #[must_use]
    pub fn servos(&self) -> Vec<ServoSample> {
        self.store.servos()
    }

    #[must_use]
    pub fn mission(&self) -> Vec<MissionItem> {
        self.store.mission()
    }
}
