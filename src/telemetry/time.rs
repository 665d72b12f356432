//! # Session Time Axis
//!
//! Converts wall-clock reads into a strictly increasing per-session time
//! axis, so every appended sample has a timestamp greater than the last one
//! even when the source clock is coarse or two frames arrive back to back.

use std::time::Instant;

/// Step added when the clock has not advanced past the last timestamp (1 ms)
pub const MIN_STEP_S: f64 = 1e-3;

/// Strictly increasing session clock, in seconds since session start
#[derive(Debug, Clone)]
pub struct TimeNormalizer {
    start: Instant,
    last: Option<f64>,
}

impl TimeNormalizer {
    /// Starts a new session clock at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Starts a new session clock at `start`.
    #[must_use]
    pub fn starting_at(start: Instant) -> Self {
        Self { start, last: None }
    }

    /// Returns the session start instant.
    #[must_use]
    pub fn start(&self) -> Instant {
        self.start
    }

    /// Returns the next timestamp for the current instant.
    pub fn next(&mut self) -> f64 {
        self.at(Instant::now())
    }

    /// Returns the next timestamp for `now`.
    ///
    /// If the elapsed time is not greater than the previously returned value,
    /// the previous value plus [`MIN_STEP_S`] is returned instead.
    ///
    /// # Examples
    ///
    /// ```
    /// use mavviz::telemetry::time::TimeNormalizer;
    /// use std::time::Instant;
    ///
    /// let start = Instant::now();
    /// let mut clock = TimeNormalizer::starting_at(start);
    /// let a = clock.at(start);
    /// let b = clock.at(start);
    /// assert!(b > a);
    /// ```
    pub fn at(&mut self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.start).as_secs_f64();
        let t = match self.last {
            Some(last) if elapsed <= last => last + MIN_STEP_S,
            _ => elapsed,
        };
        self.last = Some(t);
        t
    }
}

impl Default for TimeNormalizer {
    fn default() -> Self {
        Self::new()
    }
}
