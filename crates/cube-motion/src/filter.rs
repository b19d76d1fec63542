use crate::types::{MotionSample, MotionSnapshot, MotionStatus};
use cube_config::MotionConfig;
use glam::{Quat, Vec3};

/// Orientation low-pass filter and acceleration integrator.
///
/// Smooths the device attitude with a spherical blend toward each new sample,
/// expresses it relative to a calibration reference, and integrates linear
/// acceleration into a damped, bounded velocity and position.
///
/// Not thread-safe by itself: the engine confines it to a single task.
pub struct MotionFilter {
    config: MotionConfig,
    /// Smoothed absolute orientation (before applying the reference).
    smoothed: Quat,
    /// Reference captured by `calibrate`.
    reference: Quat,
    /// Smoothed orientation relative to `reference`.
    orientation: Quat,
    velocity: Vec3,
    position: Vec3,
    /// Timestamp of the previous sample; `None` until the first sample after start.
    last_timestamp: Option<f64>,
    status: MotionStatus,
    using_demo: bool,
    sample_hz: f64,
    latency_ms: f64,
    samples: u64,
    error: Option<String>,
}

impl MotionFilter {
    pub fn new(config: MotionConfig) -> Self {
        let config = config.sanitized();
        Self {
            config,
            smoothed: Quat::IDENTITY,
            reference: Quat::IDENTITY,
            orientation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            position: Vec3::ZERO,
            last_timestamp: None,
            status: MotionStatus::Idle,
            using_demo: false,
            sample_hz: 0.0,
            latency_ms: 0.0,
            samples: 0,
            error: None,
        }
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    /// Replace the tuning. Takes effect on the next sample.
    pub fn set_config(&mut self, config: MotionConfig) {
        self.config = config.sanitized();
    }

    pub fn status(&self) -> MotionStatus {
        self.status
    }

    /// Prepare for a new sample source: forget the previous timestamp and
    /// reseed the smoothing from the first sample that arrives.
    pub fn begin(&mut self, using_demo: bool) {
        self.last_timestamp = None;
        self.samples = 0;
        self.error = None;
        self.using_demo = using_demo;
        self.status = MotionStatus::Starting;
    }

    /// Mark the source selected by `begin` as delivering samples.
    pub fn set_running(&mut self, using_demo: bool) {
        self.using_demo = using_demo;
        self.status = if using_demo {
            MotionStatus::RunningDemo
        } else {
            MotionStatus::RunningSensor
        };
    }

    /// Detach from the sample source.
    pub fn stop(&mut self) {
        self.last_timestamp = None;
        self.status = MotionStatus::Stopped;
    }

    /// Enter the error state with a user-visible message.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.last_timestamp = None;
        self.error = Some(message.into());
        self.status = MotionStatus::Error;
    }

    /// Record a recoverable problem without interrupting sampling.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    /// Make the current orientation the neutral pose and zero the motion estimate.
    pub fn calibrate(&mut self) {
        self.reference = self.smoothed;
        self.orientation = Quat::IDENTITY;
        self.velocity = Vec3::ZERO;
        self.position = Vec3::ZERO;
        if self.status.is_running() {
            self.status = MotionStatus::Calibrated;
        }
    }

    /// Fold one sample into the state.
    pub fn on_sample(&mut self, sample: &MotionSample) {
        let first = self.last_timestamp.is_none();
        let dt = match self.last_timestamp {
            // Out-of-order samples contribute no elapsed time.
            Some(last) => (sample.timestamp - last).max(0.0),
            None => self.config.sample_period(),
        };
        // Gaps that do not fit an f32 step integrate nothing.
        let dt = if dt.is_finite() && dt <= f64::from(f32::MAX) {
            dt
        } else {
            tracing::trace!(dt, "Ignoring unrepresentable sample interval");
            0.0
        };
        if sample.timestamp.is_finite() {
            self.last_timestamp = Some(sample.timestamp);
        }

        self.update_orientation(sample.orientation, first);
        self.integrate(sample.acceleration, dt as f32);

        self.sample_hz = if dt > 0.0 {
            1.0 / dt
        } else {
            self.config.sample_hz
        };
        self.samples += 1;
    }

    pub fn set_latency(&mut self, latency_ms: f64) {
        self.latency_ms = latency_ms;
    }

    pub fn snapshot(&self) -> MotionSnapshot {
        MotionSnapshot {
            orientation: self.orientation,
            position: self.position,
            velocity: self.velocity,
            status: self.status,
            using_demo: self.using_demo,
            sample_hz: self.sample_hz,
            latency_ms: self.latency_ms,
            samples: self.samples,
            error: self.error.clone(),
        }
    }

    fn update_orientation(&mut self, raw: Quat, first: bool) {
        let length = raw.length();
        if !length.is_finite() || length < 1e-6 {
            self.record_error("Ignored invalid orientation sample");
            tracing::trace!(?raw, "Invalid orientation quaternion");
            return;
        }
        let raw = raw / length;

        self.smoothed = if first {
            raw
        } else {
            self.smoothed.slerp(raw, self.config.smoothing).normalize()
        };
        self.orientation = (self.reference.conjugate() * self.smoothed).normalize();
    }

    fn integrate(&mut self, acceleration: Vec3, dt: f32) {
        let finite = |v: f32| if v.is_finite() { v } else { 0.0 };
        let acceleration = Vec3::new(
            finite(acceleration.x),
            finite(acceleration.y),
            finite(acceleration.z),
        );
        let speed = Vec3::splat(self.config.max_speed);
        let range = Vec3::splat(self.config.max_range);

        self.velocity += acceleration * dt;
        self.velocity *= 1.0 - self.config.damping;
        self.velocity = self.velocity.clamp(-speed, speed);

        self.position += self.velocity * dt;
        self.position = self.position.clamp(-range, range);
    }
}
