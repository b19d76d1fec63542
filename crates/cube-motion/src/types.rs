use glam::{EulerRot, Quat, Vec3};

/// One timestamped reading from the device sensor or the demo generator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSample {
    /// Producer clock, in seconds. Only differences between samples matter.
    pub timestamp: f64,
    /// Device attitude as a unit quaternion.
    pub orientation: Quat,
    /// Linear (user) acceleration with gravity removed.
    pub acceleration: Vec3,
}

/// Lifecycle of the motion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotionStatus {
    #[default]
    Idle,
    Starting,
    RunningSensor,
    RunningDemo,
    Calibrated,
    Stopped,
    Error,
}

impl MotionStatus {
    /// Whether a sample source is currently attached.
    pub fn is_running(self) -> bool {
        matches!(
            self,
            MotionStatus::Starting
                | MotionStatus::RunningSensor
                | MotionStatus::RunningDemo
                | MotionStatus::Calibrated
        )
    }
}

/// Read-only view of the motion state, published after every update.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionSnapshot {
    /// Smoothed orientation relative to the calibration reference.
    pub orientation: Quat,
    pub position: Vec3,
    pub velocity: Vec3,
    pub status: MotionStatus,
    /// Whether the active (or last) source is the demo generator.
    pub using_demo: bool,
    /// Rate measured from the most recent sample interval.
    pub sample_hz: f64,
    /// Time from sample arrival to the published update.
    pub latency_ms: f64,
    /// Samples processed since the last start.
    pub samples: u64,
    /// Most recent recoverable error, cleared on start.
    pub error: Option<String>,
}

impl Default for MotionSnapshot {
    fn default() -> Self {
        Self {
            orientation: Quat::IDENTITY,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            status: MotionStatus::Idle,
            using_demo: false,
            sample_hz: 0.0,
            latency_ms: 0.0,
            samples: 0,
            error: None,
        }
    }
}

impl MotionSnapshot {
    /// Roll, pitch and yaw of the relative orientation, in degrees.
    pub fn euler_degrees(&self) -> (f32, f32, f32) {
        let (yaw, pitch, roll) = self.orientation.to_euler(EulerRot::ZXY);
        (roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees())
    }
}
