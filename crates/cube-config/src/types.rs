use serde::{Deserialize, Serialize};

/// Allowed sensor sampling rates (Hz).
pub const SAMPLE_HZ_RANGE: (f64, f64) = (30.0, 100.0);
/// Allowed low-pass smoothing factor.
pub const SMOOTHING_RANGE: (f32, f32) = (0.0, 1.0);
/// Allowed per-tick velocity damping.
pub const DAMPING_RANGE: (f32, f32) = (0.0, 0.2);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Filter and integrator tuning.
    pub motion: MotionConfig,
    /// Start with the synthetic demo source instead of the device sensor.
    pub start_in_demo: bool,
    /// Switch to the demo source when the device sensor is missing or drops out.
    /// When disabled the engine reports an error status instead.
    pub fallback_to_demo: bool,
    /// Rate at which the host reads snapshots to pose the cube (frames per second).
    pub render_hz: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            motion: MotionConfig::default(),
            start_in_demo: false,
            fallback_to_demo: true,
            render_hz: 60,
        }
    }
}

impl AppConfig {
    /// Clamp every tunable into its supported range.
    pub fn sanitized(mut self) -> Self {
        self.motion = self.motion.sanitized();
        self.render_hz = self.render_hz.clamp(1, 240);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Sensor sampling rate in Hz (30-100).
    pub sample_hz: f64,
    /// Low-pass factor toward the newest orientation. 0 = frozen, 1 = raw.
    pub smoothing: f32,
    /// Fraction of velocity removed every tick (0-0.2).
    pub damping: f32,
    /// Per-axis velocity bound (units/s).
    pub max_speed: f32,
    /// Per-axis position bound (units).
    pub max_range: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            sample_hz: 60.0,
            smoothing: 0.15,
            damping: 0.02,
            max_speed: 2.0,
            max_range: 1.0,
        }
    }
}

impl MotionConfig {
    /// Clamp each field into its supported range. Non-finite or non-positive
    /// values fall back to the default for that field.
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        let sample_hz = if self.sample_hz.is_finite() {
            self.sample_hz.clamp(SAMPLE_HZ_RANGE.0, SAMPLE_HZ_RANGE.1)
        } else {
            defaults.sample_hz
        };
        let smoothing = if self.smoothing.is_finite() {
            self.smoothing.clamp(SMOOTHING_RANGE.0, SMOOTHING_RANGE.1)
        } else {
            defaults.smoothing
        };
        let damping = if self.damping.is_finite() {
            self.damping.clamp(DAMPING_RANGE.0, DAMPING_RANGE.1)
        } else {
            defaults.damping
        };
        let positive_or = |v: f32, fallback: f32| {
            if v.is_finite() && v > 0.0 {
                v
            } else {
                fallback
            }
        };

        Self {
            sample_hz,
            smoothing,
            damping,
            max_speed: positive_or(self.max_speed, defaults.max_speed),
            max_range: positive_or(self.max_range, defaults.max_range),
        }
    }

    /// Nominal time between samples, used when no previous timestamp exists.
    pub fn sample_period(&self) -> f64 {
        1.0 / self.sample_hz
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_clamps_out_of_range_fields() {
        let cfg = MotionConfig {
            sample_hz: 500.0,
            smoothing: -0.5,
            damping: 0.9,
            max_speed: -1.0,
            max_range: f32::NAN,
        }
        .sanitized();

        assert_eq!(cfg.sample_hz, 100.0);
        assert_eq!(cfg.smoothing, 0.0);
        assert_eq!(cfg.damping, 0.2);
        assert_eq!(cfg.max_speed, MotionConfig::default().max_speed);
        assert_eq!(cfg.max_range, MotionConfig::default().max_range);
    }

    #[test]
    fn sanitize_keeps_valid_config() {
        let cfg = MotionConfig::default();
        assert_eq!(cfg.sanitized(), cfg);
    }

    #[test]
    fn sample_period_matches_rate() {
        let cfg = MotionConfig {
            sample_hz: 50.0,
            ..MotionConfig::default()
        };
        assert!((cfg.sample_period() - 0.02).abs() < 1e-12);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let cfg: AppConfig = toml::from_str("start_in_demo = true\n[motion]\nsmoothing = 0.5\n")
            .unwrap();
        assert!(cfg.start_in_demo);
        assert!(cfg.fallback_to_demo);
        assert_eq!(cfg.motion.smoothing, 0.5);
        assert_eq!(cfg.motion.sample_hz, 60.0);
    }
}
