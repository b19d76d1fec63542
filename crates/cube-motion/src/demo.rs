use crate::source::SampleSink;
use crate::types::MotionSample;
use glam::{EulerRot, Quat, Vec3};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Synthetic motion source used when no sensor is available.
///
/// Every output is a pure function of elapsed time, so a fixed sequence of
/// `t` values always yields the same samples.
#[derive(Debug, Clone, Copy)]
pub struct DemoGenerator {
    /// Peak linear acceleration per axis (units/s^2).
    pub accel_amplitude: f32,
}

impl Default for DemoGenerator {
    fn default() -> Self {
        Self {
            accel_amplitude: 0.6,
        }
    }
}

impl DemoGenerator {
    /// Sample at `t` seconds of demo time.
    pub fn sample_at(&self, t: f64) -> MotionSample {
        // Slow tumble about a wandering axis.
        let axis = Vec3::new(
            (t * 0.4).sin() as f32,
            (t * 0.5).cos() as f32,
            (t * 0.3).sin() as f32,
        )
        .try_normalize()
        .unwrap_or(Vec3::Y);
        let spin = Quat::from_axis_angle(axis, (t * 0.8) as f32);

        // Gentle roll/pitch wobble on top.
        let roll = ((t * 1.2).sin() * 8.0).to_radians() as f32;
        let pitch = ((t * 0.9).cos() * 6.0).to_radians() as f32;
        let wobble = Quat::from_euler(EulerRot::XYZ, pitch, roll, 0.0);

        let a = self.accel_amplitude;
        let acceleration = Vec3::new(
            a * (t * 1.1).sin() as f32,
            a * 0.5 * (t * 0.7).sin() as f32,
            a * 0.25 * (t * 1.7).sin() as f32,
        );

        MotionSample {
            timestamp: t,
            orientation: (spin * wobble).normalize(),
            acceleration,
        }
    }
}

/// Drive `generator` at `sample_hz` until `cancel` flips to true (or its
/// sender is dropped) or the sink's engine goes away.
pub async fn run_demo(
    generator: DemoGenerator,
    sample_hz: f64,
    sink: SampleSink,
    mut cancel: watch::Receiver<bool>,
) {
    let dt = 1.0 / sample_hz;
    let period = Duration::from_secs_f64(dt);
    let mut t = 0.0;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    break;
                }
                continue;
            }
        }
        if *cancel.borrow() {
            break;
        }

        t += dt;
        if !sink.push(generator.sample_at(t)) {
            break;
        }
    }
    tracing::debug!(elapsed = t, "Demo generator stopped");
}

/// A running demo task.
pub struct DemoHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DemoHandle {
    pub fn spawn(generator: DemoGenerator, sample_hz: f64, sink: SampleSink) -> Self {
        let (cancel, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(run_demo(generator, sample_hz, sink, cancel_rx));
        tracing::debug!(sample_hz, "Demo generator started");
        Self { cancel, task }
    }

    /// Ask the task to stop. It exits before producing another sample.
    pub fn cancel(self) {
        let _ = self.cancel.send(true);
    }

    #[cfg(test)]
    fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{SourceEvent, SourceEventKind};
    use tokio::sync::mpsc;

    #[test]
    fn same_time_gives_same_sample() {
        let generator = DemoGenerator::default();
        for &t in &[0.0, 0.016, 1.5, 42.0, 1234.5] {
            assert_eq!(generator.sample_at(t), generator.sample_at(t));
        }
    }

    #[test]
    fn samples_are_unit_quaternions() {
        let generator = DemoGenerator::default();
        for i in 0..600 {
            let sample = generator.sample_at(i as f64 / 60.0);
            assert!((sample.orientation.length() - 1.0).abs() < 1e-5);
            assert!(sample.acceleration.abs().max_element() <= generator.accel_amplitude);
        }
    }

    #[test]
    fn golden_sample_at_time_zero() {
        let sample = DemoGenerator::default().sample_at(0.0);
        // No spin at t = 0, only the 6 degree pitch offset.
        let expected = Quat::from_rotation_x(6f32.to_radians());
        assert!(sample.orientation.angle_between(expected) < 1e-5);
        assert_eq!(sample.acceleration, Vec3::ZERO);
        assert_eq!(sample.timestamp, 0.0);
    }

    #[test]
    fn output_varies_smoothly() {
        let generator = DemoGenerator::default();
        let a = generator.sample_at(10.0);
        let b = generator.sample_at(10.0 + 1.0 / 60.0);
        assert!(a.orientation.angle_between(b.orientation) < 0.05);
        assert!((a.acceleration - b.acceleration).length() < 0.05);
    }

    fn collect(rx: &mut mpsc::UnboundedReceiver<SourceEvent>) -> Vec<MotionSample> {
        let mut samples = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let SourceEventKind::Sample(s) = event.kind {
                samples.push(s.sample);
            }
        }
        samples
    }

    #[tokio::test(start_paused = true)]
    async fn emits_at_sample_rate_until_cancelled() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = DemoHandle::spawn(DemoGenerator::default(), 50.0, SampleSink::new(3, tx));

        tokio::time::sleep(Duration::from_millis(105)).await;
        let samples = collect(&mut rx);
        assert_eq!(samples.len(), 5);
        assert!((samples[0].timestamp - 0.02).abs() < 1e-9);
        assert_eq!(samples[1], DemoGenerator::default().sample_at(samples[1].timestamp));

        handle.cancel();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(collect(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_observed_within_one_tick() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = DemoHandle::spawn(DemoGenerator::default(), 30.0, SampleSink::new(1, tx));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let (cancel, task) = (handle.cancel, handle.task);
        cancel.send(true).unwrap();
        tokio::time::timeout(Duration::from_millis(34), task)
            .await
            .expect("demo task should stop within one tick")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_engine_goes_away() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = DemoHandle::spawn(DemoGenerator::default(), 100.0, SampleSink::new(1, tx));
        drop(rx);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_finished());
    }
}
