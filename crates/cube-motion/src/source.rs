use crate::types::MotionSample;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SensorError {
    #[error("Device motion not available")]
    Unavailable,
    #[error("Sensor error: {0}")]
    Transient(String),
}

/// A sample stamped with the moment it was handed to the engine.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TimedSample {
    pub sample: MotionSample,
    pub received: Instant,
}

#[derive(Debug)]
pub(crate) enum SourceEventKind {
    Sample(TimedSample),
    Error(String),
    Closed,
}

/// Event from a sample source, tagged with the source generation that produced it.
#[derive(Debug)]
pub(crate) struct SourceEvent {
    pub generation: u64,
    pub kind: SourceEventKind,
}

/// Handle a sample producer pushes into.
///
/// Each start of a source gets a sink with a fresh generation; events from
/// sinks of earlier generations are discarded by the engine.
#[derive(Debug, Clone)]
pub struct SampleSink {
    generation: u64,
    tx: mpsc::UnboundedSender<SourceEvent>,
}

impl SampleSink {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<SourceEvent>) -> Self {
        Self { generation, tx }
    }

    /// Deliver a sample. Returns `false` once the engine has gone away.
    pub fn push(&self, sample: MotionSample) -> bool {
        self.send(SourceEventKind::Sample(TimedSample {
            sample,
            received: Instant::now(),
        }))
    }

    /// Report a recoverable sensor problem; sampling continues.
    pub fn report_error(&self, message: impl Into<String>) -> bool {
        self.send(SourceEventKind::Error(message.into()))
    }

    /// Signal that no further samples will arrive from this source.
    pub fn close(&self) -> bool {
        self.send(SourceEventKind::Closed)
    }

    fn send(&self, kind: SourceEventKind) -> bool {
        self.tx
            .send(SourceEvent {
                generation: self.generation,
                kind,
            })
            .is_ok()
    }
}

/// Platform motion sensor: an asynchronous push producer of samples.
pub trait MotionSensor: Send {
    /// Whether the device can deliver motion samples at all.
    fn is_available(&self) -> bool;
    /// Begin delivering samples to `sink` roughly every `interval`.
    fn start(&mut self, interval: Duration, sink: SampleSink) -> Result<(), SensorError>;
    /// Stop delivering samples. Must be idempotent.
    fn stop(&mut self);
}

/// Sensor for hosts without motion hardware (desktop, simulators).
#[derive(Debug, Default)]
pub struct UnavailableSensor;

impl MotionSensor for UnavailableSensor {
    fn is_available(&self) -> bool {
        false
    }

    fn start(&mut self, _interval: Duration, _sink: SampleSink) -> Result<(), SensorError> {
        Err(SensorError::Unavailable)
    }

    fn stop(&mut self) {}
}

#[derive(Debug, Clone)]
struct FeedTarget {
    sink: SampleSink,
    interval: Duration,
}

/// Adapter for callback-driven platform sensor APIs.
///
/// The engine owns the `PushSensor`; the host keeps the paired `SensorFeed`
/// and calls it from whatever thread its platform callback runs on.
#[derive(Debug)]
pub struct PushSensor {
    target: watch::Sender<Option<FeedTarget>>,
}

/// Host side of a [`PushSensor`].
#[derive(Debug, Clone)]
pub struct SensorFeed {
    target: watch::Receiver<Option<FeedTarget>>,
}

impl PushSensor {
    pub fn new() -> (Self, SensorFeed) {
        let (target, rx) = watch::channel(None);
        (Self { target }, SensorFeed { target: rx })
    }
}

impl MotionSensor for PushSensor {
    fn is_available(&self) -> bool {
        true
    }

    fn start(&mut self, interval: Duration, sink: SampleSink) -> Result<(), SensorError> {
        self.target.send_replace(Some(FeedTarget { sink, interval }));
        tracing::debug!(?interval, "Push sensor attached");
        Ok(())
    }

    fn stop(&mut self) {
        self.target.send_replace(None);
    }
}

impl SensorFeed {
    /// Whether the engine is currently accepting samples from this feed.
    pub fn is_active(&self) -> bool {
        self.target.borrow().is_some()
    }

    /// Requested update interval, if the feed is active.
    pub fn interval(&self) -> Option<Duration> {
        self.target.borrow().as_ref().map(|t| t.interval)
    }

    /// Forward a sample. Returns `false` if the feed is inactive.
    pub fn push(&self, sample: MotionSample) -> bool {
        self.with_sink(|sink| sink.push(sample))
    }

    /// Forward a recoverable error message.
    pub fn report_error(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        self.with_sink(|sink| sink.report_error(message))
    }

    /// Tell the engine the platform stream has ended.
    pub fn disconnect(&self) -> bool {
        self.with_sink(|sink| sink.close())
    }

    fn with_sink(&self, f: impl FnOnce(&SampleSink) -> bool) -> bool {
        let sink = self.target.borrow().as_ref().map(|t| t.sink.clone());
        sink.map(|s| f(&s)).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    fn sample(timestamp: f64) -> MotionSample {
        MotionSample {
            timestamp,
            orientation: Quat::IDENTITY,
            acceleration: Vec3::ZERO,
        }
    }

    #[test]
    fn unavailable_sensor_refuses_to_start() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut sensor = UnavailableSensor;
        assert!(!sensor.is_available());
        assert_eq!(
            sensor.start(Duration::from_millis(10), SampleSink::new(1, tx)),
            Err(SensorError::Unavailable)
        );
    }

    #[tokio::test]
    async fn feed_forwards_only_while_started() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (mut sensor, feed) = PushSensor::new();

        assert!(!feed.is_active());
        assert!(!feed.push(sample(0.0)));

        sensor
            .start(Duration::from_millis(20), SampleSink::new(7, tx))
            .unwrap();
        assert_eq!(feed.interval(), Some(Duration::from_millis(20)));
        assert!(feed.push(sample(1.0)));
        assert!(feed.report_error("glitch"));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.generation, 7);
        assert!(matches!(event.kind, SourceEventKind::Sample(s) if s.sample.timestamp == 1.0));
        let event = rx.recv().await.unwrap();
        assert!(matches!(event.kind, SourceEventKind::Error(ref m) if m == "glitch"));

        sensor.stop();
        assert!(!feed.is_active());
        assert!(!feed.push(sample(2.0)));
    }

    #[test]
    fn sink_reports_closed_engine() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = SampleSink::new(1, tx);
        drop(rx);
        assert!(!sink.push(sample(0.0)));
    }
}
