pub mod demo;
pub mod filter;
pub mod source;
pub mod types;

pub use demo::DemoGenerator;
pub use filter::MotionFilter;
pub use source::{MotionSensor, PushSensor, SampleSink, SensorError, SensorFeed, UnavailableSensor};
pub use types::{MotionSample, MotionSnapshot, MotionStatus};

use cube_config::{AppConfig, MotionConfig};
use demo::DemoHandle;
use source::{SourceEvent, SourceEventKind, TimedSample};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Message shown when the device sensor is missing and demo fallback is off.
const SENSOR_MISSING_MESSAGE: &str = "Device motion not available. Enable demo mode.";

/// Commands sent to the motion processing task.
enum EngineCommand {
    Start(Option<bool>),
    Stop,
    Calibrate,
    SetConfig(MotionConfig),
    Shutdown,
}

/// Handle to the motion pipeline.
///
/// A background task owns the filter and is the only writer of motion state.
/// Commands and samples are queued to it and applied one at a time; readers
/// get the latest published snapshot.
pub struct MotionEngine {
    snapshot_rx: watch::Receiver<MotionSnapshot>,
    config_rx: watch::Receiver<MotionConfig>,
    command_tx: mpsc::UnboundedSender<EngineCommand>,
    task: tokio::task::JoinHandle<()>,
}

impl MotionEngine {
    /// Spawn the processing task. Sampling begins on `start`.
    pub fn spawn(sensor: impl MotionSensor + 'static, config: &AppConfig) -> Self {
        let motion = config.motion.sanitized();
        let (snapshot_tx, snapshot_rx) = watch::channel(MotionSnapshot::default());
        let (config_tx, config_rx) = watch::channel(motion);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let state = EngineState {
            filter: MotionFilter::new(motion),
            sensor: Box::new(sensor),
            generator: DemoGenerator::default(),
            prefer_demo: config.start_in_demo,
            fallback_to_demo: config.fallback_to_demo,
            generation: 0,
            active: None,
            event_tx,
            snapshot_tx,
            config_tx,
        };
        let task = tokio::spawn(engine_loop(state, command_rx, event_rx));

        Self {
            snapshot_rx,
            config_rx,
            command_tx,
            task,
        }
    }

    /// Start sampling. `Some(true)` forces demo mode, `Some(false)` asks for the
    /// device sensor, `None` keeps the previous choice.
    pub fn start(&self, demo: Option<bool>) {
        let _ = self.command_tx.send(EngineCommand::Start(demo));
    }

    pub fn stop(&self) {
        let _ = self.command_tx.send(EngineCommand::Stop);
    }

    /// Treat the current pose as neutral and zero velocity and position.
    pub fn calibrate(&self) {
        let _ = self.command_tx.send(EngineCommand::Calibrate);
    }

    /// Replace the tuning. Out-of-range values are clamped.
    pub fn set_config(&self, config: MotionConfig) {
        let _ = self.command_tx.send(EngineCommand::SetConfig(config));
    }

    /// Tuning currently applied by the processing task.
    pub fn config(&self) -> MotionConfig {
        *self.config_rx.borrow()
    }

    /// Latest published state (non-blocking).
    pub fn snapshot(&self) -> MotionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver that is notified on every published update.
    pub fn subscribe(&self) -> watch::Receiver<MotionSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Stop sampling and wait for the processing task to exit.
    pub async fn shutdown(self) {
        let _ = self.command_tx.send(EngineCommand::Shutdown);
        if let Err(e) = self.task.await {
            tracing::error!(?e, "Motion task panicked");
        }
    }
}

enum ActiveSource {
    Sensor,
    Demo(DemoHandle),
}

struct EngineState {
    filter: MotionFilter,
    sensor: Box<dyn MotionSensor>,
    generator: DemoGenerator,
    /// Mode used by `start(None)`.
    prefer_demo: bool,
    fallback_to_demo: bool,
    /// Bumped whenever a source is detached; stale events are dropped.
    generation: u64,
    active: Option<ActiveSource>,
    event_tx: mpsc::UnboundedSender<SourceEvent>,
    snapshot_tx: watch::Sender<MotionSnapshot>,
    config_tx: watch::Sender<MotionConfig>,
}

/// Background task: apply commands and samples in arrival order, publish snapshots.
async fn engine_loop(
    mut state: EngineState,
    mut command_rx: mpsc::UnboundedReceiver<EngineCommand>,
    mut event_rx: mpsc::UnboundedReceiver<SourceEvent>,
) {
    loop {
        tokio::select! {
            cmd = command_rx.recv() => {
                match cmd {
                    Some(EngineCommand::Start(demo)) => state.start(demo),
                    Some(EngineCommand::Stop) => state.stop(),
                    Some(EngineCommand::Calibrate) => state.calibrate(),
                    Some(EngineCommand::SetConfig(config)) => state.set_config(config),
                    Some(EngineCommand::Shutdown) | None => break,
                }
            }
            Some(event) = event_rx.recv() => state.handle_event(event),
        }
    }

    state.stop();
    tracing::info!("Motion engine shut down");
}

impl EngineState {
    fn start(&mut self, demo: Option<bool>) {
        self.detach_source();
        if let Some(demo) = demo {
            self.prefer_demo = demo;
        }

        self.filter.begin(self.prefer_demo);
        self.publish();

        if self.prefer_demo {
            self.start_demo();
            tracing::info!(sample_hz = self.filter.config().sample_hz, "Motion started (demo)");
        } else {
            self.start_sensor();
        }
        self.publish();
    }

    fn start_sensor(&mut self) {
        if !self.sensor.is_available() {
            self.sensor_failed(SensorError::Unavailable);
            return;
        }

        let interval = Duration::from_secs_f64(self.filter.config().sample_period());
        let sink = self.sink();
        match self.sensor.start(interval, sink) {
            Ok(()) => {
                self.active = Some(ActiveSource::Sensor);
                self.filter.set_running(false);
                tracing::info!(?interval, "Motion started (sensor)");
            }
            Err(e) => self.sensor_failed(e),
        }
    }

    fn start_demo(&mut self) {
        let handle = DemoHandle::spawn(
            self.generator,
            self.filter.config().sample_hz,
            self.sink(),
        );
        self.active = Some(ActiveSource::Demo(handle));
        self.filter.set_running(true);
    }

    /// The sensor could not be used: fall back to demo or report the error.
    fn sensor_failed(&mut self, error: SensorError) {
        if self.fallback_to_demo {
            tracing::warn!(%error, "Sensor unavailable, falling back to demo");
            self.detach_source();
            self.filter.begin(true);
            self.start_demo();
            self.filter.record_error(error.to_string());
        } else {
            tracing::warn!(%error, "Sensor unavailable and demo fallback disabled");
            self.detach_source();
            self.filter.fail(SENSOR_MISSING_MESSAGE);
        }
    }

    fn stop(&mut self) {
        self.detach_source();
        if self.filter.status() != MotionStatus::Stopped {
            self.filter.stop();
            tracing::info!("Motion stopped");
        }
        self.publish();
    }

    fn calibrate(&mut self) {
        self.filter.calibrate();
        tracing::info!("Calibrated: current pose is now neutral");
        self.publish();
    }

    fn set_config(&mut self, config: MotionConfig) {
        let previous = *self.filter.config();
        self.filter.set_config(config);
        let applied = *self.filter.config();
        let _ = self.config_tx.send(applied);
        tracing::info!(
            sample_hz = applied.sample_hz,
            smoothing = applied.smoothing,
            damping = applied.damping,
            "Motion config updated"
        );

        // The source cadence is fixed when it starts.
        if applied.sample_hz != previous.sample_hz && self.active.is_some() {
            self.start(None);
        }
    }

    fn handle_event(&mut self, event: SourceEvent) {
        if event.generation != self.generation {
            tracing::trace!(
                generation = event.generation,
                current = self.generation,
                "Dropping stale event"
            );
            return;
        }

        match event.kind {
            SourceEventKind::Sample(TimedSample { sample, received }) => {
                self.filter.on_sample(&sample);
                self.filter
                    .set_latency(received.elapsed().as_secs_f64() * 1000.0);
                let snapshot = self.filter.snapshot();
                if snapshot.samples % 1000 == 0 {
                    tracing::debug!(samples = snapshot.samples, "Motion samples processed");
                }
                let _ = self.snapshot_tx.send(snapshot);
            }
            SourceEventKind::Error(message) => {
                tracing::warn!(%message, "Transient sensor error");
                self.filter
                    .record_error(SensorError::Transient(message).to_string());
                self.publish();
            }
            SourceEventKind::Closed => {
                if matches!(self.active, Some(ActiveSource::Sensor)) {
                    self.sensor_failed(SensorError::Unavailable);
                    self.publish();
                }
            }
        }
    }

    fn sink(&self) -> SampleSink {
        SampleSink::new(self.generation, self.event_tx.clone())
    }

    /// Cancel the active source and invalidate anything it already queued.
    fn detach_source(&mut self) {
        match self.active.take() {
            Some(ActiveSource::Sensor) => self.sensor.stop(),
            Some(ActiveSource::Demo(handle)) => handle.cancel(),
            None => {}
        }
        self.generation += 1;
    }

    fn publish(&self) {
        let _ = self.snapshot_tx.send(self.filter.snapshot());
    }
}
