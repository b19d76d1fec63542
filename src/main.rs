use anyhow::Result;
use cube_config::{AppConfig, MotionConfig};
use cube_motion::{MotionEngine, MotionSnapshot, UnavailableSensor};
use cube_scene::camera::Camera;
use cube_scene::scene::CubeNode;
use std::io::BufRead;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Operator command read from stdin.
#[derive(Debug, PartialEq)]
enum Control {
    Start(Option<bool>),
    Stop,
    Calibrate,
    SampleHz(f64),
    Smoothing(f32),
    Damping(f32),
    Status,
    Quit,
}

fn parse_control(line: &str) -> Option<Control> {
    let mut parts = line.split_whitespace();
    let cmd = parts.next()?;
    let arg = parts.next();
    let control = match (cmd, arg) {
        ("start", None) => Control::Start(None),
        ("demo", None) => Control::Start(Some(true)),
        ("sensor", None) => Control::Start(Some(false)),
        ("stop", None) => Control::Stop,
        ("calibrate" | "recenter", None) => Control::Calibrate,
        ("hz", Some(v)) => Control::SampleHz(v.parse().ok()?),
        ("smoothing", Some(v)) => Control::Smoothing(v.parse().ok()?),
        ("damping", Some(v)) => Control::Damping(v.parse().ok()?),
        ("status", None) => Control::Status,
        ("quit" | "exit", None) => Control::Quit,
        _ => return None,
    };
    Some(control)
}

/// Apply a command. `config` is the host's copy of the tuning, updated in
/// place. Returns `false` when the host should exit.
fn apply_control(engine: &MotionEngine, config: &mut MotionConfig, control: Control) -> bool {
    match control {
        Control::Start(demo) => engine.start(demo),
        Control::Stop => engine.stop(),
        Control::Calibrate => engine.calibrate(),
        Control::SampleHz(hz) => {
            config.sample_hz = hz;
            engine.set_config(*config);
        }
        Control::Smoothing(alpha) => {
            config.smoothing = alpha;
            engine.set_config(*config);
        }
        Control::Damping(damping) => {
            config.damping = damping;
            engine.set_config(*config);
        }
        Control::Status => log_snapshot(&engine.snapshot()),
        Control::Quit => return false,
    }
    true
}

/// Stdin lines, read on a plain thread outside the runtime.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(?e, "Failed to read stdin, ignoring further input");
                    break;
                }
            }
        }
    });
    rx
}

fn log_snapshot(snapshot: &MotionSnapshot) {
    let (roll, pitch, yaw) = snapshot.euler_degrees();
    info!(
        status = ?snapshot.status,
        demo = snapshot.using_demo,
        sample_hz = snapshot.sample_hz.round(),
        latency_ms = snapshot.latency_ms,
        roll,
        pitch,
        yaw,
        position = ?snapshot.position,
        error = snapshot.error.as_deref().unwrap_or(""),
        "Motion status"
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "accelocube=info,cube_motion=info,cube_config=info".into()),
        )
        .init();

    info!("AcceloCube starting");

    // Load config.
    let mut config = cube_config::load_config().unwrap_or_else(|e| {
        warn!(?e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    info!(
        sample_hz = config.motion.sample_hz,
        demo = config.start_in_demo,
        "Config loaded"
    );

    // No motion hardware on this host; the engine falls back to demo samples.
    let engine = MotionEngine::spawn(UnavailableSensor, &config);
    engine.start(None);

    let mut cube = CubeNode::default();
    let camera = Camera::new(16.0 / 9.0);
    let mut frames = tokio::time::interval(Duration::from_secs_f64(
        1.0 / f64::from(config.render_hz),
    ));
    frames.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut frame_count: u64 = 0;

    let mut lines = spawn_stdin_reader();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = frames.tick() => {
                cube.apply(&engine.snapshot());
                let mvp = camera.view_projection() * cube.model_matrix();
                frame_count += 1;
                if frame_count % (u64::from(config.render_hz) * 5) == 0 {
                    let corners = cube.corners();
                    let lowest = corners.iter().map(|c| c.y).fold(f32::INFINITY, f32::min);
                    let highest = corners.iter().map(|c| c.y).fold(f32::NEG_INFINITY, f32::max);
                    tracing::debug!(
                        frames = frame_count,
                        center = ?mvp.w_axis,
                        lowest,
                        highest,
                        "Render heartbeat"
                    );
                    log_snapshot(&engine.snapshot());
                }
            }
            line = lines.recv(), if stdin_open => {
                match line {
                    Some(line) => match parse_control(&line) {
                        Some(control) => {
                            if !apply_control(&engine, &mut config.motion, control) {
                                break;
                            }
                        }
                        None if line.trim().is_empty() => {}
                        None => warn!(%line, "Unknown command"),
                    },
                    None => stdin_open = false,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    // Save config on exit.
    config.motion = config.motion.sanitized();
    engine.shutdown().await;
    if let Err(e) = cube_config::save_config(&config) {
        error!(?e, "Failed to save config");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(parse_control("start"), Some(Control::Start(None)));
        assert_eq!(parse_control("demo"), Some(Control::Start(Some(true))));
        assert_eq!(parse_control(" sensor "), Some(Control::Start(Some(false))));
        assert_eq!(parse_control("recenter"), Some(Control::Calibrate));
        assert_eq!(parse_control("hz 90"), Some(Control::SampleHz(90.0)));
        assert_eq!(parse_control("damping 0.05"), Some(Control::Damping(0.05)));
        assert_eq!(parse_control("quit"), Some(Control::Quit));
    }

    #[test]
    fn rejects_malformed_commands() {
        assert_eq!(parse_control(""), None);
        assert_eq!(parse_control("hz"), None);
        assert_eq!(parse_control("hz fast"), None);
        assert_eq!(parse_control("stop now"), None);
        assert_eq!(parse_control("jump"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn controls_reach_the_engine() {
        let engine = MotionEngine::spawn(UnavailableSensor, &AppConfig::default());
        let mut rx = engine.subscribe();
        let mut config = MotionConfig::default();

        assert!(apply_control(&engine, &mut config, Control::Start(Some(true))));
        assert!(apply_control(&engine, &mut config, Control::SampleHz(90.0)));
        assert!(apply_control(&engine, &mut config, Control::Smoothing(0.4)));
        rx.wait_for(|s| s.samples >= 2 && (s.sample_hz - 90.0).abs() < 1e-3)
            .await
            .unwrap();

        let applied = engine.config();
        assert_eq!(applied.sample_hz, 90.0);
        assert_eq!(applied.smoothing, 0.4);
        assert!(!apply_control(&engine, &mut config, Control::Quit));

        engine.shutdown().await;
    }
}
