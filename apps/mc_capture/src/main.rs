//! Captures a screen region through the magnifier for a fixed time and logs frame statistics.
//!
//! Usage: `mc_capture [config.json]`. Log verbosity follows `RUST_LOG`.

mod config;

use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use mc_capture::{Frame, VideoPoll};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let config = match std::env::args_os().nth(1) {
        Some(path) => AppConfig::load(Path::new(&path))?,
        None => AppConfig::default(),
    };
    info!(
        version = env!("CARGO_PKG_VERSION"),
        region = ?config.region,
        fps = config.capture.effective_fps(),
        seconds = config.run_seconds,
        "starting capture"
    );

    let stats = run(&config)?;
    info!(
        frames = stats.frames,
        stalls = stats.stalls,
        last_size = ?stats.last_size,
        average_fps = format_args!("{:.1}", stats.average_fps()),
        "capture finished"
    );
    Ok(())
}

#[cfg_attr(not(windows), allow(dead_code))]
#[derive(Debug)]
struct FrameStats {
    started: Instant,
    frames: u64,
    stalls: u64,
    last_size: Option<(u32, u32)>,
    stalled: bool,
}

#[cfg_attr(not(windows), allow(dead_code))]
impl FrameStats {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            frames: 0,
            stalls: 0,
            last_size: None,
            stalled: false,
        }
    }

    fn record(&mut self, poll: VideoPoll) {
        if let Some(frame) = poll.frame {
            self.record_frame(&frame);
        }

        if !poll.alive && !self.stalled {
            self.stalls += 1;
            warn!("no frames within the liveness timeout");
        }
        self.stalled = !poll.alive;
    }

    fn record_frame(&mut self, frame: &Frame) {
        let size = (frame.width(), frame.height());
        if self.last_size != Some(size) {
            info!(width = size.0, height = size.1, stride = frame.stride(), "frame size changed");
        }
        self.last_size = Some(size);
        self.frames += 1;
    }

    fn average_fps(&self) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.frames as f64 / elapsed
        } else {
            0.0
        }
    }
}

#[cfg(windows)]
fn run(config: &AppConfig) -> Result<FrameStats> {
    use std::sync::Arc;

    use anyhow::Context;
    use mc_capture::HookRegistry;
    use mc_platform_windows::{D3d9HookBackend, MagnifierHostFactory};

    let registry = HookRegistry::new(
        D3d9HookBackend::new(),
        Arc::new(MagnifierHostFactory::new()),
        config.capture.clone(),
    );
    registry.init().context("installing device hooks")?;
    let worker = registry.create_magnifier().context("starting capture worker")?;
    worker.set_capture_region(config.region);

    let mut stats = FrameStats::new();
    let deadline = stats.started + config.run_duration();
    while Instant::now() < deadline {
        stats.record(worker.pop_video());
        std::thread::sleep(config.poll_interval());
    }

    registry.destroy_magnifier(&worker);
    registry.uninit();
    Ok(stats)
}

#[cfg(not(windows))]
fn run(_config: &AppConfig) -> Result<FrameStats> {
    anyhow::bail!("magnifier capture is only available on Windows")
}
