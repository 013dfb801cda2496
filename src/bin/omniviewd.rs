//! omniviewd - headless multi-camera capture daemon.
//!
//! Runs the camera manager without a viewer: one worker per configured
//! source, frames published to the shared store, a periodic health line per
//! camera in the log. SIGINT/SIGTERM stop the manager cleanly.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use omniview::{CameraManager, FrameStore, OmniviewdConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// RTSP URLs (repeatable). Overrides the config file; empty selects USB
    /// mode.
    #[arg(long = "rtsp-url")]
    rtsp_urls: Vec<String>,
    /// Target frames per second per camera.
    #[arg(long)]
    fps: Option<u32>,
    /// Upper bound of the USB device index probe range.
    #[arg(long)]
    max_cameras: Option<u32>,
    /// Seconds between health log lines.
    #[arg(long, default_value_t = 5)]
    health_interval: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = OmniviewdConfig::load().context("load configuration")?;
    if !args.rtsp_urls.is_empty() {
        cfg.manager.rtsp_urls = args.rtsp_urls.clone();
    }
    if let Some(fps) = args.fps {
        cfg.manager.fps = fps;
    }
    if let Some(max_cameras) = args.max_cameras {
        cfg.manager.max_cameras = max_cameras;
    }
    // The daemon is headless; the viewer belongs to embedding applications.
    cfg.manager.show_gui = false;

    let manager = Arc::new(CameraManager::new(cfg.manager.clone()));

    let signal_manager = manager.clone();
    ctrlc::set_handler(move || {
        log::info!("stop signal received");
        signal_manager.stop();
    })
    .context("install signal handler")?;

    let health = spawn_health_logger(
        manager.store(),
        Duration::from_secs(args.health_interval.max(1)),
        cfg.manager.liveness_window,
    );

    log::info!(
        "omniviewd starting ({} mode)",
        if cfg.manager.rtsp_urls.is_empty() {
            "USB"
        } else {
            "IP"
        }
    );
    manager.start().context("run camera manager")?;

    drop(health);
    log::info!("omniviewd stopped");
    Ok(())
}

/// Logs a per-store health line until the returned guard is dropped.
fn spawn_health_logger(
    store: Arc<FrameStore>,
    interval: Duration,
    liveness_window: Duration,
) -> HealthLogger {
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let stop_thread = stop.clone();
    let join = std::thread::spawn(move || {
        let mut last_log = std::time::Instant::now();
        while !stop_thread.load(std::sync::atomic::Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(100));
            if last_log.elapsed() < interval {
                continue;
            }
            last_log = std::time::Instant::now();
            let frames = store.get_all();
            let live = store.live_ids(liveness_window);
            log::info!("health: {} camera(s), {} live", frames.len(), live.len());
            for (id, record) in &frames {
                log::debug!(
                    "health: camera {} seq={} age={:?} {}x{}",
                    id,
                    record.sequence,
                    record.age(),
                    record.frame.width(),
                    record.frame.height()
                );
            }
        }
    });
    HealthLogger {
        stop,
        join: Some(join),
    }
}

struct HealthLogger {
    stop: Arc<std::sync::atomic::AtomicBool>,
    join: Option<std::thread::JoinHandle<()>>,
}

impl Drop for HealthLogger {
    fn drop(&mut self) {
        self.stop.store(true, std::sync::atomic::Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}
