//! Camera manager facade.
//!
//! Orchestrates startup and shutdown ordering: enumerate sources, spawn one
//! capture worker per source, optionally run the blocking display loop on the
//! calling thread, and on stop signal every worker and join them with a
//! bounded wait.
//!
//! `start()` blocks until stop/exit-key (or fails fast on an empty source
//! set); `stop()` is idempotent and safe to call from any thread, including
//! a signal handler; `get_frames()` is safe to call concurrently with
//! running workers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::capture::{CaptureBackend, SystemBackend};
use crate::config::ManagerConfig;
use crate::display::{DisplayBackend, DisplayMultiplexer, NullDisplay};
use crate::error::{Error, Result};
use crate::frame::{CameraId, FrameRecord};
use crate::sink::{FrameDispatcher, FrameSink};
use crate::source::{enumerate_sources, SourceDescriptor};
use crate::store::FrameStore;
use crate::worker::{CaptureWorker, WorkerConfig, WorkerHandle};

/// How long `stop()` waits for each worker before abandoning it.
const JOIN_DEADLINE: Duration = Duration::from_secs(2);

/// Poll slice for the headless wait in `start()`.
const STOP_POLL: Duration = Duration::from_millis(50);

/// Manager lifecycle. `start()` is accepted only in `Created`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManagerState {
    Created,
    Running,
    Stopping,
    Stopped,
}

pub struct CameraManager {
    config: ManagerConfig,
    backend: Arc<dyn CaptureBackend>,
    sink: Option<Arc<dyn FrameSink>>,
    display: Mutex<Option<Box<dyn DisplayBackend>>>,
    store: Arc<FrameStore>,
    stop: Arc<AtomicBool>,
    state: Mutex<ManagerState>,
    workers: Mutex<Vec<WorkerHandle>>,
}

impl CameraManager {
    /// Manager over the default system backend (stub/V4L2/GStreamer
    /// dispatch).
    pub fn new(config: ManagerConfig) -> Self {
        Self::with_backend(config, Arc::new(SystemBackend::new()))
    }

    /// Manager over an injected capture backend.
    pub fn with_backend(config: ManagerConfig, backend: Arc<dyn CaptureBackend>) -> Self {
        Self {
            config,
            backend,
            sink: None,
            display: Mutex::new(None),
            store: Arc::new(FrameStore::new()),
            stop: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(ManagerState::Created),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Install the per-frame callback sink.
    pub fn frame_sink(mut self, sink: Arc<dyn FrameSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Install the display backend used when `show_gui` is set. Without one,
    /// a [`NullDisplay`] is used.
    pub fn display(self, backend: Box<dyn DisplayBackend>) -> Self {
        *self.lock_display() = Some(backend);
        self
    }

    pub fn state(&self) -> ManagerState {
        *self.lock_state()
    }

    pub fn store(&self) -> Arc<FrameStore> {
        self.store.clone()
    }

    /// Snapshot of every camera's latest frame. No side effects; safe to
    /// call concurrently with running workers.
    pub fn get_frames(&self) -> HashMap<CameraId, FrameRecord> {
        self.store.get_all()
    }

    /// Start workers and block until stop.
    ///
    /// With `show_gui` the display loop runs here, on the calling thread,
    /// until an exit key or `stop()`. Headless, the call blocks until
    /// `stop()` is invoked from another thread. Returns an error without
    /// side effects if configuration validation or enumeration fails.
    pub fn start(&self) -> Result<()> {
        self.config.validate()?;

        if self.state() != ManagerState::Created {
            return Err(Error::AlreadyStarted);
        }

        // Enumeration can spend seconds trial-opening devices; run it without
        // the state lock so a concurrent stop() stays responsive.
        let sources = enumerate_sources(&self.config, self.backend.as_ref())?;

        {
            let mut state = self.lock_state();
            if *state != ManagerState::Created {
                return Err(Error::AlreadyStarted);
            }
            // Register the worker handles before Running becomes visible, so
            // a stop() racing this call always finds the workers it must
            // join.
            self.spawn_workers(&sources)?;
            *state = ManagerState::Running;
        }

        log::info!(
            "starting {} camera worker(s) ({} mode)",
            sources.len(),
            if self.config.rtsp_urls.is_empty() {
                "USB"
            } else {
                "IP"
            }
        );

        if self.config.show_gui {
            let mut backend = self
                .lock_display()
                .take()
                .unwrap_or_else(|| Box::new(NullDisplay));
            let mut multiplexer = DisplayMultiplexer::new(
                self.store.clone(),
                self.stop.clone(),
                &self.config,
                &sources,
            );
            multiplexer.run(backend.as_mut());
        } else {
            while !self.stop.load(Ordering::SeqCst) {
                std::thread::sleep(STOP_POLL);
            }
        }

        // Exit key or external stop: make sure workers are joined either way.
        self.stop();
        // If another thread's stop() is doing the joining, wait it out so
        // this call also returns only after every worker has released its
        // resources.
        while self.state() == ManagerState::Stopping {
            std::thread::sleep(STOP_POLL);
        }
        Ok(())
    }

    /// Signal every worker to stop and join them with a bounded wait.
    ///
    /// Idempotent; a second call (from any thread) returns immediately.
    pub fn stop(&self) {
        {
            let mut state = self.lock_state();
            match *state {
                ManagerState::Running => *state = ManagerState::Stopping,
                ManagerState::Created => {
                    // Never started: nothing to join.
                    *state = ManagerState::Stopped;
                    self.stop.store(true, Ordering::SeqCst);
                    return;
                }
                ManagerState::Stopping | ManagerState::Stopped => return,
            }
        }

        self.stop.store(true, Ordering::SeqCst);

        let mut workers = std::mem::take(&mut *self.lock_workers());
        for worker in &mut workers {
            worker.join_within(JOIN_DEADLINE);
        }
        log::info!("all camera workers stopped");

        *self.lock_state() = ManagerState::Stopped;
    }

    fn spawn_workers(&self, sources: &[SourceDescriptor]) -> Result<()> {
        let dispatcher = self.sink.clone().map(FrameDispatcher::new);
        let worker_config = WorkerConfig {
            settings: self.config.stream_settings(),
            min_uptime: self.config.min_uptime,
            retry_interval: self.config.retry_interval,
        };
        let mut workers = self.lock_workers();
        for source in sources {
            let worker = CaptureWorker {
                descriptor: source.clone(),
                config: worker_config,
                backend: self.backend.clone(),
                store: self.store.clone(),
                dispatcher: dispatcher.clone(),
                stop: self.stop.clone(),
            };
            match worker.spawn() {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    let mut spawned = std::mem::take(&mut *workers);
                    drop(workers);
                    self.roll_back_spawned(&mut spawned);
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Stop and join the workers of a partially failed spawn, leaving the
    /// manager in the state it had before the attempt.
    fn roll_back_spawned(&self, spawned: &mut Vec<WorkerHandle>) {
        self.stop.store(true, Ordering::SeqCst);
        for handle in spawned.iter_mut() {
            handle.join_within(JOIN_DEADLINE);
        }
        self.stop.store(false, Ordering::SeqCst);
    }

    // Lock helpers: none of these guards are held across user code or worker
    // joins that could panic, so recover from poisoning instead of cascading.
    fn lock_state(&self) -> std::sync::MutexGuard<'_, ManagerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_workers(&self) -> std::sync::MutexGuard<'_, Vec<WorkerHandle>> {
        self.workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_display(&self) -> std::sync::MutexGuard<'_, Option<Box<dyn DisplayBackend>>> {
        self.display
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::StubBackend;

    #[test]
    fn start_requires_a_resolvable_source() {
        let config = ManagerConfig {
            max_cameras: 2,
            ..ManagerConfig::default()
        };
        let manager = CameraManager::with_backend(config, Arc::new(StubBackend::new()));
        let err = manager.start().unwrap_err();
        assert!(matches!(err, Error::NoCamerasAvailable));
        // A failed start leaves the manager in its created state.
        assert_eq!(manager.state(), ManagerState::Created);
    }

    #[test]
    fn partial_spawn_rollback_stops_started_workers() {
        let config = ManagerConfig {
            rtsp_urls: vec!["stub://cam".into()],
            fps: 100,
            min_uptime: Duration::from_millis(100),
            retry_interval: Duration::from_millis(50),
            ..ManagerConfig::default()
        };
        let manager = CameraManager::with_backend(config, Arc::new(StubBackend::new()));
        let sources = vec![SourceDescriptor::ip(0, "stub://cam")];
        manager.spawn_workers(&sources).expect("spawn workers");

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while manager.store.get(0).is_none() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(manager.store.get(0).is_some(), "worker never streamed");

        let mut spawned = std::mem::take(&mut *manager.lock_workers());
        manager.roll_back_spawned(&mut spawned);

        // The flag is cleared again so a later start() can spawn fresh
        // workers.
        assert!(!manager.stop.load(Ordering::SeqCst));
        // Joined workers write nothing further.
        let sequence = manager.store.get(0).map(|record| record.sequence);
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(manager.store.get(0).map(|record| record.sequence), sequence);
    }

    #[test]
    fn stop_before_start_is_safe() {
        let manager = CameraManager::new(ManagerConfig::default());
        manager.stop();
        manager.stop();
        assert_eq!(manager.state(), ManagerState::Stopped);
    }
}
