//! Per-camera capture workers.
//!
//! One worker thread per enumerated source. The worker owns its capture
//! session exclusively and drives a four-state machine:
//!
//! `CONNECTING -> STREAMING -> RECONNECTING -> (CONNECTING | STOPPED)`
//!
//! While streaming it writes each decoded frame into the shared store,
//! dispatches the frame callback, and paces reads to the configured rate.
//! Read failures inside the startup grace period (`min_uptime`) are retried
//! in place; after the grace period a failure releases the session, removes
//! the camera from the store, and enters the reconnect wait. Reconnection
//! retries forever at a fixed interval until stop is signaled.
//!
//! The stop flag is checked at every loop boundary (post-read, pre-sleep) and
//! all sleeps are sliced, so a stop signal is observed within one read/retry
//! cycle. A worker stuck inside a backend read that never returns is a known
//! limitation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::capture::{CaptureBackend, CaptureSession, StreamSettings};
use crate::error::Result;
use crate::frame::FrameRecord;
use crate::sink::FrameDispatcher;
use crate::source::SourceDescriptor;
use crate::store::FrameStore;

/// Granularity at which sleeping workers re-check the stop flag.
const STOP_POLL: Duration = Duration::from_millis(50);

/// Delay between in-place read retries during the startup grace period.
const GRACE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Worker state machine states. `Stopped` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WorkerState {
    Connecting,
    Streaming,
    Reconnecting,
    Stopped,
}

/// Timing knobs a worker needs besides the stream settings.
#[derive(Clone, Copy, Debug)]
pub(crate) struct WorkerConfig {
    pub settings: StreamSettings,
    pub min_uptime: Duration,
    pub retry_interval: Duration,
}

pub(crate) struct CaptureWorker {
    pub descriptor: SourceDescriptor,
    pub config: WorkerConfig,
    pub backend: Arc<dyn CaptureBackend>,
    pub store: Arc<FrameStore>,
    pub dispatcher: Option<FrameDispatcher>,
    pub stop: Arc<AtomicBool>,
}

/// Join handle for a spawned worker.
pub(crate) struct WorkerHandle {
    descriptor: SourceDescriptor,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Wait for the worker to finish, up to `deadline`. Returns false and
    /// abandons the handle if the worker is still running afterwards.
    pub(crate) fn join_within(&mut self, deadline: Duration) -> bool {
        let Some(join) = self.join.take() else {
            return true;
        };
        let started = Instant::now();
        while !join.is_finished() {
            if started.elapsed() >= deadline {
                log::warn!(
                    "camera {}: worker did not stop within {:?}, abandoning",
                    self.descriptor.id,
                    deadline
                );
                return false;
            }
            std::thread::sleep(STOP_POLL);
        }
        if join.join().is_err() {
            log::error!("camera {}: worker thread panicked", self.descriptor.id);
        }
        true
    }
}

impl CaptureWorker {
    pub(crate) fn spawn(self) -> Result<WorkerHandle> {
        let descriptor = self.descriptor.clone();
        let join = std::thread::Builder::new()
            .name(format!("omniview-cam-{}", descriptor.id))
            .spawn(move || self.run())?;
        Ok(WorkerHandle {
            descriptor,
            join: Some(join),
        })
    }

    fn run(self) {
        let mut state = WorkerState::Connecting;
        let mut session: Option<Box<dyn CaptureSession>> = None;
        let mut sequence: u64 = 0;

        log::info!(
            "camera {}: worker started for {}",
            self.descriptor.id,
            self.descriptor.locator
        );

        loop {
            if self.stop.load(Ordering::SeqCst) {
                state = WorkerState::Stopped;
            }
            state = match state {
                WorkerState::Connecting => self.connect(&mut session),
                WorkerState::Streaming => self.stream(&mut session, &mut sequence),
                WorkerState::Reconnecting => self.reconnect(&mut session),
                WorkerState::Stopped => break,
            };
        }

        // Release the session before the thread exits.
        drop(session);
        log::info!("camera {}: worker stopped", self.descriptor.id);
    }

    fn connect(&self, session: &mut Option<Box<dyn CaptureSession>>) -> WorkerState {
        match self.backend.open(&self.descriptor, &self.config.settings) {
            Ok(opened) => {
                log::info!(
                    "camera {}: connected to {}",
                    self.descriptor.id,
                    self.descriptor.locator
                );
                *session = Some(opened);
                WorkerState::Streaming
            }
            Err(err) => {
                log::warn!("camera {}: {}", self.descriptor.id, err);
                WorkerState::Reconnecting
            }
        }
    }

    /// Read/publish loop for one session. Returns the next state.
    fn stream(
        &self,
        session: &mut Option<Box<dyn CaptureSession>>,
        sequence: &mut u64,
    ) -> WorkerState {
        let Some(session) = session.as_mut() else {
            return WorkerState::Reconnecting;
        };

        let started_at = Instant::now();
        let mut last_success_at = started_at;
        let mut consecutive_failures: u32 = 0;
        let interval = frame_interval(self.config.settings.fps);

        loop {
            if self.stop.load(Ordering::SeqCst) {
                return WorkerState::Stopped;
            }

            let read_started = Instant::now();
            match session.read() {
                Ok(frame) => {
                    consecutive_failures = 0;
                    last_success_at = Instant::now();
                    *sequence += 1;
                    let record = FrameRecord {
                        camera_id: self.descriptor.id,
                        frame: Arc::new(frame),
                        captured_at: last_success_at,
                        sequence: *sequence,
                    };
                    let frame = record.frame.clone();
                    self.store.put(record);
                    if let Some(dispatcher) = &self.dispatcher {
                        dispatcher.dispatch(self.descriptor.id, &frame);
                    }

                    // Pace to the target rate; a source faster than 1/fps
                    // must not busy-spin.
                    let budget = interval.saturating_sub(read_started.elapsed());
                    if !budget.is_zero() && !self.sleep_interruptible(budget) {
                        return WorkerState::Stopped;
                    }
                }
                Err(err) => {
                    consecutive_failures += 1;
                    if started_at.elapsed() < self.config.min_uptime {
                        // Startup noise: retry in place without the reconnect
                        // delay until the session has proven itself.
                        log::warn!(
                            "camera {}: read error during startup grace ({}): {}",
                            self.descriptor.id,
                            consecutive_failures,
                            err
                        );
                        if !self.sleep_interruptible(GRACE_RETRY_DELAY) {
                            return WorkerState::Stopped;
                        }
                        continue;
                    }
                    log::warn!(
                        "camera {}: stream failed after {:?} up ({} consecutive errors, \
                         last good frame {:?} ago): {}",
                        self.descriptor.id,
                        started_at.elapsed(),
                        consecutive_failures,
                        last_success_at.elapsed(),
                        err
                    );
                    return WorkerState::Reconnecting;
                }
            }
        }
    }

    fn reconnect(&self, session: &mut Option<Box<dyn CaptureSession>>) -> WorkerState {
        // Release the session and mark the camera not-live before waiting.
        *session = None;
        self.store.remove(self.descriptor.id);
        if !self.sleep_interruptible(self.config.retry_interval) {
            return WorkerState::Stopped;
        }
        WorkerState::Connecting
    }

    /// Sleep in slices, returning false as soon as stop is signaled.
    fn sleep_interruptible(&self, total: Duration) -> bool {
        let deadline = Instant::now() + total;
        while !self.stop.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(STOP_POLL));
        }
        false
    }
}

fn frame_interval(fps: u32) -> Duration {
    if fps == 0 {
        Duration::ZERO
    } else {
        Duration::from_secs(1) / fps
    }
}
