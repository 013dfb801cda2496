//! Display multiplexing.
//!
//! The multiplexer owns the optional viewer loop and runs on the thread that
//! called `start()`. It only reads the shared frame store; capture workers
//! never block on rendering. Two mutually exclusive modes:
//!
//! - **Parallel** (default): every live camera in its own labeled window.
//! - **Sequential**: a single window showing one camera at a time, rotating
//!   over the live set on a timer. A camera that drops out mid-interval is
//!   skipped on the next rotation, not mid-interval.
//!
//! Rendering primitives belong to the [`DisplayBackend`] collaborator; the
//! multiplexer decides *what* to show and polls the backend for exit keys.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ManagerConfig;
use crate::frame::{CameraId, Frame};
use crate::source::SourceDescriptor;
use crate::store::FrameStore;

/// UI refresh cadence; doubles as the key-poll timeout.
const UI_TICK: Duration = Duration::from_millis(33);

/// Window name used in sequential mode.
const SEQUENTIAL_WINDOW: &str = "omniview: sequential";

/// Rendering collaborator. Owns windows and key input.
pub trait DisplayBackend: Send {
    /// Render `frame` in the window named `window`. `label` is an overlay
    /// caption ("Camera N") when camera-id display is enabled.
    fn show(&mut self, window: &str, frame: &Frame, label: Option<&str>) -> anyhow::Result<()>;

    /// Poll for a key press for at most `timeout`.
    fn wait_key(&mut self, timeout: Duration) -> Option<u32>;

    fn close(&mut self, window: &str);

    fn close_all(&mut self);
}

/// Backend that renders nothing and reports no keys.
///
/// Used when the GUI is enabled but no real backend was injected; keeps the
/// loop cadence by sleeping through the key poll.
#[derive(Debug, Default)]
pub struct NullDisplay;

impl DisplayBackend for NullDisplay {
    fn show(&mut self, _window: &str, _frame: &Frame, _label: Option<&str>) -> anyhow::Result<()> {
        Ok(())
    }

    fn wait_key(&mut self, timeout: Duration) -> Option<u32> {
        std::thread::sleep(timeout);
        None
    }

    fn close(&mut self, _window: &str) {}

    fn close_all(&mut self) {}
}

pub(crate) struct DisplayMultiplexer {
    store: Arc<FrameStore>,
    stop: Arc<AtomicBool>,
    show_camera_id: bool,
    exit_keys: Vec<u32>,
    sequential: bool,
    switch_interval: Duration,
    liveness_window: Duration,
    titles: HashMap<CameraId, String>,
    open_windows: BTreeSet<CameraId>,
    active: Option<CameraId>,
    shown_since: Instant,
}

impl DisplayMultiplexer {
    pub(crate) fn new(
        store: Arc<FrameStore>,
        stop: Arc<AtomicBool>,
        config: &ManagerConfig,
        sources: &[SourceDescriptor],
    ) -> Self {
        let titles = sources
            .iter()
            .map(|source| (source.id, source.window_title()))
            .collect();
        Self {
            store,
            stop,
            show_camera_id: config.show_camera_id,
            exit_keys: config.exit_keys.clone(),
            sequential: config.sequential_mode,
            switch_interval: config.switch_interval,
            liveness_window: config.liveness_window,
            titles,
            open_windows: BTreeSet::new(),
            active: None,
            shown_since: Instant::now(),
        }
    }

    /// Blocking render loop. Returns when stop is signaled or an exit key is
    /// pressed (which itself signals stop).
    pub(crate) fn run(&mut self, backend: &mut dyn DisplayBackend) {
        while !self.stop.load(Ordering::SeqCst) {
            if self.sequential {
                self.tick_sequential(backend);
            } else {
                self.tick_parallel(backend);
            }
            if let Some(key) = backend.wait_key(UI_TICK) {
                if self.exit_keys.contains(&key) {
                    log::info!("exit key {:#x} pressed, stopping", key);
                    self.stop.store(true, Ordering::SeqCst);
                }
            }
        }
        backend.close_all();
    }

    fn tick_parallel(&mut self, backend: &mut dyn DisplayBackend) {
        let frames = self.store.get_all();
        let mut live: Vec<_> = frames
            .values()
            .filter(|record| record.age() <= self.liveness_window)
            .collect();
        live.sort_unstable_by_key(|record| record.camera_id);

        let mut live_ids = BTreeSet::new();
        for record in live {
            let id = record.camera_id;
            let title = self.title_for(id);
            let label = self.label_for(id);
            if let Err(err) = backend.show(&title, &record.frame, label.as_deref()) {
                log::error!("camera {}: display error: {:#}", id, err);
                continue;
            }
            live_ids.insert(id);
        }

        // Close windows for cameras that dropped out of the live set.
        let stale: Vec<CameraId> = self.open_windows.difference(&live_ids).copied().collect();
        for id in stale {
            let title = self.title_for(id);
            backend.close(&title);
        }
        self.open_windows = live_ids;
    }

    fn tick_sequential(&mut self, backend: &mut dyn DisplayBackend) {
        let live = self.store.live_ids(self.liveness_window);
        if live.is_empty() {
            self.active = None;
            return;
        }

        let rotate = match self.active {
            None => true,
            Some(_) => self.shown_since.elapsed() >= self.switch_interval,
        };
        if rotate {
            let next = match self.active {
                None => live[0],
                // Wrap-around over the live set; a dropped camera simply has
                // no successor entry and is skipped.
                Some(current) => *live.iter().find(|id| **id > current).unwrap_or(&live[0]),
            };
            self.active = Some(next);
            self.shown_since = Instant::now();
        }

        let Some(id) = self.active else {
            return;
        };
        let Some(record) = self.store.get(id) else {
            return;
        };
        if record.age() > self.liveness_window {
            return;
        }
        let label = self.label_for(id);
        if let Err(err) = backend.show(SEQUENTIAL_WINDOW, &record.frame, label.as_deref()) {
            log::error!("camera {}: display error: {:#}", id, err);
        }
    }

    fn title_for(&self, id: CameraId) -> String {
        self.titles
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("Camera {}", id))
    }

    fn label_for(&self, id: CameraId) -> Option<String> {
        self.show_camera_id.then(|| format!("Camera {}", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameRecord;

    /// Records every show call; scripts key presses.
    struct RecordingDisplay {
        shown: Vec<(String, CameraId)>,
        closed: Vec<String>,
        keys: Vec<u32>,
    }

    impl RecordingDisplay {
        fn new() -> Self {
            Self {
                shown: Vec::new(),
                closed: Vec::new(),
                keys: Vec::new(),
            }
        }
    }

    impl DisplayBackend for RecordingDisplay {
        fn show(&mut self, window: &str, frame: &Frame, _label: Option<&str>) -> anyhow::Result<()> {
            // Stub frames carry the camera id nowhere, so tests key windows
            // by title and frame width instead.
            self.shown.push((window.to_string(), frame.width()));
            Ok(())
        }

        fn wait_key(&mut self, _timeout: Duration) -> Option<u32> {
            self.keys.pop()
        }

        fn close(&mut self, window: &str) {
            self.closed.push(window.to_string());
        }

        fn close_all(&mut self) {}
    }

    fn store_with(ids: &[CameraId]) -> Arc<FrameStore> {
        let store = Arc::new(FrameStore::new());
        for &id in ids {
            store.put(FrameRecord {
                camera_id: id,
                frame: Arc::new(Frame::new(vec![0u8; 3 * (id as usize + 1)], id + 1, 1, 3)),
                captured_at: Instant::now(),
                sequence: 1,
            });
        }
        store
    }

    fn multiplexer(
        store: Arc<FrameStore>,
        stop: Arc<AtomicBool>,
        config: &ManagerConfig,
        ids: &[CameraId],
    ) -> DisplayMultiplexer {
        let sources: Vec<SourceDescriptor> = ids
            .iter()
            .map(|&id| SourceDescriptor::usb(id, id))
            .collect();
        DisplayMultiplexer::new(store, stop, config, &sources)
    }

    #[test]
    fn parallel_tick_shows_every_live_camera() {
        let store = store_with(&[0, 1, 2]);
        let stop = Arc::new(AtomicBool::new(false));
        let config = ManagerConfig::default();
        let mut mux = multiplexer(store, stop, &config, &[0, 1, 2]);
        let mut display = RecordingDisplay::new();

        mux.tick_parallel(&mut display);
        assert_eq!(display.shown.len(), 3);
        // Sorted by camera id: widths are id + 1.
        assert_eq!(
            display.shown.iter().map(|(_, w)| *w).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn parallel_tick_closes_windows_for_dropped_cameras() {
        let store = store_with(&[0, 1]);
        let stop = Arc::new(AtomicBool::new(false));
        let config = ManagerConfig::default();
        let mut mux = multiplexer(store.clone(), stop, &config, &[0, 1]);
        let mut display = RecordingDisplay::new();

        mux.tick_parallel(&mut display);
        store.remove(1);
        mux.tick_parallel(&mut display);

        assert_eq!(display.closed, vec!["Camera 1 (USB): device 1".to_string()]);
    }

    #[test]
    fn sequential_rotates_through_live_cameras_in_order() {
        let store = store_with(&[0, 1, 2]);
        let stop = Arc::new(AtomicBool::new(false));
        let config = ManagerConfig {
            sequential_mode: true,
            switch_interval: Duration::from_millis(30),
            ..ManagerConfig::default()
        };
        let mut mux = multiplexer(store, stop, &config, &[0, 1, 2]);
        let mut display = RecordingDisplay::new();

        let mut seen = Vec::new();
        for _ in 0..4 {
            mux.tick_sequential(&mut display);
            seen.push(mux.active.expect("active camera"));
            std::thread::sleep(Duration::from_millis(40));
        }
        // One camera at a time, rotating with wrap-around.
        assert_eq!(seen, vec![0, 1, 2, 0]);
    }

    #[test]
    fn sequential_skips_dropped_camera_on_next_rotation() {
        let store = store_with(&[0, 1, 2]);
        let stop = Arc::new(AtomicBool::new(false));
        let config = ManagerConfig {
            sequential_mode: true,
            switch_interval: Duration::from_millis(20),
            ..ManagerConfig::default()
        };
        let mut mux = multiplexer(store.clone(), stop, &config, &[0, 1, 2]);
        let mut display = RecordingDisplay::new();

        mux.tick_sequential(&mut display);
        assert_eq!(mux.active, Some(0));

        store.remove(1);
        std::thread::sleep(Duration::from_millis(25));
        mux.tick_sequential(&mut display);
        assert_eq!(mux.active, Some(2));
    }

    #[test]
    fn exit_key_signals_stop() {
        let store = store_with(&[0]);
        let stop = Arc::new(AtomicBool::new(false));
        let config = ManagerConfig::default();
        let mut mux = multiplexer(store, stop.clone(), &config, &[0]);
        let mut display = RecordingDisplay::new();
        display.keys.push(u32::from(b'q'));

        mux.run(&mut display);
        assert!(stop.load(Ordering::SeqCst));
    }

    #[test]
    fn non_exit_key_is_ignored() {
        let store = store_with(&[0]);
        let stop = Arc::new(AtomicBool::new(false));
        let config = ManagerConfig::default();
        let mut mux = multiplexer(store, stop.clone(), &config, &[0]);
        let mut display = RecordingDisplay::new();
        // 'x' then 'q': run consumes both (pop order: 'q' last pushed first).
        display.keys.push(u32::from(b'q'));
        display.keys.push(u32::from(b'x'));

        mux.run(&mut display);
        assert!(stop.load(Ordering::SeqCst));
        assert!(display.keys.is_empty());
    }
}
