//! Display-loop contract: `start()` blocks on the caller's thread until an
//! exit key arrives, then shuts the whole manager down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use omniview::{
    CameraManager, DisplayBackend, Frame, ManagerConfig, ManagerState, StubBackend,
};

/// Reports no key for `ticks` polls, then presses `key` forever.
struct ExitAfter {
    ticks: u32,
    key: u32,
    windows: Arc<Mutex<Vec<String>>>,
    closed_all: Arc<AtomicBool>,
}

impl DisplayBackend for ExitAfter {
    fn show(&mut self, window: &str, _frame: &Frame, _label: Option<&str>) -> anyhow::Result<()> {
        let mut windows = self.windows.lock().expect("windows lock");
        if !windows.contains(&window.to_string()) {
            windows.push(window.to_string());
        }
        Ok(())
    }

    fn wait_key(&mut self, timeout: Duration) -> Option<u32> {
        std::thread::sleep(timeout.min(Duration::from_millis(5)));
        if self.ticks == 0 {
            Some(self.key)
        } else {
            self.ticks -= 1;
            None
        }
    }

    fn close(&mut self, _window: &str) {}

    fn close_all(&mut self) {
        self.closed_all.store(true, Ordering::SeqCst);
    }
}

fn gui_config(sequential: bool) -> ManagerConfig {
    ManagerConfig {
        show_gui: true,
        sequential_mode: sequential,
        switch_interval: Duration::from_millis(50),
        rtsp_urls: vec!["stub://a".into(), "stub://b".into()],
        fps: 100,
        frame_width: 16,
        frame_height: 8,
        min_uptime: Duration::from_millis(100),
        retry_interval: Duration::from_millis(50),
        ..ManagerConfig::default()
    }
}

#[test]
fn exit_key_unblocks_start_and_stops_workers() {
    let windows = Arc::new(Mutex::new(Vec::new()));
    let closed_all = Arc::new(AtomicBool::new(false));
    let display = ExitAfter {
        ticks: 30,
        key: u32::from(b'q'),
        windows: windows.clone(),
        closed_all: closed_all.clone(),
    };

    let manager = CameraManager::with_backend(gui_config(false), Arc::new(StubBackend::new()))
        .display(Box::new(display));

    // Blocks on this thread until the scripted exit key.
    manager.start().expect("manager run");

    assert_eq!(manager.state(), ManagerState::Stopped);
    assert!(closed_all.load(Ordering::SeqCst));
    // Parallel mode: both cameras got their own window.
    let windows = windows.lock().expect("windows lock");
    assert!(windows.iter().any(|w| w.contains("Camera 0")));
    assert!(windows.iter().any(|w| w.contains("Camera 1")));
}

#[test]
fn sequential_mode_uses_a_single_window() {
    let windows = Arc::new(Mutex::new(Vec::new()));
    let display = ExitAfter {
        ticks: 40,
        key: 27, // Esc is in the default exit-key set too.
        windows: windows.clone(),
        closed_all: Arc::new(AtomicBool::new(false)),
    };

    let manager = CameraManager::with_backend(gui_config(true), Arc::new(StubBackend::new()))
        .display(Box::new(display));
    manager.start().expect("manager run");

    let windows = windows.lock().expect("windows lock");
    assert_eq!(windows.len(), 1, "sequential mode renders one window: {:?}", windows);
}
