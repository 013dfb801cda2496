//! omniview — concurrent multi-camera capture manager.
//!
//! Normalizes a heterogeneous set of cameras (local USB devices and network
//! RTSP streams) into one addressable collection of live frames, consumable
//! through per-frame callbacks, `get_frames()` snapshots, and an optional
//! viewer.
//!
//! # Architecture
//!
//! - One supervised capture worker thread per source, each driving its own
//!   connect / stream / reconnect state machine. A camera that fails keeps
//!   reconnecting forever and never takes down its siblings.
//! - A mutex-protected frame store holding each camera's most recent frame
//!   (atomic replace per camera, no history).
//! - A fault-isolated callback path: sink errors and panics are logged, never
//!   propagated into the worker loop.
//! - An optional display multiplexer on the caller's thread, showing all live
//!   cameras in parallel windows or one at a time on a rotation timer.
//!
//! # Module Structure
//!
//! - `capture`: backend seam (stub, V4L2, RTSP/GStreamer)
//! - `source`: descriptors and enumeration
//! - `worker`: per-camera state machine
//! - `store`: shared latest-frame map
//! - `sink`: frame callbacks
//! - `display`: viewer loop
//! - `manager`: the facade tying it together
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use omniview::{CallbackSink, CameraManager, ManagerConfig};
//!
//! let config = ManagerConfig {
//!     rtsp_urls: vec!["rtsp://192.168.1.20/stream".into()],
//!     ..ManagerConfig::default()
//! };
//! let manager = Arc::new(
//!     CameraManager::new(config).frame_sink(Arc::new(CallbackSink::new(|id, frame: &omniview::Frame| {
//!         println!("camera {}: {}x{}", id, frame.width(), frame.height());
//!     }))),
//! );
//!
//! let stopper = manager.clone();
//! std::thread::spawn(move || {
//!     std::thread::sleep(std::time::Duration::from_secs(10));
//!     stopper.stop();
//! });
//! manager.start().expect("manager run");
//! ```

pub mod capture;
pub mod config;
pub mod display;
pub mod error;
pub mod frame;
pub mod manager;
pub mod sink;
pub mod source;
pub mod store;

mod worker;

pub use capture::{CaptureBackend, CaptureSession, StreamSettings, StubBackend, SystemBackend};
pub use config::{ManagerConfig, OmniviewdConfig};
pub use display::{DisplayBackend, NullDisplay};
pub use error::{CaptureError, Error, Result};
pub use frame::{CameraId, Frame, FrameRecord};
pub use manager::{CameraManager, ManagerState};
pub use sink::{CallbackSink, FrameSink};
pub use source::{enumerate_sources, Locator, SourceDescriptor, SourceKind};
pub use store::FrameStore;
