//! Capture backends.
//!
//! This module defines the seam between the manager and whatever actually
//! decodes video:
//! - `CaptureBackend::open` turns a source descriptor into a live session.
//! - `CaptureSession::read` pulls the next decoded frame.
//! - Releasing a session is dropping it.
//!
//! Backends:
//! - `stub://` locators (always built, used by tests and default configs)
//! - V4L2 devices (feature: capture-v4l2)
//! - RTSP streams via GStreamer (feature: capture-gstreamer)
//!
//! Stream settings are best-effort: if a device cannot honor the requested
//! geometry or rate, the session proceeds with whatever it got.

pub mod stub;

#[cfg(feature = "capture-gstreamer")]
pub(crate) mod rtsp;
#[cfg(feature = "capture-v4l2")]
pub(crate) mod v4l2;

pub use stub::StubBackend;

use crate::error::CaptureError;
use crate::frame::Frame;
use crate::source::{Locator, SourceDescriptor};

/// Requested stream geometry and rate. Backends apply these best-effort.
#[derive(Clone, Copy, Debug)]
pub struct StreamSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

/// An open capture handle, owned exclusively by one worker.
///
/// Dropping the session releases the underlying device or stream.
pub trait CaptureSession: Send {
    /// Pull the next decoded frame. Blocks only on backend I/O.
    fn read(&mut self) -> Result<Frame, CaptureError>;
}

/// Opens capture sessions for source descriptors.
pub trait CaptureBackend: Send + Sync {
    fn open(
        &self,
        source: &SourceDescriptor,
        settings: &StreamSettings,
    ) -> Result<Box<dyn CaptureSession>, CaptureError>;
}

/// Default backend: dispatches on the locator.
///
/// `stub://` URLs always resolve to the synthetic backend; device indices go
/// to V4L2 and other URLs to GStreamer when the matching feature is compiled
/// in. A locator whose backend is missing from the build fails at open, which
/// the owning worker absorbs into its reconnect loop.
#[derive(Debug, Default)]
pub struct SystemBackend;

impl SystemBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureBackend for SystemBackend {
    fn open(
        &self,
        source: &SourceDescriptor,
        settings: &StreamSettings,
    ) -> Result<Box<dyn CaptureSession>, CaptureError> {
        match &source.locator {
            Locator::Url(url) if url.starts_with("stub://") => stub::open_stub(url, settings),
            Locator::Url(url) => {
                #[cfg(feature = "capture-gstreamer")]
                {
                    rtsp::open_rtsp(url, settings)
                }
                #[cfg(not(feature = "capture-gstreamer"))]
                {
                    let _ = url;
                    Err(CaptureError::connection(
                        "RTSP sources require the capture-gstreamer feature",
                    ))
                }
            }
            Locator::Device(index) => {
                #[cfg(feature = "capture-v4l2")]
                {
                    v4l2::open_device(*index, settings)
                }
                #[cfg(not(feature = "capture-v4l2"))]
                {
                    let _ = index;
                    Err(CaptureError::connection(
                        "USB sources require the capture-v4l2 feature",
                    ))
                }
            }
        }
    }
}
