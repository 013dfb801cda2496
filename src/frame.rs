//! Frame types.
//!
//! - `Frame`: a decoded pixel buffer as produced by a capture backend.
//! - `FrameRecord`: the store entry for one camera's most recent frame, with
//!   capture instant and per-camera sequence number.
//!
//! Records are overwritten in place per camera; no history is retained. The
//! pixel buffer sits behind an `Arc` so store snapshots copy metadata, not
//! pixels.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Stable manager-local camera identifier, assigned at enumeration time.
pub type CameraId = u32;

/// A decoded frame: width x height x channels, row-major, tightly packed.
#[derive(Clone, Debug)]
pub struct Frame {
    width: u32,
    height: u32,
    channels: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Called by capture backends. `data` is expected to hold
    /// `width * height * channels` bytes; a backend whose device kept a
    /// different format passes the buffer through as received.
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u32) -> Self {
        Self {
            width,
            height,
            channels,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

/// One camera's latest frame plus metadata.
///
/// Written by exactly one capture worker (the camera's owner), read by the
/// display multiplexer and `get_frames()` callers.
#[derive(Clone, Debug)]
pub struct FrameRecord {
    pub camera_id: CameraId,
    pub frame: Arc<Frame>,
    pub captured_at: Instant,
    /// Monotonically increasing per camera. A reader that observed sequence N
    /// never later observes a smaller value for the same camera.
    pub sequence: u64,
}

impl FrameRecord {
    /// Age of this record, for liveness decisions.
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }
}
