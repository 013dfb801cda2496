//! Synthetic capture backend.
//!
//! Sources addressed as `stub://...` produce deterministic pattern frames
//! in-memory, so the manager, workers, and display path can be exercised
//! without hardware. The locator scripts failure behavior:
//!
//! - `stub://name` -- always opens, every read succeeds
//! - `stub://refuse` -- open always fails
//! - `stub://name?fail_reads=N` -- the first N reads fail, then succeed
//! - `stub://name?drop_after=N` -- N reads succeed, then every read fails
//!
//! Scripted state is per-session: a reopened source starts its script over,
//! which is exactly what a flapping real camera looks like to the worker.

use crate::error::CaptureError;
use crate::frame::Frame;
use crate::source::{Locator, SourceDescriptor};

use super::{CaptureBackend, CaptureSession, StreamSettings};

const STUB_SCHEME: &str = "stub://";

/// Capture backend backed entirely by scripted synthetic sources.
///
/// URL locators are parsed directly; device-index locators resolve through a
/// configured device table, so USB-mode enumeration and probing can run
/// against it in tests.
#[derive(Debug, Default)]
pub struct StubBackend {
    devices: Vec<String>,
}

impl StubBackend {
    /// A backend with no devices: URL locators work, every device index
    /// fails to open.
    pub fn new() -> Self {
        Self::default()
    }

    /// Device index `i` resolves to `devices[i]` (a `stub://` spec string);
    /// indices past the end fail to open.
    pub fn with_devices(devices: Vec<String>) -> Self {
        Self { devices }
    }
}

impl CaptureBackend for StubBackend {
    fn open(
        &self,
        source: &SourceDescriptor,
        settings: &StreamSettings,
    ) -> Result<Box<dyn CaptureSession>, CaptureError> {
        match &source.locator {
            Locator::Url(url) => open_stub(url, settings),
            Locator::Device(index) => {
                let spec = self.devices.get(*index as usize).ok_or_else(|| {
                    CaptureError::connection(format!("no stub device at index {}", index))
                })?;
                open_stub(spec, settings)
            }
        }
    }
}

/// Open a scripted synthetic session from a `stub://` spec string.
pub(crate) fn open_stub(
    spec: &str,
    settings: &StreamSettings,
) -> Result<Box<dyn CaptureSession>, CaptureError> {
    let script = StubScript::parse(spec)?;
    if script.refuse_open {
        return Err(CaptureError::connection(format!(
            "stub source {} refuses to open",
            spec
        )));
    }
    Ok(Box::new(StubSession {
        script,
        width: settings.width,
        height: settings.height,
        frame_count: 0,
        failed_reads: 0,
        scene_state: 0,
    }))
}

#[derive(Clone, Debug, Default)]
struct StubScript {
    refuse_open: bool,
    /// Number of leading reads that fail before the stream settles.
    fail_reads: u64,
    /// Successful reads delivered before the stream dies, if any.
    drop_after: Option<u64>,
}

impl StubScript {
    fn parse(spec: &str) -> Result<Self, CaptureError> {
        let rest = spec
            .strip_prefix(STUB_SCHEME)
            .ok_or_else(|| CaptureError::connection(format!("not a stub locator: {}", spec)))?;
        let (name, query) = match rest.split_once('?') {
            Some((name, query)) => (name, Some(query)),
            None => (rest, None),
        };

        let mut script = StubScript {
            refuse_open: name == "refuse",
            ..StubScript::default()
        };
        if let Some(query) = query {
            for pair in query.split('&') {
                let Some((key, value)) = pair.split_once('=') else {
                    continue;
                };
                let value: u64 = value.parse().map_err(|_| {
                    CaptureError::connection(format!("bad stub parameter {}: {}", key, spec))
                })?;
                match key {
                    "fail_reads" => script.fail_reads = value,
                    "drop_after" => script.drop_after = Some(value),
                    _ => {
                        return Err(CaptureError::connection(format!(
                            "unknown stub parameter {}: {}",
                            key, spec
                        )));
                    }
                }
            }
        }
        Ok(script)
    }
}

struct StubSession {
    script: StubScript,
    width: u32,
    height: u32,
    frame_count: u64,
    failed_reads: u64,
    scene_state: u8,
}

impl CaptureSession for StubSession {
    fn read(&mut self) -> Result<Frame, CaptureError> {
        if self.failed_reads < self.script.fail_reads {
            self.failed_reads += 1;
            return Err(CaptureError::read(format!(
                "scripted read failure {}/{}",
                self.failed_reads, self.script.fail_reads
            )));
        }
        if let Some(limit) = self.script.drop_after {
            if self.frame_count >= limit {
                return Err(CaptureError::read("scripted stream drop"));
            }
        }

        self.frame_count += 1;
        Ok(Frame::new(
            self.generate_pixels(),
            self.width,
            self.height,
            3,
        ))
    }
}

impl StubSession {
    /// Deterministic pattern frames with an occasional "scene change", in
    /// place of real decoded video.
    fn generate_pixels(&mut self) -> Vec<u8> {
        let pixel_count = (self.width * self.height * 3) as usize;

        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> StreamSettings {
        StreamSettings {
            width: 8,
            height: 4,
            fps: 30,
        }
    }

    #[test]
    fn plain_stub_streams_frames() -> Result<(), CaptureError> {
        let mut session = open_stub("stub://cam", &settings())?;
        let frame = session.read()?;
        assert_eq!(frame.width(), 8);
        assert_eq!(frame.height(), 4);
        assert_eq!(frame.byte_len(), 8 * 4 * 3);
        Ok(())
    }

    #[test]
    fn refuse_fails_open() {
        let err = open_stub("stub://refuse", &settings()).err();
        assert!(matches!(err, Some(CaptureError::Connection(_))));
    }

    #[test]
    fn fail_reads_script_recovers() -> Result<(), CaptureError> {
        let mut session = open_stub("stub://cam?fail_reads=2", &settings())?;
        assert!(session.read().is_err());
        assert!(session.read().is_err());
        assert!(session.read().is_ok());
        Ok(())
    }

    #[test]
    fn drop_after_script_kills_the_stream() -> Result<(), CaptureError> {
        let mut session = open_stub("stub://cam?drop_after=1", &settings())?;
        assert!(session.read().is_ok());
        let err = session.read().err();
        assert!(matches!(err, Some(CaptureError::Read(_))));
        Ok(())
    }

    #[test]
    fn unknown_parameter_is_rejected() {
        assert!(open_stub("stub://cam?bogus=1", &settings()).is_err());
    }
}
