//! Source descriptors and enumeration.
//!
//! Enumeration resolves the configured cameras into a fixed, ordered set of
//! descriptors once, at startup. USB mode probes device indices with a trial
//! open; IP mode takes the URL list as-is, order preserved. Indices that fail
//! the probe are skipped here, not retried -- failure handling afterwards is
//! the worker's job.

use std::fmt;

use crate::capture::CaptureBackend;
use crate::config::ManagerConfig;
use crate::error::{Error, Result};
use crate::frame::CameraId;

/// Which family of source a descriptor refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    Usb,
    Ip,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Usb => write!(f, "USB"),
            SourceKind::Ip => write!(f, "IP"),
        }
    }
}

/// How to reach a source: a local device index or a stream URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Locator {
    Device(u32),
    Url(String),
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Device(index) => write!(f, "device {}", index),
            Locator::Url(url) => write!(f, "{}", url),
        }
    }
}

/// The resolved identity of one camera. Immutable once enumerated.
#[derive(Clone, Debug)]
pub struct SourceDescriptor {
    pub id: CameraId,
    pub kind: SourceKind,
    pub locator: Locator,
}

impl SourceDescriptor {
    pub fn usb(id: CameraId, index: u32) -> Self {
        Self {
            id,
            kind: SourceKind::Usb,
            locator: Locator::Device(index),
        }
    }

    pub fn ip(id: CameraId, url: impl Into<String>) -> Self {
        Self {
            id,
            kind: SourceKind::Ip,
            locator: Locator::Url(url.into()),
        }
    }

    /// Window title used by the display multiplexer in parallel mode.
    pub fn window_title(&self) -> String {
        format!("Camera {} ({}): {}", self.id, self.kind, self.locator)
    }
}

/// Resolve the configured cameras into descriptors.
///
/// Deterministic for a given configuration. Fails only if the resulting set
/// is empty.
pub fn enumerate_sources(
    config: &ManagerConfig,
    backend: &dyn CaptureBackend,
) -> Result<Vec<SourceDescriptor>> {
    let sources = if config.rtsp_urls.is_empty() {
        enumerate_usb(config, backend)
    } else {
        enumerate_ip(config)
    };
    if sources.is_empty() {
        return Err(Error::NoCamerasAvailable);
    }
    Ok(sources)
}

fn enumerate_usb(config: &ManagerConfig, backend: &dyn CaptureBackend) -> Vec<SourceDescriptor> {
    let settings = config.stream_settings();
    let mut sources = Vec::new();
    for index in 0..config.max_cameras {
        let descriptor = SourceDescriptor::usb(index, index);
        // Trial open; the session is dropped immediately and reopened by the
        // worker that owns the camera.
        match backend.open(&descriptor, &settings) {
            Ok(_) => sources.push(descriptor),
            Err(err) => {
                log::info!("camera index {} is not available: {}", index, err);
            }
        }
    }
    sources
}

fn enumerate_ip(config: &ManagerConfig) -> Vec<SourceDescriptor> {
    config
        .rtsp_urls
        .iter()
        .enumerate()
        .map(|(id, url)| SourceDescriptor::ip(id as CameraId, url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::StubBackend;

    #[test]
    fn ip_mode_preserves_url_order() -> Result<()> {
        let config = ManagerConfig {
            rtsp_urls: vec!["stub://a".into(), "stub://b".into()],
            ..ManagerConfig::default()
        };
        let sources = enumerate_sources(&config, &StubBackend::new())?;
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].id, 0);
        assert_eq!(sources[1].locator, Locator::Url("stub://b".into()));
        Ok(())
    }

    #[test]
    fn usb_mode_skips_unopenable_indices() -> Result<()> {
        let config = ManagerConfig {
            max_cameras: 3,
            ..ManagerConfig::default()
        };
        let backend =
            StubBackend::with_devices(vec!["stub://cam0".into(), "stub://refuse".into()]);
        let sources = enumerate_sources(&config, &backend)?;
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].locator, Locator::Device(0));
        Ok(())
    }

    #[test]
    fn empty_result_is_an_error() {
        let config = ManagerConfig {
            max_cameras: 2,
            ..ManagerConfig::default()
        };
        let backend = StubBackend::new();
        let err = enumerate_sources(&config, &backend).unwrap_err();
        assert!(matches!(err, Error::NoCamerasAvailable));
    }

    #[test]
    fn window_titles_name_the_source() {
        let descriptor = SourceDescriptor::ip(3, "rtsp://cam.local/stream");
        assert_eq!(
            descriptor.window_title(),
            "Camera 3 (IP): rtsp://cam.local/stream"
        );
    }
}
