//! Configuration.
//!
//! [`ManagerConfig`] is the library surface: everything the manager, workers,
//! and multiplexer need, with the defaults the system has always shipped.
//! [`OmniviewdConfig`] is the daemon loader: optional JSON config file
//! (`OMNIVIEW_CONFIG`), env overrides, then validation.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::capture::StreamSettings;
use crate::error::{Error, Result};

const DEFAULT_MAX_CAMERAS: u32 = 10;
const DEFAULT_FRAME_WIDTH: u32 = 640;
const DEFAULT_FRAME_HEIGHT: u32 = 480;
const DEFAULT_FPS: u32 = 30;
const DEFAULT_MIN_UPTIME_SECS: f64 = 5.0;
const DEFAULT_SWITCH_INTERVAL_SECS: f64 = 5.0;
const DEFAULT_RETRY_INTERVAL_SECS: f64 = 2.0;
const DEFAULT_LIVENESS_WINDOW_SECS: f64 = 5.0;

/// Escape key code.
const KEY_ESC: u32 = 27;

/// Manager configuration. USB mode probes device indices when `rtsp_urls` is
/// empty; otherwise each URL becomes one IP camera.
#[derive(Clone, Debug)]
pub struct ManagerConfig {
    /// Run the display loop in `start()`.
    pub show_gui: bool,
    /// Overlay a "Camera N" caption on rendered frames.
    pub show_camera_id: bool,
    /// Upper bound of the USB device index probe range.
    pub max_cameras: u32,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Target observed frame rate per camera.
    pub fps: u32,
    /// Grace period during which read failures count as startup noise.
    pub min_uptime: Duration,
    /// Key codes that terminate the display loop.
    pub exit_keys: Vec<u32>,
    /// Show one camera at a time instead of parallel windows.
    pub sequential_mode: bool,
    /// Rotation period in sequential mode.
    pub switch_interval: Duration,
    /// Fixed wait between reconnection attempts.
    pub retry_interval: Duration,
    /// Maximum record age for a camera to count as live in the viewer.
    pub liveness_window: Duration,
    /// RTSP stream URLs; non-empty selects IP mode.
    pub rtsp_urls: Vec<String>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            show_gui: false,
            show_camera_id: false,
            max_cameras: DEFAULT_MAX_CAMERAS,
            frame_width: DEFAULT_FRAME_WIDTH,
            frame_height: DEFAULT_FRAME_HEIGHT,
            fps: DEFAULT_FPS,
            min_uptime: Duration::from_secs_f64(DEFAULT_MIN_UPTIME_SECS),
            exit_keys: vec![u32::from(b'q'), KEY_ESC],
            sequential_mode: false,
            switch_interval: Duration::from_secs_f64(DEFAULT_SWITCH_INTERVAL_SECS),
            retry_interval: Duration::from_secs_f64(DEFAULT_RETRY_INTERVAL_SECS),
            liveness_window: Duration::from_secs_f64(DEFAULT_LIVENESS_WINDOW_SECS),
            rtsp_urls: Vec::new(),
        }
    }
}

impl ManagerConfig {
    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            width: self.frame_width,
            height: self.frame_height,
            fps: self.fps,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.fps == 0 {
            return Err(Error::InvalidConfig("fps must be at least 1".into()));
        }
        if self.rtsp_urls.is_empty() && self.max_cameras == 0 {
            return Err(Error::InvalidConfig(
                "max_cameras must be at least 1 in USB mode".into(),
            ));
        }
        if self.sequential_mode && self.switch_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "switch_interval must be greater than zero in sequential mode".into(),
            ));
        }
        if self.retry_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "retry_interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Daemon config loading
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct OmniviewdConfigFile {
    capture: Option<CaptureConfigFile>,
    display: Option<DisplayConfigFile>,
    rtsp_urls: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    max_cameras: Option<u32>,
    frame_width: Option<u32>,
    frame_height: Option<u32>,
    fps: Option<u32>,
    min_uptime_secs: Option<f64>,
    retry_interval_secs: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    show_gui: Option<bool>,
    show_camera_id: Option<bool>,
    sequential_mode: Option<bool>,
    switch_interval_secs: Option<f64>,
    liveness_window_secs: Option<f64>,
}

/// Resolved daemon configuration.
#[derive(Clone, Debug)]
pub struct OmniviewdConfig {
    pub manager: ManagerConfig,
}

impl OmniviewdConfig {
    /// Load from the file named by `OMNIVIEW_CONFIG` (if set), apply env
    /// overrides, and validate.
    pub fn load() -> Result<Self> {
        let file_cfg = match std::env::var("OMNIVIEW_CONFIG").ok() {
            Some(path) => read_config_file(Path::new(&path))?,
            None => OmniviewdConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.manager.validate()?;
        Ok(cfg)
    }

    fn from_file(file: OmniviewdConfigFile) -> Self {
        let defaults = ManagerConfig::default();
        let capture = file.capture.unwrap_or_default();
        let display = file.display.unwrap_or_default();
        let manager = ManagerConfig {
            show_gui: display.show_gui.unwrap_or(defaults.show_gui),
            show_camera_id: display.show_camera_id.unwrap_or(defaults.show_camera_id),
            max_cameras: capture.max_cameras.unwrap_or(defaults.max_cameras),
            frame_width: capture.frame_width.unwrap_or(defaults.frame_width),
            frame_height: capture.frame_height.unwrap_or(defaults.frame_height),
            fps: capture.fps.unwrap_or(defaults.fps),
            min_uptime: capture
                .min_uptime_secs
                .map(Duration::from_secs_f64)
                .unwrap_or(defaults.min_uptime),
            exit_keys: defaults.exit_keys.clone(),
            sequential_mode: display.sequential_mode.unwrap_or(defaults.sequential_mode),
            switch_interval: display
                .switch_interval_secs
                .map(Duration::from_secs_f64)
                .unwrap_or(defaults.switch_interval),
            retry_interval: capture
                .retry_interval_secs
                .map(Duration::from_secs_f64)
                .unwrap_or(defaults.retry_interval),
            liveness_window: display
                .liveness_window_secs
                .map(Duration::from_secs_f64)
                .unwrap_or(defaults.liveness_window),
            rtsp_urls: file.rtsp_urls.unwrap_or_default(),
        };
        Self { manager }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(urls) = std::env::var("OMNIVIEW_RTSP_URLS") {
            let parsed = split_csv(&urls);
            if !parsed.is_empty() {
                self.manager.rtsp_urls = parsed;
            }
        }
        if let Ok(value) = std::env::var("OMNIVIEW_MAX_CAMERAS") {
            self.manager.max_cameras = value.parse().map_err(|_| {
                Error::InvalidConfig("OMNIVIEW_MAX_CAMERAS must be an integer".into())
            })?;
        }
        if let Ok(value) = std::env::var("OMNIVIEW_FPS") {
            self.manager.fps = value
                .parse()
                .map_err(|_| Error::InvalidConfig("OMNIVIEW_FPS must be an integer".into()))?;
        }
        if let Ok(value) = std::env::var("OMNIVIEW_MIN_UPTIME_SECS") {
            let seconds: f64 = value.parse().map_err(|_| {
                Error::InvalidConfig("OMNIVIEW_MIN_UPTIME_SECS must be a number of seconds".into())
            })?;
            self.manager.min_uptime = Duration::from_secs_f64(seconds);
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<OmniviewdConfigFile> {
    let raw = std::fs::read_to_string(path)?;
    let cfg = serde_json::from_str(&raw)?;
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(ManagerConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_fps_is_rejected() {
        let config = ManagerConfig {
            fps: 0,
            ..ManagerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn sequential_mode_requires_a_switch_interval() {
        let config = ManagerConfig {
            sequential_mode: true,
            switch_interval: Duration::ZERO,
            ..ManagerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn csv_splitting_trims_and_drops_empties() {
        assert_eq!(
            split_csv(" rtsp://a , ,rtsp://b"),
            vec!["rtsp://a".to_string(), "rtsp://b".to_string()]
        );
    }
}
