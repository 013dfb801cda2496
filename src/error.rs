//! Error types for omniview.

use thiserror::Error;

/// Result type alias using the omniview [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the manager lifecycle.
///
/// Per-camera capture failures are absorbed by the reconnection loop and never
/// reach this level; the only capture-related condition a caller sees is an
/// empty source set at startup.
#[derive(Debug, Error)]
pub enum Error {
    /// Enumeration resolved zero usable sources. Fatal at `start()`.
    #[error("no cameras available from the configured sources")]
    NoCamerasAvailable,

    /// `start()` was called on a manager that already left the created state.
    #[error("manager already started")]
    AlreadyStarted,

    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error (worker thread spawn, config file access).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors reported by capture backends.
///
/// The worker's recovery policy keys off the variant: `Connection` always
/// routes to the reconnect path, `Read` is retried in place while the session
/// is inside its startup grace period.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The source could not be opened.
    #[error("connection failed: {0}")]
    Connection(String),

    /// An opened stream failed to yield a frame.
    #[error("read failed: {0}")]
    Read(String),
}

impl CaptureError {
    pub fn connection(message: impl std::fmt::Display) -> Self {
        Self::Connection(message.to_string())
    }

    pub fn read(message: impl std::fmt::Display) -> Self {
        Self::Read(message.to_string())
    }
}
