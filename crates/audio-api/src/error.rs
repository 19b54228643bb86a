//! Error types for the audio API crate.

use thiserror::Error;

/// A failure status reported by the native audio subsystem.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("native status {code:#010x}: {message}")]
pub struct NativeError {
    /// Raw status code as returned by the native call.
    pub code: i32,
    /// Human readable context supplied by the backend.
    pub message: String,
}

impl NativeError {
    /// Creates a native error from a status code and a message.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Audio session error type covering all steady-state and construction failures.
#[derive(Debug, Error)]
pub enum AudioError {
    /// A native operation returned a failure status.
    #[error("native call {operation} failed: {source}")]
    Native {
        /// Name of the native operation.
        operation: &'static str,
        /// Underlying native status.
        #[source]
        source: NativeError,
    },

    /// The confinement thread is no longer running.
    #[error("confinement thread has shut down")]
    Shutdown,

    /// An action submitted to the confinement thread panicked.
    #[error("confined action panicked: {0}")]
    ActionPanicked(String),

    /// The session has already been disposed.
    #[error("audio session has been disposed")]
    Disposed,

    /// The native handle is missing a required capability.
    #[error("native handle does not expose {0}")]
    InvalidHandle(&'static str),

    /// A volume outside 0..=100 was rejected.
    #[error("volume must be between 0 and 100, got {0}")]
    VolumeOutOfRange(i32),

    /// Information about the owning process could not be read.
    #[error("process {pid} unavailable: {reason}")]
    ProcessUnavailable {
        /// Process id that was looked up.
        pid: u32,
        /// Why the lookup failed.
        reason: String,
    },
}

impl AudioError {
    /// Wraps a native status with the name of the failing operation.
    pub fn native(operation: &'static str, source: NativeError) -> Self {
        AudioError::Native { operation, source }
    }

    /// Returns true when the error means the operation was dropped because
    /// the confinement thread is gone. Callers skip the operation.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, AudioError::Shutdown)
    }
}

/// A subscriber's handler failed while a notification was being delivered.
///
/// Passed to [`Observer::on_error`](crate::Observer::on_error) of the
/// subscriber that failed. Other subscribers in the same round are unaffected.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The handler returned an error.
    #[error("subscriber handler failed: {0:#}")]
    Handler(anyhow::Error),

    /// The handler panicked.
    #[error("subscriber handler panicked: {0}")]
    Panicked(String),
}

/// Convenience result alias for audio session operations.
pub type Result<T> = std::result::Result<T, AudioError>;
