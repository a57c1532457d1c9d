//! Error types for the streaming pipeline.
//!
//! Streaming-path conditions (queue-full window drops, device-reported data
//! loss) are counted and logged, never surfaced as errors: the stream is meant
//! to run unattended and degrades to stale data instead of failing. The
//! variants here cover setup, reconfiguration, and export, where a hard
//! failure is the right answer.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur when configuring or driving the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Device could not be opened (missing hardware, permissions, etc.)
    #[error("Device unavailable: {message}")]
    DeviceUnavailable { message: String },

    /// Device reported a fatal fault mid-stream
    #[error("Device fault: {message}")]
    DeviceFault { message: String },

    /// Invalid configuration or parameter
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Operation requires a stopped stream (mode switch races producer state)
    #[error("Stream is active: {message}")]
    StreamActive { message: String },

    /// Buffer allocation failed; the previous buffer is retained
    #[error("Allocation of {requested} samples failed")]
    Allocation { requested: usize },

    /// I/O error from the operating system
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV serialization error during export
    #[cfg(feature = "export_csv")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl PipelineError {
    /// Shorthand for an invalid-configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Shorthand for a stream-active error.
    pub fn stream_active(message: impl Into<String>) -> Self {
        Self::StreamActive {
            message: message.into(),
        }
    }

    /// Check if this is a device availability error.
    pub fn is_device_unavailable(&self) -> bool {
        matches!(self, Self::DeviceUnavailable { .. })
    }

    /// Check if this error means the operation needs a stopped stream.
    pub fn is_stream_active(&self) -> bool {
        matches!(self, Self::StreamActive { .. })
    }

    /// Check if this is a configuration error.
    pub fn is_invalid_config(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. })
    }
}
