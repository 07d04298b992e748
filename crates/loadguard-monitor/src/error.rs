//! Error types for the sampling components.
//!
//! Sampling itself never fails once running; these errors surface while
//! wiring collaborators together or while reading process metrics directly.

use thiserror::Error;

/// Result type alias for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Errors that can occur while setting up sampling or reading metrics.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// A tokio-driven ticker was requested outside a tokio runtime.
    #[error("no tokio runtime available to drive the sampler")]
    NoRuntime,

    /// Failed to read a procfs file.
    #[error("failed to read {path}: {source}")]
    ReadError {
        /// Path that could not be read
        path: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Failed to parse a value out of a procfs file.
    #[error("failed to parse value from {path}: {detail}")]
    ParseError {
        /// Path the value came from
        path: String,
        /// What went wrong
        detail: String,
    },
}
