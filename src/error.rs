//! Error types for stream buffering.
//!
//! Errors in this crate are reserved for programmer mistakes and configuration
//! problems. Transient conditions, such as a non-blocking read with no data or
//! a read after end-of-stream, are reported through `None` or `0` return values
//! instead and never surface here.
//!
//! ## Error Categories
//!
//! - **Invalid State**: accessor misuse, e.g. a timestamp query on a block
//!   with no timestamp at offset 0
//! - **Precondition Violations**: bad arguments, e.g. `consume > count` or an
//!   odd-length complex view
//! - **Configuration Errors**: invalid port configuration
//! - **Source Errors**: failures reported by an upstream packet source
//!
//! ## Recovery
//!
//! ```rust
//! use bulkflow::StreamError;
//!
//! let error = StreamError::source_failed("generator stalled");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for stream operations.
pub type Result<T, E = StreamError> = std::result::Result<T, E>;

/// Main error type for stream operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StreamError {
    #[error("Invalid state: {details}")]
    InvalidState { details: String },

    #[error("Precondition violated in {operation}: {details}")]
    PreconditionViolation { operation: &'static str, details: String },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Configuration file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Packet source failed: {reason}")]
    Source {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl StreamError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            StreamError::Source { .. } => true,
            StreamError::InvalidState { .. } => false,
            StreamError::PreconditionViolation { .. } => false,
            StreamError::Config { .. } => false,
            StreamError::File { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            StreamError::InvalidState { .. } => vec![
                "Check that the block carries a timestamp at offset 0",
                "Only query timing information on blocks returned by a read",
            ],
            StreamError::PreconditionViolation { .. } => vec![
                "Ensure consume does not exceed count for overlapped reads",
                "Check that complex views are taken on even-length buffers",
            ],
            StreamError::Config { .. } => vec![
                "Use a maximum queue depth of at least 1",
                "Verify the configuration document structure",
            ],
            StreamError::File { .. } => vec![
                "Check the configuration file exists and is readable",
                "Check file permissions",
            ],
            StreamError::Source { .. } => vec![
                "Check the upstream producer is still running",
                "Restart the driver for this source",
            ],
        }
    }

    /// Helper constructor for invalid state errors.
    pub fn invalid_state(details: impl Into<String>) -> Self {
        StreamError::InvalidState { details: details.into() }
    }

    /// Helper constructor for precondition violations.
    pub fn precondition(operation: &'static str, details: impl Into<String>) -> Self {
        StreamError::PreconditionViolation { operation, details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        StreamError::Config { reason: reason.into() }
    }

    /// Helper constructor for configuration file errors.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        StreamError::File { path, source }
    }

    /// Helper constructor for source errors.
    pub fn source_failed(reason: impl Into<String>) -> Self {
        StreamError::Source { reason: reason.into(), source: None }
    }

    /// Helper constructor for source errors with an underlying cause.
    pub fn source_failed_with(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        StreamError::Source { reason: reason.into(), source: Some(source) }
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}
