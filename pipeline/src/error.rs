//! Pipeline error types
//!
//! Configuration mistakes, persistence failures and transport failures are
//! kept in separate enums: persistence errors are fatal for an invocation,
//! transport errors are recorded per chunk and never abort delivery.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised when a pipeline component is built with invalid settings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// Similarity threshold outside `[0, 1]`
    #[error("Similarity threshold must be within [0, 1], got {0}")]
    InvalidThreshold(f64),

    /// Chunk size of zero can never make progress
    #[error("Maximum chunk length must be greater than zero")]
    InvalidChunkSize,
}

/// Errors from snapshot/history persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error on a specific state file
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// History log contents could not be parsed
    #[error("Corrupted history log at {path}: {message}")]
    CorruptHistory { path: PathBuf, message: String },
}

impl StoreError {
    /// Wrap an IO error with the path it happened on
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// Errors from a single transport send.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Endpoint answered with a non-2xx status
    #[error("Transport returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Request never produced a response (connect, timeout, TLS...)
    #[error("Transport request failed: {0}")]
    Request(String),
}

impl TransportError {
    /// Whether the endpoint actually answered
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Request(_) => None,
        }
    }
}
