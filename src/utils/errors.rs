// src/utils/errors.rs
//! Error types for the video recorder
//!
//! Failures inside a single scheduled capture/merge invocation never surface
//! here; they are logged and absorbed by the task. Only orchestrator-level
//! failures reach the caller.

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, RecorderError>;

/// Recorder errors
#[derive(Debug, Error)]
pub enum RecorderError {
    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A lifecycle operation was called in the wrong state
    #[error("Cannot {operation} a recorder in state {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    /// The caller's shutdown wait was interrupted
    #[error("Interrupted while waiting for {waiting_for} to stop")]
    Interrupted { waiting_for: String },

    /// Screenshot capture failed
    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    /// Video encoding failed
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    /// Handing the artifact to the attachment sink failed
    #[error("Attachment failed: {0}")]
    AttachmentFailed(String),

    /// Worker thread could not be spawned
    #[error("Failed to spawn worker thread {name}: {source}")]
    SpawnFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl RecorderError {
    /// Whether this error aborted a shutdown because the wait was interrupted
    pub fn is_interrupted(&self) -> bool {
        matches!(self, RecorderError::Interrupted { .. })
    }
}
