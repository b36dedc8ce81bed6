//! Error types for playback orchestration

use crate::types::TrackId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Playback errors
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// Track file or catalog entry is missing
    #[error("Source unavailable: track {0}")]
    SourceUnavailable(TrackId),

    /// Transport could not open or decode the source
    #[error("Failed to prepare track {track_id}: {reason}")]
    PrepareFailed { track_id: TrackId, reason: String },

    /// Output device could not be acquired
    #[error("Audio focus denied")]
    FocusDenied,

    /// Stored snapshot is malformed or partially unreadable
    #[error("Persisted playback state is corrupt: {0}")]
    PersistenceCorrupt(String),

    /// Queue is empty
    #[error("Queue is empty")]
    QueueEmpty,

    /// Index out of bounds
    #[error("Index out of bounds: {0}")]
    IndexOutOfBounds(usize),

    /// Invalid operation
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Dispatcher thread is gone
    #[error("Playback dispatcher is not running")]
    Disconnected,

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    /// Snapshot could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Closed set of codes pushed to listeners alongside a detail message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    SourceUnavailable,
    PrepareFailed,
    FocusDenied,
    PersistenceCorrupt,
    InvalidRequest,
    Internal,
}

impl PlaybackError {
    /// Code reported to listeners
    pub fn code(&self) -> ErrorCode {
        match self {
            PlaybackError::SourceUnavailable(_) => ErrorCode::SourceUnavailable,
            PlaybackError::PrepareFailed { .. } => ErrorCode::PrepareFailed,
            PlaybackError::FocusDenied => ErrorCode::FocusDenied,
            PlaybackError::PersistenceCorrupt(_) => ErrorCode::PersistenceCorrupt,
            PlaybackError::QueueEmpty
            | PlaybackError::IndexOutOfBounds(_)
            | PlaybackError::InvalidOperation(_) => ErrorCode::InvalidRequest,
            PlaybackError::Disconnected
            | PlaybackError::Config(_)
            | PlaybackError::Serialization(_)
            | PlaybackError::Io(_) => ErrorCode::Internal,
        }
    }
}

/// Result type for playback operations
pub type Result<T> = std::result::Result<T, PlaybackError>;
