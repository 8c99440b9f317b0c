//! Error types shared across belfry crates
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for belfry
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading or saving errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed "HH:MM" time-of-day string
    #[error("Invalid time of day: {0}")]
    InvalidTimeOfDay(String),

    /// Schedule document errors (missing day, malformed activity)
    #[error("Schedule error: {0}")]
    Schedule(String),

    /// Two activities on the same day with overlapping time windows
    #[error("Schedule conflict: {0}")]
    ScheduleConflict(String),

    /// Audio source file absent
    #[error("Missing source: {0}")]
    MissingSource(String),

    /// Media backend reported a failure
    #[error("Backend failure: {0}")]
    Backend(String),

    /// Playback refused or impossible in the current state
    #[error("Playback error: {0}")]
    Playback(String),

    /// Speech synthesis failed
    #[error("TTS error: {0}")]
    Tts(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON document (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using the belfry Error
pub type Result<T> = std::result::Result<T, Error>;
