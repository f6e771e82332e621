//! Media error types
//!
//! Errors raised while preparing the recorded media for a session. None of
//! them are retryable: a failed Annex B parse ends the video stream early and
//! the session carries on with audio only.

use std::path::PathBuf;
use thiserror::Error;
use wsmedia_core::StreamError;

/// Main error type for media preparation
#[derive(Error, Debug)]
pub enum MediaError {
    /// Buffer too short to hold a start code and a NAL header
    #[error("Buffer too small for Annex B stream: {len} bytes")]
    BufferTooSmall {
        /// Length of the rejected buffer
        len: usize,
    },

    /// Buffer does not begin with an Annex B start code
    #[error("Malformed Annex B stream: no leading start code")]
    MalformedStream,

    /// Scan finished without producing a single NAL unit
    #[error("No NAL units found in Annex B stream")]
    NoNalusFound,

    /// Media file could not be read
    #[error("Failed to read {}: {source}", .path.display())]
    FileRead {
        /// File that failed to load
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },
}

/// Result type alias for media operations
pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            MediaError::BufferTooSmall { .. } => "BUFFER_TOO_SMALL",
            MediaError::MalformedStream => "MALFORMED_STREAM",
            MediaError::NoNalusFound => "NO_NALUS_FOUND",
            MediaError::FileRead { .. } => "FILE_READ_FAILED",
        }
    }
}

impl From<MediaError> for StreamError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::FileRead { source, .. } => StreamError::Io { source },
            other => StreamError::Media {
                reason: other.to_string(),
            },
        }
    }
}
