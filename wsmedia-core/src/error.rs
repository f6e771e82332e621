//! Error types for wsmedia

use std::time::Duration;
use thiserror::Error;

/// Main error type for streaming operations
#[derive(Error, Debug)]
pub enum StreamError {
    /// A transport message could not be written, or missed its deadline
    #[error("Transport write failed: {reason}")]
    TransportWrite {
        /// Reason for the write failure
        reason: String,
    },

    /// The transport failed while reading from the peer
    #[error("Transport read failed: {reason}")]
    TransportRead {
        /// Reason for the read failure
        reason: String,
    },

    /// No pong was observed within the liveness window
    #[error("Keepalive timeout: no pong within {timeout:?}")]
    KeepaliveTimeout {
        /// Liveness window that elapsed
        timeout: Duration,
    },

    /// Connection was already closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Invalid configuration value
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration {
        /// Offending configuration field
        field: String,
        /// Why the value was rejected
        reason: String,
    },

    /// Invalid data error
    #[error("Invalid data: {reason}")]
    InvalidData {
        /// Reason for invalid data
        reason: String,
    },

    /// Media source could not be prepared
    #[error("Media error: {reason}")]
    Media {
        /// Reason for the media failure
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        #[from]
        /// Underlying I/O error
        source: std::io::Error,
    },
}

impl StreamError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> String {
        match self {
            StreamError::TransportWrite { .. } => "TRANSPORT_WRITE_ERROR".to_string(),
            StreamError::TransportRead { .. } => "TRANSPORT_READ_ERROR".to_string(),
            StreamError::KeepaliveTimeout { .. } => "KEEPALIVE_TIMEOUT".to_string(),
            StreamError::ConnectionClosed => "CONNECTION_CLOSED".to_string(),
            StreamError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION".to_string(),
            StreamError::InvalidData { .. } => "INVALID_DATA".to_string(),
            StreamError::Media { .. } => "MEDIA_ERROR".to_string(),
            StreamError::Io { .. } => "IO_ERROR".to_string(),
        }
    }

    /// Whether the error ends the session that observed it.
    ///
    /// Transport failures leave the peer with a partially delivered frame, so
    /// none of them can be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StreamError::TransportWrite { .. }
                | StreamError::TransportRead { .. }
                | StreamError::KeepaliveTimeout { .. }
                | StreamError::ConnectionClosed
                | StreamError::Io { .. }
        )
    }
}
