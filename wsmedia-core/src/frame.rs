//! Timestamped media frames and the stream types carried on the wire

use bytes::Bytes;
use std::fmt;

/// Media stream a frame belongs to.
///
/// The discriminant is the stream type byte of the wire header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StreamType {
    /// H.264 Annex B video
    Video = 0x01,
    /// A-law PCM audio
    Audio = 0x04,
}

impl StreamType {
    /// Wire byte for this stream type
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parse a wire byte, returning `None` for unknown stream types
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(StreamType::Video),
            0x04 => Some(StreamType::Audio),
            _ => None,
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamType::Video => write!(f, "video"),
            StreamType::Audio => write!(f, "audio"),
        }
    }
}

/// One decodable unit of media.
///
/// `pts` is stream-relative and expressed in milliseconds for both streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Presentation timestamp
    pub pts: i64,
    /// Whether the frame can be decoded without prior frames
    pub is_key: bool,
    /// Frame bytes (Annex B framed for video, raw samples for audio)
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame
    pub fn new(pts: i64, is_key: bool, payload: impl Into<Bytes>) -> Self {
        Self {
            pts,
            is_key,
            payload: payload.into(),
        }
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_type_bytes() {
        assert_eq!(StreamType::Video.as_byte(), 1);
        assert_eq!(StreamType::Audio.as_byte(), 4);
        assert_eq!(StreamType::from_byte(1), Some(StreamType::Video));
        assert_eq!(StreamType::from_byte(4), Some(StreamType::Audio));
        assert_eq!(StreamType::from_byte(2), None);
        assert_eq!(StreamType::Audio.to_string(), "audio");
    }
}
