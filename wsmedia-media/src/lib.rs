//! # wsmedia media
//!
//! Turns a recorded H.264 Annex B stream and a raw A-law stream into
//! timestamped frames, and interleaves the two streams for delivery.

#![warn(clippy::all)]

pub mod annexb;
pub mod error;
pub mod files;
pub mod mux;
pub mod source;

// Re-export main types
pub use annexb::{split_annexb, NalUnitType, START_CODE};
pub use error::{MediaError, MediaResult};
pub use files::{MediaFiles, MediaPayload};
pub use mux::{FrameMultiplexer, MuxRound};
pub use source::{
    AudioFrameSource, FrameSource, VideoFrameSource, AUDIO_BYTES_PER_MS, AUDIO_CHUNK_SIZE,
    VIDEO_FRAME_DURATION_MS,
};
