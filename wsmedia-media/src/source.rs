//! Frame sources
//!
//! Sources are explicit state objects with a pull method rather than
//! generators: each call to [`FrameSource::next_frame`] advances a cursor over
//! the recorded bytes and returns the next timestamped frame, or `None` once
//! the recording is exhausted. End of stream is never an error.

use crate::annexb::{split_annexb, NalUnitType, START_CODE};
use crate::error::MediaError;
use bytes::{BufMut, Bytes, BytesMut};
use tracing::warn;
use wsmedia_core::{Frame, StreamType};

/// Duration of one video frame in milliseconds (25 fps)
pub const VIDEO_FRAME_DURATION_MS: i64 = 40;

/// Audio chunk size in bytes: 40 ms of 8 kHz A-law
pub const AUDIO_CHUNK_SIZE: usize = 320;

/// A-law bytes per millisecond at 8 kHz mono
pub const AUDIO_BYTES_PER_MS: usize = 8;

/// A finite, non-restartable sequence of frames for one stream
pub trait FrameSource: Send {
    /// Stream this source feeds
    fn stream_type(&self) -> StreamType;

    /// Pull the next frame, or `None` at end of stream
    fn next_frame(&mut self) -> Option<Frame>;
}

/// Turns Annex B NAL units into access units.
///
/// Only the most recent SPS and PPS are cached, and slices are never checked
/// against the parameter set they reference: the recording is assumed to use
/// a single parameter-set pair.
#[derive(Debug)]
pub struct VideoFrameSource {
    nalus: Vec<Bytes>,
    cursor: usize,
    sps: Option<Bytes>,
    pps: Option<Bytes>,
    pts: i64,
}

impl VideoFrameSource {
    /// Parse an Annex B buffer. NAL units stay views into `data`.
    pub fn from_annexb(data: Bytes) -> Result<Self, MediaError> {
        let nalus = split_annexb(&data)?
            .into_iter()
            .map(|nal| data.slice_ref(nal))
            .collect();
        Ok(Self::from_nal_units(nalus))
    }

    /// Build a source from already split NAL units (start codes excluded)
    pub fn from_nal_units(nalus: Vec<Bytes>) -> Self {
        Self {
            nalus: nalus.into_iter().filter(|nal| !nal.is_empty()).collect(),
            cursor: 0,
            sps: None,
            pps: None,
            pts: 0,
        }
    }

    /// A source that is exhausted from the start
    pub fn empty() -> Self {
        Self::from_nal_units(Vec::new())
    }

    /// NAL units not yet consumed
    pub fn remaining_units(&self) -> usize {
        self.nalus.len() - self.cursor
    }

    fn key_frame_payload(&self, slice: &[u8]) -> Bytes {
        let parameter_sets = [self.sps.as_ref(), self.pps.as_ref()];
        let capacity = parameter_sets
            .iter()
            .flatten()
            .map(|ps| START_CODE.len() + ps.len())
            .sum::<usize>()
            + START_CODE.len()
            + slice.len();

        let mut payload = BytesMut::with_capacity(capacity);
        for ps in parameter_sets.into_iter().flatten() {
            payload.put_slice(&START_CODE);
            payload.put_slice(ps);
        }
        payload.put_slice(&START_CODE);
        payload.put_slice(slice);
        payload.freeze()
    }

    fn slice_payload(slice: &[u8]) -> Bytes {
        let mut payload = BytesMut::with_capacity(START_CODE.len() + slice.len());
        payload.put_slice(&START_CODE);
        payload.put_slice(slice);
        payload.freeze()
    }
}

impl FrameSource for VideoFrameSource {
    fn stream_type(&self) -> StreamType {
        StreamType::Video
    }

    fn next_frame(&mut self) -> Option<Frame> {
        while self.cursor < self.nalus.len() {
            let nal = self.nalus[self.cursor].clone();
            self.cursor += 1;

            match NalUnitType::of(&nal) {
                Some(NalUnitType::Sps) => self.sps = Some(nal),
                Some(NalUnitType::Pps) => self.pps = Some(nal),
                Some(NalUnitType::IdrSlice) => {
                    if self.sps.is_none() || self.pps.is_none() {
                        warn!(
                            sps = self.sps.is_some(),
                            pps = self.pps.is_some(),
                            "IDR slice without cached parameter sets"
                        );
                    }
                    self.pts += VIDEO_FRAME_DURATION_MS;
                    return Some(Frame::new(self.pts, true, self.key_frame_payload(&nal)));
                }
                Some(NalUnitType::NonIdrSlice) => {
                    self.pts += VIDEO_FRAME_DURATION_MS;
                    return Some(Frame::new(self.pts, false, Self::slice_payload(&nal)));
                }
                _ => {}
            }
        }
        None
    }
}

/// Cuts raw A-law audio into fixed-size chunks
#[derive(Debug)]
pub struct AudioFrameSource {
    data: Bytes,
    cursor: usize,
    pts: i64,
}

impl AudioFrameSource {
    /// Create a source over the whole audio buffer
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            cursor: 0,
            pts: 0,
        }
    }

    /// Bytes not yet emitted
    pub fn remaining_bytes(&self) -> usize {
        self.data.len() - self.cursor
    }
}

impl FrameSource for AudioFrameSource {
    fn stream_type(&self) -> StreamType {
        StreamType::Audio
    }

    fn next_frame(&mut self) -> Option<Frame> {
        if self.cursor >= self.data.len() {
            return None;
        }

        let end = (self.cursor + AUDIO_CHUNK_SIZE).min(self.data.len());
        let chunk = self.data.slice(self.cursor..end);
        self.cursor = end;

        // A short final chunk advances pts by its own duration; the clamp keeps
        // pts strictly increasing for tails under one millisecond.
        let duration_ms = (chunk.len() / AUDIO_BYTES_PER_MS).max(1);
        self.pts += duration_ms as i64;

        Some(Frame::new(self.pts, false, chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_video_source() {
        let mut source = VideoFrameSource::empty();
        assert_eq!(source.remaining_units(), 0);
        assert!(source.next_frame().is_none());
    }

    #[test]
    fn test_audio_tail_under_one_millisecond() {
        let mut source = AudioFrameSource::new(Bytes::from(vec![0xD5; AUDIO_CHUNK_SIZE + 3]));
        assert_eq!(source.next_frame().map(|f| f.pts), Some(40));
        let tail = source.next_frame().unwrap();
        assert_eq!(tail.len(), 3);
        assert_eq!(tail.pts, 41);
        assert!(source.next_frame().is_none());
    }

    #[test]
    fn test_idr_without_parameter_sets() {
        let mut source = VideoFrameSource::from_nal_units(vec![Bytes::from_static(&[0x65, 0xAA])]);
        let frame = source.next_frame().unwrap();
        assert!(frame.is_key);
        assert_eq!(frame.payload.as_ref(), &[0, 0, 0, 1, 0x65, 0xAA]);
    }
}
