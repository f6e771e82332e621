//! Round-robin multiplexing of the video and audio sources
//!
//! Each round pulls at most one frame from each stream, video first. Nothing
//! is buffered beyond the round being sent and there is no wall-clock
//! scheduler: delivery pace follows transport write latency.

use crate::source::{AudioFrameSource, FrameSource, VideoFrameSource};
use tracing::info;
use wsmedia_core::{Frame, StreamType};

/// Frames produced by one multiplexer round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MuxRound {
    /// Video frame, if the video stream produced one
    pub video: Option<Frame>,
    /// Audio frame, if the audio stream produced one
    pub audio: Option<Frame>,
}

impl MuxRound {
    /// Frames of this round in send order
    pub fn into_frames(self) -> impl Iterator<Item = (StreamType, Frame)> {
        self.video
            .map(|frame| (StreamType::Video, frame))
            .into_iter()
            .chain(self.audio.map(|frame| (StreamType::Audio, frame)))
    }

    /// Number of frames in this round
    pub fn len(&self) -> usize {
        usize::from(self.video.is_some()) + usize::from(self.audio.is_some())
    }

    /// Whether the round carries no frame
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Interleaves two frame sources and tracks their exhaustion independently
#[derive(Debug)]
pub struct FrameMultiplexer<V = VideoFrameSource, A = AudioFrameSource> {
    video: V,
    audio: A,
    video_ended: bool,
    audio_ended: bool,
    rounds: u64,
}

impl<V: FrameSource, A: FrameSource> FrameMultiplexer<V, A> {
    /// Create a multiplexer over a video and an audio source
    pub fn new(video: V, audio: A) -> Self {
        Self {
            video,
            audio,
            video_ended: false,
            audio_ended: false,
            rounds: 0,
        }
    }

    /// Run one round.
    ///
    /// Returns `None` once both streams are exhausted. A stream that signaled
    /// end of stream is never pulled again, and a round that only discovers
    /// the final exhaustion produces `None` rather than an empty round.
    pub fn next_round(&mut self) -> Option<MuxRound> {
        let video = Self::pull(&mut self.video, &mut self.video_ended);
        let audio = Self::pull(&mut self.audio, &mut self.audio_ended);

        if video.is_none() && audio.is_none() {
            return None;
        }

        self.rounds += 1;
        Some(MuxRound { video, audio })
    }

    fn pull<S: FrameSource>(source: &mut S, ended: &mut bool) -> Option<Frame> {
        if *ended {
            return None;
        }
        let frame = source.next_frame();
        if frame.is_none() {
            *ended = true;
            info!("{} end", source.stream_type());
        }
        frame
    }

    /// Whether both streams are exhausted
    pub fn is_finished(&self) -> bool {
        self.video_ended && self.audio_ended
    }

    /// Whether the video stream is exhausted
    pub fn video_ended(&self) -> bool {
        self.video_ended
    }

    /// Whether the audio stream is exhausted
    pub fn audio_ended(&self) -> bool {
        self.audio_ended
    }

    /// Rounds that produced at least one frame
    pub fn rounds(&self) -> u64 {
        self.rounds
    }
}

impl<V: FrameSource, A: FrameSource> Iterator for FrameMultiplexer<V, A> {
    type Item = MuxRound;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_round()
    }
}
