//! Recorded media loading

use crate::error::{MediaError, MediaResult};
use crate::mux::FrameMultiplexer;
use crate::source::{AudioFrameSource, VideoFrameSource};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Locations of the recorded streams
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFiles {
    /// H.264 Annex B elementary stream
    pub video_path: PathBuf,
    /// Raw 8 kHz A-law PCM
    pub audio_path: PathBuf,
}

impl MediaFiles {
    /// Create a new file pair
    pub fn new(video_path: impl Into<PathBuf>, audio_path: impl Into<PathBuf>) -> Self {
        Self {
            video_path: video_path.into(),
            audio_path: audio_path.into(),
        }
    }

    /// Read both files
    pub async fn load(&self) -> MediaResult<MediaPayload> {
        let video = read_file(&self.video_path).await?;
        let audio = read_file(&self.audio_path).await?;
        debug!(
            video_bytes = video.len(),
            audio_bytes = audio.len(),
            "Loaded media files"
        );
        Ok(MediaPayload { video, audio })
    }
}

async fn read_file(path: &Path) -> MediaResult<Bytes> {
    tokio::fs::read(path)
        .await
        .map(Bytes::from)
        .map_err(|source| MediaError::FileRead {
            path: path.to_path_buf(),
            source,
        })
}

/// Raw bytes of both recorded streams
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPayload {
    /// Annex B video bytes
    pub video: Bytes,
    /// A-law audio bytes
    pub audio: Bytes,
}

impl MediaPayload {
    /// Create a payload from in-memory buffers
    pub fn new(video: impl Into<Bytes>, audio: impl Into<Bytes>) -> Self {
        Self {
            video: video.into(),
            audio: audio.into(),
        }
    }

    /// Build fresh sources for one session.
    ///
    /// An unparseable video buffer ends the video stream before it starts;
    /// audio is still delivered.
    pub fn open_sources(&self) -> (VideoFrameSource, AudioFrameSource) {
        let video = match VideoFrameSource::from_annexb(self.video.clone()) {
            Ok(source) => source,
            Err(e) => {
                error!(error_code = e.error_code(), "Video stream unavailable: {}", e);
                VideoFrameSource::empty()
            }
        };
        (video, AudioFrameSource::new(self.audio.clone()))
    }

    /// Build a multiplexer over fresh sources
    pub fn multiplexer(&self) -> FrameMultiplexer {
        let (video, audio) = self.open_sources();
        FrameMultiplexer::new(video, audio)
    }
}
