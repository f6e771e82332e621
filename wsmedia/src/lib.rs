//! # wsmedia
//!
//! Streams a recorded H.264 Annex B video file and a raw 8 kHz A-law audio
//! file to WebSocket clients. Every client gets its own copy of both streams,
//! interleaved one frame at a time and written with a small binary framing:
//! a 14-byte header message followed by payload fragments of bounded size.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wsmedia::{AppConfig, StreamServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let config = AppConfig::default();
//!     wsmedia::init_tracing(&config.log_filter)?;
//!
//!     StreamServer::new(config.server).run().await?;
//!     Ok(())
//! }
//! ```
//!
//! Clients rebuild frames with [`FrameReassembler`].

#![deny(missing_docs)]
#![warn(clippy::all)]

pub use wsmedia_core::{
    Frame, FrameHeader, FrameReassembler, FrameWireEncoder, InboundMessage, MessageSink,
    MessageStream, OutboundMessage, StreamError, StreamType, FRAME_HEADER_LEN,
};

pub use wsmedia_media::{
    split_annexb, AudioFrameSource, FrameMultiplexer, FrameSource, MediaError, MediaFiles,
    MediaPayload, MuxRound, NalUnitType, VideoFrameSource,
};

pub use wsmedia_server::{
    CloseReason, ConnectionSession, ServerConfig, SessionConfig, SessionControl, SessionInfo,
    SessionState, SessionSummary, StreamServer,
};

pub mod config;

pub use config::{AppConfig, ConfigError};

use tracing::info;
use tracing_subscriber::EnvFilter;

/// Error returned when a global `tracing` subscriber is already installed
pub type TracingInitError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Install a formatted `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter` when set.
pub fn init_tracing(default_filter: &str) -> Result<(), TracingInitError> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_filter))?;
    tracing_subscriber::fmt().with_env_filter(filter).try_init()
}

/// Run a stream server for `config` until it fails
pub async fn serve(config: AppConfig) -> Result<(), StreamError> {
    info!(
        video = %config.server.video_path.display(),
        audio = %config.server.audio_path.display(),
        "Starting wsmedia"
    );
    StreamServer::new(config.server).run().await
}
