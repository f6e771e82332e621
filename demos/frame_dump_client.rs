//! Frame Dump Client Demo
//!
//! Connects to a wsmedia server, rebuilds frames from the header and fragment
//! messages and logs each one with its NAL unit types.
//!
//! ```text
//! cargo run --example frame_dump_client [ws://127.0.0.1:8080/ws/test]
//! ```

use anyhow::Context;
use futures::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use wsmedia::{split_annexb, FrameReassembler, NalUnitType, StreamType};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:8080/ws/test".to_string());

    let (mut ws, _) = connect_async(url.as_str())
        .await
        .with_context(|| format!("Failed to connect to {}", url))?;
    info!("Connected to {}", url);

    let mut reassembler = FrameReassembler::new();
    let (mut video_frames, mut audio_frames, mut payload_bytes) = (0u64, 0u64, 0u64);

    while let Some(message) = ws.next().await {
        match message? {
            Message::Binary(data) => {
                for (stream_type, frame) in reassembler.push(&data)? {
                    payload_bytes += frame.len() as u64;
                    match stream_type {
                        StreamType::Video => {
                            video_frames += 1;
                            let units: Vec<NalUnitType> = split_annexb(&frame.payload)
                                .map(|units| units.into_iter().filter_map(NalUnitType::of).collect())
                                .unwrap_or_default();
                            info!(pts = frame.pts, key = frame.is_key, len = frame.len(), ?units, "video");
                        }
                        StreamType::Audio => {
                            audio_frames += 1;
                            debug!(pts = frame.pts, len = frame.len(), "audio");
                        }
                    }
                }
            }
            Message::Close(_) => break,
            other => debug!(?other, "Control message"),
        }
    }

    if reassembler.is_mid_frame() {
        warn!("Connection ended in the middle of a frame");
    }
    info!(video_frames, audio_frames, payload_bytes, "Stream ended");
    Ok(())
}
