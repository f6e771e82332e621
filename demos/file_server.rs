//! File Streaming Server Demo
//!
//! Streams `test/test.h264` and `test/test.alaw` (or the files named in a
//! JSON config) to every WebSocket client connecting on `/ws/test`.
//!
//! ```text
//! cargo run --example file_server [config.json]
//! ```

use anyhow::Context;
use tracing::info;
use wsmedia::{AppConfig, StreamServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::from_json_file(&path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => AppConfig::default(),
    };

    wsmedia::init_tracing(&config.log_filter).map_err(anyhow::Error::msg)?;

    let server = StreamServer::new(config.server);
    server.config().validate()?;
    let listener = server.bind().await?;

    info!(
        "Try: cargo run --example frame_dump_client ws://{}{}",
        listener.local_addr()?,
        server.config().path
    );
    info!("Press Ctrl+C to stop");

    server
        .serve_with_shutdown(listener, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    for session in server.active_sessions() {
        info!(
            id = %session.id,
            peer = %session.peer,
            since = %session.started_at,
            "Still streaming"
        );
    }
    info!("Stopped with {} session(s) still streaming", server.session_count());
    Ok(())
}
