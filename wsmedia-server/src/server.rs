//! WebSocket accept server

use crate::config::ServerConfig;
use crate::session::ConnectionSession;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_hdr_async_with_config, WebSocketStream};
use tracing::{debug, error, info, info_span, warn, Instrument};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tungstenite::http::{HeaderValue, StatusCode};
use tungstenite::protocol::WebSocketConfig;
use uuid::Uuid;
use wsmedia_core::{split_websocket, MessageSink, StreamError};

/// A connection currently streaming
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    /// Session identifier
    pub id: Uuid,
    /// Remote address
    pub peer: SocketAddr,
    /// When the session started streaming
    pub started_at: DateTime<Utc>,
}

/// Accepts WebSocket clients and streams the recorded media to each of them
#[derive(Debug, Clone)]
pub struct StreamServer {
    config: Arc<ServerConfig>,
    sessions: Arc<DashMap<Uuid, SessionInfo>>,
}

impl StreamServer {
    /// Create a new server
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener, StreamError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        info!(
            "Stream server listening on {}{}",
            listener.local_addr()?,
            self.config.path
        );
        Ok(listener)
    }

    /// Validate the configuration, check the media files load, bind and
    /// serve forever.
    ///
    /// Media is still reloaded for every connection.
    pub async fn run(&self) -> Result<(), StreamError> {
        self.config.validate()?;
        let media = self.config.media_files().load().await?;
        debug!(
            video_bytes = media.video.len(),
            audio_bytes = media.audio.len(),
            "Media files readable"
        );
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<(), StreamError> {
        self.serve_with_shutdown(listener, std::future::pending()).await
    }

    /// Serve connections until `shutdown` resolves.
    ///
    /// Sessions already running are left to finish on their own.
    pub async fn serve_with_shutdown<F>(
        &self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<(), StreamError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                _ = &mut shutdown => {
                    info!("Stream server shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    debug!("New connection from {}", peer);
                    let server = self.clone();
                    tokio::spawn(async move {
                        server.handle_connection(stream, peer).await;
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    /// Sessions currently streaming
    pub fn active_sessions(&self) -> Vec<SessionInfo> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Number of sessions currently streaming
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
        }

        let ws = match tokio::time::timeout(self.config.handshake_timeout, self.upgrade(stream)).await {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => {
                warn!("WebSocket handshake with {} failed: {}", peer, e);
                return;
            }
            Err(_) => {
                warn!("WebSocket handshake with {} timed out", peer);
                return;
            }
        };

        let id = Uuid::new_v4();
        let span = info_span!("session", %id, %peer);
        let (mut sink, reader) = split_websocket(ws);

        let media = match self.config.media_files().load().instrument(span.clone()).await {
            Ok(media) => media,
            Err(e) => {
                span.in_scope(|| error!(error_code = e.error_code(), "Failed to load media: {}", e));
                if let Err(e) = MessageSink::close(&mut sink).await {
                    debug!("Failed to close connection from {}: {}", peer, e);
                }
                return;
            }
        };

        let session = ConnectionSession::new(
            id,
            self.config.session.clone(),
            sink,
            reader,
            media.multiplexer(),
        );

        self.sessions.insert(
            id,
            SessionInfo {
                id,
                peer,
                started_at: Utc::now(),
            },
        );
        session.run().instrument(span).await;
        self.sessions.remove(&id);
    }

    async fn upgrade(&self, stream: TcpStream) -> Result<WebSocketStream<TcpStream>, tungstenite::Error> {
        let path = self.config.path.clone();
        let callback =
            move |request: &Request, response: Response| negotiate(&path, request, response);

        let limit = self.config.session.max_inbound_message_size;
        let ws_config = WebSocketConfig {
            max_message_size: Some(limit),
            max_frame_size: Some(limit),
            ..WebSocketConfig::default()
        };

        accept_hdr_async_with_config(stream, callback, Some(ws_config)).await
    }
}

/// Check the upgrade request and pick the subprotocol
fn negotiate(path: &str, request: &Request, mut response: Response) -> Result<Response, ErrorResponse> {
    let requested = request.uri().path();
    if requested != path {
        let mut rejection = ErrorResponse::new(Some(format!("No stream at {}", requested)));
        *rejection.status_mut() = StatusCode::NOT_FOUND;
        return Err(rejection);
    }

    if let Some(protocol) = first_subprotocol(request) {
        response.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocol);
    }
    Ok(response)
}

fn first_subprotocol(request: &Request) -> Option<HeaderValue> {
    let offered = request.headers().get(SEC_WEBSOCKET_PROTOCOL)?.to_str().ok()?;
    let first = offered.split(',').map(str::trim).find(|p| !p.is_empty())?;
    HeaderValue::from_str(first).ok()
}
