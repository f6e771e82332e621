//! Message transport seam
//!
//! The streaming core only needs an ordered, reliable, message-oriented duplex
//! connection that distinguishes binary messages from control messages. This
//! module describes that contract as two async traits, one per direction, and
//! implements them for the split halves of a `tokio_tungstenite` WebSocket.
//!
//! Deadlines are not part of the traits: callers bound each write with
//! [`send_with_deadline`], which turns a missed deadline into a hard
//! [`StreamError::TransportWrite`].

use crate::error::StreamError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tracing::debug;
use tungstenite::error::ProtocolError;
use tungstenite::Message;

/// Message written to the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Binary data message
    Binary(Bytes),
    /// Keepalive ping control message
    Ping,
}

impl OutboundMessage {
    /// Payload length carried by the message
    pub fn len(&self) -> usize {
        match self {
            OutboundMessage::Binary(data) => data.len(),
            OutboundMessage::Ping => 0,
        }
    }

    /// Whether the message carries no payload
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Message received from the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// Binary data message
    Binary(Bytes),
    /// Text data message
    Text(String),
    /// Keepalive ping from the peer
    Ping,
    /// Acknowledgement of one of our keepalive pings
    Pong,
    /// Peer initiated close
    Close,
}

/// Write half of a message transport
#[async_trait]
pub trait MessageSink: Send {
    /// Send one message and flush it to the peer.
    ///
    /// Sending on a connection that is closing or closed fails with
    /// [`StreamError::ConnectionClosed`].
    async fn send(&mut self, message: OutboundMessage) -> Result<(), StreamError>;

    /// Close the connection. Closing an already closed sink succeeds.
    async fn close(&mut self) -> Result<(), StreamError>;
}

/// Read half of a message transport
#[async_trait]
pub trait MessageStream: Send {
    /// Receive the next message, or `None` once the connection has ended
    async fn recv(&mut self) -> Option<Result<InboundMessage, StreamError>>;
}

/// Send a message, failing if it is not flushed within `deadline`
pub async fn send_with_deadline<S>(
    sink: &mut S,
    message: OutboundMessage,
    deadline: Duration,
) -> Result<(), StreamError>
where
    S: MessageSink + ?Sized,
{
    match tokio::time::timeout(deadline, sink.send(message)).await {
        Ok(result) => result,
        Err(_) => Err(StreamError::TransportWrite {
            reason: format!("write deadline of {:?} exceeded", deadline),
        }),
    }
}

/// Write half of a WebSocket connection
pub type WebSocketSink<S> = SplitSink<WebSocketStream<S>, Message>;

/// Read half of a WebSocket connection
pub type WebSocketReader<S> = SplitStream<WebSocketStream<S>>;

/// Split an established WebSocket into its write and read halves
pub fn split_websocket<S>(ws: WebSocketStream<S>) -> (WebSocketSink<S>, WebSocketReader<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    ws.split()
}

#[async_trait]
impl<S> MessageSink for WebSocketSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, message: OutboundMessage) -> Result<(), StreamError> {
        let message = match message {
            OutboundMessage::Binary(data) => Message::Binary(data.to_vec()),
            OutboundMessage::Ping => Message::Ping(Vec::new()),
        };

        match SinkExt::send(self, message).await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed)
            | Err(tungstenite::Error::Protocol(ProtocolError::SendAfterClosing)) => {
                Err(StreamError::ConnectionClosed)
            }
            Err(e) => Err(StreamError::TransportWrite {
                reason: e.to_string(),
            }),
        }
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        match SinkExt::close(self).await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                debug!("WebSocket already closed");
                Ok(())
            }
            Err(e) => Err(StreamError::TransportWrite {
                reason: format!("failed to close connection: {}", e),
            }),
        }
    }
}

#[async_trait]
impl<S> MessageStream for WebSocketReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn recv(&mut self) -> Option<Result<InboundMessage, StreamError>> {
        loop {
            let message = match self.next().await? {
                Ok(message) => message,
                Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                    return None;
                }
                Err(e) => {
                    return Some(Err(StreamError::TransportRead {
                        reason: e.to_string(),
                    }));
                }
            };

            let inbound = match message {
                Message::Binary(data) => InboundMessage::Binary(Bytes::from(data)),
                Message::Text(text) => InboundMessage::Text(text),
                Message::Ping(_) => InboundMessage::Ping,
                Message::Pong(_) => InboundMessage::Pong,
                Message::Close(_) => InboundMessage::Close,
                // Raw frames are only surfaced when reading unfragmented frames
                Message::Frame(_) => continue,
            };
            return Some(Ok(inbound));
        }
    }
}
