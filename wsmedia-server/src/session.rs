//! Per-connection streaming session
//!
//! A session runs two activities over one connection:
//!
//! - the read activity drains whatever the peer sends, refreshes the liveness
//!   deadline on every pong and notices when the peer goes away;
//! - the write activity sends a keepalive ping whenever the ping period has
//!   elapsed and otherwise pushes multiplexed frames through the wire encoder.
//!
//! They share nothing but [`SessionControl`], a one-way
//! `Open -> Closing -> Closed` state. Whichever activity first moves the state
//! to `Closing` records the [`CloseReason`]; the other one stops at its next
//! check. The connection is closed exactly once, after both activities end.
//!
//! Both activities are polled concurrently on the same task, so liveness is
//! still serviced while the write activity is in the middle of a frame.

use crate::config::SessionConfig;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;
use wsmedia_core::{
    send_with_deadline, FrameWireEncoder, InboundMessage, MessageSink, MessageStream,
    OutboundMessage, StreamError, StreamType,
};
use wsmedia_media::{AudioFrameSource, FrameMultiplexer, FrameSource, VideoFrameSource};

const OPEN: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// Streaming
    Open,
    /// Shutdown requested, no further writes
    Closing,
    /// Connection closed
    Closed,
}

/// Why a session left the `Open` state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CloseReason {
    /// Both media streams were fully delivered
    StreamsExhausted,
    /// The peer closed the connection
    PeerClosed,
    /// Reading from the connection failed
    ReadError,
    /// No pong arrived within the liveness window
    KeepaliveTimeout,
    /// Writing to the connection failed or missed its deadline
    WriteError,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            CloseReason::StreamsExhausted => "streams exhausted",
            CloseReason::PeerClosed => "peer closed",
            CloseReason::ReadError => "read error",
            CloseReason::KeepaliveTimeout => "keepalive timeout",
            CloseReason::WriteError => "write error",
        };
        f.write_str(reason)
    }
}

/// Shutdown state shared by the read and write activities
#[derive(Debug)]
pub struct SessionControl {
    state: AtomicU8,
    reason: OnceLock<CloseReason>,
    closing: Notify,
}

impl SessionControl {
    /// Create a control in the `Open` state
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(OPEN),
            reason: OnceLock::new(),
            closing: Notify::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        match self.state.load(Ordering::Acquire) {
            OPEN => SessionState::Open,
            CLOSING => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }

    /// Whether frames may still be written
    pub fn is_open(&self) -> bool {
        self.state.load(Ordering::Acquire) == OPEN
    }

    /// Request shutdown.
    ///
    /// Returns `true` only for the call that moved the session out of `Open`;
    /// its reason is the one recorded.
    pub fn begin_close(&self, reason: CloseReason) -> bool {
        let won = self
            .state
            .compare_exchange(OPEN, CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            let _ = self.reason.set(reason);
            debug!(%reason, "Session closing");
            self.closing.notify_waiters();
        }
        won
    }

    /// Move `Closing -> Closed`. Returns `true` exactly once.
    fn finish_close(&self) -> bool {
        self.state
            .compare_exchange(CLOSING, CLOSED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Reason recorded by the first `begin_close`
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.reason.get().copied()
    }

    /// Resolve once the session has left the `Open` state
    pub async fn closing(&self) {
        let notified = self.closing.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if !self.is_open() {
            return;
        }
        notified.await;
    }
}

impl Default for SessionControl {
    fn default() -> Self {
        Self::new()
    }
}

/// What a finished session delivered
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    /// Session identifier
    pub id: Uuid,
    /// Why the session ended
    pub close_reason: Option<CloseReason>,
    /// Video frames fully written
    pub video_frames: u64,
    /// Audio frames fully written
    pub audio_frames: u64,
    /// Header and payload bytes of fully written frames
    pub bytes_sent: u64,
    /// Keepalive pings sent
    pub pings_sent: u64,
    /// Session start time
    pub started_at: DateTime<Utc>,
    /// Time from start to close
    pub duration: Duration,
}

#[derive(Debug, Default)]
struct WriteStats {
    video_frames: u64,
    audio_frames: u64,
    bytes_sent: u64,
    pings_sent: u64,
}

impl WriteStats {
    fn record_frame(&mut self, stream_type: StreamType, bytes: usize) {
        match stream_type {
            StreamType::Video => self.video_frames += 1,
            StreamType::Audio => self.audio_frames += 1,
        }
        self.bytes_sent += bytes as u64;
    }
}

/// One client connection streaming the recorded media
pub struct ConnectionSession<W, R, V = VideoFrameSource, A = AudioFrameSource> {
    id: Uuid,
    config: SessionConfig,
    sink: W,
    stream: R,
    mux: FrameMultiplexer<V, A>,
    control: Arc<SessionControl>,
}

impl<W, R, V, A> ConnectionSession<W, R, V, A>
where
    W: MessageSink,
    R: MessageStream,
    V: FrameSource,
    A: FrameSource,
{
    /// Create a session over an established connection
    pub fn new(
        id: Uuid,
        config: SessionConfig,
        sink: W,
        stream: R,
        mux: FrameMultiplexer<V, A>,
    ) -> Self {
        Self {
            id,
            config,
            sink,
            stream,
            mux,
            control: Arc::new(SessionControl::new()),
        }
    }

    /// Session identifier
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Handle for observing or requesting shutdown from outside the session
    pub fn control(&self) -> Arc<SessionControl> {
        Arc::clone(&self.control)
    }

    /// Stream until the media is exhausted or the connection fails
    pub async fn run(self) -> SessionSummary {
        let Self {
            id,
            config,
            mut sink,
            stream,
            mut mux,
            control,
        } = self;

        let started_at = Utc::now();
        let started = Instant::now();
        let encoder = FrameWireEncoder::new(config.max_fragment_size, config.write_wait);
        info!(%id, "Session started");

        let (_, stats) = tokio::join!(
            read_loop(stream, &control, config.pong_wait),
            write_loop(&mut sink, &mut mux, &control, &config, &encoder),
        );

        if control.finish_close() {
            let closed = tokio::time::timeout(config.write_wait, sink.close()).await;
            match closed {
                Ok(Ok(())) => debug!(%id, "Connection closed"),
                Ok(Err(e)) => warn!(%id, "Failed to close connection: {}", e),
                Err(_) => warn!(%id, "Timed out closing connection"),
            }
        }

        let summary = SessionSummary {
            id,
            close_reason: control.close_reason(),
            video_frames: stats.video_frames,
            audio_frames: stats.audio_frames,
            bytes_sent: stats.bytes_sent,
            pings_sent: stats.pings_sent,
            started_at,
            duration: started.elapsed(),
        };
        info!(
            %id,
            reason = ?summary.close_reason,
            video_frames = summary.video_frames,
            audio_frames = summary.audio_frames,
            bytes_sent = summary.bytes_sent,
            "Session ended"
        );
        summary
    }
}

async fn read_loop<R: MessageStream>(mut stream: R, control: &SessionControl, pong_wait: Duration) {
    let mut deadline = Instant::now() + pong_wait;

    loop {
        let received = tokio::select! {
            _ = control.closing() => break,
            received = tokio::time::timeout_at(deadline, stream.recv()) => received,
        };

        match received {
            Ok(Some(Ok(InboundMessage::Pong))) => {
                trace!("Pong received");
                deadline = Instant::now() + pong_wait;
            }
            Ok(Some(Ok(InboundMessage::Close))) => {
                info!("WebSocket conn closed by peer");
                control.begin_close(CloseReason::PeerClosed);
                break;
            }
            Ok(Some(Ok(message))) => {
                trace!(?message, "Discarding inbound message");
            }
            Ok(Some(Err(e))) if !e.is_fatal() => {
                warn!(error_code = %e.error_code(), "Ignoring unreadable inbound message: {}", e);
            }
            Ok(Some(Err(e))) => {
                error!(error_code = %e.error_code(), "WebSocket conn read error: {}", e);
                control.begin_close(CloseReason::ReadError);
                break;
            }
            Ok(None) => {
                warn!("WebSocket conn closed unexpectedly");
                control.begin_close(CloseReason::PeerClosed);
                break;
            }
            Err(_) => {
                let e = StreamError::KeepaliveTimeout { timeout: pong_wait };
                warn!(error_code = %e.error_code(), "{}", e);
                control.begin_close(CloseReason::KeepaliveTimeout);
                break;
            }
        }
    }
}

async fn write_loop<W, V, A>(
    sink: &mut W,
    mux: &mut FrameMultiplexer<V, A>,
    control: &SessionControl,
    config: &SessionConfig,
    encoder: &FrameWireEncoder,
) -> WriteStats
where
    W: MessageSink,
    V: FrameSource,
    A: FrameSource,
{
    let mut stats = WriteStats::default();
    let mut ping_ticker =
        tokio::time::interval_at(Instant::now() + config.ping_period, config.ping_period);
    ping_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    'session: while control.is_open() {
        if ping_ticker.tick().now_or_never().is_some() {
            if let Err(e) = send_with_deadline(sink, OutboundMessage::Ping, config.write_wait).await {
                error!(error_code = %e.error_code(), "Write ping message error: {}", e);
                control.begin_close(CloseReason::WriteError);
                break;
            }
            stats.pings_sent += 1;
            trace!("Ping sent");
        }

        let Some(round) = mux.next_round() else {
            info!("Video and audio streams exhausted");
            control.begin_close(CloseReason::StreamsExhausted);
            break;
        };

        for (stream_type, frame) in round.into_frames() {
            if !control.is_open() {
                break 'session;
            }
            match encoder.write_frame(sink, stream_type, &frame).await {
                Ok(bytes) => stats.record_frame(stream_type, bytes),
                // Rejected before any message went out, the peer stays in sync
                Err(e) if !e.is_fatal() => {
                    warn!(
                        error_code = %e.error_code(),
                        pts = frame.pts,
                        "Skipping unencodable {} frame: {}",
                        stream_type,
                        e
                    );
                }
                Err(e) => {
                    error!(
                        error_code = %e.error_code(),
                        pts = frame.pts,
                        "Send {} frame error: {}",
                        stream_type,
                        e
                    );
                    control.begin_close(CloseReason::WriteError);
                    break 'session;
                }
            }
        }

        // Let the read activity observe pongs and closes between rounds
        tokio::task::yield_now().await;
    }

    stats
}
