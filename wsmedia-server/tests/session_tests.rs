//! Tests for the per-connection streaming session

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;
use wsmedia_core::*;
use wsmedia_media::*;
use wsmedia_server::*;

type Inbound = Result<InboundMessage, StreamError>;

/// Everything a mock sink saw
#[derive(Debug, Clone, Default)]
struct Recorder {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    closes: Arc<AtomicUsize>,
}

impl Recorder {
    fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

struct MockSink {
    recorder: Recorder,
    fail_after: Option<usize>,
    send_delay: Option<Duration>,
    stalled: bool,
    pong_tx: Option<mpsc::UnboundedSender<Inbound>>,
}

impl MockSink {
    fn new(recorder: Recorder) -> Self {
        Self {
            recorder,
            fail_after: None,
            send_delay: None,
            stalled: false,
            pong_tx: None,
        }
    }
}

#[async_trait]
impl MessageSink for MockSink {
    async fn send(&mut self, message: OutboundMessage) -> Result<(), StreamError> {
        if self.stalled {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.send_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(limit) = self.fail_after {
            let sent = self.recorder.sent.lock().unwrap().len();
            if sent >= limit {
                return Err(StreamError::TransportWrite {
                    reason: "broken pipe".to_string(),
                });
            }
        }

        let is_ping = message == OutboundMessage::Ping;
        self.recorder.sent.lock().unwrap().push(message);
        if is_ping {
            if let Some(pong_tx) = &self.pong_tx {
                let _ = pong_tx.send(Ok(InboundMessage::Pong));
            }
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        self.recorder.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MockStream {
    rx: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait]
impl MessageStream for MockStream {
    async fn recv(&mut self) -> Option<Inbound> {
        self.rx.recv().await
    }
}

fn mock_stream() -> (mpsc::UnboundedSender<Inbound>, MockStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, MockStream { rx })
}

/// Audio source that never ends
#[derive(Debug, Default)]
struct EndlessAudio {
    pts: i64,
}

impl FrameSource for EndlessAudio {
    fn stream_type(&self) -> StreamType {
        StreamType::Audio
    }

    fn next_frame(&mut self) -> Option<Frame> {
        self.pts += 40;
        Some(Frame::new(self.pts, false, Bytes::from_static(&[0xD5; 16])))
    }
}

fn endless_mux() -> FrameMultiplexer<VideoFrameSource, EndlessAudio> {
    FrameMultiplexer::new(VideoFrameSource::empty(), EndlessAudio::default())
}

fn nal(unit: &[u8]) -> Vec<u8> {
    [&START_CODE[..], unit].concat()
}

/// SPS, PPS, IDR, non-IDR slice plus 650 bytes of audio
fn recorded_mux() -> FrameMultiplexer {
    let video = [
        nal(&[0x67, 0x42]),
        nal(&[0x68, 0xCE]),
        nal(&[0x65, 0x88, 0x84]),
        nal(&[0x41, 0x9A]),
    ]
    .concat();
    MediaPayload::new(video, vec![0xD5u8; 650]).multiplexer()
}

fn reassemble(messages: &[OutboundMessage]) -> Vec<(StreamType, Frame)> {
    let mut reassembler = FrameReassembler::new();
    let mut frames = Vec::new();
    for message in messages {
        if let OutboundMessage::Binary(data) = message {
            frames.extend(reassembler.push(data).unwrap());
        }
    }
    assert!(!reassembler.is_mid_frame());
    frames
}

#[tokio::test]
async fn test_session_streams_until_exhausted() {
    let recorder = Recorder::default();
    let (_inbound_tx, stream) = mock_stream();
    let session = ConnectionSession::new(
        Uuid::new_v4(),
        SessionConfig::default(),
        MockSink::new(recorder.clone()),
        stream,
        recorded_mux(),
    );
    let control = session.control();

    let summary = session.run().await;

    assert_eq!(summary.close_reason, Some(CloseReason::StreamsExhausted));
    assert_eq!(summary.video_frames, 2);
    assert_eq!(summary.audio_frames, 3);
    assert_eq!(summary.pings_sent, 0);
    assert_eq!(summary.bytes_sent, 5 * 14 + 19 + 6 + 650);
    assert_eq!(control.state(), SessionState::Closed);
    assert_eq!(recorder.closes(), 1);

    let frames = reassemble(&recorder.sent());
    let order: Vec<(StreamType, i64)> = frames.iter().map(|(t, f)| (*t, f.pts)).collect();
    assert_eq!(
        order,
        vec![
            (StreamType::Video, 40),
            (StreamType::Audio, 40),
            (StreamType::Video, 80),
            (StreamType::Audio, 80),
            (StreamType::Audio, 81),
        ]
    );
    assert!(frames[0].1.is_key);
    assert_eq!(frames[0].1.len(), 19);
    assert!(!frames[2].1.is_key);
    assert_eq!(frames[4].1.len(), 10);
}

#[tokio::test]
async fn test_peer_close_ends_session() {
    let recorder = Recorder::default();
    let (inbound_tx, stream) = mock_stream();
    inbound_tx.send(Ok(InboundMessage::Close)).unwrap();

    let session = ConnectionSession::new(
        Uuid::new_v4(),
        SessionConfig::default(),
        MockSink::new(recorder.clone()),
        stream,
        endless_mux(),
    );
    let summary = session.run().await;

    assert_eq!(summary.close_reason, Some(CloseReason::PeerClosed));
    assert_eq!(recorder.closes(), 1);
}

#[tokio::test]
async fn test_dropped_connection_ends_session() {
    let recorder = Recorder::default();
    let (inbound_tx, stream) = mock_stream();
    drop(inbound_tx);

    let session = ConnectionSession::new(
        Uuid::new_v4(),
        SessionConfig::default(),
        MockSink::new(recorder.clone()),
        stream,
        endless_mux(),
    );
    let summary = session.run().await;

    assert_eq!(summary.close_reason, Some(CloseReason::PeerClosed));
}

#[tokio::test]
async fn test_read_error_ends_session() {
    let recorder = Recorder::default();
    let (inbound_tx, stream) = mock_stream();
    inbound_tx.send(Ok(InboundMessage::Text("ignored".to_string()))).unwrap();
    inbound_tx
        .send(Err(StreamError::TransportRead {
            reason: "connection reset".to_string(),
        }))
        .unwrap();

    let session = ConnectionSession::new(
        Uuid::new_v4(),
        SessionConfig::default(),
        MockSink::new(recorder.clone()),
        stream,
        endless_mux(),
    );
    let summary = session.run().await;

    assert_eq!(summary.close_reason, Some(CloseReason::ReadError));
    assert_eq!(recorder.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_pong_times_out() {
    let recorder = Recorder::default();
    let (_inbound_tx, stream) = mock_stream();
    let mut sink = MockSink::new(recorder.clone());
    sink.stalled = true;

    let config = SessionConfig {
        write_wait: Duration::from_secs(60),
        ..SessionConfig::with_pong_wait(Duration::from_secs(1))
    };
    let session = ConnectionSession::new(Uuid::new_v4(), config, sink, stream, endless_mux());
    let summary = session.run().await;

    assert_eq!(summary.close_reason, Some(CloseReason::KeepaliveTimeout));
    assert_eq!(summary.audio_frames, 0);
    assert_eq!(recorder.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pongs_keep_session_alive() {
    let recorder = Recorder::default();
    let (inbound_tx, stream) = mock_stream();
    let mut sink = MockSink::new(recorder.clone());
    sink.send_delay = Some(Duration::from_millis(100));
    sink.pong_tx = Some(inbound_tx);

    let config = SessionConfig {
        ping_period: Duration::from_millis(900),
        ..SessionConfig::with_pong_wait(Duration::from_secs(2))
    };
    let audio = AudioFrameSource::new(Bytes::from(vec![0xD5u8; AUDIO_CHUNK_SIZE * 30]));
    let mux = FrameMultiplexer::new(VideoFrameSource::empty(), audio);

    let session = ConnectionSession::new(Uuid::new_v4(), config, sink, stream, mux);
    let summary = session.run().await;

    // 30 frames at 200 ms each outlast the 2 s liveness window several times
    assert_eq!(summary.close_reason, Some(CloseReason::StreamsExhausted));
    assert_eq!(summary.audio_frames, 30);
    assert!(summary.pings_sent >= 4, "pings sent: {}", summary.pings_sent);

    let pings = recorder
        .sent()
        .into_iter()
        .filter(|m| *m == OutboundMessage::Ping)
        .count();
    assert_eq!(pings as u64, summary.pings_sent);
}

#[tokio::test]
async fn test_write_failure_stops_writing() {
    let recorder = Recorder::default();
    let (_inbound_tx, stream) = mock_stream();
    let mut sink = MockSink::new(recorder.clone());
    sink.fail_after = Some(3);

    let session = ConnectionSession::new(
        Uuid::new_v4(),
        SessionConfig::default(),
        sink,
        stream,
        recorded_mux(),
    );
    let summary = session.run().await;

    // Video header and payload, then the audio header; the audio payload fails
    assert_eq!(summary.close_reason, Some(CloseReason::WriteError));
    assert_eq!(summary.video_frames, 1);
    assert_eq!(summary.audio_frames, 0);
    assert_eq!(summary.bytes_sent, 14 + 19);
    assert_eq!(recorder.sent().len(), 3);
    assert_eq!(recorder.closes(), 1);
}

#[tokio::test]
async fn test_external_close_request() {
    let recorder = Recorder::default();
    let (_inbound_tx, stream) = mock_stream();
    let session = ConnectionSession::new(
        Uuid::new_v4(),
        SessionConfig::default(),
        MockSink::new(recorder.clone()),
        stream,
        endless_mux(),
    );
    let control = session.control();
    let handle = tokio::spawn(session.run());

    tokio::task::yield_now().await;
    assert!(control.begin_close(CloseReason::PeerClosed));

    let summary = handle.await.unwrap();
    assert_eq!(summary.close_reason, Some(CloseReason::PeerClosed));
    assert_eq!(control.state(), SessionState::Closed);

    let written = recorder.sent().len();
    tokio::task::yield_now().await;
    assert_eq!(recorder.sent().len(), written);
    assert_eq!(recorder.closes(), 1);
}

/// Audio source replaying a fixed list of frames
#[derive(Debug)]
struct ScriptedAudio {
    frames: std::vec::IntoIter<Frame>,
}

impl FrameSource for ScriptedAudio {
    fn stream_type(&self) -> StreamType {
        StreamType::Audio
    }

    fn next_frame(&mut self) -> Option<Frame> {
        self.frames.next()
    }
}

#[tokio::test]
async fn test_unencodable_frame_is_skipped() {
    let recorder = Recorder::default();
    let (_inbound_tx, stream) = mock_stream();
    let audio = ScriptedAudio {
        frames: vec![
            Frame::new(40, false, Bytes::from_static(&[0xD5; 8])),
            Frame::new(-1, false, Bytes::from_static(&[0xD5; 8])),
            Frame::new(120, false, Bytes::from_static(&[0xD5; 8])),
        ]
        .into_iter(),
    };
    let mux = FrameMultiplexer::new(VideoFrameSource::empty(), audio);

    let session = ConnectionSession::new(
        Uuid::new_v4(),
        SessionConfig::default(),
        MockSink::new(recorder.clone()),
        stream,
        mux,
    );
    let summary = session.run().await;

    assert_eq!(summary.close_reason, Some(CloseReason::StreamsExhausted));
    assert_eq!(summary.audio_frames, 2);
    assert_eq!(summary.bytes_sent, 2 * (14 + 8));

    let pts: Vec<i64> = reassemble(&recorder.sent())
        .into_iter()
        .map(|(_, frame)| frame.pts)
        .collect();
    assert_eq!(pts, vec![40, 120]);
}

#[tokio::test]
async fn test_recoverable_read_error_is_ignored() {
    let recorder = Recorder::default();
    let (inbound_tx, stream) = mock_stream();
    inbound_tx
        .send(Err(StreamError::InvalidData {
            reason: "unexpected text payload".to_string(),
        }))
        .unwrap();
    inbound_tx.send(Ok(InboundMessage::Close)).unwrap();

    let session = ConnectionSession::new(
        Uuid::new_v4(),
        SessionConfig::default(),
        MockSink::new(recorder.clone()),
        stream,
        endless_mux(),
    );
    let summary = session.run().await;

    assert_eq!(summary.close_reason, Some(CloseReason::PeerClosed));
    assert_eq!(recorder.closes(), 1);
}
