//! Frame wire format
//!
//! Every frame travels as one header message followed by zero or more payload
//! fragments, each sent as its own binary transport message:
//!
//! ```text
//! 0        1        2                               10              14
//! +--------+--------+-------------------------------+---------------+
//! | stream | key    | pts (u64, big-endian)         | payload len   |
//! | type   | flag   |                               | (u32, BE)     |
//! +--------+--------+-------------------------------+---------------+
//! ```
//!
//! The payload length in the header always equals the number of payload bytes
//! carried by the fragments that follow it. A frame whose header went out but
//! whose fragments did not is unrecoverable for the peer, so a failed write
//! is never retried.

use crate::error::StreamError;
use crate::frame::{Frame, StreamType};
use crate::transport::{send_with_deadline, MessageSink, OutboundMessage};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::time::Duration;

/// Size of the fixed frame header in bytes
pub const FRAME_HEADER_LEN: usize = 14;

/// Default upper bound for a single payload fragment
pub const DEFAULT_MAX_FRAGMENT_SIZE: usize = 1400;

/// Default upper bound for a reassembled payload
pub const DEFAULT_MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Stream the frame belongs to
    pub stream_type: StreamType,
    /// Key frame flag
    pub is_key: bool,
    /// Presentation timestamp
    pub pts: u64,
    /// Exact payload length that follows the header
    pub payload_len: u32,
}

impl FrameHeader {
    /// Build the header describing `frame`
    pub fn for_frame(stream_type: StreamType, frame: &Frame) -> Result<Self, StreamError> {
        let pts = u64::try_from(frame.pts).map_err(|_| StreamError::InvalidData {
            reason: format!("negative pts {} cannot be encoded", frame.pts),
        })?;
        let payload_len = u32::try_from(frame.payload.len()).map_err(|_| StreamError::InvalidData {
            reason: format!("payload of {} bytes exceeds u32 length field", frame.payload.len()),
        })?;

        Ok(Self {
            stream_type,
            is_key: frame.is_key,
            pts,
            payload_len,
        })
    }

    /// Encode the header into its 14-byte wire form
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN);
        buf.put_u8(self.stream_type.as_byte());
        buf.put_u8(u8::from(self.is_key));
        buf.put_u64(self.pts);
        buf.put_u32(self.payload_len);
        buf.freeze()
    }

    /// Decode a header from the first 14 bytes of `buf`
    pub fn decode(mut buf: &[u8]) -> Result<Self, StreamError> {
        if buf.len() < FRAME_HEADER_LEN {
            return Err(StreamError::InvalidData {
                reason: format!(
                    "Insufficient data for frame header: need {} bytes, have {}",
                    FRAME_HEADER_LEN,
                    buf.len()
                ),
            });
        }

        let type_byte = buf.get_u8();
        let stream_type = StreamType::from_byte(type_byte).ok_or_else(|| StreamError::InvalidData {
            reason: format!("Unknown stream type: 0x{:02x}", type_byte),
        })?;
        let is_key = buf.get_u8() != 0;
        let pts = buf.get_u64();
        let payload_len = buf.get_u32();

        Ok(Self {
            stream_type,
            is_key,
            pts,
            payload_len,
        })
    }
}

/// Serializes frames into a header message plus bounded payload fragments
#[derive(Debug, Clone)]
pub struct FrameWireEncoder {
    max_fragment_size: usize,
    write_wait: Duration,
}

impl FrameWireEncoder {
    /// Create an encoder. A zero fragment size is treated as one byte.
    pub fn new(max_fragment_size: usize, write_wait: Duration) -> Self {
        Self {
            max_fragment_size: max_fragment_size.max(1),
            write_wait,
        }
    }

    /// Largest payload fragment this encoder emits
    pub fn max_fragment_size(&self) -> usize {
        self.max_fragment_size
    }

    /// Deadline applied to every message write
    pub fn write_wait(&self) -> Duration {
        self.write_wait
    }

    /// Split a payload into ordered fragments without copying it
    pub fn fragments<'a>(&self, payload: &'a Bytes) -> impl Iterator<Item = Bytes> + 'a {
        let max = self.max_fragment_size;
        let len = payload.len();
        (0..len)
            .step_by(max)
            .map(move |start| payload.slice(start..(start + max).min(len)))
    }

    /// Encode a frame into the exact sequence of messages `write_frame` sends
    pub fn encode(&self, stream_type: StreamType, frame: &Frame) -> Result<Vec<Bytes>, StreamError> {
        let header = FrameHeader::for_frame(stream_type, frame)?;
        let mut messages = Vec::with_capacity(1 + frame.payload.len() / self.max_fragment_size + 1);
        messages.push(header.encode());
        messages.extend(self.fragments(&frame.payload));
        Ok(messages)
    }

    /// Write one frame to `sink`, returning the number of bytes written.
    ///
    /// On error the frame must be treated as undelivered and the session
    /// terminated.
    pub async fn write_frame<S>(
        &self,
        sink: &mut S,
        stream_type: StreamType,
        frame: &Frame,
    ) -> Result<usize, StreamError>
    where
        S: MessageSink + ?Sized,
    {
        let header = FrameHeader::for_frame(stream_type, frame)?;

        send_with_deadline(sink, OutboundMessage::Binary(header.encode()), self.write_wait)
            .await
            .map_err(|e| write_context(e, "failed to send frame header"))?;

        for fragment in self.fragments(&frame.payload) {
            send_with_deadline(sink, OutboundMessage::Binary(fragment), self.write_wait)
                .await
                .map_err(|e| write_context(e, "failed to send data fragment"))?;
        }

        Ok(FRAME_HEADER_LEN + frame.payload.len())
    }
}

fn write_context(error: StreamError, context: &str) -> StreamError {
    match error {
        StreamError::TransportWrite { reason } => StreamError::TransportWrite {
            reason: format!("{}: {}", context, reason),
        },
        other => other,
    }
}

impl Default for FrameWireEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAGMENT_SIZE, Duration::from_secs(10))
    }
}

/// Receiver side of the wire format.
///
/// Outside a frame, the next message must be a complete 14-byte header.
/// Payload bytes are then collected across however many messages carry them,
/// up to exactly `payload_len`.
#[derive(Debug)]
pub struct FrameReassembler {
    buffer: BytesMut,
    header: Option<FrameHeader>,
    max_payload_len: usize,
}

impl FrameReassembler {
    /// Create a reassembler with the default payload limit
    pub fn new() -> Self {
        Self::with_max_payload_len(DEFAULT_MAX_PAYLOAD_LEN)
    }

    /// Create a reassembler rejecting payloads larger than `max_payload_len`
    pub fn with_max_payload_len(max_payload_len: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            header: None,
            max_payload_len,
        }
    }

    /// Whether a frame is partially received
    pub fn is_mid_frame(&self) -> bool {
        self.header.is_some()
    }

    /// Feed one received message, returning the frame it completed.
    ///
    /// A message that is not a header where one is expected, or a fragment
    /// that runs past the announced payload length, is rejected with
    /// `InvalidData`. A rejected fragment also discards the partial frame.
    pub fn push(&mut self, message: &[u8]) -> Result<Option<(StreamType, Frame)>, StreamError> {
        let Some(header) = self.header else {
            return self.start_frame(message);
        };

        let payload_len = header.payload_len as usize;
        if self.buffer.len() + message.len() > payload_len {
            let received = self.buffer.len();
            self.header = None;
            self.buffer.clear();
            return Err(StreamError::InvalidData {
                reason: format!(
                    "fragment of {} bytes overruns frame payload ({} of {} bytes received)",
                    message.len(),
                    received,
                    payload_len
                ),
            });
        }

        self.buffer.extend_from_slice(message);
        if self.buffer.len() < payload_len {
            return Ok(None);
        }

        self.header = None;
        let payload = self.buffer.split().freeze();
        Ok(Some(Self::complete(header, payload)))
    }

    fn start_frame(&mut self, message: &[u8]) -> Result<Option<(StreamType, Frame)>, StreamError> {
        if message.len() != FRAME_HEADER_LEN {
            return Err(StreamError::InvalidData {
                reason: format!(
                    "expected a {}-byte frame header, got a {}-byte message",
                    FRAME_HEADER_LEN,
                    message.len()
                ),
            });
        }

        let header = FrameHeader::decode(message)?;
        let payload_len = header.payload_len as usize;
        if payload_len > self.max_payload_len {
            return Err(StreamError::InvalidData {
                reason: format!(
                    "payload of {} bytes exceeds limit of {}",
                    payload_len, self.max_payload_len
                ),
            });
        }

        if payload_len == 0 {
            return Ok(Some(Self::complete(header, Bytes::new())));
        }

        self.buffer.reserve(payload_len);
        self.header = Some(header);
        Ok(None)
    }

    fn complete(header: FrameHeader, payload: Bytes) -> (StreamType, Frame) {
        (
            header.stream_type,
            Frame {
                pts: header.pts as i64,
                is_key: header.is_key,
                payload,
            },
        )
    }
}

impl Default for FrameReassembler {
    fn default() -> Self {
        Self::new()
    }
}
