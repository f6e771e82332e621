//! # wsmedia core
//!
//! Frame model, wire format and transport seam shared by the wsmedia crates.
//! Media parsing lives in `wsmedia-media`; connection handling lives in
//! `wsmedia-server`.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod frame;
pub mod transport;
pub mod wire_format;

// Re-export main types
pub use error::StreamError;
pub use frame::{Frame, StreamType};
pub use transport::{
    send_with_deadline, split_websocket, InboundMessage, MessageSink, MessageStream,
    OutboundMessage, WebSocketReader, WebSocketSink,
};
pub use wire_format::{
    FrameHeader, FrameReassembler, FrameWireEncoder, DEFAULT_MAX_FRAGMENT_SIZE, FRAME_HEADER_LEN,
};
