//! # wsmedia server
//!
//! WebSocket accept layer and per-connection streaming sessions. Each accepted
//! client gets its own [`ConnectionSession`] with fresh frame sources; sessions
//! share no state with each other.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod server;
pub mod session;

// Re-export main types
pub use config::{ServerConfig, SessionConfig};
pub use server::{SessionInfo, StreamServer};
pub use session::{CloseReason, ConnectionSession, SessionControl, SessionState, SessionSummary};
