//! Unified error type for the trivia server and client.

use trivia_protocol::{ErrorCode, ProtocolError};
use trivia_room::RoomError;
use trivia_transport::TransportError;

/// Top-level error that wraps every crate-specific error.
///
/// The `#[from]` variants let `?` convert sub-crate errors directly.
#[derive(Debug, thiserror::Error)]
pub enum TriviaError {
    /// A transport-level error (bind, connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A room-level error (duplicate name, game over, room gone).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// Reading the terminal failed.
    #[error("terminal i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// The config file could not be read or is invalid.
    #[error("config {path}: {reason}")]
    Config { path: String, reason: String },

    /// The server refused a request from this client.
    #[error("server rejected the request ({code}): {message}")]
    Rejected { code: ErrorCode, message: String },
}
