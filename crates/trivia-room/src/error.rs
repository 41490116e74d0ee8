//! Error types for the room layer.

use trivia_protocol::PlayerName;

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// Another player already registered under this name.
    #[error("player {0} already exists")]
    AlreadyExists(PlayerName),

    /// No player with this name is registered (never joined, or
    /// already removed).
    #[error("player {0} not found")]
    NotFound(PlayerName),

    /// The game is over; the room no longer accepts players.
    #[error("the game is over")]
    GameOver,

    /// The room actor has stopped or its event queue is closed.
    #[error("room is unavailable")]
    Unavailable,
}
