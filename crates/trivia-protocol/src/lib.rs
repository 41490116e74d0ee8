//! Wire protocol for the trivia room.
//!
//! This crate defines what clients and the server say to each other:
//!
//! - **Identity** ([`PlayerName`]) shared by every layer.
//! - **Notifications** ([`Notification`]) that the room pushes onto a
//!   player's outbound channel.
//! - **Frames** ([`ClientMessage`], [`ServerMessage`]) that travel on
//!   the wire, and the [`Codec`] that turns them into bytes.
//!
//! ```text
//! Transport (bytes) → Protocol (frames) → Room (events)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    parse_answer, unix_millis, ClientMessage, ErrorCode, Notification,
    PlayerName, ServerMessage,
};
