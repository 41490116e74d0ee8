//! Room coordination for the trivia quiz.
//!
//! A single room runs as one Tokio task (actor model). It is the only
//! writer of membership and game state; everything else talks to it
//! through a [`RoomHandle`].
//!
//! # Key types
//!
//! - [`RoomHandle`]: send events to the running room actor
//! - [`PlayerRegistry`]: player name → outbound channel
//! - [`RoundEngine`]: question sequence, scoring, round timer
//! - [`Broadcaster`]: best-effort fan-out over the registry
//! - [`RoomConfig`], [`Quiz`]: room settings and questions

mod broadcast;
mod config;
mod engine;
mod error;
mod registry;
mod room;

pub use broadcast::Broadcaster;
pub use config::{Question, Quiz, RoomConfig, RoomState};
pub use engine::{AnswerOutcome, EnginePhase, RoundEngine, RoundNotice, Standing};
pub use error::RoomError;
pub use registry::{PlayerInbox, PlayerRegistry, PlayerSender};
pub use room::{spawn_room, RoomHandle};
