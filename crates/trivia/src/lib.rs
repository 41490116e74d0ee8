//! # Trivia
//!
//! A single-room yes/no quiz played over WebSockets.
//!
//! The server accepts player connections, an operator starts the game
//! from the terminal, and every player gets the same questions at the
//! same time. Scores are kept by the room; the fastest path through a
//! round is everyone answering, the slowest is the round timeout.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use trivia::prelude::*;
//!
//! # async fn run() -> Result<(), TriviaError> {
//! let server = TriviaServer::builder()
//!     .bind("127.0.0.1:50051")
//!     .build()
//!     .await?;
//! let room = server.room().clone();
//! tokio::spawn(run_operator(room, tokio::io::BufReader::new(tokio::io::stdin())));
//! server.run(async { let _ = tokio::signal::ctrl_c().await; }).await
//! # }
//! ```

mod client;
mod config;
mod error;
mod handler;
mod operator;
mod server;

pub use client::run_client;
pub use config::ServerConfig;
pub use error::TriviaError;
pub use operator::run_operator;
pub use server::{TriviaServer, TriviaServerBuilder, DEFAULT_BIND_ADDR};

pub mod prelude {
    //! Re-exports for typical usage.

    pub use crate::{
        run_client, run_operator, ServerConfig, TriviaError, TriviaServer,
        TriviaServerBuilder, DEFAULT_BIND_ADDR,
    };
    pub use trivia_protocol::{
        ClientMessage, ErrorCode, Notification, PlayerName, ServerMessage,
    };
    pub use trivia_room::{
        Question, Quiz, RoomConfig, RoomError, RoomHandle, RoomState,
    };
}
