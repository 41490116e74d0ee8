//! `TriviaServer` builder and accept loop.
//!
//! Ties the layers together: WebSocket transport → JSON frames →
//! per-connection session → room actor.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::task::JoinSet;
use trivia_protocol::JsonCodec;
use trivia_room::{spawn_room, Quiz, RoomConfig, RoomHandle};
use trivia_transport::{Transport, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{ServerConfig, TriviaError};

/// Where the server listens unless told otherwise.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:50051";

/// How long sessions get to flush their last frames after the room
/// shuts down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Builder for configuring and starting a trivia server.
///
/// # Example
///
/// ```rust,ignore
/// let server = TriviaServer::builder()
///     .bind("0.0.0.0:50051")
///     .room_config(RoomConfig { min_players: 3, ..RoomConfig::default() })
///     .build()
///     .await?;
/// server.run(shutdown_signal).await
/// ```
#[derive(Debug, Clone)]
pub struct TriviaServerBuilder {
    bind_addr: String,
    room: RoomConfig,
    quiz: Quiz,
}

impl TriviaServerBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            room: RoomConfig::default(),
            quiz: Quiz::default(),
        }
    }

    /// Creates a builder from a loaded config, shuffling the quiz if the
    /// config asks for it.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            bind_addr: config.bind.clone(),
            room: config.room.clone(),
            quiz: config.quiz(),
        }
    }

    /// Sets the address to bind to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.room = config;
        self
    }

    pub fn quiz(mut self, quiz: Quiz) -> Self {
        self.quiz = quiz;
        self
    }

    /// Binds the listener and spawns the room actor.
    ///
    /// # Errors
    /// Returns [`TriviaError::Transport`] if the address cannot be bound.
    pub async fn build(self) -> Result<TriviaServer, TriviaError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let room = spawn_room(self.room, self.quiz);
        Ok(TriviaServer { transport, room })
    }
}

impl Default for TriviaServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound trivia server.
///
/// Call [`run()`](Self::run) to start accepting players.
pub struct TriviaServer {
    transport: WebSocketTransport,
    room: RoomHandle,
}

impl TriviaServer {
    pub fn builder() -> TriviaServerBuilder {
        TriviaServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// The room this server feeds. Hand a clone to the operator
    /// terminal.
    pub fn room(&self) -> &RoomHandle {
        &self.room
    }

    /// Runs the accept loop until `shutdown` resolves or the game is
    /// done, then shuts the room down and gives open sessions a moment
    /// to deliver the final frames.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<(), TriviaError> {
        tracing::info!(addr = ?self.local_addr().ok(), "trivia server running");
        tokio::pin!(shutdown);
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                () = self.room.wait_until_done() => {
                    tracing::info!("game is done");
                    break;
                }
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let room = self.room.clone();
                        sessions.spawn(async move {
                            if let Err(e) = handle_connection(conn, room, JsonCodec).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                },
            }
        }

        tracing::info!("shutting down the server");
        self.room.shutdown().await;

        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while sessions.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::debug!(remaining = sessions.len(), "aborting lingering sessions");
            sessions.abort_all();
        }
        Ok(())
    }
}
