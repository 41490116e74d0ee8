//! Per-connection handler: registration, session attach, and routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. `Register` claims a player name (may repeat, may be the only frame)
//!   2. `Join` attaches the connection to a registered player's inbox
//!   3. Loop: a pump task pushes notifications while this task routes
//!      the player's `Say` lines into the room
//!   4. On exit the player is removed from the room

use std::sync::Arc;
use std::time::Duration;

use trivia_protocol::{
    unix_millis, ClientMessage, Codec, ErrorCode, Notification, PlayerName, ServerMessage,
};
use trivia_room::{PlayerInbox, RoomError, RoomHandle};
use trivia_transport::{Connection, WebSocketConnection};

use crate::TriviaError;

/// How long a connection may sit idle before it joins a session.
const ATTACH_TIMEOUT: Duration = Duration::from_secs(60);

/// Drop guard that removes every player this connection registered or
/// joined once the handler exits, including on error or panic. `Drop` is
/// synchronous, so the removal is a fire-and-forget task.
struct SessionGuard {
    names: Vec<PlayerName>,
    room: RoomHandle,
}

impl SessionGuard {
    fn new(room: RoomHandle) -> Self {
        Self {
            names: Vec::new(),
            room,
        }
    }

    fn track(&mut self, name: &PlayerName) {
        if !self.names.contains(name) {
            self.names.push(name.clone());
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.names.is_empty() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let names = std::mem::take(&mut self.names);
        let room = self.room.clone();
        runtime.spawn(async move {
            for name in names {
                if let Err(e) = room.remove_player(name.clone()).await {
                    tracing::debug!(player = %name, error = %e, "remove after connection end failed");
                }
            }
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C>(
    conn: WebSocketConnection,
    room: RoomHandle,
    codec: C,
) -> Result<(), TriviaError>
where
    C: Codec + Clone,
{
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    let mut guard = SessionGuard::new(room.clone());
    let Some((name, inbox)) = attach(&conn, &room, &codec, &mut guard).await? else {
        let _ = conn.close().await;
        return Ok(());
    };

    guard.track(&name);
    send_frame(
        &conn,
        &codec,
        &ServerMessage::Joined {
            player_name: name.clone(),
        },
    )
    .await?;
    tracing::info!(%conn_id, player = %name, "session started");

    let result = run_session(&conn, &room, &codec, &name, inbox).await;
    let _ = conn.close().await;
    tracing::info!(%conn_id, player = %name, "session ended");

    // guard drops here and removes the player
    result
}

/// Handles frames until the connection joins a session. Returns `None`
/// if the connection should simply close. Names registered along the way
/// go into `guard`.
async fn attach<C: Codec>(
    conn: &WebSocketConnection,
    room: &RoomHandle,
    codec: &C,
    guard: &mut SessionGuard,
) -> Result<Option<(PlayerName, PlayerInbox)>, TriviaError> {
    loop {
        let received = tokio::select! {
            received = tokio::time::timeout(ATTACH_TIMEOUT, conn.recv()) => received,
            () = room.stopped() => {
                tracing::debug!(conn_id = %conn.id(), "room stopped before join");
                return Ok(None);
            }
        };
        let data = match received {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => return Ok(None),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                tracing::debug!(conn_id = %conn.id(), "closing idle connection");
                return Ok(None);
            }
        };

        let msg: ClientMessage = match codec.decode(&data) {
            Ok(msg) => msg,
            Err(e) => {
                send_error(conn, codec, ErrorCode::InvalidInput, &format!("invalid frame: {e}")).await?;
                continue;
            }
        };

        match msg {
            ClientMessage::Register { player_name } => {
                register(conn, room, codec, player_name, guard).await?;
            }
            ClientMessage::Join { player_name } => {
                if !room.registry().contains(&player_name) {
                    send_error(conn, codec, ErrorCode::Unauthenticated, "player not found").await?;
                    return Ok(None);
                }
                return match room.claim_inbox(&player_name) {
                    Ok(inbox) => Ok(Some((player_name, inbox))),
                    Err(e) => {
                        tracing::debug!(player = %player_name, error = %e, "join rejected, inbox already claimed");
                        send_error(conn, codec, error_code(&e), &e.to_string()).await?;
                        Ok(None)
                    }
                };
            }
            ClientMessage::Say { .. } => {
                send_error(conn, codec, ErrorCode::Unauthenticated, "join the room first").await?;
            }
            ClientMessage::Leave => return Ok(None),
        }
    }
}

/// Registers a player and answers with `Welcome` or an error frame.
async fn register<C: Codec>(
    conn: &WebSocketConnection,
    room: &RoomHandle,
    codec: &C,
    player_name: PlayerName,
    guard: &mut SessionGuard,
) -> Result<(), TriviaError> {
    match room.register(player_name.clone()).await {
        Ok(message) => {
            guard.track(&player_name);
            tracing::info!(player = %player_name, "player registered");
            send_frame(conn, codec, &ServerMessage::Welcome { message }).await
        }
        Err(e) => {
            tracing::debug!(player = %player_name, error = %e, "registration rejected");
            send_error(conn, codec, error_code(&e), &e.to_string()).await?;
            match e {
                RoomError::Unavailable => Err(e.into()),
                _ => Ok(()),
            }
        }
    }
}

/// Runs an attached session until the player leaves, the connection
/// drops, or the room shuts down.
async fn run_session<C>(
    conn: &Arc<WebSocketConnection>,
    room: &RoomHandle,
    codec: &C,
    name: &PlayerName,
    inbox: PlayerInbox,
) -> Result<(), TriviaError>
where
    C: Codec + Clone,
{
    let mut pump = tokio::spawn(pump_notifications(
        Arc::clone(conn),
        inbox,
        codec.clone(),
        name.clone(),
    ));

    let result = loop {
        tokio::select! {
            _ = &mut pump => {
                tracing::debug!(player = %name, "notification stream ended");
                break Ok(());
            }
            received = conn.recv() => {
                let data = match received {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        tracing::debug!(player = %name, "connection closed cleanly");
                        break Ok(());
                    }
                    Err(e) => break Err(e.into()),
                };
                match handle_frame(conn, room, codec, name, &data).await {
                    Ok(true) => {}
                    Ok(false) => break Ok(()),
                    Err(e) => break Err(e),
                }
            }
        }
    };

    if !pump.is_finished() {
        pump.abort();
    }
    result
}

/// Handles one frame from an attached player. Returns `false` if the
/// session should end.
async fn handle_frame<C: Codec>(
    conn: &WebSocketConnection,
    room: &RoomHandle,
    codec: &C,
    name: &PlayerName,
    data: &[u8],
) -> Result<bool, TriviaError> {
    match codec.decode::<ClientMessage>(data) {
        Ok(ClientMessage::Say { text }) => {
            room.say(name.clone(), &text).await?;
        }
        Ok(ClientMessage::Leave) => {
            tracing::debug!(player = %name, "player said goodbye");
            return Ok(false);
        }
        Ok(ClientMessage::Register { .. } | ClientMessage::Join { .. }) => {
            send_error(conn, codec, ErrorCode::InvalidInput, "session already joined").await?;
        }
        Err(e) => {
            tracing::debug!(player = %name, error = %e, "failed to decode frame");
            send_error(conn, codec, ErrorCode::InvalidInput, &format!("invalid frame: {e}")).await?;
        }
    }
    Ok(true)
}

/// Drains the player's inbox onto the connection. Stops after sending
/// `Shutdown`, when the inbox closes, or when a send fails.
async fn pump_notifications<C: Codec>(
    conn: Arc<WebSocketConnection>,
    mut inbox: PlayerInbox,
    codec: C,
    name: PlayerName,
) {
    while let Some(notification) = inbox.recv().await {
        let last = notification == Notification::Shutdown;
        let frame = notification.into_frame(unix_millis());
        if let Err(e) = send_frame(&conn, &codec, &frame).await {
            tracing::debug!(player = %name, error = %e, "failed to push notification");
            return;
        }
        if last {
            tracing::debug!(player = %name, "shutdown delivered");
            return;
        }
    }
}

fn error_code(e: &RoomError) -> ErrorCode {
    match e {
        RoomError::AlreadyExists(_) => ErrorCode::AlreadyExists,
        RoomError::NotFound(_) => ErrorCode::NotFound,
        RoomError::GameOver | RoomError::Unavailable => ErrorCode::Unavailable,
    }
}

async fn send_frame(
    conn: &WebSocketConnection,
    codec: &impl Codec,
    frame: &ServerMessage,
) -> Result<(), TriviaError> {
    let bytes = codec.encode(frame)?;
    conn.send(&bytes).await?;
    Ok(())
}

/// Sends a `ServerMessage::Error` frame to the client.
async fn send_error(
    conn: &WebSocketConnection,
    codec: &impl Codec,
    code: ErrorCode,
    message: &str,
) -> Result<(), TriviaError> {
    send_frame(conn, codec, &ServerMessage::error(code, message)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use trivia_room::{Quiz, RoomConfig};

    #[tokio::test]
    async fn test_guard_removes_every_tracked_player() {
        let room = trivia_room::spawn_room(RoomConfig::default(), Quiz::default());
        for n in ["alice", "bob", "carol"] {
            room.register(PlayerName::new(n).unwrap()).await.unwrap();
        }

        let mut guard = SessionGuard::new(room.clone());
        guard.track(&PlayerName::new("alice").unwrap());
        guard.track(&PlayerName::new("alice").unwrap());
        guard.track(&PlayerName::new("bob").unwrap());
        assert_eq!(guard.names.len(), 2);
        drop(guard);

        tokio::time::timeout(Duration::from_secs(5), async {
            while room.registry().count() != 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("tracked players should be removed");
        assert_eq!(room.registry().names(), vec![PlayerName::new("carol").unwrap()]);
        room.shutdown().await;
    }

    #[test]
    fn test_error_code_mapping() {
        let name = PlayerName::new("alice").unwrap();
        assert_eq!(error_code(&RoomError::AlreadyExists(name.clone())), ErrorCode::AlreadyExists);
        assert_eq!(error_code(&RoomError::NotFound(name)), ErrorCode::NotFound);
        assert_eq!(error_code(&RoomError::GameOver), ErrorCode::Unavailable);
        assert_eq!(error_code(&RoomError::Unavailable), ErrorCode::Unavailable);
    }
}
