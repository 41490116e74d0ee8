//! Terminal player client.
//!
//! Registers, joins, then relays lines from `input` as `Say` frames while
//! writing every announcement to `output`.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use trivia_protocol::{ClientMessage, Codec, JsonCodec, PlayerName, ServerMessage};
use trivia_transport::{Connection, TransportError, WebSocketConnection};

use crate::TriviaError;

/// Plays as `name` on the server at `url` until the server shuts down.
///
/// # Errors
/// Returns [`TriviaError::Rejected`] if the server refuses the name,
/// [`TriviaError::Transport`] if the connection fails or the server
/// hangs up without saying goodbye.
pub async fn run_client<R, W>(
    url: &str,
    name: PlayerName,
    input: R,
    mut output: W,
) -> Result<(), TriviaError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let codec = JsonCodec;
    let conn = WebSocketConnection::connect(url).await?;

    send(&conn, &codec, &ClientMessage::Register { player_name: name.clone() }).await?;
    match expect_reply(&conn, &codec).await? {
        ServerMessage::Welcome { message } => write_line(&mut output, &message).await?,
        other => return Err(unexpected(other)),
    }

    send(&conn, &codec, &ClientMessage::Join { player_name: name.clone() }).await?;
    match expect_reply(&conn, &codec).await? {
        ServerMessage::Joined { .. } => tracing::debug!(player = %name, "joined the room"),
        other => return Err(unexpected(other)),
    }

    let mut lines = input.lines();
    let mut input_open = true;

    loop {
        tokio::select! {
            received = conn.recv() => {
                let Some(data) = received? else {
                    return Err(TransportError::ConnectionClosed("server hung up".into()).into());
                };
                match codec.decode::<ServerMessage>(&data)? {
                    ServerMessage::Announcement { text, .. } => write_line(&mut output, &text).await?,
                    ServerMessage::Shutdown => {
                        write_line(&mut output, "server shutting down").await?;
                        let _ = conn.close().await;
                        return Ok(());
                    }
                    ServerMessage::Error { code, message } => {
                        tracing::warn!(%code, %message, "server reported an error");
                    }
                    other => tracing::debug!(frame = ?other, "ignoring unexpected frame"),
                }
            }
            line = lines.next_line(), if input_open => match line? {
                Some(text) => send(&conn, &codec, &ClientMessage::Say { text }).await?,
                None => {
                    tracing::debug!("input closed, still listening");
                    input_open = false;
                }
            },
        }
    }
}

async fn send(conn: &WebSocketConnection, codec: &impl Codec, msg: &ClientMessage) -> Result<(), TriviaError> {
    let bytes = codec.encode(msg)?;
    conn.send(&bytes).await?;
    Ok(())
}

/// Waits for the server's answer to a request. Error frames become
/// [`TriviaError::Rejected`].
async fn expect_reply(conn: &WebSocketConnection, codec: &impl Codec) -> Result<ServerMessage, TriviaError> {
    let Some(data) = conn.recv().await? else {
        return Err(TransportError::ConnectionClosed("server hung up during registration".into()).into());
    };
    match codec.decode::<ServerMessage>(&data)? {
        ServerMessage::Error { code, message } => Err(TriviaError::Rejected { code, message }),
        reply => Ok(reply),
    }
}

fn unexpected(frame: ServerMessage) -> TriviaError {
    trivia_protocol::ProtocolError::InvalidMessage(format!("unexpected reply: {frame:?}")).into()
}

async fn write_line(output: &mut (impl AsyncWrite + Unpin), text: &str) -> Result<(), TriviaError> {
    output.write_all(text.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(())
}
