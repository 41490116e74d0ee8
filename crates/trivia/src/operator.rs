//! Operator terminal: the person running the server decides when the
//! game starts.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use trivia_protocol::parse_answer;
use trivia_room::RoomHandle;

use crate::TriviaError;

/// Reads `Y`/`N` lines from `input` until it closes.
///
/// `Y` asks the room to start (the room ignores it while there are too
/// few players or a game already ran). `N` is acknowledged and ignored.
///
/// # Errors
/// Returns [`TriviaError::Io`] if reading fails, or
/// [`TriviaError::Room`] if the room has stopped.
pub async fn run_operator<R>(room: RoomHandle, input: R) -> Result<(), TriviaError>
where
    R: AsyncBufRead + Unpin,
{
    tracing::info!("waiting for players, press Y to start the game");
    let mut lines = input.lines();

    while let Some(line) = lines.next_line().await? {
        match parse_answer(&line) {
            Some(true) => {
                tracing::info!(
                    players = room.registry().count(),
                    state = %room.state(),
                    "operator requested start"
                );
                room.request_start().await?;
            }
            Some(false) => tracing::info!("operator declined to start"),
            None => tracing::warn!(input = %line.trim(), "operator input accepts only Y / N"),
        }
    }

    tracing::debug!("operator input closed");
    Ok(())
}
