//! Protocol types: player identity, room notifications, and wire frames.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// PlayerName
// ---------------------------------------------------------------------------

/// The unique identity of a player inside the room.
///
/// Players pick their own name at registration, so the name *is* the
/// key: the registry, the round engine, and the session all index by it.
/// Construction trims surrounding whitespace and rejects empty or
/// overlong names, and deserialization goes through the same check
/// (`try_from = "String"`), so a `PlayerName` in hand is always valid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlayerName(String);

impl PlayerName {
    /// Longest accepted name, in characters.
    pub const MAX_LEN: usize = 32;

    /// Validates and wraps a player name.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] if the trimmed name is
    /// empty, longer than [`Self::MAX_LEN`], or contains control
    /// characters.
    pub fn new(name: impl AsRef<str>) -> Result<Self, ProtocolError> {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return Err(ProtocolError::InvalidMessage(
                "player name must not be empty".into(),
            ));
        }
        if name.chars().count() > Self::MAX_LEN {
            return Err(ProtocolError::InvalidMessage(format!(
                "player name must be at most {} characters",
                Self::MAX_LEN
            )));
        }
        if name.chars().any(char::is_control) {
            return Err(ProtocolError::InvalidMessage(
                "player name must not contain control characters".into(),
            ));
        }
        Ok(Self(name.to_owned()))
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PlayerName {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PlayerName> for String {
    fn from(name: PlayerName) -> Self {
        name.0
    }
}

impl fmt::Display for PlayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Notification: what the room pushes to a player
// ---------------------------------------------------------------------------

/// A server-to-player notification, as queued on a player's outbound
/// channel by the room.
///
/// The session task turns each one into a [`ServerMessage`] frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Free-form text: join counts, round questions, chat, results.
    Announcement(String),

    /// The room is going away. Always the last notification a player
    /// receives.
    Shutdown,
}

impl Notification {
    /// Shorthand for an announcement.
    pub fn announcement(text: impl Into<String>) -> Self {
        Self::Announcement(text.into())
    }

    /// Converts this notification into the wire frame sent to the
    /// client, stamped with `timestamp` (Unix milliseconds).
    pub fn into_frame(self, timestamp: u64) -> ServerMessage {
        match self {
            Self::Announcement(text) => {
                ServerMessage::Announcement { text, timestamp }
            }
            Self::Shutdown => ServerMessage::Shutdown,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire frames
// ---------------------------------------------------------------------------

/// Frames sent by a client.
///
/// A connection first registers (`Register`), then opens its session
/// (`Join`) under the same name. Both may travel on one connection, or
/// registration may happen on a short-lived connection of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Claim a player name in the room.
    Register { player_name: PlayerName },

    /// Attach this connection to an already-registered player and start
    /// receiving notifications.
    Join { player_name: PlayerName },

    /// A line of text typed by the player: chat before the game, an
    /// answer (`Y`/`N`) during it.
    Say { text: String },

    /// Polite goodbye. Closing the socket has the same effect.
    Leave,
}

/// Machine-readable reason carried by [`ServerMessage::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The player name is already taken.
    AlreadyExists,
    /// The session refers to a player that never registered.
    Unauthenticated,
    /// The player was registered but is gone (or already attached).
    NotFound,
    /// The frame could not be understood.
    InvalidInput,
    /// The room is finished or shutting down.
    Unavailable,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AlreadyExists => "already_exists",
            Self::Unauthenticated => "unauthenticated",
            Self::NotFound => "not_found",
            Self::InvalidInput => "invalid_input",
            Self::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Reply to `Register`.
    Welcome { message: String },

    /// Reply to `Join`: the session is live.
    Joined { player_name: PlayerName },

    /// A room announcement. `timestamp` is Unix milliseconds.
    Announcement { text: String, timestamp: u64 },

    /// The server is shutting down; the connection closes next.
    Shutdown,

    /// A request failed.
    Error { code: ErrorCode, message: String },
}

impl ServerMessage {
    /// Builds an error frame.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parses a quiz answer: `y` is true, `n` is false, case-insensitive,
/// surrounding whitespace ignored. Anything else is `None`.
pub fn parse_answer(text: &str) -> Option<bool> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("y") {
        Some(true)
    } else if text.eq_ignore_ascii_case("n") {
        Some(false)
    } else {
        None
    }
}

/// Milliseconds since the Unix epoch, saturating to 0 if the clock is
/// set before 1970.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // PlayerName
    // =====================================================================

    #[test]
    fn test_player_name_trims_whitespace() {
        let name = PlayerName::new("  alice \t").unwrap();
        assert_eq!(name.as_str(), "alice");
        assert_eq!(name.to_string(), "alice");
    }

    #[test]
    fn test_player_name_rejects_empty() {
        assert!(matches!(
            PlayerName::new("   "),
            Err(ProtocolError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_player_name_rejects_overlong() {
        let long = "x".repeat(PlayerName::MAX_LEN + 1);
        assert!(PlayerName::new(&long).is_err());
        let exact = "x".repeat(PlayerName::MAX_LEN);
        assert!(PlayerName::new(&exact).is_ok());
    }

    #[test]
    fn test_player_name_rejects_control_characters() {
        assert!(PlayerName::new("ali\u{7}ce").is_err());
    }

    #[test]
    fn test_player_name_serializes_as_plain_string() {
        let json = serde_json::to_string(&PlayerName::new("bob").unwrap())
            .unwrap();
        assert_eq!(json, "\"bob\"");
    }

    #[test]
    fn test_player_name_deserialize_validates() {
        let result: Result<PlayerName, _> = serde_json::from_str("\"  \"");
        assert!(result.is_err(), "empty names must not decode");
    }

    // =====================================================================
    // parse_answer
    // =====================================================================

    #[test]
    fn test_parse_answer_is_case_insensitive() {
        assert_eq!(parse_answer("Y"), Some(true));
        assert_eq!(parse_answer("y"), Some(true));
        assert_eq!(parse_answer("N"), Some(false));
        assert_eq!(parse_answer(" n\n"), Some(false));
    }

    #[test]
    fn test_parse_answer_rejects_other_text() {
        assert_eq!(parse_answer("yes"), None);
        assert_eq!(parse_answer(""), None);
        assert_eq!(parse_answer("maybe"), None);
    }

    // =====================================================================
    // Frames
    // =====================================================================

    #[test]
    fn test_client_register_json_format() {
        let msg = ClientMessage::Register {
            player_name: PlayerName::new("alice").unwrap(),
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "Register");
        assert_eq!(json["player_name"], "alice");
    }

    #[test]
    fn test_client_say_decodes_from_json() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"Say","text":"Y"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Say { text: "Y".into() });
    }

    #[test]
    fn test_client_leave_decodes_without_fields() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"Leave"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Leave);
    }

    #[test]
    fn test_server_error_json_format() {
        let msg = ServerMessage::error(ErrorCode::AlreadyExists, "taken");
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "Error");
        assert_eq!(json["code"], "already_exists");
        assert_eq!(json["message"], "taken");
    }

    #[test]
    fn test_server_shutdown_json_format() {
        let json = serde_json::to_value(&ServerMessage::Shutdown).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "Shutdown" }));
    }

    #[test]
    fn test_unknown_frame_type_fails_to_decode() {
        let result: Result<ClientMessage, _> =
            serde_json::from_str(r#"{"type":"Cheat","score":99}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_error_code_display_matches_wire_name() {
        for code in [
            ErrorCode::AlreadyExists,
            ErrorCode::Unauthenticated,
            ErrorCode::NotFound,
            ErrorCode::InvalidInput,
            ErrorCode::Unavailable,
        ] {
            let wire = serde_json::to_value(code).unwrap();
            assert_eq!(wire, code.to_string());
        }
    }

    // =====================================================================
    // Notification
    // =====================================================================

    #[test]
    fn test_notification_into_frame() {
        let frame = Notification::announcement("round 1: 1 + 1 = 2")
            .into_frame(1234);
        assert_eq!(
            frame,
            ServerMessage::Announcement {
                text: "round 1: 1 + 1 = 2".into(),
                timestamp: 1234,
            }
        );
        assert_eq!(Notification::Shutdown.into_frame(0), ServerMessage::Shutdown);
    }
}
