//! Server configuration file.
//!
//! ```json
//! {
//!   "bind": "0.0.0.0:50051",
//!   "room": { "min_players": 3, "round_timeout_secs": 15 },
//!   "quiz": { "questions": [{ "text": "2 + 2 = 4", "answer": true }] },
//!   "shuffle": true
//! }
//! ```
//!
//! Every key is optional. Command-line flags override what the file
//! says.

use std::path::Path;

use serde::{Deserialize, Serialize};
use trivia_room::{Quiz, RoomConfig};

use crate::server::DEFAULT_BIND_ADDR;
use crate::TriviaError;

/// Everything needed to start a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub bind: String,
    pub room: RoomConfig,
    pub quiz: Quiz,
    /// Randomize question order at startup.
    pub shuffle: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND_ADDR.to_string(),
            room: RoomConfig::default(),
            quiz: Quiz::default(),
            shuffle: false,
        }
    }
}

impl ServerConfig {
    /// Reads and validates a JSON config file.
    ///
    /// # Errors
    /// Returns [`TriviaError::Config`] if the file cannot be read, is
    /// not valid JSON, or fails [`validate`](Self::validate).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TriviaError> {
        let path = path.as_ref();
        let config_error = |reason: String| TriviaError::Config {
            path: path.display().to_string(),
            reason,
        };

        let raw = std::fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| config_error(e.to_string()))?;
        config.validate().map_err(config_error)?;
        Ok(config)
    }

    /// Checks values the room cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.quiz.is_empty() {
            return Err("quiz has no questions".into());
        }
        if self.room.min_players == 0 {
            return Err("room.min_players must be at least 1".into());
        }
        if self.room.round_timeout_secs == 0 {
            return Err("room.round_timeout_secs must be at least 1".into());
        }
        Ok(())
    }

    /// The quiz to play, shuffled if configured.
    pub fn quiz(&self) -> Quiz {
        if self.shuffle {
            self.quiz.clone().shuffled()
        } else {
            self.quiz.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("trivia-{}-{name}.json", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind, "127.0.0.1:50051");
        assert_eq!(config.room, RoomConfig::default());
        assert_eq!(config.quiz.len(), 3);
        assert!(!config.shuffle);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial_overrides() {
        let path = write_temp(
            "partial",
            r#"{ "bind": "0.0.0.0:9000", "room": { "min_players": 3 } }"#,
        );
        let config = ServerConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.bind, "0.0.0.0:9000");
        assert_eq!(config.room.min_players, 3);
        assert_eq!(config.room.round_timeout_secs, 10);
        assert_eq!(config.quiz, Quiz::default());
    }

    #[test]
    fn test_from_file_custom_questions() {
        let path = write_temp(
            "questions",
            r#"{ "quiz": { "questions": [{ "text": "2 + 2 = 5", "answer": false }] } }"#,
        );
        let config = ServerConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.quiz().len(), 1);
        assert!(!config.quiz().questions[0].answer);
    }

    #[test]
    fn test_from_file_missing_is_config_error() {
        let result = ServerConfig::from_file("/definitely/not/here.json");
        assert!(matches!(result, Err(TriviaError::Config { .. })));
    }

    #[test]
    fn test_from_file_bad_json_is_config_error() {
        let path = write_temp("bad", "{ not json");
        let result = ServerConfig::from_file(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(TriviaError::Config { .. })));
    }

    #[test]
    fn test_empty_quiz_is_rejected() {
        let path = write_temp("empty", r#"{ "quiz": { "questions": [] } }"#);
        let result = ServerConfig::from_file(&path);
        std::fs::remove_file(&path).ok();

        match result {
            Err(TriviaError::Config { reason, .. }) => assert_eq!(reason, "quiz has no questions"),
            other => panic!("expected a config error, got {other:?}"),
        }
    }
}
