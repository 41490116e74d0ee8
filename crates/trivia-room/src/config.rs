//! Room configuration, lifecycle state, and the question set.

use std::fmt;
use std::time::Duration;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Configuration for the room actor.
///
/// Every field has a default, so a config file only needs to name the
/// values it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Minimum registered players before the operator may start.
    pub min_players: usize,

    /// How long a round waits for answers before moving on.
    pub round_timeout_secs: u64,

    /// Capacity of each player's outbound notification channel.
    pub outbox_capacity: usize,

    /// Capacity of the room's inbound event queue.
    pub queue_capacity: usize,
}

impl RoomConfig {
    /// The per-round timeout as a [`Duration`].
    pub fn round_timeout(&self) -> Duration {
        Duration::from_secs(self.round_timeout_secs)
    }
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            min_players: 2,
            round_timeout_secs: 10,
            outbox_capacity: 100,
            queue_capacity: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// RoomState
// ---------------------------------------------------------------------------

/// The lifecycle state of the room.
///
/// Transitions only move forward:
///
/// ```text
/// Waiting → OnProgress → Done
/// ```
///
/// - **Waiting**: players register and chat; the operator may start.
/// - **OnProgress**: rounds are running; `Y`/`N` lines are answers.
/// - **Done**: the last round closed. Scores are frozen and new
///   registrations are refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomState {
    Waiting,
    OnProgress,
    Done,
}

impl RoomState {
    /// The state that follows this one, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Waiting => Some(Self::OnProgress),
            Self::OnProgress => Some(Self::Done),
            Self::Done => None,
        }
    }

    /// Returns `true` if transitioning to `target` is valid.
    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == Some(target)
    }

    /// Returns `true` while new players may register.
    pub fn is_joinable(self) -> bool {
        !matches!(self, Self::Done)
    }
}

impl fmt::Display for RoomState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "Waiting"),
            Self::OnProgress => write!(f, "OnProgress"),
            Self::Done => write!(f, "Done"),
        }
    }
}

// ---------------------------------------------------------------------------
// Quiz
// ---------------------------------------------------------------------------

/// A yes/no question and its expected answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    pub answer: bool,
}

impl Question {
    pub fn new(text: impl Into<String>, answer: bool) -> Self {
        Self {
            text: text.into(),
            answer,
        }
    }
}

/// The ordered question sequence for one game.
///
/// Fixed when the room is created; the round engine walks it front to
/// back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quiz {
    pub questions: Vec<Question>,
}

impl Quiz {
    pub fn new(questions: Vec<Question>) -> Self {
        Self { questions }
    }

    /// Shuffles the question order in place.
    pub fn shuffle(&mut self) {
        self.questions.shuffle(&mut rand::rng());
    }

    /// Returns the quiz with its questions in random order.
    pub fn shuffled(mut self) -> Self {
        self.shuffle();
        self
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

impl Default for Quiz {
    fn default() -> Self {
        Self::new(vec![
            Question::new("1 + 1 = 2", true),
            Question::new("1 - 1 = -1", false),
            Question::new("1 * 0 = 0", true),
        ])
    }
}
