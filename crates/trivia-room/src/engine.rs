//! The quiz round engine.
//!
//! A [`RoundEngine`] owns the question sequence, the participants'
//! scores and who answered the current round. Timing lives in a separate
//! driver task spawned by [`RoundEngine::start`]: for each question it
//! tells the engine to enter the round, then waits until either every
//! participant answered or the round timeout elapsed.
//!
//! The engine sits inside the room actor's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(event) = events.recv() => { /* may call submit_answer */ }
//!         Some(notice) = engine.next_notice() => { /* broadcast it */ }
//!     }
//! }
//! ```
//!
//! While the engine is idle or finished, [`RoundEngine::next_notice`]
//! pends forever, so the branch simply never fires.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};
use trivia_protocol::PlayerName;

use crate::{Question, Quiz};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Lifecycle of the engine. `Finished` is terminal; an engine runs one
/// game only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Idle,
    Running,
    Finished,
}

/// What the engine reports to the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundNotice {
    /// A round opened. `number` counts from 1.
    Round {
        number: usize,
        total: usize,
        text: String,
    },

    /// The last round closed.
    Finished { standings: Vec<Standing> },
}

/// One line of the final scoreboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    pub player: PlayerName,
    pub score: u32,
}

impl fmt::Display for Standing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.player, self.score)
    }
}

/// Result of [`RoundEngine::submit_answer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// First answer this round, and right. Scored +1.
    Correct,
    /// First answer this round, and wrong.
    Incorrect,
    /// The player already answered this round; nothing changed.
    AlreadyAnswered,
    /// No round is open, or the player is not a participant.
    Ignored,
}

// ---------------------------------------------------------------------------
// RoundLatch
// ---------------------------------------------------------------------------

/// Completion latch shared by the engine and its driver.
///
/// The watched value is the number of rounds that have completed. The
/// engine releases round `r` by moving the count past `r`; the driver
/// waits for the count to exceed the round it is timing. Releasing a
/// round that is already complete (or one that timed out) does nothing,
/// so each round is released at most once and the same latch serves
/// every round.
#[derive(Debug)]
struct RoundLatch {
    completed: watch::Sender<usize>,
}

impl RoundLatch {
    fn new() -> Self {
        let (completed, _) = watch::channel(0);
        Self { completed }
    }

    fn subscribe(&self) -> watch::Receiver<usize> {
        self.completed.subscribe()
    }

    /// Marks `round` (0-based) complete. Returns `false` if it already
    /// was.
    fn release(&self, round: usize) -> bool {
        self.completed.send_if_modified(|done| {
            if *done <= round {
                *done = round + 1;
                true
            } else {
                false
            }
        })
    }

    fn completed(&self) -> usize {
        *self.completed.borrow()
    }
}

/// Messages from the driver task to the engine.
#[derive(Debug)]
enum DriverSignal {
    Enter(usize),
    Complete,
}

// ---------------------------------------------------------------------------
// RoundEngine
// ---------------------------------------------------------------------------

/// Quiz state machine: `Idle → Running → Finished`.
pub struct RoundEngine {
    questions: Vec<Question>,
    round_timeout: Duration,
    phase: EnginePhase,
    /// 0-based index of the open round.
    current: Option<usize>,
    scores: HashMap<PlayerName, u32>,
    responders: HashSet<PlayerName>,
    latch: RoundLatch,
    signals: Option<mpsc::UnboundedReceiver<DriverSignal>>,
    driver: Option<JoinHandle<()>>,
}

impl RoundEngine {
    pub fn new(quiz: Quiz, round_timeout: Duration) -> Self {
        Self {
            questions: quiz.questions,
            round_timeout,
            phase: EnginePhase::Idle,
            current: None,
            scores: HashMap::new(),
            responders: HashSet::new(),
            latch: RoundLatch::new(),
            signals: None,
            driver: None,
        }
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    /// The open round, counting from 1.
    pub fn round(&self) -> Option<usize> {
        self.current.map(|index| index + 1)
    }

    pub fn total_rounds(&self) -> usize {
        self.questions.len()
    }

    /// Adds a participant with a zero score. Re-adding keeps the score.
    pub fn add_player(&mut self, name: PlayerName) {
        self.scores.entry(name).or_insert(0);
    }

    /// Removes a participant. If everyone left in the round has now
    /// answered, the round closes.
    pub fn remove_player(&mut self, name: &PlayerName) -> bool {
        let removed = self.scores.remove(name).is_some();
        self.responders.remove(name);
        if removed {
            self.check_all_answered();
        }
        removed
    }

    pub fn score(&self, name: &PlayerName) -> Option<u32> {
        self.scores.get(name).copied()
    }

    /// Scores sorted by score (highest first), then by name.
    pub fn standings(&self) -> Vec<Standing> {
        let mut standings: Vec<Standing> = self
            .scores
            .iter()
            .map(|(player, score)| Standing {
                player: player.clone(),
                score: *score,
            })
            .collect();
        standings.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.player.cmp(&b.player)));
        standings
    }

    /// Starts the game: spawns the round driver. Returns `false` if the
    /// engine was not idle.
    ///
    /// Must be called from inside a Tokio runtime.
    pub fn start(&mut self) -> bool {
        if self.phase != EnginePhase::Idle {
            return false;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.signals = Some(rx);
        self.driver = Some(tokio::spawn(drive_rounds(
            self.questions.len(),
            self.round_timeout,
            self.latch.subscribe(),
            tx,
        )));
        self.phase = EnginePhase::Running;
        info!(
            rounds = self.questions.len(),
            timeout_ms = self.round_timeout.as_millis() as u64,
            "round engine started"
        );
        true
    }

    /// Stops the driver. No further notices are produced.
    pub fn stop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        self.signals = None;
        self.current = None;
        if self.phase == EnginePhase::Running {
            debug!("round engine stopped before the last round");
        }
        self.phase = EnginePhase::Finished;
    }

    /// Records an answer for the open round. The first answer a player
    /// gives in a round is final.
    pub fn submit_answer(&mut self, name: &PlayerName, answer: bool) -> AnswerOutcome {
        let Some(index) = self.current else {
            return AnswerOutcome::Ignored;
        };
        if self.phase != EnginePhase::Running {
            return AnswerOutcome::Ignored;
        }
        let Some(score) = self.scores.get_mut(name) else {
            debug!(player = %name, "answer from non-participant, ignoring");
            return AnswerOutcome::Ignored;
        };
        if !self.responders.insert(name.clone()) {
            return AnswerOutcome::AlreadyAnswered;
        }

        let outcome = if self.questions[index].answer == answer {
            *score += 1;
            AnswerOutcome::Correct
        } else {
            AnswerOutcome::Incorrect
        };
        debug!(player = %name, round = index + 1, ?outcome, "answer recorded");

        self.check_all_answered();
        outcome
    }

    /// Waits for the next round notice.
    ///
    /// Pends forever while idle or finished. Returns `None` only if the
    /// driver disappeared without completing, after which the engine
    /// counts as finished.
    pub async fn next_notice(&mut self) -> Option<RoundNotice> {
        if self.phase != EnginePhase::Running {
            return std::future::pending().await;
        }
        let signal = match self.signals.as_mut() {
            Some(signals) => signals.recv().await,
            None => None,
        };

        match signal {
            Some(DriverSignal::Enter(index)) => Some(self.enter_round(index)),
            Some(DriverSignal::Complete) => {
                self.phase = EnginePhase::Finished;
                self.current = None;
                self.driver = None;
                self.signals = None;
                info!("all rounds complete");
                Some(RoundNotice::Finished {
                    standings: self.standings(),
                })
            }
            None => {
                warn!("round driver stopped unexpectedly");
                self.stop();
                None
            }
        }
    }

    fn enter_round(&mut self, index: usize) -> RoundNotice {
        self.current = Some(index);
        self.responders.clear();
        let question = &self.questions[index];
        debug!(round = index + 1, "round opened");
        let notice = RoundNotice::Round {
            number: index + 1,
            total: self.questions.len(),
            text: question.text.clone(),
        };
        // A room with no participants has nobody to wait for.
        self.check_all_answered();
        notice
    }

    fn check_all_answered(&self) {
        let Some(index) = self.current else {
            return;
        };
        if self.phase == EnginePhase::Running
            && self.responders.len() >= self.scores.len()
            && self.latch.release(index)
        {
            debug!(round = index + 1, completed = self.latch.completed(), "all players answered");
        }
    }
}

impl Drop for RoundEngine {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

impl fmt::Debug for RoundEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoundEngine")
            .field("phase", &self.phase)
            .field("round", &self.round())
            .field("total", &self.questions.len())
            .field("players", &self.scores.len())
            .finish()
    }
}

/// The round timer. Runs one iteration per question, then reports
/// completion.
async fn drive_rounds(
    total: usize,
    round_timeout: Duration,
    mut completed: watch::Receiver<usize>,
    signals: mpsc::UnboundedSender<DriverSignal>,
) {
    for round in 0..total {
        if signals.send(DriverSignal::Enter(round)).is_err() {
            return;
        }
        let all_answered = async { completed.wait_for(|done| *done > round).await.is_ok() };
        match time::timeout(round_timeout, all_answered).await {
            Ok(true) => debug!(round = round + 1, "round closed early"),
            // latch dropped: the engine is gone
            Ok(false) => return,
            Err(_) => debug!(round = round + 1, "round timed out"),
        }
    }
    let _ = signals.send(DriverSignal::Complete);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn name(s: &str) -> PlayerName {
        PlayerName::new(s).unwrap()
    }

    fn engine_with(players: &[&str]) -> RoundEngine {
        let mut engine = RoundEngine::new(Quiz::default(), TIMEOUT);
        for p in players {
            engine.add_player(name(p));
        }
        engine
    }

    fn round_number(notice: Option<RoundNotice>) -> usize {
        match notice {
            Some(RoundNotice::Round { number, .. }) => number,
            other => panic!("expected a round notice, got {other:?}"),
        }
    }

    #[test]
    fn test_latch_releases_each_round_once() {
        let latch = RoundLatch::new();
        assert!(latch.release(0));
        assert!(!latch.release(0));
        assert_eq!(latch.completed(), 1);
        assert!(latch.release(1));
        assert_eq!(latch.completed(), 2);
    }

    #[test]
    fn test_latch_skips_past_timed_out_round() {
        let latch = RoundLatch::new();
        // round 0 timed out without a release; round 1 still releases
        assert!(latch.release(1));
        assert!(!latch.release(0), "stale release must not count");
        assert_eq!(latch.completed(), 2);
    }

    #[test]
    fn test_submit_answer_before_start_is_ignored() {
        let mut engine = engine_with(&["alice"]);
        assert_eq!(engine.submit_answer(&name("alice"), true), AnswerOutcome::Ignored);
        assert_eq!(engine.score(&name("alice")), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_answered_advances_without_timeout() {
        let mut engine = engine_with(&["alice", "bob"]);
        let started = Instant::now();
        assert!(engine.start());
        assert!(!engine.start(), "engine starts once");

        assert_eq!(round_number(engine.next_notice().await), 1);
        assert_eq!(engine.submit_answer(&name("alice"), true), AnswerOutcome::Correct);
        assert_eq!(engine.submit_answer(&name("bob"), false), AnswerOutcome::Incorrect);

        assert_eq!(round_number(engine.next_notice().await), 2);
        assert!(started.elapsed() < TIMEOUT);
        assert_eq!(engine.score(&name("alice")), Some(1));
        assert_eq!(engine.score(&name("bob")), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_player_round_times_out() {
        let mut engine = engine_with(&["alice", "bob"]);
        engine.start();
        assert_eq!(round_number(engine.next_notice().await), 1);

        let opened = Instant::now();
        engine.submit_answer(&name("alice"), true);
        assert_eq!(round_number(engine.next_notice().await), 2);
        assert!(opened.elapsed() >= TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_answer_counts_once() {
        let mut engine = engine_with(&["alice", "bob"]);
        engine.start();
        engine.next_notice().await;

        assert_eq!(engine.submit_answer(&name("alice"), true), AnswerOutcome::Correct);
        assert_eq!(
            engine.submit_answer(&name("alice"), true),
            AnswerOutcome::AlreadyAnswered
        );
        assert_eq!(engine.score(&name("alice")), Some(1));
        // still waiting on bob
        assert_eq!(engine.round(), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_answerer_never_scores() {
        let mut engine = engine_with(&["alice"]);
        engine.start();
        engine.next_notice().await;

        assert_eq!(engine.submit_answer(&name("mallory"), true), AnswerOutcome::Ignored);
        assert_eq!(engine.score(&name("mallory")), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_player_closes_round_for_the_rest() {
        let mut engine = engine_with(&["alice", "bob"]);
        let started = Instant::now();
        engine.start();
        engine.next_notice().await;

        engine.submit_answer(&name("alice"), true);
        assert!(engine.remove_player(&name("bob")));
        assert!(!engine.remove_player(&name("bob")));

        assert_eq!(round_number(engine.next_notice().await), 2);
        assert!(started.elapsed() < TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_game_reports_standings() {
        let mut engine = engine_with(&["bob", "alice", "carol"]);
        engine.start();

        for answer in [true, false, true] {
            engine.next_notice().await;
            engine.submit_answer(&name("alice"), answer);
            engine.submit_answer(&name("bob"), answer);
            engine.submit_answer(&name("carol"), !answer);
        }

        let Some(RoundNotice::Finished { standings }) = engine.next_notice().await else {
            panic!("expected the finished notice");
        };
        let rendered: Vec<String> = standings.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["alice 3", "bob 3", "carol 0"]);
        assert_eq!(engine.phase(), EnginePhase::Finished);
        assert_eq!(engine.submit_answer(&name("alice"), true), AnswerOutcome::Ignored);
        assert_eq!(engine.score(&name("alice")), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_notice_pends_after_stop() {
        let mut engine = engine_with(&["alice"]);
        engine.start();
        engine.next_notice().await;
        engine.stop();

        let result = time::timeout(TIMEOUT * 5, engine.next_notice()).await;
        assert!(result.is_err(), "a stopped engine produces nothing");
        assert_eq!(engine.phase(), EnginePhase::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_driver_ends_the_engine() {
        let mut engine = engine_with(&["alice", "bob"]);
        engine.start();
        assert_eq!(round_number(engine.next_notice().await), 1);

        engine.driver.take().unwrap().abort();
        assert_eq!(engine.next_notice().await, None);
        assert_eq!(engine.phase(), EnginePhase::Finished);
        assert_eq!(engine.submit_answer(&name("alice"), true), AnswerOutcome::Ignored);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_quiz_finishes_immediately() {
        let mut engine = RoundEngine::new(Quiz::new(Vec::new()), TIMEOUT);
        engine.add_player(name("alice"));
        engine.start();
        assert!(matches!(
            engine.next_notice().await,
            Some(RoundNotice::Finished { .. })
        ));
    }
}
