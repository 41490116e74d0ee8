//! Room actor: the single task that owns the game.
//!
//! Membership changes, chat, answers and the operator's start request
//! all arrive as [`Event`]s on one bounded queue. The actor handles them
//! one at a time, together with the round engine's notices, so room
//! state never needs a lock of its own.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use trivia_protocol::{parse_answer, Notification, PlayerName};

use crate::engine::{AnswerOutcome, EnginePhase, RoundEngine, RoundNotice, Standing};
use crate::{Broadcaster, PlayerInbox, PlayerRegistry, Quiz, RoomConfig, RoomError, RoomState};

/// Inputs to the room actor, consumed in arrival order.
#[derive(Debug)]
pub(crate) enum Event {
    /// Register a player. The reply carries the welcome text.
    InsertPlayer {
        name: PlayerName,
        reply: oneshot::Sender<Result<String, RoomError>>,
    },

    /// The player's session ended.
    RemovePlayer { name: PlayerName },

    /// Deliver `text` to everyone except the listed players.
    Broadcast {
        text: String,
        except: Vec<PlayerName>,
    },

    /// Deliver `text` to one player.
    BroadcastPersonal { name: PlayerName, text: String },

    /// The operator asked to begin.
    StartGame,

    SubmitAnswer { name: PlayerName, answer: bool },
}

/// Text the room sends. Kept together so tests and clients agree on it.
mod messages {
    use super::*;

    pub fn welcome(name: &PlayerName) -> String {
        format!("hi {name}, welcome to the game")
    }

    pub fn joined(name: &PlayerName, players: usize) -> String {
        format!("player {name} joined. total {players} players")
    }

    pub fn left(name: &PlayerName, players: usize) -> String {
        format!("player {name} left. total {players} players")
    }

    pub fn chat(name: &PlayerName, line: &str) -> String {
        format!("{name}: {line}")
    }

    pub fn round(number: usize, question: &str) -> String {
        format!("round {number}: {question}")
    }

    pub fn final_scores(standings: &[Standing]) -> String {
        let scores: Vec<String> = standings.iter().map(ToString::to_string).collect();
        format!("final scores: {}", scores.join(", "))
    }

    pub const GAME_STARTED: &str = "game started";
    pub const GAME_FINISHED: &str = "game finished";
    pub const GAME_OVER: &str = "the game is over";
    pub const INVALID_INPUT: &str = "invalid input, answer with Y or N";
}

// ---------------------------------------------------------------------------
// RoomHandle
// ---------------------------------------------------------------------------

/// Handle to the running room actor.
///
/// Cheap to clone: every session, the operator terminal and the server
/// each hold one.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    events: mpsc::Sender<Event>,
    state: watch::Receiver<RoomState>,
    shutdown: Arc<watch::Sender<bool>>,
    registry: Arc<PlayerRegistry>,
}

impl RoomHandle {
    async fn send(&self, event: Event) -> Result<(), RoomError> {
        self.events.send(event).await.map_err(|_| RoomError::Unavailable)
    }

    /// Registers a player and returns the welcome text.
    ///
    /// # Errors
    /// [`RoomError::AlreadyExists`] if the name is taken,
    /// [`RoomError::GameOver`] once the game has finished, and
    /// [`RoomError::Unavailable`] if the room has stopped.
    pub async fn register(&self, name: PlayerName) -> Result<String, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(Event::InsertPlayer { name, reply }).await?;
        rx.await.map_err(|_| RoomError::Unavailable)?
    }

    /// Tells the room a player's session ended.
    pub async fn remove_player(&self, name: PlayerName) -> Result<(), RoomError> {
        self.send(Event::RemovePlayer { name }).await
    }

    /// Announces `text` to everyone not in `except`.
    pub async fn broadcast(
        &self,
        text: impl Into<String>,
        except: Vec<PlayerName>,
    ) -> Result<(), RoomError> {
        self.send(Event::Broadcast {
            text: text.into(),
            except,
        })
        .await
    }

    /// Sends `text` to a single player.
    pub async fn whisper(&self, name: PlayerName, text: impl Into<String>) -> Result<(), RoomError> {
        self.send(Event::BroadcastPersonal {
            name,
            text: text.into(),
        })
        .await
    }

    /// Asks the room to start the game. Ignored unless the room is
    /// waiting and has enough players.
    pub async fn request_start(&self) -> Result<(), RoomError> {
        self.send(Event::StartGame).await
    }

    pub async fn submit_answer(&self, name: PlayerName, answer: bool) -> Result<(), RoomError> {
        self.send(Event::SubmitAnswer { name, answer }).await
    }

    /// Routes a line typed by a player according to the room state.
    ///
    /// While waiting the line is chat for everyone else. During the game
    /// `Y`/`N` are answers and anything else earns the sender an
    /// "invalid input" notice. After the game the sender is told it is
    /// over.
    pub async fn say(&self, name: PlayerName, line: &str) -> Result<(), RoomError> {
        let event = match self.state() {
            RoomState::Waiting => Event::Broadcast {
                text: messages::chat(&name, line),
                except: vec![name],
            },
            RoomState::OnProgress => match parse_answer(line) {
                Some(answer) => Event::SubmitAnswer { name, answer },
                None => Event::BroadcastPersonal {
                    name,
                    text: messages::INVALID_INPUT.to_string(),
                },
            },
            RoomState::Done => Event::BroadcastPersonal {
                name,
                text: messages::GAME_OVER.to_string(),
            },
        };
        self.send(event).await
    }

    /// The room state as last published by the actor.
    pub fn state(&self) -> RoomState {
        *self.state.borrow()
    }

    /// Waits until the game is done or the room has stopped.
    pub async fn wait_until_done(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| *s == RoomState::Done).await;
    }

    /// Waits until the actor has exited.
    pub async fn stopped(&self) {
        let mut state = self.state.clone();
        while state.changed().await.is_ok() {}
    }

    /// Shared view of the registry.
    pub fn registry(&self) -> &Arc<PlayerRegistry> {
        &self.registry
    }

    /// Takes a registered player's inbox for their session.
    ///
    /// # Errors
    /// [`RoomError::NotFound`] if the player is not registered or their
    /// inbox was already claimed.
    pub fn claim_inbox(&self, name: &PlayerName) -> Result<PlayerInbox, RoomError> {
        self.registry
            .claim_inbox(name)
            .ok_or_else(|| RoomError::NotFound(name.clone()))
    }

    /// Stops the room and waits for the actor to finish. Every
    /// registered player receives [`Notification::Shutdown`] once.
    /// Calling this again is harmless.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        self.stopped().await;
    }
}

// ---------------------------------------------------------------------------
// RoomActor
// ---------------------------------------------------------------------------

struct RoomActor {
    config: RoomConfig,
    state: RoomState,
    registry: Arc<PlayerRegistry>,
    broadcaster: Broadcaster,
    engine: RoundEngine,
    events: mpsc::Receiver<Event>,
    shutdown: watch::Receiver<bool>,
    published: watch::Sender<RoomState>,
}

impl RoomActor {
    async fn run(mut self) {
        tracing::info!(
            min_players = self.config.min_players,
            rounds = self.engine.total_rounds(),
            "room actor started"
        );

        loop {
            tokio::select! {
                biased;
                _ = stop_requested(&mut self.shutdown) => break,
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                notice = self.engine.next_notice() => {
                    if let Some(notice) = notice {
                        self.handle_notice(notice);
                    }
                    self.end_game_if_engine_stopped();
                }
            }
        }

        self.shut_down();
        tracing::info!("room actor stopped");
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::InsertPlayer { name, reply } => {
                let result = self.handle_insert(name);
                let _ = reply.send(result);
            }
            Event::RemovePlayer { name } => self.handle_remove(&name),
            Event::Broadcast { text, except } => {
                self.broadcaster
                    .broadcast_all(&Notification::announcement(text), &except);
            }
            Event::BroadcastPersonal { name, text } => {
                self.broadcaster.unicast(&name, Notification::announcement(text));
            }
            Event::StartGame => self.handle_start(),
            Event::SubmitAnswer { name, answer } => {
                if self.state != RoomState::OnProgress {
                    tracing::debug!(player = %name, state = %self.state, "answer outside the game, ignoring");
                    return;
                }
                if self.engine.submit_answer(&name, answer) == AnswerOutcome::AlreadyAnswered {
                    tracing::debug!(player = %name, "duplicate answer ignored");
                }
            }
        }
    }

    fn handle_insert(&mut self, name: PlayerName) -> Result<String, RoomError> {
        if !self.state.is_joinable() {
            return Err(RoomError::GameOver);
        }
        self.registry.insert(name.clone())?;
        self.engine.add_player(name.clone());

        let players = self.registry.count();
        tracing::info!(player = %name, players, "player joined");
        self.broadcaster
            .broadcast_all(&Notification::announcement(messages::joined(&name, players)), &[]);
        Ok(messages::welcome(&name))
    }

    fn handle_remove(&mut self, name: &PlayerName) {
        if !self.registry.remove(name) {
            tracing::debug!(player = %name, "remove for unknown player, ignoring");
            return;
        }
        self.engine.remove_player(name);

        let players = self.registry.count();
        tracing::info!(player = %name, players, "player left");
        self.broadcaster
            .broadcast_all(&Notification::announcement(messages::left(name, players)), &[]);
    }

    fn handle_start(&mut self) {
        if self.state != RoomState::Waiting {
            tracing::debug!(state = %self.state, "start requested twice, ignoring");
            return;
        }
        let players = self.registry.count();
        if players < self.config.min_players {
            tracing::info!(
                players,
                min_players = self.config.min_players,
                "not enough players to start"
            );
            return;
        }

        self.transition(RoomState::OnProgress);
        tracing::info!(players, "game started");
        self.broadcaster
            .broadcast_all(&Notification::announcement(messages::GAME_STARTED), &[]);
        self.engine.start();
    }

    fn handle_notice(&mut self, notice: RoundNotice) {
        match notice {
            RoundNotice::Round { number, total, text } => {
                tracing::info!(round = number, total, "round started");
                self.broadcaster
                    .broadcast_all(&Notification::announcement(messages::round(number, &text)), &[]);
            }
            RoundNotice::Finished { standings } => self.finish_game(&standings),
        }
    }

    /// An engine that stopped without reporting `Finished` still ends the
    /// game, so the room never stays in progress with no rounds coming.
    fn end_game_if_engine_stopped(&mut self) {
        if self.state == RoomState::OnProgress && self.engine.phase() == EnginePhase::Finished {
            tracing::warn!(round = ?self.engine.round(), "round engine stopped early, ending the game");
            let standings = self.engine.standings();
            self.finish_game(&standings);
        }
    }

    fn finish_game(&mut self, standings: &[Standing]) {
        self.broadcaster
            .broadcast_all(&Notification::announcement(messages::GAME_FINISHED), &[]);
        self.broadcaster.broadcast_all(
            &Notification::announcement(messages::final_scores(standings)),
            &[],
        );
        self.transition(RoomState::Done);
        tracing::info!(players = standings.len(), "game finished");
    }

    fn transition(&mut self, target: RoomState) {
        if !self.state.can_transition_to(target) {
            tracing::warn!(from = %self.state, to = %target, "invalid room transition");
            return;
        }
        self.state = target;
        self.published.send_replace(target);
    }

    /// Stop the engine, say goodbye, then drop every channel.
    fn shut_down(&mut self) {
        self.events.close();
        self.engine.stop();
        let notified = self.broadcaster.broadcast_shutdown();
        self.registry.clear();
        tracing::info!(notified, "room shut down");
    }
}

async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Spawns the room actor and returns a handle to it.
///
/// Must be called from inside a Tokio runtime.
pub fn spawn_room(config: RoomConfig, quiz: Quiz) -> RoomHandle {
    let (actor, handle) = build_room(config, quiz);
    tokio::spawn(actor.run());
    handle
}

fn build_room(config: RoomConfig, quiz: Quiz) -> (RoomActor, RoomHandle) {
    let (events_tx, events_rx) = mpsc::channel(config.queue_capacity.max(1));
    let (published, state_rx) = watch::channel(RoomState::Waiting);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let registry = Arc::new(PlayerRegistry::new(config.outbox_capacity));

    let actor = RoomActor {
        engine: RoundEngine::new(quiz, config.round_timeout()),
        config,
        state: RoomState::Waiting,
        registry: Arc::clone(&registry),
        broadcaster: Broadcaster::new(Arc::clone(&registry)),
        events: events_rx,
        shutdown: shutdown_rx,
        published,
    };
    let handle = RoomHandle {
        events: events_tx,
        state: state_rx,
        shutdown: Arc::new(shutdown_tx),
        registry,
    };
    (actor, handle)
}
