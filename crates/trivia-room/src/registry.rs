//! Player registry: who is in the room and where to reach them.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc::{self, OwnedPermit};
use trivia_protocol::{Notification, PlayerName};

use crate::RoomError;

/// Sending half of a player's outbound notification channel.
pub type PlayerSender = mpsc::Sender<Notification>;

/// Receiving half of a player's outbound notification channel, drained
/// by that player's session.
pub type PlayerInbox = mpsc::Receiver<Notification>;

struct Entry {
    sender: PlayerSender,
    /// Parked until the session claims it.
    inbox: Option<PlayerInbox>,
    /// Slot held back for the final `Shutdown`, so a full outbox can
    /// never crowd it out.
    shutdown_slot: Option<OwnedPermit<Notification>>,
}

/// Thread-safe mapping from player name to outbound channel.
///
/// The room actor is the only writer. Sessions and tests read through a
/// shared `Arc<PlayerRegistry>`. A poisoned lock is recovered rather
/// than propagated: every write leaves the map consistent, so the data
/// behind a poisoned lock is still valid.
pub struct PlayerRegistry {
    players: RwLock<HashMap<PlayerName, Entry>>,
    outbox_capacity: usize,
}

impl PlayerRegistry {
    /// Creates an empty registry whose channels hold `outbox_capacity`
    /// notifications each.
    pub fn new(outbox_capacity: usize) -> Self {
        Self {
            players: RwLock::new(HashMap::new()),
            outbox_capacity: outbox_capacity.max(1),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<PlayerName, Entry>> {
        self.players.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<PlayerName, Entry>> {
        self.players.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a player and creates their outbound channel.
    ///
    /// The channel holds `outbox_capacity` regular notifications plus one
    /// slot reserved for [`Notification::Shutdown`].
    ///
    /// # Errors
    /// Returns [`RoomError::AlreadyExists`] if the name is taken.
    pub fn insert(&self, name: PlayerName) -> Result<PlayerSender, RoomError> {
        let mut players = self.write();
        if players.contains_key(&name) {
            return Err(RoomError::AlreadyExists(name));
        }
        let (sender, inbox) = mpsc::channel(self.outbox_capacity.saturating_add(1));
        let shutdown_slot = match sender.clone().try_reserve_owned() {
            Ok(permit) => Some(permit),
            Err(e) => {
                tracing::warn!(player = %name, error = %e, "could not reserve shutdown slot");
                None
            }
        };
        players.insert(
            name,
            Entry {
                sender: sender.clone(),
                inbox: Some(inbox),
                shutdown_slot,
            },
        );
        Ok(sender)
    }

    /// Removes a player. Returns `false` if they were not registered.
    ///
    /// Dropping the entry drops the registry's sender; the session sees
    /// its channel close once every other clone is gone too.
    pub fn remove(&self, name: &PlayerName) -> bool {
        self.write().remove(name).is_some()
    }

    /// Returns a clone of the player's sender.
    pub fn lookup(&self, name: &PlayerName) -> Option<PlayerSender> {
        self.read().get(name).map(|entry| entry.sender.clone())
    }

    /// Takes the player's inbox. Only the first call for a given
    /// registration gets it.
    pub fn claim_inbox(&self, name: &PlayerName) -> Option<PlayerInbox> {
        self.write().get_mut(name).and_then(|entry| entry.inbox.take())
    }

    pub fn contains(&self, name: &PlayerName) -> bool {
        self.read().contains_key(name)
    }

    pub fn count(&self) -> usize {
        self.read().len()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<PlayerName> {
        let mut names: Vec<_> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Visits every player under one read lock, so the visitor sees a
    /// consistent snapshot. The visitor must not block or call back into
    /// the registry's write methods.
    pub fn for_each(&self, mut visitor: impl FnMut(&PlayerName, &PlayerSender)) {
        for (name, entry) in self.read().iter() {
            visitor(name, &entry.sender);
        }
    }

    /// Takes every player's reserved shutdown slot. Each slot is handed
    /// out once, so a second call returns nothing for the same players.
    pub fn take_shutdown_slots(&self) -> Vec<(PlayerName, OwnedPermit<Notification>)> {
        self.write()
            .iter_mut()
            .filter_map(|(name, entry)| entry.shutdown_slot.take().map(|slot| (name.clone(), slot)))
            .collect()
    }

    /// Removes every player, dropping their senders.
    pub fn clear(&self) {
        self.write().clear();
    }
}

impl std::fmt::Debug for PlayerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerRegistry")
            .field("players", &self.names())
            .field("outbox_capacity", &self.outbox_capacity)
            .finish()
    }
}
