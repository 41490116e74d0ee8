//! Delivery primitives over the player registry.
//!
//! Every send is a non-blocking `try_send`. A player whose outbound
//! channel is full misses that one notification; nobody else waits on
//! them. `Shutdown` is the exception: it goes through a slot reserved at
//! registration.

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use trivia_protocol::{Notification, PlayerName};

use crate::{PlayerRegistry, PlayerSender};

/// Fans notifications out to registered players.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<PlayerRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<PlayerRegistry>) -> Self {
        Self { registry }
    }

    /// Sends `notification` to every player not named in `except`.
    /// Returns how many players accepted it.
    pub fn broadcast_all(&self, notification: &Notification, except: &[PlayerName]) -> usize {
        let mut delivered = 0;
        self.registry.for_each(|name, sender| {
            if except.contains(name) {
                return;
            }
            if deliver(name, sender, notification.clone()) {
                delivered += 1;
            }
        });
        delivered
    }

    /// Sends `notification` to one player. Returns `false` if the player
    /// is unknown or did not accept it.
    pub fn unicast(&self, name: &PlayerName, notification: Notification) -> bool {
        match self.registry.lookup(name) {
            Some(sender) => deliver(name, &sender, notification),
            None => {
                tracing::debug!(player = %name, "unicast to unknown player, dropping");
                false
            }
        }
    }

    /// Sends [`Notification::Shutdown`] to every registered player through
    /// their reserved slot. A player gets it at most once, even across
    /// repeated calls.
    pub fn broadcast_shutdown(&self) -> usize {
        let mut delivered = 0;
        for (name, slot) in self.registry.take_shutdown_slots() {
            let sender = slot.send(Notification::Shutdown);
            if sender.is_closed() {
                tracing::debug!(player = %name, "outbound channel closed, shutdown not read");
            } else {
                delivered += 1;
            }
        }
        delivered
    }
}

fn deliver(name: &PlayerName, sender: &PlayerSender, notification: Notification) -> bool {
    match sender.try_send(notification) {
        Ok(()) => true,
        Err(TrySendError::Full(dropped)) => {
            tracing::warn!(player = %name, ?dropped, "outbound channel full, dropping notification");
            false
        }
        Err(TrySendError::Closed(_)) => {
            tracing::debug!(player = %name, "outbound channel closed, skipping");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> PlayerName {
        PlayerName::new(s).unwrap()
    }

    fn setup(capacity: usize) -> (Arc<PlayerRegistry>, Broadcaster) {
        let registry = Arc::new(PlayerRegistry::new(capacity));
        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        (registry, broadcaster)
    }

    #[test]
    fn test_broadcast_all_honors_except_list() {
        let (registry, broadcaster) = setup(4);
        for n in ["alice", "bob", "carol"] {
            registry.insert(name(n)).unwrap();
        }
        let mut alice = registry.claim_inbox(&name("alice")).unwrap();
        let mut bob = registry.claim_inbox(&name("bob")).unwrap();
        let mut carol = registry.claim_inbox(&name("carol")).unwrap();

        let delivered =
            broadcaster.broadcast_all(&Notification::announcement("alice: hi"), &[name("alice")]);

        assert_eq!(delivered, 2);
        assert!(alice.try_recv().is_err());
        assert_eq!(bob.try_recv().unwrap(), Notification::announcement("alice: hi"));
        assert_eq!(carol.try_recv().unwrap(), Notification::announcement("alice: hi"));
    }

    #[test]
    fn test_full_channel_drops_only_for_that_player() {
        let (registry, broadcaster) = setup(1);
        registry.insert(name("slow")).unwrap();
        registry.insert(name("fast")).unwrap();
        let mut slow = registry.claim_inbox(&name("slow")).unwrap();
        let mut fast = registry.claim_inbox(&name("fast")).unwrap();

        assert_eq!(broadcaster.broadcast_all(&Notification::announcement("one"), &[]), 2);
        fast.try_recv().unwrap();

        // slow never drained "one", so "two" is dropped for them only
        assert_eq!(broadcaster.broadcast_all(&Notification::announcement("two"), &[]), 1);
        assert_eq!(slow.try_recv().unwrap(), Notification::announcement("one"));
        assert!(slow.try_recv().is_err());
        assert_eq!(fast.try_recv().unwrap(), Notification::announcement("two"));
    }

    #[test]
    fn test_closed_channel_is_skipped() {
        let (registry, broadcaster) = setup(4);
        registry.insert(name("gone")).unwrap();
        registry.insert(name("here")).unwrap();
        drop(registry.claim_inbox(&name("gone")));
        let mut here = registry.claim_inbox(&name("here")).unwrap();

        assert_eq!(broadcaster.broadcast_all(&Notification::announcement("x"), &[]), 1);
        assert!(here.try_recv().is_ok());
    }

    #[test]
    fn test_unicast_reaches_only_target() {
        let (registry, broadcaster) = setup(4);
        registry.insert(name("alice")).unwrap();
        registry.insert(name("bob")).unwrap();
        let mut alice = registry.claim_inbox(&name("alice")).unwrap();
        let mut bob = registry.claim_inbox(&name("bob")).unwrap();

        assert!(broadcaster.unicast(&name("bob"), Notification::announcement("invalid input")));
        assert!(alice.try_recv().is_err());
        assert_eq!(bob.try_recv().unwrap(), Notification::announcement("invalid input"));
    }

    #[test]
    fn test_unicast_to_removed_player_is_noop() {
        let (registry, broadcaster) = setup(4);
        registry.insert(name("alice")).unwrap();
        registry.remove(&name("alice"));
        assert!(!broadcaster.unicast(&name("alice"), Notification::announcement("hi")));
    }

    #[test]
    fn test_broadcast_shutdown_reaches_everyone() {
        let (registry, broadcaster) = setup(4);
        registry.insert(name("alice")).unwrap();
        registry.insert(name("bob")).unwrap();
        let mut alice = registry.claim_inbox(&name("alice")).unwrap();

        assert_eq!(broadcaster.broadcast_shutdown(), 2);
        assert_eq!(alice.try_recv().unwrap(), Notification::Shutdown);
    }

    #[test]
    fn test_shutdown_gets_through_full_outbox_exactly_once() {
        let (registry, broadcaster) = setup(1);
        registry.insert(name("slow")).unwrap();
        let mut slow = registry.claim_inbox(&name("slow")).unwrap();

        assert_eq!(broadcaster.broadcast_all(&Notification::announcement("one"), &[]), 1);
        assert_eq!(broadcaster.broadcast_all(&Notification::announcement("two"), &[]), 0);

        assert_eq!(broadcaster.broadcast_shutdown(), 1);
        assert_eq!(broadcaster.broadcast_shutdown(), 0);

        assert_eq!(slow.try_recv().unwrap(), Notification::announcement("one"));
        assert_eq!(slow.try_recv().unwrap(), Notification::Shutdown);
        assert!(slow.try_recv().is_err());
    }
}
