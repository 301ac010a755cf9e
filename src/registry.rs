//! Shared client registry
//!
//! The single source of truth mapping names to connected clients. Every
//! operation takes the map mutex once and completes inside it, so each is
//! one atomic transaction: no operation ever observes another's
//! intermediate state, and two concurrent registrations of the same name
//! cannot both succeed. Queue sends are unbounded and never block, so the
//! lock is never held across a suspension point.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::client::{Client, SessionGuard};
use crate::error::{AlreadyExists, NoSuchClient};
use crate::message::Message;

/// Registry side of a connected client: the write ends of its queue and
/// kick cell.
#[derive(Debug)]
struct ClientHandle {
    queue: mpsc::UnboundedSender<Message>,
    kick: watch::Sender<Option<String>>,
}

/// The shared name -> client mapping
///
/// Cheap to clone; all clones share the same map. At most one entry per
/// name exists at any time, and a name is present exactly while a session
/// for it is active.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    clients: Arc<Mutex<HashMap<String, ClientHandle>>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically register `name` and announce it to everyone else.
    ///
    /// Fails with no side effect if the name is taken. On success the
    /// connect notice is enqueued to every already-registered client (the
    /// new client does not see its own), the entry is inserted, and the
    /// returned [`Client`] carries the teardown guard for it.
    pub fn try_register(&self, name: &str) -> Result<Client, AlreadyExists> {
        let mut clients = self.clients.lock();
        if clients.contains_key(name) {
            return Err(AlreadyExists(name.to_string()));
        }

        let notice = Message::Notice(format!("{name} has connected"));
        for handle in clients.values() {
            let _ = handle.queue.send(notice.clone());
        }

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (kick_tx, kick_rx) = watch::channel(None);
        clients.insert(
            name.to_string(),
            ClientHandle {
                queue: queue_tx.clone(),
                kick: kick_tx,
            },
        );

        info!("Client '{}' registered, total clients: {}", name, clients.len());

        Ok(Client {
            name: name.to_string(),
            commands: queue_tx,
            queue: queue_rx,
            kick: kick_rx,
            guard: SessionGuard::new(self.clone(), name.to_string()),
        })
    }

    /// Atomically remove `name` and announce the departure.
    ///
    /// Removing an absent name is a no-op. Called exactly once per
    /// session, by its [`SessionGuard`].
    pub fn remove(&self, name: &str) {
        let mut clients = self.clients.lock();
        if clients.remove(name).is_none() {
            return;
        }

        let notice = Message::Notice(format!("{name} has disconnected"));
        for handle in clients.values() {
            let _ = handle.queue.send(notice.clone());
        }

        info!("Client '{}' removed, total clients: {}", name, clients.len());
    }

    /// Atomically enqueue `message` to every registered client.
    ///
    /// The single critical section observes one consistent snapshot of the
    /// registry, so broadcasts from different senders are delivered to
    /// every client in the same (commit) order.
    pub fn broadcast(&self, message: Message) {
        let clients = self.clients.lock();
        for handle in clients.values() {
            let _ = handle.queue.send(message.clone());
        }
        debug!("Broadcast to {} clients", clients.len());
    }

    /// Atomically enqueue `message` for `name` only.
    pub fn send_to(&self, name: &str, message: Message) -> Result<(), NoSuchClient> {
        let clients = self.clients.lock();
        let handle = clients
            .get(name)
            .ok_or_else(|| NoSuchClient(name.to_string()))?;
        let _ = handle.queue.send(message);
        Ok(())
    }

    /// Atomically mark `name` as kicked, unless it already is.
    ///
    /// First kick wins: only the transition from not-kicked fires the
    /// client's kick cell; a later kick of the same target is an accepted
    /// no-op, so of two simultaneous mutual kicks on one target exactly
    /// one reason is delivered.
    pub fn set_kicked(&self, name: &str, reason: &str) -> Result<(), NoSuchClient> {
        let clients = self.clients.lock();
        let handle = clients
            .get(name)
            .ok_or_else(|| NoSuchClient(name.to_string()))?;
        let first = handle.kick.send_if_modified(|kicked| {
            if kicked.is_none() {
                *kicked = Some(reason.to_string());
                true
            } else {
                false
            }
        });
        if first {
            info!("Client '{}' kicked by '{}'", name, reason);
        }
        Ok(())
    }

    /// Whether `name` is currently registered
    pub fn contains(&self, name: &str) -> bool {
        self.clients.lock().contains_key(name)
    }

    /// Number of currently registered clients
    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    /// Whether no clients are registered
    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_rejects_duplicate() {
        let registry = Registry::new();
        let _alice = registry.try_register("alice").unwrap();

        let err = registry.try_register("alice").unwrap_err();
        assert_eq!(err, AlreadyExists("alice".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_registration_single_winner() {
        let registry = Registry::new();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move { registry.try_register("dave") }));
        }

        // Keep the winning client alive so its guard cannot free the name
        // for a later attempt.
        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_connect_notice_excludes_new_client() {
        let registry = Registry::new();
        let mut bob = registry.try_register("bob").unwrap();
        let mut alice = registry.try_register("alice").unwrap();

        assert_eq!(
            bob.queue.try_recv().unwrap(),
            Message::Notice("alice has connected".to_string())
        );
        assert!(alice.queue.try_recv().is_err());
    }

    #[test]
    fn test_guard_removes_exactly_once_and_announces() {
        let registry = Registry::new();
        let mut bob = registry.try_register("bob").unwrap();
        let alice = registry.try_register("alice").unwrap();

        // drain the connect notice
        let _ = bob.queue.try_recv();

        drop(alice);
        assert!(!registry.contains("alice"));
        assert_eq!(
            bob.queue.try_recv().unwrap(),
            Message::Notice("alice has disconnected".to_string())
        );

        // the name is free again
        assert!(registry.try_register("alice").is_ok());
    }

    #[test]
    fn test_broadcast_reaches_everyone_in_commit_order() {
        let registry = Registry::new();
        let mut alice = registry.try_register("alice").unwrap();
        let mut bob = registry.try_register("bob").unwrap();
        let _ = bob.queue.try_recv();
        let _ = alice.queue.try_recv();

        let first = Message::Broadcast {
            from: "alice".to_string(),
            text: "one".to_string(),
        };
        let second = Message::Broadcast {
            from: "bob".to_string(),
            text: "two".to_string(),
        };
        registry.broadcast(first.clone());
        registry.broadcast(second.clone());

        assert_eq!(bob.queue.try_recv().unwrap(), first);
        assert_eq!(bob.queue.try_recv().unwrap(), second);
        // the sender sees its own broadcast too
        assert_eq!(alice.queue.try_recv().unwrap(), first);
        assert_eq!(alice.queue.try_recv().unwrap(), second);
    }

    #[test]
    fn test_send_to_unknown_is_soft_error() {
        let registry = Registry::new();
        let err = registry
            .send_to(
                "nobody",
                Message::Tell {
                    from: "alice".to_string(),
                    text: "hi".to_string(),
                },
            )
            .unwrap_err();
        assert_eq!(err, NoSuchClient("nobody".to_string()));
    }

    #[test]
    fn test_send_to_delivers_privately() {
        let registry = Registry::new();
        let mut alice = registry.try_register("alice").unwrap();
        let mut bob = registry.try_register("bob").unwrap();
        let _ = alice.queue.try_recv();
        let _ = bob.queue.try_recv();

        let tell = Message::Tell {
            from: "alice".to_string(),
            text: "psst".to_string(),
        };
        registry.send_to("bob", tell.clone()).unwrap();

        assert_eq!(bob.queue.try_recv().unwrap(), tell);
        assert!(alice.queue.try_recv().is_err());
    }

    #[test]
    fn test_first_kick_wins() {
        let registry = Registry::new();
        let bob = registry.try_register("bob").unwrap();

        registry.set_kicked("bob", "alice").unwrap();
        // the second kick is accepted but changes nothing
        registry.set_kicked("bob", "carol").unwrap();

        assert_eq!(bob.kick.borrow().as_deref(), Some("alice"));
    }

    #[test]
    fn test_kick_unknown_is_soft_error() {
        let registry = Registry::new();
        assert_eq!(
            registry.set_kicked("nobody", "alice").unwrap_err(),
            NoSuchClient("nobody".to_string())
        );
    }
}
