//! Session-side client handle
//!
//! A [`Client`] is what a successful registration hands back: the channel
//! ends the session's two tasks need, plus the guard that unregisters the
//! name when the session is over.

use tokio::sync::{mpsc, watch};

use crate::message::Message;
use crate::registry::Registry;

/// The session side of a registered client
///
/// Produced only by [`Registry::try_register`]. The fields are split
/// between the session's two tasks: the receive loop takes `commands`,
/// the send loop takes `queue` and `kick`.
#[derive(Debug)]
pub struct Client {
    /// The unique registered name (immutable for the session's lifetime)
    pub name: String,
    /// Sender end of this client's own queue, for the receive loop
    pub(crate) commands: mpsc::UnboundedSender<Message>,
    /// Receiver end of this client's queue, drained by the send loop
    pub(crate) queue: mpsc::UnboundedReceiver<Message>,
    /// Kick cell observer: `None` until someone kicks this client
    pub(crate) kick: watch::Receiver<Option<String>>,
    /// Teardown guard; dropping it unregisters the name
    pub(crate) guard: SessionGuard,
}

/// Removes the client from the registry exactly once, on drop.
///
/// Constructed inside the registration critical section, so every
/// registered name has a live guard from the instant it is inserted; any
/// exit path (quit, kick, I/O failure, cancellation, panic unwind) runs
/// the removal.
#[derive(Debug)]
pub struct SessionGuard {
    registry: Registry,
    name: String,
}

impl SessionGuard {
    pub(crate) fn new(registry: Registry, name: String) -> Self {
        Self { registry, name }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.name);
    }
}
