//! Session registry with fan-out delivery.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Session identifier, unique per connection.
pub type SessionId = Uuid;

/// Lifecycle state of a client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Transport accepted, not yet registered.
    Connecting,
    /// Registered and receiving events.
    Open,
    /// Unregistered or dropped.
    Closed,
}

/// Registry of connected sessions.
///
/// Each session owns a bounded queue. Delivery never waits: a session whose
/// queue is full or whose receiver is gone is removed from the registry.
/// `publish` holds the registry lock for the whole fan-out, so every session
/// observes published events in the same order.
pub struct BroadcastHub<E> {
    sessions: Mutex<HashMap<SessionId, mpsc::Sender<E>>>,
    buffer: usize,
}

impl<E> BroadcastHub<E>
where
    E: Clone + Send + 'static,
{
    /// Create a hub with the given per-session buffer.
    #[must_use]
    pub fn new(buffer: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    /// Create a session queue sized for this hub.
    #[must_use]
    pub fn channel(&self) -> (mpsc::Sender<E>, mpsc::Receiver<E>) {
        mpsc::channel(self.buffer)
    }

    /// Register a session. Returns `false` if it was already registered, in
    /// which case the existing queue is kept.
    pub fn register(&self, id: SessionId, sender: mpsc::Sender<E>) -> bool {
        let mut sessions = self.lock();
        if sessions.contains_key(&id) {
            return false;
        }
        sessions.insert(id, sender);
        tracing::debug!(session_id = %id, sessions = sessions.len(), "Session registered");
        true
    }

    /// Unregister a session. Returns `false` if it was not registered.
    pub fn unregister(&self, id: SessionId) -> bool {
        let mut sessions = self.lock();
        let removed = sessions.remove(&id).is_some();
        if removed {
            tracing::debug!(session_id = %id, sessions = sessions.len(), "Session unregistered");
        }
        removed
    }

    /// Current state of a session.
    #[must_use]
    pub fn state(&self, id: SessionId) -> SessionState {
        if self.lock().contains_key(&id) {
            SessionState::Open
        } else {
            SessionState::Closed
        }
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Deliver `event` to every registered session. Returns the number of
    /// sessions it was queued for.
    pub fn publish(&self, event: &E) -> usize {
        let mut sessions = self.lock();
        let mut dropped = Vec::new();
        let mut delivered = 0;

        for (id, sender) in sessions.iter() {
            match sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(session_id = %id, "Session queue full, dropping session");
                    dropped.push(*id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!(session_id = %id, "Session receiver closed, dropping session");
                    dropped.push(*id);
                }
            }
        }
        for id in dropped {
            sessions.remove(&id);
        }
        delivered
    }

    /// Deliver `event` to one session. Returns `false` if the session is
    /// unknown or was dropped because it could not accept the event.
    pub fn send_to(&self, id: SessionId, event: E) -> bool {
        let mut sessions = self.lock();
        let Some(sender) = sessions.get(&id) else {
            return false;
        };
        match sender.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(session_id = %id, error = %e, "Unicast failed, dropping session");
                sessions.remove(&id);
                false
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, mpsc::Sender<E>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
