//! Notifier (push fan-out)
//!
//! Registry of connected client sessions. Each session owns an unbounded
//! channel, so a broadcast never waits on a slow client. Sessions whose
//! receiving side has gone away are pruned during the broadcast itself.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tkt_common::PushEvent;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// One attached client
pub struct Session {
    pub id: Uuid,
    /// Delivers the handshake first, then every broadcast
    pub receiver: mpsc::UnboundedReceiver<PushEvent>,
}

/// Session registry and broadcaster
#[derive(Default)]
pub struct Notifier {
    sessions: Mutex<HashMap<Uuid, mpsc::UnboundedSender<PushEvent>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new session and queue its `connected` handshake
    pub fn connect(&self) -> Session {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        // Receiver is alive, so the handshake cannot fail here
        let _ = tx.send(PushEvent::Connected);

        let count = {
            let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
            sessions.insert(id, tx);
            sessions.len()
        };
        info!(session_id = %id, sessions = count, "Push session connected");

        Session { id, receiver: rx }
    }

    /// Remove a session; returns whether it was registered
    pub fn disconnect(&self, id: &Uuid) -> bool {
        let removed = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some();
        if removed {
            info!(session_id = %id, "Push session disconnected");
        }
        removed
    }

    /// Tell every session the datafile changed
    ///
    /// Returns the number of sessions the event was handed to.
    pub fn broadcast(&self) -> usize {
        self.broadcast_event(PushEvent::datafile_updated_now())
    }

    /// Fan out an arbitrary event, pruning closed sessions
    pub fn broadcast_event(&self, event: PushEvent) -> usize {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let mut delivered = 0;
        sessions.retain(|id, tx| match tx.send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(_) => {
                debug!(session_id = %id, "Pruning closed push session");
                false
            }
        });
        info!(
            "Broadcast {} to {} session(s)",
            event.event_name(),
            delivered
        );
        delivered
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_session_receives_handshake_first() {
        let notifier = Notifier::new();
        let mut session = notifier.connect();

        notifier.broadcast();

        assert_eq!(session.receiver.recv().await, Some(PushEvent::Connected));
        assert!(session.receiver.recv().await.unwrap().is_config_change());
    }

    #[tokio::test]
    async fn test_broadcast_counts_recipients() {
        let notifier = Notifier::new();
        let _a = notifier.connect();
        let _b = notifier.connect();
        let _c = notifier.connect();

        assert_eq!(notifier.broadcast(), 3);
    }

    #[tokio::test]
    async fn test_closed_session_is_pruned_not_fatal() {
        let notifier = Notifier::new();
        let keep = notifier.connect();
        let gone = notifier.connect();
        drop(gone);

        assert_eq!(notifier.session_count(), 2);
        assert_eq!(notifier.broadcast(), 1);
        assert_eq!(notifier.session_count(), 1);
        drop(keep);
    }

    #[test]
    fn test_disconnect() {
        let notifier = Notifier::new();
        let session = notifier.connect();
        assert!(notifier.disconnect(&session.id));
        assert!(!notifier.disconnect(&session.id));
        assert_eq!(notifier.broadcast(), 0);
    }
}
