//! WebSocket subscriber connection state.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use chime_core::ids::{ConnectionId, SessionId};

/// Outcome of queueing a message for a subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Queued for the writer task.
    Sent,
    /// Queue full; the message was dropped and counted.
    QueueFull,
    /// Receiver gone; the connection is dead and must be removed.
    Closed,
}

/// One connected subscriber.
///
/// Owns nothing but its outbound queue and subscription set; all session
/// data lives in the progress manager.
pub struct SubscriberConnection {
    id: ConnectionId,
    subscriptions: Mutex<HashSet<SessionId>>,
    tx: mpsc::Sender<Arc<String>>,
    connected_at: Instant,
    dropped_messages: AtomicU64,
}

impl SubscriberConnection {
    /// Create a connection writing into `tx`.
    #[must_use]
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            subscriptions: Mutex::new(HashSet::new()),
            tx,
            connected_at: Instant::now(),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Connection identifier.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Subscribe this connection to a session.
    pub fn subscribe(&self, session_id: SessionId) {
        let _ = self.subscriptions.lock().insert(session_id);
    }

    /// Drop a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, session_id: &SessionId) -> bool {
        self.subscriptions.lock().remove(session_id)
    }

    /// Whether this connection is subscribed to the session.
    #[must_use]
    pub fn is_subscribed(&self, session_id: &SessionId) -> bool {
        self.subscriptions.lock().contains(session_id)
    }

    /// Number of active subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Queue a text message for the client.
    ///
    /// A full queue counts toward the drop total; a closed queue means
    /// the client is gone and the connection should be removed.
    pub fn send(&self, message: Arc<String>) -> SendOutcome {
        match self.tx.try_send(message) {
            Ok(()) => SendOutcome::Sent,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                SendOutcome::QueueFull
            }
            Err(mpsc::error::TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    /// Serialize `value` and queue it for the client.
    pub fn send_json<T: serde::Serialize>(&self, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.send(Arc::new(json)) == SendOutcome::Sent,
            Err(_) => false,
        }
    }

    /// Lifetime count of messages dropped for this connection.
    #[must_use]
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// How long this connection has been open.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
