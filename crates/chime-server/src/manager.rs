//! Session event fan-out to connected subscribers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use metrics::{counter, gauge};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use chime_core::ids::ConnectionId;
use chime_core::progress::ProgressSession;
use chime_pipeline::progress_tracker::ProgressBroadcaster;

use crate::connection::{SendOutcome, SubscriberConnection};
use crate::protocol::WireEvent;

/// Maximum lifetime message drops before a slow client is disconnected.
const MAX_TOTAL_DROPS: u64 = 100;

/// Holds every subscriber connection and fans session events out to them.
pub struct WebSocketManager {
    /// Connected subscribers indexed by connection ID.
    connections: RwLock<HashMap<ConnectionId, Arc<SubscriberConnection>>>,
    /// Counter mirroring the map size, so counting never takes the lock.
    active_count: AtomicUsize,
}

impl WebSocketManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
        }
    }

    /// Add a connection.
    pub async fn register(&self, connection: Arc<SubscriberConnection>) {
        let mut conns = self.connections.write().await;
        if conns
            .insert(connection.id().clone(), connection)
            .is_none()
        {
            let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
        }
        gauge!("ws_connections_active").set(conns.len() as f64);
    }

    /// Remove a connection by ID.
    pub async fn unregister(&self, connection_id: &ConnectionId) {
        let mut conns = self.connections.write().await;
        if conns.remove(connection_id).is_some() {
            let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
        }
        gauge!("ws_connections_active").set(conns.len() as f64);
    }

    /// Number of connected subscribers.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    /// Connections subscribed to the given session.
    pub async fn subscribed_connections(
        &self,
        session_id: &chime_core::ids::SessionId,
    ) -> Vec<Arc<SubscriberConnection>> {
        let conns = self.connections.read().await;
        conns
            .values()
            .filter(|c| c.is_subscribed(session_id))
            .cloned()
            .collect()
    }

    /// Push a session's current snapshot as a `progress_update` event.
    pub async fn broadcast_progress_update(&self, session: &ProgressSession) {
        self.broadcast_event(&Self::event("progress_update", session))
            .await;
    }

    /// Push a session's terminal snapshot as a `session_complete` event.
    pub async fn broadcast_session_complete(&self, session: &ProgressSession) {
        self.broadcast_event(&Self::event("session_complete", session))
            .await;
    }

    fn event(event_type: &'static str, session: &ProgressSession) -> WireEvent {
        WireEvent {
            event_type,
            session_id: session.session_id.clone(),
            timestamp: session.updated_at.clone(),
            data: serde_json::to_value(session).unwrap_or_default(),
        }
    }

    /// Serialize once, fan out to every connection, evict dead and slow
    /// clients.
    ///
    /// Send failures never propagate. A closed connection is removed by
    /// the first broadcast that fails into it; a slow one survives until
    /// its drop total reaches the threshold.
    async fn broadcast_event(&self, event: &WireEvent) {
        let json = match serde_json::to_string(event) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(event_type = event.event_type, error = %e, "failed to serialize event");
                return;
            }
        };
        let mut to_remove = Vec::new();
        {
            let conns = self.connections.read().await;
            let mut recipients = 0u32;
            for conn in conns.values() {
                recipients += 1;
                match conn.send(Arc::clone(&json)) {
                    SendOutcome::Sent => {}
                    SendOutcome::Closed => {
                        warn!(conn_id = %conn.id(), "removing closed connection");
                        to_remove.push(conn.id().clone());
                    }
                    SendOutcome::QueueFull => {
                        counter!("ws_broadcast_drops_total").increment(1);
                        let drops = conn.drop_count();
                        if drops >= MAX_TOTAL_DROPS {
                            warn!(conn_id = %conn.id(), drops, "disconnecting slow client");
                            to_remove.push(conn.id().clone());
                        } else {
                            warn!(conn_id = %conn.id(), total_drops = drops, "send queue full, event dropped");
                        }
                    }
                }
            }
            debug!(
                event_type = event.event_type,
                session_id = %event.session_id,
                recipients,
                "broadcast event"
            );
        }
        if !to_remove.is_empty() {
            let mut conns = self.connections.write().await;
            for id in &to_remove {
                if conns.remove(id).is_some() {
                    let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
                }
            }
            gauge!("ws_connections_active").set(conns.len() as f64);
        }
    }
}

impl Default for WebSocketManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProgressBroadcaster for WebSocketManager {
    async fn progress_updated(&self, session: &ProgressSession) {
        self.broadcast_progress_update(session).await;
    }

    async fn session_completed(&self, session: &ProgressSession) {
        self.broadcast_session_complete(session).await;
    }
}
