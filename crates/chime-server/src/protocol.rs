//! WebSocket wire protocol.
//!
//! Clients send tagged JSON requests; the server answers each on the same
//! connection and pushes session events to every connection as they
//! happen.

use serde::{Deserialize, Serialize};

use chime_core::ids::SessionId;
use chime_core::progress::ProgressSession;
use chime_pipeline::progress_manager::SessionSummary;

/// Inbound client request.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Follow a session; the reply carries its current snapshot.
    Subscribe {
        /// Session to follow.
        session_id: SessionId,
    },
    /// Stop following a session.
    Unsubscribe {
        /// Session to drop.
        session_id: SessionId,
    },
    /// One-shot snapshot fetch.
    GetStatus {
        /// Session to inspect.
        session_id: SessionId,
    },
    /// List sessions that have not completed.
    GetActiveSessions,
}

/// Outbound reply to a client request.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Subscription acknowledged.
    Subscribed {
        /// The followed session.
        session_id: SessionId,
        /// Current snapshot; absent when the session does not exist yet.
        #[serde(skip_serializing_if = "Option::is_none")]
        session: Option<ProgressSession>,
    },
    /// Subscription dropped.
    Unsubscribed {
        /// The dropped session.
        session_id: SessionId,
    },
    /// Snapshot answer to `get_status`.
    Status {
        /// The session snapshot.
        session: Box<ProgressSession>,
    },
    /// Answer to `get_active_sessions`.
    ActiveSessions {
        /// Summaries of sessions still running.
        sessions: Vec<SessionSummary>,
    },
    /// The request could not be served; the connection stays open.
    Error {
        /// What went wrong.
        message: String,
    },
}

/// Pushed session event, sent to every connection.
#[derive(Clone, Debug, Serialize)]
pub struct WireEvent {
    /// `progress_update` or `session_complete`.
    #[serde(rename = "type")]
    pub event_type: &'static str,
    /// Session the event belongs to.
    pub session_id: SessionId,
    /// RFC 3339 time of the underlying session update.
    pub timestamp: String,
    /// Full session snapshot.
    pub data: serde_json::Value,
}
