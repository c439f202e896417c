//! Progress session types.
//!
//! A session is an append-only log of progress events plus terminal
//! completion state. Sessions are owned by the progress manager; these
//! types are the data model and its wire shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::SessionId;
use crate::timestamp::now_rfc3339;

/// Lifecycle status of a progress session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session created; operation in flight.
    Started,
    /// Operation finished (successfully or not).
    Completed,
}

/// One progress report within a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Human-readable status line.
    pub message: String,
    /// Percent complete, 0..=100.
    pub progress: u8,
    /// RFC 3339 timestamp of the report.
    pub timestamp: String,
}

/// A progress session: ordered event log plus terminal state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressSession {
    /// Session ID (UUID v7).
    pub session_id: SessionId,
    /// Operation type label, e.g. `agent_creation`.
    #[serde(rename = "type")]
    pub operation_type: String,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Ordered progress events, oldest first.
    pub progress: Vec<ProgressEvent>,
    /// Terminal outcome; `None` until completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    /// Operation result payload; `None` until completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// RFC 3339 creation time.
    pub created_at: String,
    /// RFC 3339 time of the most recent mutation.
    pub updated_at: String,
}

impl ProgressSession {
    /// Create a fresh session in the `Started` state.
    #[must_use]
    pub fn new(session_id: SessionId, operation_type: impl Into<String>) -> Self {
        let now = now_rfc3339();
        Self {
            session_id,
            operation_type: operation_type.into(),
            status: SessionStatus::Started,
            progress: Vec::new(),
            success: None,
            result: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Append a progress event, clamping percent to 100.
    pub fn push_event(&mut self, message: impl Into<String>, percent: u8) {
        self.progress.push(ProgressEvent {
            message: message.into(),
            progress: percent.min(100),
            timestamp: now_rfc3339(),
        });
        self.updated_at = now_rfc3339();
    }

    /// Mark the session completed. Last write wins on repeat calls.
    pub fn complete(&mut self, success: bool, result: Option<Value>) {
        self.status = SessionStatus::Completed;
        self.success = Some(success);
        self.result = result;
        self.updated_at = now_rfc3339();
    }

    /// The most recent progress event, if any.
    #[must_use]
    pub fn latest_event(&self) -> Option<&ProgressEvent> {
        self.progress.last()
    }

    /// Whether the session has reached a terminal state.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_session() -> ProgressSession {
        ProgressSession::new(SessionId::from_string("sess_1"), "agent_creation")
    }

    #[test]
    fn new_session_is_started_and_empty() {
        let s = make_session();
        assert_eq!(s.status, SessionStatus::Started);
        assert!(s.progress.is_empty());
        assert!(s.success.is_none());
        assert!(s.result.is_none());
        assert_eq!(s.created_at, s.updated_at);
    }

    #[test]
    fn push_event_preserves_order() {
        let mut s = make_session();
        s.push_event("crawling", 10);
        s.push_event("extracting", 20);
        s.push_event("building knowledge base", 40);
        let percents: Vec<u8> = s.progress.iter().map(|e| e.progress).collect();
        assert_eq!(percents, vec![10, 20, 40]);
        assert_eq!(s.latest_event().unwrap().message, "building knowledge base");
    }

    #[test]
    fn push_event_clamps_percent() {
        let mut s = make_session();
        s.push_event("overshoot", 150);
        assert_eq!(s.latest_event().unwrap().progress, 100);
    }

    #[test]
    fn complete_is_last_write_wins() {
        let mut s = make_session();
        s.complete(true, Some(json!({"agent_id": "agent_1"})));
        assert!(s.is_completed());
        assert_eq!(s.success, Some(true));

        s.complete(false, Some(json!({"error": "late failure"})));
        assert_eq!(s.success, Some(false));
        assert_eq!(s.result, Some(json!({"error": "late failure"})));
        assert!(s.is_completed());
    }

    #[test]
    fn serializes_operation_type_as_type() {
        let s = make_session();
        let value = serde_json::to_value(&s).unwrap();
        assert_eq!(value["type"], "agent_creation");
        assert_eq!(value["status"], "started");
        // Pending fields stay off the wire until completion.
        assert!(value.get("success").is_none());
        assert!(value.get("result").is_none());
    }

    #[test]
    fn completed_session_round_trips() {
        let mut s = make_session();
        s.push_event("done", 100);
        s.complete(true, Some(json!({"ok": true})));
        let json = serde_json::to_string(&s).unwrap();
        let back: ProgressSession = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
