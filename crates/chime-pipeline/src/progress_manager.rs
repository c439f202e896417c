//! Progress session table.
//!
//! Sessions live in a concurrent map and survive completion so late
//! subscribers can still fetch final state. A TTL sweep removes completed
//! sessions past their retention age; it never touches in-flight ones.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::gauge;
use serde_json::Value;
use tracing::{debug, instrument};

use chime_core::errors::PipelineError;
use chime_core::ids::SessionId;
use chime_core::progress::{ProgressSession, SessionStatus};

/// Compact session view for listings.
#[derive(Clone, Debug, serde::Serialize)]
pub struct SessionSummary {
    /// Session ID.
    pub session_id: SessionId,
    /// Operation type label.
    #[serde(rename = "type")]
    pub operation_type: String,
    /// Current status.
    pub status: SessionStatus,
    /// Message of the most recent event, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_message: Option<String>,
    /// Percent of the most recent event, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_progress: Option<u8>,
    /// Total events recorded.
    pub event_count: usize,
}

/// Owns all progress sessions for the process.
#[derive(Default)]
pub struct ProgressManager {
    sessions: DashMap<SessionId, ProgressSession>,
}

impl ProgressManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new session and return its ID.
    #[instrument(skip(self))]
    pub fn create_session(&self, operation_type: &str) -> SessionId {
        let session_id = SessionId::generate();
        let _ = self.sessions.insert(
            session_id.clone(),
            ProgressSession::new(session_id.clone(), operation_type),
        );
        gauge!("progress_sessions_active").set(self.active_count() as f64);
        debug!(session_id = %session_id, operation_type, "session created");
        session_id
    }

    /// Append a progress event to a session.
    pub fn update_progress(
        &self,
        session_id: &SessionId,
        message: &str,
        percent: u8,
    ) -> Result<(), PipelineError> {
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| PipelineError::SessionNotFound(session_id.to_string()))?;
        session.push_event(message, percent);
        Ok(())
    }

    /// Mark a session completed. Idempotent; last write wins.
    pub fn complete_session(
        &self,
        session_id: &SessionId,
        success: bool,
        result: Option<Value>,
    ) -> Result<(), PipelineError> {
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| PipelineError::SessionNotFound(session_id.to_string()))?;
        session.complete(success, result);
        drop(session);
        gauge!("progress_sessions_active").set(self.active_count() as f64);
        Ok(())
    }

    /// Snapshot of a session, or `None` if it does not exist.
    #[must_use]
    pub fn get_session_status(&self, session_id: &SessionId) -> Option<ProgressSession> {
        self.sessions.get(session_id).map(|s| s.clone())
    }

    /// IDs of sessions that have not completed, unordered.
    #[must_use]
    pub fn get_active_sessions(&self) -> Vec<SessionId> {
        self.sessions
            .iter()
            .filter(|entry| !entry.is_completed())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Compact view of one session.
    #[must_use]
    pub fn session_summary(&self, session_id: &SessionId) -> Option<SessionSummary> {
        self.sessions.get(session_id).map(|s| SessionSummary {
            session_id: s.session_id.clone(),
            operation_type: s.operation_type.clone(),
            status: s.status,
            latest_message: s.latest_event().map(|e| e.message.clone()),
            latest_progress: s.latest_event().map(|e| e.progress),
            event_count: s.progress.len(),
        })
    }

    /// Remove completed sessions whose last update is older than `max_age`.
    /// Returns how many were removed.
    #[instrument(skip(self))]
    pub fn cleanup_old_sessions(&self, max_age: chrono::Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let before = self.sessions.len();
        self.sessions.retain(|_, session| {
            if !session.is_completed() {
                return true;
            }
            match DateTime::parse_from_rfc3339(&session.updated_at) {
                Ok(updated) => updated.with_timezone(&Utc) > cutoff,
                // An unparseable timestamp keeps the session; losing
                // live data is worse than holding stale data.
                Err(_) => true,
            }
        });
        let removed = before - self.sessions.len();
        if removed > 0 {
            debug!(removed, "swept old sessions");
        }
        removed
    }

    /// Total sessions currently held, completed included.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn active_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| !entry.is_completed())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn create_and_fetch_session() {
        let mgr = ProgressManager::new();
        let id = mgr.create_session("agent_creation");
        let session = mgr.get_session_status(&id).unwrap();
        assert_eq!(session.operation_type, "agent_creation");
        assert_eq!(session.status, SessionStatus::Started);
    }

    #[test]
    fn unknown_session_is_none_for_reads_and_error_for_writes() {
        let mgr = ProgressManager::new();
        let ghost = SessionId::from_string("sess_ghost");
        assert!(mgr.get_session_status(&ghost).is_none());
        assert_matches!(
            mgr.update_progress(&ghost, "hello", 10),
            Err(PipelineError::SessionNotFound(_))
        );
        assert_matches!(
            mgr.complete_session(&ghost, true, None),
            Err(PipelineError::SessionNotFound(_))
        );
    }

    #[test]
    fn updates_accumulate_in_order() {
        let mgr = ProgressManager::new();
        let id = mgr.create_session("agent_creation");
        mgr.update_progress(&id, "crawling", 10).unwrap();
        mgr.update_progress(&id, "extracting", 20).unwrap();

        let session = mgr.get_session_status(&id).unwrap();
        assert_eq!(session.progress.len(), 2);
        assert_eq!(session.latest_event().unwrap().progress, 20);
    }

    #[test]
    fn complete_session_is_idempotent_last_write_wins() {
        let mgr = ProgressManager::new();
        let id = mgr.create_session("agent_creation");
        mgr.complete_session(&id, true, Some(json!({"agent_id": "a1"})))
            .unwrap();
        mgr.complete_session(&id, false, Some(json!({"error": "late"})))
            .unwrap();

        let session = mgr.get_session_status(&id).unwrap();
        assert!(session.is_completed());
        assert_eq!(session.success, Some(false));
        assert_eq!(session.result, Some(json!({"error": "late"})));
    }

    #[test]
    fn active_sessions_excludes_completed() {
        let mgr = ProgressManager::new();
        let a = mgr.create_session("agent_creation");
        let b = mgr.create_session("agent_creation");
        mgr.complete_session(&a, true, None).unwrap();

        let active = mgr.get_active_sessions();
        assert_eq!(active, vec![b]);
    }

    #[test]
    fn completed_sessions_remain_fetchable() {
        let mgr = ProgressManager::new();
        let id = mgr.create_session("agent_creation");
        mgr.complete_session(&id, true, None).unwrap();
        assert!(mgr.get_session_status(&id).is_some());
        assert_eq!(mgr.session_count(), 1);
    }

    #[test]
    fn summary_reflects_latest_event() {
        let mgr = ProgressManager::new();
        let id = mgr.create_session("agent_creation");
        assert_eq!(mgr.session_summary(&id).unwrap().event_count, 0);

        mgr.update_progress(&id, "building knowledge base", 40).unwrap();
        let summary = mgr.session_summary(&id).unwrap();
        assert_eq!(
            summary.latest_message.as_deref(),
            Some("building knowledge base")
        );
        assert_eq!(summary.latest_progress, Some(40));
        assert_eq!(summary.event_count, 1);
    }

    #[test]
    fn cleanup_removes_only_old_completed_sessions() {
        let mgr = ProgressManager::new();
        let old = mgr.create_session("agent_creation");
        let fresh = mgr.create_session("agent_creation");
        let running = mgr.create_session("agent_creation");
        mgr.complete_session(&old, true, None).unwrap();
        mgr.complete_session(&fresh, true, None).unwrap();

        // Backdate the old session past the TTL.
        {
            let mut session = mgr.sessions.get_mut(&old).unwrap();
            session.updated_at = "2020-01-01T00:00:00.000Z".into();
        }

        let removed = mgr.cleanup_old_sessions(chrono::Duration::hours(24));
        assert_eq!(removed, 1);
        assert!(mgr.get_session_status(&old).is_none());
        assert!(mgr.get_session_status(&fresh).is_some());
        assert!(mgr.get_session_status(&running).is_some());
    }

    #[test]
    fn cleanup_never_removes_running_sessions() {
        let mgr = ProgressManager::new();
        let running = mgr.create_session("agent_creation");
        {
            let mut session = mgr.sessions.get_mut(&running).unwrap();
            session.updated_at = "2020-01-01T00:00:00.000Z".into();
        }
        assert_eq!(mgr.cleanup_old_sessions(chrono::Duration::hours(1)), 0);
        assert!(mgr.get_session_status(&running).is_some());
    }
}
