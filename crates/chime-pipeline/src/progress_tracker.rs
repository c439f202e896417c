//! Scoped progress tracking.
//!
//! [`ProgressTracker::track_operation`] wraps an async operation in a
//! progress session and guarantees the session reaches a terminal state:
//! explicit completion inside the scope wins, an `Ok` without one
//! auto-completes as success, an `Err` auto-completes as failure with the
//! error description, and a dropped future is marked abandoned by a drop
//! guard. Broadcasting goes through the [`ProgressBroadcaster`] seam so
//! this crate stays transport-free.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, warn};

use chime_core::errors::PipelineError;
use chime_core::ids::SessionId;
use chime_core::progress::ProgressSession;

use crate::progress_manager::ProgressManager;

/// Fan-out seam between progress tracking and transports.
#[async_trait]
pub trait ProgressBroadcaster: Send + Sync {
    /// A session gained a progress event.
    async fn progress_updated(&self, session: &ProgressSession);

    /// A session reached its terminal state.
    async fn session_completed(&self, session: &ProgressSession);
}

/// Broadcaster that drops everything. For tests and headless use.
pub struct NoopBroadcaster;

#[async_trait]
impl ProgressBroadcaster for NoopBroadcaster {
    async fn progress_updated(&self, _session: &ProgressSession) {}
    async fn session_completed(&self, _session: &ProgressSession) {}
}

/// Handle passed into a tracked scope for reporting progress.
#[derive(Clone)]
pub struct ProgressHandle {
    manager: Arc<ProgressManager>,
    broadcaster: Arc<dyn ProgressBroadcaster>,
    session_id: SessionId,
    completed: Arc<AtomicBool>,
}

impl ProgressHandle {
    /// The session this handle reports into.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Record and broadcast a progress event.
    pub async fn update(&self, message: &str, percent: u8) -> Result<(), PipelineError> {
        self.manager
            .update_progress(&self.session_id, message, percent)?;
        if let Some(session) = self.manager.get_session_status(&self.session_id) {
            self.broadcaster.progress_updated(&session).await;
        }
        Ok(())
    }

    /// Record and broadcast terminal completion.
    ///
    /// Calling this inside the scope suppresses auto-completion.
    pub async fn complete(
        &self,
        success: bool,
        result: Option<Value>,
    ) -> Result<(), PipelineError> {
        self.manager
            .complete_session(&self.session_id, success, result)?;
        self.completed.store(true, Ordering::SeqCst);
        if let Some(session) = self.manager.get_session_status(&self.session_id) {
            self.broadcaster.session_completed(&session).await;
        }
        Ok(())
    }
}

/// Marks the session failed if the tracked future is dropped mid-flight.
struct AbandonGuard {
    manager: Arc<ProgressManager>,
    session_id: SessionId,
    completed: Arc<AtomicBool>,
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if !self.completed.load(Ordering::SeqCst) {
            warn!(session_id = %self.session_id, "tracked operation abandoned");
            let _ = self.manager.complete_session(
                &self.session_id,
                false,
                Some(json!({"error": "operation abandoned"})),
            );
        }
    }
}

/// Creates progress sessions scoped to async operations.
#[derive(Clone)]
pub struct ProgressTracker {
    manager: Arc<ProgressManager>,
    broadcaster: Arc<dyn ProgressBroadcaster>,
}

impl ProgressTracker {
    /// Create a tracker over the given session table and broadcast seam.
    #[must_use]
    pub fn new(manager: Arc<ProgressManager>, broadcaster: Arc<dyn ProgressBroadcaster>) -> Self {
        Self {
            manager,
            broadcaster,
        }
    }

    /// The underlying session table.
    #[must_use]
    pub fn manager(&self) -> &Arc<ProgressManager> {
        &self.manager
    }

    /// Run `f` inside a fresh progress session.
    ///
    /// The session starts with a 0% event carrying `title` and is
    /// guaranteed to complete on every exit path. Returns the session ID
    /// alongside the operation's own result.
    pub async fn track_operation<F, Fut, T, E>(
        &self,
        operation_type: &str,
        title: &str,
        f: F,
    ) -> (SessionId, Result<T, E>)
    where
        F: FnOnce(ProgressHandle) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let session_id = self.manager.create_session(operation_type);
        let completed = Arc::new(AtomicBool::new(false));
        let handle = ProgressHandle {
            manager: Arc::clone(&self.manager),
            broadcaster: Arc::clone(&self.broadcaster),
            session_id: session_id.clone(),
            completed: Arc::clone(&completed),
        };
        let _guard = AbandonGuard {
            manager: Arc::clone(&self.manager),
            session_id: session_id.clone(),
            completed: Arc::clone(&completed),
        };

        if handle.update(title, 0).await.is_ok() {
            debug!(session_id = %session_id, operation_type, "tracking started");
        }

        let result = f(handle.clone()).await;

        if !completed.load(Ordering::SeqCst) {
            match &result {
                Ok(_) => {
                    let _ = handle.complete(true, None).await;
                }
                Err(e) => {
                    let _ = handle
                        .complete(false, Some(json!({"error": e.to_string()})))
                        .await;
                }
            }
        }

        (session_id, result)
    }
}
