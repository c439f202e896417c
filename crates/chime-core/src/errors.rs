//! Error taxonomy for the agent-creation pipeline.
//!
//! Degraded execution is not represented here: a collaborator falling
//! back to its mock variant is a recorded fact on the run, not an error.

use thiserror::Error;

/// Errors surfaced by pipeline orchestration and progress tracking.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The creation request is missing a required field.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A stage name not present in the dependency graph was referenced.
    /// This is a programmer error, never a degraded-mode signal.
    #[error("unknown pipeline stage: {0}")]
    UnknownStage(String),

    /// A collaborator with no fallback failed; the run cannot continue.
    #[error("collaborator '{service}' failed: {reason}")]
    CollaboratorFailure {
        /// Service name as reported in the health registry.
        service: String,
        /// Underlying failure description.
        reason: String,
    },

    /// The run exhausted its wall-clock budget.
    #[error("pipeline timed out after {elapsed_secs}s (budget {budget_secs}s)")]
    Timeout {
        /// Seconds elapsed when the budget check failed.
        elapsed_secs: u64,
        /// Configured budget in seconds.
        budget_secs: u64,
    },

    /// A stage was completed before one of its prerequisites.
    #[error("stage '{stage}' is not ready: prerequisite '{missing}' not completed")]
    StageNotReady {
        /// Stage whose completion was attempted.
        stage: String,
        /// Prerequisite still missing from the completed set.
        missing: String,
    },

    /// A progress update referenced a session that does not exist.
    #[error("progress session not found: {0}")]
    SessionNotFound(String),
}

impl PipelineError {
    /// Stable machine-readable code for wire payloads and metrics labels.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::UnknownStage(_) => "UNKNOWN_STAGE",
            Self::CollaboratorFailure { .. } => "COLLABORATOR_FAILURE",
            Self::Timeout { .. } => "TIMEOUT",
            Self::StageNotReady { .. } => "STAGE_NOT_READY",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
        }
    }
}
