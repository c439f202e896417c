//! Agent creation request and result types.

use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;
use crate::ids::{AgentId, RunId};

/// Input to `create_agent`.
///
/// `tenant_id` and `agent_name` are required; everything else shapes
/// individual stages (a missing `website_url` skips crawling).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentCreationRequest {
    /// Owning tenant.
    pub tenant_id: String,
    /// Display name for the new agent.
    pub agent_name: String,
    /// Site to crawl for the knowledge base. Optional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    /// Preferred voice, forwarded to the voice collaborator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    /// Preferred area code for phone provisioning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_code: Option<String>,
    /// Opening line the agent speaks when answering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub greeting: Option<String>,
}

impl AgentCreationRequest {
    /// Reject requests missing required identity fields before any stage runs.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.tenant_id.trim().is_empty() {
            return Err(PipelineError::InvalidRequest(
                "tenant_id is required".into(),
            ));
        }
        if self.agent_name.trim().is_empty() {
            return Err(PipelineError::InvalidRequest(
                "agent_name is required".into(),
            ));
        }
        Ok(())
    }
}

/// Terminal outcome of a pipeline run, tagged by `status` on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AgentCreationResult {
    /// All stages completed (possibly with degraded collaborators).
    Success {
        /// The created agent.
        agent_id: AgentId,
        /// Run that produced the agent.
        run_id: RunId,
        /// Provisioned number; `None` when phone service was degraded.
        #[serde(skip_serializing_if = "Option::is_none")]
        phone_number: Option<String>,
        /// Services that fell back to mock behavior during the run.
        degraded_services: Vec<String>,
    },
    /// A stage with no fallback failed; partial resources were rolled back.
    Error {
        /// Failure description.
        error: String,
        /// Run that failed.
        run_id: RunId,
        /// Services that fell back to mock behavior before the failure.
        degraded_services: Vec<String>,
    },
    /// The wall-clock budget ran out before all stages completed.
    Timeout {
        /// Stage names that did complete, in completion order.
        completed_stages: Vec<String>,
        /// Run that timed out.
        run_id: RunId,
        /// Services that fell back to mock behavior during the run.
        degraded_services: Vec<String>,
    },
}

impl AgentCreationResult {
    /// Wire value of the `status` tag.
    #[must_use]
    pub fn status(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Error { .. } => "error",
            Self::Timeout { .. } => "timeout",
        }
    }

    /// Services that degraded during the run, regardless of outcome.
    #[must_use]
    pub fn degraded_services(&self) -> &[String] {
        match self {
            Self::Success {
                degraded_services, ..
            }
            | Self::Error {
                degraded_services, ..
            }
            | Self::Timeout {
                degraded_services, ..
            } => degraded_services,
        }
    }
}
