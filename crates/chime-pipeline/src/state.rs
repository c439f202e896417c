//! Per-run pipeline state.
//!
//! INVARIANT: a stage enters the completed set only after every one of
//! its prerequisites is already a member. [`PipelineState::complete_stage`]
//! enforces this; callers that race ahead get `StageNotReady`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;

use chime_core::errors::PipelineError;
use chime_core::ids::RunId;
use chime_core::timestamp::now_rfc3339;

use crate::stage::Stage;

/// What a completed stage produced.
#[derive(Clone, Debug)]
pub struct StageOutcome {
    /// Stage result payload, stage-specific JSON.
    pub result: Value,
    /// How long the stage ran.
    pub duration: Duration,
    /// RFC 3339 completion time.
    pub finished_at: String,
}

/// A resource created mid-run that must be released if the run aborts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedResource {
    /// What kind of resource this is.
    pub kind: ResourceKind,
    /// Provider-side identifier used for release.
    pub id: String,
    /// Higher priority is released first.
    pub priority: u8,
}

/// Kinds of rollback-tracked resources.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    /// A provisioned phone number (released by SID).
    PhoneNumber,
    /// A persisted agent record (deleted by agent ID).
    AgentRecord,
}

/// Mutable bookkeeping for one pipeline run.
#[derive(Debug)]
pub struct PipelineState {
    /// Run identifier.
    pub run_id: RunId,
    /// Owning tenant.
    pub tenant_id: String,
    /// RFC 3339 start time.
    pub started_at: String,
    budget: Duration,
    started: Instant,
    completed: Vec<Stage>,
    failed: Vec<Stage>,
    outcomes: HashMap<Stage, StageOutcome>,
    degraded: Vec<String>,
    resources: Vec<CreatedResource>,
}

impl PipelineState {
    /// Start tracking a run with the given wall-clock budget.
    #[must_use]
    pub fn new(tenant_id: impl Into<String>, budget: Duration) -> Self {
        Self {
            run_id: RunId::generate(),
            tenant_id: tenant_id.into(),
            started_at: now_rfc3339(),
            budget,
            started: Instant::now(),
            completed: Vec::new(),
            failed: Vec::new(),
            outcomes: HashMap::new(),
            degraded: Vec::new(),
            resources: Vec::new(),
        }
    }

    /// Wall-clock budget for the run.
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Time since the run started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whether `stage` is in the completed set.
    #[must_use]
    pub fn is_completed(&self, stage: Stage) -> bool {
        self.completed.contains(&stage)
    }

    /// Whether `stage` is in the failed set.
    #[must_use]
    pub fn is_failed(&self, stage: Stage) -> bool {
        self.failed.contains(&stage)
    }

    /// Commit a stage completion.
    ///
    /// Rejects double completion and out-of-order completion.
    pub fn complete_stage(
        &mut self,
        stage: Stage,
        outcome: StageOutcome,
    ) -> Result<(), PipelineError> {
        if self.is_completed(stage) {
            return Err(PipelineError::StageNotReady {
                stage: stage.name().into(),
                missing: "already completed".into(),
            });
        }
        if let Some(missing) = stage
            .prerequisites()
            .iter()
            .find(|p| !self.is_completed(**p))
        {
            return Err(PipelineError::StageNotReady {
                stage: stage.name().into(),
                missing: missing.name().into(),
            });
        }
        self.completed.push(stage);
        let _ = self.outcomes.insert(stage, outcome);
        Ok(())
    }

    /// Record a stage failure.
    pub fn fail_stage(&mut self, stage: Stage) {
        if !self.failed.contains(&stage) {
            self.failed.push(stage);
        }
    }

    /// Completed stage names, in completion order.
    #[must_use]
    pub fn completed_stage_names(&self) -> Vec<String> {
        self.completed.iter().map(|s| s.name().to_string()).collect()
    }

    /// Number of completed stages.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    /// Whether every stage in the graph has completed.
    #[must_use]
    pub fn all_stages_completed(&self) -> bool {
        self.completed.len() == Stage::ALL.len()
    }

    /// Outcome of a completed stage.
    #[must_use]
    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.outcomes.get(&stage)
    }

    /// Record that a service fell back to mock behavior during this run.
    pub fn mark_degraded(&mut self, service: &str) {
        if !self.degraded.iter().any(|s| s == service) {
            self.degraded.push(service.to_string());
        }
    }

    /// Services that degraded during this run, in first-degradation order.
    #[must_use]
    pub fn degraded_services(&self) -> &[String] {
        &self.degraded
    }

    /// Track a resource for rollback.
    pub fn record_resource(&mut self, resource: CreatedResource) {
        self.resources.push(resource);
    }

    /// Drain tracked resources, highest priority first.
    #[must_use]
    pub fn drain_resources_for_rollback(&mut self) -> Vec<CreatedResource> {
        let mut resources = std::mem::take(&mut self.resources);
        resources.sort_by(|a, b| b.priority.cmp(&a.priority));
        resources
    }
}
