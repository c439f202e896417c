//! The agent-creation pipeline.
//!
//! Construction probes every collaborator exactly once and freezes the
//! outcome in a [`ServiceHealthRegistry`]. Each run walks the stage graph
//! by ready frontier: all frontier members execute concurrently under
//! their per-stage timeouts, outcomes are committed before the next
//! frontier is computed, and the wall-clock budget is checked before each
//! launch. A collaborator failing at a stage with a fallback degrades the
//! run; a persistence failure aborts it and rolls back created resources.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use parking_lot::Mutex;
use serde_json::json;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use chime_core::agent::{AgentCreationRequest, AgentCreationResult};
use chime_core::errors::PipelineError;
use chime_core::ids::{AgentId, RunId};
use chime_core::timestamp::now_rfc3339;
use chime_services::errors::ServiceError;
use chime_services::selection::{Collaborators, select_collaborators};
use chime_services::types::{
    ContentFragment, CrawlResult, KnowledgeBase, KnowledgeCategory, ProvisionedPhone, VoiceProfile,
};
use chime_services::voice::VoiceSelection;

use crate::coordinator::PipelineCoordinator;
use crate::health::{ServiceHealthRegistry, ServiceStatusReport};
use crate::progress_tracker::{ProgressHandle, ProgressTracker};
use crate::stage::Stage;
use crate::state::{CreatedResource, PipelineState, ResourceKind, StageOutcome};

/// Rollback priorities: external resources release before local rows.
const ROLLBACK_PRIORITY_PHONE: u8 = 10;
const ROLLBACK_PRIORITY_AGENT: u8 = 5;

/// Pipeline tunables, usually derived from `ChimeSettings`.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Wall-clock budget per run.
    pub budget: Duration,
    /// Remaining-budget threshold that triggers a timeout warning.
    pub warning_threshold: Duration,
    /// Confidence floor applied when assembling the knowledge base.
    pub min_confidence: f64,
    /// Serialized knowledge-base size cap.
    pub max_kb_bytes: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            budget: Duration::from_secs(180),
            warning_threshold: Duration::from_secs(30),
            min_confidence: 0.5,
            max_kb_bytes: 64 * 1024,
        }
    }
}

/// Snapshot of a run in flight, served by `get_pipeline_status`.
#[derive(Clone, Debug, serde::Serialize)]
pub struct PipelineRunStatus {
    /// Run ID.
    pub run_id: RunId,
    /// Owning tenant.
    pub tenant_id: String,
    /// RFC 3339 start time.
    pub started_at: String,
    /// Stage names completed so far, in completion order.
    pub completed_stages: Vec<String>,
}

/// Data produced by earlier stages and consumed by later ones.
#[derive(Clone, Default)]
struct RunArtifacts {
    crawl: Option<CrawlResult>,
    fragments: Vec<ContentFragment>,
    knowledge: Option<KnowledgeBase>,
    voice: Option<VoiceProfile>,
    phone: Option<ProvisionedPhone>,
}

/// What one stage execution produced.
enum StageOutput {
    Crawl(CrawlResult),
    Fragments(Vec<ContentFragment>),
    Knowledge(KnowledgeBase),
    Voice(VoiceProfile),
    Phone(Option<ProvisionedPhone>),
    Persisted,
}

/// Multi-stage agent-creation orchestrator.
pub struct AgentCreationPipeline {
    collaborators: Collaborators,
    registry: ServiceHealthRegistry,
    coordinator: PipelineCoordinator,
    config: PipelineConfig,
    tracker: ProgressTracker,
    active_runs: Mutex<HashMap<RunId, Arc<Mutex<PipelineRunStatus>>>>,
}

impl AgentCreationPipeline {
    /// Probe the candidate collaborators and build the pipeline.
    pub async fn new(
        candidates: Collaborators,
        config: PipelineConfig,
        tracker: ProgressTracker,
    ) -> Self {
        let (collaborators, probes) = select_collaborators(candidates).await;
        let registry = ServiceHealthRegistry::from_probes(probes);
        info!(
            healthy = registry.healthy_count(),
            degraded = registry.degraded_count(),
            "pipeline constructed"
        );
        Self {
            collaborators,
            registry,
            coordinator: PipelineCoordinator::new(config.warning_threshold),
            config,
            tracker,
            active_runs: Mutex::new(HashMap::new()),
        }
    }

    /// Construction-time health registry.
    #[must_use]
    pub fn registry(&self) -> &ServiceHealthRegistry {
        &self.registry
    }

    /// Aggregate service status report.
    #[must_use]
    pub fn get_service_status(&self) -> ServiceStatusReport {
        self.registry.report()
    }

    /// The coordinator used for legality queries.
    #[must_use]
    pub fn coordinator(&self) -> &PipelineCoordinator {
        &self.coordinator
    }

    /// Snapshot of an in-flight run, or `None` once it finished.
    #[must_use]
    pub fn get_pipeline_status(&self, run_id: &RunId) -> Option<PipelineRunStatus> {
        self.active_runs
            .lock()
            .get(run_id)
            .map(|status| status.lock().clone())
    }

    /// Number of runs currently executing.
    #[must_use]
    pub fn active_run_count(&self) -> usize {
        self.active_runs.lock().len()
    }

    /// Create an agent end to end.
    ///
    /// Fails fast with `InvalidRequest`; every other outcome is expressed
    /// in the returned [`AgentCreationResult`].
    #[instrument(skip(self, request), fields(tenant_id = %request.tenant_id, agent_name = %request.agent_name))]
    pub async fn create_agent(
        &self,
        request: AgentCreationRequest,
    ) -> Result<AgentCreationResult, PipelineError> {
        request.validate()?;
        let request = Arc::new(request);
        let title = format!("Creating {}", request.agent_name);

        let (_session_id, result) = self
            .tracker
            .track_operation("agent_creation", &title, |handle| {
                let request = Arc::clone(&request);
                async move { self.run_pipeline(request, handle).await }
            })
            .await;

        if let Ok(ref outcome) = result {
            counter!("pipeline_runs_total", "status" => outcome.status()).increment(1);
        }
        result
    }

    async fn run_pipeline(
        &self,
        request: Arc<AgentCreationRequest>,
        handle: ProgressHandle,
    ) -> Result<AgentCreationResult, PipelineError> {
        let mut state = PipelineState::new(&request.tenant_id, self.config.budget);
        let run_id = state.run_id.clone();
        self.register_run(&state);

        let outcome = self.drive(&request, &mut state, &handle).await;
        self.unregister_run(&run_id);

        if let Ok(ref result) = outcome {
            let success = matches!(result, AgentCreationResult::Success { .. });
            let payload = serde_json::to_value(result).ok();
            let _ = handle.complete(success, payload).await;
        }
        outcome
    }

    async fn drive(
        &self,
        request: &Arc<AgentCreationRequest>,
        state: &mut PipelineState,
        handle: &ProgressHandle,
    ) -> Result<AgentCreationResult, PipelineError> {
        let agent_id = AgentId::generate();
        let mut artifacts = RunArtifacts::default();
        let mut last_percent = 0u8;

        report(handle, &mut last_percent, 10, "Pipeline started").await?;

        if request.website_url.is_none() {
            state.complete_stage(
                Stage::WebCrawling,
                StageOutcome {
                    result: json!({ "skipped": true }),
                    duration: Duration::ZERO,
                    finished_at: now_rfc3339(),
                },
            )?;
            report(
                handle,
                &mut last_percent,
                Stage::WebCrawling.completion_percent(),
                "No website provided, skipping crawl",
            )
            .await?;
        }

        loop {
            let frontier = self.coordinator.get_parallel_stages(state);
            if frontier.is_empty() {
                break;
            }
            if self.coordinator.is_out_of_time(state) {
                warn!(run_id = %state.run_id, "budget exhausted before frontier launch");
                return Ok(AgentCreationResult::Timeout {
                    completed_stages: state.completed_stage_names(),
                    run_id: state.run_id.clone(),
                    degraded_services: self.collect_degraded(state),
                });
            }
            if self.coordinator.is_approaching_timeout(state) {
                warn!(
                    run_id = %state.run_id,
                    remaining_secs = self.coordinator.get_time_remaining(state).as_secs(),
                    "approaching pipeline timeout"
                );
            }

            let mut join_set = JoinSet::new();
            for stage in frontier {
                let fut = Self::execute_stage(
                    stage,
                    self.collaborators.clone(),
                    Arc::clone(request),
                    agent_id.clone(),
                    artifacts.clone(),
                    self.config.clone(),
                );
                let cap = stage.timeout();
                let _abort = join_set.spawn(async move {
                    let started = Instant::now();
                    let result = tokio::time::timeout(cap, fut).await;
                    (stage, started.elapsed(), result)
                });
            }

            while let Some(joined) = join_set.join_next().await {
                let Ok((stage, duration, result)) = joined else {
                    // A panicked stage task has no fallback path.
                    self.rollback(state).await;
                    return Ok(AgentCreationResult::Error {
                        error: "stage task failed unexpectedly".into(),
                        run_id: state.run_id.clone(),
                        degraded_services: self.collect_degraded(state),
                    });
                };
                histogram!("pipeline_stage_duration_seconds", "stage" => stage.name())
                    .record(duration.as_secs_f64());

                let (output, fallback_reason) = match result {
                    Ok(Ok(output)) => (output, None),
                    Ok(Err(e)) => {
                        if stage == Stage::AgentPersistence {
                            warn!(run_id = %state.run_id, error = %e, "persistence failed, rolling back");
                            return Ok(self
                                .abort_run(state, stage, format!("agent persistence failed: {e}"))
                                .await);
                        }
                        (Self::fallback_output(stage, request), Some(e.to_string()))
                    }
                    Err(_) => {
                        let reason = format!(
                            "stage timed out after {}s",
                            stage.timeout().as_secs()
                        );
                        if stage == Stage::AgentPersistence {
                            warn!(run_id = %state.run_id, reason, "persistence timed out, rolling back");
                            return Ok(self
                                .abort_run(
                                    state,
                                    stage,
                                    format!("agent persistence failed: {reason}"),
                                )
                                .await);
                        }
                        (Self::fallback_output(stage, request), Some(reason))
                    }
                };

                if let Some(reason) = &fallback_reason {
                    warn!(run_id = %state.run_id, stage = %stage, reason, "stage fell back to mock output");
                    state.mark_degraded(stage.service());
                }

                let summary =
                    Self::apply_output(state, &mut artifacts, stage, output, &agent_id);
                state.complete_stage(
                    stage,
                    StageOutcome {
                        result: json!({
                            "summary": summary,
                            "fallback": fallback_reason,
                        }),
                        duration,
                        finished_at: now_rfc3339(),
                    },
                )?;
                report(
                    handle,
                    &mut last_percent,
                    stage.completion_percent(),
                    &summary,
                )
                .await?;
            }

            self.refresh_run_snapshot(state);
        }

        report(handle, &mut last_percent, 100, "Agent created").await?;
        info!(run_id = %state.run_id, agent_id = %agent_id, "pipeline run succeeded");
        Ok(AgentCreationResult::Success {
            agent_id,
            run_id: state.run_id.clone(),
            phone_number: artifacts.phone.map(|p| p.number),
            degraded_services: self.collect_degraded(state),
        })
    }

    /// Execute one stage against the selected collaborators.
    ///
    /// Owns everything it needs so frontier members can run concurrently.
    async fn execute_stage(
        stage: Stage,
        collab: Collaborators,
        request: Arc<AgentCreationRequest>,
        agent_id: AgentId,
        artifacts: RunArtifacts,
        config: PipelineConfig,
    ) -> Result<StageOutput, ServiceError> {
        match stage {
            Stage::WebCrawling => {
                let url = request.website_url.clone().unwrap_or_default();
                collab.web_crawler.crawl(&url).await.map(StageOutput::Crawl)
            }
            Stage::ContentExtraction => {
                let fragments = artifacts.crawl.map(|c| c.fragments).unwrap_or_default();
                Ok(StageOutput::Fragments(collab.knowledge.validate(fragments)))
            }
            Stage::KnowledgeBaseCreation => {
                let built = collab.knowledge.build(artifacts.fragments);
                let merged =
                    collab
                        .knowledge
                        .merge(KnowledgeBase::empty(), built, config.min_confidence);
                let compressed = collab.knowledge.compress(merged, config.max_kb_bytes);
                Ok(StageOutput::Knowledge(compressed))
            }
            Stage::VoiceConfiguration => {
                let selection = VoiceSelection {
                    voice_id: request.voice_id.clone(),
                };
                collab.voice.configure(&selection).await.map(StageOutput::Voice)
            }
            Stage::PhoneProvisioning => {
                let available = collab.phone.search(request.area_code.as_deref()).await?;
                match available.first() {
                    Some(candidate) => {
                        let provisioned =
                            collab.phone.provision(&candidate.number, &agent_id).await?;
                        Ok(StageOutput::Phone(provisioned))
                    }
                    None => Ok(StageOutput::Phone(None)),
                }
            }
            Stage::AgentPersistence => {
                let record = chime_services::types::AgentRecord {
                    agent_id,
                    tenant_id: request.tenant_id.clone(),
                    name: request.agent_name.clone(),
                    greeting: request.greeting.clone(),
                    voice: artifacts.voice,
                    phone_number: artifacts.phone.map(|p| p.number),
                    knowledge_base: artifacts.knowledge.unwrap_or_else(KnowledgeBase::empty),
                    created_at: now_rfc3339(),
                };
                collab.store.create_agent(&record).await?;
                Ok(StageOutput::Persisted)
            }
        }
    }

    /// Deterministic fallback for a stage whose collaborator failed.
    fn fallback_output(stage: Stage, request: &AgentCreationRequest) -> StageOutput {
        match stage {
            Stage::WebCrawling => {
                let url = request.website_url.clone().unwrap_or_default();
                StageOutput::Crawl(CrawlResult {
                    fragments: vec![ContentFragment {
                        category: KnowledgeCategory::General,
                        text: format!("Placeholder content for {url}; crawling was unavailable."),
                        source_url: url.clone(),
                    }],
                    url,
                    title: None,
                    pages_visited: 0,
                })
            }
            Stage::ContentExtraction => StageOutput::Fragments(Vec::new()),
            Stage::KnowledgeBaseCreation => StageOutput::Knowledge(KnowledgeBase::empty()),
            Stage::VoiceConfiguration => StageOutput::Voice(VoiceProfile {
                voice_id: request
                    .voice_id
                    .clone()
                    .unwrap_or_else(|| "mock-default".into()),
                display_name: "Placeholder voice".into(),
                provider: "mock".into(),
            }),
            Stage::PhoneProvisioning => StageOutput::Phone(None),
            // Persistence has no fallback; callers abort before this.
            Stage::AgentPersistence => StageOutput::Persisted,
        }
    }

    /// Fold a stage output into the artifacts, returning a progress line.
    fn apply_output(
        state: &mut PipelineState,
        artifacts: &mut RunArtifacts,
        stage: Stage,
        output: StageOutput,
        agent_id: &AgentId,
    ) -> String {
        match output {
            StageOutput::Crawl(crawl) => {
                let summary = format!("Crawled {} pages", crawl.pages_visited);
                artifacts.crawl = Some(crawl);
                summary
            }
            StageOutput::Fragments(fragments) => {
                let summary = format!("Extracted {} content fragments", fragments.len());
                artifacts.fragments = fragments;
                summary
            }
            StageOutput::Knowledge(kb) => {
                let summary = format!("Knowledge base ready ({} entries)", kb.entry_count());
                artifacts.knowledge = Some(kb);
                summary
            }
            StageOutput::Voice(profile) => {
                let summary = format!("Voice configured: {}", profile.display_name);
                artifacts.voice = Some(profile);
                summary
            }
            StageOutput::Phone(provisioned) => {
                let summary = match &provisioned {
                    Some(phone) => {
                        state.record_resource(CreatedResource {
                            kind: ResourceKind::PhoneNumber,
                            id: phone.sid.clone(),
                            priority: ROLLBACK_PRIORITY_PHONE,
                        });
                        format!("Provisioned {}", phone.number)
                    }
                    None => "No phone number available".to_string(),
                };
                artifacts.phone = provisioned;
                summary
            }
            StageOutput::Persisted => {
                state.record_resource(CreatedResource {
                    kind: ResourceKind::AgentRecord,
                    id: agent_id.to_string(),
                    priority: ROLLBACK_PRIORITY_AGENT,
                });
                "Agent record persisted".to_string()
            }
        }
    }

    /// Abort the run at `stage`: record the failure, release created
    /// resources, and build the error result.
    async fn abort_run(
        &self,
        state: &mut PipelineState,
        stage: Stage,
        error: String,
    ) -> AgentCreationResult {
        state.fail_stage(stage);
        self.rollback(state).await;
        AgentCreationResult::Error {
            error,
            run_id: state.run_id.clone(),
            degraded_services: self.collect_degraded(state),
        }
    }

    /// Release created resources, highest priority first.
    async fn rollback(&self, state: &mut PipelineState) {
        for resource in state.drain_resources_for_rollback() {
            let released = match resource.kind {
                ResourceKind::PhoneNumber => self
                    .collaborators
                    .phone
                    .release(&resource.id)
                    .await
                    .map(|()| true),
                ResourceKind::AgentRecord => self
                    .collaborators
                    .store
                    .delete_agent(&AgentId::from_string(resource.id.clone()))
                    .await,
            };
            match released {
                Ok(_) => info!(resource_id = %resource.id, "rolled back resource"),
                Err(e) => warn!(resource_id = %resource.id, error = %e, "rollback failed"),
            }
        }
    }

    /// Construction-time degraded services plus runtime degradations.
    fn collect_degraded(&self, state: &PipelineState) -> Vec<String> {
        let mut degraded = self.registry.degraded_names();
        for service in state.degraded_services() {
            if !degraded.contains(service) {
                degraded.push(service.clone());
            }
        }
        degraded
    }

    fn register_run(&self, state: &PipelineState) {
        let status = Arc::new(Mutex::new(PipelineRunStatus {
            run_id: state.run_id.clone(),
            tenant_id: state.tenant_id.clone(),
            started_at: state.started_at.clone(),
            completed_stages: Vec::new(),
        }));
        let mut runs = self.active_runs.lock();
        let _ = runs.insert(state.run_id.clone(), status);
        gauge!("pipeline_runs_active").set(runs.len() as f64);
    }

    fn refresh_run_snapshot(&self, state: &PipelineState) {
        if let Some(status) = self.active_runs.lock().get(&state.run_id) {
            status.lock().completed_stages = state.completed_stage_names();
        }
    }

    fn unregister_run(&self, run_id: &RunId) {
        let mut runs = self.active_runs.lock();
        let _ = runs.remove(run_id);
        gauge!("pipeline_runs_active").set(runs.len() as f64);
    }
}

/// Progress percentages never move backwards within a run, even when
/// parallel stages finish out of order.
async fn report(
    handle: &ProgressHandle,
    last_percent: &mut u8,
    percent: u8,
    message: &str,
) -> Result<(), PipelineError> {
    let clamped = (*last_percent).max(percent);
    *last_percent = clamped;
    handle.update(message, clamped).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress_manager::ProgressManager;
    use crate::progress_tracker::NoopBroadcaster;
    use assert_matches::assert_matches;

    fn tracker() -> ProgressTracker {
        ProgressTracker::new(Arc::new(ProgressManager::new()), Arc::new(NoopBroadcaster))
    }

    async fn mock_pipeline() -> AgentCreationPipeline {
        AgentCreationPipeline::new(
            Collaborators::all_mock(),
            PipelineConfig::default(),
            tracker(),
        )
        .await
    }

    fn request() -> AgentCreationRequest {
        AgentCreationRequest {
            tenant_id: "tenant_1".into(),
            agent_name: "Front Desk".into(),
            website_url: Some("https://example.com".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn invalid_request_fails_before_any_stage() {
        let pipeline = mock_pipeline().await;
        let err = pipeline
            .create_agent(AgentCreationRequest::default())
            .await
            .unwrap_err();
        assert_matches!(err, PipelineError::InvalidRequest(_));
        assert_eq!(pipeline.active_run_count(), 0);
    }

    #[tokio::test]
    async fn all_mock_run_succeeds_without_phone_number() {
        let pipeline = mock_pipeline().await;
        let result = pipeline.create_agent(request()).await.unwrap();
        assert_matches!(
            result,
            AgentCreationResult::Success {
                phone_number: None,
                ..
            }
        );
        assert_eq!(pipeline.active_run_count(), 0);
    }

    #[tokio::test]
    async fn missing_website_skips_crawl_but_still_succeeds() {
        let pipeline = mock_pipeline().await;
        let result = pipeline
            .create_agent(AgentCreationRequest {
                website_url: None,
                ..request()
            })
            .await
            .unwrap();
        assert_eq!(result.status(), "success");
    }

    #[tokio::test]
    async fn service_status_partitions_services() {
        let pipeline = mock_pipeline().await;
        let report = pipeline.get_service_status();
        assert_eq!(report.total_services, 5);
        assert_eq!(
            report.healthy_services + report.degraded_services,
            report.total_services
        );
        // All-mock bundle probes healthy (mock probes never fail).
        assert_eq!(report.pipeline_mode, "production");
    }

    #[tokio::test]
    async fn zero_budget_times_out_before_first_frontier() {
        let pipeline = AgentCreationPipeline::new(
            Collaborators::all_mock(),
            PipelineConfig {
                budget: Duration::ZERO,
                ..PipelineConfig::default()
            },
            tracker(),
        )
        .await;
        let result = pipeline.create_agent(request()).await.unwrap();
        assert_matches!(result, AgentCreationResult::Timeout { completed_stages, .. } => {
            assert!(completed_stages.is_empty());
        });
    }

    #[tokio::test]
    async fn aborted_run_records_the_failed_stage() {
        let pipeline = mock_pipeline().await;
        let mut state = PipelineState::new("tenant_1", Duration::from_secs(180));
        state.record_resource(CreatedResource {
            kind: ResourceKind::PhoneNumber,
            id: "PN_abort".into(),
            priority: ROLLBACK_PRIORITY_PHONE,
        });

        let result = pipeline
            .abort_run(
                &mut state,
                Stage::AgentPersistence,
                "agent persistence failed: disk full".into(),
            )
            .await;

        assert!(state.is_failed(Stage::AgentPersistence));
        // Rollback drained the tracked resources.
        assert!(state.drain_resources_for_rollback().is_empty());
        assert_matches!(result, AgentCreationResult::Error { error, .. } => {
            assert!(error.contains("persistence"));
        });
    }

    #[tokio::test]
    async fn finished_run_has_no_status_entry() {
        let pipeline = mock_pipeline().await;
        let result = pipeline.create_agent(request()).await.unwrap();
        let AgentCreationResult::Success { run_id, .. } = result else {
            panic!("expected success");
        };
        assert!(pipeline.get_pipeline_status(&run_id).is_none());
    }
}
