//! Stage legality and timing queries.
//!
//! The coordinator never executes anything. It answers three questions
//! about a run: may this stage start, which stages may start right now,
//! and how much budget is left.

use std::time::Duration;

use chime_core::errors::PipelineError;

use crate::stage::Stage;
use crate::state::PipelineState;

/// Read-only view over the stage graph and a run's clock.
#[derive(Clone, Debug)]
pub struct PipelineCoordinator {
    warning_threshold: Duration,
}

impl PipelineCoordinator {
    /// Create a coordinator that warns when remaining budget drops to
    /// `warning_threshold`.
    #[must_use]
    pub fn new(warning_threshold: Duration) -> Self {
        Self { warning_threshold }
    }

    /// Whether `stage_name` may execute now: all prerequisites completed
    /// and the stage itself neither completed nor failed.
    ///
    /// An unknown stage name is a programmer error, not a legality answer.
    pub fn can_execute_stage(
        &self,
        state: &PipelineState,
        stage_name: &str,
    ) -> Result<bool, PipelineError> {
        let stage: Stage = stage_name.parse()?;
        Ok(Self::is_ready(state, stage))
    }

    /// Every stage that may start right now: the ready frontier.
    ///
    /// Members are mutually independent by construction of the graph, so
    /// callers may run the whole frontier concurrently.
    #[must_use]
    pub fn get_parallel_stages(&self, state: &PipelineState) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|stage| Self::is_ready(state, *stage))
            .collect()
    }

    /// Remaining wall-clock budget, saturating at zero.
    #[must_use]
    pub fn get_time_remaining(&self, state: &PipelineState) -> Duration {
        state.budget().saturating_sub(state.elapsed())
    }

    /// Whether the remaining budget has dropped to the warning threshold.
    #[must_use]
    pub fn is_approaching_timeout(&self, state: &PipelineState) -> bool {
        self.get_time_remaining(state) <= self.warning_threshold
    }

    /// Whether the budget is exhausted.
    #[must_use]
    pub fn is_out_of_time(&self, state: &PipelineState) -> bool {
        self.get_time_remaining(state).is_zero()
    }

    fn is_ready(state: &PipelineState, stage: Stage) -> bool {
        !state.is_completed(stage)
            && !state.is_failed(stage)
            && stage
                .prerequisites()
                .iter()
                .all(|p| state.is_completed(*p))
    }
}

impl Default for PipelineCoordinator {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chime_core::timestamp::now_rfc3339;
    use serde_json::json;

    use crate::state::StageOutcome;

    fn outcome() -> StageOutcome {
        StageOutcome {
            result: json!({}),
            duration: Duration::from_millis(1),
            finished_at: now_rfc3339(),
        }
    }

    fn state() -> PipelineState {
        PipelineState::new("tenant_1", Duration::from_secs(180))
    }

    fn complete(state: &mut PipelineState, stages: &[Stage]) {
        for stage in stages {
            state.complete_stage(*stage, outcome()).unwrap();
        }
    }

    #[test]
    fn fresh_run_frontier_is_crawling_only() {
        let coord = PipelineCoordinator::default();
        assert_eq!(
            coord.get_parallel_stages(&state()),
            vec![Stage::WebCrawling]
        );
    }

    #[test]
    fn can_execute_follows_prerequisites() {
        let coord = PipelineCoordinator::default();
        let mut s = state();
        assert!(coord.can_execute_stage(&s, "web_crawling").unwrap());
        assert!(!coord.can_execute_stage(&s, "content_extraction").unwrap());

        complete(&mut s, &[Stage::WebCrawling]);
        assert!(coord.can_execute_stage(&s, "content_extraction").unwrap());
        // A completed stage is no longer executable.
        assert!(!coord.can_execute_stage(&s, "web_crawling").unwrap());
    }

    #[test]
    fn unknown_stage_name_errors() {
        let coord = PipelineCoordinator::default();
        assert_matches!(
            coord.can_execute_stage(&state(), "dns_setup"),
            Err(PipelineError::UnknownStage(_))
        );
    }

    #[test]
    fn frontier_after_knowledge_base_is_voice_and_phone() {
        let coord = PipelineCoordinator::default();
        let mut s = state();
        complete(
            &mut s,
            &[
                Stage::WebCrawling,
                Stage::ContentExtraction,
                Stage::KnowledgeBaseCreation,
            ],
        );
        let frontier = coord.get_parallel_stages(&s);
        assert_eq!(
            frontier,
            vec![Stage::VoiceConfiguration, Stage::PhoneProvisioning]
        );
    }

    #[test]
    fn persistence_waits_for_both_parallel_arms() {
        let coord = PipelineCoordinator::default();
        let mut s = state();
        complete(
            &mut s,
            &[
                Stage::WebCrawling,
                Stage::ContentExtraction,
                Stage::KnowledgeBaseCreation,
                Stage::VoiceConfiguration,
            ],
        );
        assert_eq!(
            coord.get_parallel_stages(&s),
            vec![Stage::PhoneProvisioning]
        );

        complete(&mut s, &[Stage::PhoneProvisioning]);
        assert_eq!(coord.get_parallel_stages(&s), vec![Stage::AgentPersistence]);
    }

    #[test]
    fn frontier_is_empty_when_all_complete() {
        let coord = PipelineCoordinator::default();
        let mut s = state();
        complete(&mut s, &Stage::ALL);
        assert!(coord.get_parallel_stages(&s).is_empty());
    }

    #[test]
    fn failed_stage_leaves_frontier() {
        let coord = PipelineCoordinator::default();
        let mut s = state();
        s.fail_stage(Stage::WebCrawling);
        assert!(coord.get_parallel_stages(&s).is_empty());
        assert!(!coord.can_execute_stage(&s, "web_crawling").unwrap());
    }

    #[test]
    fn time_remaining_saturates_at_zero() {
        let coord = PipelineCoordinator::default();
        let s = PipelineState::new("tenant_1", Duration::ZERO);
        assert_eq!(coord.get_time_remaining(&s), Duration::ZERO);
        assert!(coord.is_out_of_time(&s));
        assert!(coord.is_approaching_timeout(&s));
    }

    #[tokio::test]
    async fn time_remaining_never_increases() {
        let coord = PipelineCoordinator::default();
        let s = state();
        let first = coord.get_time_remaining(&s);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = coord.get_time_remaining(&s);
        assert!(second <= first);
    }

    #[test]
    fn generous_budget_is_not_approaching_timeout() {
        let coord = PipelineCoordinator::default();
        let s = state();
        assert!(!coord.is_approaching_timeout(&s));
        assert!(!coord.is_out_of_time(&s));
        assert!(coord.get_time_remaining(&s) > Duration::from_secs(170));
    }
}
