//! The stage graph.
//!
//! Six stages with a fixed prerequisite table:
//!
//! ```text
//! web_crawling → content_extraction → knowledge_base_creation
//!                                       ├→ voice_configuration ─┐
//!                                       └→ phone_provisioning ──┴→ agent_persistence
//! ```
//!
//! Voice and phone share the same prerequisite and no edge between them,
//! so they form the parallel frontier once the knowledge base exists.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use chime_core::errors::PipelineError;

/// One stage of the agent-creation pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Crawl the tenant's website.
    WebCrawling,
    /// Extract and validate content fragments.
    ContentExtraction,
    /// Build the knowledge base.
    KnowledgeBaseCreation,
    /// Configure the agent's voice.
    VoiceConfiguration,
    /// Search and purchase a phone number.
    PhoneProvisioning,
    /// Persist the finished agent record.
    AgentPersistence,
}

impl Stage {
    /// All stages, in canonical (topological) order.
    pub const ALL: [Self; 6] = [
        Self::WebCrawling,
        Self::ContentExtraction,
        Self::KnowledgeBaseCreation,
        Self::VoiceConfiguration,
        Self::PhoneProvisioning,
        Self::AgentPersistence,
    ];

    /// Wire name of the stage.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::WebCrawling => "web_crawling",
            Self::ContentExtraction => "content_extraction",
            Self::KnowledgeBaseCreation => "knowledge_base_creation",
            Self::VoiceConfiguration => "voice_configuration",
            Self::PhoneProvisioning => "phone_provisioning",
            Self::AgentPersistence => "agent_persistence",
        }
    }

    /// Stages that must complete before this one may start.
    #[must_use]
    pub fn prerequisites(self) -> &'static [Self] {
        match self {
            Self::WebCrawling => &[],
            Self::ContentExtraction => &[Self::WebCrawling],
            Self::KnowledgeBaseCreation => &[Self::ContentExtraction],
            Self::VoiceConfiguration | Self::PhoneProvisioning => {
                &[Self::KnowledgeBaseCreation]
            }
            Self::AgentPersistence => &[Self::VoiceConfiguration, Self::PhoneProvisioning],
        }
    }

    /// Per-stage wall-clock cap.
    #[must_use]
    pub fn timeout(self) -> Duration {
        let secs = match self {
            Self::WebCrawling => 45,
            Self::ContentExtraction => 30,
            Self::KnowledgeBaseCreation => 15,
            Self::VoiceConfiguration => 20,
            Self::PhoneProvisioning => 25,
            Self::AgentPersistence => 15,
        };
        Duration::from_secs(secs)
    }

    /// Run progress once this stage completes, percent.
    #[must_use]
    pub fn completion_percent(self) -> u8 {
        match self {
            Self::WebCrawling => 20,
            Self::ContentExtraction => 40,
            Self::KnowledgeBaseCreation => 60,
            Self::VoiceConfiguration => 75,
            Self::PhoneProvisioning => 80,
            Self::AgentPersistence => 95,
        }
    }

    /// Collaborator this stage depends on, as a health-registry name.
    #[must_use]
    pub fn service(self) -> &'static str {
        match self {
            Self::WebCrawling => "web_crawler",
            Self::ContentExtraction | Self::KnowledgeBaseCreation => "knowledge_service",
            Self::VoiceConfiguration => "voice_service",
            Self::PhoneProvisioning => "phone_service",
            Self::AgentPersistence => "persistence",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.name() == s)
            .ok_or_else(|| PipelineError::UnknownStage(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn names_round_trip() {
        for stage in Stage::ALL {
            assert_eq!(stage.name().parse::<Stage>().unwrap(), stage);
        }
    }

    #[test]
    fn unknown_name_is_an_error() {
        assert_matches!(
            "dns_setup".parse::<Stage>(),
            Err(PipelineError::UnknownStage(name)) => assert_eq!(name, "dns_setup")
        );
    }

    #[test]
    fn graph_is_acyclic_in_canonical_order() {
        // Every prerequisite appears earlier in ALL than its dependent.
        for (i, stage) in Stage::ALL.iter().enumerate() {
            for prereq in stage.prerequisites() {
                let j = Stage::ALL.iter().position(|s| s == prereq).unwrap();
                assert!(j < i, "{prereq} must precede {stage}");
            }
        }
    }

    #[test]
    fn voice_and_phone_are_independent() {
        assert!(!Stage::VoiceConfiguration
            .prerequisites()
            .contains(&Stage::PhoneProvisioning));
        assert!(!Stage::PhoneProvisioning
            .prerequisites()
            .contains(&Stage::VoiceConfiguration));
        assert_eq!(
            Stage::VoiceConfiguration.prerequisites(),
            Stage::PhoneProvisioning.prerequisites()
        );
    }

    #[test]
    fn persistence_waits_for_both_parallel_stages() {
        let prereqs = Stage::AgentPersistence.prerequisites();
        assert!(prereqs.contains(&Stage::VoiceConfiguration));
        assert!(prereqs.contains(&Stage::PhoneProvisioning));
    }

    #[test]
    fn completion_percent_is_monotonic_in_canonical_order() {
        let mut last = 0;
        for stage in Stage::ALL {
            assert!(stage.completion_percent() >= last);
            last = stage.completion_percent();
        }
        assert!(last < 100, "100 is reserved for run completion");
    }

    #[test]
    fn stage_timeouts_fit_run_budget() {
        let serial_worst: u64 = [
            Stage::WebCrawling,
            Stage::ContentExtraction,
            Stage::KnowledgeBaseCreation,
            Stage::PhoneProvisioning,
            Stage::AgentPersistence,
        ]
        .iter()
        .map(|s| s.timeout().as_secs())
        .sum();
        // Worst serial path (phone is the longer parallel arm) stays
        // inside the 180s default budget.
        assert!(serial_worst <= 180);
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&Stage::KnowledgeBaseCreation).unwrap();
        assert_eq!(json, "\"knowledge_base_creation\"");
    }
}
