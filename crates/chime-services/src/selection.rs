//! Probe-and-fallback collaborator selection.
//!
//! Each candidate client is probed exactly once. A failed probe swaps in
//! the mock variant for the rest of the process lifetime; the probe
//! outcome is recorded so the pipeline can report which services are
//! degraded.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::crawler::{MockWebCrawler, WebCrawler};
use crate::knowledge::{KnowledgeService, MockKnowledgeService};
use crate::phone::{MockPhoneService, PhoneService};
use crate::store::{AgentStore, MockAgentStore};
use crate::voice::{MockVoiceService, VoiceService};

/// Canonical service names, in reporting order.
pub const SERVICE_NAMES: [&str; 5] = [
    "web_crawler",
    "knowledge_service",
    "voice_service",
    "phone_service",
    "persistence",
];

/// The five collaborators a pipeline runs against.
#[derive(Clone)]
pub struct Collaborators {
    /// Website crawling.
    pub web_crawler: Arc<dyn WebCrawler>,
    /// Knowledge-base construction.
    pub knowledge: Arc<dyn KnowledgeService>,
    /// Voice configuration.
    pub voice: Arc<dyn VoiceService>,
    /// Phone provisioning.
    pub phone: Arc<dyn PhoneService>,
    /// Agent persistence.
    pub store: Arc<dyn AgentStore>,
}

impl Collaborators {
    /// All-mock bundle, for tests and fully-degraded operation.
    #[must_use]
    pub fn all_mock() -> Self {
        Self {
            web_crawler: Arc::new(MockWebCrawler),
            knowledge: Arc::new(MockKnowledgeService),
            voice: Arc::new(MockVoiceService),
            phone: Arc::new(MockPhoneService),
            store: Arc::new(MockAgentStore::new()),
        }
    }
}

/// Outcome of probing one candidate service.
#[derive(Clone, Debug, Serialize)]
pub struct ServiceProbe {
    /// Canonical service name.
    pub name: &'static str,
    /// Whether the real client answered its probe.
    pub healthy: bool,
    /// Probe failure description, when unhealthy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Probe every candidate, substituting mocks for failures.
///
/// Returns the selected bundle plus one probe record per service, in
/// [`SERVICE_NAMES`] order.
pub async fn select_collaborators(candidates: Collaborators) -> (Collaborators, Vec<ServiceProbe>) {
    let mut probes = Vec::with_capacity(SERVICE_NAMES.len());

    let web_crawler: Arc<dyn WebCrawler> = match candidates.web_crawler.probe().await {
        Ok(()) => {
            probes.push(healthy("web_crawler"));
            candidates.web_crawler
        }
        Err(e) => {
            probes.push(degraded("web_crawler", &e.to_string()));
            Arc::new(MockWebCrawler)
        }
    };

    let knowledge: Arc<dyn KnowledgeService> = match candidates.knowledge.probe().await {
        Ok(()) => {
            probes.push(healthy("knowledge_service"));
            candidates.knowledge
        }
        Err(e) => {
            probes.push(degraded("knowledge_service", &e.to_string()));
            Arc::new(MockKnowledgeService)
        }
    };

    let voice: Arc<dyn VoiceService> = match candidates.voice.probe().await {
        Ok(()) => {
            probes.push(healthy("voice_service"));
            candidates.voice
        }
        Err(e) => {
            probes.push(degraded("voice_service", &e.to_string()));
            Arc::new(MockVoiceService)
        }
    };

    let phone: Arc<dyn PhoneService> = match candidates.phone.probe().await {
        Ok(()) => {
            probes.push(healthy("phone_service"));
            candidates.phone
        }
        Err(e) => {
            probes.push(degraded("phone_service", &e.to_string()));
            Arc::new(MockPhoneService)
        }
    };

    let store: Arc<dyn AgentStore> = match candidates.store.probe().await {
        Ok(()) => {
            probes.push(healthy("persistence"));
            candidates.store
        }
        Err(e) => {
            probes.push(degraded("persistence", &e.to_string()));
            Arc::new(MockAgentStore::new())
        }
    };

    (
        Collaborators {
            web_crawler,
            knowledge,
            voice,
            phone,
            store,
        },
        probes,
    )
}

fn healthy(name: &'static str) -> ServiceProbe {
    info!(service = name, "collaborator healthy");
    ServiceProbe {
        name,
        healthy: true,
        reason: None,
    }
}

fn degraded(name: &'static str, reason: &str) -> ServiceProbe {
    warn!(service = name, reason, "collaborator degraded, using mock");
    ServiceProbe {
        name,
        healthy: false,
        reason: Some(reason.to_string()),
    }
}
