//! Shared collaborator domain types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use chime_core::ids::AgentId;

/// Which implementation of a collaborator is in use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceVariant {
    /// Talking to the outside world.
    Real,
    /// Deterministic in-process fallback.
    Mock,
}

impl ServiceVariant {
    /// Wire label, `"real"` or `"mock"`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Real => "real",
            Self::Mock => "mock",
        }
    }
}

/// Knowledge category a content fragment belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeCategory {
    /// What the business offers.
    Services,
    /// Price lists and rates.
    Pricing,
    /// Opening hours.
    Hours,
    /// Addresses, phone numbers, email.
    Contact,
    /// Frequently asked questions.
    Faq,
    /// Everything else worth keeping.
    General,
}

impl KnowledgeCategory {
    /// All categories, in canonical order.
    pub const ALL: [Self; 6] = [
        Self::Services,
        Self::Pricing,
        Self::Hours,
        Self::Contact,
        Self::Faq,
        Self::General,
    ];
}

/// One piece of text pulled from a crawled page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentFragment {
    /// Category the fragment was filed under.
    pub category: KnowledgeCategory,
    /// Extracted text.
    pub text: String,
    /// Page the fragment came from.
    pub source_url: String,
}

/// Output of a crawl: per-page fragments plus crawl metadata.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlResult {
    /// Root URL the crawl started from.
    pub url: String,
    /// Site title, when one was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Extracted fragments across all visited pages.
    pub fragments: Vec<ContentFragment>,
    /// Number of pages visited.
    pub pages_visited: usize,
}

/// A single knowledge-base entry with its extraction confidence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    /// Entry text.
    pub text: String,
    /// Extraction confidence, 0.0..=1.0.
    pub confidence: f64,
    /// Where the entry came from.
    pub source: String,
}

/// Categorized knowledge base built from crawled content.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    /// Entries grouped by category. `BTreeMap` keeps serialization stable.
    pub entries: BTreeMap<KnowledgeCategory, Vec<KnowledgeEntry>>,
}

impl KnowledgeBase {
    /// A knowledge base with every category present but empty.
    #[must_use]
    pub fn empty() -> Self {
        let mut entries = BTreeMap::new();
        for category in KnowledgeCategory::ALL {
            let _ = entries.insert(category, Vec::new());
        }
        Self { entries }
    }

    /// Total entry count across all categories.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Whether no category has any entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }
}

/// A configured voice for the agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    /// Provider-side voice identifier.
    pub voice_id: String,
    /// Human-readable voice name.
    pub display_name: String,
    /// Which provider configured the voice (`elevenlabs` or `mock`).
    pub provider: String,
}

/// A phone number available for provisioning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AvailableNumber {
    /// E.164 number.
    pub number: String,
    /// Locality hint, when the provider reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
}

/// A number provisioned for an agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProvisionedPhone {
    /// Provider-side resource identifier, used for release.
    pub sid: String,
    /// E.164 number.
    pub number: String,
}

/// The persisted agent record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Agent ID.
    pub agent_id: AgentId,
    /// Owning tenant.
    pub tenant_id: String,
    /// Display name.
    pub name: String,
    /// Opening line, when configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub greeting: Option<String>,
    /// Configured voice, when the voice stage produced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceProfile>,
    /// Provisioned number, when the phone stage produced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    /// Knowledge base the agent answers from.
    pub knowledge_base: KnowledgeBase,
    /// RFC 3339 creation time.
    pub created_at: String,
}
