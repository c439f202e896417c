//! Knowledge-base collaborator.
//!
//! Turns crawled fragments into a categorized knowledge base: validation,
//! merging with a confidence floor, and size-bounded compression. Runs
//! fully in-process; the mock variant produces an empty knowledge base so
//! a degraded pipeline still persists a well-formed agent.

use async_trait::async_trait;
use tracing::debug;

use crate::errors::ServiceError;
use crate::types::{ContentFragment, KnowledgeBase, KnowledgeEntry, ServiceVariant};

/// Default confidence assigned to fragments that pass validation.
const DEFAULT_CONFIDENCE: f64 = 0.8;

/// Builds and maintains agent knowledge bases.
#[async_trait]
pub trait KnowledgeService: Send + Sync {
    /// Which implementation this is.
    fn variant(&self) -> ServiceVariant;

    /// Cheap health check, called once at pipeline construction.
    async fn probe(&self) -> Result<(), ServiceError>;

    /// Drop fragments that are empty or duplicated.
    fn validate(&self, fragments: Vec<ContentFragment>) -> Vec<ContentFragment>;

    /// Build a knowledge base from validated fragments.
    fn build(&self, fragments: Vec<ContentFragment>) -> KnowledgeBase;

    /// Merge `incoming` into `existing`, keeping entries at or above
    /// `min_confidence` and preferring higher-confidence duplicates.
    fn merge(
        &self,
        existing: KnowledgeBase,
        incoming: KnowledgeBase,
        min_confidence: f64,
    ) -> KnowledgeBase;

    /// Shrink `kb` until its serialized size fits in `max_bytes`,
    /// dropping lowest-confidence entries first.
    fn compress(&self, kb: KnowledgeBase, max_bytes: usize) -> KnowledgeBase;

    /// Serialized size of the knowledge base in bytes.
    fn size_of(&self, kb: &KnowledgeBase) -> usize {
        serde_json::to_vec(kb).map(|v| v.len()).unwrap_or(0)
    }
}

/// In-process knowledge engine.
pub struct StandardKnowledgeService;

#[async_trait]
impl KnowledgeService for StandardKnowledgeService {
    fn variant(&self) -> ServiceVariant {
        ServiceVariant::Real
    }

    async fn probe(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    fn validate(&self, fragments: Vec<ContentFragment>) -> Vec<ContentFragment> {
        let mut seen = std::collections::HashSet::new();
        fragments
            .into_iter()
            .filter(|f| !f.text.trim().is_empty())
            .filter(|f| seen.insert(f.text.clone()))
            .collect()
    }

    fn build(&self, fragments: Vec<ContentFragment>) -> KnowledgeBase {
        let mut kb = KnowledgeBase::empty();
        for fragment in self.validate(fragments) {
            kb.entries
                .entry(fragment.category)
                .or_default()
                .push(KnowledgeEntry {
                    text: fragment.text,
                    confidence: DEFAULT_CONFIDENCE,
                    source: fragment.source_url,
                });
        }
        debug!(entries = kb.entry_count(), "knowledge base built");
        kb
    }

    fn merge(
        &self,
        existing: KnowledgeBase,
        incoming: KnowledgeBase,
        min_confidence: f64,
    ) -> KnowledgeBase {
        let mut merged = existing;
        for (category, entries) in incoming.entries {
            let slot = merged.entries.entry(category).or_default();
            for entry in entries {
                if entry.confidence < min_confidence {
                    continue;
                }
                match slot.iter_mut().find(|e| e.text == entry.text) {
                    Some(dup) if dup.confidence < entry.confidence => *dup = entry,
                    Some(_) => {}
                    None => slot.push(entry),
                }
            }
        }
        merged
            .entries
            .values_mut()
            .for_each(|v| v.retain(|e| e.confidence >= min_confidence));
        merged
    }

    fn compress(&self, mut kb: KnowledgeBase, max_bytes: usize) -> KnowledgeBase {
        while self.size_of(&kb) > max_bytes {
            // Find the globally lowest-confidence entry and drop it.
            let weakest = kb
                .entries
                .iter()
                .flat_map(|(category, entries)| {
                    entries
                        .iter()
                        .enumerate()
                        .map(move |(i, e)| (*category, i, e.confidence))
                })
                .min_by(|a, b| a.2.total_cmp(&b.2));
            match weakest {
                Some((category, index, _)) => {
                    if let Some(entries) = kb.entries.get_mut(&category) {
                        let _ = entries.remove(index);
                    }
                }
                None => break,
            }
        }
        kb
    }
}

/// Mock knowledge engine: always produces an empty knowledge base.
pub struct MockKnowledgeService;

#[async_trait]
impl KnowledgeService for MockKnowledgeService {
    fn variant(&self) -> ServiceVariant {
        ServiceVariant::Mock
    }

    async fn probe(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    fn validate(&self, fragments: Vec<ContentFragment>) -> Vec<ContentFragment> {
        fragments
    }

    fn build(&self, _fragments: Vec<ContentFragment>) -> KnowledgeBase {
        KnowledgeBase::empty()
    }

    fn merge(
        &self,
        existing: KnowledgeBase,
        _incoming: KnowledgeBase,
        _min_confidence: f64,
    ) -> KnowledgeBase {
        existing
    }

    fn compress(&self, kb: KnowledgeBase, _max_bytes: usize) -> KnowledgeBase {
        kb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KnowledgeCategory;

    fn fragment(category: KnowledgeCategory, text: &str) -> ContentFragment {
        ContentFragment {
            category,
            text: text.into(),
            source_url: "https://example.com".into(),
        }
    }

    fn entry(text: &str, confidence: f64) -> KnowledgeEntry {
        KnowledgeEntry {
            text: text.into(),
            confidence,
            source: "https://example.com".into(),
        }
    }

    #[test]
    fn validate_drops_empty_and_duplicate_fragments() {
        let svc = StandardKnowledgeService;
        let fragments = vec![
            fragment(KnowledgeCategory::Services, "haircuts and styling"),
            fragment(KnowledgeCategory::Services, "   "),
            fragment(KnowledgeCategory::Services, "haircuts and styling"),
            fragment(KnowledgeCategory::Hours, "open 9 to 5"),
        ];
        let valid = svc.validate(fragments);
        assert_eq!(valid.len(), 2);
    }

    #[test]
    fn build_files_fragments_by_category() {
        let svc = StandardKnowledgeService;
        let kb = svc.build(vec![
            fragment(KnowledgeCategory::Pricing, "cuts start at $25"),
            fragment(KnowledgeCategory::Pricing, "color from $80"),
            fragment(KnowledgeCategory::Hours, "open 9 to 5"),
        ]);
        assert_eq!(kb.entries[&KnowledgeCategory::Pricing].len(), 2);
        assert_eq!(kb.entries[&KnowledgeCategory::Hours].len(), 1);
        assert_eq!(kb.entry_count(), 3);
    }

    #[test]
    fn merge_honors_confidence_floor() {
        let svc = StandardKnowledgeService;
        let mut existing = KnowledgeBase::empty();
        existing
            .entries
            .get_mut(&KnowledgeCategory::Services)
            .unwrap()
            .push(entry("haircuts", 0.9));

        let mut incoming = KnowledgeBase::empty();
        incoming
            .entries
            .get_mut(&KnowledgeCategory::Services)
            .unwrap()
            .extend([entry("styling", 0.7), entry("rumor", 0.2)]);

        let merged = svc.merge(existing, incoming, 0.5);
        let services = &merged.entries[&KnowledgeCategory::Services];
        assert_eq!(services.len(), 2);
        assert!(services.iter().all(|e| e.confidence >= 0.5));
    }

    #[test]
    fn merge_prefers_higher_confidence_duplicate() {
        let svc = StandardKnowledgeService;
        let mut existing = KnowledgeBase::empty();
        existing
            .entries
            .get_mut(&KnowledgeCategory::Faq)
            .unwrap()
            .push(entry("do you take walk-ins?", 0.6));

        let mut incoming = KnowledgeBase::empty();
        incoming
            .entries
            .get_mut(&KnowledgeCategory::Faq)
            .unwrap()
            .push(entry("do you take walk-ins?", 0.95));

        let merged = svc.merge(existing, incoming, 0.5);
        let faq = &merged.entries[&KnowledgeCategory::Faq];
        assert_eq!(faq.len(), 1);
        assert!((faq[0].confidence - 0.95).abs() < f64::EPSILON);
    }

    #[test]
    fn compress_drops_lowest_confidence_first() {
        let svc = StandardKnowledgeService;
        let mut kb = KnowledgeBase::empty();
        kb.entries
            .get_mut(&KnowledgeCategory::General)
            .unwrap()
            .extend([
                entry("keep me, high confidence content here", 0.95),
                entry("drop me first, low confidence filler", 0.1),
            ]);
        let full_size = svc.size_of(&kb);

        let compressed = svc.compress(kb, full_size - 10);
        let general = &compressed.entries[&KnowledgeCategory::General];
        assert_eq!(general.len(), 1);
        assert!((general[0].confidence - 0.95).abs() < f64::EPSILON);
    }

    #[test]
    fn compress_on_empty_kb_terminates() {
        let svc = StandardKnowledgeService;
        let kb = svc.compress(KnowledgeBase::empty(), 1);
        assert!(kb.is_empty());
    }

    #[test]
    fn mock_builds_empty_kb() {
        let svc = MockKnowledgeService;
        let kb = svc.build(vec![fragment(KnowledgeCategory::Services, "ignored")]);
        assert!(kb.is_empty());
        assert_eq!(svc.variant(), ServiceVariant::Mock);
    }
}
