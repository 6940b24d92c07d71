//! The cross-evidence correlation analyzer.

use crate::canonical::{Cluster, Mention, cluster_mentions};
use crate::{CorrelateResult, sequences, timeline};
use chrono::Utc;
use evidentia_core::{
    CorrelatedEntity, CorrelationAnalysis, EntityType, EvidenceOccurrence, LegalPatternAnalysis,
    UnifiedAnalysis, round4,
};
use evidentia_analyze::{CaseType, prompts};
use evidentia_llm::{LlmProvider, StructuredRequest};
use evidentia_store::EvidenceStore;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Tuning for a correlation run.
#[derive(Debug, Clone)]
pub struct CorrelationOptions {
    /// Window around a sequence anchor, in hours.
    pub temporal_window_hours: i64,
    /// Ask the LLM to arbitrate ambiguous entity clusters.
    pub ai_entity_resolution: bool,
    /// Ask the LLM for cross-evidence legal patterns.
    pub ai_legal_patterns: bool,
    pub case_type: CaseType,
    pub model: String,
}

impl Default for CorrelationOptions {
    fn default() -> Self {
        Self {
            temporal_window_hours: sequences::DEFAULT_TEMPORAL_WINDOW_HOURS,
            ai_entity_resolution: false,
            ai_legal_patterns: false,
            case_type: CaseType::Generic,
            model: "gpt-4.1-mini".to_string(),
        }
    }
}

/// Reply shape for entity-cluster arbitration.
#[derive(Debug, Deserialize)]
struct EntityResolutionReply {
    same_entity: bool,
    groups: Vec<Vec<String>>,
}

/// Correlates every analysis in a case.
pub struct CorrelationAnalyzer<P> {
    store: Arc<EvidenceStore>,
    provider: Option<Arc<P>>,
    options: CorrelationOptions,
}

impl<P: LlmProvider + 'static> CorrelationAnalyzer<P> {
    pub fn new(
        store: Arc<EvidenceStore>,
        provider: Option<Arc<P>>,
        options: CorrelationOptions,
    ) -> Self {
        Self {
            store,
            provider,
            options,
        }
    }

    /// Runs correlation over a case snapshot. Idempotent for unchanged
    /// analyses; unreadable items are skipped, never fatal.
    pub async fn correlate(&self, case_id: &str) -> CorrelateResult<CorrelationAnalysis> {
        let analyses = self.load_case_snapshot(case_id)?;

        let entity_correlations = self.correlate_entities(&analyses).await;

        let mut events = Vec::new();
        for analysis in &analyses {
            events.extend(timeline::events_from_analysis(analysis));
        }
        timeline::sort_events(&mut events);

        let profiles = sequences::anchor_profiles(&analyses);
        let temporal_sequences =
            sequences::detect_sequences(&events, &profiles, self.options.temporal_window_hours);
        let timeline_gaps = sequences::detect_gaps(&events);

        let legal_patterns = if self.options.ai_legal_patterns {
            self.detect_legal_patterns(&analyses, &entity_correlations, &events)
                .await
        } else {
            None
        };

        info!(
            case_id,
            evidence = analyses.len(),
            entities = entity_correlations.len(),
            events = events.len(),
            "correlation complete"
        );

        Ok(CorrelationAnalysis {
            case_id: case_id.to_string(),
            evidence_count: analyses.len() as u64,
            entity_correlations,
            timeline_events: events,
            temporal_sequences,
            timeline_gaps,
            legal_patterns,
            analysis_timestamp: Utc::now(),
        })
    }

    /// Takes the case hash list once and loads what it can.
    pub(crate) fn load_case_snapshot(
        &self,
        case_id: &str,
    ) -> CorrelateResult<Vec<UnifiedAnalysis>> {
        let hashes = self.store.list_case(case_id)?;
        let mut analyses = Vec::new();
        for hash in hashes {
            match self.store.get_analysis(&hash) {
                Ok(Some(analysis)) => analyses.push(analysis),
                Ok(None) => {
                    warn!(hash = %hash, "evidence has no analysis yet, skipping");
                }
                Err(err) => {
                    warn!(hash = %hash, %err, "analysis unreadable, skipping");
                }
            }
        }
        Ok(analyses)
    }

    async fn correlate_entities(&self, analyses: &[UnifiedAnalysis]) -> Vec<CorrelatedEntity> {
        // Gather mentions per entity type; types never merge.
        let mut by_type: BTreeMap<&'static str, (EntityType, Vec<Mention>)> = BTreeMap::new();
        for analysis in analyses {
            let Some(doc) = &analysis.document_analysis else {
                continue;
            };
            for entity in &doc.entities {
                let slot = by_type
                    .entry(entity.entity_type.as_str())
                    .or_insert_with(|| (entity.entity_type, Vec::new()));
                slot.1.push(Mention {
                    name: entity.name.clone(),
                    evidence_sha256: analysis.file_metadata.sha256.clone(),
                    context: entity.context.clone(),
                    confidence: entity.confidence,
                });
            }
        }

        let mut correlated = Vec::new();
        for (_, (entity_type, mentions)) in by_type {
            let mut clusters = cluster_mentions(mentions);
            if self.options.ai_entity_resolution {
                clusters = self.resolve_clusters(clusters).await;
            }

            for cluster in clusters {
                let distinct_evidence: BTreeSet<&str> = cluster
                    .mentions
                    .iter()
                    .map(|m| m.evidence_sha256.as_str())
                    .collect();
                if distinct_evidence.len() < 2 {
                    continue;
                }

                let confidence_average = round4(
                    cluster.mentions.iter().map(|m| m.confidence).sum::<f64>()
                        / cluster.mentions.len() as f64,
                );
                let mut evidence_occurrences: Vec<EvidenceOccurrence> = cluster
                    .mentions
                    .iter()
                    .map(|m| EvidenceOccurrence {
                        evidence_sha256: m.evidence_sha256.clone(),
                        context: m.context.clone(),
                        confidence: m.confidence,
                    })
                    .collect();
                evidence_occurrences
                    .sort_by(|a, b| a.evidence_sha256.cmp(&b.evidence_sha256));

                correlated.push(CorrelatedEntity {
                    entity_name: cluster.display_name.clone(),
                    entity_type,
                    occurrence_count: evidence_occurrences.len() as u64,
                    confidence_average,
                    evidence_occurrences,
                });
            }
        }

        correlated.sort_by(|a, b| {
            b.occurrence_count
                .cmp(&a.occurrence_count)
                .then_with(|| a.entity_name.cmp(&b.entity_name))
        });
        correlated
    }

    /// Lets the model split (never merge) ambiguous clusters.
    async fn resolve_clusters(&self, clusters: Vec<Cluster>) -> Vec<Cluster> {
        let Some(provider) = &self.provider else {
            return clusters;
        };

        let mut resolved = Vec::new();
        for cluster in clusters {
            let variants = cluster.variants();
            if variants.len() < 2 {
                resolved.push(cluster);
                continue;
            }

            let digest = variants.join("\n");
            let request = StructuredRequest::deterministic(
                &self.options.model,
                prompts::entity_resolution_prompt(self.options.case_type, &digest),
                "entity_resolution",
                prompts::entity_resolution_schema(),
            );

            // No retries at the correlation layer.
            let reply = match provider.generate_structured(&request).await {
                Ok(response) => response.into_parsed::<EntityResolutionReply>(),
                Err(err) => Err(err),
            };

            match reply {
                Ok(resolution) if !resolution.same_entity && resolution.groups.len() > 1 => {
                    resolved.extend(split_cluster(cluster, &resolution.groups));
                }
                Ok(_) => resolved.push(cluster),
                Err(err) => {
                    warn!(%err, "entity resolution unavailable, keeping merged cluster");
                    resolved.push(cluster);
                }
            }
        }
        resolved
    }

    async fn detect_legal_patterns(
        &self,
        analyses: &[UnifiedAnalysis],
        entities: &[CorrelatedEntity],
        events: &[evidentia_core::TimelineEvent],
    ) -> Option<LegalPatternAnalysis> {
        let provider = self.provider.as_ref()?;

        let digest = case_digest(analyses, entities, events);
        let request = StructuredRequest::deterministic(
            &self.options.model,
            prompts::legal_patterns_prompt(self.options.case_type, &digest),
            "legal_pattern_analysis",
            prompts::legal_patterns_schema(),
        );

        // No retries at the correlation layer; failure means no patterns.
        let outcome = provider
            .generate_structured(&request)
            .await
            .and_then(|response| response.into_parsed::<LegalPatternAnalysis>());

        match outcome {
            Ok(mut patterns) => {
                patterns.confidence = round4(patterns.confidence);
                for contradiction in &mut patterns.contradictions {
                    contradiction.severity = round4(contradiction.severity);
                }
                for link in &mut patterns.corroboration {
                    link.strength = round4(link.strength);
                }
                Some(patterns)
            }
            Err(err) => {
                warn!(%err, "legal pattern detection unavailable");
                None
            }
        }
    }
}

/// Splits a cluster along model-provided variant groups. Mentions naming
/// a variant outside every group stay with the first group.
fn split_cluster(cluster: Cluster, groups: &[Vec<String>]) -> Vec<Cluster> {
    let mut buckets: Vec<Vec<Mention>> = vec![Vec::new(); groups.len()];
    for mention in cluster.mentions {
        let slot = groups
            .iter()
            .position(|group| group.iter().any(|v| v == &mention.name))
            .unwrap_or(0);
        buckets[slot].push(mention);
    }

    buckets
        .into_iter()
        .filter(|mentions| !mentions.is_empty())
        .map(|mentions| {
            let display_name = mentions
                .iter()
                .map(|m| m.name.as_str())
                .max_by_key(|name| (name.split_whitespace().count(), name.len()))
                .unwrap_or_default()
                .to_string();
            Cluster {
                display_name,
                mentions,
            }
        })
        .collect()
}

/// The structured digest fed to legal-pattern detection: entity clusters,
/// a timeline skeleton, and quoted-statement excerpts.
fn case_digest(
    analyses: &[UnifiedAnalysis],
    entities: &[CorrelatedEntity],
    events: &[evidentia_core::TimelineEvent],
) -> String {
    let mut digest = String::from("Correlated entities:\n");
    for entity in entities {
        digest.push_str(&format!(
            "- {} ({}, {} occurrences)\n",
            entity.entity_name,
            entity.entity_type.as_str(),
            entity.occurrence_count
        ));
    }

    digest.push_str("\nTimeline:\n");
    for event in events.iter().filter(|e| !e.event_type.is_housekeeping()) {
        digest.push_str(&format!(
            "- {} [{}] {} ({})\n",
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.description,
            &event.evidence_sha256[..8]
        ));
    }

    digest.push_str("\nQuoted statements:\n");
    for analysis in analyses {
        let Some(doc) = &analysis.document_analysis else {
            continue;
        };
        for entity in &doc.entities {
            if let Some(quote) = &entity.quoted_text {
                digest.push_str(&format!(
                    "- {} ({}): \"{quote}\"\n",
                    entity.name,
                    &analysis.file_metadata.sha256[..8]
                ));
            }
        }
    }
    digest
}
