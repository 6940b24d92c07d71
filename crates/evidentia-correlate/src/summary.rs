//! The case aggregator.
//!
//! Builds the generator-facing [`OverallAssessment`] by re-reading the
//! per-item analyses (never the correlation result), then optionally asks
//! the LLM for an executive summary — directly for small cases, by
//! map-reduce over evidence chunks for large ones. Aggregates are fully
//! deterministic: unchanged analyses produce byte-identical output
//! (modulo timestamps).

use crate::canonical::canonicalise;
use crate::correlation::{CorrelationAnalyzer, CorrelationOptions};
use crate::CorrelateResult;
use chrono::Utc;
use evidentia_analyze::{CaseType, prompts};
use evidentia_core::{
    AuthorityLevel, CaseSummary, CommunicationPattern, CorrelationAnalysis, EvidenceSummary,
    EvidenceType, OverallAssessment, SCHEMA_VERSION, Sentiment, TimelineEvent, UnifiedAnalysis,
    round4,
    summary::{
        CommunicationPatterns, ImageOcrAggregate, OcrSample, ParticipantDynamics,
        PowerDynamicsAggregate, QuotedStatement, QuotedStatementsAggregate, RelationshipEdge,
        RelationshipNetwork, RiskLevel, SpeakerStatements,
    },
};
use evidentia_llm::{LlmProvider, StructuredRequest};
use evidentia_store::EvidenceStore;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Evidence count at or below which the executive summary is built from
/// one direct prompt.
pub const CHUNK_THRESHOLD: usize = 30;

/// Chunk size for the map-reduce summary path.
pub const CHUNK_SIZE: usize = 30;

/// Characters of detected text kept per OCR sample.
const OCR_EXCERPT_CHARS: usize = 160;

/// Tuning for a summary run.
#[derive(Debug, Clone)]
pub struct SummaryOptions {
    pub case_type: CaseType,
    /// Ask the LLM for the executive summary and forensic annexes.
    pub ai_summary: bool,
    pub model: String,
    pub correlation: CorrelationOptions,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            case_type: CaseType::Generic,
            ai_summary: false,
            model: "gpt-4.1-mini".to_string(),
            correlation: CorrelationOptions::default(),
        }
    }
}

/// Reply shape for the executive summary call.
#[derive(Debug, Deserialize)]
struct ExecutiveSummaryReply {
    executive_summary: String,
    forensic_summary: Option<String>,
    forensic_legal_implications: Option<Vec<String>>,
    forensic_recommended_actions: Option<Vec<String>>,
    forensic_risk_assessment: Option<String>,
    tribunal_probability: Option<f64>,
    financial_exposure_summary: Option<String>,
    claim_strength_summary: Option<String>,
    settlement_recommendation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkSummaryReply {
    summary: String,
}

/// Distils a case into its [`CaseSummary`].
pub struct Aggregator<P> {
    store: Arc<EvidenceStore>,
    provider: Option<Arc<P>>,
    options: SummaryOptions,
}

impl<P: LlmProvider + 'static> Aggregator<P> {
    pub fn new(store: Arc<EvidenceStore>, provider: Option<Arc<P>>, options: SummaryOptions) -> Self {
        Self {
            store,
            provider,
            options,
        }
    }

    /// Produces the case summary: correlation, deterministic aggregates,
    /// and (when enabled and available) the AI executive summary.
    pub async fn summarize(&self, case_id: &str) -> CorrelateResult<CaseSummary> {
        let correlation_analyzer = CorrelationAnalyzer::new(
            Arc::clone(&self.store),
            self.provider.clone(),
            self.options.correlation.clone(),
        );
        let correlation = correlation_analyzer.correlate(case_id).await?;
        let analyses = correlation_analyzer.load_case_snapshot(case_id)?;

        let mut assessment = OverallAssessment {
            quoted_statements: aggregate_quoted_statements(&analyses),
            communication_patterns: aggregate_communication_patterns(&analyses),
            power_dynamics: aggregate_power_dynamics(&analyses),
            image_ocr: aggregate_image_ocr(&analyses),
            semantic_events: semantic_events(&correlation),
            relationship_network: aggregate_relationship_network(&analyses),
            ..OverallAssessment::default()
        };

        let evidence_summaries = evidence_summaries(&analyses);
        let mut evidence_types: Vec<EvidenceType> =
            analyses.iter().map(|a| a.evidence_type).collect();
        evidence_types.sort();
        evidence_types.dedup();

        let executive_summary = if self.options.ai_summary {
            let digest = assessment_digest(&assessment, evidence_summaries.len());
            self.executive_summary(&evidence_summaries, &digest)
                .await
                .map(|reply| apply_reply(&mut assessment, reply))
        } else {
            None
        };

        info!(
            case_id,
            evidence = analyses.len(),
            ai_summary = executive_summary.is_some(),
            "case summary complete"
        );

        Ok(CaseSummary {
            schema_version: SCHEMA_VERSION.to_string(),
            case_id: case_id.to_string(),
            generation_timestamp: Utc::now(),
            evidence_count: analyses.len() as u64,
            evidence_types,
            evidence_summaries,
            correlation,
            overall_assessment: assessment,
            executive_summary,
        })
    }

    /// Direct call for small cases, map-reduce for large ones. Failures
    /// leave the executive summary absent; aggregation never retries.
    async fn executive_summary(
        &self,
        evidence_summaries: &[EvidenceSummary],
        digest: &str,
    ) -> Option<ExecutiveSummaryReply> {
        let provider = self.provider.as_ref()?;

        let prompt = if evidence_summaries.len() <= CHUNK_THRESHOLD {
            prompts::executive_summary_prompt(self.options.case_type, digest)
        } else {
            let mut chunk_summaries = Vec::new();
            for (index, chunk) in evidence_summaries.chunks(CHUNK_SIZE).enumerate() {
                let chunk_digest = chunk_digest(chunk);
                let request = StructuredRequest::deterministic(
                    &self.options.model,
                    prompts::chunk_summary_prompt(self.options.case_type, &chunk_digest),
                    "chunk_summary",
                    prompts::chunk_summary_schema(),
                );
                let outcome = provider
                    .generate_structured(&request)
                    .await
                    .and_then(|r| r.into_parsed::<ChunkSummaryReply>());
                match outcome {
                    Ok(reply) => {
                        chunk_summaries.push(format!("Portion {}: {}", index + 1, reply.summary));
                    }
                    Err(err) => {
                        warn!(%err, "chunk summary unavailable, skipping executive summary");
                        return None;
                    }
                }
            }
            prompts::reduce_summary_prompt(
                self.options.case_type,
                &chunk_summaries.join("\n"),
                digest,
            )
        };

        let request = StructuredRequest::deterministic(
            &self.options.model,
            prompt,
            "executive_summary",
            prompts::executive_summary_schema(),
        );
        let outcome = provider
            .generate_structured(&request)
            .await
            .and_then(|r| r.into_parsed::<ExecutiveSummaryReply>());

        match outcome {
            Ok(reply) => Some(reply),
            Err(err) => {
                warn!(%err, "executive summary unavailable");
                None
            }
        }
    }
}

fn apply_reply(assessment: &mut OverallAssessment, reply: ExecutiveSummaryReply) -> String {
    assessment.forensic_summary = reply.forensic_summary;
    assessment.forensic_legal_implications = reply.forensic_legal_implications;
    assessment.forensic_recommended_actions = reply.forensic_recommended_actions;
    assessment.forensic_risk_assessment = reply.forensic_risk_assessment;
    assessment.tribunal_probability = reply.tribunal_probability.map(round4);
    assessment.financial_exposure_summary = reply.financial_exposure_summary;
    assessment.claim_strength_summary = reply.claim_strength_summary;
    assessment.settlement_recommendation = reply.settlement_recommendation;
    reply.executive_summary
}

/// Quoted statements grouped by canonical speaker.
pub fn aggregate_quoted_statements(
    analyses: &[UnifiedAnalysis],
) -> Option<QuotedStatementsAggregate> {
    // Key speakers by short-form projection so "Smith, John" and
    // "John Smith" collect together.
    let mut by_speaker: BTreeMap<String, (String, Vec<QuotedStatement>)> = BTreeMap::new();

    for analysis in analyses {
        let Some(doc) = &analysis.document_analysis else {
            continue;
        };
        for entity in &doc.entities {
            let Some(quote) = &entity.quoted_text else {
                continue;
            };
            let key = canonicalise(&entity.name).short;
            let slot = by_speaker
                .entry(key)
                .or_insert_with(|| (entity.name.clone(), Vec::new()));
            // Longest variant becomes the display name.
            if entity.name.split_whitespace().count() > slot.0.split_whitespace().count()
                || (entity.name.split_whitespace().count() == slot.0.split_whitespace().count()
                    && entity.name.len() > slot.0.len())
            {
                slot.0 = entity.name.clone();
            }
            slot.1.push(QuotedStatement {
                text: quote.clone(),
                sentiment: doc.sentiment,
                risk_flags: doc.risk_flags.clone(),
                evidence_sha256: analysis.file_metadata.sha256.clone(),
            });
        }
    }

    if by_speaker.is_empty() {
        return None;
    }

    let mut speakers: Vec<SpeakerStatements> = by_speaker
        .into_values()
        .map(|(speaker, statements)| {
            let dominant_sentiment = dominant_sentiment(&statements);
            SpeakerStatements {
                speaker,
                statements,
                dominant_sentiment,
            }
        })
        .collect();
    speakers.sort_by(|a, b| a.speaker.cmp(&b.speaker));

    let total_statements = speakers.iter().map(|s| s.statements.len() as u64).sum();
    Some(QuotedStatementsAggregate {
        speakers,
        total_statements,
    })
}

/// Most frequent sentiment; hostile wins ties so risk is never understated.
fn dominant_sentiment(statements: &[QuotedStatement]) -> Sentiment {
    const PRIORITY: [Sentiment; 3] = [Sentiment::Hostile, Sentiment::Professional, Sentiment::Neutral];
    let mut counts = [0usize; 3];
    for statement in statements {
        let index = PRIORITY
            .iter()
            .position(|s| *s == statement.sentiment)
            .unwrap_or(2);
        counts[index] += 1;
    }
    let best = counts.iter().copied().max().unwrap_or(0);
    PRIORITY[counts.iter().position(|&c| c == best).unwrap_or(2)]
}

/// Distribution of communication patterns across email evidence.
pub fn aggregate_communication_patterns(
    analyses: &[UnifiedAnalysis],
) -> Option<CommunicationPatterns> {
    let emails: Vec<_> = analyses
        .iter()
        .filter_map(|a| a.email_analysis.as_ref())
        .collect();
    if emails.is_empty() {
        return None;
    }

    let mut pattern_counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut escalation_detected = false;
    let mut risk_level = RiskLevel::Low;

    for email in &emails {
        *pattern_counts
            .entry(email.communication_pattern.as_str().to_string())
            .or_insert(0) += 1;
        escalation_detected |= !email.escalation_events.is_empty();
        match email.communication_pattern {
            CommunicationPattern::Hostile | CommunicationPattern::Retaliatory => {
                risk_level = RiskLevel::High;
            }
            CommunicationPattern::Escalating => {
                if risk_level == RiskLevel::Low {
                    risk_level = RiskLevel::Medium;
                }
            }
            CommunicationPattern::Professional => {}
        }
    }

    Some(CommunicationPatterns {
        pattern_counts,
        risk_level,
        escalation_detected,
        email_count: emails.len() as u64,
    })
}

fn authority_rank(level: AuthorityLevel) -> u8 {
    match level {
        AuthorityLevel::Executive => 3,
        AuthorityLevel::Management => 2,
        AuthorityLevel::Employee => 1,
        AuthorityLevel::External => 0,
    }
}

/// Per-participant aggregates across every analysed thread.
pub fn aggregate_power_dynamics(analyses: &[UnifiedAnalysis]) -> Option<PowerDynamicsAggregate> {
    struct Accumulator {
        display_name: Option<String>,
        authority: AuthorityLevel,
        message_count: u64,
        deference_sum: f64,
        thread_count: u64,
        topics: BTreeSet<String>,
    }

    let mut by_address: BTreeMap<String, Accumulator> = BTreeMap::new();
    for analysis in analyses {
        let Some(email) = &analysis.email_analysis else {
            continue;
        };
        for participant in &email.participants {
            let address = participant.email_address.to_lowercase();
            let acc = by_address.entry(address).or_insert(Accumulator {
                display_name: None,
                authority: participant.authority_level,
                message_count: 0,
                deference_sum: 0.0,
                thread_count: 0,
                topics: BTreeSet::new(),
            });
            if acc.display_name.is_none() {
                acc.display_name = participant.display_name.clone();
            }
            if authority_rank(participant.authority_level) > authority_rank(acc.authority) {
                acc.authority = participant.authority_level;
            }
            acc.message_count += participant.message_count;
            acc.deference_sum += participant.deference_score;
            acc.thread_count += 1;
            for topic in participant.dominant_topics.iter().flatten() {
                acc.topics.insert(topic.clone());
            }
        }
    }

    if by_address.is_empty() {
        return None;
    }

    let mut participants: Vec<ParticipantDynamics> = by_address
        .into_iter()
        .map(|(email_address, acc)| ParticipantDynamics {
            email_address,
            display_name: acc.display_name,
            authority_level: acc.authority,
            message_count: acc.message_count,
            avg_deference_score: round4(acc.deference_sum / acc.thread_count as f64),
            dominant_topics: acc.topics.into_iter().collect(),
            thread_count: acc.thread_count,
        })
        .collect();
    participants.sort_by(|a, b| {
        b.message_count
            .cmp(&a.message_count)
            .then_with(|| a.email_address.cmp(&b.email_address))
    });

    // The most-connected participants, by thread membership.
    let mut by_connections = participants.clone();
    by_connections.sort_by(|a, b| {
        b.thread_count
            .cmp(&a.thread_count)
            .then_with(|| b.message_count.cmp(&a.message_count))
            .then_with(|| a.email_address.cmp(&b.email_address))
    });
    let top_participants = by_connections
        .iter()
        .take(3)
        .map(|p| p.email_address.clone())
        .collect();

    Some(PowerDynamicsAggregate {
        participants,
        top_participants,
    })
}

/// OCR aggregate across image evidence.
pub fn aggregate_image_ocr(analyses: &[UnifiedAnalysis]) -> Option<ImageOcrAggregate> {
    let images: Vec<_> = analyses
        .iter()
        .filter(|a| a.image_analysis.is_some())
        .collect();
    if images.is_empty() {
        return None;
    }

    let mut aggregate = ImageOcrAggregate {
        images_total: images.len() as u64,
        images_with_text: 0,
        images_with_timestamps: 0,
        images_with_people: 0,
        samples_by_value: BTreeMap::new(),
    };

    for analysis in &images {
        let image = analysis.image_analysis.as_ref().unwrap();
        if image.timestamps_visible {
            aggregate.images_with_timestamps += 1;
        }
        if image.people_present {
            aggregate.images_with_people += 1;
        }
        if let Some(text) = image.detected_text.as_deref().filter(|t| !t.trim().is_empty()) {
            aggregate.images_with_text += 1;
            let excerpt: String = text.chars().take(OCR_EXCERPT_CHARS).collect();
            aggregate
                .samples_by_value
                .entry(image.potential_evidence_value.as_str().to_string())
                .or_default()
                .push(OcrSample {
                    evidence_sha256: analysis.file_metadata.sha256.clone(),
                    excerpt,
                });
        }
    }

    for samples in aggregate.samples_by_value.values_mut() {
        samples.sort_by(|a, b| a.evidence_sha256.cmp(&b.evidence_sha256));
    }
    Some(aggregate)
}

/// Semantic timeline events re-exported from the correlation result.
pub fn semantic_events(correlation: &CorrelationAnalysis) -> Option<Vec<TimelineEvent>> {
    let events: Vec<TimelineEvent> = correlation
        .timeline_events
        .iter()
        .filter(|e| {
            matches!(
                e.event_type,
                evidentia_core::TimelineEventType::DocumentDateReference
                    | evidentia_core::TimelineEventType::SemanticEvent
            )
        })
        .cloned()
        .collect();
    (!events.is_empty()).then_some(events)
}

/// Relationship network from entity relationship strings. Nodes are flat
/// names; edges are `(source, target, label)` triples.
pub fn aggregate_relationship_network(
    analyses: &[UnifiedAnalysis],
) -> Option<RelationshipNetwork> {
    let mut edges = Vec::new();
    for analysis in analyses {
        let Some(doc) = &analysis.document_analysis else {
            continue;
        };
        for entity in &doc.entities {
            let Some(relationship) = &entity.relationship else {
                continue;
            };
            // "supervisor of Jane Doe" → label "supervisor", target "Jane Doe".
            let edge = match relationship.split_once(" of ") {
                Some((label, target)) => RelationshipEdge {
                    source: entity.name.clone(),
                    target: target.trim().to_string(),
                    relationship: label.trim().to_string(),
                },
                None => RelationshipEdge {
                    source: entity.name.clone(),
                    target: relationship.trim().to_string(),
                    relationship: "related_to".to_string(),
                },
            };
            if !edges.contains(&edge) {
                edges.push(edge);
            }
        }
    }

    if edges.is_empty() {
        return None;
    }
    edges.sort_by(|a, b| {
        a.source
            .cmp(&b.source)
            .then_with(|| a.target.cmp(&b.target))
            .then_with(|| a.relationship.cmp(&b.relationship))
    });

    let mut nodes: BTreeSet<String> = BTreeSet::new();
    let mut degree: BTreeMap<String, u64> = BTreeMap::new();
    for edge in &edges {
        nodes.insert(edge.source.clone());
        nodes.insert(edge.target.clone());
        *degree.entry(edge.source.clone()).or_insert(0) += 1;
        *degree.entry(edge.target.clone()).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, u64)> = degree.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let key_players = ranked.into_iter().take(5).map(|(name, _)| name).collect();

    Some(RelationshipNetwork {
        nodes: nodes.into_iter().collect(),
        edges,
        key_players,
    })
}

fn evidence_summaries(analyses: &[UnifiedAnalysis]) -> Vec<EvidenceSummary> {
    analyses
        .iter()
        .map(|analysis| {
            let (summary, legal_significance) = if let Some(doc) = &analysis.document_analysis {
                (Some(doc.summary.clone()), Some(doc.legal_significance))
            } else if let Some(email) = &analysis.email_analysis {
                (
                    Some(email.thread_summary.clone()),
                    Some(email.legal_significance),
                )
            } else if let Some(image) = &analysis.image_analysis {
                (Some(image.scene_description.clone()), None)
            } else {
                (None, None)
            };
            EvidenceSummary {
                sha256: analysis.file_metadata.sha256.clone(),
                filename: analysis.file_metadata.filename.clone(),
                evidence_type: analysis.evidence_type,
                summary,
                legal_significance,
            }
        })
        .collect()
}

/// Deterministic text digest of the aggregates for summary prompts.
fn assessment_digest(assessment: &OverallAssessment, evidence_count: usize) -> String {
    let mut digest = format!("Evidence items: {evidence_count}\n");

    if let Some(quoted) = &assessment.quoted_statements {
        digest.push_str(&format!(
            "Quoted statements: {} across {} speakers\n",
            quoted.total_statements,
            quoted.speakers.len()
        ));
        for speaker in &quoted.speakers {
            digest.push_str(&format!(
                "- {} ({} statements, dominant sentiment {})\n",
                speaker.speaker,
                speaker.statements.len(),
                speaker.dominant_sentiment.as_str()
            ));
        }
    }
    if let Some(patterns) = &assessment.communication_patterns {
        digest.push_str(&format!(
            "Communication risk: {} across {} threads (escalation: {})\n",
            patterns.risk_level, patterns.email_count, patterns.escalation_detected
        ));
        for (pattern, count) in &patterns.pattern_counts {
            digest.push_str(&format!("- {pattern}: {count}\n"));
        }
    }
    if let Some(dynamics) = &assessment.power_dynamics {
        digest.push_str("Top participants:\n");
        for address in &dynamics.top_participants {
            digest.push_str(&format!("- {address}\n"));
        }
    }
    if let Some(ocr) = &assessment.image_ocr {
        digest.push_str(&format!(
            "Images: {} total, {} with text, {} with timestamps, {} with people\n",
            ocr.images_total, ocr.images_with_text, ocr.images_with_timestamps,
            ocr.images_with_people
        ));
    }
    if let Some(network) = &assessment.relationship_network {
        digest.push_str(&format!(
            "Relationship network: {} nodes, {} edges; key players: {}\n",
            network.nodes.len(),
            network.edges.len(),
            network.key_players.join(", ")
        ));
    }
    if let Some(events) = &assessment.semantic_events {
        digest.push_str("Semantic timeline events:\n");
        for event in events {
            digest.push_str(&format!(
                "- {}: {}\n",
                event.timestamp.date_naive(),
                event.description
            ));
        }
    }
    digest
}

fn chunk_digest(chunk: &[EvidenceSummary]) -> String {
    let mut digest = String::new();
    for item in chunk {
        digest.push_str(&format!(
            "- [{}] {} ({}): {}\n",
            &item.sha256[..8],
            item.filename,
            item.evidence_type,
            item.summary.as_deref().unwrap_or("not analysed")
        ));
    }
    digest
}

#[cfg(test)]
mod tests {
    use super::*;
    use evidentia_core::testing::{sample_entity, sample_unified_analysis};
    use evidentia_core::{
        EmailParticipant, EmailThreadAnalysis, EscalationEvent, EscalationType, EvidenceValue,
        ImageAnalysisStructured, ParticipantRole,
    };
    use evidentia_llm::MockProvider;
    use std::fs;
    use std::path::Path;

    fn doc_with_quote(sha_fill: &str, speaker: &str, quote: &str) -> UnifiedAnalysis {
        let mut analysis = sample_unified_analysis("CASE-1", &sha_fill.repeat(32));
        let mut entity = sample_entity(speaker);
        entity.quoted_text = Some(quote.to_string());
        analysis.document_analysis.as_mut().unwrap().entities = vec![entity];
        analysis
    }

    fn email_analysis_fixture(
        sha_fill: &str,
        pattern: CommunicationPattern,
        escalations: usize,
    ) -> UnifiedAnalysis {
        let mut analysis = sample_unified_analysis("CASE-1", &sha_fill.repeat(32));
        analysis.evidence_type = EvidenceType::Email;
        analysis.document_analysis = None;
        analysis.email_analysis = Some(EmailThreadAnalysis {
            thread_summary: "thread".to_string(),
            participants: vec![EmailParticipant {
                email_address: "Sarah.Johnson@Example.com".to_string(),
                display_name: Some("Sarah Johnson".to_string()),
                role: ParticipantRole::Sender,
                authority_level: AuthorityLevel::Management,
                confidence: 0.9,
                message_count: 4,
                deference_score: 0.2,
                dominant_topics: Some(vec!["scheduling".to_string()]),
            }],
            communication_pattern: pattern,
            sentiment_progression: vec![0.1],
            escalation_events: (0..escalations)
                .map(|i| EscalationEvent {
                    email_position: i as u64,
                    escalation_type: EscalationType::ToneChange,
                    confidence: 0.8,
                    description: "tone hardened".to_string(),
                    context: "ctx".to_string(),
                })
                .collect(),
            legal_significance: evidentia_core::LegalSignificance::Medium,
            risk_flags: vec![],
            timeline_reconstruction: vec![],
            confidence_overall: 0.8,
        });
        analysis
    }

    fn image_analysis_fixture(sha_fill: &str, text: Option<&str>) -> UnifiedAnalysis {
        let mut analysis = sample_unified_analysis("CASE-1", &sha_fill.repeat(32));
        analysis.evidence_type = EvidenceType::Image;
        analysis.document_analysis = None;
        analysis.image_analysis = Some(ImageAnalysisStructured {
            scene_description: "noticeboard".to_string(),
            detected_text: text.map(String::from),
            detected_objects: None,
            people_present: true,
            timestamps_visible: text.is_some(),
            potential_evidence_value: EvidenceValue::Medium,
            analysis_notes: "n".to_string(),
            confidence_overall: 0.8,
            risk_flags: vec![],
        });
        analysis
    }

    #[test]
    fn test_quoted_statements_grouped_by_canonical_speaker() {
        let analyses = vec![
            doc_with_quote("1a", "Smith, John", "I will not sign this."),
            doc_with_quote("2b", "John Smith", "You will regret raising this."),
        ];
        let aggregate = aggregate_quoted_statements(&analyses).unwrap();
        assert_eq!(aggregate.speakers.len(), 1);
        assert_eq!(aggregate.total_statements, 2);
        assert_eq!(aggregate.speakers[0].speaker, "John Smith");
    }

    #[test]
    fn test_quoted_statements_absent_without_quotes() {
        let analyses = vec![sample_unified_analysis("CASE-1", &"1a".repeat(32))];
        assert!(aggregate_quoted_statements(&analyses).is_none());
    }

    #[test]
    fn test_communication_risk_ladder() {
        let professional =
            vec![email_analysis_fixture("1a", CommunicationPattern::Professional, 0)];
        let patterns = aggregate_communication_patterns(&professional).unwrap();
        assert_eq!(patterns.risk_level, RiskLevel::Low);
        assert!(!patterns.escalation_detected);

        let escalating = vec![
            email_analysis_fixture("1a", CommunicationPattern::Professional, 0),
            email_analysis_fixture("2b", CommunicationPattern::Escalating, 1),
        ];
        let patterns = aggregate_communication_patterns(&escalating).unwrap();
        assert_eq!(patterns.risk_level, RiskLevel::Medium);
        assert!(patterns.escalation_detected);

        let hostile = vec![
            email_analysis_fixture("1a", CommunicationPattern::Escalating, 1),
            email_analysis_fixture("2b", CommunicationPattern::Hostile, 0),
        ];
        let patterns = aggregate_communication_patterns(&hostile).unwrap();
        assert_eq!(patterns.risk_level, RiskLevel::High);
        assert_eq!(patterns.pattern_counts["hostile"], 1);
    }

    #[test]
    fn test_power_dynamics_merges_addresses_case_insensitively() {
        let analyses = vec![
            email_analysis_fixture("1a", CommunicationPattern::Professional, 0),
            email_analysis_fixture("2b", CommunicationPattern::Professional, 0),
        ];
        let dynamics = aggregate_power_dynamics(&analyses).unwrap();
        assert_eq!(dynamics.participants.len(), 1);
        let participant = &dynamics.participants[0];
        assert_eq!(participant.email_address, "sarah.johnson@example.com");
        assert_eq!(participant.message_count, 8);
        assert_eq!(participant.thread_count, 2);
        assert_eq!(participant.avg_deference_score, 0.2);
        assert_eq!(dynamics.top_participants, vec!["sarah.johnson@example.com"]);
    }

    #[test]
    fn test_image_ocr_aggregate_counts() {
        let analyses = vec![
            image_analysis_fixture("1a", Some("TERMINATION NOTICE")),
            image_analysis_fixture("2b", None),
        ];
        let ocr = aggregate_image_ocr(&analyses).unwrap();
        assert_eq!(ocr.images_total, 2);
        assert_eq!(ocr.images_with_text, 1);
        assert_eq!(ocr.images_with_timestamps, 1);
        assert_eq!(ocr.images_with_people, 2);
        assert_eq!(ocr.samples_by_value["medium"].len(), 1);
    }

    #[test]
    fn test_relationship_network_triples() {
        let mut analysis = sample_unified_analysis("CASE-1", &"1a".repeat(32));
        let mut entity = sample_entity("Mark Webb");
        entity.relationship = Some("supervisor of Sarah Johnson".to_string());
        analysis.document_analysis.as_mut().unwrap().entities = vec![entity];

        let network = aggregate_relationship_network(&[analysis]).unwrap();
        assert_eq!(network.nodes, vec!["Mark Webb", "Sarah Johnson"]);
        assert_eq!(network.edges.len(), 1);
        assert_eq!(network.edges[0].relationship, "supervisor");
        assert_eq!(network.edges[0].target, "Sarah Johnson");
        assert!(network.key_players.contains(&"Mark Webb".to_string()));
    }

    #[test]
    fn test_dominant_sentiment_tie_prefers_hostile() {
        let statement = |sentiment| QuotedStatement {
            text: "t".to_string(),
            sentiment,
            risk_flags: vec![],
            evidence_sha256: "9d".repeat(32),
        };
        let dominant = dominant_sentiment(&[
            statement(Sentiment::Hostile),
            statement(Sentiment::Neutral),
        ]);
        assert_eq!(dominant, Sentiment::Hostile);
    }

    async fn summarize_case(
        dir: &Path,
        provider: Option<Arc<MockProvider>>,
        options: SummaryOptions,
    ) -> CaseSummary {
        let store = Arc::new(EvidenceStore::open(dir.join("store")).unwrap());
        for (i, body) in ["first doc", "second doc"].iter().enumerate() {
            let file = dir.join(format!("doc{i}.txt"));
            fs::write(&file, body).unwrap();
            let hash = store.ingest(&file, "CASE-1", "analyst").unwrap().sha256;
            let analysis = sample_unified_analysis("CASE-1", &hash);
            store.save_analysis(&hash, &analysis, "analyzer").unwrap();
        }
        Aggregator::new(store, provider, options)
            .summarize("CASE-1")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_summary_without_ai() {
        let dir = tempfile::tempdir().unwrap();
        let summary = summarize_case(dir.path(), None, SummaryOptions::default()).await;

        assert_eq!(summary.case_id, "CASE-1");
        assert_eq!(summary.evidence_count, 2);
        assert_eq!(summary.evidence_types, vec![EvidenceType::Document]);
        assert!(summary.executive_summary.is_none());
        assert!(!summary.overall_assessment.has_forensic_opinion());
        assert!(evidentia_core::Validate::validate(&summary).is_ok());
    }

    #[tokio::test]
    async fn test_direct_executive_summary_populates_annexes() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider::new().with_json(
            "aggregated case assessment",
            serde_json::json!({
                "executive_summary": "Two related documents suggest a coordinated dismissal.",
                "forensic_summary": "Consistent narrative across exhibits.",
                "forensic_legal_implications": ["possible unfair dismissal"],
                "forensic_recommended_actions": ["obtain HR meeting notes"],
                "forensic_risk_assessment": "moderate",
                "tribunal_probability": 0.6234567,
                "financial_exposure_summary": "mid five figures",
                "claim_strength_summary": "arguable",
                "settlement_recommendation": "explore early settlement"
            }),
        ));

        let options = SummaryOptions {
            ai_summary: true,
            ..SummaryOptions::default()
        };
        let summary = summarize_case(dir.path(), Some(provider), options).await;

        assert!(summary.executive_summary.as_ref().unwrap().contains("coordinated"));
        assert!(summary.overall_assessment.has_forensic_opinion());
        assert!(summary.overall_assessment.has_financial_risk());
        // Probability rounded to 4 decimal places.
        assert_eq!(summary.overall_assessment.tribunal_probability, Some(0.6235));
    }

    #[tokio::test]
    async fn test_summary_survives_llm_failure() {
        let dir = tempfile::tempdir().unwrap();
        // Provider refuses everything: summary must still be produced.
        let provider = Arc::new(MockProvider::new().with_refusal("case assessment", "no"));
        let options = SummaryOptions {
            ai_summary: true,
            ..SummaryOptions::default()
        };
        let summary = summarize_case(dir.path(), Some(provider), options).await;

        assert!(summary.executive_summary.is_none());
        assert!(summary.overall_assessment.forensic_summary.is_none());
        assert_eq!(summary.evidence_count, 2);
    }

    #[tokio::test]
    async fn test_aggregates_are_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(EvidenceStore::open(dir.path().join("store")).unwrap());
        let file = dir.path().join("doc.txt");
        fs::write(&file, "body").unwrap();
        let hash = store.ingest(&file, "CASE-1", "analyst").unwrap().sha256;
        let analysis = doc_with_quote("00", "Sarah Johnson", "I was told to stay quiet.");
        let mut analysis = analysis;
        analysis.file_metadata.sha256 = hash.clone();
        store.save_analysis(&hash, &analysis, "analyzer").unwrap();

        let aggregator: Aggregator<MockProvider> =
            Aggregator::new(Arc::clone(&store), None, SummaryOptions::default());
        let first = aggregator.summarize("CASE-1").await.unwrap();
        let second = aggregator.summarize("CASE-1").await.unwrap();

        let a = serde_json::to_value(&first.overall_assessment).unwrap();
        let b = serde_json::to_value(&second.overall_assessment).unwrap();
        assert_eq!(a, b);
    }
}
