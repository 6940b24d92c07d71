//! Case summary and the generator-facing overall assessment.
//!
//! `OverallAssessment` is deliberately a closed record of optional
//! aggregates rather than a free-form mapping: each report generator
//! branches on the presence of exactly the fields it needs.

use crate::correlation::{CorrelationAnalysis, TimelineEvent};
use crate::document::Sentiment;
use crate::email::AuthorityLevel;
use crate::evidence::EvidenceType;
use crate::validate::{Validate, check_non_empty, ser};
use crate::{CoreResult, LegalSignificance, RiskFlag, SCHEMA_VERSION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One-line view of a single piece of evidence, used for chunked
/// executive-summary prompts and the report appendix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSummary {
    pub sha256: String,
    pub filename: String,
    pub evidence_type: EvidenceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal_significance: Option<LegalSignificance>,
}

/// A single quoted statement with its source context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotedStatement {
    pub text: String,
    pub sentiment: Sentiment,
    pub risk_flags: Vec<RiskFlag>,
    pub evidence_sha256: String,
}

/// All statements attributed to one canonical speaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerStatements {
    pub speaker: String,
    pub statements: Vec<QuotedStatement>,
    /// Most frequent sentiment across this speaker's statements.
    pub dominant_sentiment: Sentiment,
}

/// Aggregate of quoted statements across the case, keyed by speaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotedStatementsAggregate {
    /// Sorted by speaker name for deterministic output.
    pub speakers: Vec<SpeakerStatements>,
    pub total_statements: u64,
}

/// Coarse risk ladder used by communication aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Distribution of communication patterns across email evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunicationPatterns {
    /// Pattern name → thread count.
    pub pattern_counts: BTreeMap<String, u64>,
    pub risk_level: RiskLevel,
    pub escalation_detected: bool,
    pub email_count: u64,
}

/// Aggregated communication behaviour of one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantDynamics {
    pub email_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub authority_level: AuthorityLevel,
    pub message_count: u64,
    /// Mean deference score; 0 = dominant, 1 = deferential.
    #[serde(serialize_with = "ser::f64_4dp")]
    pub avg_deference_score: f64,
    pub dominant_topics: Vec<String>,
    /// Number of threads the participant appears in.
    pub thread_count: u64,
}

/// Power-dynamics aggregate across all email participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerDynamicsAggregate {
    /// Sorted by message count descending, then address ascending.
    pub participants: Vec<ParticipantDynamics>,
    /// Addresses of the most-connected participants.
    pub top_participants: Vec<String>,
}

/// An OCR excerpt sampled from one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrSample {
    pub evidence_sha256: String,
    pub excerpt: String,
}

/// Aggregate over image evidence with detected text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageOcrAggregate {
    pub images_total: u64,
    pub images_with_text: u64,
    pub images_with_timestamps: u64,
    pub images_with_people: u64,
    /// Evidence-value label → text samples from images in that band.
    pub samples_by_value: BTreeMap<String, Vec<OcrSample>>,
}

/// A directed relationship edge extracted from document entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub source: String,
    pub target: String,
    pub relationship: String,
}

/// Flat relationship network; nodes are never nested inside nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipNetwork {
    /// Sorted node names.
    pub nodes: Vec<String>,
    pub edges: Vec<RelationshipEdge>,
    /// Most-connected entities, by edge count descending.
    pub key_players: Vec<String>,
}

/// The aggregated, generator-facing view of a case.
///
/// Every field is optional; a `None` means the corresponding report is
/// quietly skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallAssessment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted_statements: Option<QuotedStatementsAggregate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub communication_patterns: Option<CommunicationPatterns>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_dynamics: Option<PowerDynamicsAggregate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ocr: Option<ImageOcrAggregate>,
    /// Semantic timeline events re-exported for generator convenience.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_events: Option<Vec<TimelineEvent>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_network: Option<RelationshipNetwork>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forensic_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forensic_legal_implications: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forensic_recommended_actions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forensic_risk_assessment: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "ser::opt_f64_4dp"
    )]
    pub tribunal_probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub financial_exposure_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_strength_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement_recommendation: Option<String>,
}

impl OverallAssessment {
    /// True when the four forensic-opinion fields are all present.
    pub fn has_forensic_opinion(&self) -> bool {
        self.forensic_summary.is_some()
            && self.forensic_legal_implications.is_some()
            && self.forensic_recommended_actions.is_some()
            && self.forensic_risk_assessment.is_some()
    }

    /// True when the four financial-risk fields are all present.
    pub fn has_financial_risk(&self) -> bool {
        self.tribunal_probability.is_some()
            && self.financial_exposure_summary.is_some()
            && self.claim_strength_summary.is_some()
            && self.settlement_recommendation.is_some()
    }
}

/// The complete distilled view of a case handed to the generators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseSummary {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub case_id: String,
    pub generation_timestamp: DateTime<Utc>,
    pub evidence_count: u64,
    pub evidence_types: Vec<EvidenceType>,
    pub evidence_summaries: Vec<EvidenceSummary>,
    pub correlation: CorrelationAnalysis,
    pub overall_assessment: OverallAssessment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executive_summary: Option<String>,
}

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

impl Validate for CaseSummary {
    fn validate(&self) -> CoreResult<()> {
        check_non_empty("case_summary.case_id", &self.case_id)?;
        self.correlation.validate()?;
        if let Some(p) = self.overall_assessment.tribunal_probability
            && !(0.0..=1.0).contains(&p)
        {
            return Err(crate::CoreError::validation(
                "overall_assessment.tribunal_probability",
                format!("{p} is outside the [0, 1] interval"),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn empty_correlation(case_id: &str) -> CorrelationAnalysis {
        CorrelationAnalysis {
            case_id: case_id.to_string(),
            evidence_count: 0,
            entity_correlations: vec![],
            timeline_events: vec![],
            temporal_sequences: vec![],
            timeline_gaps: vec![],
            legal_patterns: None,
            analysis_timestamp: Utc::now(),
        }
    }

    pub(crate) fn sample_summary(case_id: &str) -> CaseSummary {
        CaseSummary {
            schema_version: SCHEMA_VERSION.to_string(),
            case_id: case_id.to_string(),
            generation_timestamp: Utc::now(),
            evidence_count: 0,
            evidence_types: vec![],
            evidence_summaries: vec![],
            correlation: empty_correlation(case_id),
            overall_assessment: OverallAssessment::default(),
            executive_summary: None,
        }
    }

    #[test]
    fn test_forensic_opinion_presence() {
        let mut assessment = OverallAssessment::default();
        assert!(!assessment.has_forensic_opinion());

        assessment.forensic_summary = Some("s".to_string());
        assessment.forensic_legal_implications = Some(vec![]);
        assessment.forensic_recommended_actions = Some(vec![]);
        assert!(!assessment.has_forensic_opinion());

        assessment.forensic_risk_assessment = Some("r".to_string());
        assert!(assessment.has_forensic_opinion());
    }

    #[test]
    fn test_absent_fields_not_serialized() {
        let summary = sample_summary("CASE-1");
        let json = serde_json::to_value(&summary).unwrap();
        let assessment = json["overall_assessment"].as_object().unwrap();
        assert!(assessment.is_empty());
        assert!(json.get("executive_summary").is_none());
    }

    #[test]
    fn test_tribunal_probability_bounds() {
        let mut summary = sample_summary("CASE-1");
        summary.overall_assessment.tribunal_probability = Some(0.65);
        assert!(summary.validate().is_ok());

        summary.overall_assessment.tribunal_probability = Some(1.65);
        assert!(summary.validate().is_err());
    }

    #[test]
    fn test_case_summary_roundtrip() {
        let mut summary = sample_summary("CASE-1");
        summary.overall_assessment.forensic_summary = Some("opinion".to_string());
        summary.executive_summary = Some("exec".to_string());

        let json = serde_json::to_string(&summary).unwrap();
        let back: CaseSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, summary);
    }
}
