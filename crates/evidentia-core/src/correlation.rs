//! Cross-evidence correlation records.

use crate::document::EntityType;
use crate::evidence::EvidenceType;
use crate::validate::{Validate, check_non_empty, check_sha256, check_unit_interval, ser};
use crate::{CoreError, CoreResult, LegalSignificance};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One sighting of a correlated entity in a specific piece of evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceOccurrence {
    pub evidence_sha256: String,
    pub context: String,
    #[serde(serialize_with = "ser::f64_4dp")]
    pub confidence: f64,
}

/// An entity that appears in at least two distinct pieces of evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelatedEntity {
    /// Canonical display name chosen for the cluster.
    pub entity_name: String,
    pub entity_type: EntityType,
    pub occurrence_count: u64,
    #[serde(serialize_with = "ser::f64_4dp")]
    pub confidence_average: f64,
    pub evidence_occurrences: Vec<EvidenceOccurrence>,
}

impl Validate for CorrelatedEntity {
    fn validate(&self) -> CoreResult<()> {
        check_non_empty("correlated_entity.entity_name", &self.entity_name)?;
        if self.occurrence_count < 2 {
            return Err(CoreError::validation(
                "correlated_entity.occurrence_count",
                "a correlated entity requires at least two occurrences",
            ));
        }
        if self.occurrence_count as usize != self.evidence_occurrences.len() {
            return Err(CoreError::validation(
                "correlated_entity.occurrence_count",
                format!(
                    "count {} does not match {} listed occurrences",
                    self.occurrence_count,
                    self.evidence_occurrences.len()
                ),
            ));
        }
        check_unit_interval("correlated_entity.confidence_average", self.confidence_average)?;
        for (i, occ) in self.evidence_occurrences.iter().enumerate() {
            check_sha256(
                &format!("correlated_entity.evidence_occurrences[{i}].evidence_sha256"),
                &occ.evidence_sha256,
            )?;
        }
        Ok(())
    }
}

/// Source kinds a timeline event can come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEventType {
    FileCreated,
    AnalysisPerformed,
    Communication,
    PhotoTaken,
    DocumentDateReference,
    SemanticEvent,
}

impl TimelineEventType {
    /// Housekeeping events are excluded from gap detection.
    pub fn is_housekeeping(&self) -> bool {
        matches!(self, Self::FileCreated | Self::AnalysisPerformed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileCreated => "file_created",
            Self::AnalysisPerformed => "analysis_performed",
            Self::Communication => "communication",
            Self::PhotoTaken => "photo_taken",
            Self::DocumentDateReference => "document_date_reference",
            Self::SemanticEvent => "semantic_event",
        }
    }
}

impl std::fmt::Display for TimelineEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reconstructed event on the case timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub timestamp: DateTime<Utc>,
    pub evidence_sha256: String,
    pub evidence_type: EvidenceType,
    pub event_type: TimelineEventType,
    pub description: String,
    #[serde(serialize_with = "ser::f64_4dp")]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_classification: Option<String>,
}

impl Validate for TimelineEvent {
    fn validate(&self) -> CoreResult<()> {
        check_sha256("timeline_event.evidence_sha256", &self.evidence_sha256)?;
        check_unit_interval("timeline_event.confidence", self.confidence)?;
        Ok(())
    }
}

/// A cluster of timeline events around a legally significant anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalSequence {
    /// Evidence hash of the anchoring event.
    pub anchor_sha256: String,
    pub events: Vec<TimelineEvent>,
    pub legal_significance: LegalSignificance,
}

/// A stretch of calendar time with no substantive evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineGap {
    pub gap_start: DateTime<Utc>,
    pub gap_end: DateTime<Utc>,
    #[serde(serialize_with = "ser::f64_4dp")]
    pub duration_hours: f64,
    pub significance: LegalSignificance,
    /// Summary of the event bounding the gap on each side.
    pub before_event: String,
    pub after_event: String,
}

/// A conflict between statements in different pieces of evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Contradiction {
    pub summary: String,
    pub conflicting_evidence: Vec<String>,
    /// 0–1 severity; contradictions at or above 0.7 are always surfaced.
    #[serde(serialize_with = "ser::f64_4dp")]
    pub severity: f64,
    pub explanation: String,
}

/// Independent evidence supporting the same claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorroborationLink {
    pub claim: String,
    pub supporting_evidence: Vec<String>,
    #[serde(serialize_with = "ser::f64_4dp")]
    pub strength: f64,
    pub explanation: String,
}

/// Evidence the record suggests should exist but was not provided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvidenceGap {
    pub description: String,
    pub significance: LegalSignificance,
}

/// Envelope for AI-detected legal patterns across the case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LegalPatternAnalysis {
    pub contradictions: Vec<Contradiction>,
    pub corroboration: Vec<CorroborationLink>,
    pub evidence_gaps: Vec<EvidenceGap>,
    pub pattern_summary: String,
    #[serde(serialize_with = "ser::f64_4dp")]
    pub confidence: f64,
}

impl LegalPatternAnalysis {
    /// Contradictions that must always be surfaced in reports.
    pub fn severe_contradictions(&self) -> impl Iterator<Item = &Contradiction> {
        self.contradictions.iter().filter(|c| c.severity >= 0.7)
    }
}

/// The complete correlation result for a case snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationAnalysis {
    pub case_id: String,
    pub evidence_count: u64,
    pub entity_correlations: Vec<CorrelatedEntity>,
    pub timeline_events: Vec<TimelineEvent>,
    pub temporal_sequences: Vec<TemporalSequence>,
    pub timeline_gaps: Vec<TimelineGap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal_patterns: Option<LegalPatternAnalysis>,
    pub analysis_timestamp: DateTime<Utc>,
}

impl Validate for CorrelationAnalysis {
    fn validate(&self) -> CoreResult<()> {
        check_non_empty("correlation.case_id", &self.case_id)?;
        for entity in &self.entity_correlations {
            entity.validate()?;
        }
        for event in &self.timeline_events {
            event.validate()?;
        }
        // Timeline monotonicity after the canonical sort.
        for pair in self.timeline_events.windows(2) {
            if pair[1].timestamp < pair[0].timestamp {
                return Err(CoreError::validation(
                    "correlation.timeline_events",
                    "events are not sorted by timestamp",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occurrence(hash: &str) -> EvidenceOccurrence {
        EvidenceOccurrence {
            evidence_sha256: hash.to_string(),
            context: "context".to_string(),
            confidence: 0.8,
        }
    }

    #[test]
    fn test_correlated_entity_minimum_occurrences() {
        let entity = CorrelatedEntity {
            entity_name: "Sarah Johnson".to_string(),
            entity_type: EntityType::Person,
            occurrence_count: 1,
            confidence_average: 0.8,
            evidence_occurrences: vec![occurrence(&"a".repeat(64))],
        };
        assert!(entity.validate().is_err());
    }

    #[test]
    fn test_correlated_entity_count_mismatch() {
        let entity = CorrelatedEntity {
            entity_name: "Sarah Johnson".to_string(),
            entity_type: EntityType::Person,
            occurrence_count: 3,
            confidence_average: 0.8,
            evidence_occurrences: vec![occurrence(&"a".repeat(64)), occurrence(&"b".repeat(64))],
        };
        let err = entity.validate().unwrap_err().to_string();
        assert!(err.contains("occurrence_count"));
    }

    #[test]
    fn test_severe_contradictions_filter() {
        let patterns = LegalPatternAnalysis {
            contradictions: vec![
                Contradiction {
                    summary: "date conflict".to_string(),
                    conflicting_evidence: vec![],
                    severity: 0.9,
                    explanation: "x".to_string(),
                },
                Contradiction {
                    summary: "minor wording".to_string(),
                    conflicting_evidence: vec![],
                    severity: 0.3,
                    explanation: "y".to_string(),
                },
            ],
            corroboration: vec![],
            evidence_gaps: vec![],
            pattern_summary: "s".to_string(),
            confidence: 0.5,
        };
        let severe: Vec<_> = patterns.severe_contradictions().collect();
        assert_eq!(severe.len(), 1);
        assert_eq!(severe[0].summary, "date conflict");
    }

    #[test]
    fn test_unsorted_timeline_rejected() {
        let now = Utc::now();
        let event = |offset: i64| TimelineEvent {
            timestamp: now + chrono::Duration::hours(offset),
            evidence_sha256: "c".repeat(64),
            evidence_type: EvidenceType::Document,
            event_type: TimelineEventType::Communication,
            description: "d".to_string(),
            confidence: 1.0,
            ai_classification: None,
        };

        let correlation = CorrelationAnalysis {
            case_id: "CASE-1".to_string(),
            evidence_count: 1,
            entity_correlations: vec![],
            timeline_events: vec![event(5), event(1)],
            temporal_sequences: vec![],
            timeline_gaps: vec![],
            legal_patterns: None,
            analysis_timestamp: now,
        };
        assert!(correlation.validate().is_err());
    }

    #[test]
    fn test_correlation_roundtrip() {
        let now = Utc::now();
        let correlation = CorrelationAnalysis {
            case_id: "CASE-1".to_string(),
            evidence_count: 2,
            entity_correlations: vec![CorrelatedEntity {
                entity_name: "Sarah Johnson".to_string(),
                entity_type: EntityType::Person,
                occurrence_count: 2,
                confidence_average: 0.85,
                evidence_occurrences: vec![occurrence(&"a".repeat(64)), occurrence(&"b".repeat(64))],
            }],
            timeline_events: vec![],
            temporal_sequences: vec![],
            timeline_gaps: vec![],
            legal_patterns: None,
            analysis_timestamp: now,
        };

        let json = serde_json::to_string(&correlation).unwrap();
        let back: CorrelationAnalysis = serde_json::from_str(&json).unwrap();
        assert_eq!(back, correlation);
        assert!(back.validate().is_ok());
    }

    #[test]
    fn test_housekeeping_event_kinds() {
        assert!(TimelineEventType::FileCreated.is_housekeeping());
        assert!(TimelineEventType::AnalysisPerformed.is_housekeeping());
        assert!(!TimelineEventType::Communication.is_housekeeping());
        assert!(!TimelineEventType::SemanticEvent.is_housekeeping());
    }
}
