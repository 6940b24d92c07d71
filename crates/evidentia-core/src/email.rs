//! Structured email-thread analysis records.

use crate::validate::{Validate, check_non_empty, check_unit_interval, ser};
use crate::{CoreError, CoreResult, LegalSignificance, RiskFlag};
use serde::{Deserialize, Serialize};

/// Role a participant plays in a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Sender,
    Recipient,
    Cc,
    Bcc,
}

/// Inferred organisational authority of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityLevel {
    Executive,
    Management,
    Employee,
    External,
}

impl AuthorityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Executive => "executive",
            Self::Management => "management",
            Self::Employee => "employee",
            Self::External => "external",
        }
    }
}

/// Overall communication pattern of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationPattern {
    Professional,
    Escalating,
    Hostile,
    Retaliatory,
}

impl CommunicationPattern {
    /// Patterns that anchor a temporal sequence.
    pub fn is_anchor_pattern(&self) -> bool {
        matches!(self, Self::Hostile | Self::Retaliatory | Self::Escalating)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Professional => "professional",
            Self::Escalating => "escalating",
            Self::Hostile => "hostile",
            Self::Retaliatory => "retaliatory",
        }
    }
}

/// Kinds of escalation detected inside a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationType {
    ToneChange,
    NewRecipient,
    AuthorityEscalation,
    Threat,
    Deadline,
}

/// One participant in an email thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmailParticipant {
    pub email_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub role: ParticipantRole,
    pub authority_level: AuthorityLevel,
    #[serde(serialize_with = "ser::f64_4dp")]
    pub confidence: f64,
    pub message_count: u64,
    /// 0 = highly dominant communication style, 1 = highly deferential.
    #[serde(serialize_with = "ser::f64_4dp")]
    pub deference_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dominant_topics: Option<Vec<String>>,
}

impl Validate for EmailParticipant {
    fn validate(&self) -> CoreResult<()> {
        check_non_empty("participant.email_address", &self.email_address)?;
        check_unit_interval("participant.confidence", self.confidence)?;
        check_unit_interval("participant.deference_score", self.deference_score)?;
        Ok(())
    }
}

/// A single escalation point within a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EscalationEvent {
    /// 0-indexed position of the email in the date-sorted thread.
    pub email_position: u64,
    pub escalation_type: EscalationType,
    #[serde(serialize_with = "ser::f64_4dp")]
    pub confidence: f64,
    pub description: String,
    pub context: String,
}

impl Validate for EscalationEvent {
    fn validate(&self) -> CoreResult<()> {
        check_unit_interval("escalation.confidence", self.confidence)?;
        check_non_empty("escalation.description", &self.description)?;
        Ok(())
    }
}

/// Structured analysis of an email thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmailThreadAnalysis {
    pub thread_summary: String,
    pub participants: Vec<EmailParticipant>,
    pub communication_pattern: CommunicationPattern,
    /// One sentiment score per email, in thread order.
    #[serde(serialize_with = "ser::vec_f64_4dp")]
    pub sentiment_progression: Vec<f64>,
    pub escalation_events: Vec<EscalationEvent>,
    pub legal_significance: LegalSignificance,
    pub risk_flags: Vec<RiskFlag>,
    /// Human-readable reconstruction of the thread chronology.
    pub timeline_reconstruction: Vec<String>,
    #[serde(serialize_with = "ser::f64_4dp")]
    pub confidence_overall: f64,
}

impl EmailThreadAnalysis {
    /// Empty analysis for the no-LLM path; confidence 0.
    pub fn fallback(summary: impl Into<String>) -> Self {
        Self {
            thread_summary: summary.into(),
            participants: Vec::new(),
            communication_pattern: CommunicationPattern::Professional,
            sentiment_progression: Vec::new(),
            escalation_events: Vec::new(),
            legal_significance: LegalSignificance::Low,
            risk_flags: Vec::new(),
            timeline_reconstruction: Vec::new(),
            confidence_overall: 0.0,
        }
    }
}

impl Validate for EmailThreadAnalysis {
    fn validate(&self) -> CoreResult<()> {
        check_unit_interval("email_analysis.confidence_overall", self.confidence_overall)?;
        for (i, p) in self.participants.iter().enumerate() {
            p.validate().map_err(|e| reroot(e, &format!("email_analysis.participants[{i}]")))?;
        }
        for (i, e) in self.escalation_events.iter().enumerate() {
            e.validate()
                .map_err(|err| reroot(err, &format!("email_analysis.escalation_events[{i}]")))?;
        }
        for (i, s) in self.sentiment_progression.iter().enumerate() {
            if !(-1.0..=1.0).contains(s) {
                return Err(CoreError::validation(
                    format!("email_analysis.sentiment_progression[{i}]"),
                    format!("{s} is outside the [-1, 1] interval"),
                ));
            }
        }
        Ok(())
    }
}

fn reroot(error: CoreError, prefix: &str) -> CoreError {
    match error {
        CoreError::Validation { path, message } => CoreError::Validation {
            path: format!("{prefix}.{path}"),
            message,
        },
        other => other,
    }
}
