//! Structured document analysis records.

use crate::validate::{Validate, check_non_empty, check_unit_interval, ser};
use crate::{CoreResult, LegalSignificance, RiskFlag};
use serde::{Deserialize, Serialize};

/// Entity kinds the document analyzer extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Organization,
    Date,
    LegalTerm,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Organization => "organization",
            Self::Date => "date",
            Self::LegalTerm => "legal_term",
        }
    }
}

/// Document classification assigned by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Email,
    Letter,
    Contract,
    Filing,
    Unknown,
}

/// Tone of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Hostile,
    Neutral,
    Professional,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hostile => "hostile",
            Self::Neutral => "neutral",
            Self::Professional => "professional",
        }
    }
}

/// A single entity extracted from a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(serialize_with = "ser::f64_4dp")]
    pub confidence: f64,
    /// Surrounding text that grounds the extraction.
    pub context: String,
    /// Relationship string, e.g. "supervisor of John Smith".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
    /// Verbatim quoted speech attributed to this entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted_text: Option<String>,
    /// For date entities, the event the date refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub associated_event: Option<String>,
}

impl Validate for DocumentEntity {
    fn validate(&self) -> CoreResult<()> {
        check_non_empty("entity.name", &self.name)?;
        check_unit_interval("entity.confidence", self.confidence)?;
        Ok(())
    }
}

/// Word-frequency statistics derived alongside the structured analysis.
/// Not consumed by correlation; kept for the fallback path and reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordStatistics {
    pub total_words: u64,
    pub unique_words: u64,
    pub top_words: Vec<WordCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordCount {
    pub word: String,
    pub count: u64,
}

/// Structured analysis of a text document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentAnalysis {
    pub summary: String,
    pub entities: Vec<DocumentEntity>,
    pub document_type: DocumentType,
    pub sentiment: Sentiment,
    pub legal_significance: LegalSignificance,
    pub risk_flags: Vec<RiskFlag>,
    #[serde(serialize_with = "ser::f64_4dp")]
    pub confidence_overall: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_statistics: Option<WordStatistics>,
}

impl DocumentAnalysis {
    /// An empty analysis used when the LLM is unavailable; confidence 0.
    pub fn fallback(summary: impl Into<String>, word_statistics: Option<WordStatistics>) -> Self {
        Self {
            summary: summary.into(),
            entities: Vec::new(),
            document_type: DocumentType::Unknown,
            sentiment: Sentiment::Neutral,
            legal_significance: LegalSignificance::Low,
            risk_flags: Vec::new(),
            confidence_overall: 0.0,
            word_statistics,
        }
    }
}

impl Validate for DocumentAnalysis {
    fn validate(&self) -> CoreResult<()> {
        check_unit_interval("document_analysis.confidence_overall", self.confidence_overall)?;
        for (i, entity) in self.entities.iter().enumerate() {
            entity.validate().map_err(|e| match e {
                crate::CoreError::Validation { path, message } => crate::CoreError::Validation {
                    path: format!("document_analysis.entities[{i}].{path}"),
                    message,
                },
                other => other,
            })?;
        }
        Ok(())
    }
}
