//! Evidentia-Core: structured evidence records and validation.
//!
//! This crate defines every record that crosses a module boundary in the
//! Evidentia analysis engine:
//!
//! - **Evidence metadata** with content addressing ([`evidence::FileMetadata`])
//! - **Chain of custody** events ([`custody::ChainOfCustodyEvent`])
//! - **Per-type analyses** for documents, images and email threads
//! - **Correlation records** (entities, timeline, sequences, gaps, patterns)
//! - **Case summaries** with the generator-facing [`summary::OverallAssessment`]
//! - **Forensic bundles** ([`bundle::EvidenceBundle`]) for export
//!
//! All records are validated at construction via the [`validate::Validate`]
//! trait. Enum fields are closed sets; unknown values are rejected during
//! deserialization. Floating-point confidences and scores are rounded to
//! four decimal places on serialization, and timestamps are ISO-8601 with
//! timezone. Disk I/O goes through [`fsjson`] so the temp-then-rename write
//! discipline holds for every artefact.

pub mod bundle;
pub mod correlation;
pub mod custody;
pub mod document;
pub mod email;
pub mod evidence;
pub mod fsjson;
pub mod image;
pub mod summary;
pub mod testing;
pub mod unified;
pub mod validate;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use bundle::{AnalysisParameters, DocumentAnalysisRecord, EvidenceBundle, EvidenceCore, ModelInfo};
pub use correlation::{
    CorrelatedEntity, CorrelationAnalysis, Contradiction, CorroborationLink, EvidenceGap,
    EvidenceOccurrence, LegalPatternAnalysis, TemporalSequence, TimelineEvent, TimelineEventType,
    TimelineGap,
};
pub use custody::{ChainOfCustodyEvent, CustodyEventType};
pub use document::{
    DocumentAnalysis, DocumentEntity, DocumentType, EntityType, Sentiment, WordCount,
    WordStatistics,
};
pub use email::{
    AuthorityLevel, CommunicationPattern, EmailParticipant, EmailThreadAnalysis, EscalationEvent,
    EscalationType, ParticipantRole,
};
pub use evidence::{EvidenceType, FileMetadata};
pub use image::{EvidenceValue, ImageAnalysisStructured, ImageRiskFlag};
pub use summary::{CaseSummary, EvidenceSummary, OverallAssessment};
pub use unified::UnifiedAnalysis;
pub use validate::{Validate, round4, sha256_hex};

/// Schema version stamped on every persisted forensic artefact.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Errors raised by the schema and validation layer.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A record failed construction-time validation. Carries the path of
    /// the offending field.
    #[error("schema validation failed at `{path}`: {message}")]
    Validation { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Builds a validation error for the given field path.
    pub fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for schema-layer operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Legal significance of a piece of evidence or an event cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegalSignificance {
    Critical,
    High,
    Medium,
    Low,
}

impl LegalSignificance {
    /// True for the significance levels that anchor a temporal sequence.
    pub fn is_elevated(&self) -> bool {
        matches!(self, Self::Critical | Self::High)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for LegalSignificance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk flags raised by document and email analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlag {
    Threatening,
    Deadline,
    Pii,
    Confidential,
    TimeSensitive,
    RetaliationIndicators,
    Harassment,
    Discrimination,
}

impl RiskFlag {
    /// Flags that make an event a temporal-sequence anchor.
    pub fn is_anchor_flag(&self) -> bool {
        matches!(
            self,
            Self::RetaliationIndicators | Self::Harassment | Self::Discrimination | Self::Threatening
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Threatening => "threatening",
            Self::Deadline => "deadline",
            Self::Pii => "pii",
            Self::Confidential => "confidential",
            Self::TimeSensitive => "time_sensitive",
            Self::RetaliationIndicators => "retaliation_indicators",
            Self::Harassment => "harassment",
            Self::Discrimination => "discrimination",
        }
    }
}

impl std::fmt::Display for RiskFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
