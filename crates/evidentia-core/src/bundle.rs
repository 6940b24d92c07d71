//! The exported forensic bundle (`evidence_bundle.v1.json`).
//!
//! A derived, court-facing view of one piece of evidence: identity,
//! custody trail, and the analysis records with their model provenance.

use crate::custody::ChainOfCustodyEvent;
use crate::document::DocumentAnalysis;
use crate::validate::{Validate, check_non_empty, check_sha256, check_unit_interval, ser};
use crate::{CoreError, CoreResult, SCHEMA_VERSION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Core identity of a bundled piece of evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceCore {
    pub evidence_id: Uuid,
    pub sha256: String,
    pub mime_type: String,
    pub bytes: u64,
    pub ingested_at: DateTime<Utc>,
    pub source_path: String,
}

impl Validate for EvidenceCore {
    fn validate(&self) -> CoreResult<()> {
        check_sha256("evidence.sha256", &self.sha256)?;
        check_non_empty("evidence.mime_type", &self.mime_type)?;
        if self.bytes == 0 {
            return Err(CoreError::validation("evidence.bytes", "must be at least 1"));
        }
        Ok(())
    }
}

/// Provenance of the model that produced an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub revision: String,
}

/// Parameters the analysis was produced under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParameters {
    /// Analyzer calls are deterministic; temperature must not exceed 0.
    #[serde(serialize_with = "ser::f64_4dp")]
    pub temperature: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage_out: Option<u64>,
}

impl Validate for AnalysisParameters {
    fn validate(&self) -> CoreResult<()> {
        if self.temperature > 0.0 {
            return Err(CoreError::validation(
                "parameters.temperature",
                format!("{} exceeds the deterministic ceiling of 0", self.temperature),
            ));
        }
        if let Some(hash) = &self.prompt_hash {
            check_sha256("parameters.prompt_hash", hash)?;
        }
        Ok(())
    }
}

/// One analysis run captured in the bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAnalysisRecord {
    pub analysis_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub model: ModelInfo,
    pub parameters: AnalysisParameters,
    pub outputs: DocumentAnalysis,
    #[serde(serialize_with = "ser::f64_4dp")]
    pub confidence_overall: f64,
}

impl Validate for DocumentAnalysisRecord {
    fn validate(&self) -> CoreResult<()> {
        self.parameters.validate()?;
        self.outputs.validate()?;
        check_unit_interval("analysis.confidence_overall", self.confidence_overall)?;
        Ok(())
    }
}

/// The exported forensic bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceBundle {
    pub schema_version: String,
    pub case_id: String,
    pub evidence: EvidenceCore,
    pub chain_of_custody: Vec<ChainOfCustodyEvent>,
    pub analyses: Vec<DocumentAnalysisRecord>,
}

impl EvidenceBundle {
    pub fn new(
        case_id: impl Into<String>,
        evidence: EvidenceCore,
        chain_of_custody: Vec<ChainOfCustodyEvent>,
        analyses: Vec<DocumentAnalysisRecord>,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            case_id: case_id.into(),
            evidence,
            chain_of_custody,
            analyses,
        }
    }
}

impl Validate for EvidenceBundle {
    fn validate(&self) -> CoreResult<()> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(CoreError::validation(
                "schema_version",
                format!(
                    "unsupported version `{}`, expected `{SCHEMA_VERSION}`",
                    self.schema_version
                ),
            ));
        }
        check_non_empty("case_id", &self.case_id)?;
        self.evidence.validate()?;
        for event in &self.chain_of_custody {
            event.validate()?;
        }
        for analysis in &self.analyses {
            analysis.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_core() -> EvidenceCore {
        EvidenceCore {
            evidence_id: Uuid::new_v4(),
            sha256: "9a".repeat(32),
            mime_type: "text/plain".to_string(),
            bytes: 420,
            ingested_at: Utc::now(),
            source_path: "/cases/letter.txt".to_string(),
        }
    }

    #[test]
    fn test_zero_byte_evidence_rejected() {
        let mut core = sample_core();
        core.bytes = 0;
        assert!(core.validate().is_err());
    }

    #[test]
    fn test_positive_temperature_rejected() {
        let params = AnalysisParameters {
            temperature: 0.7,
            prompt_hash: None,
            token_usage_in: None,
            token_usage_out: None,
        };
        let err = params.validate().unwrap_err().to_string();
        assert!(err.contains("temperature"));

        let zero = AnalysisParameters {
            temperature: 0.0,
            prompt_hash: None,
            token_usage_in: None,
            token_usage_out: None,
        };
        assert!(zero.validate().is_ok());
    }

    #[test]
    fn test_bundle_schema_version_check() {
        let mut bundle = EvidenceBundle::new("CASE-1", sample_core(), vec![], vec![]);
        assert!(bundle.validate().is_ok());

        bundle.schema_version = "0.9.0".to_string();
        assert!(bundle.validate().is_err());
    }

    #[test]
    fn test_bundle_roundtrip() {
        let bundle = EvidenceBundle::new("CASE-1", sample_core(), vec![], vec![]);
        let json = serde_json::to_string_pretty(&bundle).unwrap();
        let back: EvidenceBundle = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bundle);
    }
}
