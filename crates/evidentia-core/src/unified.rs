//! The per-evidence unified analysis record (`analysis.v1.json`).

use crate::custody::ChainOfCustodyEvent;
use crate::document::DocumentAnalysis;
use crate::email::EmailThreadAnalysis;
use crate::evidence::{EvidenceType, FileMetadata};
use crate::image::ImageAnalysisStructured;
use crate::validate::Validate;
use crate::{CoreError, CoreResult, SCHEMA_VERSION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

/// The record persisted per evidence item after analysis.
///
/// Readers accept unknown top-level fields (captured in `extra`) so newer
/// writers remain consumable, while the strictly-typed sub-records reject
/// unknown fields. A legacy scalar `case_id` is accepted on read and
/// projected into `case_ids` by [`UnifiedAnalysis::normalize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedAnalysis {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub evidence_type: EvidenceType,
    pub analysis_timestamp: DateTime<Utc>,
    pub file_metadata: FileMetadata,
    #[serde(default)]
    pub case_ids: Vec<String>,
    /// Legacy scalar form; folded into `case_ids` on normalization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_analysis: Option<DocumentAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_analysis: Option<ImageAnalysisStructured>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_analysis: Option<EmailThreadAnalysis>,
    #[serde(default)]
    pub chain_of_custody: Vec<ChainOfCustodyEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exif_data: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_headers: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Unknown top-level fields, preserved across a read/write cycle.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl UnifiedAnalysis {
    /// Projects the legacy `case_id` scalar into `case_ids` and
    /// deduplicates the list while keeping first-seen order.
    pub fn normalize(&mut self) {
        if let Some(case_id) = self.case_id.take()
            && !self.case_ids.contains(&case_id)
        {
            self.case_ids.push(case_id);
        }
        let mut seen = std::collections::BTreeSet::new();
        self.case_ids.retain(|c| seen.insert(c.clone()));
    }

    /// The analysis confidence, whichever per-type block is populated.
    pub fn confidence(&self) -> f64 {
        if let Some(doc) = &self.document_analysis {
            doc.confidence_overall
        } else if let Some(img) = &self.image_analysis {
            img.confidence_overall
        } else if let Some(email) = &self.email_analysis {
            email.confidence_overall
        } else {
            0.0
        }
    }

    fn populated_blocks(&self) -> usize {
        [
            self.document_analysis.is_some(),
            self.image_analysis.is_some(),
            self.email_analysis.is_some(),
        ]
        .into_iter()
        .filter(|&b| b)
        .count()
    }
}

impl Validate for UnifiedAnalysis {
    fn validate(&self) -> CoreResult<()> {
        self.file_metadata.validate()?;

        if self.case_ids.is_empty() && self.case_id.is_none() {
            return Err(CoreError::validation("case_ids", "must not be empty"));
        }

        if self.populated_blocks() != 1 {
            return Err(CoreError::validation(
                "analysis",
                format!(
                    "exactly one per-type analysis block must be populated, found {}",
                    self.populated_blocks()
                ),
            ));
        }

        let consistent = match self.evidence_type {
            EvidenceType::Document => self.document_analysis.is_some(),
            // A scanned PDF is delegated to the image analyzer, so either
            // block is consistent for PDF evidence.
            EvidenceType::Pdf => {
                self.document_analysis.is_some() || self.image_analysis.is_some()
            }
            EvidenceType::Image => self.image_analysis.is_some(),
            EvidenceType::Email => self.email_analysis.is_some(),
            // Audio/video/other carry no structured analyzer yet; a
            // document-style fallback block is accepted for them.
            EvidenceType::Audio | EvidenceType::Video | EvidenceType::Other => {
                self.document_analysis.is_some()
            }
        };
        if !consistent {
            return Err(CoreError::validation(
                "analysis",
                format!(
                    "populated analysis block does not match evidence_type `{}`",
                    self.evidence_type
                ),
            ));
        }

        if let Some(doc) = &self.document_analysis {
            doc.validate()?;
        }
        if let Some(img) = &self.image_analysis {
            img.validate()?;
        }
        if let Some(email) = &self.email_analysis {
            email.validate()?;
        }
        for event in &self.chain_of_custody {
            event.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::CustodyEventType;
    use crate::document::DocumentAnalysis;

    pub(crate) fn sample_analysis(case_id: &str) -> UnifiedAnalysis {
        let now = Utc::now();
        UnifiedAnalysis {
            schema_version: SCHEMA_VERSION.to_string(),
            evidence_type: EvidenceType::Document,
            analysis_timestamp: now,
            file_metadata: FileMetadata {
                filename: "letter.txt".to_string(),
                file_size: 128,
                mime_type: "text/plain".to_string(),
                created_time: now,
                modified_time: now,
                extension: "txt".to_string(),
                sha256: "7f".repeat(32),
            },
            case_ids: vec![case_id.to_string()],
            case_id: None,
            document_analysis: Some(DocumentAnalysis::fallback("sample", None)),
            image_analysis: None,
            email_analysis: None,
            chain_of_custody: vec![ChainOfCustodyEvent::new(
                CustodyEventType::Ingest,
                "system",
                "ingested",
            )],
            exif_data: None,
            email_headers: None,
            labels: Vec::new(),
            notes: None,
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn test_exactly_one_block_enforced() {
        let mut analysis = sample_analysis("CASE-1");
        assert!(analysis.validate().is_ok());

        analysis.image_analysis = Some(ImageAnalysisStructured::fallback("x"));
        assert!(analysis.validate().is_err());

        analysis.document_analysis = None;
        // Image block under document evidence type is inconsistent.
        assert!(analysis.validate().is_err());
    }

    #[test]
    fn test_legacy_case_id_projected() {
        let mut analysis = sample_analysis("CASE-1");
        analysis.case_id = Some("CASE-2".to_string());
        analysis.normalize();
        assert_eq!(analysis.case_ids, vec!["CASE-1", "CASE-2"]);
        assert!(analysis.case_id.is_none());

        // Duplicate projection is a no-op.
        analysis.case_id = Some("CASE-1".to_string());
        analysis.normalize();
        assert_eq!(analysis.case_ids, vec!["CASE-1", "CASE-2"]);
    }

    #[test]
    fn test_unknown_top_level_fields_preserved() {
        let mut json = serde_json::to_value(sample_analysis("CASE-1")).unwrap();
        json.as_object_mut()
            .unwrap()
            .insert("future_field".to_string(), serde_json::json!({"v": 2}));

        let back: UnifiedAnalysis = serde_json::from_value(json).unwrap();
        assert!(back.validate().is_ok());
        assert_eq!(back.extra["future_field"]["v"], 2);

        // The field survives a re-serialization.
        let rewritten = serde_json::to_value(&back).unwrap();
        assert_eq!(rewritten["future_field"]["v"], 2);
    }

    #[test]
    fn test_empty_case_ids_rejected() {
        let mut analysis = sample_analysis("CASE-1");
        analysis.case_ids.clear();
        assert!(analysis.validate().is_err());
    }

    #[test]
    fn test_roundtrip_equality() {
        let analysis = sample_analysis("CASE-1");
        let json = serde_json::to_string(&analysis).unwrap();
        let back: UnifiedAnalysis = serde_json::from_str(&json).unwrap();
        assert_eq!(back, analysis);
    }
}
