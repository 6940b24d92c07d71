//! Structured image analysis records.

use crate::validate::{Validate, check_non_empty, check_unit_interval, ser};
use crate::CoreResult;
use serde::{Deserialize, Serialize};

/// How much evidentiary weight an image is judged to carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceValue {
    Low,
    Medium,
    High,
}

impl EvidenceValue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for EvidenceValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quality and integrity flags specific to image evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageRiskFlag {
    LowQuality,
    TamperingSuspected,
    MetadataMissing,
    UnclearContent,
}

/// Structured analysis of an image (or one rasterised PDF page set).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageAnalysisStructured {
    pub scene_description: String,
    /// OCR-style text read from the image, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_objects: Option<Vec<String>>,
    pub people_present: bool,
    pub timestamps_visible: bool,
    pub potential_evidence_value: EvidenceValue,
    pub analysis_notes: String,
    #[serde(serialize_with = "ser::f64_4dp")]
    pub confidence_overall: f64,
    pub risk_flags: Vec<ImageRiskFlag>,
}

impl ImageAnalysisStructured {
    /// Empty analysis for the no-LLM path; flagged `metadata_missing`.
    pub fn fallback(notes: impl Into<String>) -> Self {
        Self {
            scene_description: String::from("unanalyzed"),
            detected_text: None,
            detected_objects: None,
            people_present: false,
            timestamps_visible: false,
            potential_evidence_value: EvidenceValue::Low,
            analysis_notes: notes.into(),
            confidence_overall: 0.0,
            risk_flags: vec![ImageRiskFlag::MetadataMissing],
        }
    }

    pub fn has_text(&self) -> bool {
        self.detected_text
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
    }
}

impl Validate for ImageAnalysisStructured {
    fn validate(&self) -> CoreResult<()> {
        check_non_empty("image_analysis.scene_description", &self.scene_description)?;
        check_unit_interval("image_analysis.confidence_overall", self.confidence_overall)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_flags_metadata_missing() {
        let analysis = ImageAnalysisStructured::fallback("no API key configured");
        assert_eq!(analysis.confidence_overall, 0.0);
        assert!(analysis.risk_flags.contains(&ImageRiskFlag::MetadataMissing));
        assert!(analysis.validate().is_ok());
    }

    #[test]
    fn test_has_text() {
        let mut analysis = ImageAnalysisStructured::fallback("x");
        assert!(!analysis.has_text());
        analysis.detected_text = Some("  ".to_string());
        assert!(!analysis.has_text());
        analysis.detected_text = Some("NOTICE OF TERMINATION".to_string());
        assert!(analysis.has_text());
    }

    #[test]
    fn test_evidence_value_ordering() {
        assert!(EvidenceValue::High > EvidenceValue::Medium);
        assert!(EvidenceValue::Medium > EvidenceValue::Low);
    }

    #[test]
    fn test_unknown_risk_flag_rejected() {
        let result: Result<ImageRiskFlag, _> = serde_json::from_str("\"cursed\"");
        assert!(result.is_err());
    }
}
