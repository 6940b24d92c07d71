//! Shared fixtures for tests across the workspace.

use crate::custody::{ChainOfCustodyEvent, CustodyEventType};
use crate::document::{DocumentAnalysis, DocumentEntity, DocumentType, EntityType, Sentiment};
use crate::evidence::{EvidenceType, FileMetadata};
use crate::unified::UnifiedAnalysis;
use crate::{LegalSignificance, SCHEMA_VERSION};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeMap;

/// A fixed reference instant so fixtures are reproducible.
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 15, 9, 30, 0).unwrap()
}

/// File metadata for a small text exhibit with the given hash.
pub fn sample_metadata(sha256: &str) -> FileMetadata {
    FileMetadata {
        filename: "letter.txt".to_string(),
        file_size: 512,
        mime_type: "text/plain".to_string(),
        created_time: fixed_time(),
        modified_time: fixed_time(),
        extension: "txt".to_string(),
        sha256: sha256.to_string(),
    }
}

/// A person entity with sensible defaults.
pub fn sample_entity(name: &str) -> DocumentEntity {
    DocumentEntity {
        name: name.to_string(),
        entity_type: EntityType::Person,
        confidence: 0.9,
        context: format!("{name} appears in the body text"),
        relationship: None,
        quoted_text: None,
        associated_event: None,
    }
}

/// A neutral document analysis carrying the given entities.
pub fn sample_document_analysis(entities: Vec<DocumentEntity>) -> DocumentAnalysis {
    DocumentAnalysis {
        summary: "Correspondence regarding a scheduled meeting.".to_string(),
        entities,
        document_type: DocumentType::Letter,
        sentiment: Sentiment::Neutral,
        legal_significance: LegalSignificance::Medium,
        risk_flags: Vec::new(),
        confidence_overall: 0.85,
        word_statistics: None,
    }
}

/// A document-type unified analysis for one case, validated shape.
pub fn sample_unified_analysis(case_id: &str, sha256: &str) -> UnifiedAnalysis {
    UnifiedAnalysis {
        schema_version: SCHEMA_VERSION.to_string(),
        evidence_type: EvidenceType::Document,
        analysis_timestamp: fixed_time(),
        file_metadata: sample_metadata(sha256),
        case_ids: vec![case_id.to_string()],
        case_id: None,
        document_analysis: Some(sample_document_analysis(vec![sample_entity("Sarah Johnson")])),
        image_analysis: None,
        email_analysis: None,
        chain_of_custody: vec![ChainOfCustodyEvent::new(
            CustodyEventType::Ingest,
            "fixture",
            "ingested",
        )],
        exif_data: None,
        email_headers: None,
        labels: Vec::new(),
        notes: None,
        extra: BTreeMap::new(),
    }
}
