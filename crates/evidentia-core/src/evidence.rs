//! Evidence identity and file metadata.

use crate::validate::{Validate, check_non_empty, check_sha256};
use crate::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The closed set of evidence types the toolkit ingests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    Document,
    Image,
    Email,
    Pdf,
    Audio,
    Video,
    Other,
}

impl EvidenceType {
    /// Classifies a file by extension. MIME sniffing refines this at the
    /// store boundary; the extension mapping is the stable fallback.
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_ascii_lowercase().as_str() {
            "txt" | "md" | "rtf" | "doc" | "docx" | "odt" => Self::Document,
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "tiff" | "webp" | "heic" => Self::Image,
            "eml" | "msg" | "mbox" => Self::Email,
            "pdf" => Self::Pdf,
            "mp3" | "wav" | "m4a" | "ogg" | "flac" => Self::Audio,
            "mp4" | "mov" | "avi" | "mkv" | "webm" => Self::Video,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Image => "image",
            Self::Email => "email",
            Self::Pdf => "pdf",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for EvidenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata captured for an ingested file. Immutable after ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub filename: String,
    pub file_size: u64,
    pub mime_type: String,
    pub created_time: DateTime<Utc>,
    pub modified_time: DateTime<Utc>,
    /// File extension without the leading dot, lowercased.
    pub extension: String,
    /// Content hash; doubles as the evidence identity.
    pub sha256: String,
}

impl Validate for FileMetadata {
    fn validate(&self) -> CoreResult<()> {
        check_non_empty("file_metadata.filename", &self.filename)?;
        check_non_empty("file_metadata.mime_type", &self.mime_type)?;
        check_sha256("file_metadata.sha256", &self.sha256)?;
        if self.modified_time < self.created_time {
            return Err(CoreError::validation(
                "file_metadata.modified_time",
                "modified before created",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_metadata(sha256: &str) -> FileMetadata {
        let now = Utc::now();
        FileMetadata {
            filename: "letter.txt".to_string(),
            file_size: 512,
            mime_type: "text/plain".to_string(),
            created_time: now,
            modified_time: now,
            extension: "txt".to_string(),
            sha256: sha256.to_string(),
        }
    }

    #[test]
    fn test_evidence_type_from_extension() {
        assert_eq!(EvidenceType::from_extension("txt"), EvidenceType::Document);
        assert_eq!(EvidenceType::from_extension("JPG"), EvidenceType::Image);
        assert_eq!(EvidenceType::from_extension("eml"), EvidenceType::Email);
        assert_eq!(EvidenceType::from_extension("pdf"), EvidenceType::Pdf);
        assert_eq!(EvidenceType::from_extension("xyz"), EvidenceType::Other);
    }

    #[test]
    fn test_metadata_validation() {
        let good = sample_metadata(&"0".repeat(64));
        assert!(good.validate().is_ok());

        let mut bad = sample_metadata("not-a-hash");
        assert!(bad.validate().is_err());
        bad.sha256 = "0".repeat(64);
        bad.filename = String::new();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_evidence_type_serde_name() {
        let json = serde_json::to_string(&EvidenceType::Pdf).unwrap();
        assert_eq!(json, "\"pdf\"");
    }
}
