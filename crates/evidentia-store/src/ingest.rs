//! Evidence ingestion.
//!
//! Ingest computes the content hash, copies the original into the raw
//! tree, writes metadata and the opening custody event, and links the
//! evidence into its case. A second ingest of the same bytes only appends
//! a `case_association` event and case link. Failures roll back any
//! directories created by the failed call, so no partial state survives.

use crate::exif::extract_exif_map;
use crate::{EvidenceStore, LinkMode, StoreError, StoreResult};
use chrono::{DateTime, Utc};
use evidentia_core::{
    ChainOfCustodyEvent, CustodyEventType, EvidenceType, FileMetadata, fsjson, sha256_hex,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Outcome of ingesting one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionResult {
    pub sha256: String,
    pub filename: String,
    pub case_id: String,
    pub evidence_type: EvidenceType,
    /// True when the bytes were already in the store.
    pub already_existed: bool,
    pub link_mode: LinkMode,
}

impl EvidenceStore {
    /// Ingests a single file into a case.
    pub fn ingest(
        &self,
        file_path: &Path,
        case_id: &str,
        actor: &str,
    ) -> StoreResult<IngestionResult> {
        if !file_path.is_file() {
            return Err(StoreError::Ingest(format!(
                "file not found: {}",
                file_path.display()
            )));
        }

        let bytes = fs::read(file_path)?;
        let sha256 = sha256_hex(&bytes);
        let already_existed = self.contains(&sha256);

        if !already_existed {
            self.ingest_new(file_path, &bytes, &sha256, case_id, actor)
                .inspect_err(|_| self.rollback(&sha256))?;
        } else {
            self.append_custody_event(
                &sha256,
                ChainOfCustodyEvent::new(
                    CustodyEventType::CaseAssociation,
                    actor,
                    format!("evidence associated with case {case_id}"),
                )
                .with_metadata("case_id", serde_json::json!(case_id)),
            )?;
        }

        let link_mode = self.link_into(&sha256, &self.case_dir(case_id))?;
        if link_mode == LinkMode::Copy {
            // The fallback is recorded so consumers know the case file is
            // an independent copy of the raw original.
            self.append_custody_event(
                &sha256,
                ChainOfCustodyEvent::new(
                    CustodyEventType::CaseAssociation,
                    actor,
                    format!("case link for {case_id} materialised as a copy"),
                )
                .with_metadata("case_id", serde_json::json!(case_id))
                .with_metadata("link_mode", serde_json::json!("copy")),
            )?;
        }

        let filename = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = extension_of(file_path);
        let evidence_type = EvidenceType::from_extension(&extension);

        info!(sha256 = %sha256, case_id, already_existed, "evidence ingested");
        Ok(IngestionResult {
            sha256,
            filename,
            case_id: case_id.to_string(),
            evidence_type,
            already_existed,
            link_mode,
        })
    }

    fn ingest_new(
        &self,
        file_path: &Path,
        bytes: &[u8],
        sha256: &str,
        case_id: &str,
        actor: &str,
    ) -> StoreResult<()> {
        let extension = extension_of(file_path);
        let raw_dir = self.raw_dir(sha256);
        fs::create_dir_all(&raw_dir)?;

        // Raw original: write to a temp name, then rename into place.
        let target = raw_dir.join(format!("original.{extension}"));
        let tmp = raw_dir.join(format!("original.{extension}.tmp"));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &target)?;

        let metadata = build_metadata(file_path, bytes.len() as u64, sha256, &extension)?;
        fsjson::write_validated(&self.derived_dir(sha256).join("metadata.json"), &metadata)?;

        if EvidenceType::from_extension(&extension) == EvidenceType::Image
            && let Some(exif) = extract_exif_map(bytes)
        {
            fsjson::write_json(&self.derived_dir(sha256).join("exif.json"), &exif)?;
        }

        self.append_custody_event(
            sha256,
            ChainOfCustodyEvent::new(
                CustodyEventType::Ingest,
                actor,
                format!("evidence ingested from {}", file_path.display()),
            )
            .with_metadata("case_id", serde_json::json!(case_id)),
        )?;
        Ok(())
    }

    /// Removes the raw and derived directories for a hash after a failed
    /// first ingest.
    fn rollback(&self, sha256: &str) {
        let _ = fs::remove_dir_all(self.raw_dir(sha256));
        let _ = fs::remove_dir_all(self.derived_dir(sha256));
    }

    /// Ingests every regular file under a directory (one level of
    /// recursion per subdirectory), returning per-file outcomes.
    pub fn ingest_dir(
        &self,
        dir: &Path,
        case_id: &str,
        actor: &str,
    ) -> StoreResult<Vec<IngestionResult>> {
        let mut results = Vec::new();
        let mut paths: Vec<_> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();
        paths.sort();
        for path in paths {
            results.push(self.ingest(&path, case_id, actor)?);
        }
        Ok(results)
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| "bin".to_string())
}

fn build_metadata(
    path: &Path,
    file_size: u64,
    sha256: &str,
    extension: &str,
) -> StoreResult<FileMetadata> {
    let fs_meta = fs::metadata(path)?;
    let modified_time: DateTime<Utc> = fs_meta.modified().map(Into::into).unwrap_or_else(|_| Utc::now());
    let created_time: DateTime<Utc> = fs_meta
        .created()
        .map(Into::into)
        .unwrap_or(modified_time)
        .min(modified_time);

    let mime_type = mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string();

    Ok(FileMetadata {
        filename: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        file_size,
        mime_type,
        created_time,
        modified_time,
        extension: extension.to_string(),
        sha256: sha256.to_string(),
    })
}
