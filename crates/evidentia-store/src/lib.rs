//! Evidentia-Store: content-addressed evidence storage.
//!
//! Originals are stored immutably under `raw/sha256=<hex>/`, derived
//! artefacts (metadata, analyses, custody trail, forensic bundles) under
//! `derived/sha256=<hex>/`, and case/label membership as hard links (or
//! copies where linking is unsupported) under `cases/` and `labels/`:
//!
//! ```text
//! <root>/
//!   raw/sha256=<hex>/original.<ext>
//!   derived/sha256=<hex>/
//!      metadata.json
//!      analysis.v1.json
//!      evidence_bundle.v1.json
//!      chain_of_custody.json
//!      exif.json
//!   cases/<case_id>/<hash>.<ext>
//!   labels/<label>/<hash>.<ext>
//! ```
//!
//! The store is the only writer of this tree. All JSON goes through
//! `evidentia_core::fsjson`, so writes are temp-then-rename and every
//! file carries a trailing newline.

pub mod exif;
pub mod ingest;
pub mod maintenance;

use chrono::{DateTime, Utc};
use evidentia_core::{
    ChainOfCustodyEvent, CoreError, CustodyEventType, EvidenceBundle, FileMetadata,
    UnifiedAnalysis, Validate, fsjson,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub use ingest::IngestionResult;
pub use maintenance::{CleanupResult, StorageStats};

/// Errors during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ingest failed: {0}")]
    Ingest(String),

    #[error("unknown evidence hash: {0}")]
    UnknownHash(String),

    #[error("store consistency error: {0}")]
    Consistency(String),

    #[error(transparent)]
    Schema(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// How a case or label link was materialised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkMode {
    Hardlink,
    Copy,
}

impl LinkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hardlink => "hardlink",
            Self::Copy => "copy",
        }
    }
}

/// The content-addressed evidence store.
pub struct EvidenceStore {
    root: PathBuf,
}

impl EvidenceStore {
    /// Opens (and creates, if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        for dir in ["raw", "derived", "cases", "labels"] {
            fs::create_dir_all(root.join(dir))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn raw_dir(&self, sha256: &str) -> PathBuf {
        self.root.join("raw").join(format!("sha256={sha256}"))
    }

    pub(crate) fn derived_dir(&self, sha256: &str) -> PathBuf {
        self.root.join("derived").join(format!("sha256={sha256}"))
    }

    pub(crate) fn case_dir(&self, case_id: &str) -> PathBuf {
        self.root.join("cases").join(case_id)
    }

    pub(crate) fn label_dir(&self, label: &str) -> PathBuf {
        self.root.join("labels").join(label)
    }

    /// True once the hash has been ingested.
    pub fn contains(&self, sha256: &str) -> bool {
        self.raw_dir(sha256).is_dir()
    }

    /// Path to the immutable original, or `None` if the hash is unknown.
    pub fn get_original_path(&self, sha256: &str) -> StoreResult<Option<PathBuf>> {
        let raw = self.raw_dir(sha256);
        if !raw.is_dir() {
            return Ok(None);
        }
        for entry in fs::read_dir(&raw)? {
            let path = entry?.path();
            if path
                .file_stem()
                .is_some_and(|stem| stem.to_string_lossy() == "original")
            {
                return Ok(Some(path));
            }
        }
        Err(StoreError::Consistency(format!(
            "raw directory for {sha256} contains no original file"
        )))
    }

    /// Reads the raw bytes of the original.
    pub fn read_original(&self, sha256: &str) -> StoreResult<Vec<u8>> {
        let path = self
            .get_original_path(sha256)?
            .ok_or_else(|| StoreError::UnknownHash(sha256.to_string()))?;
        Ok(fs::read(path)?)
    }

    /// Validated file metadata for an ingested hash.
    pub fn get_metadata(&self, sha256: &str) -> StoreResult<FileMetadata> {
        let path = self.derived_dir(sha256).join("metadata.json");
        if !path.is_file() {
            return Err(StoreError::UnknownHash(sha256.to_string()));
        }
        Ok(fsjson::read_validated(&path)?)
    }

    /// The full custody trail for a hash, append-ordered.
    pub fn read_custody(&self, sha256: &str) -> StoreResult<Vec<ChainOfCustodyEvent>> {
        let path = self.derived_dir(sha256).join("chain_of_custody.json");
        if !path.is_file() {
            return Ok(Vec::new());
        }
        Ok(fsjson::read_json(&path)?)
    }

    /// Appends one custody event. Read-whole, append, write-temp, rename;
    /// existing events are never altered or removed.
    pub fn append_custody_event(
        &self,
        sha256: &str,
        event: ChainOfCustodyEvent,
    ) -> StoreResult<()> {
        event.validate()?;
        let mut events = self.read_custody(sha256)?;
        events.push(event);
        let path = self.derived_dir(sha256).join("chain_of_custody.json");
        fsjson::write_json(&path, &events)?;
        Ok(())
    }

    /// Loads the unified analysis for a hash, if one has been produced.
    pub fn get_analysis(&self, sha256: &str) -> StoreResult<Option<UnifiedAnalysis>> {
        let path = self.derived_dir(sha256).join("analysis.v1.json");
        if !path.is_file() {
            return Ok(None);
        }
        let mut analysis: UnifiedAnalysis = fsjson::read_json(&path)?;
        analysis.normalize();
        analysis.validate().map_err(StoreError::Schema)?;
        Ok(Some(analysis))
    }

    /// Persists an analysis, appends a completed `analyze` custody event,
    /// and materialises label links. Overwrites any previous analysis;
    /// the custody trail keeps the history.
    pub fn save_analysis(
        &self,
        sha256: &str,
        analysis: &UnifiedAnalysis,
        actor: &str,
    ) -> StoreResult<()> {
        self.save_analysis_inner(sha256, analysis, actor, "completed", None)
    }

    /// Persists a partial analysis produced after an analyzer failure.
    /// The custody event carries `status=failed` and the error kind.
    pub fn save_failed_analysis(
        &self,
        sha256: &str,
        analysis: &UnifiedAnalysis,
        actor: &str,
        error_kind: &str,
    ) -> StoreResult<()> {
        self.save_analysis_inner(sha256, analysis, actor, "failed", Some(error_kind))
    }

    fn save_analysis_inner(
        &self,
        sha256: &str,
        analysis: &UnifiedAnalysis,
        actor: &str,
        status: &str,
        error_kind: Option<&str>,
    ) -> StoreResult<()> {
        if !self.contains(sha256) {
            return Err(StoreError::Consistency(format!(
                "cannot save analysis for non-ingested hash {sha256}"
            )));
        }
        analysis.validate()?;

        let path = self.derived_dir(sha256).join("analysis.v1.json");
        fsjson::write_json(&path, analysis)?;

        let mut event = ChainOfCustodyEvent::new(
            CustodyEventType::Analyze,
            actor,
            format!("{} analysis recorded", analysis.evidence_type),
        )
        .with_metadata("status", serde_json::json!(status));
        if let Some(kind) = error_kind {
            event = event.with_metadata("error_kind", serde_json::json!(kind));
        }
        self.append_custody_event(sha256, event)?;

        for label in &analysis.labels {
            self.link_into(sha256, &self.label_dir(label))?;
        }

        info!(sha256, evidence_type = %analysis.evidence_type, status, "analysis saved");
        Ok(())
    }

    /// Writes the derived forensic bundle and records an export event.
    pub fn save_bundle(&self, sha256: &str, bundle: &EvidenceBundle) -> StoreResult<()> {
        if !self.contains(sha256) {
            return Err(StoreError::Consistency(format!(
                "cannot export bundle for non-ingested hash {sha256}"
            )));
        }
        bundle.validate()?;
        let path = self.derived_dir(sha256).join("evidence_bundle.v1.json");
        fsjson::write_json(&path, bundle)?;
        self.append_custody_event(
            sha256,
            ChainOfCustodyEvent::new(
                CustodyEventType::Export,
                "store",
                format!("forensic bundle exported for case {}", bundle.case_id),
            ),
        )?;
        Ok(())
    }

    /// Reads a previously exported bundle, if present.
    pub fn get_bundle(&self, sha256: &str) -> StoreResult<Option<EvidenceBundle>> {
        let path = self.derived_dir(sha256).join("evidence_bundle.v1.json");
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(fsjson::read_validated(&path)?))
    }

    /// EXIF sidecar for image evidence, if one was extracted.
    pub fn get_exif(
        &self,
        sha256: &str,
    ) -> StoreResult<Option<std::collections::BTreeMap<String, String>>> {
        let path = self.derived_dir(sha256).join("exif.json");
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(fsjson::read_json(&path)?))
    }

    /// Hashes in a case, ordered by first `ingest` custody timestamp
    /// ascending with hash as the tie-break.
    pub fn list_case(&self, case_id: &str) -> StoreResult<Vec<String>> {
        let dir = self.case_dir(case_id);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut keyed: Vec<(DateTime<Utc>, String)> = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let Some(hash) = hash_from_link_name(&path) else {
                continue;
            };
            let ingested_at = self
                .read_custody(&hash)?
                .iter()
                .find(|e| e.event_type == CustodyEventType::Ingest)
                .map(|e| e.timestamp)
                .unwrap_or_else(Utc::now);
            keyed.push((ingested_at, hash));
        }
        keyed.sort();
        keyed.dedup_by(|a, b| a.1 == b.1);
        Ok(keyed.into_iter().map(|(_, hash)| hash).collect())
    }

    /// Every ingested hash, ascending.
    pub fn list_all(&self) -> StoreResult<Vec<String>> {
        let mut hashes = Vec::new();
        for entry in fs::read_dir(self.root.join("raw"))? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if let Some(hash) = name.strip_prefix("sha256=") {
                hashes.push(hash.to_string());
            }
        }
        hashes.sort();
        Ok(hashes)
    }

    /// Case ids a hash is associated with, derived from the case links.
    pub fn cases_of(&self, sha256: &str) -> StoreResult<Vec<String>> {
        let mut cases = Vec::new();
        let cases_root = self.root.join("cases");
        for entry in fs::read_dir(&cases_root)? {
            let case_path = entry?.path();
            if !case_path.is_dir() {
                continue;
            }
            let case_id = case_path.file_name().unwrap().to_string_lossy().into_owned();
            for link in fs::read_dir(&case_path)? {
                if hash_from_link_name(&link?.path()).as_deref() == Some(sha256) {
                    cases.push(case_id.clone());
                    break;
                }
            }
        }
        cases.sort();
        Ok(cases)
    }

    /// Creates a `<hash>.<ext>` hard link (or copy) inside `dir`.
    /// Returns the mode used; a no-op when the link already exists.
    pub(crate) fn link_into(&self, sha256: &str, dir: &Path) -> StoreResult<LinkMode> {
        let original = self
            .get_original_path(sha256)?
            .ok_or_else(|| StoreError::UnknownHash(sha256.to_string()))?;
        let extension = original
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "bin".to_string());

        fs::create_dir_all(dir)?;
        let target = dir.join(format!("{sha256}.{extension}"));
        if target.exists() {
            return Ok(LinkMode::Hardlink);
        }

        match fs::hard_link(&original, &target) {
            Ok(()) => Ok(LinkMode::Hardlink),
            Err(err) => {
                debug!(%err, "hard link unsupported, copying instead");
                fs::copy(&original, &target)?;
                Ok(LinkMode::Copy)
            }
        }
    }
}

/// Extracts the hash from a `<hash>.<ext>` link file name.
pub(crate) fn hash_from_link_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_string_lossy().into_owned();
    evidentia_core::validate::sha256_pattern()
        .is_match(&stem)
        .then_some(stem)
}
