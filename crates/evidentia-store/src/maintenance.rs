//! Store maintenance: statistics, cleanup, and case pruning.

use crate::{EvidenceStore, StoreResult, hash_from_link_name};
use evidentia_core::EvidenceType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use tracing::info;
use walkdir::WalkDir;

/// Aggregate view over the whole store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageStats {
    pub evidence_count: u64,
    pub total_bytes: u64,
    /// Evidence type name → item count.
    pub by_type: BTreeMap<String, u64>,
    pub case_count: u64,
    pub label_count: u64,
    pub analyzed_count: u64,
}

/// What `cleanup` removed (or would remove under `dry_run`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanupResult {
    pub dry_run: bool,
    /// Case/label links whose raw evidence no longer exists.
    pub removed_links: Vec<String>,
    /// Empty case/label directories.
    pub removed_dirs: Vec<String>,
}

impl EvidenceStore {
    /// Computes store-wide statistics.
    pub fn stats(&self) -> StoreResult<StorageStats> {
        let hashes = self.list_all()?;
        let mut total_bytes = 0u64;
        let mut by_type: BTreeMap<String, u64> = BTreeMap::new();
        let mut analyzed_count = 0u64;

        for hash in &hashes {
            let metadata = self.get_metadata(hash)?;
            total_bytes += metadata.file_size;
            let evidence_type = EvidenceType::from_extension(&metadata.extension);
            *by_type.entry(evidence_type.as_str().to_string()).or_insert(0) += 1;
            if self.derived_dir(hash).join("analysis.v1.json").is_file() {
                analyzed_count += 1;
            }
        }

        Ok(StorageStats {
            evidence_count: hashes.len() as u64,
            total_bytes,
            by_type,
            case_count: count_subdirs(&self.root().join("cases"))?,
            label_count: count_subdirs(&self.root().join("labels"))?,
            analyzed_count,
        })
    }

    /// Removes broken case/label links and empty link directories.
    /// Raw evidence is never touched.
    pub fn cleanup(&self, dry_run: bool) -> StoreResult<CleanupResult> {
        let mut result = CleanupResult {
            dry_run,
            ..CleanupResult::default()
        };

        for tree in ["cases", "labels"] {
            let tree_root = self.root().join(tree);
            for entry in WalkDir::new(&tree_root).min_depth(2).max_depth(2) {
                let entry = entry.map_err(|e| {
                    std::io::Error::other(format!("walk failed under {tree}: {e}"))
                })?;
                let path = entry.into_path();
                let Some(hash) = hash_from_link_name(&path) else {
                    continue;
                };
                if !self.contains(&hash) {
                    result.removed_links.push(path.display().to_string());
                    if !dry_run {
                        fs::remove_file(&path)?;
                    }
                }
            }

            for entry in fs::read_dir(&tree_root)? {
                let dir = entry?.path();
                if dir.is_dir() && dir_would_be_empty(&dir, &result.removed_links)? {
                    result.removed_dirs.push(dir.display().to_string());
                    if !dry_run {
                        fs::remove_dir_all(&dir)?;
                    }
                }
            }
        }

        info!(
            dry_run,
            links = result.removed_links.len(),
            dirs = result.removed_dirs.len(),
            "cleanup finished"
        );
        Ok(result)
    }

    /// Removes evidence that belongs to `case_id` and to no other case.
    /// Returns the affected hashes.
    pub fn prune_case(&self, case_id: &str, dry_run: bool) -> StoreResult<Vec<String>> {
        let mut pruned = Vec::new();
        for hash in self.list_case(case_id)? {
            let cases = self.cases_of(&hash)?;
            if cases == [case_id.to_string()] {
                pruned.push(hash.clone());
                if !dry_run {
                    fs::remove_dir_all(self.raw_dir(&hash))?;
                    fs::remove_dir_all(self.derived_dir(&hash))?;
                }
            }
        }

        if !dry_run {
            // Orphaned links (including the pruned case dir) fall out of
            // the same pass.
            self.cleanup(false)?;
        }

        info!(case_id, dry_run, count = pruned.len(), "case pruned");
        Ok(pruned)
    }
}

fn count_subdirs(path: &std::path::Path) -> StoreResult<u64> {
    let mut count = 0;
    for entry in fs::read_dir(path)? {
        if entry?.path().is_dir() {
            count += 1;
        }
    }
    Ok(count)
}

/// True when a directory has no entries besides links already slated for
/// removal.
fn dir_would_be_empty(dir: &std::path::Path, removed: &[String]) -> StoreResult<bool> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !removed.contains(&path.display().to_string()) {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn seeded_store(dir: &Path) -> (EvidenceStore, String) {
        let store = EvidenceStore::open(dir.join("store")).unwrap();
        let file = dir.join("letter.txt");
        fs::write(&file, "the quick brown fox").unwrap();
        let result = store.ingest(&file, "CASE-1", "analyst").unwrap();
        (store, result.sha256)
    }

    #[test]
    fn test_stats() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = seeded_store(dir.path());

        let image = dir.path().join("photo.png");
        fs::write(&image, b"\x89PNG fake").unwrap();
        store.ingest(&image, "CASE-1", "analyst").unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.evidence_count, 2);
        assert_eq!(stats.case_count, 1);
        assert_eq!(stats.by_type["document"], 1);
        assert_eq!(stats.by_type["image"], 1);
        assert!(stats.total_bytes > 0);
        assert_eq!(stats.analyzed_count, 0);
    }

    #[test]
    fn test_cleanup_removes_broken_links() {
        let dir = tempfile::tempdir().unwrap();
        let (store, hash) = seeded_store(dir.path());

        // Simulate a pruned original with a dangling case link.
        fs::remove_dir_all(store.raw_dir(&hash)).unwrap();

        let preview = store.cleanup(true).unwrap();
        assert_eq!(preview.removed_links.len(), 1);
        // Dry run leaves the link in place.
        assert!(Path::new(&preview.removed_links[0]).exists());

        let applied = store.cleanup(false).unwrap();
        assert_eq!(applied.removed_links.len(), 1);
        assert!(!Path::new(&applied.removed_links[0]).exists());
        // The now-empty case dir goes too.
        assert!(applied.removed_dirs.iter().any(|d| d.ends_with("CASE-1")));
    }

    #[test]
    fn test_prune_respects_shared_evidence() {
        let dir = tempfile::tempdir().unwrap();
        let (store, hash) = seeded_store(dir.path());

        // Same evidence also belongs to CASE-2; prune of CASE-1 must keep it.
        let file = dir.path().join("letter.txt");
        store.ingest(&file, "CASE-2", "analyst").unwrap();

        let pruned = store.prune_case("CASE-1", false).unwrap();
        assert!(pruned.is_empty());
        assert!(store.contains(&hash));
    }

    #[test]
    fn test_prune_exclusive_evidence() {
        let dir = tempfile::tempdir().unwrap();
        let (store, hash) = seeded_store(dir.path());

        let pruned = store.prune_case("CASE-1", true).unwrap();
        assert_eq!(pruned, vec![hash.clone()]);
        assert!(store.contains(&hash), "dry run must not delete");

        let pruned = store.prune_case("CASE-1", false).unwrap();
        assert_eq!(pruned, vec![hash.clone()]);
        assert!(!store.contains(&hash));
        assert!(store.list_case("CASE-1").unwrap().is_empty());
    }
}
