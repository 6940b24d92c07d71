//! Evidentia-Report: deterministic Markdown report generation.
//!
//! Each generator declares a stable filename, a `has_data` precondition,
//! and a pure rendering function over the [`CaseSummary`]. Generators run
//! sequentially in a fixed order; a generator without data is quietly
//! skipped, and a generator that fails is recorded in the generation log
//! without stopping the others. Output is GitHub-flavoured Markdown,
//! UTF-8, LF line endings, byte-identical for identical input.

pub mod generators;
pub mod helpers;

use evidentia_core::CaseSummary;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Errors from report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("report rendering failed: {0}")]
    Render(String),
}

/// Result type for report operations.
pub type ReportResult<T> = Result<T, ReportError>;

/// A deterministic renderer for one report.
pub trait ReportGenerator: Send + Sync {
    /// Stable output filename for this generator.
    fn filename(&self) -> &'static str;

    /// Pre-condition: false means the report is quietly skipped.
    fn has_data(&self, summary: &CaseSummary) -> bool;

    /// Renders the Markdown body. Must not mutate the summary and must
    /// be byte-deterministic for identical input.
    fn render(&self, summary: &CaseSummary) -> ReportResult<String>;
}

/// Outcome of one generator in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Written,
    Skipped,
    Failed,
}

/// One entry in the generation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationEntry {
    pub report: String,
    pub status: GenerationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Per-run log of every generator outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationLog {
    pub entries: Vec<GenerationEntry>,
}

impl GenerationLog {
    pub fn written(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == GenerationStatus::Written)
            .count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &GenerationEntry> {
        self.entries
            .iter()
            .filter(|e| e.status == GenerationStatus::Failed)
    }
}

/// Runs the fixed generator set over a case summary, writing reports into
/// `output_dir`. Returns the written paths and the per-generator log; no
/// error escapes an individual generator.
pub fn generate_reports(
    summary: &CaseSummary,
    output_dir: &Path,
) -> ReportResult<(Vec<PathBuf>, GenerationLog)> {
    fs::create_dir_all(output_dir)?;

    let mut paths = Vec::new();
    let mut log = GenerationLog::default();

    for generator in generators::all() {
        let report = generator.filename().to_string();

        if !generator.has_data(summary) {
            log.entries.push(GenerationEntry {
                report,
                status: GenerationStatus::Skipped,
                detail: None,
            });
            continue;
        }

        match generator.render(summary) {
            Ok(body) => {
                let path = output_dir.join(generator.filename());
                match write_report(&path, &body) {
                    Ok(()) => {
                        info!(report = generator.filename(), "report written");
                        paths.push(path);
                        log.entries.push(GenerationEntry {
                            report,
                            status: GenerationStatus::Written,
                            detail: None,
                        });
                    }
                    Err(err) => {
                        warn!(report = generator.filename(), %err, "report write failed");
                        log.entries.push(GenerationEntry {
                            report,
                            status: GenerationStatus::Failed,
                            detail: Some(err.to_string()),
                        });
                    }
                }
            }
            Err(err) => {
                warn!(report = generator.filename(), %err, "report rendering failed");
                // A failed report still leaves a stub naming the failure.
                let path = output_dir.join(generator.filename());
                let stub = format!(
                    "# {}\n\nThis report could not be produced.\n\nReason: {}\n",
                    generator.filename(),
                    err
                );
                let _ = write_report(&path, &stub);
                log.entries.push(GenerationEntry {
                    report,
                    status: GenerationStatus::Failed,
                    detail: Some(err.to_string()),
                });
            }
        }
    }

    Ok((paths, log))
}

/// UTF-8, LF line endings, trailing newline.
fn write_report(path: &Path, body: &str) -> ReportResult<()> {
    let mut normalized = body.replace("\r\n", "\n");
    if !normalized.ends_with('\n') {
        normalized.push('\n');
    }
    fs::write(path, normalized.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use evidentia_core::SCHEMA_VERSION;
    use evidentia_core::summary::OverallAssessment;

    pub(crate) fn minimal_summary() -> CaseSummary {
        CaseSummary {
            schema_version: SCHEMA_VERSION.to_string(),
            case_id: "CASE-1".to_string(),
            generation_timestamp: evidentia_core::testing::fixed_time(),
            evidence_count: 0,
            evidence_types: vec![],
            evidence_summaries: vec![],
            correlation: evidentia_core::CorrelationAnalysis {
                case_id: "CASE-1".to_string(),
                evidence_count: 0,
                entity_correlations: vec![],
                timeline_events: vec![],
                temporal_sequences: vec![],
                timeline_gaps: vec![],
                legal_patterns: None,
                analysis_timestamp: evidentia_core::testing::fixed_time(),
            },
            overall_assessment: OverallAssessment::default(),
            executive_summary: None,
        }
    }

    #[test]
    fn test_empty_summary_skips_every_report() {
        let dir = tempfile::tempdir().unwrap();
        let (paths, log) = generate_reports(&minimal_summary(), dir.path()).unwrap();

        // Timeline is the only report fed from always-present correlation
        // fields, and with zero events it skips too.
        assert!(paths.is_empty());
        assert_eq!(log.written(), 0);
        assert!(log.failed().next().is_none());
        assert_eq!(log.entries.len(), generators::all().len());
    }

    #[test]
    fn test_reports_use_lf_and_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let mut summary = minimal_summary();
        summary.executive_summary = Some("Summary line.\r\nSecond line.".to_string());

        let (paths, _) = generate_reports(&summary, dir.path()).unwrap();
        assert_eq!(paths.len(), 1);
        let body = fs::read_to_string(&paths[0]).unwrap();
        assert!(!body.contains('\r'));
        assert!(body.ends_with('\n'));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let mut summary = minimal_summary();
        summary.executive_summary = Some("Stable output.".to_string());

        let (paths_a, _) = generate_reports(&summary, dir_a.path()).unwrap();
        let (paths_b, _) = generate_reports(&summary, dir_b.path()).unwrap();

        let a = fs::read(&paths_a[0]).unwrap();
        let b = fs::read(&paths_b[0]).unwrap();
        assert_eq!(a, b);
    }
}
