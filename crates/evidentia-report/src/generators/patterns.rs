//! Legal patterns report: contradictions, corroboration, evidence gaps.

use crate::helpers::{header, short_sha};
use crate::{ReportGenerator, ReportResult};
use evidentia_core::CaseSummary;

pub struct LegalPatternsReport;

impl ReportGenerator for LegalPatternsReport {
    fn filename(&self) -> &'static str {
        "legal_patterns.md"
    }

    fn has_data(&self, summary: &CaseSummary) -> bool {
        summary.correlation.legal_patterns.is_some()
    }

    fn render(&self, summary: &CaseSummary) -> ReportResult<String> {
        let patterns = summary
            .correlation
            .legal_patterns
            .as_ref()
            .expect("has_data checked");

        let mut out = header("Legal Patterns", summary);
        out.push('\n');
        out.push_str(&patterns.pattern_summary);
        out.push('\n');

        out.push_str("\n## Contradictions\n\n");
        if patterns.contradictions.is_empty() {
            out.push_str("None detected.\n");
        }
        // Severe contradictions always lead.
        let mut ordered: Vec<_> = patterns.contradictions.iter().collect();
        ordered.sort_by(|a, b| {
            b.severity
                .partial_cmp(&a.severity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.summary.cmp(&b.summary))
        });
        for contradiction in ordered {
            out.push_str(&format!(
                "### {} (severity {:.2})\n\n{}\n",
                contradiction.summary, contradiction.severity, contradiction.explanation
            ));
            if !contradiction.conflicting_evidence.is_empty() {
                let shas: Vec<&str> = contradiction
                    .conflicting_evidence
                    .iter()
                    .map(|s| short_sha(s))
                    .collect();
                out.push_str(&format!("\nEvidence: {}\n", shas.join(", ")));
            }
            out.push('\n');
        }

        out.push_str("## Corroboration\n\n");
        if patterns.corroboration.is_empty() {
            out.push_str("None detected.\n");
        }
        for link in &patterns.corroboration {
            let shas: Vec<&str> = link
                .supporting_evidence
                .iter()
                .map(|s| short_sha(s))
                .collect();
            out.push_str(&format!(
                "- **{}** (strength {:.2}): {} [{}]\n",
                link.claim,
                link.strength,
                link.explanation,
                shas.join(", ")
            ));
        }

        out.push_str("\n## Evidence gaps\n\n");
        if patterns.evidence_gaps.is_empty() {
            out.push_str("None detected.\n");
        }
        for gap in &patterns.evidence_gaps {
            out.push_str(&format!("- ({}) {}\n", gap.significance, gap.description));
        }
        Ok(out)
    }
}
