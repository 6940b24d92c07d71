//! Executive summary report.

use crate::helpers::header;
use crate::{ReportGenerator, ReportResult};
use evidentia_core::CaseSummary;

pub struct ExecutiveSummaryReport;

impl ReportGenerator for ExecutiveSummaryReport {
    fn filename(&self) -> &'static str {
        "executive_summary.md"
    }

    fn has_data(&self, summary: &CaseSummary) -> bool {
        summary.executive_summary.is_some()
    }

    fn render(&self, summary: &CaseSummary) -> ReportResult<String> {
        let body = summary
            .executive_summary
            .as_deref()
            .unwrap_or_default();

        let mut out = header("Executive Summary", summary);
        out.push('\n');
        out.push_str(body);
        out.push('\n');

        if !summary.evidence_types.is_empty() {
            out.push_str("\n## Evidence profile\n\n");
            for evidence_type in &summary.evidence_types {
                let count = summary
                    .evidence_summaries
                    .iter()
                    .filter(|e| e.evidence_type == *evidence_type)
                    .count();
                out.push_str(&format!("- {evidence_type}: {count}\n"));
            }
        }
        Ok(out)
    }
}
