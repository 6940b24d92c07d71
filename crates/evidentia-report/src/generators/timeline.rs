//! Timeline report: events, temporal sequences, gaps.

use crate::helpers::{header, short_sha, timestamp};
use crate::{ReportGenerator, ReportResult};
use evidentia_core::CaseSummary;

pub struct TimelineReport;

impl ReportGenerator for TimelineReport {
    fn filename(&self) -> &'static str {
        "timeline.md"
    }

    fn has_data(&self, summary: &CaseSummary) -> bool {
        !summary.correlation.timeline_events.is_empty()
    }

    fn render(&self, summary: &CaseSummary) -> ReportResult<String> {
        let correlation = &summary.correlation;
        let mut out = header("Case Timeline", summary);

        out.push_str("\n## Events\n\n");
        out.push_str("| Timestamp | Type | Evidence | Description |\n");
        out.push_str("|---|---|---|---|\n");
        for event in &correlation.timeline_events {
            out.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                timestamp(&event.timestamp),
                event.event_type,
                short_sha(&event.evidence_sha256),
                event.description.replace('|', "\\|")
            ));
        }

        if !correlation.temporal_sequences.is_empty() {
            out.push_str("\n## Temporal sequences\n\n");
            for (index, sequence) in correlation.temporal_sequences.iter().enumerate() {
                out.push_str(&format!(
                    "### Sequence {} ({} events, significance {})\n\n",
                    index + 1,
                    sequence.events.len(),
                    sequence.legal_significance
                ));
                out.push_str(&format!(
                    "Anchored on evidence {}.\n\n",
                    short_sha(&sequence.anchor_sha256)
                ));
                for event in &sequence.events {
                    out.push_str(&format!(
                        "- {} — {}\n",
                        timestamp(&event.timestamp),
                        event.description
                    ));
                }
                out.push('\n');
            }
        }

        if !correlation.timeline_gaps.is_empty() {
            out.push_str("## Timeline gaps\n\n");
            for gap in &correlation.timeline_gaps {
                out.push_str(&format!(
                    "- **{:.0} hours** ({} significance), from {} to {}\n  \
                     after: {}\n  before: {}\n",
                    gap.duration_hours,
                    gap.significance,
                    timestamp(&gap.gap_start),
                    timestamp(&gap.gap_end),
                    gap.before_event,
                    gap.after_event
                ));
            }
        }
        Ok(out)
    }
}
