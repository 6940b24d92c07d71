//! Quoted statements report.

use crate::helpers::{header, short_sha};
use crate::{ReportGenerator, ReportResult};
use evidentia_core::CaseSummary;

pub struct QuotedStatementsReport;

impl ReportGenerator for QuotedStatementsReport {
    fn filename(&self) -> &'static str {
        "quoted_statements.md"
    }

    fn has_data(&self, summary: &CaseSummary) -> bool {
        summary.overall_assessment.quoted_statements.is_some()
    }

    fn render(&self, summary: &CaseSummary) -> ReportResult<String> {
        let quoted = summary
            .overall_assessment
            .quoted_statements
            .as_ref()
            .expect("has_data checked");

        let mut out = header("Quoted Statements", summary);
        out.push_str(&format!(
            "\n{} statements across {} speakers.\n",
            quoted.total_statements,
            quoted.speakers.len()
        ));

        for speaker in &quoted.speakers {
            out.push_str(&format!(
                "\n## {} (dominant sentiment: {})\n\n",
                speaker.speaker,
                speaker.dominant_sentiment.as_str()
            ));
            for statement in &speaker.statements {
                out.push_str(&format!(
                    "> {}\n>\n> — evidence {}, sentiment {}",
                    statement.text,
                    short_sha(&statement.evidence_sha256),
                    statement.sentiment.as_str()
                ));
                if !statement.risk_flags.is_empty() {
                    let flags: Vec<&str> =
                        statement.risk_flags.iter().map(|f| f.as_str()).collect();
                    out.push_str(&format!(", flags: {}", flags.join(", ")));
                }
                out.push_str("\n\n");
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::minimal_summary;
    use evidentia_core::summary::{
        QuotedStatement, QuotedStatementsAggregate, SpeakerStatements,
    };
    use evidentia_core::{RiskFlag, Sentiment};

    #[test]
    fn test_renders_statements_with_flags() {
        let mut summary = minimal_summary();
        summary.overall_assessment.quoted_statements = Some(QuotedStatementsAggregate {
            speakers: vec![SpeakerStatements {
                speaker: "Mark Webb".to_string(),
                statements: vec![QuotedStatement {
                    text: "You will regret raising this.".to_string(),
                    sentiment: Sentiment::Hostile,
                    risk_flags: vec![RiskFlag::Threatening],
                    evidence_sha256: "b".repeat(64),
                }],
                dominant_sentiment: Sentiment::Hostile,
            }],
            total_statements: 1,
        });

        assert!(QuotedStatementsReport.has_data(&summary));
        let body = QuotedStatementsReport.render(&summary).unwrap();
        assert!(body.contains("## Mark Webb (dominant sentiment: hostile)"));
        assert!(body.contains("> You will regret raising this."));
        assert!(body.contains("flags: threatening"));
        assert!(body.contains("bbbbbbbb"));
    }

    #[test]
    fn test_skipped_without_statements() {
        assert!(!QuotedStatementsReport.has_data(&minimal_summary()));
    }
}
