//! Forensic legal opinion and financial risk reports.

use crate::helpers::{bullets, header, percent};
use crate::{ReportGenerator, ReportResult};
use evidentia_core::CaseSummary;

pub struct ForensicOpinionReport;

impl ReportGenerator for ForensicOpinionReport {
    fn filename(&self) -> &'static str {
        "forensic_legal_opinion.md"
    }

    fn has_data(&self, summary: &CaseSummary) -> bool {
        summary.overall_assessment.has_forensic_opinion()
    }

    fn render(&self, summary: &CaseSummary) -> ReportResult<String> {
        let assessment = &summary.overall_assessment;
        let mut out = header("Forensic Legal Opinion", summary);

        out.push_str("\n## Opinion\n\n");
        out.push_str(assessment.forensic_summary.as_deref().unwrap_or_default());
        out.push('\n');

        out.push_str("\n## Legal implications\n\n");
        out.push_str(&bullets(
            assessment
                .forensic_legal_implications
                .iter()
                .flatten()
                .map(String::as_str),
        ));

        out.push_str("\n## Recommended actions\n\n");
        out.push_str(&bullets(
            assessment
                .forensic_recommended_actions
                .iter()
                .flatten()
                .map(String::as_str),
        ));

        out.push_str("\n## Risk assessment\n\n");
        out.push_str(
            assessment
                .forensic_risk_assessment
                .as_deref()
                .unwrap_or_default(),
        );
        out.push('\n');
        Ok(out)
    }
}

pub struct FinancialRiskReport;

impl ReportGenerator for FinancialRiskReport {
    fn filename(&self) -> &'static str {
        "financial_risk_assessment.md"
    }

    fn has_data(&self, summary: &CaseSummary) -> bool {
        summary.overall_assessment.has_financial_risk()
    }

    fn render(&self, summary: &CaseSummary) -> ReportResult<String> {
        let assessment = &summary.overall_assessment;
        let mut out = header("Financial Risk Assessment", summary);

        if let Some(probability) = assessment.tribunal_probability {
            out.push_str(&format!(
                "\n**Tribunal probability:** {}\n",
                percent(probability)
            ));
        }

        out.push_str("\n## Financial exposure\n\n");
        out.push_str(
            assessment
                .financial_exposure_summary
                .as_deref()
                .unwrap_or_default(),
        );
        out.push('\n');

        out.push_str("\n## Claim strength\n\n");
        out.push_str(
            assessment
                .claim_strength_summary
                .as_deref()
                .unwrap_or_default(),
        );
        out.push('\n');

        out.push_str("\n## Settlement recommendation\n\n");
        out.push_str(
            assessment
                .settlement_recommendation
                .as_deref()
                .unwrap_or_default(),
        );
        out.push('\n');
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::minimal_summary;

    #[test]
    fn test_forensic_requires_all_four_fields() {
        let mut summary = minimal_summary();
        summary.overall_assessment.forensic_summary = Some("opinion".to_string());
        assert!(!ForensicOpinionReport.has_data(&summary));

        summary.overall_assessment.forensic_legal_implications =
            Some(vec!["unfair dismissal exposure".to_string()]);
        summary.overall_assessment.forensic_recommended_actions =
            Some(vec!["secure meeting notes".to_string()]);
        summary.overall_assessment.forensic_risk_assessment = Some("moderate".to_string());
        assert!(ForensicOpinionReport.has_data(&summary));

        let body = ForensicOpinionReport.render(&summary).unwrap();
        assert!(body.contains("## Legal implications"));
        assert!(body.contains("- unfair dismissal exposure"));
    }

    #[test]
    fn test_financial_renders_probability_as_percent() {
        let mut summary = minimal_summary();
        summary.overall_assessment.tribunal_probability = Some(0.62);
        summary.overall_assessment.financial_exposure_summary = Some("five figures".to_string());
        summary.overall_assessment.claim_strength_summary = Some("arguable".to_string());
        summary.overall_assessment.settlement_recommendation = Some("settle early".to_string());

        assert!(FinancialRiskReport.has_data(&summary));
        let body = FinancialRiskReport.render(&summary).unwrap();
        assert!(body.contains("62.0%"));
        assert!(body.contains("settle early"));
    }
}
