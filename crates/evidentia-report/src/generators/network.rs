//! Relationship network and power dynamics reports.

use crate::helpers::{bullets, header};
use crate::{ReportGenerator, ReportResult};
use evidentia_core::CaseSummary;

pub struct RelationshipNetworkReport;

impl ReportGenerator for RelationshipNetworkReport {
    fn filename(&self) -> &'static str {
        "relationship_network.md"
    }

    fn has_data(&self, summary: &CaseSummary) -> bool {
        summary.overall_assessment.relationship_network.is_some()
    }

    fn render(&self, summary: &CaseSummary) -> ReportResult<String> {
        let network = summary
            .overall_assessment
            .relationship_network
            .as_ref()
            .expect("has_data checked");

        let mut out = header("Relationship Network", summary);
        out.push_str(&format!(
            "\n{} entities, {} relationships.\n",
            network.nodes.len(),
            network.edges.len()
        ));

        out.push_str("\n## Key players\n\n");
        out.push_str(&bullets(network.key_players.iter().map(String::as_str)));

        out.push_str("\n## Relationships\n\n");
        out.push_str("| Source | Relationship | Target |\n");
        out.push_str("|---|---|---|\n");
        for edge in &network.edges {
            out.push_str(&format!(
                "| {} | {} | {} |\n",
                edge.source, edge.relationship, edge.target
            ));
        }
        Ok(out)
    }
}

pub struct PowerDynamicsReport;

impl ReportGenerator for PowerDynamicsReport {
    fn filename(&self) -> &'static str {
        "power_dynamics.md"
    }

    fn has_data(&self, summary: &CaseSummary) -> bool {
        summary
            .overall_assessment
            .power_dynamics
            .as_ref()
            .is_some_and(|d| !d.participants.is_empty())
    }

    fn render(&self, summary: &CaseSummary) -> ReportResult<String> {
        let dynamics = summary
            .overall_assessment
            .power_dynamics
            .as_ref()
            .expect("has_data checked");

        let mut out = header("Power Dynamics", summary);

        out.push_str("\n## Participants\n\n");
        out.push_str("| Participant | Authority | Messages | Threads | Deference | Topics |\n");
        out.push_str("|---|---|---|---|---|---|\n");
        for participant in &dynamics.participants {
            let label = participant
                .display_name
                .as_deref()
                .unwrap_or(&participant.email_address);
            out.push_str(&format!(
                "| {} | {} | {} | {} | {:.2} | {} |\n",
                label,
                participant.authority_level.as_str(),
                participant.message_count,
                participant.thread_count,
                participant.avg_deference_score,
                participant.dominant_topics.join(", ")
            ));
        }

        out.push_str(
            "\nDeference runs from 0 (highly dominant) to 1 (highly deferential).\n",
        );

        out.push_str("\n## Most connected\n\n");
        out.push_str(&bullets(
            dynamics.top_participants.iter().map(String::as_str),
        ));
        Ok(out)
    }
}
