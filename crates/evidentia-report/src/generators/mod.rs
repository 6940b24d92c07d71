//! The fixed generator set, in its execution order.

mod executive;
mod forensic;
mod network;
mod ocr;
mod patterns;
mod statements;
mod timeline;

pub use executive::ExecutiveSummaryReport;
pub use forensic::{FinancialRiskReport, ForensicOpinionReport};
pub use network::{PowerDynamicsReport, RelationshipNetworkReport};
pub use ocr::ImageOcrReport;
pub use patterns::LegalPatternsReport;
pub use statements::QuotedStatementsReport;
pub use timeline::TimelineReport;

use crate::ReportGenerator;

/// Every generator, in the order they run.
pub fn all() -> Vec<Box<dyn ReportGenerator>> {
    vec![
        Box::new(ExecutiveSummaryReport),
        Box::new(ForensicOpinionReport),
        Box::new(FinancialRiskReport),
        Box::new(LegalPatternsReport),
        Box::new(TimelineReport),
        Box::new(QuotedStatementsReport),
        Box::new(RelationshipNetworkReport),
        Box::new(PowerDynamicsReport),
        Box::new(ImageOcrReport),
    ]
}
