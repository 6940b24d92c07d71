//! Shared rendering helpers.

use chrono::{DateTime, Utc};
use evidentia_core::CaseSummary;

/// Standard report header: title, case, generation time, evidence count.
pub fn header(title: &str, summary: &CaseSummary) -> String {
    format!(
        "# {title}\n\n\
         **Case:** {case}\n\
         **Generated:** {generated}\n\
         **Evidence items:** {count}\n\n\
         ---\n",
        case = summary.case_id,
        generated = timestamp(&summary.generation_timestamp),
        count = summary.evidence_count,
    )
}

/// First eight characters of a SHA256 for display.
pub fn short_sha(sha256: &str) -> &str {
    if sha256.len() >= 8 { &sha256[..8] } else { sha256 }
}

/// ISO-8601 with seconds precision.
pub fn timestamp(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Date-only rendering for timeline rows.
pub fn date(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%d").to_string()
}

/// Renders items as a Markdown bullet list, one per line.
pub fn bullets<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for item in items {
        out.push_str("- ");
        out.push_str(item.as_ref());
        out.push('\n');
    }
    out
}

/// Renders a percentage with one decimal from a [0, 1] probability.
pub fn percent(probability: f64) -> String {
    format!("{:.1}%", probability * 100.0)
}
