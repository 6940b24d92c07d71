//! Temporal-sequence and timeline-gap detection.

use chrono::Duration;
use evidentia_core::{
    CommunicationPattern, LegalSignificance, TemporalSequence, TimelineEvent, TimelineGap,
    UnifiedAnalysis, round4,
};
use std::collections::BTreeMap;

/// Window around an anchor, in hours.
pub const DEFAULT_TEMPORAL_WINDOW_HOURS: i64 = 72;

/// Minimum gap between substantive events worth reporting, in hours.
pub const GAP_THRESHOLD_HOURS: i64 = 168;

const GAP_HIGH_HOURS: f64 = 720.0;

/// What makes a piece of evidence anchor-worthy, precomputed per hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnchorProfile {
    /// Legal significance is high or critical.
    pub elevated: bool,
    /// Hostile, retaliatory, or escalating communication pattern.
    pub anchor_pattern: bool,
    /// Carries a retaliation/harassment/discrimination/threat flag.
    pub anchor_flags: bool,
    /// Carries any risk flag at all.
    pub any_risk_flags: bool,
}

impl AnchorProfile {
    pub fn is_anchor(&self) -> bool {
        self.elevated || self.anchor_pattern || self.anchor_flags
    }
}

/// Builds the per-hash anchor profile map from the case analyses.
pub fn anchor_profiles(analyses: &[UnifiedAnalysis]) -> BTreeMap<String, AnchorProfile> {
    let mut profiles = BTreeMap::new();
    for analysis in analyses {
        let mut profile = AnchorProfile::default();
        if let Some(doc) = &analysis.document_analysis {
            profile.elevated |= doc.legal_significance.is_elevated();
            profile.anchor_flags |= doc.risk_flags.iter().any(|f| f.is_anchor_flag());
            profile.any_risk_flags |= !doc.risk_flags.is_empty();
        }
        if let Some(email) = &analysis.email_analysis {
            profile.elevated |= email.legal_significance.is_elevated();
            profile.anchor_pattern |=
                CommunicationPattern::is_anchor_pattern(&email.communication_pattern);
            profile.anchor_flags |= email.risk_flags.iter().any(|f| f.is_anchor_flag());
            profile.any_risk_flags |= !email.risk_flags.is_empty();
        }
        if let Some(image) = &analysis.image_analysis {
            profile.any_risk_flags |= !image.risk_flags.is_empty();
        }
        profiles.insert(analysis.file_metadata.sha256.clone(), profile);
    }
    profiles
}

/// Detects temporal sequences: every anchor event collects the events
/// within the window before or after it, and sequences sharing an event
/// are merged.
pub fn detect_sequences(
    events: &[TimelineEvent],
    profiles: &BTreeMap<String, AnchorProfile>,
    window_hours: i64,
) -> Vec<TemporalSequence> {
    let window = Duration::hours(window_hours);

    // Member sets as sorted index lists, one per anchor.
    let mut raw: Vec<(usize, Vec<usize>)> = Vec::new();
    for (anchor_index, anchor) in events.iter().enumerate() {
        let is_anchor = profiles
            .get(&anchor.evidence_sha256)
            .is_some_and(AnchorProfile::is_anchor);
        if !is_anchor {
            continue;
        }
        let members: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| {
                let delta = e.timestamp.signed_duration_since(anchor.timestamp);
                delta >= -window && delta <= window
            })
            .map(|(i, _)| i)
            .collect();
        raw.push((anchor_index, members));
    }

    // Merge sequences that share any event.
    let mut merged: Vec<(usize, Vec<usize>)> = Vec::new();
    for (anchor, members) in raw {
        let mut members = members;
        let mut anchor = anchor;
        loop {
            let Some(pos) = merged
                .iter()
                .position(|(_, existing)| existing.iter().any(|i| members.contains(i)))
            else {
                break;
            };
            let (other_anchor, other_members) = merged.remove(pos);
            anchor = anchor.min(other_anchor);
            members.extend(other_members);
            members.sort_unstable();
            members.dedup();
        }
        merged.push((anchor, members));
    }
    merged.sort_by_key(|(anchor, _)| *anchor);

    merged
        .into_iter()
        .map(|(anchor, members)| {
            let sequence_events: Vec<TimelineEvent> =
                members.iter().map(|&i| events[i].clone()).collect();
            let legal_significance = sequence_significance(&sequence_events, profiles);
            TemporalSequence {
                anchor_sha256: events[anchor].evidence_sha256.clone(),
                events: sequence_events,
                legal_significance,
            }
        })
        .collect()
}

/// High when any constituent event's source analysis is high/critical,
/// medium when any carries risk flags, low otherwise.
fn sequence_significance(
    events: &[TimelineEvent],
    profiles: &BTreeMap<String, AnchorProfile>,
) -> LegalSignificance {
    let any_elevated = events
        .iter()
        .any(|e| profiles.get(&e.evidence_sha256).is_some_and(|p| p.elevated));
    if any_elevated {
        return LegalSignificance::High;
    }
    let any_flags = events.iter().any(|e| {
        profiles
            .get(&e.evidence_sha256)
            .is_some_and(|p| p.any_risk_flags)
    });
    if any_flags {
        LegalSignificance::Medium
    } else {
        LegalSignificance::Low
    }
}

/// Detects gaps of at least [`GAP_THRESHOLD_HOURS`] between successive
/// substantive events (housekeeping events are excluded). A reported gap
/// carries medium significance, rising to high at 720 hours.
pub fn detect_gaps(events: &[TimelineEvent]) -> Vec<TimelineGap> {
    let substantive: Vec<&TimelineEvent> = events
        .iter()
        .filter(|e| !e.event_type.is_housekeeping())
        .collect();

    let mut gaps = Vec::new();
    for pair in substantive.windows(2) {
        let delta = pair[1].timestamp.signed_duration_since(pair[0].timestamp);
        let hours = delta.num_seconds() as f64 / 3600.0;
        if hours < GAP_THRESHOLD_HOURS as f64 {
            continue;
        }
        gaps.push(TimelineGap {
            gap_start: pair[0].timestamp,
            gap_end: pair[1].timestamp,
            duration_hours: round4(hours),
            significance: gap_significance(hours),
            before_event: pair[0].description.clone(),
            after_event: pair[1].description.clone(),
        });
    }
    gaps
}

fn gap_significance(hours: f64) -> LegalSignificance {
    if hours >= GAP_HIGH_HOURS {
        LegalSignificance::High
    } else {
        LegalSignificance::Medium
    }
}
