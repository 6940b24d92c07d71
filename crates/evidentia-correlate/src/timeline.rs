//! Timeline reconstruction from per-item analyses.
//!
//! Event sources and their fixed confidences:
//! file creation (1.0), analysis completion (1.0), email Date header
//! (1.0), EXIF DateTimeOriginal (0.9), and AI-extracted date entities
//! carrying an associated event (the extraction confidence).

use chrono::{DateTime, NaiveDate, Utc};
use evidentia_core::{EntityType, TimelineEvent, TimelineEventType, UnifiedAnalysis};

/// Extracts every timeline event from one analysis.
pub fn events_from_analysis(analysis: &UnifiedAnalysis) -> Vec<TimelineEvent> {
    let sha256 = &analysis.file_metadata.sha256;
    let mut events = vec![
        TimelineEvent {
            timestamp: analysis.file_metadata.created_time,
            evidence_sha256: sha256.clone(),
            evidence_type: analysis.evidence_type,
            event_type: TimelineEventType::FileCreated,
            description: format!("file created: {}", analysis.file_metadata.filename),
            confidence: 1.0,
            ai_classification: None,
        },
        TimelineEvent {
            timestamp: analysis.analysis_timestamp,
            evidence_sha256: sha256.clone(),
            evidence_type: analysis.evidence_type,
            event_type: TimelineEventType::AnalysisPerformed,
            description: format!("analysis performed: {}", analysis.file_metadata.filename),
            confidence: 1.0,
            ai_classification: None,
        },
    ];

    if let Some(headers) = &analysis.email_headers
        && let Some(raw) = headers.get("Date")
        && let Ok(secs) = mailparse_date(raw)
        && let Some(timestamp) = DateTime::from_timestamp(secs, 0)
    {
        let subject = headers
            .get("Subject")
            .cloned()
            .unwrap_or_else(|| "email sent".to_string());
        events.push(TimelineEvent {
            timestamp,
            evidence_sha256: sha256.clone(),
            evidence_type: analysis.evidence_type,
            event_type: TimelineEventType::Communication,
            description: format!("email: {subject}"),
            confidence: 1.0,
            ai_classification: None,
        });
    }

    if let Some(exif) = &analysis.exif_data
        && let Some(taken) = evidentia_store::exif::parse_datetime_original(exif)
    {
        events.push(TimelineEvent {
            timestamp: taken,
            evidence_sha256: sha256.clone(),
            evidence_type: analysis.evidence_type,
            event_type: TimelineEventType::PhotoTaken,
            description: format!("photo taken: {}", analysis.file_metadata.filename),
            confidence: 0.9,
            ai_classification: None,
        });
    }

    if let Some(doc) = &analysis.document_analysis {
        for entity in &doc.entities {
            if entity.entity_type != EntityType::Date {
                continue;
            }
            let Some(event) = &entity.associated_event else {
                continue;
            };
            let Some(timestamp) = parse_loose_date(&entity.name) else {
                continue;
            };
            events.push(TimelineEvent {
                timestamp,
                evidence_sha256: sha256.clone(),
                evidence_type: analysis.evidence_type,
                event_type: TimelineEventType::DocumentDateReference,
                description: format!("{}: {event}", entity.name),
                confidence: entity.confidence,
                ai_classification: Some(event.clone()),
            });
        }
    }

    events
}

/// Canonical sort: `(timestamp, evidence_sha256, event_type)` ascending.
pub fn sort_events(events: &mut [TimelineEvent]) {
    events.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.evidence_sha256.cmp(&b.evidence_sha256))
            .then_with(|| a.event_type.cmp(&b.event_type))
    });
}

fn mailparse_date(raw: &str) -> Result<i64, &'static str> {
    mailparse::dateparse(raw).map_err(|_| "unparseable date header")
}

/// Parses the date formats the extraction model commonly produces.
pub fn parse_loose_date(raw: &str) -> Option<DateTime<Utc>> {
    let cleaned = raw.trim();
    const FORMATS: &[&str] = &[
        "%d %B %Y",
        "%B %d, %Y",
        "%B %d %Y",
        "%Y-%m-%d",
        "%d/%m/%Y",
        "%d-%m-%Y",
    ];
    for format in FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(cleaned, format) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}
