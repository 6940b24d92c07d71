//! Full-pipeline tests: ingest, analyze, correlate, summarize, report.

use evidentia_analyze::{AnalyzerOptions, DocumentAnalyzer};
use evidentia_core::{CustodyEventType, EntityType, EvidenceType, TimelineEventType, Validate};
use evidentia_correlate::{Aggregator, SummaryOptions};
use evidentia_llm::MockProvider;
use evidentia_report::{GenerationStatus, generate_reports};
use evidentia_store::EvidenceStore;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn document_reply() -> serde_json::Value {
    serde_json::json!({
        "summary": "A meeting with HR on 15 March 2024 was cancelled.",
        "entities": [{
            "name": "15 March 2024",
            "type": "date",
            "confidence": 0.95,
            "context": "A meeting with HR on 15 March 2024 was cancelled.",
            "associated_event": "meeting with HR cancelled"
        }],
        "document_type": "letter",
        "sentiment": "neutral",
        "legal_significance": "medium",
        "risk_flags": [],
        "confidence_overall": 0.91
    })
}

fn ingest_file(store: &EvidenceStore, dir: &Path, name: &str, body: &str, case: &str) -> String {
    let file = dir.join(name);
    fs::write(&file, body).unwrap();
    store.ingest(&file, case, "analyst").unwrap().sha256
}

#[tokio::test]
async fn single_document_ingest_analyze_correlate() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(EvidenceStore::open(dir.path().join("store")).unwrap());
    let hash = ingest_file(
        &store,
        dir.path(),
        "letter.txt",
        "A meeting with HR on 15 March 2024 was cancelled.",
        "C1",
    );

    let provider = Arc::new(MockProvider::new().with_json("Analyze", document_reply()));
    let analyzer = DocumentAnalyzer::new(
        Arc::clone(&store),
        Some(provider.clone()),
        AnalyzerOptions::default(),
    );
    let unified = analyzer
        .analyze(&hash, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(unified.evidence_type, EvidenceType::Document);
    let doc = unified.document_analysis.as_ref().unwrap();
    assert_eq!(doc.entities.len(), 1);
    assert_eq!(doc.entities[0].name, "15 March 2024");
    assert!(
        doc.entities[0]
            .associated_event
            .as_ref()
            .unwrap()
            .contains("meeting")
    );

    let aggregator: Aggregator<MockProvider> =
        Aggregator::new(Arc::clone(&store), None, SummaryOptions::default());
    let summary = aggregator.summarize("C1").await.unwrap();
    summary.validate().unwrap();

    // One piece of evidence: no correlated entities, but the extracted
    // date reaches the timeline.
    assert!(summary.correlation.entity_correlations.is_empty());
    assert!(
        summary
            .correlation
            .timeline_events
            .iter()
            .any(|e| e.event_type == TimelineEventType::DocumentDateReference)
    );
}

#[tokio::test]
async fn llm_unavailable_fallback_to_reports() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(EvidenceStore::open(dir.path().join("store")).unwrap());
    let hash = ingest_file(&store, dir.path(), "letter.txt", "plain evidence text", "C1");

    // No LLM configured anywhere in the pipeline.
    let analyzer: DocumentAnalyzer<MockProvider> =
        DocumentAnalyzer::new(Arc::clone(&store), None, AnalyzerOptions::default());
    let unified = analyzer
        .analyze(&hash, &CancellationToken::new())
        .await
        .unwrap();

    let doc = unified.document_analysis.as_ref().unwrap();
    assert!(doc.entities.is_empty());
    assert_eq!(doc.confidence_overall, 0.0);
    assert!(unified.notes.is_some());

    let custody = store.read_custody(&hash).unwrap();
    let analyze_event = custody
        .iter()
        .find(|e| e.event_type == CustodyEventType::Analyze)
        .unwrap();
    assert_eq!(analyze_event.metadata_str("status"), Some("failed"));

    let aggregator: Aggregator<MockProvider> =
        Aggregator::new(Arc::clone(&store), None, SummaryOptions::default());
    let summary = aggregator.summarize("C1").await.unwrap();

    // Reports that need AI-derived fields are skipped; the timeline
    // report still renders from deterministic events.
    let reports_dir = dir.path().join("reports");
    let (paths, log) = generate_reports(&summary, &reports_dir).unwrap();

    let skipped: Vec<&str> = log
        .entries
        .iter()
        .filter(|e| e.status == GenerationStatus::Skipped)
        .map(|e| e.report.as_str())
        .collect();
    assert!(skipped.contains(&"executive_summary.md"));
    assert!(skipped.contains(&"forensic_legal_opinion.md"));

    assert!(
        paths
            .iter()
            .any(|p| p.file_name().unwrap() == "timeline.md")
    );
    assert!(log.failed().next().is_none());
}

fn person_reply(name: &str, context: &str) -> serde_json::Value {
    serde_json::json!({
        "summary": context,
        "entities": [{
            "name": name,
            "type": "person",
            "confidence": 0.9,
            "context": context
        }],
        "document_type": "letter",
        "sentiment": "neutral",
        "legal_significance": "medium",
        "risk_flags": [],
        "confidence_overall": 0.88
    })
}

#[tokio::test]
async fn cross_evidence_correlation_to_reports() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(EvidenceStore::open(dir.path().join("store")).unwrap());

    // Each document's prompt carries its body text, so the mock replies
    // with the name variant that document actually mentions: the full
    // "Sarah Johnson" in one, the bare "Sarah" in the other.
    let provider = Arc::new(
        MockProvider::new()
            .with_json(
                "attended the HR meeting",
                person_reply("Sarah Johnson", "Sarah Johnson attended the HR meeting."),
            )
            .with_json(
                "raised the complaint",
                person_reply("Sarah", "Sarah raised the complaint in writing."),
            ),
    );
    for (name, body) in [
        ("first.txt", "Sarah Johnson attended the HR meeting."),
        ("second.txt", "Sarah raised the complaint in writing."),
    ] {
        let hash = ingest_file(&store, dir.path(), name, body, "C1");
        let analyzer = DocumentAnalyzer::new(
            Arc::clone(&store),
            Some(provider.clone()),
            AnalyzerOptions::default(),
        );
        analyzer
            .analyze(&hash, &CancellationToken::new())
            .await
            .unwrap();
    }

    let aggregator: Aggregator<MockProvider> =
        Aggregator::new(Arc::clone(&store), None, SummaryOptions::default());
    let summary = aggregator.summarize("C1").await.unwrap();

    assert_eq!(summary.evidence_count, 2);
    // The name variants canonicalise into one person seen in both
    // documents, displayed under the fullest form.
    assert_eq!(summary.correlation.entity_correlations.len(), 1);
    let entity = &summary.correlation.entity_correlations[0];
    assert_eq!(entity.entity_name, "Sarah Johnson");
    assert_eq!(entity.entity_type, EntityType::Person);
    assert_eq!(entity.occurrence_count, 2);

    // Determinism: rendering the same summary twice is byte-identical.
    let dir_a = dir.path().join("reports-a");
    let dir_b = dir.path().join("reports-b");
    let (paths_a, _) = generate_reports(&summary, &dir_a).unwrap();
    let (paths_b, _) = generate_reports(&summary, &dir_b).unwrap();
    assert_eq!(paths_a.len(), paths_b.len());
    for (a, b) in paths_a.iter().zip(paths_b.iter()) {
        assert_eq!(fs::read(a).unwrap(), fs::read(b).unwrap());
    }
}
