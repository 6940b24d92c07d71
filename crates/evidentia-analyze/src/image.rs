//! Image analyzer.
//!
//! Images are base64-encoded (re-encoded to PNG first when the source
//! format is not one the LLM accepts) and sent with a scene/text/object
//! prompt. Rasterised multi-page PDFs are analysed page by page and
//! combined into a single record. Batch analysis bounds in-flight LLM
//! calls with a semaphore.

use crate::prompts;
use crate::{AnalyzeError, AnalyzeResult, AnalyzerOptions, FoldedFailure, persist};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use evidentia_core::{
    EvidenceType, ImageAnalysisStructured, SCHEMA_VERSION, UnifiedAnalysis, round4,
};
use evidentia_llm::{LlmProvider, StructuredRequest, call_with_retry};
use evidentia_store::EvidenceStore;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default bound on concurrent LLM calls during batch analysis.
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Analyzer for image evidence and rasterised PDF pages.
pub struct ImageAnalyzer<P> {
    store: Arc<EvidenceStore>,
    provider: Option<Arc<P>>,
    options: AnalyzerOptions,
}

impl<P: LlmProvider + 'static> ImageAnalyzer<P> {
    pub fn new(store: Arc<EvidenceStore>, provider: Option<Arc<P>>, options: AnalyzerOptions) -> Self {
        Self {
            store,
            provider,
            options,
        }
    }

    /// Analyzes one ingested image and persists the result.
    pub async fn analyze(
        &self,
        sha256: &str,
        cancel: &CancellationToken,
    ) -> AnalyzeResult<UnifiedAnalysis> {
        let metadata = self.store.get_metadata(sha256)?;
        let bytes = self.store.read_original(sha256)?;

        let (analysis, notes, failure) = match prepare_payload(&bytes, &metadata.extension) {
            Ok((payload, media_type)) => {
                self.structured_or_fallback(&payload, media_type, cancel)
                    .await?
            }
            Err(message) => (
                ImageAnalysisStructured::fallback(format!("image could not be decoded: {message}")),
                Some(format!("image could not be decoded: {message}")),
                Some(FoldedFailure::DependencyMissing),
            ),
        };

        let unified = UnifiedAnalysis {
            schema_version: SCHEMA_VERSION.to_string(),
            evidence_type: EvidenceType::Image,
            analysis_timestamp: Utc::now(),
            file_metadata: metadata,
            case_ids: self.store.cases_of(sha256)?,
            case_id: None,
            document_analysis: None,
            image_analysis: Some(analysis),
            email_analysis: None,
            chain_of_custody: self.store.read_custody(sha256)?,
            exif_data: self.store.get_exif(sha256)?,
            email_headers: None,
            labels: Vec::new(),
            notes,
            extra: BTreeMap::new(),
        };

        persist(&self.store, sha256, &unified, &self.options.actor, failure)?;
        info!(sha256, "image analysis complete");
        self.store.get_analysis(sha256)?.ok_or_else(|| {
            AnalyzeError::Internal("analysis missing immediately after save".to_string())
        })
    }

    /// Analyzes a scanned PDF through its rasterised pages and persists a
    /// combined record under the PDF's hash.
    pub async fn analyze_rasterized_pdf(
        &self,
        sha256: &str,
        pages: Vec<Vec<u8>>,
        cancel: &CancellationToken,
    ) -> AnalyzeResult<UnifiedAnalysis> {
        let metadata = self.store.get_metadata(sha256)?;

        let mut page_results = Vec::new();
        let mut failure = None;
        let mut notes = None;

        for (index, page) in pages.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(AnalyzeError::Cancelled);
            }
            let payload = BASE64.encode(page);
            let (analysis, page_notes, page_failure) = self
                .structured_or_fallback(&payload, "image/png", cancel)
                .await?;
            if page_failure.is_some() {
                failure = page_failure;
                notes = page_notes.map(|n| format!("page {}: {n}", index + 1));
                break;
            }
            page_results.push(analysis);
        }

        let combined = if failure.is_some() || page_results.is_empty() {
            ImageAnalysisStructured::fallback(
                notes
                    .clone()
                    .unwrap_or_else(|| "no pages analysed".to_string()),
            )
        } else {
            combine_pages(page_results)
        };

        let unified = UnifiedAnalysis {
            schema_version: SCHEMA_VERSION.to_string(),
            evidence_type: EvidenceType::Pdf,
            analysis_timestamp: Utc::now(),
            file_metadata: metadata,
            case_ids: self.store.cases_of(sha256)?,
            case_id: None,
            document_analysis: None,
            image_analysis: Some(combined),
            email_analysis: None,
            chain_of_custody: self.store.read_custody(sha256)?,
            exif_data: None,
            email_headers: None,
            labels: Vec::new(),
            notes,
            extra: BTreeMap::new(),
        };

        persist(&self.store, sha256, &unified, &self.options.actor, failure)?;
        self.store.get_analysis(sha256)?.ok_or_else(|| {
            AnalyzeError::Internal("analysis missing immediately after save".to_string())
        })
    }

    /// Analyzes a batch of images with at most `max_concurrent` in-flight
    /// LLM calls. Result order is by hash; cancellation stops unstarted
    /// work.
    pub async fn analyze_batch(
        &self,
        hashes: &[String],
        max_concurrent: usize,
        cancel: &CancellationToken,
    ) -> AnalyzeResult<BTreeMap<String, UnifiedAnalysis>> {
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));

        let results: Vec<(String, AnalyzeResult<UnifiedAnalysis>)> =
            stream::iter(hashes.iter().cloned())
                .map(|hash| {
                    let semaphore = Arc::clone(&semaphore);
                    async move {
                        let _permit = semaphore.acquire().await.expect("semaphore never closed");
                        if cancel.is_cancelled() {
                            return (hash, Err(AnalyzeError::Cancelled));
                        }
                        let result = self.analyze(&hash, cancel).await;
                        (hash, result)
                    }
                })
                .buffer_unordered(max_concurrent.max(1))
                .collect()
                .await;

        let mut map = BTreeMap::new();
        for (hash, result) in results {
            map.insert(hash, result?);
        }
        Ok(map)
    }

    async fn structured_or_fallback(
        &self,
        payload: &str,
        media_type: &str,
        cancel: &CancellationToken,
    ) -> AnalyzeResult<(
        ImageAnalysisStructured,
        Option<String>,
        Option<FoldedFailure>,
    )> {
        let Some(provider) = &self.provider else {
            return Ok((
                ImageAnalysisStructured::fallback("no LLM configured"),
                Some("image analysis skipped: no LLM configured".to_string()),
                Some(FoldedFailure::Unavailable),
            ));
        };

        let prompt = prompts::image_prompt(self.options.case_type, payload, media_type);
        let request = StructuredRequest::deterministic(
            &self.options.model,
            &prompt,
            "image_analysis",
            prompts::image_schema(),
        );

        let outcome = call_with_retry(provider.as_ref(), &request, &self.options.llm, cancel)
            .await
            .and_then(|response| response.into_parsed::<ImageAnalysisStructured>());

        match outcome {
            Ok(mut analysis) => {
                analysis.confidence_overall = round4(analysis.confidence_overall);
                Ok((analysis, None, None))
            }
            Err(err) => {
                let (folded, message) = FoldedFailure::from_llm(err)?;
                warn!(%message, kind = folded.kind(), "image analysis folded");
                Ok((
                    ImageAnalysisStructured::fallback(format!(
                        "analysis failed ({}): {message}",
                        folded.kind()
                    )),
                    Some(format!("image analysis failed ({}): {message}", folded.kind())),
                    Some(folded),
                ))
            }
        }
    }
}

/// Formats the LLM accepts without re-encoding.
fn accepted_media_type(extension: &str) -> Option<&'static str> {
    match extension {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Base64 payload plus media type, re-encoding to PNG when needed.
fn prepare_payload(bytes: &[u8], extension: &str) -> Result<(String, &'static str), String> {
    if let Some(media_type) = accepted_media_type(extension) {
        return Ok((BASE64.encode(bytes), media_type));
    }

    let decoded = image::load_from_memory(bytes).map_err(|e| e.to_string())?;
    let mut encoded = Vec::new();
    decoded
        .write_to(&mut std::io::Cursor::new(&mut encoded), image::ImageFormat::Png)
        .map_err(|e| e.to_string())?;
    Ok((BASE64.encode(&encoded), "image/png"))
}

/// Combines per-page analyses of a rasterised PDF into one record:
/// `[Page N]`-prefixed concatenated text, deduplicated objects, the
/// minimum page confidence, and the union of flags.
fn combine_pages(pages: Vec<ImageAnalysisStructured>) -> ImageAnalysisStructured {
    let mut detected_text_parts = Vec::new();
    let mut scene_parts = Vec::new();
    let mut objects: Vec<String> = Vec::new();
    let mut risk_flags = Vec::new();
    let mut people_present = false;
    let mut timestamps_visible = false;
    let mut confidence: f64 = 1.0;
    let mut value = evidentia_core::EvidenceValue::Low;

    for (index, page) in pages.iter().enumerate() {
        let page_no = index + 1;
        if let Some(text) = page.detected_text.as_deref().filter(|t| !t.trim().is_empty()) {
            detected_text_parts.push(format!("[Page {page_no}] {text}"));
        }
        scene_parts.push(format!("[Page {page_no}] {}", page.scene_description));
        for object in page.detected_objects.iter().flatten() {
            if !objects.contains(object) {
                objects.push(object.clone());
            }
        }
        for flag in &page.risk_flags {
            if !risk_flags.contains(flag) {
                risk_flags.push(*flag);
            }
        }
        people_present |= page.people_present;
        timestamps_visible |= page.timestamps_visible;
        confidence = confidence.min(page.confidence_overall);
        value = value.max(page.potential_evidence_value);
    }

    ImageAnalysisStructured {
        scene_description: scene_parts.join("\n"),
        detected_text: (!detected_text_parts.is_empty()).then(|| detected_text_parts.join("\n\n")),
        detected_objects: (!objects.is_empty()).then_some(objects),
        people_present,
        timestamps_visible,
        potential_evidence_value: value,
        analysis_notes: format!("combined analysis of {} rasterised pages", pages.len()),
        confidence_overall: round4(confidence),
        risk_flags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evidentia_core::{EvidenceValue, ImageRiskFlag};
    use evidentia_llm::MockProvider;
    use std::fs;
    use std::path::Path;

    fn page(text: Option<&str>, confidence: f64) -> ImageAnalysisStructured {
        ImageAnalysisStructured {
            scene_description: "a printed page".to_string(),
            detected_text: text.map(String::from),
            detected_objects: Some(vec!["page".to_string(), "signature".to_string()]),
            people_present: false,
            timestamps_visible: false,
            potential_evidence_value: EvidenceValue::Medium,
            analysis_notes: "page".to_string(),
            confidence_overall: confidence,
            risk_flags: vec![],
        }
    }

    #[test]
    fn test_combine_pages_rules() {
        let mut second = page(Some("TERMINATION NOTICE"), 0.7);
        second.people_present = true;
        second.risk_flags.push(ImageRiskFlag::LowQuality);
        second.potential_evidence_value = EvidenceValue::High;

        let combined = combine_pages(vec![page(Some("Dear Ms Johnson"), 0.9), second]);

        let text = combined.detected_text.unwrap();
        assert!(text.starts_with("[Page 1] Dear Ms Johnson"));
        assert!(text.contains("[Page 2] TERMINATION NOTICE"));
        // Min confidence, union of flags, max evidence value.
        assert_eq!(combined.confidence_overall, 0.7);
        assert!(combined.people_present);
        assert_eq!(combined.potential_evidence_value, EvidenceValue::High);
        assert_eq!(combined.risk_flags, vec![ImageRiskFlag::LowQuality]);
        // Objects deduplicated across pages.
        assert_eq!(
            combined.detected_objects.unwrap(),
            vec!["page".to_string(), "signature".to_string()]
        );
    }

    #[test]
    fn test_payload_passthrough_for_accepted_formats() {
        let (payload, media_type) = prepare_payload(b"raw jpeg bytes", "jpg").unwrap();
        assert_eq!(media_type, "image/jpeg");
        assert_eq!(payload, BASE64.encode(b"raw jpeg bytes"));
    }

    #[test]
    fn test_payload_rejects_undecodable_exotic_format() {
        assert!(prepare_payload(b"definitely not a bitmap", "tiff").is_err());
    }

    fn ingested_image(dir: &Path) -> (Arc<EvidenceStore>, String) {
        let store = Arc::new(EvidenceStore::open(dir.join("store")).unwrap());
        let file = dir.join("photo.png");
        fs::write(&file, b"\x89PNG\r\n\x1a\nfake image bytes").unwrap();
        let result = store.ingest(&file, "CASE-1", "analyst").unwrap();
        (store, result.sha256)
    }

    fn image_json() -> serde_json::Value {
        serde_json::json!({
            "scene_description": "An office noticeboard",
            "detected_text": "HEALTH AND SAFETY POLICY",
            "detected_objects": ["noticeboard", "paper"],
            "people_present": false,
            "timestamps_visible": true,
            "potential_evidence_value": "medium",
            "analysis_notes": "clear photograph",
            "confidence_overall": 0.88,
            "risk_flags": []
        })
    }

    #[tokio::test]
    async fn test_image_analysis_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let (store, hash) = ingested_image(dir.path());

        let provider = Arc::new(MockProvider::new().with_json("Analyze the image", image_json()));
        let analyzer = ImageAnalyzer::new(
            Arc::clone(&store),
            Some(provider),
            AnalyzerOptions::default(),
        );

        let unified = analyzer
            .analyze(&hash, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(unified.evidence_type, EvidenceType::Image);
        let img = unified.image_analysis.as_ref().unwrap();
        assert!(img.timestamps_visible);
        assert!(img.has_text());
    }

    #[tokio::test]
    async fn test_batch_analysis_without_llm() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(EvidenceStore::open(dir.path().join("store")).unwrap());

        let mut hashes = Vec::new();
        for i in 0..3 {
            let file = dir.path().join(format!("photo{i}.png"));
            fs::write(&file, format!("fake image {i}")).unwrap();
            hashes.push(store.ingest(&file, "CASE-1", "analyst").unwrap().sha256);
        }

        let analyzer: ImageAnalyzer<MockProvider> =
            ImageAnalyzer::new(Arc::clone(&store), None, AnalyzerOptions::default());

        let results = analyzer
            .analyze_batch(&hashes, DEFAULT_MAX_CONCURRENT, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        for unified in results.values() {
            let img = unified.image_analysis.as_ref().unwrap();
            assert_eq!(img.confidence_overall, 0.0);
            assert!(img.risk_flags.contains(&ImageRiskFlag::MetadataMissing));
        }
    }

    #[tokio::test]
    async fn test_batch_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(EvidenceStore::open(dir.path().join("store")).unwrap());
        let file = dir.path().join("photo.png");
        fs::write(&file, b"fake").unwrap();
        let hash = store.ingest(&file, "CASE-1", "analyst").unwrap().sha256;

        let analyzer: ImageAnalyzer<MockProvider> =
            ImageAnalyzer::new(Arc::clone(&store), None, AnalyzerOptions::default());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = analyzer
            .analyze_batch(&[hash], 2, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyzeError::Cancelled));
    }
}
