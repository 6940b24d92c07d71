//! Document analyzer.
//!
//! Plain text goes straight to structured analysis. PDFs are tried as
//! text first; when extraction yields nothing (a scanned PDF) the pages
//! are rasterised and handed to the image analyzer. A stop-word-filtered
//! word frequency is always computed: it annotates successful analyses
//! and is the whole analysis when no LLM is configured.

use crate::image::ImageAnalyzer;
use crate::prompts;
use crate::rasterize::{DEFAULT_RASTER_DPI, PdfRasterizer};
use crate::{AnalyzeError, AnalyzeResult, AnalyzerOptions, FoldedFailure, persist};
use chrono::Utc;
use evidentia_core::{
    AnalysisParameters, CustodyEventType, DocumentAnalysis, DocumentAnalysisRecord, EvidenceBundle,
    EvidenceCore, EvidenceType, ModelInfo, SCHEMA_VERSION, UnifiedAnalysis, WordCount,
    WordStatistics, round4, sha256_hex,
};
use evidentia_llm::{LlmProvider, StructuredRequest, TokenUsage, call_with_retry};
use evidentia_store::EvidenceStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Number of top words kept in the frequency annex.
const TOP_WORDS: usize = 10;

const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "an", "and", "any", "are", "as", "at", "be", "been", "but", "by",
    "can", "could", "did", "do", "for", "from", "had", "has", "have", "he", "her", "his", "i",
    "if", "in", "is", "it", "its", "me", "my", "no", "not", "of", "on", "or", "our", "she", "so",
    "that", "the", "their", "them", "they", "this", "to", "was", "we", "were", "which", "will",
    "with", "would", "you", "your",
];

/// Analyzer for text documents and PDFs.
pub struct DocumentAnalyzer<P> {
    store: Arc<EvidenceStore>,
    provider: Option<Arc<P>>,
    rasterizer: Option<Arc<dyn PdfRasterizer>>,
    options: AnalyzerOptions,
}

impl<P: LlmProvider + 'static> DocumentAnalyzer<P> {
    pub fn new(store: Arc<EvidenceStore>, provider: Option<Arc<P>>, options: AnalyzerOptions) -> Self {
        Self {
            store,
            provider,
            rasterizer: None,
            options,
        }
    }

    /// Installs the external PDF rasteriser used for scanned PDFs.
    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn PdfRasterizer>) -> Self {
        self.rasterizer = Some(rasterizer);
        self
    }

    /// Analyzes one ingested document and persists the result.
    pub async fn analyze(
        &self,
        sha256: &str,
        cancel: &CancellationToken,
    ) -> AnalyzeResult<UnifiedAnalysis> {
        let metadata = self.store.get_metadata(sha256)?;
        let bytes = self.store.read_original(sha256)?;
        let evidence_type = EvidenceType::from_extension(&metadata.extension);

        let text = if evidence_type == EvidenceType::Pdf {
            match pdf_extract::extract_text_from_mem(&bytes) {
                Ok(text) if !text.trim().is_empty() => text,
                _ => return self.delegate_scanned_pdf(sha256, &bytes, cancel).await,
            }
        } else {
            String::from_utf8_lossy(&bytes).into_owned()
        };

        let word_statistics = word_statistics(&text);
        let (analysis, notes, failure, provenance) = self.structured_or_fallback(
            &text,
            word_statistics,
            cancel,
        )
        .await?;

        let unified = UnifiedAnalysis {
            schema_version: SCHEMA_VERSION.to_string(),
            evidence_type,
            analysis_timestamp: Utc::now(),
            file_metadata: metadata.clone(),
            case_ids: self.store.cases_of(sha256)?,
            case_id: None,
            document_analysis: Some(analysis),
            image_analysis: None,
            email_analysis: None,
            chain_of_custody: self.store.read_custody(sha256)?,
            exif_data: None,
            email_headers: None,
            labels: Vec::new(),
            notes,
            extra: BTreeMap::new(),
        };

        persist(&self.store, sha256, &unified, &self.options.actor, failure)?;

        if let Some((prompt_hash, token_usage)) = provenance {
            self.export_bundle(sha256, &unified, prompt_hash, token_usage)?;
        }

        info!(sha256, %evidence_type, "document analysis complete");
        self.store.get_analysis(sha256)?.ok_or_else(|| {
            AnalyzeError::Internal("analysis missing immediately after save".to_string())
        })
    }

    async fn structured_or_fallback(
        &self,
        text: &str,
        word_statistics: WordStatistics,
        cancel: &CancellationToken,
    ) -> AnalyzeResult<(
        DocumentAnalysis,
        Option<String>,
        Option<FoldedFailure>,
        Option<(String, Option<TokenUsage>)>,
    )> {
        let Some(provider) = &self.provider else {
            return Ok((
                DocumentAnalysis::fallback(
                    fallback_summary(&word_statistics),
                    Some(word_statistics),
                ),
                Some("structured analysis skipped: no LLM configured; word-frequency fallback only".to_string()),
                Some(FoldedFailure::Unavailable),
                None,
            ));
        };

        let prompt = prompts::document_prompt(self.options.case_type, text);
        let request = StructuredRequest::deterministic(
            &self.options.model,
            &prompt,
            "document_analysis",
            prompts::document_schema(),
        );

        match call_with_retry(provider.as_ref(), &request, &self.options.llm, cancel).await {
            Ok(response) => {
                let token_usage = response.token_usage;
                match response.into_parsed::<DocumentAnalysis>() {
                    Ok(mut analysis) => {
                        round_document(&mut analysis);
                        analysis.word_statistics = Some(word_statistics);
                        Ok((
                            analysis,
                            None,
                            None,
                            Some((sha256_hex(prompt.as_bytes()), token_usage)),
                        ))
                    }
                    Err(err) => {
                        let (folded, message) = FoldedFailure::from_llm(err)?;
                        warn!(%message, kind = folded.kind(), "document analysis folded");
                        Ok((
                            DocumentAnalysis::fallback(
                                fallback_summary(&word_statistics),
                                Some(word_statistics),
                            ),
                            Some(format!("structured analysis failed ({}): {message}", folded.kind())),
                            Some(folded),
                            None,
                        ))
                    }
                }
            }
            Err(err) => {
                let (folded, message) = FoldedFailure::from_llm(err)?;
                warn!(%message, kind = folded.kind(), "document analysis folded");
                Ok((
                    DocumentAnalysis::fallback(
                        fallback_summary(&word_statistics),
                        Some(word_statistics),
                    ),
                    Some(format!("structured analysis failed ({}): {message}", folded.kind())),
                    Some(folded),
                    None,
                ))
            }
        }
    }

    async fn delegate_scanned_pdf(
        &self,
        sha256: &str,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> AnalyzeResult<UnifiedAnalysis> {
        let Some(rasterizer) = &self.rasterizer else {
            let metadata = self.store.get_metadata(sha256)?;
            let unified = UnifiedAnalysis {
                schema_version: SCHEMA_VERSION.to_string(),
                evidence_type: EvidenceType::Pdf,
                analysis_timestamp: Utc::now(),
                file_metadata: metadata,
                case_ids: self.store.cases_of(sha256)?,
                case_id: None,
                document_analysis: Some(DocumentAnalysis::fallback(
                    "scanned PDF; no text layer",
                    None,
                )),
                image_analysis: None,
                email_analysis: None,
                chain_of_custody: self.store.read_custody(sha256)?,
                exif_data: None,
                email_headers: None,
                labels: Vec::new(),
                notes: Some(
                    "scanned PDF could not be analysed: no rasteriser installed".to_string(),
                ),
                extra: BTreeMap::new(),
            };
            persist(
                &self.store,
                sha256,
                &unified,
                &self.options.actor,
                Some(FoldedFailure::DependencyMissing),
            )?;
            return self.store.get_analysis(sha256)?.ok_or_else(|| {
                AnalyzeError::Internal("analysis missing immediately after save".to_string())
            });
        };

        let pages = rasterizer
            .rasterize(bytes, DEFAULT_RASTER_DPI)
            .map_err(AnalyzeError::DependencyMissing)?;

        let image_analyzer = ImageAnalyzer::new(
            Arc::clone(&self.store),
            self.provider.clone(),
            self.options.clone(),
        );
        image_analyzer
            .analyze_rasterized_pdf(sha256, pages, cancel)
            .await
    }

    fn export_bundle(
        &self,
        sha256: &str,
        unified: &UnifiedAnalysis,
        prompt_hash: String,
        token_usage: Option<TokenUsage>,
    ) -> AnalyzeResult<()> {
        let metadata = &unified.file_metadata;
        if metadata.file_size == 0 {
            return Ok(());
        }
        let Some(analysis) = &unified.document_analysis else {
            return Ok(());
        };
        let Some(case_id) = unified.case_ids.first() else {
            return Ok(());
        };

        let ingested_at = unified
            .chain_of_custody
            .iter()
            .find(|e| e.event_type == CustodyEventType::Ingest)
            .map(|e| e.timestamp)
            .unwrap_or_else(Utc::now);

        let bundle = EvidenceBundle::new(
            case_id.clone(),
            EvidenceCore {
                evidence_id: Uuid::new_v4(),
                sha256: sha256.to_string(),
                mime_type: metadata.mime_type.clone(),
                bytes: metadata.file_size,
                ingested_at,
                source_path: metadata.filename.clone(),
            },
            unified.chain_of_custody.clone(),
            vec![DocumentAnalysisRecord {
                analysis_id: Uuid::new_v4(),
                created_at: unified.analysis_timestamp,
                model: ModelInfo {
                    name: self.options.model.clone(),
                    revision: self
                        .provider
                        .as_ref()
                        .map(|p| p.model_name().to_string())
                        .unwrap_or_else(|| "none".to_string()),
                },
                parameters: AnalysisParameters {
                    temperature: 0.0,
                    prompt_hash: Some(prompt_hash),
                    token_usage_in: token_usage.map(|u| u.input_tokens),
                    token_usage_out: token_usage.map(|u| u.output_tokens),
                },
                outputs: analysis.clone(),
                confidence_overall: analysis.confidence_overall,
            }],
        );

        self.store.save_bundle(sha256, &bundle)?;
        Ok(())
    }
}

fn round_document(analysis: &mut DocumentAnalysis) {
    analysis.confidence_overall = round4(analysis.confidence_overall);
    for entity in &mut analysis.entities {
        entity.confidence = round4(entity.confidence);
    }
}

fn fallback_summary(stats: &WordStatistics) -> String {
    let top: Vec<&str> = stats
        .top_words
        .iter()
        .take(5)
        .map(|w| w.word.as_str())
        .collect();
    format!(
        "Unstructured text of {} words ({} unique). Most frequent terms: {}.",
        stats.total_words,
        stats.unique_words,
        top.join(", ")
    )
}

/// Stop-word-filtered word frequency over the document text.
pub fn word_statistics(text: &str) -> WordStatistics {
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut total = 0u64;

    for raw in text.split(|c: char| !c.is_alphanumeric() && c != '\'') {
        let word = raw.trim_matches('\'').to_lowercase();
        if word.is_empty() {
            continue;
        }
        total += 1;
        if STOP_WORDS.contains(&word.as_str()) || word.chars().all(|c| c.is_numeric()) {
            continue;
        }
        *counts.entry(word).or_insert(0) += 1;
    }

    let unique_words = counts.len() as u64;
    let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
    // Count descending, word ascending: deterministic for equal counts.
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    WordStatistics {
        total_words: total,
        unique_words,
        top_words: ranked
            .into_iter()
            .take(TOP_WORDS)
            .map(|(word, count)| WordCount { word, count })
            .collect(),
    }
}
