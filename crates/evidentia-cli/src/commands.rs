//! Command handlers.

use anyhow::{Context, Result};
use evidentia_analyze::{
    AnalyzerOptions, CaseType, DocumentAnalyzer, EmailAnalyzer, ImageAnalyzer,
};
use evidentia_core::{EvidenceType, Validate, fsjson};
use evidentia_correlate::{Aggregator, CorrelationAnalyzer, CorrelationOptions, SummaryOptions};
use evidentia_llm::OpenAiClient;
use evidentia_report::generate_reports;
use evidentia_store::EvidenceStore;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

fn open_store(data_dir: &Path) -> Result<Arc<EvidenceStore>> {
    Ok(Arc::new(EvidenceStore::open(data_dir.join("storage"))?))
}

/// Provider from the environment; `None` disables every AI path.
fn provider_from_env(model: &str) -> Option<Arc<OpenAiClient>> {
    let provider = OpenAiClient::from_env(model);
    if provider.is_none() {
        warn!("no API key configured; AI analysis is disabled");
    }
    provider.map(Arc::new)
}

pub fn handle_ingest(data_dir: &Path, path: &Path, case_id: &str, actor: &str) -> Result<()> {
    let store = open_store(data_dir)?;
    let results = if path.is_dir() {
        store.ingest_dir(path, case_id, actor)?
    } else {
        vec![store.ingest(path, case_id, actor)?]
    };

    for result in &results {
        let marker = if result.already_existed { "=" } else { "+" };
        println!(
            "{marker} {} {} ({})",
            &result.sha256[..8],
            result.filename,
            result.evidence_type
        );
    }
    println!("{} file(s) ingested into {case_id}", results.len());
    Ok(())
}

pub async fn handle_analyze(
    data_dir: &Path,
    hashes: &[String],
    case_type: &str,
    model: &str,
    max_concurrent: usize,
) -> Result<()> {
    let store = open_store(data_dir)?;
    let provider = provider_from_env(model);
    let options = AnalyzerOptions {
        model: model.to_string(),
        case_type: CaseType::parse(case_type),
        ..AnalyzerOptions::default()
    };
    // Ctrl-C requests cooperative cancellation: no new analysis starts,
    // and in-flight LLM results are discarded.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    // Images go through the bounded-concurrency batch path; documents and
    // emails run sequentially.
    let mut images = Vec::new();
    let mut sequential = Vec::new();
    for hash in hashes {
        let metadata = store.get_metadata(hash)?;
        match EvidenceType::from_extension(&metadata.extension) {
            EvidenceType::Image => images.push(hash.clone()),
            _ => sequential.push(hash.clone()),
        }
    }

    if !images.is_empty() {
        let analyzer = ImageAnalyzer::new(Arc::clone(&store), provider.clone(), options.clone());
        let results = analyzer
            .analyze_batch(&images, max_concurrent, &cancel)
            .await?;
        for (hash, analysis) in results {
            println!(
                "analyzed {} ({}, confidence {:.4})",
                &hash[..8],
                analysis.evidence_type,
                analysis.confidence()
            );
        }
    }

    for hash in sequential {
        let metadata = store.get_metadata(&hash)?;
        let analysis = match EvidenceType::from_extension(&metadata.extension) {
            EvidenceType::Email => {
                EmailAnalyzer::new(Arc::clone(&store), provider.clone(), options.clone())
                    .analyze(&hash, &cancel)
                    .await?
            }
            _ => {
                DocumentAnalyzer::new(Arc::clone(&store), provider.clone(), options.clone())
                    .analyze(&hash, &cancel)
                    .await?
            }
        };
        println!(
            "analyzed {} ({}, confidence {:.4})",
            &hash[..8],
            analysis.evidence_type,
            analysis.confidence()
        );
    }
    Ok(())
}

pub async fn handle_correlate(
    data_dir: &Path,
    case_id: &str,
    case_type: &str,
    ai_resolve: bool,
    ai_patterns: bool,
    model: &str,
) -> Result<()> {
    let store = open_store(data_dir)?;
    let provider = provider_from_env(model);
    let options = CorrelationOptions {
        ai_entity_resolution: ai_resolve,
        ai_legal_patterns: ai_patterns,
        case_type: CaseType::parse(case_type),
        model: model.to_string(),
        ..CorrelationOptions::default()
    };

    let analyzer = CorrelationAnalyzer::new(store, provider, options);
    let correlation = analyzer.correlate(case_id).await?;
    correlation.validate()?;

    println!("{}", serde_json::to_string_pretty(&correlation)?);
    Ok(())
}

pub async fn handle_summarize(
    data_dir: &Path,
    case_id: &str,
    case_type: &str,
    ai_resolve: bool,
    ai_summary: bool,
    model: &str,
    output: Option<&Path>,
) -> Result<()> {
    let summary =
        build_summary(data_dir, case_id, case_type, ai_resolve, ai_summary, false, model).await?;

    match output {
        Some(path) => {
            fsjson::write_json(path, &summary)?;
            println!("case summary written to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&summary)?),
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn handle_report(
    data_dir: &Path,
    case_id: &str,
    case_type: &str,
    ai_resolve: bool,
    ai_summary: bool,
    ai_patterns: bool,
    model: &str,
    output_dir: &Path,
    summary_json: Option<&Path>,
) -> Result<()> {
    let summary = match summary_json {
        Some(path) => {
            let summary: evidentia_core::CaseSummary =
                fsjson::read_validated(path).context("loading case summary")?;
            summary
        }
        None => {
            build_summary(
                data_dir, case_id, case_type, ai_resolve, ai_summary, ai_patterns, model,
            )
            .await?
        }
    };

    let (paths, log) = generate_reports(&summary, output_dir)?;
    for path in &paths {
        println!("wrote {}", path.display());
    }
    for entry in log.failed() {
        eprintln!(
            "report {} failed: {}",
            entry.report,
            entry.detail.as_deref().unwrap_or("unknown")
        );
    }
    println!(
        "{} report(s) written, {} skipped, {} failed",
        log.written(),
        log.entries.len() - log.written() - log.failed().count(),
        log.failed().count()
    );
    Ok(())
}

async fn build_summary(
    data_dir: &Path,
    case_id: &str,
    case_type: &str,
    ai_resolve: bool,
    ai_summary: bool,
    ai_patterns: bool,
    model: &str,
) -> Result<evidentia_core::CaseSummary> {
    let store = open_store(data_dir)?;
    let provider = provider_from_env(model);
    let parsed_case_type = CaseType::parse(case_type);

    let options = SummaryOptions {
        case_type: parsed_case_type,
        ai_summary,
        model: model.to_string(),
        correlation: CorrelationOptions {
            ai_entity_resolution: ai_resolve,
            ai_legal_patterns: ai_patterns,
            case_type: parsed_case_type,
            model: model.to_string(),
            ..CorrelationOptions::default()
        },
    };

    let summary = Aggregator::new(store, provider, options)
        .summarize(case_id)
        .await?;
    summary.validate()?;
    Ok(summary)
}

pub fn handle_stats(data_dir: &Path) -> Result<()> {
    let store = open_store(data_dir)?;
    let stats = store.stats()?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

pub fn handle_cleanup(data_dir: &Path, dry_run: bool) -> Result<()> {
    let store = open_store(data_dir)?;
    let result = store.cleanup(dry_run)?;
    let verb = if dry_run { "would remove" } else { "removed" };
    println!(
        "{verb} {} link(s) and {} director(ies)",
        result.removed_links.len(),
        result.removed_dirs.len()
    );
    for link in &result.removed_links {
        println!("  link {link}");
    }
    for dir in &result.removed_dirs {
        println!("  dir  {dir}");
    }
    Ok(())
}

pub fn handle_prune_case(data_dir: &Path, case_id: &str, dry_run: bool) -> Result<()> {
    let store = open_store(data_dir)?;
    let pruned = store.prune_case(case_id, dry_run)?;
    let verb = if dry_run { "would prune" } else { "pruned" };
    println!("{verb} {} evidence item(s) from {case_id}", pruned.len());
    for hash in &pruned {
        println!("  {hash}");
    }
    Ok(())
}
