//! Evidentia CLI entry point.

use anyhow::Result;
use clap::Parser;
use evidentia_analyze::AnalyzeError;
use evidentia_cli::{Cli, Commands, commands};
use evidentia_core::CoreError;
use evidentia_correlate::CorrelateError;
use evidentia_llm::LlmError;
use evidentia_store::StoreError;
use std::fs;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    if let Err(err) = run(&cli).await {
        let (component, kind) = classify(&err);
        eprintln!("evidentia: {component} error ({kind}): {err}");
        tracing::error!(component, kind, error = %err, "command failed");
        std::process::exit(exit_code(kind));
    }
}

async fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Ingest {
            path,
            case_id,
            actor,
        } => commands::handle_ingest(&cli.data_dir, path, case_id, actor),
        Commands::Analyze {
            hashes,
            case_type,
            model,
            max_concurrent,
        } => {
            commands::handle_analyze(
                &cli.data_dir,
                hashes,
                case_type,
                model,
                *max_concurrent as usize,
            )
            .await
        }
        Commands::Correlate {
            case_id,
            case_type,
            ai_resolve,
            ai_patterns,
            model,
        } => {
            commands::handle_correlate(
                &cli.data_dir,
                case_id,
                case_type,
                *ai_resolve,
                *ai_patterns,
                model,
            )
            .await
        }
        Commands::Summarize {
            case_id,
            case_type,
            ai_resolve,
            ai_summary,
            model,
            output,
        } => {
            commands::handle_summarize(
                &cli.data_dir,
                case_id,
                case_type,
                *ai_resolve,
                *ai_summary,
                model,
                output.as_deref(),
            )
            .await
        }
        Commands::Report {
            case_id,
            case_type,
            ai_resolve,
            ai_summary,
            ai_patterns,
            model,
            output_dir,
            summary_json,
        } => {
            commands::handle_report(
                &cli.data_dir,
                case_id,
                case_type,
                *ai_resolve,
                *ai_summary,
                *ai_patterns,
                model,
                output_dir,
                summary_json.as_deref(),
            )
            .await
        }
        Commands::Stats => commands::handle_stats(&cli.data_dir),
        Commands::Cleanup { dry_run } => commands::handle_cleanup(&cli.data_dir, *dry_run),
        Commands::PruneCase { case_id, dry_run } => {
            commands::handle_prune_case(&cli.data_dir, case_id, *dry_run)
        }
    }
}

/// Console logging keyed to verbosity, plus a structured JSON log under
/// `data/logs/`.
fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    let log_dir = cli.data_dir.join("logs");
    let file_layer = fs::create_dir_all(&log_dir)
        .and_then(|_| {
            fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_dir.join("evidentia.log"))
        })
        .ok()
        .map(|file| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(Arc::new(file))
        });

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .with(tracing_subscriber::EnvFilter::new(level))
        .init();
}

/// Names the failing component and error kind for the one-line summary.
fn classify(err: &anyhow::Error) -> (&'static str, &'static str) {
    for cause in err.chain() {
        if let Some(core) = cause.downcast_ref::<CoreError>() {
            return match core {
                CoreError::Validation { .. } => ("schema", "validation"),
                CoreError::Io(_) => ("schema", "io"),
                CoreError::Serialization(_) => ("schema", "validation"),
            };
        }
        if let Some(store) = cause.downcast_ref::<StoreError>() {
            return match store {
                StoreError::Ingest(_) => ("store", "ingest"),
                StoreError::UnknownHash(_) | StoreError::Consistency(_) => {
                    ("store", "consistency")
                }
                StoreError::Schema(_) => ("store", "validation"),
                StoreError::Io(_) => ("store", "io"),
            };
        }
        if let Some(llm) = cause.downcast_ref::<LlmError>() {
            return match llm {
                LlmError::Unavailable(_) => ("llm", "unavailable"),
                LlmError::Incomplete(_) => ("llm", "incomplete"),
                LlmError::Refused(_) => ("llm", "refused"),
                LlmError::Timeout(_) => ("llm", "timeout"),
                LlmError::InvalidResponse(_) => ("llm", "validation"),
                LlmError::Cancelled => ("llm", "cancelled"),
            };
        }
        if let Some(analyze) = cause.downcast_ref::<AnalyzeError>() {
            return match analyze {
                AnalyzeError::Store(StoreError::Io(_)) => ("analyzer", "io"),
                AnalyzeError::Store(_) => ("analyzer", "consistency"),
                AnalyzeError::Schema(_) => ("analyzer", "validation"),
                AnalyzeError::DependencyMissing(_) => ("analyzer", "dependency_missing"),
                AnalyzeError::Cancelled => ("analyzer", "cancelled"),
                AnalyzeError::Llm(_) => ("analyzer", "llm"),
                AnalyzeError::Internal(_) => ("analyzer", "internal"),
            };
        }
        if let Some(correlate) = cause.downcast_ref::<CorrelateError>() {
            return match correlate {
                CorrelateError::Store(StoreError::Io(_)) => ("correlation", "io"),
                CorrelateError::Store(_) => ("correlation", "consistency"),
                CorrelateError::Schema(_) => ("correlation", "validation"),
            };
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return ("cli", "io");
        }
    }
    ("cli", "unknown")
}

/// Exit semantics: 0 success, 1 validation, 2 I/O, 3 LLM, 4 unknown.
fn exit_code(kind: &str) -> i32 {
    match kind {
        "validation" | "consistency" => 1,
        "io" | "ingest" => 2,
        "unavailable" | "incomplete" | "refused" | "timeout" | "llm" => 3,
        _ => 4,
    }
}
