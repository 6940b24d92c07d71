//! Evidentia CLI: argument surface and command handlers.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Tribunal-grade analysis of heterogeneous legal evidence.
#[derive(Debug, Parser)]
#[command(name = "evidentia", version, about)]
pub struct Cli {
    /// Store root directory.
    #[arg(long, default_value = "data", global = true)]
    pub data_dir: PathBuf,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Silence everything but errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Ingest a file or directory into a case.
    Ingest {
        /// File or directory to ingest.
        path: PathBuf,
        /// Case the evidence belongs to.
        #[arg(long)]
        case_id: String,
        /// Actor recorded on the custody trail.
        #[arg(long, default_value = "evidentia")]
        actor: String,
    },

    /// Analyze ingested evidence by hash.
    Analyze {
        /// Evidence hashes to analyze.
        #[arg(required = true)]
        hashes: Vec<String>,
        /// Case type steering the prompts.
        #[arg(long, default_value = "generic")]
        case_type: String,
        /// Model requested from the LLM provider.
        #[arg(long, default_value = "gpt-4.1-mini")]
        model: String,
        /// Maximum in-flight LLM calls for image batches (1-10).
        #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u8).range(1..=10))]
        max_concurrent: u8,
    },

    /// Correlate every analysis in a case.
    Correlate {
        case_id: String,
        #[arg(long, default_value = "generic")]
        case_type: String,
        /// Ask the LLM to arbitrate ambiguous entity clusters.
        #[arg(long)]
        ai_resolve: bool,
        /// Ask the LLM for cross-evidence legal patterns.
        #[arg(long)]
        ai_patterns: bool,
        #[arg(long, default_value = "gpt-4.1-mini")]
        model: String,
    },

    /// Build the aggregated case summary.
    Summarize {
        case_id: String,
        #[arg(long, default_value = "generic")]
        case_type: String,
        #[arg(long)]
        ai_resolve: bool,
        /// Ask the LLM for the executive summary.
        #[arg(long)]
        ai_summary: bool,
        #[arg(long, default_value = "gpt-4.1-mini")]
        model: String,
        /// Write the summary JSON here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Generate the Markdown report suite for a case.
    Report {
        case_id: String,
        #[arg(long, default_value = "generic")]
        case_type: String,
        #[arg(long)]
        ai_resolve: bool,
        #[arg(long)]
        ai_summary: bool,
        #[arg(long)]
        ai_patterns: bool,
        #[arg(long, default_value = "gpt-4.1-mini")]
        model: String,
        /// Directory the reports are written into.
        #[arg(long, default_value = "reports")]
        output_dir: PathBuf,
        /// Reuse a previously written case summary instead of recomputing.
        #[arg(long)]
        summary_json: Option<PathBuf>,
    },

    /// Show store statistics.
    Stats,

    /// Remove broken links and empty link directories.
    Cleanup {
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove evidence that belongs only to the given case.
    PruneCase {
        case_id: String,
        #[arg(long)]
        dry_run: bool,
    },
}
