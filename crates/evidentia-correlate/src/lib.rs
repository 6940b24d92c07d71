//! Evidentia-Correlate: cross-evidence correlation and case aggregation.
//!
//! The correlation analyzer loads every analysis for a case, canonicalises
//! extracted entities into clusters, reconstructs the case timeline,
//! detects temporal sequences around legally significant anchors and gaps
//! between substantive events, and optionally asks the LLM for
//! cross-evidence legal patterns.
//!
//! The aggregator re-reads the per-item analyses (never the correlation
//! result) to build the generator-facing [`OverallAssessment`], and
//! optionally produces an executive summary directly or by map-reduce
//! over evidence chunks.
//!
//! Both passes are read-only over the store: they take the case hash list
//! once at entry and never retry LLM calls. Individual unreadable items
//! are skipped, not fatal.

pub mod canonical;
pub mod correlation;
pub mod sequences;
pub mod summary;
pub mod timeline;

pub use canonical::{CanonicalName, canonicalise};
pub use correlation::{CorrelationAnalyzer, CorrelationOptions};
pub use summary::{Aggregator, SummaryOptions};

use evidentia_core::CoreError;
use evidentia_store::StoreError;
use thiserror::Error;

/// Errors from the correlation and aggregation layer.
#[derive(Debug, Error)]
pub enum CorrelateError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Schema(#[from] CoreError),
}

/// Result type for correlation operations.
pub type CorrelateResult<T> = Result<T, CorrelateError>;
