//! Evidentia-Analyze: per-type evidence analyzers.
//!
//! Each analyzer follows the same contract: read the raw file through the
//! store, normalise it into a prompt payload, call the structured LLM
//! service at temperature 0, validate the response, and persist a
//! [`UnifiedAnalysis`] back through the store.
//!
//! When the LLM is unavailable, incomplete, or refuses, the analyzer does
//! not fail: it persists a partial analysis with confidence 0 and an
//! explanatory note, and the custody trail records a failed `analyze`
//! event with the error kind. Schema violations remain hard errors.

pub mod document;
pub mod email;
pub mod image;
pub mod prompts;
pub mod rasterize;

pub use document::DocumentAnalyzer;
pub use email::EmailAnalyzer;
pub use image::ImageAnalyzer;
pub use prompts::CaseType;
pub use rasterize::{DEFAULT_RASTER_DPI, PdfRasterizer};

use evidentia_core::{CoreError, UnifiedAnalysis};
use evidentia_llm::{LlmConfig, LlmError};
use evidentia_store::StoreError;
use thiserror::Error;

/// Errors from the analyzer layer.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Schema(#[from] CoreError),

    /// An optional parser or renderer is not available.
    #[error("dependency missing: {0}")]
    DependencyMissing(String),

    /// Cooperative cancellation fired.
    #[error("analysis cancelled")]
    Cancelled,

    /// A hard LLM failure that cannot be folded into a partial analysis.
    #[error(transparent)]
    Llm(LlmError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for analyzer operations.
pub type AnalyzeResult<T> = Result<T, AnalyzeError>;

/// Shared analyzer settings.
#[derive(Debug, Clone)]
pub struct AnalyzerOptions {
    /// Model requested from the provider.
    pub model: String,
    /// Case type steering the prompt registry.
    pub case_type: CaseType,
    /// Actor recorded on custody events.
    pub actor: String,
    /// Timeout and retry policy for LLM calls.
    pub llm: LlmConfig,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4.1-mini".to_string(),
            case_type: CaseType::Generic,
            actor: "evidentia".to_string(),
            llm: LlmConfig::default(),
        }
    }
}

/// How a recoverable analyzer failure is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FoldedFailure {
    Unavailable,
    Incomplete,
    Refused,
    DependencyMissing,
}

impl FoldedFailure {
    /// The error kind written to the failed custody event.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable => "llm_unavailable",
            Self::Incomplete => "llm_incomplete",
            Self::Refused => "llm_refused",
            Self::DependencyMissing => "dependency_missing",
        }
    }

    /// Classifies an LLM error, or passes hard errors through.
    pub(crate) fn from_llm(error: LlmError) -> AnalyzeResult<(Self, String)> {
        match error {
            LlmError::Unavailable(msg) => Ok((Self::Unavailable, msg)),
            LlmError::Timeout(t) => Ok((Self::Unavailable, format!("timed out after {t:?}"))),
            LlmError::Incomplete(msg) => Ok((Self::Incomplete, msg)),
            LlmError::Refused(msg) => Ok((Self::Refused, msg)),
            LlmError::Cancelled => Err(AnalyzeError::Cancelled),
            hard @ LlmError::InvalidResponse(_) => Err(AnalyzeError::Llm(hard)),
        }
    }
}

/// Persists an analysis according to its outcome: completed analyses go
/// through `save_analysis`, folded failures through `save_failed_analysis`
/// with the error kind.
pub(crate) fn persist(
    store: &evidentia_store::EvidenceStore,
    sha256: &str,
    analysis: &UnifiedAnalysis,
    actor: &str,
    failure: Option<FoldedFailure>,
) -> AnalyzeResult<()> {
    match failure {
        None => store.save_analysis(sha256, analysis, actor)?,
        Some(folded) => store.save_failed_analysis(sha256, analysis, actor, folded.kind())?,
    }
    Ok(())
}
