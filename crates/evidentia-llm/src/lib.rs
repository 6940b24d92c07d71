//! Evidentia-LLM: structured LLM provider abstraction.
//!
//! The toolkit's only synchronous external dependency is a structured
//! completion service: the caller supplies a model, a prompt, a JSON
//! schema, and a temperature, and receives an envelope whose status is
//! `completed`, `incomplete`, or `refused`. When the status is
//! `completed`, `parsed_output` already satisfies the supplied schema.
//!
//! Analyzer calls run at temperature 0 so the same input and model yield
//! the same stored analysis.

mod batch;
mod providers;
mod retry;

pub use batch::{BatchConfig, batch_structured};
pub use providers::{MockProvider, OpenAiClient};
pub use retry::call_with_retry;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors from the LLM layer.
#[derive(Debug, Error)]
pub enum LlmError {
    /// No API key configured, transport failure, or rate limit exhausted.
    #[error("LLM unavailable: {0}")]
    Unavailable(String),

    /// Provider returned `status=incomplete`; transient.
    #[error("LLM response incomplete: {0}")]
    Incomplete(String),

    /// Provider refused to answer; never retried.
    #[error("LLM refused: {0}")]
    Refused(String),

    /// The per-request timeout elapsed; transient.
    #[error("LLM request timed out after {0:?}")]
    Timeout(Duration),

    /// Completed response did not match the requested schema.
    #[error("LLM response did not satisfy the schema: {0}")]
    InvalidResponse(String),

    /// Cooperative cancellation fired before the call was issued.
    #[error("LLM call cancelled")]
    Cancelled,
}

impl LlmError {
    /// Transient errors may be retried; refusals and schema mismatches
    /// may not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Incomplete(_) | Self::Timeout(_))
    }
}

/// Result type for LLM operations.
pub type LlmResult<T> = Result<T, LlmError>;

/// A structured completion request.
#[derive(Debug, Clone, Serialize)]
pub struct StructuredRequest {
    pub model: String,
    pub prompt: String,
    /// Name reported to the provider for the response schema.
    pub schema_name: String,
    /// JSON schema the parsed output must satisfy.
    pub schema: serde_json::Value,
    pub temperature: f64,
    pub max_output_tokens: u32,
}

impl StructuredRequest {
    /// A deterministic (temperature 0) request, the analyzer default.
    pub fn deterministic(
        model: impl Into<String>,
        prompt: impl Into<String>,
        schema_name: impl Into<String>,
        schema: serde_json::Value,
    ) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            schema_name: schema_name.into(),
            schema,
            temperature: 0.0,
            max_output_tokens: 4096,
        }
    }

    pub fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = max;
        self
    }
}

/// Completion status of a structured response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuredStatus {
    Completed,
    Incomplete,
    Refused,
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// The provider's response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredResponse {
    pub status: StructuredStatus,
    /// Present and schema-conforming when `status` is `completed`.
    pub parsed_output: Option<serde_json::Value>,
    pub refusal_reason: Option<String>,
    pub incomplete_reason: Option<String>,
    pub token_usage: Option<TokenUsage>,
}

impl StructuredResponse {
    /// A completed envelope wrapping the given output.
    pub fn completed(parsed_output: serde_json::Value) -> Self {
        Self {
            status: StructuredStatus::Completed,
            parsed_output: Some(parsed_output),
            refusal_reason: None,
            incomplete_reason: None,
            token_usage: None,
        }
    }

    /// Converts the envelope into a typed value, surfacing incomplete and
    /// refused statuses as their error kinds.
    pub fn into_parsed<T: DeserializeOwned>(self) -> LlmResult<T> {
        match self.status {
            StructuredStatus::Completed => {
                let value = self.parsed_output.ok_or_else(|| {
                    LlmError::InvalidResponse("completed response without parsed_output".into())
                })?;
                serde_json::from_value(value)
                    .map_err(|e| LlmError::InvalidResponse(e.to_string()))
            }
            StructuredStatus::Incomplete => Err(LlmError::Incomplete(
                self.incomplete_reason
                    .unwrap_or_else(|| "no reason given".into()),
            )),
            StructuredStatus::Refused => Err(LlmError::Refused(
                self.refusal_reason
                    .unwrap_or_else(|| "no reason given".into()),
            )),
        }
    }
}

/// Provider abstraction over structured completion services.
///
/// Implementations are stateless and shareable; rate-limit handling is
/// the caller's responsibility.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Issues one structured completion call.
    async fn generate_structured(&self, request: &StructuredRequest)
    -> LlmResult<StructuredResponse>;

    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;
}

/// Client-side policy for timeouts and transient-status retries.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retries applied to transient failures only.
    pub max_retries: u32,
    /// Base delay between attempts, doubled each retry.
    pub retry_backoff: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl LlmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = LlmConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.max_retries, 2);
    }

    #[test]
    fn test_transient_classification() {
        assert!(LlmError::Incomplete("max tokens".into()).is_transient());
        assert!(LlmError::Timeout(Duration::from_secs(60)).is_transient());
        assert!(!LlmError::Refused("policy".into()).is_transient());
        assert!(!LlmError::InvalidResponse("bad json".into()).is_transient());
        assert!(!LlmError::Unavailable("no key".into()).is_transient());
    }

    #[test]
    fn test_into_parsed_completed() {
        #[derive(Debug, serde::Deserialize, PartialEq)]
        struct Out {
            verdict: String,
        }

        let response = StructuredResponse::completed(serde_json::json!({"verdict": "ok"}));
        let out: Out = response.into_parsed().unwrap();
        assert_eq!(out.verdict, "ok");
    }

    #[test]
    fn test_into_parsed_statuses() {
        let incomplete = StructuredResponse {
            status: StructuredStatus::Incomplete,
            parsed_output: None,
            refusal_reason: None,
            incomplete_reason: Some("max_output_tokens".into()),
            token_usage: None,
        };
        let err = incomplete.into_parsed::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, LlmError::Incomplete(_)));

        let refused = StructuredResponse {
            status: StructuredStatus::Refused,
            parsed_output: None,
            refusal_reason: Some("cannot analyze".into()),
            incomplete_reason: None,
            token_usage: None,
        };
        let err = refused.into_parsed::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, LlmError::Refused(_)));
    }

    #[test]
    fn test_deterministic_request_temperature() {
        let request = StructuredRequest::deterministic(
            "gpt-4.1-mini",
            "prompt",
            "schema",
            serde_json::json!({"type": "object"}),
        );
        assert_eq!(request.temperature, 0.0);
    }
}
