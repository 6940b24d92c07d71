//! LLM provider implementations.

use crate::{
    LlmError, LlmProvider, LlmResult, StructuredRequest, StructuredResponse, StructuredStatus,
    TokenUsage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Environment variable carrying the API key; `OPENAI_API_KEY` is the
/// fallback for compatibility with existing deployments.
pub const API_KEY_ENV: &str = "EVIDENTIA_API_KEY";
pub const API_KEY_ENV_FALLBACK: &str = "OPENAI_API_KEY";

/// OpenAI (or compatible) Responses-API client.
pub struct OpenAiClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// Creates a new client for the given model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Builds a client from the environment, or `None` when no API key is
    /// configured — the signal that disables every AI analysis path.
    pub fn from_env(model: impl Into<String>) -> Option<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .or_else(|_| std::env::var(API_KEY_ENV_FALLBACK))
            .ok()?;
        if api_key.trim().is_empty() {
            return None;
        }
        Some(Self::new(api_key, model))
    }

    /// Points the client at an OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: &'a str,
    temperature: f64,
    max_output_tokens: u32,
    text: TextFormatWrapper<'a>,
}

#[derive(Serialize)]
struct TextFormatWrapper<'a> {
    format: SchemaFormat<'a>,
}

#[derive(Serialize)]
struct SchemaFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'a str,
    schema: &'a serde_json::Value,
    strict: bool,
}

#[derive(Deserialize)]
struct ResponsesReply {
    status: String,
    #[serde(default)]
    incomplete_details: Option<IncompleteDetails>,
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    usage: Option<UsageReply>,
}

#[derive(Deserialize)]
struct IncompleteDetails {
    reason: Option<String>,
}

#[derive(Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Vec<ContentItem>,
}

#[derive(Deserialize)]
struct ContentItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Deserialize)]
struct UsageReply {
    input_tokens: u64,
    output_tokens: u64,
}

#[async_trait]
impl LlmProvider for OpenAiClient {
    async fn generate_structured(
        &self,
        request: &StructuredRequest,
    ) -> LlmResult<StructuredResponse> {
        let body = ResponsesRequest {
            model: &request.model,
            input: &request.prompt,
            temperature: request.temperature,
            max_output_tokens: request.max_output_tokens,
            text: TextFormatWrapper {
                format: SchemaFormat {
                    kind: "json_schema",
                    name: &request.schema_name,
                    schema: &request.schema,
                    strict: true,
                },
            },
        };

        let response = self
            .client
            .post(format!("{}/responses", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Unavailable(format!("transport failure: {e}")))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::Unavailable("rate limit exhausted".into()));
        }
        if !response.status().is_success() {
            return Err(LlmError::Unavailable(format!(
                "provider returned HTTP {}",
                response.status()
            )));
        }

        let reply: ResponsesReply = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("malformed reply: {e}")))?;

        let token_usage = reply.usage.map(|u| TokenUsage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
        });

        if reply.status == "incomplete" {
            let reason = reply
                .incomplete_details
                .and_then(|d| d.reason)
                .unwrap_or_else(|| "unspecified".into());
            return Ok(StructuredResponse {
                status: StructuredStatus::Incomplete,
                parsed_output: None,
                refusal_reason: None,
                incomplete_reason: Some(reason),
                token_usage,
            });
        }

        for item in &reply.output {
            if item.kind != "message" {
                continue;
            }
            for content in &item.content {
                if content.kind == "refusal" {
                    return Ok(StructuredResponse {
                        status: StructuredStatus::Refused,
                        parsed_output: None,
                        refusal_reason: content.refusal.clone(),
                        incomplete_reason: None,
                        token_usage,
                    });
                }
                if content.kind == "output_text"
                    && let Some(text) = &content.text
                {
                    let parsed: serde_json::Value = serde_json::from_str(text)
                        .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
                    debug!(model = %self.model, "structured response parsed");
                    return Ok(StructuredResponse {
                        status: StructuredStatus::Completed,
                        parsed_output: Some(parsed),
                        refusal_reason: None,
                        incomplete_reason: None,
                        token_usage,
                    });
                }
            }
        }

        Err(LlmError::InvalidResponse(
            "reply contained no output text or refusal".into(),
        ))
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Scripted provider for tests.
///
/// Responses are matched by substring against the prompt; the first
/// registered pattern that matches wins. Calls are counted so retry
/// behaviour can be asserted.
pub struct MockProvider {
    responses: Vec<(String, StructuredResponse)>,
    calls: Mutex<HashMap<String, u32>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            responses: Vec::new(),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a completed JSON response for prompts containing `pattern`.
    pub fn with_json(mut self, pattern: impl Into<String>, value: serde_json::Value) -> Self {
        self.responses
            .push((pattern.into(), StructuredResponse::completed(value)));
        self
    }

    /// Registers a refusal for prompts containing `pattern`.
    pub fn with_refusal(mut self, pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        self.responses.push((
            pattern.into(),
            StructuredResponse {
                status: StructuredStatus::Refused,
                parsed_output: None,
                refusal_reason: Some(reason.into()),
                incomplete_reason: None,
                token_usage: None,
            },
        ));
        self
    }

    /// Registers an incomplete status for prompts containing `pattern`.
    pub fn with_incomplete(mut self, pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        self.responses.push((
            pattern.into(),
            StructuredResponse {
                status: StructuredStatus::Incomplete,
                parsed_output: None,
                refusal_reason: None,
                incomplete_reason: Some(reason.into()),
                token_usage: None,
            },
        ));
        self
    }

    /// Number of calls whose prompt contained `pattern`.
    pub fn call_count(&self, pattern: &str) -> u32 {
        *self.calls.lock().unwrap().get(pattern).unwrap_or(&0)
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn generate_structured(
        &self,
        request: &StructuredRequest,
    ) -> LlmResult<StructuredResponse> {
        for (pattern, response) in &self.responses {
            if request.prompt.contains(pattern.as_str()) {
                *self
                    .calls
                    .lock()
                    .unwrap()
                    .entry(pattern.clone())
                    .or_insert(0) += 1;
                return Ok(response.clone());
            }
        }
        Err(LlmError::InvalidResponse(format!(
            "no mock response registered for prompt: {}…",
            request.prompt.chars().take(60).collect::<String>()
        )))
    }

    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        "mock-v1"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> StructuredRequest {
        StructuredRequest::deterministic(
            "mock-v1",
            prompt,
            "test_schema",
            serde_json::json!({"type": "object"}),
        )
    }

    #[tokio::test]
    async fn test_mock_matches_by_substring() {
        let provider = MockProvider::new().with_json("analyze", serde_json::json!({"ok": true}));

        let response = provider
            .generate_structured(&request("please analyze this"))
            .await
            .unwrap();
        assert_eq!(response.status, StructuredStatus::Completed);
        assert_eq!(provider.call_count("analyze"), 1);
    }

    #[tokio::test]
    async fn test_mock_refusal_and_incomplete() {
        let provider = MockProvider::new()
            .with_refusal("forbidden", "cannot help")
            .with_incomplete("huge", "max_output_tokens");

        let refused = provider
            .generate_structured(&request("forbidden content"))
            .await
            .unwrap();
        assert_eq!(refused.status, StructuredStatus::Refused);

        let incomplete = provider
            .generate_structured(&request("huge document"))
            .await
            .unwrap();
        assert_eq!(incomplete.status, StructuredStatus::Incomplete);
    }

    #[tokio::test]
    async fn test_mock_unmatched_prompt_errors() {
        let provider = MockProvider::new();
        let err = provider
            .generate_structured(&request("anything"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }

    #[test]
    fn test_from_env_missing_key() {
        // Neither variable set in the test environment.
        unsafe {
            std::env::remove_var(API_KEY_ENV);
            std::env::remove_var(API_KEY_ENV_FALLBACK);
        }
        assert!(OpenAiClient::from_env("gpt-4.1-mini").is_none());
    }
}
