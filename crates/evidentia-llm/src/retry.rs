//! Timeout and transient-status retry around a single structured call.

use crate::{LlmConfig, LlmError, LlmProvider, LlmResult, StructuredRequest, StructuredResponse};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Issues one structured call with a per-request timeout and retries for
/// transient outcomes (incomplete status, timeout). Refusals and schema
/// mismatches are returned immediately. The cancellation token is checked
/// before every attempt; an in-flight call is allowed to finish but its
/// result is discarded once cancellation is observed.
pub async fn call_with_retry<P: LlmProvider>(
    provider: &P,
    request: &StructuredRequest,
    config: &LlmConfig,
    cancel: &CancellationToken,
) -> LlmResult<StructuredResponse> {
    let mut backoff = config.retry_backoff;
    let mut last_transient: Option<LlmError> = None;

    for attempt in 0..=config.max_retries {
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }

        let started = std::time::Instant::now();
        let outcome = tokio::time::timeout(config.timeout, provider.generate_structured(request))
            .await
            .map_err(|_| LlmError::Timeout(config.timeout));

        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }

        match outcome {
            Ok(Ok(response)) => {
                debug!(
                    model = %provider.model_name(),
                    attempt,
                    latency_ms = started.elapsed().as_millis() as u64,
                    status = ?response.status,
                    tokens_in = response.token_usage.map(|u| u.input_tokens),
                    tokens_out = response.token_usage.map(|u| u.output_tokens),
                    "structured call finished"
                );
                if response.status == crate::StructuredStatus::Incomplete
                    && attempt < config.max_retries
                {
                    warn!(attempt, "incomplete response, retrying");
                    last_transient = Some(LlmError::Incomplete(
                        response
                            .incomplete_reason
                            .unwrap_or_else(|| "unspecified".into()),
                    ));
                } else {
                    return Ok(response);
                }
            }
            Ok(Err(err)) if err.is_transient() && attempt < config.max_retries => {
                warn!(attempt, %err, "transient failure, retrying");
                last_transient = Some(err);
            }
            Ok(Err(err)) => return Err(err),
            Err(timeout_err) => {
                if attempt < config.max_retries {
                    warn!(attempt, "request timed out, retrying");
                    last_transient = Some(timeout_err);
                } else {
                    return Err(timeout_err);
                }
            }
        }

        tokio::time::sleep(backoff).await;
        backoff *= 2;
    }

    Err(last_transient.unwrap_or_else(|| LlmError::Unavailable("retries exhausted".into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MockProvider, StructuredStatus};
    use std::time::Duration;

    fn request(prompt: &str) -> StructuredRequest {
        StructuredRequest::deterministic(
            "mock-v1",
            prompt,
            "test_schema",
            serde_json::json!({"type": "object"}),
        )
    }

    fn fast_config() -> LlmConfig {
        LlmConfig {
            timeout: Duration::from_secs(5),
            max_retries: 2,
            retry_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_completed_first_try() {
        let provider = MockProvider::new().with_json("go", serde_json::json!({"ok": true}));
        let cancel = CancellationToken::new();

        let response = call_with_retry(&provider, &request("go"), &fast_config(), &cancel)
            .await
            .unwrap();
        assert_eq!(response.status, StructuredStatus::Completed);
        assert_eq!(provider.call_count("go"), 1);
    }

    #[tokio::test]
    async fn test_incomplete_is_retried_then_surfaced() {
        let provider = MockProvider::new().with_incomplete("big", "max_output_tokens");
        let cancel = CancellationToken::new();

        let response = call_with_retry(&provider, &request("big"), &fast_config(), &cancel)
            .await
            .unwrap();
        // After the final attempt the incomplete envelope is returned for
        // the caller to translate.
        assert_eq!(response.status, StructuredStatus::Incomplete);
        assert_eq!(provider.call_count("big"), 3);
    }

    #[tokio::test]
    async fn test_refusal_is_not_retried() {
        let provider = MockProvider::new().with_refusal("bad", "cannot analyze");
        let cancel = CancellationToken::new();

        let response = call_with_retry(&provider, &request("bad"), &fast_config(), &cancel)
            .await
            .unwrap();
        assert_eq!(response.status, StructuredStatus::Refused);
        assert_eq!(provider.call_count("bad"), 1);
    }

    #[tokio::test]
    async fn test_cancellation_before_call() {
        let provider = MockProvider::new().with_json("go", serde_json::json!({}));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = call_with_retry(&provider, &request("go"), &fast_config(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Cancelled));
        assert_eq!(provider.call_count("go"), 0);
    }
}
