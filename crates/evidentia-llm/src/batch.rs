//! Bounded-concurrency batch processing of structured calls.

use crate::{LlmConfig, LlmError, LlmProvider, LlmResult, StructuredRequest, StructuredResponse};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Configuration for batch calls.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Maximum in-flight LLM calls; suggested range 1–10.
    pub max_concurrent: usize,
    pub llm: LlmConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            llm: LlmConfig::default(),
        }
    }
}

impl BatchConfig {
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }
}

/// Runs every request with at most `max_concurrent` in flight, returning
/// results in input order. Cancellation stops unstarted requests; they
/// resolve to [`LlmError::Cancelled`].
pub async fn batch_structured<P: LlmProvider>(
    provider: &P,
    requests: Vec<StructuredRequest>,
    config: &BatchConfig,
    cancel: &CancellationToken,
) -> Vec<LlmResult<StructuredResponse>> {
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent));

    let mut indexed: Vec<(usize, LlmResult<StructuredResponse>)> =
        stream::iter(requests.into_iter().enumerate())
            .map(|(index, request)| {
                let semaphore = Arc::clone(&semaphore);
                let cancel = cancel.clone();
                let llm = config.llm.clone();
                async move {
                    let _permit = semaphore.acquire().await.expect("semaphore never closed");
                    if cancel.is_cancelled() {
                        return (index, Err(LlmError::Cancelled));
                    }
                    let result =
                        crate::retry::call_with_retry(provider, &request, &llm, &cancel).await;
                    (index, result)
                }
            })
            .buffer_unordered(config.max_concurrent)
            .collect()
            .await;

    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, result)| result).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MockProvider, StructuredStatus};

    fn request(prompt: &str) -> StructuredRequest {
        StructuredRequest::deterministic(
            "mock-v1",
            prompt,
            "test_schema",
            serde_json::json!({"type": "object"}),
        )
    }

    #[tokio::test]
    async fn test_batch_preserves_input_order() {
        let provider = MockProvider::new()
            .with_json("alpha", serde_json::json!({"id": 1}))
            .with_json("beta", serde_json::json!({"id": 2}))
            .with_json("gamma", serde_json::json!({"id": 3}));

        let requests = vec![request("alpha"), request("beta"), request("gamma")];
        let results = batch_structured(
            &provider,
            requests,
            &BatchConfig::default().with_max_concurrent(2),
            &CancellationToken::new(),
        )
        .await;

        let ids: Vec<i64> = results
            .into_iter()
            .map(|r| r.unwrap().parsed_output.unwrap()["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_batch_mixed_outcomes() {
        let provider = MockProvider::new()
            .with_json("good", serde_json::json!({"ok": true}))
            .with_refusal("bad", "no");

        let results = batch_structured(
            &provider,
            vec![request("good"), request("bad")],
            &BatchConfig::default(),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(
            results[0].as_ref().unwrap().status,
            StructuredStatus::Completed
        );
        assert_eq!(
            results[1].as_ref().unwrap().status,
            StructuredStatus::Refused
        );
    }

    #[tokio::test]
    async fn test_batch_cancellation_skips_unstarted() {
        let provider = MockProvider::new().with_json("x", serde_json::json!({}));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let results = batch_structured(
            &provider,
            vec![request("x"), request("x")],
            &BatchConfig::default(),
            &cancel,
        )
        .await;

        assert!(results
            .iter()
            .all(|r| matches!(r, Err(LlmError::Cancelled))));
        assert_eq!(provider.call_count("x"), 0);
    }

    #[test]
    fn test_max_concurrent_floor() {
        let config = BatchConfig::default().with_max_concurrent(0);
        assert_eq!(config.max_concurrent, 1);
    }
}
