//! Retry wrapper for rate-limit and transient failures — §6: "Rate-limit
//! (429) and 5xx responses retry with linear backoff."

use async_trait::async_trait;
use tracing::{info, warn};

use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError};

/// Wraps any [`LlmProvider`] with linear-backoff retry on rate limits and
/// server errors. Does not fail over to a different provider — each model
/// role has exactly one backing provider.
pub struct RetryingProvider<P: LlmProvider> {
    inner: P,
    max_retries: u32,
    backoff_base_secs: f64,
}

impl<P: LlmProvider> RetryingProvider<P> {
    pub fn new(inner: P, max_retries: u32, backoff_base_secs: f64) -> Self {
        Self {
            inner,
            max_retries,
            backoff_base_secs,
        }
    }
}

#[async_trait]
impl<P: LlmProvider> LlmProvider for RetryingProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let mut last_err: Option<ProviderError> = None;

        for attempt in 0..=self.max_retries {
            match self.inner.send(req).await {
                Ok(resp) => {
                    if attempt > 0 {
                        info!(provider = self.inner.name(), attempt, "request succeeded after retry");
                    }
                    return Ok(resp);
                }
                Err(e) if is_retriable(&e) => {
                    warn!(provider = self.inner.name(), attempt, err = %e, "provider send failed, retrying");
                    if attempt < self.max_retries {
                        let delay = retry_delay_secs(&e, self.backoff_base_secs, attempt);
                        tokio::time::sleep(std::time::Duration::from_secs_f64(delay)).await;
                    }
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| ProviderError::Unavailable("retries exhausted".to_string())))
    }
}

fn is_retriable(err: &ProviderError) -> bool {
    match err {
        ProviderError::RateLimited { .. } | ProviderError::Http(_) => true,
        ProviderError::Api { status, .. } => *status >= 500,
        _ => false,
    }
}

/// Linear backoff: `base * (attempt + 1)`, honoring a rate-limit's
/// `retry_after_ms` when present.
fn retry_delay_secs(err: &ProviderError, base_secs: f64, attempt: u32) -> f64 {
    if let ProviderError::RateLimited { retry_after_ms } = err {
        return (*retry_after_ms as f64 / 1000.0).max(base_secs);
    }
    base_secs * (attempt as f64 + 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyThenOk {
        calls: AtomicU32,
        fail_times: u32,
    }

    #[async_trait]
    impl LlmProvider for FlakyThenOk {
        fn name(&self) -> &str {
            "flaky"
        }
        async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                return Err(ProviderError::Api {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            Ok(ChatResponse {
                content: "ok".to_string(),
                model: req.model.clone(),
                tokens_in: 1,
                tokens_out: 1,
                stop_reason: "stop".to_string(),
                tool_calls: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let provider = RetryingProvider::new(
            FlakyThenOk { calls: AtomicU32::new(0), fail_times: 2 },
            3,
            0.01,
        );
        let req = ChatRequest::new("test-model", "system", 64);
        let resp = provider.send(&req).await.unwrap();
        assert_eq!(resp.content, "ok");
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let provider = RetryingProvider::new(
            FlakyThenOk { calls: AtomicU32::new(0), fail_times: 10 },
            2,
            0.01,
        );
        let req = ChatRequest::new("test-model", "system", 64);
        assert!(provider.send(&req).await.is_err());
    }
}
