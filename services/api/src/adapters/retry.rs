//! services/api/src/adapters/retry.rs
//!
//! Bounded retry with exponential backoff around any content generator.

use async_trait::async_trait;
use english_coach_core::ports::{ContentGenerationService, GenerationError, GenerationResult};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    /// Wait before the first retry. Doubles on each subsequent retry.
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

/// Retries transient failures (rate limits, network errors) of the inner
/// generator. Fatal failures are returned after the first attempt.
pub struct RetryingGenerator<G> {
    inner: G,
    policy: RetryPolicy,
}

impl<G> RetryingGenerator<G> {
    pub fn new(inner: G, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<G: ContentGenerationService> ContentGenerationService for RetryingGenerator<G> {
    async fn generate(&self, prompt: &str, json_mode: bool) -> GenerationResult<String> {
        let mut backoff = self.policy.initial_backoff;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.inner.generate(prompt, json_mode).await {
                Ok(text) => return Ok(text),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt > self.policy.max_retries => {
                    return Err(GenerationError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    })
                }
                Err(e) => {
                    warn!(
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Generation failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replays scripted outcomes; once the script runs out it repeats the last one.
    struct Scripted {
        outcomes: Mutex<Vec<GenerationResult<String>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(mut outcomes: Vec<GenerationResult<String>>) -> Self {
            outcomes.reverse();
            Self {
                outcomes: Mutex::new(outcomes),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ContentGenerationService for Scripted {
        async fn generate(&self, _prompt: &str, _json_mode: bool) -> GenerationResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.len() > 1 {
                outcomes.pop().unwrap()
            } else {
                outcomes[0].clone()
            }
        }
    }

    fn instant() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            initial_backoff: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn persistent_rate_limit_makes_exactly_three_attempts() {
        let generator = RetryingGenerator::new(
            Scripted::new(vec![Err(GenerationError::RateLimited("429".into()))]),
            instant(),
        );
        let err = generator.generate("p", false).await.unwrap_err();
        assert_eq!(generator.inner.calls.load(Ordering::SeqCst), 3);
        match err {
            GenerationError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, GenerationError::RateLimited(_)));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn insufficient_credits_is_not_retried() {
        let generator = RetryingGenerator::new(
            Scripted::new(vec![Err(GenerationError::InsufficientCredits("402".into()))]),
            instant(),
        );
        let err = generator.generate("p", false).await.unwrap_err();
        assert_eq!(generator.inner.calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, GenerationError::InsufficientCredits(_)));
    }

    #[tokio::test]
    async fn transient_failure_then_success_returns_text() {
        let generator = RetryingGenerator::new(
            Scripted::new(vec![
                Err(GenerationError::Network("reset".into())),
                Ok("hello".to_string()),
            ]),
            instant(),
        );
        assert_eq!(generator.generate("p", false).await.unwrap(), "hello");
        assert_eq!(generator.inner.calls.load(Ordering::SeqCst), 2);
    }
}
