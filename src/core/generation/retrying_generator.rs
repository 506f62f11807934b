// Retry wrapper around the generative endpoint.
//
// One logical request is in flight at a time. Rate limiting between rows is
// the caller's job (see the inter-call delay in the reconciler); the backoff
// here only spaces out attempts of the same request.

use super::generation_models::{GenerationConfig, GenerationRequest, RemoteResponse};
use crate::core::pipeline::PipelineError;
use async_trait::async_trait;
use std::error::Error;
use std::time::Duration;

/// Status codes worth another attempt: rate limited, or the server is struggling.
pub const RETRYABLE_STATUSES: [u16; 3] = [429, 500, 503];

pub fn is_retryable(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

/// Performs exactly one attempt against the endpoint.
///
/// Implementations report every HTTP response as `Ok`, including error
/// statuses. `Err` is reserved for transport failures with no response at all.
#[async_trait]
pub trait GenerationTransport: Send + Sync {
    async fn send(
        &self,
        request: &GenerationRequest,
    ) -> Result<RemoteResponse, Box<dyn Error + Send + Sync>>;
}

#[async_trait]
impl GenerationTransport for Box<dyn GenerationTransport> {
    async fn send(
        &self,
        request: &GenerationRequest,
    ) -> Result<RemoteResponse, Box<dyn Error + Send + Sync>> {
        (**self).send(request).await
    }
}

/// What the pipeline stages call: prompt in, generated text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, PipelineError>;
}

/// Linear backoff: attempt `n` is followed by a wait of `base_delay * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(2000))
    }
}

pub struct RetryingGenerator<T: GenerationTransport> {
    transport: T,
    policy: RetryPolicy,
    config: GenerationConfig,
}

impl<T: GenerationTransport> RetryingGenerator<T> {
    pub fn new(transport: T, policy: RetryPolicy, config: GenerationConfig) -> Self {
        Self {
            transport,
            policy,
            config,
        }
    }

    /// Sends the request, retrying transient failures.
    ///
    /// A response that carries a usable payload wins even when its status is
    /// one of the retryable ones. A 200 without a payload is an error, not a
    /// reason to retry.
    pub async fn call(&self, request: &GenerationRequest) -> Result<String, PipelineError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let failure = match self.transport.send(request).await {
                Ok(response) => {
                    let status = response.status;
                    if let Some(text) = usable_payload(&response) {
                        if attempt > 1 {
                            tracing::info!(attempt, status, "Generation succeeded after retry");
                        }
                        return Ok(text);
                    }

                    if !is_retryable(status) {
                        return Err(PipelineError::RemoteCallFailed {
                            status: Some(status),
                            attempts: attempt,
                            body: response.body,
                        });
                    }

                    PipelineError::RemoteCallFailed {
                        status: Some(status),
                        attempts: attempt,
                        body: response.body,
                    }
                }
                Err(e) => PipelineError::RemoteCallFailed {
                    status: None,
                    attempts: attempt,
                    body: e.to_string(),
                },
            };

            if attempt >= max_attempts {
                return Err(failure);
            }

            let delay = self.policy.delay_after(attempt);
            tracing::warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Transient generation failure, retrying: {}",
                failure
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

fn usable_payload(response: &RemoteResponse) -> Option<String> {
    if response.status != 200 && !is_retryable(response.status) {
        return None;
    }
    response
        .text
        .as_ref()
        .filter(|text| !text.trim().is_empty())
        .cloned()
}

#[async_trait]
impl<T: GenerationTransport> TextGenerator for RetryingGenerator<T> {
    async fn generate(&self, prompt: &str) -> Result<String, PipelineError> {
        let request = GenerationRequest {
            prompt: prompt.to_string(),
            config: self.config.clone(),
        };
        self.call(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Replays canned responses and records when each attempt happened.
    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<RemoteResponse, String>>>,
        attempts: Mutex<Vec<Instant>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<RemoteResponse, String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                attempts: Mutex::new(Vec::new()),
            }
        }

        fn attempt_count(&self) -> usize {
            self.attempts.lock().unwrap().len()
        }

        fn gaps(&self) -> Vec<Duration> {
            let attempts = self.attempts.lock().unwrap();
            attempts.windows(2).map(|w| w[1] - w[0]).collect()
        }
    }

    #[async_trait]
    impl GenerationTransport for ScriptedTransport {
        async fn send(
            &self,
            _request: &GenerationRequest,
        ) -> Result<RemoteResponse, Box<dyn Error + Send + Sync>> {
            self.attempts.lock().unwrap().push(Instant::now());
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("transport called more often than scripted");
            next.map_err(|e| e.into())
        }
    }

    fn generator(responses: Vec<Result<RemoteResponse, String>>) -> RetryingGenerator<ScriptedTransport> {
        RetryingGenerator::new(
            ScriptedTransport::new(responses),
            RetryPolicy::new(3, Duration::from_millis(2000)),
            GenerationConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_from_transient_failures_with_growing_delays() {
        let generator = generator(vec![
            Ok(RemoteResponse::status(503, "unavailable")),
            Ok(RemoteResponse::status(503, "unavailable")),
            Ok(RemoteResponse::ok("notes")),
        ]);

        let text = generator.generate("prompt").await.unwrap();

        assert_eq!(text, "notes");
        assert_eq!(generator.transport.attempt_count(), 3);
        let gaps = generator.transport.gaps();
        assert!(gaps[0] >= Duration::from_millis(2000));
        assert!(gaps[1] >= Duration::from_millis(4000));
        assert!(gaps[1] > gaps[0]);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let generator = generator(vec![
            Ok(RemoteResponse::status(429, "slow down")),
            Ok(RemoteResponse::status(429, "slow down")),
            Ok(RemoteResponse::status(429, "slow down")),
        ]);

        let err = generator.generate("prompt").await.unwrap_err();

        assert_eq!(
            err,
            PipelineError::RemoteCallFailed {
                status: Some(429),
                attempts: 3,
                body: "slow down".to_string(),
            }
        );
        assert_eq!(generator.transport.attempt_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_status_fails_immediately() {
        let generator = generator(vec![Ok(RemoteResponse::status(400, "bad request"))]);

        let err = generator.generate("prompt").await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::RemoteCallFailed {
                status: Some(400),
                attempts: 1,
                ..
            }
        ));
        assert_eq!(generator.transport.attempt_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ok_without_payload_is_surfaced_not_retried() {
        let generator = generator(vec![Ok(RemoteResponse::status(200, "{\"candidates\":[]}"))]);

        let err = generator.generate("prompt").await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::RemoteCallFailed {
                status: Some(200),
                attempts: 1,
                ..
            }
        ));
        assert_eq!(generator.transport.attempt_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_status_with_payload_is_accepted() {
        let generator = generator(vec![Ok(RemoteResponse {
            status: 503,
            text: Some("late but fine".to_string()),
            body: String::new(),
        })]);

        let text = generator.generate("prompt").await.unwrap();

        assert_eq!(text, "late but fine");
        assert_eq!(generator.transport.attempt_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_are_retried() {
        let generator = generator(vec![
            Err("connection reset".to_string()),
            Ok(RemoteResponse::ok("done")),
        ]);

        assert_eq!(generator.generate("prompt").await.unwrap(), "done");
        assert_eq!(generator.transport.attempt_count(), 2);
    }

    #[test]
    fn policy_never_allows_zero_attempts() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1));
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.delay_after(3), Duration::from_secs(3));
    }
}
