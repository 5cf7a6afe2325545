//! Bounded retry around provider calls.
//!
//! [`RetryingInvoker`] calls the [`Backend`] with a per-attempt timeout,
//! classifies failures via [`ProviderError::classify`], and backs off
//! between transient failures using an injectable [`Sleeper`]. All retry
//! bookkeeping lives in a [`RetryState`] owned by a single invocation.

use crate::backend::{Backend, BackoffConfig, LlmRequest};
use crate::config::{LlmConfig, ProviderConfig};
use crate::error::{ErrorKind, PipelineError, ProviderError, Result, Retryability};
use crate::prompt::RenderedPrompt;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Capability to wait between attempts without blocking other requests.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real timer-backed sleeper.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sleeper that returns immediately and records every requested delay.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far, in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(duration);
        }
        tokio::task::yield_now().await;
    }
}

/// Per-invocation retry bookkeeping. Never shared between requests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryState {
    /// Provider calls made so far.
    pub attempt: u32,
    /// Classification of the most recent failure.
    pub last_error: Option<ErrorKind>,
    /// Delay chosen after the most recent failure.
    pub last_delay: Option<Duration>,
    /// Sum of all delays.
    pub backoff_total: Duration,
}

impl RetryState {
    fn record_retry(&mut self, delay: Duration) {
        self.last_error = Some(ErrorKind::Transient);
        self.last_delay = Some(delay);
        self.backoff_total += delay;
    }
}

/// Successful provider output plus timing.
#[derive(Debug, Clone)]
pub struct RawModelResponse {
    /// The model's text, untouched.
    pub text: String,
    /// Latency of the successful call.
    pub latency: Duration,
    /// Calls made, including the successful one.
    pub attempts: u32,
    /// Total time spent waiting between attempts.
    pub backoff_total: Duration,
    /// Provider metadata (usage, model id).
    pub metadata: Option<serde_json::Value>,
}

/// Calls the provider with bounded exponential backoff.
#[derive(Clone)]
pub struct RetryingInvoker {
    backend: Arc<dyn Backend>,
    model: String,
    llm: LlmConfig,
    call_timeout: Duration,
    backoff: BackoffConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for RetryingInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingInvoker")
            .field("backend", &self.backend.name())
            .field("model", &self.model)
            .field("call_timeout", &self.call_timeout)
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl RetryingInvoker {
    pub fn new(backend: Arc<dyn Backend>, provider: &ProviderConfig, backoff: BackoffConfig) -> Self {
        Self {
            backend,
            model: provider.model.clone(),
            llm: provider.llm.clone(),
            call_timeout: provider.call_timeout,
            backoff,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replace the sleep capability (tests pass a [`RecordingSleeper`]).
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn backoff(&self) -> &BackoffConfig {
        &self.backoff
    }

    /// Invoke without an overall deadline.
    pub async fn invoke(&self, prompt: &RenderedPrompt) -> Result<RawModelResponse> {
        self.invoke_until(prompt, None).await
    }

    /// Invoke, abandoning further attempts once `deadline` passes.
    ///
    /// Hitting the deadline yields a `Transient` timeout rather than waiting.
    pub async fn invoke_until(
        &self,
        prompt: &RenderedPrompt,
        deadline: Option<Instant>,
    ) -> Result<RawModelResponse> {
        let request = LlmRequest::from_prompt(prompt, self.model.clone(), self.llm.clone());
        let mut state = RetryState::default();
        let started = Instant::now();

        let outcome = match deadline {
            Some(at) => tokio::time::timeout_at(at, self.run(&request, &mut state, deadline))
                .await
                .ok(),
            None => Some(self.run(&request, &mut state, None).await),
        };

        outcome.unwrap_or_else(|| {
            warn!(
                attempts = state.attempt,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "request_deadline_exceeded"
            );
            Err(PipelineError::Transient {
                attempts: state.attempt,
                source: ProviderError::Timeout(started.elapsed()),
            })
        })
    }

    async fn run(
        &self,
        request: &LlmRequest,
        state: &mut RetryState,
        deadline: Option<Instant>,
    ) -> Result<RawModelResponse> {
        let max_attempts = self.backoff.max_attempts.max(1);

        loop {
            state.attempt += 1;
            let call_started = Instant::now();
            let result = tokio::time::timeout(self.call_timeout, self.backend.complete(request))
                .await
                .unwrap_or(Err(ProviderError::Timeout(self.call_timeout)));

            let err = match result {
                Ok(resp) => {
                    let latency = call_started.elapsed();
                    debug!(
                        backend = self.backend.name(),
                        attempt = state.attempt,
                        latency_ms = latency.as_millis() as u64,
                        "provider_call_succeeded"
                    );
                    return Ok(RawModelResponse {
                        text: resp.text,
                        latency,
                        attempts: state.attempt,
                        backoff_total: state.backoff_total,
                        metadata: resp.metadata,
                    });
                }
                Err(err) => err,
            };

            if err.classify() == Retryability::Permanent {
                state.last_error = Some(ErrorKind::Permanent);
                warn!(
                    backend = self.backend.name(),
                    attempt = state.attempt,
                    error = %err,
                    "provider_rejected_request"
                );
                return Err(PipelineError::Permanent { source: err });
            }

            if state.attempt >= max_attempts {
                state.last_error = Some(ErrorKind::Transient);
                warn!(
                    backend = self.backend.name(),
                    attempts = state.attempt,
                    error = %err,
                    "provider_retries_exhausted"
                );
                return Err(PipelineError::Transient {
                    attempts: state.attempt,
                    source: err,
                });
            }

            let delay = self
                .backoff
                .delay_with_hint(state.attempt - 1, err.retry_after());

            if let Some(at) = deadline {
                if Instant::now() + delay >= at {
                    warn!(
                        attempts = state.attempt,
                        wait_seconds = delay.as_secs_f64(),
                        "retry_would_exceed_deadline"
                    );
                    return Err(PipelineError::Transient {
                        attempts: state.attempt,
                        source: err,
                    });
                }
            }

            warn!(
                attempt = state.attempt,
                wait_seconds = delay.as_secs_f64(),
                error = %err,
                "retrying_ai_request"
            );
            state.record_retry(delay);
            self.sleeper.sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{JitterStrategy, MockBackend};
    use crate::request::{validate, RawGenerationRequest};

    fn prompt() -> RenderedPrompt {
        crate::prompt::build(
            &validate(&RawGenerationRequest {
                keywords: vec!["dragon".into()],
                genre: "fantasy".into(),
                ..Default::default()
            })
            .unwrap(),
        )
    }

    fn unavailable() -> ProviderError {
        ProviderError::Http {
            status: 503,
            body: "overloaded".into(),
            retry_after: None,
        }
    }

    fn invoker(
        mock: &Arc<MockBackend>,
        provider: ProviderConfig,
        backoff: BackoffConfig,
    ) -> (RetryingInvoker, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::new());
        let backend: Arc<dyn Backend> = mock.clone();
        let invoker = RetryingInvoker::new(backend, &provider, backoff).with_sleeper(sleeper.clone());
        (invoker, sleeper)
    }

    #[tokio::test]
    async fn test_two_transient_failures_then_success() {
        let mock = Arc::new(MockBackend::script(vec![
            Err(unavailable()),
            Err(ProviderError::Timeout(Duration::from_secs(30))),
            Ok("story".into()),
        ]));
        let (invoker, sleeper) =
            invoker(&mock, ProviderConfig::default(), BackoffConfig::standard());

        let resp = invoker.invoke(&prompt()).await.unwrap();
        assert_eq!(resp.text, "story");
        assert_eq!(resp.attempts, 3);
        assert_eq!(mock.calls(), 3);

        let delays = sleeper.delays();
        assert_eq!(delays.len(), 2);
        for d in &delays {
            assert!(*d >= invoker.backoff().min_delay, "{d:?}");
        }
        assert_eq!(resp.backoff_total, delays.iter().sum::<Duration>());
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let mock = Arc::new(MockBackend::failing(ProviderError::Http {
            status: 401,
            body: "invalid api key".into(),
            retry_after: None,
        }));
        let (invoker, sleeper) =
            invoker(&mock, ProviderConfig::default(), BackoffConfig::standard());

        let err = invoker.invoke(&prompt()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permanent);
        match err {
            PipelineError::Permanent { source } => assert!(matches!(
                source,
                ProviderError::Http { status: 401, .. }
            )),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(mock.calls(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_transient_exhaustion_after_max_attempts() {
        let mock = Arc::new(MockBackend::failing(unavailable()));
        let (invoker, sleeper) =
            invoker(&mock, ProviderConfig::default(), BackoffConfig::standard());

        let err = invoker.invoke(&prompt()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(matches!(err, PipelineError::Transient { attempts: 3, .. }));
        assert_eq!(mock.calls(), 3);
        assert_eq!(sleeper.delays().len(), 2);
    }

    #[tokio::test]
    async fn test_exponential_delays_without_jitter() {
        let mock = Arc::new(MockBackend::failing(unavailable()));
        let backoff = BackoffConfig {
            max_attempts: 5,
            jitter: JitterStrategy::None,
            ..BackoffConfig::standard()
        };
        let (invoker, sleeper) = invoker(&mock, ProviderConfig::default(), backoff);

        invoker.invoke(&prompt()).await.unwrap_err();
        assert_eq!(
            sleeper.delays(),
            vec![
                Duration::from_secs(2),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
            ]
        );
    }

    #[tokio::test]
    async fn test_retry_after_hint_used() {
        let mock = Arc::new(MockBackend::script(vec![
            Err(ProviderError::Http {
                status: 429,
                body: "slow down".into(),
                retry_after: Some(Duration::from_secs(7)),
            }),
            Ok("ok".into()),
        ]));
        let (invoker, sleeper) =
            invoker(&mock, ProviderConfig::default(), BackoffConfig::standard());

        invoker.invoke(&prompt()).await.unwrap();
        assert_eq!(sleeper.delays(), vec![Duration::from_secs(7)]);
    }

    #[tokio::test]
    async fn test_per_attempt_timeout_is_transient() {
        let mock = Arc::new(MockBackend::fixed("late").with_latency(Duration::from_secs(3600)));
        let provider = ProviderConfig {
            call_timeout: Duration::from_millis(20),
            ..ProviderConfig::default()
        };
        let backoff = BackoffConfig {
            max_attempts: 2,
            ..BackoffConfig::standard()
        };
        let (invoker, _sleeper) = invoker(&mock, provider, backoff);

        let err = invoker.invoke(&prompt()).await.unwrap_err();
        match err {
            PipelineError::Transient { attempts, source } => {
                assert_eq!(attempts, 2);
                assert_eq!(source, ProviderError::Timeout(Duration::from_millis(20)));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_overall_deadline_abandons_request() {
        let mock = Arc::new(MockBackend::fixed("late").with_latency(Duration::from_secs(3600)));
        let (invoker, _sleeper) =
            invoker(&mock, ProviderConfig::default(), BackoffConfig::standard());

        let deadline = Instant::now() + Duration::from_millis(50);
        let started = Instant::now();
        let err = invoker.invoke_until(&prompt(), Some(deadline)).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_deadline_shorter_than_backoff_stops_retrying() {
        let mock = Arc::new(MockBackend::failing(unavailable()));
        let (invoker, sleeper) =
            invoker(&mock, ProviderConfig::default(), BackoffConfig::standard());

        let deadline = Instant::now() + Duration::from_secs(1);
        let err = invoker.invoke_until(&prompt(), Some(deadline)).await.unwrap_err();

        assert!(matches!(err, PipelineError::Transient { attempts: 1, .. }));
        assert!(sleeper.delays().is_empty());
    }
}
