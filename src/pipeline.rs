//! Story generation pipeline.
//!
//! [`StoryPipeline`] runs one request through four steps:
//!
//! ```text
//! RawGenerationRequest
//!   │ request::validate       ── Validation error, provider never called
//!   ▼
//! GenerationRequest
//!   │ prompt::build           ── pure, deterministic
//!   ▼
//! RenderedPrompt
//!   │ RetryingInvoker::invoke ── Transient / Permanent
//!   ▼
//! RawModelResponse
//!   │ output_parser::parse_story ── ParseFailure
//!   ▼
//! StoryResult
//! ```
//!
//! The pipeline holds no per-request state, so one instance can serve
//! concurrent requests.

use crate::backend::{Backend, OpenAiBackend};
use crate::config::{Environment, ServiceConfig};
use crate::envelope::ErrorEnvelope;
use crate::error::{PipelineError, Result};
use crate::invoker::{RetryingInvoker, Sleeper};
use crate::output_parser::{parse_story, ParserOptions, StoryResult};
use crate::probe::{readiness, DependencyProbe, HealthCheck, ReadinessReport};
use crate::prompt;
use crate::request::{self, RawGenerationRequest};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

/// Fresh correlation id for callers that do not supply one.
pub fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// End-to-end story generation.
#[derive(Debug, Clone)]
pub struct StoryPipeline {
    invoker: RetryingInvoker,
    probe: DependencyProbe,
    parser: ParserOptions,
    config: ServiceConfig,
}

impl StoryPipeline {
    /// Build a pipeline around any backend.
    pub fn new(backend: Arc<dyn Backend>, config: ServiceConfig) -> Self {
        let invoker = RetryingInvoker::new(backend.clone(), &config.provider, config.backoff.clone());
        let probe = DependencyProbe::new(backend, config.provider.probe_timeout);
        Self {
            invoker,
            probe,
            parser: ParserOptions::default(),
            config,
        }
    }

    /// Build a pipeline talking to the configured OpenAI-compatible provider.
    pub fn from_config(config: ServiceConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .connect_timeout(config.provider.probe_timeout)
            .build()
            .map_err(|e| PipelineError::InvalidConfig(format!("HTTP client: {}", e)))?;

        let mut backend = OpenAiBackend::new(client, config.provider.base_url.clone());
        if let Some(key) = &config.provider.api_key {
            backend = backend.with_api_key(key.clone());
        }

        Ok(Self::new(Arc::new(backend), config))
    }

    /// Replace the sleep capability used between retries.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.invoker = self.invoker.with_sleeper(sleeper);
        self
    }

    pub fn with_parser_options(mut self, options: ParserOptions) -> Self {
        self.parser = options;
        self
    }

    pub fn environment(&self) -> Environment {
        self.config.environment
    }

    /// Generate a story. `deadline` bounds the whole invocation, retries
    /// included.
    pub async fn generate(
        &self,
        raw: &RawGenerationRequest,
        correlation_id: &str,
        deadline: Option<Instant>,
    ) -> Result<StoryResult> {
        let span = info_span!("generate", correlation_id = %correlation_id);
        self.run(raw, deadline).instrument(span).await
    }

    async fn run(&self, raw: &RawGenerationRequest, deadline: Option<Instant>) -> Result<StoryResult> {
        let request = request::validate(raw).inspect_err(|e| {
            warn!(kind = %e.kind(), error = %e, "story_generation_failed");
        })?;

        info!(
            keywords = request.keywords().len(),
            genre = request.genre(),
            tone = %request.tone(),
            max_length = request.max_length(),
            "story_generation_requested"
        );

        let prompt = prompt::build(&request);
        let started = Instant::now();

        let outcome = match self.invoker.invoke_until(&prompt, deadline).await {
            Ok(response) => parse_story(&response, self.parser).map(|story| (story, response)),
            Err(e) => Err(e),
        };

        match outcome {
            Ok((story, response)) => {
                info!(
                    attempts = response.attempts,
                    latency_ms = started.elapsed().as_millis() as u64,
                    backoff_ms = response.backoff_total.as_millis() as u64,
                    title = %story.title,
                    words = story.content.split_whitespace().count(),
                    "ai_story_generated"
                );
                Ok(story)
            }
            Err(e) => {
                error!(
                    kind = %e.kind(),
                    error = %e,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "story_generation_failed"
                );
                Err(e)
            }
        }
    }

    /// Generate and map any failure to an [`ErrorEnvelope`].
    pub async fn handle(
        &self,
        raw: &RawGenerationRequest,
        correlation_id: &str,
        deadline: Option<Instant>,
    ) -> std::result::Result<StoryResult, ErrorEnvelope> {
        self.generate(raw, correlation_id, deadline)
            .await
            .map_err(|e| ErrorEnvelope::from_error(&e, correlation_id, self.config.environment))
    }

    /// Probe the provider and report readiness.
    pub async fn readiness(&self) -> ReadinessReport {
        readiness(&self.probe, &self.config).await
    }

    pub fn health(&self) -> HealthCheck {
        HealthCheck::ok()
    }
}
