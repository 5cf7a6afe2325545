//! # Story Pipeline
//!
//! Generate short stories from keywords with an LLM, reliably.
//!
//! A request flows through four stages:
//!
//! 1. **[`request::validate`]**: normalize and check the caller's input.
//!    Invalid requests never reach the provider.
//! 2. **[`prompt::build`]**: render a deterministic system + user prompt that
//!    declares the structured output contract.
//! 3. **[`RetryingInvoker`]**: call the provider with a per-attempt timeout
//!    and bounded exponential backoff on transient failures.
//! 4. **[`output_parser::parse_story`]**: turn untrusted model text into a
//!    [`StoryResult`] or a `ParseFailure`.
//!
//! [`StoryPipeline`] wires the stages together; [`DependencyProbe`] reports
//! whether the provider is reachable. Failures carry a closed [`ErrorKind`]
//! and map onto a uniform [`ErrorEnvelope`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use story_pipeline::{RawGenerationRequest, ServiceConfig, StoryPipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServiceConfig::from_env()?;
//!     let pipeline = StoryPipeline::from_config(config)?;
//!
//!     let request = RawGenerationRequest {
//!         keywords: vec!["dragon".into(), "lighthouse".into()],
//!         genre: "fantasy".into(),
//!         tone: Some("mysterious".into()),
//!         ..Default::default()
//!     };
//!
//!     let story = pipeline
//!         .generate(&request, &story_pipeline::new_correlation_id(), None)
//!         .await?;
//!     println!("{}\n\n{}", story.title, story.content);
//!     Ok(())
//! }
//! ```
//!
//! ## Testing without a provider
//!
//! ```
//! use std::sync::Arc;
//! use story_pipeline::{MockBackend, RawGenerationRequest, ServiceConfig, StoryPipeline};
//!
//! # tokio_test::block_on(async {
//! let mock = Arc::new(MockBackend::fixed(
//!     r#"{"title": "Tide", "content": "The sea rose.", "keywords_used": ["sea"]}"#,
//! ));
//! let pipeline = StoryPipeline::new(mock.clone(), ServiceConfig::default());
//! let request = RawGenerationRequest {
//!     keywords: vec!["sea".into()],
//!     genre: "drama".into(),
//!     ..Default::default()
//! };
//! let story = pipeline.generate(&request, "doc", None).await.unwrap();
//! assert_eq!(story.title, "Tide");
//! assert_eq!(mock.calls(), 1);
//! # });
//! ```

pub mod backend;
pub mod config;
pub mod envelope;
pub mod error;
pub mod invoker;
pub mod logging;
pub mod output_parser;
pub mod pipeline;
pub mod probe;
pub mod prompt;
pub mod request;

pub use backend::{Backend, BackoffConfig, JitterStrategy, MockBackend, OpenAiBackend};
pub use config::{Environment, LlmConfig, ProviderConfig, ServiceConfig};
pub use envelope::{ErrorBody, ErrorEnvelope};
pub use error::{ErrorKind, PipelineError, ProviderError, Result};
pub use invoker::{RawModelResponse, RecordingSleeper, RetryingInvoker, Sleeper, TokioSleeper};
pub use logging::{init_logging, LoggingConfig};
pub use output_parser::{ParserOptions, StoryResult};
pub use pipeline::{new_correlation_id, StoryPipeline};
pub use probe::{DependencyProbe, HealthCheck, HealthStatus, ReadinessReport};
pub use prompt::{OutputContract, RenderedPrompt};
pub use request::{GenerationRequest, RawGenerationRequest, Tone};
