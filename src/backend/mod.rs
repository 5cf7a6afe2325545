//! Provider trait and normalized request/response types.
//!
//! The [`Backend`] trait is the single seam between the pipeline and an LLM
//! provider. Production uses [`OpenAiBackend`]; tests use [`MockBackend`].
//!
//! ```text
//! RenderedPrompt ──► LlmRequest ──► Backend::complete() ──► LlmResponse
//!                                          │
//!                               ┌──────────┴──────────┐
//!                          OpenAiBackend          MockBackend
//!                      /v1/chat/completions     scripted outcomes
//! ```

pub mod backoff;
pub mod mock;
pub mod openai;

pub use backoff::{BackoffConfig, JitterStrategy};
pub use mock::MockBackend;
pub use openai::OpenAiBackend;

use crate::config::LlmConfig;
use crate::error::ProviderError;
use crate::prompt::RenderedPrompt;
use async_trait::async_trait;

/// A provider-agnostic completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    /// Model identifier (e.g. `"gpt-4o"`).
    pub model: String,

    /// System instruction, including the output contract.
    pub system_prompt: String,

    /// The user instruction.
    pub prompt: String,

    /// Sampling configuration.
    pub config: LlmConfig,
}

impl LlmRequest {
    /// Build a request from a rendered prompt.
    pub fn from_prompt(prompt: &RenderedPrompt, model: impl Into<String>, config: LlmConfig) -> Self {
        Self {
            model: model.into(),
            system_prompt: prompt.system().to_string(),
            prompt: prompt.user().to_string(),
            config,
        }
    }
}

/// A normalized provider response.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// The generated text content.
    pub text: String,

    /// HTTP status code (for diagnostics/logging).
    pub status: u16,

    /// Provider-specific metadata (token usage, model, id).
    pub metadata: Option<serde_json::Value>,
}

/// Abstraction over LLM providers.
///
/// Implementations report failures as [`ProviderError`]; classification into
/// transient or permanent happens in [`ProviderError::classify`], never here.
///
/// This trait is object-safe and designed to be used as `Arc<dyn Backend>`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Run one completion.
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError>;

    /// One cheap, side-effect-free call proving the provider is reachable
    /// with the configured credentials.
    async fn probe(&self) -> Result<(), ProviderError>;

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &'static str;

    /// Whether the backend holds the credential it needs.
    fn is_configured(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{validate, RawGenerationRequest};

    #[test]
    fn test_request_from_prompt() {
        let req = validate(&RawGenerationRequest {
            keywords: vec!["owl".into()],
            genre: "fable".into(),
            ..Default::default()
        })
        .unwrap();
        let prompt = crate::prompt::build(&req);
        let llm = LlmRequest::from_prompt(&prompt, "gpt-4o", LlmConfig::default());
        assert_eq!(llm.model, "gpt-4o");
        assert_eq!(llm.system_prompt, prompt.system());
        assert_eq!(llm.prompt, prompt.user());
    }
}
