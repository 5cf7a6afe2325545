//! Mock backend for testing without a live provider.
//!
//! [`MockBackend`] plays back a script of outcomes (text or
//! [`ProviderError`]) and counts calls, so retry behaviour can be asserted
//! exactly.
//!
//! # Example
//!
//! ```
//! use story_pipeline::backend::MockBackend;
//! use story_pipeline::error::ProviderError;
//!
//! let mock = MockBackend::script(vec![
//!     Err(ProviderError::Transport("reset".into())),
//!     Ok(r#"{"title": "T", "content": "C", "keywords_used": []}"#.into()),
//! ]);
//! assert_eq!(mock.calls(), 0);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{Backend, LlmRequest, LlmResponse};
use crate::error::ProviderError;

type Outcome = Result<String, ProviderError>;

/// A test backend that returns scripted outcomes in order.
///
/// Once the script is exhausted the last outcome repeats.
#[derive(Debug)]
pub struct MockBackend {
    script: Vec<Outcome>,
    index: AtomicUsize,
    probes: AtomicUsize,
    latency: Option<Duration>,
    probe_outcome: Result<(), ProviderError>,
}

impl MockBackend {
    /// Create a mock that plays back `script`.
    pub fn script(script: Vec<Outcome>) -> Self {
        assert!(!script.is_empty(), "MockBackend requires at least one outcome");
        Self {
            script,
            index: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            latency: None,
            probe_outcome: Ok(()),
        }
    }

    /// Create a mock that always returns the same text.
    pub fn fixed(response: impl Into<String>) -> Self {
        Self::script(vec![Ok(response.into())])
    }

    /// Create a mock that always fails with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self::script(vec![Err(error)])
    }

    /// Delay every call (completion and probe) by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Set what [`Backend::probe`] returns.
    pub fn with_probe_outcome(mut self, outcome: Result<(), ProviderError>) -> Self {
        self.probe_outcome = outcome;
        self
    }

    /// Number of completion calls received so far.
    pub fn calls(&self) -> usize {
        self.index.load(Ordering::SeqCst)
    }

    /// Number of probe calls received so far.
    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> Outcome {
        let idx = self.index.fetch_add(1, Ordering::SeqCst);
        self.script[idx.min(self.script.len() - 1)].clone()
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn complete(&self, _request: &LlmRequest) -> Result<LlmResponse, ProviderError> {
        let outcome = self.next_outcome();
        self.simulate_latency().await;
        outcome.map(|text| LlmResponse {
            text,
            status: 200,
            metadata: None,
        })
    }

    async fn probe(&self) -> Result<(), ProviderError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.probe_outcome.clone()
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
