//! Backend for OpenAI-compatible chat completion APIs.
//!
//! Endpoint: `/v1/chat/completions`, always with a system message and
//! `response_format = json_object` when JSON mode is on. Probe: `GET /v1/models`.

use super::{Backend, LlmRequest, LlmResponse};
use crate::error::ProviderError;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Backend for any OpenAI-compatible API.
///
/// # Example
///
/// ```
/// use story_pipeline::backend::OpenAiBackend;
///
/// let backend = OpenAiBackend::new(reqwest::Client::new(), "https://api.openai.com")
///     .with_api_key("sk-...");
/// assert!(backend.has_api_key());
/// ```
#[derive(Clone)]
pub struct OpenAiBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|k| redact(k)))
            .finish()
    }
}

/// Keep a short prefix for identification; hide the rest.
pub(crate) fn redact(key: &str) -> String {
    match key.char_indices().nth(6) {
        Some((idx, _)) => format!("{}***", &key[..idx]),
        None => "***".to_string(),
    }
}

impl OpenAiBackend {
    /// Create a backend without authentication.
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: normalize_base_url(&base_url.into()),
            api_key: None,
        }
    }

    /// Set the API key, sent as `Authorization: Bearer {key}`.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the request body for `/v1/chat/completions`.
    fn build_body(request: &LlmRequest) -> Value {
        let mut body = json!({
            "model": request.model,
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": request.prompt},
            ],
            "temperature": request.config.temperature,
            "max_tokens": request.config.max_tokens,
            "stream": false,
        });

        if request.config.json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }

        body
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key {
            Some(ref key) => req.bearer_auth(key),
            None => req,
        }
    }

    /// Turn a non-success response into a [`ProviderError::Http`].
    async fn http_error(resp: Response) -> ProviderError {
        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = resp.text().await.unwrap_or_default();
        ProviderError::Http {
            status,
            body,
            retry_after,
        }
    }

    fn extract_text(json_resp: &Value) -> Option<String> {
        json_resp
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    fn extract_metadata(json_resp: &Value) -> Option<Value> {
        let mut meta = serde_json::Map::new();
        for key in ["usage", "model", "id"] {
            if let Some(v) = json_resp.get(key) {
                meta.insert(key.into(), v.clone());
            }
        }
        if meta.is_empty() {
            None
        } else {
            Some(Value::Object(meta))
        }
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = Self::build_body(request);

        let resp = self
            .authorize(self.client.post(&url).json(&body))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::http_error(resp).await);
        }

        let status = resp.status().as_u16();
        let json_resp: Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        let text = Self::extract_text(&json_resp)
            .ok_or_else(|| ProviderError::Decode("response has no choices[0].message.content".into()))?;

        Ok(LlmResponse {
            text,
            status,
            metadata: Self::extract_metadata(&json_resp),
        })
    }

    async fn probe(&self) -> Result<(), ProviderError> {
        let url = format!("{}/v1/models", self.base_url);
        let resp = self.authorize(self.client.get(&url)).send().await?;
        if !resp.status().is_success() {
            return Err(Self::http_error(resp).await);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "openai"
    }

    fn is_configured(&self) -> bool {
        self.has_api_key()
    }
}

/// Parse a `Retry-After` header value as whole seconds.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Strip known path suffixes so the backend can append its own.
/// e.g., "https://api.openai.com/v1" -> "https://api.openai.com"
fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    for suffix in ["/v1/chat/completions", "/v1/models", "/v1"] {
        if let Some(stripped) = trimmed.strip_suffix(suffix) {
            return stripped.to_string();
        }
    }
    trimmed.to_string()
}
