use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Closed classification of every failure the pipeline can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller input was malformed. Never retried.
    Validation,
    /// Upstream instability (rate limit, timeout, 5xx). Retried up to the bound.
    Transient,
    /// Upstream rejected the call for reasons a retry cannot fix.
    Permanent,
    /// Model output did not match the structured contract.
    ParseFailure,
    /// Anything unclassified.
    Internal,
}

impl ErrorKind {
    /// Stable machine-readable code used in error envelopes.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::Transient => "upstream_unavailable",
            ErrorKind::Permanent => "upstream_rejected",
            ErrorKind::ParseFailure => "invalid_model_output",
            ErrorKind::Internal => "internal_error",
        }
    }

    /// HTTP-equivalent status for this kind.
    pub fn status(self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::Transient | ErrorKind::Permanent | ErrorKind::ParseFailure => 502,
            ErrorKind::Internal => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Errors produced by the pipeline and its components.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The request failed validation.
    #[error("Invalid request: {message}")]
    Validation {
        /// Human-readable reason.
        message: String,
        /// Field the failure applies to, when known.
        field: Option<&'static str>,
        /// Allowed values, when the field is enumerated.
        allowed: Option<Vec<String>>,
    },

    /// Upstream failed in a way that may succeed later. Terminal once
    /// returned from the invoker.
    #[error("Provider unavailable after {attempts} attempt(s): {source}")]
    Transient {
        /// Number of provider calls made before giving up.
        attempts: u32,
        /// The last provider failure.
        source: ProviderError,
    },

    /// The provider rejected the call outright.
    #[error("Provider rejected the request: {source}")]
    Permanent {
        /// The provider failure, unchanged.
        source: ProviderError,
    },

    /// The model response did not match the output contract.
    #[error("Model output did not match the story contract: {reason}")]
    ParseFailure {
        /// What was wrong with the response.
        reason: String,
        /// The raw model text, kept for diagnostics only.
        raw: String,
    },

    /// Invalid configuration detected at startup.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Catch-all for unclassified faults.
    #[error("{0}")]
    Internal(String),
}

impl PipelineError {
    /// Build a validation error for a specific field.
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        PipelineError::Validation {
            message: message.into(),
            field: Some(field),
            allowed: None,
        }
    }

    /// Build a parse failure, attaching the raw model text.
    pub fn parse_failure(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        PipelineError::ParseFailure {
            reason: reason.into(),
            raw: raw.into(),
        }
    }

    /// Classification tag for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Validation { .. } => ErrorKind::Validation,
            PipelineError::Transient { .. } => ErrorKind::Transient,
            PipelineError::Permanent { .. } => ErrorKind::Permanent,
            PipelineError::ParseFailure { .. } => ErrorKind::ParseFailure,
            PipelineError::InvalidConfig(_) | PipelineError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failure reported by a provider call, before classification.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Non-success HTTP status with body and optional Retry-After hint.
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code (e.g. 401, 429, 503).
        status: u16,
        /// Response body text.
        body: String,
        /// Parsed `Retry-After` header value, if present.
        retry_after: Option<Duration>,
    },

    /// The call did not finish within its timeout.
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    /// The HTTP client gave up waiting; its own timeout is not known here.
    #[error("provider request timed out")]
    RequestTimeout,

    /// Connection-level failure (refused, reset, DNS).
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider answered successfully but the body was unusable.
    #[error("could not decode provider response: {0}")]
    Decode(String),
}

/// Whether a provider failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retryability {
    Transient,
    Permanent,
}

impl ProviderError {
    /// Classify this failure. This is the only place provider failures are
    /// split into transient and permanent.
    pub fn classify(&self) -> Retryability {
        match self {
            ProviderError::Http { status, .. } => match *status {
                408 | 425 | 429 => Retryability::Transient,
                s if s >= 500 => Retryability::Transient,
                _ => Retryability::Permanent,
            },
            ProviderError::Timeout(_)
            | ProviderError::RequestTimeout
            | ProviderError::Transport(_) => Retryability::Transient,
            ProviderError::Decode(_) => Retryability::Permanent,
        }
    }

    /// Retry-After hint carried by a rate-limit response.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::RequestTimeout
        } else if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}
