//! Uniform failure response.
//!
//! Every [`PipelineError`] becomes an [`ErrorEnvelope`]:
//!
//! ```json
//! {"error": {"code": "validation_error", "message": "...", "details": {...}, "correlation_id": "..."}}
//! ```
//!
//! Production mode keeps raw upstream and model text out of `details`.
//! Internal faults always get a generic message.

use crate::config::Environment;
use crate::error::{ErrorKind, PipelineError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

const INTERNAL_MESSAGE: &str = "An unexpected error occurred";
const RAW_PREVIEW_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub details: Option<Value>,
    pub correlation_id: String,
}

impl ErrorEnvelope {
    pub fn from_error(
        err: &PipelineError,
        correlation_id: impl Into<String>,
        environment: Environment,
    ) -> Self {
        let kind = err.kind();
        let verbose = !environment.is_production();

        let (message, details) = match err {
            PipelineError::Validation {
                message,
                field,
                allowed,
            } => {
                let mut map = Map::new();
                if let Some(field) = field {
                    map.insert("field".into(), json!(field));
                }
                if let Some(allowed) = allowed {
                    map.insert("allowed".into(), json!(allowed));
                }
                (message.clone(), non_empty(map))
            }
            PipelineError::Transient { attempts, source } => {
                let mut map = Map::new();
                map.insert("attempts".into(), json!(attempts));
                if verbose {
                    map.insert("upstream_error".into(), json!(source.to_string()));
                }
                (
                    "The story provider is temporarily unavailable. Please try again later."
                        .to_string(),
                    non_empty(map),
                )
            }
            PipelineError::Permanent { source } => {
                let details = verbose.then(|| json!({ "upstream_error": source.to_string() }));
                ("The story provider rejected the request.".to_string(), details)
            }
            PipelineError::ParseFailure { reason, raw } => {
                let details = verbose.then(|| {
                    json!({
                        "reason": reason,
                        "raw_output": preview(raw),
                    })
                });
                (
                    "The story provider returned an unusable response.".to_string(),
                    details,
                )
            }
            PipelineError::InvalidConfig(_) | PipelineError::Internal(_) => {
                (INTERNAL_MESSAGE.to_string(), None)
            }
        };

        Self {
            error: ErrorBody {
                code: kind.code().to_string(),
                message,
                details,
                correlation_id: correlation_id.into(),
            },
        }
    }

    /// HTTP-equivalent status code.
    pub fn status(&self) -> u16 {
        match self.error.code.as_str() {
            "validation_error" => ErrorKind::Validation.status(),
            "upstream_unavailable" | "upstream_rejected" | "invalid_model_output" => 502,
            _ => ErrorKind::Internal.status(),
        }
    }
}

fn non_empty(map: Map<String, Value>) -> Option<Value> {
    (!map.is_empty()).then_some(Value::Object(map))
}

fn preview(raw: &str) -> String {
    match raw.char_indices().nth(RAW_PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &raw[..idx]),
        None => raw.to_string(),
    }
}
