//! # Story output parser
//!
//! Turns the model's untrusted text into a [`StoryResult`] or a
//! `ParseFailure`. The response must carry the three contract fields
//! declared by the prompt (`title`, `content`, `keywords_used`).
//!
//! | Step | Module |
//! |------|--------|
//! | strip think blocks, fences, prose | [`extract`] |
//! | fix near-miss JSON | [`repair`] |
//! | enforce the contract | [`parse_story`] |

pub mod extract;
pub mod repair;

pub use extract::{json_candidate, strip_think_tags};
pub use repair::try_repair_json;

use crate::error::{PipelineError, Result};
use crate::invoker::RawModelResponse;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The finished story returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryResult {
    pub title: String,
    pub content: String,
    /// Keywords the model reports using. Best effort; not checked against
    /// the request.
    pub keywords_used: Vec<String>,
}

/// Parser knobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserOptions {
    /// Accept a non-JSON reply whose first line is the title and the rest
    /// the content. Off by default.
    pub allow_plain_text: bool,
}

/// Parse a provider response.
pub fn parse_story(raw: &RawModelResponse, options: ParserOptions) -> Result<StoryResult> {
    parse_story_text(&raw.text, options)
}

/// Parse raw model text into a story.
///
/// # Examples
///
/// ```
/// use story_pipeline::output_parser::{parse_story_text, ParserOptions};
///
/// let text = r#"{"title": "Ash", "content": "The dragon woke.", "keywords_used": ["dragon"]}"#;
/// let story = parse_story_text(text, ParserOptions::default()).unwrap();
/// assert_eq!(story.title, "Ash");
/// assert_eq!(story.keywords_used, vec!["dragon"]);
/// ```
pub fn parse_story_text(text: &str, options: ParserOptions) -> Result<StoryResult> {
    if text.trim().is_empty() {
        return Err(PipelineError::parse_failure("empty model response", text));
    }

    match json_candidate(text) {
        Some(candidate) => {
            let parsed = decode_object(&candidate).and_then(|object| from_object(&object));
            match parsed {
                Ok(story) => Ok(story),
                // Braces in prose, not an attempt at the contract.
                Err(_) if options.allow_plain_text && !names_contract_field(&candidate) => {
                    from_plain_text(text)
                }
                Err(reason) => Err(PipelineError::parse_failure(reason, text)),
            }
        }
        None if options.allow_plain_text => from_plain_text(text),
        None => Err(PipelineError::parse_failure(
            "response contains no JSON object",
            text,
        )),
    }
}

fn decode_object(candidate: &str) -> std::result::Result<Map<String, Value>, String> {
    let value = match serde_json::from_str::<Value>(candidate) {
        Ok(v) => v,
        Err(e) => {
            let repaired = try_repair_json(candidate).ok_or_else(|| format!("invalid JSON: {}", e))?;
            serde_json::from_str::<Value>(&repaired).map_err(|e| format!("invalid JSON: {}", e))?
        }
    };
    match value {
        Value::Object(map) => Ok(map),
        other => Err(format!("expected a JSON object, got {}", type_name(&other))),
    }
}

/// Whether `candidate` mentions any contract field as a quoted key.
fn names_contract_field(candidate: &str) -> bool {
    const FIELDS: [&str; 3] = ["title", "content", "keywords_used"];
    let normalized = candidate.replace(['\u{201C}', '\u{201D}'], "\"");
    FIELDS
        .iter()
        .any(|field| normalized.contains(&format!("\"{}\"", field)))
}

fn from_object(object: &Map<String, Value>) -> std::result::Result<StoryResult, String> {
    let title = required_text(object, "title")?;
    let content = required_text(object, "content")?;
    let keywords_used = match object.get("keywords_used") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => {
            let mut out: Vec<String> = Vec::with_capacity(items.len());
            for kw in items.iter().filter_map(Value::as_str).map(str::trim) {
                if !kw.is_empty() && !out.iter().any(|k| k == kw) {
                    out.push(kw.to_string());
                }
            }
            out
        }
        Some(other) => {
            return Err(format!(
                "field `keywords_used` must be an array of strings, got {}",
                type_name(other)
            ))
        }
    };

    Ok(StoryResult {
        title,
        content,
        keywords_used,
    })
}

fn required_text(object: &Map<String, Value>, field: &str) -> std::result::Result<String, String> {
    match object.get(field) {
        None => Err(format!("missing field `{}`", field)),
        Some(Value::String(s)) if s.trim().is_empty() => Err(format!("field `{}` is empty", field)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(format!(
            "field `{}` must be a string, got {}",
            field,
            type_name(other)
        )),
    }
}

/// First line is the title (minus a `Title:` prefix), the rest is content.
fn from_plain_text(text: &str) -> Result<StoryResult> {
    let cleaned = strip_think_tags(text);
    let cleaned = cleaned.trim();
    let (first, rest) = cleaned
        .split_once('\n')
        .ok_or_else(|| PipelineError::parse_failure("plain-text reply has no body", text))?;

    let title = first.trim().trim_matches(|c: char| c == '#' || c == '*').trim();
    let title = ["Title:", "title:", "TITLE:"]
        .iter()
        .find_map(|p| title.strip_prefix(p))
        .unwrap_or(title)
        .trim();
    let content = rest.trim();

    if title.is_empty() || content.is_empty() {
        return Err(PipelineError::parse_failure(
            "plain-text reply is missing a title or body",
            text,
        ));
    }

    Ok(StoryResult {
        title: title.to_string(),
        content: content.to_string(),
        keywords_used: Vec::new(),
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
