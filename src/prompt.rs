//! Deterministic prompt construction.
//!
//! [`build`] turns a [`GenerationRequest`] into a [`RenderedPrompt`]: a
//! system instruction carrying the output contract, and a user instruction
//! carrying the story brief. No randomness, no I/O: identical requests give
//! byte-identical prompts.

use crate::request::GenerationRequest;
use std::collections::BTreeMap;

/// Sentinel that should never appear in real templates.
const ESCAPE_SENTINEL: &str = "\x00LBRACE\x00";
/// Sentinel for escaped closing brace.
const ESCAPE_SENTINEL_CLOSE: &str = "\x00RBRACE\x00";

const SYSTEM_TEMPLATE: &str = "You are a master storyteller and accomplished author. \
Write creative, engaging stories based on the user's request. \
Adhere to the requested genre, tone, and length constraints.\n\n{contract}";

const USER_TEMPLATE: &str = "Write a story with the following details:\n\
- Keywords: {keywords}\n\
- Genre: {genre}\n\
- Tone: {tone}\n\
- Length: between {min_words} and {max_words} words\n\n\
Use every keyword in the story and list the ones you used in `keywords_used`.";

/// A single field the model must emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractField {
    pub name: &'static str,
    pub kind: &'static str,
    pub description: &'static str,
}

/// The structured-output contract shared by the prompt and the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputContract {
    pub fields: &'static [ContractField],
}

pub const STORY_FIELDS: &[ContractField] = &[
    ContractField {
        name: "title",
        kind: "string",
        description: "a short, non-empty story title",
    },
    ContractField {
        name: "content",
        kind: "string",
        description: "the full story text",
    },
    ContractField {
        name: "keywords_used",
        kind: "array of strings",
        description: "the requested keywords that appear in the story",
    },
];

impl OutputContract {
    pub fn story() -> Self {
        Self {
            fields: STORY_FIELDS,
        }
    }

    pub fn field_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }

    /// Render the contract as model-facing instructions.
    pub fn instructions(&self) -> String {
        let fields = self
            .fields
            .iter()
            .map(|f| format!("- `{}` ({}): {}", f.name, f.kind, f.description))
            .collect::<Vec<_>>()
            .join("\n");
        let skeleton = self
            .fields
            .iter()
            .map(|f| {
                let placeholder = if f.kind.starts_with("array") { "[...]" } else { "\"...\"" };
                format!("\"{}\": {}", f.name, placeholder)
            })
            .collect::<Vec<_>>()
            .join(", ");
        section(
            "Output format",
            &format!(
                "Respond with a single JSON object and nothing else. Fields:\n{}\n\nExample shape: {{{}}}",
                fields, skeleton
            ),
        )
    }
}

/// Immutable prompt produced once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    system: String,
    user: String,
    contract: OutputContract,
}

impl RenderedPrompt {
    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn contract(&self) -> &OutputContract {
        &self.contract
    }
}

/// Render the prompt for a validated request.
pub fn build(request: &GenerationRequest) -> RenderedPrompt {
    let contract = OutputContract::story();
    let (min_words, max_words) = request.length_band();

    // Contract instructions contain literal braces; escape before templating.
    let escaped_contract = contract.instructions().replace('{', "{{").replace('}', "}}");
    let system_template = SYSTEM_TEMPLATE.replace("{contract}", &escaped_contract);
    let system = render(&system_template, &BTreeMap::new());

    let mut vars = BTreeMap::new();
    vars.insert("keywords", request.keywords().join(", "));
    vars.insert("genre", request.genre().to_string());
    vars.insert("tone", request.tone().to_string());
    vars.insert("min_words", min_words.to_string());
    vars.insert("max_words", max_words.to_string());
    let user = render(USER_TEMPLATE, &vars);

    RenderedPrompt {
        system,
        user,
        contract,
    }
}

/// Replace `{key}` placeholders with values from `vars`.
///
/// Use `{{` to insert a literal `{` and `}}` to insert a literal `}`.
/// Substituted values are inserted verbatim and never re-expanded.
///
/// # Example
///
/// ```
/// use std::collections::BTreeMap;
/// use story_pipeline::prompt::render;
///
/// let mut vars = BTreeMap::new();
/// vars.insert("name", "Alice".to_string());
/// let result = render("Hello {name}, JSON: {{\"key\": \"val\"}}", &vars);
/// assert_eq!(result, r#"Hello Alice, JSON: {"key": "val"}"#);
/// ```
pub fn render(template: &str, vars: &BTreeMap<&str, String>) -> String {
    let protected = template
        .replace("{{", ESCAPE_SENTINEL)
        .replace("}}", ESCAPE_SENTINEL_CLOSE);

    // Single left-to-right pass so values containing `{x}` stay literal.
    let mut rendered = String::with_capacity(protected.len());
    let mut rest = protected.as_str();
    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                match vars.get(key) {
                    Some(value) => rendered.push_str(value),
                    None => {
                        rendered.push('{');
                        rendered.push_str(key);
                        rendered.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                rendered.push('{');
                rest = after;
            }
        }
    }
    rendered.push_str(rest);

    rendered
        .replace(ESCAPE_SENTINEL, "{")
        .replace(ESCAPE_SENTINEL_CLOSE, "}")
}

/// Wrap text in a labeled section for structured prompts.
pub fn section(label: &str, content: &str) -> String {
    format!("## {}\n{}", label, content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{validate, RawGenerationRequest};

    fn request() -> GenerationRequest {
        validate(&RawGenerationRequest {
            keywords: vec!["dragon".into(), "adventure".into(), "dragon".into()],
            genre: "fantasy".into(),
            tone: Some("epic".into()),
            max_length: Some(500),
            min_length: None,
        })
        .unwrap()
    }

    #[test]
    fn test_build_is_deterministic() {
        let req = request();
        let a = build(&req);
        let b = build(&req);
        assert_eq!(a, b);
        assert_eq!(a.system().as_bytes(), b.system().as_bytes());
        assert_eq!(a.user().as_bytes(), b.user().as_bytes());
    }

    #[test]
    fn test_user_prompt_carries_brief() {
        let prompt = build(&request());
        assert!(prompt.user().contains("- Keywords: dragon, adventure\n"));
        assert!(prompt.user().contains("- Genre: fantasy"));
        assert!(prompt.user().contains("- Tone: epic"));
        assert!(prompt.user().contains("between 100 and 500 words"));
    }

    #[test]
    fn test_length_band_uses_min_length() {
        let req = validate(&RawGenerationRequest {
            keywords: vec!["ninja".into()],
            genre: "comedy".into(),
            tone: None,
            max_length: Some(800),
            min_length: Some(250),
        })
        .unwrap();
        assert!(build(&req).user().contains("between 250 and 800 words"));
    }

    #[test]
    fn test_system_prompt_declares_contract() {
        let prompt = build(&request());
        for name in ["`title`", "`content`", "`keywords_used`"] {
            assert!(prompt.system().contains(name), "missing {name}");
        }
        assert!(prompt
            .system()
            .contains(r#"{"title": "...", "content": "...", "keywords_used": [...]}"#));
        assert_eq!(
            prompt.contract().field_names(),
            vec!["title", "content", "keywords_used"]
        );
    }

    #[test]
    fn test_render_escaped_braces() {
        let mut vars = BTreeMap::new();
        vars.insert("name", "Alice".to_string());
        let result = render("Hello {name}, JSON: {{\"key\": \"val\"}}", &vars);
        assert_eq!(result, r#"Hello Alice, JSON: {"key": "val"}"#);
    }

    #[test]
    fn test_render_values_not_reexpanded() {
        let mut vars = BTreeMap::new();
        vars.insert("a", "{b}".to_string());
        vars.insert("b", "oops".to_string());
        assert_eq!(render("x {a} y", &vars), "x {b} y");
    }

    #[test]
    fn test_render_unknown_placeholder_left_alone() {
        let vars = BTreeMap::new();
        assert_eq!(render("keep {this}", &vars), "keep {this}");
    }

    #[test]
    fn test_keyword_with_braces_is_literal() {
        let req = validate(&RawGenerationRequest {
            keywords: vec!["{genre}".into()],
            genre: "fantasy".into(),
            ..Default::default()
        })
        .unwrap();
        assert!(build(&req).user().contains("- Keywords: {genre}\n"));
    }

    #[test]
    fn test_section() {
        assert_eq!(section("Context", "Some text"), "## Context\nSome text");
    }
}
