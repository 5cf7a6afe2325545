//! Locating the JSON object inside a model response.
//!
//! Models wrap answers in `<think>` blocks, markdown fences, and chatter.
//! [`json_candidate`] peels those layers in order and returns the most
//! likely object text.

/// Strip all `<think>...</think>` and `<thinking>...</thinking>` blocks.
///
/// An unclosed block swallows the rest of the text.
///
/// # Examples
///
/// ```
/// use story_pipeline::output_parser::extract::strip_think_tags;
///
/// assert_eq!(strip_think_tags("<think>plan</think>{}"), "{}");
/// assert_eq!(strip_think_tags("<thinking>never closed"), "");
/// ```
pub fn strip_think_tags(text: &str) -> String {
    let once = strip_tag(text, "<think>", "</think>");
    strip_tag(&once, "<thinking>", "</thinking>")
}

fn strip_tag(text: &str, open: &str, close: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(open) {
        out.push_str(&rest[..start]);
        match rest[start..].find(close) {
            Some(end) => rest = &rest[start + end + close.len()..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

/// Body of the first fenced code block, preferring one tagged `json`.
///
/// # Examples
///
/// ```
/// use story_pipeline::output_parser::extract::fenced_block;
///
/// let input = "Sure:\n```json\n{\"title\": \"x\"}\n```\nEnjoy!";
/// assert_eq!(fenced_block(input), Some("{\"title\": \"x\"}"));
/// ```
pub fn fenced_block(text: &str) -> Option<&str> {
    let mut first_any = None;
    let mut search_from = 0;

    while let Some(offset) = text[search_from..].find("```") {
        let after_ticks = search_from + offset + 3;
        let line_end = after_ticks + text[after_ticks..].find('\n')?;
        let lang = text[after_ticks..line_end].trim();
        let body_start = line_end + 1;
        let close = body_start + text[body_start..].find("```")?;
        let body = text[body_start..close].trim();

        if lang.eq_ignore_ascii_case("json") {
            return Some(body);
        }
        first_any.get_or_insert(body);
        search_from = close + 3;
    }

    first_any
}

/// The last top-level `{...}` region, respecting strings and escapes.
///
/// # Examples
///
/// ```
/// use story_pipeline::output_parser::extract::last_object;
///
/// let input = r#"Here you go: {"title": "a {b}"} hope it helps"#;
/// assert_eq!(last_object(input), Some(r#"{"title": "a {b}"}"#));
/// ```
pub fn last_object(text: &str) -> Option<&str> {
    let mut best = None;
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        best = Some(&text[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }

    best
}

/// Best JSON object candidate from a raw response, or `None` if the text
/// holds nothing object-shaped.
pub fn json_candidate(response: &str) -> Option<String> {
    let cleaned = strip_think_tags(response);
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    if cleaned.starts_with('{') && cleaned.ends_with('}') {
        return Some(cleaned.to_string());
    }
    if let Some(body) = fenced_block(cleaned) {
        if body.starts_with('{') {
            return Some(body.to_string());
        }
    }
    last_object(cleaned).map(str::to_string)
}
