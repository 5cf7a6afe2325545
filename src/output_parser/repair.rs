//! Deterministic repair of near-miss JSON.
//!
//! Long story text makes models slip in predictable ways: raw newlines or
//! tabs inside string values, trailing commas, and typographic quotes around
//! keys. These are fixed by a single character scan; anything else is left
//! for the caller to reject.

/// Attempt to repair `broken` into valid JSON.
///
/// Returns `None` if the input is already valid or cannot be fixed.
///
/// # Examples
///
/// ```
/// use story_pipeline::output_parser::repair::try_repair_json;
///
/// let fixed = try_repair_json("{\"title\": \"x\", \"content\": \"line1\nline2\",}").unwrap();
/// assert_eq!(fixed, "{\"title\": \"x\", \"content\": \"line1\\nline2\"}");
/// ```
pub fn try_repair_json(broken: &str) -> Option<String> {
    if serde_json::from_str::<serde_json::Value>(broken).is_ok() {
        return None;
    }

    let repaired = remove_trailing_commas(&escape_controls_in_strings(&normalize_quotes(broken)));

    serde_json::from_str::<serde_json::Value>(&repaired)
        .ok()
        .map(|_| repaired)
}

/// Replace typographic double quotes outside of strings with ASCII quotes.
fn normalize_quotes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_string = false;
    let mut curly = false;
    let mut escaped = false;

    for ch in s.chars() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                '\u{201D}' if curly => {
                    in_string = false;
                    out.push('"');
                    continue;
                }
                _ => {}
            }
            out.push(ch);
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                curly = false;
                out.push(ch);
            }
            '\u{201C}' => {
                in_string = true;
                curly = true;
                out.push('"');
            }
            '\u{201D}' => out.push('"'),
            _ => out.push(ch),
        }
    }
    out
}

/// Escape raw newlines, carriage returns and tabs found inside strings.
fn escape_controls_in_strings(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escaped = false;

    for ch in s.chars() {
        if !in_string {
            if ch == '"' {
                in_string = true;
            }
            out.push(ch);
            continue;
        }
        if escaped {
            escaped = false;
            out.push(ch);
            continue;
        }
        match ch {
            '\\' => {
                escaped = true;
                out.push(ch);
            }
            '"' => {
                in_string = false;
                out.push(ch);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out
}

/// Drop commas that directly precede `}` or `]`, ignoring whitespace.
fn remove_trailing_commas(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &ch) in chars.iter().enumerate() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            out.push(ch);
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(ch);
                }
            }
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_json_needs_no_repair() {
        assert_eq!(try_repair_json(r#"{"a": 1}"#), None);
    }

    #[test]
    fn trailing_commas_removed() {
        let fixed = try_repair_json(r#"{"a": [1, 2, ], "b": "x" , }"#).unwrap();
        let v: serde_json::Value = serde_json::from_str(&fixed).unwrap();
        assert_eq!(v["a"], serde_json::json!([1, 2]));
    }

    #[test]
    fn commas_inside_strings_kept() {
        let fixed = try_repair_json("{\"a\": \"x,}\",}").unwrap();
        let v: serde_json::Value = serde_json::from_str(&fixed).unwrap();
        assert_eq!(v["a"], "x,}");
    }

    #[test]
    fn raw_newlines_and_tabs_escaped() {
        let fixed = try_repair_json("{\"content\": \"one\n\ttwo\"}").unwrap();
        let v: serde_json::Value = serde_json::from_str(&fixed).unwrap();
        assert_eq!(v["content"], "one\n\ttwo");
    }

    #[test]
    fn curly_quotes_around_keys() {
        let fixed = try_repair_json("{\u{201C}title\u{201D}: \"x\"}").unwrap();
        let v: serde_json::Value = serde_json::from_str(&fixed).unwrap();
        assert_eq!(v["title"], "x");
    }

    #[test]
    fn hopeless_input_rejected() {
        assert_eq!(try_repair_json("{title: x"), None);
    }
}
