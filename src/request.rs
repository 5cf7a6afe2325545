//! Request normalization and validation.
//!
//! [`RawGenerationRequest`] is what arrives from the boundary (deserialized
//! JSON). [`validate`] turns it into a canonical [`GenerationRequest`] or
//! fails with [`PipelineError::Validation`].

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MAX_KEYWORDS: usize = 10;
pub const GENRE_CHARS: (usize, usize) = (3, 50);
pub const MAX_LENGTH_RANGE: (u32, u32) = (100, 2000);
pub const MIN_LENGTH_RANGE: (u32, u32) = (50, 1000);
pub const DEFAULT_MAX_LENGTH: u32 = 500;
/// Lower bound of the length band when no minimum is requested.
pub const DEFAULT_MIN_WORDS: u32 = 100;

/// A generation request exactly as received from the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawGenerationRequest {
    pub keywords: Vec<String>,
    pub genre: String,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
}

/// Story tone. Parsing is case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Neutral,
    Humorous,
    Dark,
    Epic,
    Romantic,
    Mysterious,
}

impl Tone {
    pub const ALL: [Tone; 6] = [
        Tone::Neutral,
        Tone::Humorous,
        Tone::Dark,
        Tone::Epic,
        Tone::Romantic,
        Tone::Mysterious,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Tone::Neutral => "neutral",
            Tone::Humorous => "humorous",
            Tone::Dark => "dark",
            Tone::Epic => "epic",
            Tone::Romantic => "romantic",
            Tone::Mysterious => "mysterious",
        }
    }

    fn allowed() -> Vec<String> {
        Self::ALL.iter().map(|t| t.as_str().to_string()).collect()
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tone {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == lowered)
            .ok_or_else(|| PipelineError::Validation {
                message: format!(
                    "tone '{}' is not supported; must be one of: {}",
                    s,
                    Self::allowed().join(", ")
                ),
                field: Some("tone"),
                allowed: Some(Self::allowed()),
            })
    }
}

/// A validated, canonical generation request.
///
/// Keywords are trimmed, non-empty, and de-duplicated (case-sensitive) in
/// first-seen order. `min_length`, when present, never exceeds `max_length`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    keywords: Vec<String>,
    genre: String,
    tone: Tone,
    max_length: u32,
    min_length: Option<u32>,
}

impl GenerationRequest {
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn genre(&self) -> &str {
        &self.genre
    }

    pub fn tone(&self) -> Tone {
        self.tone
    }

    pub fn max_length(&self) -> u32 {
        self.max_length
    }

    pub fn min_length(&self) -> Option<u32> {
        self.min_length
    }

    /// The `[min, max]` word band passed to the model.
    pub fn length_band(&self) -> (u32, u32) {
        (self.min_length.unwrap_or(DEFAULT_MIN_WORDS), self.max_length)
    }
}

/// Validate and normalize a raw request. Pure function of its input.
pub fn validate(raw: &RawGenerationRequest) -> Result<GenerationRequest> {
    if raw.keywords.is_empty() || raw.keywords.len() > MAX_KEYWORDS {
        return Err(PipelineError::validation(
            "keywords",
            format!(
                "between 1 and {} keywords are required, got {}",
                MAX_KEYWORDS,
                raw.keywords.len()
            ),
        ));
    }
    let keywords = normalize_keywords(&raw.keywords);
    if keywords.is_empty() {
        return Err(PipelineError::validation(
            "keywords",
            "at least one non-empty keyword is required",
        ));
    }

    let genre = sanitize(&raw.genre);
    let genre_chars = genre.chars().count();
    if genre_chars < GENRE_CHARS.0 || genre_chars > GENRE_CHARS.1 {
        return Err(PipelineError::validation(
            "genre",
            format!(
                "genre must be {}-{} characters, got {}",
                GENRE_CHARS.0, GENRE_CHARS.1, genre_chars
            ),
        ));
    }

    let tone = match raw.tone.as_deref() {
        Some(t) => t.parse::<Tone>()?,
        None => Tone::default(),
    };

    let max_length = raw.max_length.unwrap_or(DEFAULT_MAX_LENGTH);
    check_range("max_length", max_length, MAX_LENGTH_RANGE)?;

    if let Some(min) = raw.min_length {
        check_range("min_length", min, MIN_LENGTH_RANGE)?;
        if min > max_length {
            return Err(PipelineError::validation(
                "min_length",
                format!(
                    "min_length ({}) cannot be greater than max_length ({})",
                    min, max_length
                ),
            ));
        }
    }

    Ok(GenerationRequest {
        keywords,
        genre,
        tone,
        max_length,
        min_length: raw.min_length,
    })
}

/// Trim, drop empties, de-duplicate case-sensitively keeping first occurrence.
fn normalize_keywords(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for kw in raw {
        let kw = sanitize(kw);
        if !kw.is_empty() && !out.contains(&kw) {
            out.push(kw);
        }
    }
    out
}

/// Turn control characters into spaces, then trim and collapse whitespace
/// so words on either side stay separate.
fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn check_range(field: &'static str, value: u32, (lo, hi): (u32, u32)) -> Result<()> {
    if value < lo || value > hi {
        return Err(PipelineError::validation(
            field,
            format!("{} must be between {} and {}, got {}", field, lo, hi, value),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn raw(keywords: &[&str]) -> RawGenerationRequest {
        RawGenerationRequest {
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            genre: "fantasy".into(),
            tone: Some("epic".into()),
            max_length: Some(500),
            min_length: None,
        }
    }

    #[test]
    fn test_duplicates_removed() {
        let req = validate(&raw(&["dragon", "adventure", "dragon"])).unwrap();
        assert_eq!(req.keywords(), &["dragon".to_string(), "adventure".to_string()]);
    }

    #[test]
    fn test_dedup_is_case_sensitive_and_trims() {
        let req = validate(&raw(&["  Dragon ", "dragon", "Dragon", ""])).unwrap();
        assert_eq!(req.keywords(), &["Dragon".to_string(), "dragon".to_string()]);
    }

    #[test]
    fn test_blank_keywords_fail() {
        let err = validate(&raw(&["  ", "", "\t"])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_empty_and_oversized_keyword_lists_fail() {
        assert!(validate(&raw(&[])).is_err());
        let many: Vec<String> = (0..11).map(|i| format!("k{i}")).collect();
        let refs: Vec<&str> = many.iter().map(String::as_str).collect();
        assert!(validate(&raw(&refs)).is_err());
    }

    #[test]
    fn test_control_characters_stripped() {
        let req = validate(&raw(&["ninja\u{0007}", "to\nad", "sea\t\tshell"])).unwrap();
        assert_eq!(
            req.keywords(),
            &["ninja".to_string(), "to ad".to_string(), "sea shell".to_string()]
        );
    }

    #[test]
    fn test_control_characters_in_genre_keep_words_apart() {
        let mut request = raw(&["owl"]);
        request.genre = "science\nfiction\u{0000}".into();
        assert_eq!(validate(&request).unwrap().genre(), "science fiction");
    }

    #[test]
    fn test_tone_case_insensitive() {
        let mut r = raw(&["ninja"]);
        r.tone = Some("HuMoRoUs".into());
        assert_eq!(validate(&r).unwrap().tone(), Tone::Humorous);
    }

    #[test]
    fn test_unknown_tone_lists_allowed_values() {
        for bad in ["dramatic", "invalid_tone_xyz", ""] {
            let mut r = raw(&["ninja"]);
            r.tone = Some(bad.into());
            match validate(&r).unwrap_err() {
                PipelineError::Validation { field, allowed, .. } => {
                    assert_eq!(field, Some("tone"));
                    assert_eq!(allowed.unwrap().len(), 6);
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn test_defaults_applied() {
        let r = RawGenerationRequest {
            keywords: vec!["ninja".into()],
            genre: "fantasy".into(),
            ..Default::default()
        };
        let req = validate(&r).unwrap();
        assert_eq!(req.tone(), Tone::Neutral);
        assert_eq!(req.max_length(), 500);
        assert_eq!(req.length_band(), (100, 500));
    }

    #[test]
    fn test_min_greater_than_max_fails() {
        let mut r = raw(&["ninja"]);
        r.max_length = Some(200);
        r.min_length = Some(300);
        let err = validate(&r).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("min_length"));
    }

    #[test]
    fn test_min_equal_to_max_allowed() {
        let mut r = raw(&["ninja"]);
        r.max_length = Some(300);
        r.min_length = Some(300);
        assert_eq!(validate(&r).unwrap().length_band(), (300, 300));
    }

    #[test]
    fn test_length_bounds() {
        let mut r = raw(&["ninja"]);
        r.max_length = Some(99);
        assert!(validate(&r).is_err());
        r.max_length = Some(2001);
        assert!(validate(&r).is_err());
        r.max_length = Some(1500);
        r.min_length = Some(49);
        assert!(validate(&r).is_err());
    }

    #[test]
    fn test_genre_length() {
        let mut r = raw(&["ninja"]);
        r.genre = " sf ".into();
        assert!(validate(&r).is_err());
        r.genre = "x".repeat(51);
        assert!(validate(&r).is_err());
        r.genre = "  sci-fi ".into();
        assert_eq!(validate(&r).unwrap().genre(), "sci-fi");
    }

    #[test]
    fn test_deserialize_from_boundary_json() {
        let r: RawGenerationRequest =
            serde_json::from_str(r#"{"keywords":["a"],"genre":"fantasy"}"#).unwrap();
        assert!(r.tone.is_none());
        assert!(r.max_length.is_none());
    }
}
