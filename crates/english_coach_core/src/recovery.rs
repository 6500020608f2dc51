//! crates/english_coach_core/src/recovery.rs
//!
//! Recovers structured JSON from raw model output.
//!
//! Models are asked for JSON but routinely wrap it in prose or Markdown code
//! fences. Recovery strips the fences, finds the first top-level object or
//! array with a bracket-balance scan that understands string literals, and
//! parses that span. Anything that cannot be parsed is an explicit error.

use crate::domain::MistakeInput;
use serde_json::Value;

/// Longest excerpt of raw model output carried in a recovery error.
pub const EXCERPT_LIMIT: usize = 100;

/// The top-level structure the caller expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Object,
    Array,
}

impl Shape {
    fn delimiters(&self) -> (char, char) {
        match self {
            Shape::Object => ('{', '}'),
            Shape::Array => ('[', ']'),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecoveryError {
    #[error("Malformed model response ({reason}): {excerpt}")]
    MalformedResponse { reason: String, excerpt: String },
}

impl RecoveryError {
    fn malformed(raw: &str, reason: impl Into<String>) -> Self {
        RecoveryError::MalformedResponse {
            reason: reason.into(),
            excerpt: excerpt(raw),
        }
    }

    pub fn excerpt(&self) -> &str {
        match self {
            RecoveryError::MalformedResponse { excerpt, .. } => excerpt,
        }
    }
}

/// Truncates raw text for diagnostics.
pub fn excerpt(raw: &str) -> String {
    let mut chars = raw.chars();
    let head: String = chars.by_ref().take(EXCERPT_LIMIT).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Removes a leading ```json / ``` fence and a trailing ``` fence.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Finds the first balanced `open ... close` span, ignoring brackets inside
/// JSON string literals. Returns `None` if no opener exists or it never closes.
fn balanced_span(text: &str, shape: Shape) -> Option<&str> {
    let (open, close) = shape.delimiters();
    let start = text.find(open)?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    if c != close {
                        return None;
                    }
                    let end = start + offset + c.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extracts and parses the expected structure from raw model output.
pub fn recover(raw: &str, shape: Shape) -> Result<Value, RecoveryError> {
    let text = strip_code_fences(raw);
    let span = balanced_span(text, shape).ok_or_else(|| {
        RecoveryError::malformed(raw, format!("no complete JSON {:?} found", shape).to_lowercase())
    })?;
    let value: Value =
        serde_json::from_str(span).map_err(|e| RecoveryError::malformed(raw, e.to_string()))?;

    let matches_shape = match shape {
        Shape::Object => value.is_object(),
        Shape::Array => value.is_array(),
    };
    if !matches_shape {
        return Err(RecoveryError::malformed(raw, "unexpected JSON shape"));
    }
    Ok(value)
}

//=========================================================================================
// Field helpers for untrusted payloads
//=========================================================================================

/// A non-empty trimmed string field.
pub fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// A numeric field, accepting numbers encoded as strings ("8").
pub fn number_field(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Validated mistake entries from `value["mistakes"]`.
///
/// Each entry needs a `wrong` phrase and a correction under `correct_key`
/// (`"correct"` for sentence analysis, `"right"` for interview feedback).
/// Entries missing either are skipped.
pub fn mistake_entries(value: &Value, correct_key: &str) -> Vec<MistakeInput> {
    let Some(entries) = value.get("mistakes").and_then(Value::as_array) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let wrong = str_field(entry, "wrong")?;
            let correct = str_field(entry, correct_key)?;
            Some(MistakeInput::new(
                wrong,
                correct,
                str_field(entry, "rule").map(str::to_string),
                str_field(entry, "category").map(str::to_string),
                str_field(entry, "explanation").map(str::to_string),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recovers_fenced_object_after_prose() {
        let raw = "Here you go:\n```json\n{\"a\":1}\n```";
        assert_eq!(recover(raw, Shape::Object).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn prose_without_json_is_malformed() {
        let err = recover("not json at all", Shape::Object).unwrap_err();
        assert!(matches!(err, RecoveryError::MalformedResponse { .. }));
        assert_eq!(err.excerpt(), "not json at all");
    }

    #[test]
    fn first_object_wins_over_later_blocks() {
        let raw = r#"{"score": 7} and also {"score": 2}"#;
        assert_eq!(recover(raw, Shape::Object).unwrap(), json!({"score": 7}));
    }

    #[test]
    fn braces_inside_strings_do_not_end_the_span() {
        let raw = r#"Result: {"feedback": "use } and { carefully \" ok", "score": 6} trailing"#;
        let value = recover(raw, Shape::Object).unwrap();
        assert_eq!(value["score"], 6);
    }

    #[test]
    fn recovers_arrays() {
        let raw = "```\n[\"Cats\", \"Dogs\"]\n```";
        assert_eq!(recover(raw, Shape::Array).unwrap(), json!(["Cats", "Dogs"]));
    }

    #[test]
    fn unterminated_object_is_malformed() {
        assert!(recover("{\"a\": [1, 2", Shape::Object).is_err());
    }

    #[test]
    fn excerpt_is_capped() {
        let raw = "x".repeat(500);
        let err = recover(&raw, Shape::Array).unwrap_err();
        assert_eq!(err.excerpt().chars().count(), EXCERPT_LIMIT + 3);
    }

    #[test]
    fn incomplete_mistakes_are_skipped() {
        let value = json!({
            "mistakes": [
                {"wrong": "he go", "correct": "he goes", "rule": "Subject-verb agreement"},
                {"wrong": "", "correct": "x"},
                {"correct": "missing wrong"},
                {"wrong": "a apple", "right": "an apple"}
            ]
        });
        let analyzed = mistake_entries(&value, "correct");
        assert_eq!(analyzed.len(), 1);
        assert_eq!(analyzed[0].wrong_phrase, "he go");

        let interviewed = mistake_entries(&value, "right");
        assert_eq!(interviewed.len(), 1);
        assert_eq!(interviewed[0].correct_phrase, "an apple");
    }

    #[test]
    fn numbers_may_arrive_as_strings() {
        let value = json!({"score": "8", "other": 4.5});
        assert_eq!(number_field(&value, "score"), Some(8.0));
        assert_eq!(number_field(&value, "other"), Some(4.5));
        assert_eq!(number_field(&value, "missing"), None);
    }
}
