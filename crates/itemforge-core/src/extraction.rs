//! Structured extraction from free-form backend text.
//!
//! Backend replies are supposed to be JSON but arrive wrapped in prose,
//! fenced in markdown, or cut off mid-stream. Extraction is an ordered list
//! of strategies combined first-success-wins:
//!
//! 1. [`ExtractionMethod::WholeDocument`] parse the whole reply
//! 2. [`ExtractionMethod::BalancedBraces`] string-aware brace scan from the first `{`
//! 3. [`ExtractionMethod::FencedBlock`] interior of a fenced code block
//! 4. [`ExtractionMethod::NamedArray`] string-aware bracket scan of a named array
//! 5. [`ExtractionMethod::Salvage`] per-record recovery keyed on required fields
//!
//! Only `Salvage` can return fewer records than the backend meant to send.
//! Callers must treat a salvaged count as a lower bound.

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Which strategy produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    WholeDocument,
    BalancedBraces,
    FencedBlock,
    NamedArray,
    Salvage,
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExtractionMethod::WholeDocument => "whole_document",
            ExtractionMethod::BalancedBraces => "balanced_braces",
            ExtractionMethod::FencedBlock => "fenced_block",
            ExtractionMethod::NamedArray => "named_array",
            ExtractionMethod::Salvage => "salvage",
        };
        write!(f, "{s}")
    }
}

/// Errors produced by extraction. Only raised when nothing usable was found.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("backend output was empty")]
    Empty,

    #[error("no usable structure found after trying {attempted:?}")]
    NothingUsable { attempted: Vec<ExtractionMethod> },
}

/// A successfully extracted value and the strategy that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted<T> {
    pub value: T,
    pub method: ExtractionMethod,
}

impl<T> Extracted<T> {
    /// True when the value may hold fewer records than the backend sent.
    pub fn is_partial(&self) -> bool {
        self.method == ExtractionMethod::Salvage
    }
}

/// Required fields that identify one independent sub-record in a collection.
///
/// A record is salvaged when it starts with `{"<id_field>": <digits>`,
/// closes its braces, and carries a single-letter `<answer_field>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SalvagePattern {
    pub id_field: &'static str,
    pub answer_field: &'static str,
}

/// Salvage pattern for generated exam items.
pub const ITEM_SALVAGE: SalvagePattern = SalvagePattern {
    id_field: "problem_number",
    answer_field: "correct_answer",
};

type Strategy<'a, T> = (ExtractionMethod, Box<dyn Fn(&str) -> Option<T> + 'a>);

/// Extract a single record of type `T`.
pub fn extract_record<T: DeserializeOwned>(text: &str) -> Result<Extracted<T>, ExtractionError> {
    let accept = |value: Value| -> Option<T> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value).ok()
    };

    let strategies: Vec<Strategy<'_, T>> = vec![
        (
            ExtractionMethod::WholeDocument,
            Box::new(move |t: &str| whole_document(t).and_then(accept)),
        ),
        (
            ExtractionMethod::BalancedBraces,
            Box::new(move |t: &str| balanced_object(t).and_then(accept)),
        ),
        (
            ExtractionMethod::FencedBlock,
            Box::new(move |t: &str| fenced_blocks(t).into_iter().find_map(accept)),
        ),
    ];

    first_success(text, strategies)
}

/// Extract a collection of `T` stored under `key`.
///
/// Accepts either `{"<key>": [...]}` or a bare array. When `salvage` is set,
/// individually well-formed records are recovered from truncated output as a
/// last resort.
pub fn extract_collection<T: DeserializeOwned>(
    text: &str,
    key: &str,
    salvage: Option<SalvagePattern>,
) -> Result<Extracted<Vec<T>>, ExtractionError> {
    let accept = move |value: Value| -> Option<Vec<T>> {
        let array = match value {
            Value::Array(_) => value,
            Value::Object(mut map) => map.remove(key).filter(Value::is_array)?,
            _ => return None,
        };
        serde_json::from_value(array).ok()
    };

    let mut strategies: Vec<Strategy<'_, Vec<T>>> = vec![
        (
            ExtractionMethod::WholeDocument,
            Box::new(move |t: &str| whole_document(t).and_then(accept)),
        ),
        (
            ExtractionMethod::BalancedBraces,
            Box::new(move |t: &str| balanced_object(t).and_then(accept)),
        ),
        (
            ExtractionMethod::FencedBlock,
            Box::new(move |t: &str| fenced_blocks(t).into_iter().find_map(accept)),
        ),
        (
            ExtractionMethod::NamedArray,
            Box::new(move |t: &str| named_array(t, key).and_then(accept)),
        ),
    ];

    if let Some(pattern) = salvage {
        strategies.push((
            ExtractionMethod::Salvage,
            Box::new(move |t: &str| {
                let records: Vec<T> = salvage_records(t, pattern)
                    .into_iter()
                    .filter_map(|v| serde_json::from_value(v).ok())
                    .collect();
                (!records.is_empty()).then_some(records)
            }),
        ));
    }

    first_success(text, strategies)
}

fn first_success<T>(
    text: &str,
    strategies: Vec<Strategy<'_, T>>,
) -> Result<Extracted<T>, ExtractionError> {
    if text.trim().is_empty() {
        return Err(ExtractionError::Empty);
    }

    let mut attempted = Vec::with_capacity(strategies.len());
    for (method, strategy) in strategies {
        attempted.push(method);
        if let Some(value) = strategy(text) {
            if method == ExtractionMethod::Salvage {
                warn!(event = "extraction.salvaged", "recovered partial records from malformed output");
            } else {
                debug!(event = "extraction.succeeded", method = %method);
            }
            return Ok(Extracted { value, method });
        }
    }

    debug!(event = "extraction.failed", len = text.len());
    Err(ExtractionError::NothingUsable { attempted })
}

fn whole_document(text: &str) -> Option<Value> {
    serde_json::from_str(text.trim()).ok()
}

fn balanced_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let span = balanced_span(text, start, '{', '}')?;
    serde_json::from_str(span).ok()
}

fn fenced_blocks(text: &str) -> Vec<Value> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)```").expect("fence regex is valid")
    });

    fence
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| serde_json::from_str(m.as_str().trim()).ok())
        .collect()
}

fn named_array(text: &str, key: &str) -> Option<Value> {
    let needle = format!("\"{key}\"");
    let key_at = text.find(&needle)?;
    let after_key = key_at + needle.len();
    let rest = &text[after_key..];

    let colon = rest.find(':')?;
    if !rest[..colon].trim().is_empty() {
        return None;
    }
    let bracket = colon + 1 + rest[colon + 1..].find('[')?;
    if !rest[colon + 1..bracket].trim().is_empty() {
        return None;
    }

    let span = balanced_span(text, after_key + bracket, '[', ']')?;
    serde_json::from_str(span).ok()
}

fn salvage_records(text: &str, pattern: SalvagePattern) -> Vec<Value> {
    let start_re = match Regex::new(&format!(
        r#"\{{\s*"{}"\s*:\s*"?\d+"#,
        regex::escape(pattern.id_field)
    )) {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };

    let mut records = Vec::new();
    let mut consumed_until = 0usize;
    for m in start_re.find_iter(text) {
        if m.start() < consumed_until {
            continue;
        }
        let Some(span) = balanced_span(text, m.start(), '{', '}') else {
            continue;
        };
        consumed_until = m.start() + span.len();

        let Ok(value) = serde_json::from_str::<Value>(span) else {
            continue;
        };
        if has_single_letter(&value, pattern.answer_field) {
            records.push(value);
        }
    }
    records
}

fn has_single_letter(value: &Value, field: &str) -> bool {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(|s| {
            let s = s.trim();
            s.chars().count() == 1 && s.chars().all(|c| c.is_ascii_alphabetic())
        })
        .unwrap_or(false)
}

/// Return the substring from `start` (which must hold `open`) through its
/// matching `close`, skipping delimiters inside string literals.
///
/// Returns `None` when the delimiters never balance (truncated input).
pub fn balanced_span(text: &str, start: usize, open: char, close: char) -> Option<&str> {
    if !text[start..].starts_with(open) {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (offset, ch) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if in_string {
            match ch {
                '\\' => escape_next = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        if ch == '"' {
            in_string = true;
        } else if ch == open {
            depth += 1;
        } else if ch == close {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                return Some(&text[start..start + offset + ch.len_utf8()]);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Verdict {
        selected_answer: String,
        #[serde(default)]
        is_ambiguous: bool,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Rec {
        problem_number: u32,
        correct_answer: String,
    }

    #[test]
    fn test_whole_document_wins_first() {
        let out = extract_record::<Verdict>(r#"{"selected_answer": "B", "is_ambiguous": true}"#)
            .unwrap();
        assert_eq!(out.method, ExtractionMethod::WholeDocument);
        assert!(out.value.is_ambiguous);
    }

    #[test]
    fn test_brace_scan_ignores_braces_in_strings() {
        let text = r#"Sure! Here you go: {"selected_answer": "C", "note": "use {x} and \"}\""} trailing"#;
        let out = extract_record::<Verdict>(text).unwrap();
        assert_eq!(out.method, ExtractionMethod::BalancedBraces);
        assert_eq!(out.value.selected_answer, "C");
    }

    #[test]
    fn test_fenced_block() {
        // Leading stray brace defeats the brace scan, the fence still parses.
        let text = "Note {draft\n```json\n{\"selected_answer\": \"A\"}\n```\n";
        let out = extract_record::<Verdict>(text).unwrap();
        assert_eq!(out.method, ExtractionMethod::FencedBlock);
        assert_eq!(out.value.selected_answer, "A");
    }

    #[test]
    fn test_named_array_inside_broken_wrapper() {
        let text = r#"{"meta": oops, "problems": [{"problem_number": 1, "correct_answer": "A"}, {"problem_number": 2, "correct_answer": "D"}] "#;
        let out = extract_collection::<Rec>(text, "problems", None).unwrap();
        assert_eq!(out.method, ExtractionMethod::NamedArray);
        assert_eq!(out.value.len(), 2);
        assert!(!out.is_partial());
    }

    #[test]
    fn test_bare_array_accepted_for_collection() {
        let text = r#"[{"problem_number": 1, "correct_answer": "B"}]"#;
        let out = extract_collection::<Rec>(text, "problems", None).unwrap();
        assert_eq!(out.method, ExtractionMethod::WholeDocument);
        assert_eq!(out.value[0].correct_answer, "B");
    }

    #[test]
    fn test_salvage_stops_at_truncation() {
        let text = r#"{"problems": [
            {"problem_number": 1, "question": "a {b}", "correct_answer": "A"},
            {"problem_number": 2, "question": "c", "correct_answer": "B"},
            {"problem_number": 3, "question": "trunc"#;
        let out = extract_collection::<Rec>(text, "problems", Some(ITEM_SALVAGE)).unwrap();
        assert_eq!(out.method, ExtractionMethod::Salvage);
        assert!(out.is_partial());
        let numbers: Vec<u32> = out.value.iter().map(|r| r.problem_number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn test_salvage_skips_records_without_letter_key() {
        let text = r#"[{"problem_number": 1, "correct_answer": "AB"}, {"problem_number": 2, "correct_answer": "c"}, {"problem_number": 3"#;
        let out = extract_collection::<Rec>(text, "problems", Some(ITEM_SALVAGE)).unwrap();
        assert_eq!(out.value.len(), 1);
        assert_eq!(out.value[0].problem_number, 2);
    }

    #[test]
    fn test_empty_and_garbage() {
        assert_eq!(
            extract_record::<Verdict>("   ").unwrap_err(),
            ExtractionError::Empty
        );
        match extract_collection::<Rec>("no json here", "problems", Some(ITEM_SALVAGE)) {
            Err(ExtractionError::NothingUsable { attempted }) => {
                assert_eq!(attempted.len(), 5);
                assert_eq!(attempted.last(), Some(&ExtractionMethod::Salvage));
            }
            other => panic!("expected NothingUsable, got {other:?}"),
        }
    }

    #[test]
    fn test_balanced_span_truncated() {
        assert_eq!(balanced_span(r#"{"a": {"b": 1}"#, 0, '{', '}'), None);
        assert_eq!(
            balanced_span(r#"x{"a": "}"}y"#, 1, '{', '}'),
            Some(r#"{"a": "}"}"#)
        );
    }
}
