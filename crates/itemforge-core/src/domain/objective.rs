//! Learning objectives: hierarchical dotted identifiers plus description.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A learning objective such as `1.1.1.1 Explain the purpose of ...`.
///
/// Derived once per run and treated as immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LearningObjective {
    #[serde(alias = "objective_number", alias = "id")]
    pub number: String,
    #[serde(default, alias = "text", alias = "objective_text")]
    pub description: String,
}

impl LearningObjective {
    pub fn new(number: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            description: description.into(),
        }
    }

    /// First segment of the objective number (`"1"` for `1.2.3.4`).
    pub fn topic_number(&self) -> String {
        topic_number_of(&self.number)
    }

    /// First two segments of the objective number (`"1.2"` for `1.2.3.4`).
    pub fn subtopic_number(&self) -> String {
        subtopic_number_of(&self.number)
    }
}

/// Canonical spelling of an objective number: trimmed, no trailing dot, no
/// empty segments (`" 1.1.1.1. "` becomes `"1.1.1.1"`).
pub fn normalize_objective_number(objective_number: &str) -> String {
    segments(objective_number).collect::<Vec<_>>().join(".")
}

pub fn topic_number_of(objective_number: &str) -> String {
    segments(objective_number).take(1).collect::<Vec<_>>().join(".")
}

pub fn subtopic_number_of(objective_number: &str) -> String {
    let parts: Vec<&str> = segments(objective_number).collect();
    if parts.len() < 2 {
        return String::new();
    }
    parts[..2].join(".")
}

fn segments(number: &str) -> impl Iterator<Item = &str> {
    number
        .trim()
        .trim_end_matches('.')
        .split('.')
        .filter(|s| !s.is_empty())
}

/// Compare two dotted objective numbers segment by segment.
///
/// Numeric segments compare numerically, so `1.1.1.2 < 1.1.1.10`. Segments
/// that are not numbers fall back to string order. A missing number sorts last.
pub fn compare_objective_numbers(a: &str, b: &str) -> Ordering {
    match (a.trim().is_empty(), b.trim().is_empty()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        _ => {}
    }

    let mut left = segments(a);
    let mut right = segments(b);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(nx), Ok(ny)) => nx.cmp(&ny),
                    _ => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_and_subtopic_numbers() {
        let obj = LearningObjective::new("1.2.3.4", "Describe X");
        assert_eq!(obj.topic_number(), "1");
        assert_eq!(obj.subtopic_number(), "1.2");
        assert!(obj.subtopic_number().starts_with(&obj.topic_number()));
    }

    #[test]
    fn test_empty_number_has_no_topic() {
        let obj = LearningObjective::new("", "orphan");
        assert_eq!(obj.topic_number(), "");
        assert_eq!(obj.subtopic_number(), "");
    }

    #[test]
    fn test_numeric_segment_ordering() {
        assert_eq!(
            compare_objective_numbers("1.1.1.2", "1.1.1.10"),
            Ordering::Less
        );
        assert_eq!(
            compare_objective_numbers("2.1.1.1", "1.9.9.9"),
            Ordering::Greater
        );
        assert_eq!(
            compare_objective_numbers("1.1.1.1", "1.1.1.1."),
            Ordering::Equal
        );
    }

    #[test]
    fn test_missing_number_sorts_last() {
        assert_eq!(compare_objective_numbers("", "1.1.1.1"), Ordering::Greater);
        assert_eq!(compare_objective_numbers("9.9.9.9", ""), Ordering::Less);
    }
}
