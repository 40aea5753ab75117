//! Exam items (multiple-choice problems) and their answer choices.
//!
//! Items are deserialized straight from backend output, so every field is
//! defaulted and a few common aliases are accepted. Structural soundness is
//! checked later by the validator, not here.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

use super::objective::{
    normalize_objective_number, subtopic_number_of, topic_number_of, LearningObjective,
};

/// One of the four answer keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChoiceKey {
    A,
    B,
    C,
    D,
}

impl ChoiceKey {
    pub const ALL: [ChoiceKey; 4] = [ChoiceKey::A, ChoiceKey::B, ChoiceKey::C, ChoiceKey::D];

    /// Parse a key the way backends tend to write it: `"B"`, `"b"`, `"B)"`, `"(b)"`, `"B."`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw
            .trim()
            .trim_start_matches('(')
            .trim_end_matches([')', '.', ':'])
            .trim();
        let mut chars = trimmed.chars();
        let first = chars.next()?;
        if chars.next().is_some() {
            return None;
        }
        match first.to_ascii_uppercase() {
            'A' => Some(ChoiceKey::A),
            'B' => Some(ChoiceKey::B),
            'C' => Some(ChoiceKey::C),
            'D' => Some(ChoiceKey::D),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChoiceKey::A => "A",
            ChoiceKey::B => "B",
            ChoiceKey::C => "C",
            ChoiceKey::D => "D",
        }
    }
}

impl std::fmt::Display for ChoiceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fixed-size answer-key to choice-text mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Choices {
    #[serde(rename = "A")]
    pub a: String,
    #[serde(rename = "B")]
    pub b: String,
    #[serde(rename = "C")]
    pub c: String,
    #[serde(rename = "D")]
    pub d: String,
}

impl Choices {
    pub fn new(
        a: impl Into<String>,
        b: impl Into<String>,
        c: impl Into<String>,
        d: impl Into<String>,
    ) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
            c: c.into(),
            d: d.into(),
        }
    }

    pub fn get(&self, key: ChoiceKey) -> &str {
        match key {
            ChoiceKey::A => &self.a,
            ChoiceKey::B => &self.b,
            ChoiceKey::C => &self.c,
            ChoiceKey::D => &self.d,
        }
    }

    pub fn set(&mut self, key: ChoiceKey, text: impl Into<String>) {
        let slot = match key {
            ChoiceKey::A => &mut self.a,
            ChoiceKey::B => &mut self.b,
            ChoiceKey::C => &mut self.c,
            ChoiceKey::D => &mut self.d,
        };
        *slot = text.into();
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChoiceKey, &str)> {
        ChoiceKey::ALL.into_iter().map(move |k| (k, self.get(k)))
    }

    /// Keys whose choice text is empty or whitespace.
    pub fn empty_keys(&self) -> Vec<ChoiceKey> {
        self.iter()
            .filter(|(_, text)| text.trim().is_empty())
            .map(|(k, _)| k)
            .collect()
    }
}

impl<'de> Deserialize<'de> for Choices {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        choices_from_value(&value).map_err(de::Error::custom)
    }
}

/// Accepts `{"A": "..", ...}` (any key spelling `ChoiceKey::parse` understands)
/// or a positional array of strings.
fn choices_from_value(value: &serde_json::Value) -> std::result::Result<Choices, String> {
    let mut choices = Choices::default();
    match value {
        serde_json::Value::Object(map) => {
            for (raw_key, text) in map {
                if let (Some(key), Some(text)) = (ChoiceKey::parse(raw_key), text.as_str()) {
                    choices.set(key, text.trim());
                }
            }
        }
        serde_json::Value::Array(entries) => {
            for (key, text) in ChoiceKey::ALL.into_iter().zip(entries) {
                if let Some(text) = text.as_str() {
                    choices.set(key, text.trim());
                }
            }
        }
        serde_json::Value::Null => {}
        other => return Err(format!("choices must be an object or array, got {other}")),
    }
    Ok(choices)
}

/// A multiple-choice exam item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Item {
    #[serde(
        rename = "problem_number",
        alias = "number",
        alias = "id",
        deserialize_with = "lenient_u32"
    )]
    pub number: u32,
    pub question: String,
    pub choices: Choices,
    #[serde(alias = "answer", alias = "correct_key")]
    pub correct_answer: String,
    pub explanation: String,
    pub topic: String,
    pub difficulty: String,
    pub learning_objective_number: String,
    pub learning_objective_text: String,
    pub topic_number: String,
    pub subtopic_number: String,
}

impl Item {
    /// The correct key, if `correct_answer` names one of A-D.
    pub fn correct_key(&self) -> Option<ChoiceKey> {
        ChoiceKey::parse(&self.correct_answer)
    }

    /// Rewrite a leniently spelled key (`"(b)"`, `"c."`) as its canonical
    /// letter. Unparseable keys are left for the validator to flag.
    pub fn canonicalize_answer(&mut self) {
        if let Some(key) = self.correct_key() {
            if self.correct_answer != key.as_str() {
                self.correct_answer = key.to_string();
            }
        }
    }

    /// Stamp every denormalized objective field from `objective`.
    pub fn link_objective(&mut self, objective: &LearningObjective) {
        self.learning_objective_number = normalize_objective_number(&objective.number);
        self.learning_objective_text = objective.description.clone();
        self.topic_number = topic_number_of(&objective.number);
        self.subtopic_number = subtopic_number_of(&objective.number);
    }

    /// Both the objective number and text are present.
    pub fn has_objective_linkage(&self) -> bool {
        !self.learning_objective_number.trim().is_empty()
            && !self.learning_objective_text.trim().is_empty()
    }

    /// Normalized question text used to recognise repeats across attempts.
    pub fn question_fingerprint(&self) -> String {
        self.question
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

fn lenient_u32<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).unwrap_or(0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}
