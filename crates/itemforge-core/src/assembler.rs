//! Final assembly: sort, group, renumber and render the item set.
//!
//! Pure and deterministic. All three views come out of one traversal, so a
//! section header lands before the same item in every view.

use serde::{Deserialize, Serialize};

use crate::domain::{compare_objective_numbers, Item};

const RULE_WIDTH: usize = 80;
const ITEM_RULE_WIDTH: usize = 40;

/// The rendered exam.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembledExam {
    /// Items in final order, numbered from 1.
    pub items: Vec<Item>,
    /// Number of section headers emitted.
    pub sections: usize,
    pub problems_text: String,
    pub answers_text: String,
    pub combined_text: String,
}

/// Grouping key: a new section opens whenever it changes.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SectionKey<'a> {
    objective_number: &'a str,
    objective_text: &'a str,
    topic_number: &'a str,
    subtopic_number: &'a str,
}

impl<'a> SectionKey<'a> {
    fn of(item: &'a Item) -> Self {
        Self {
            objective_number: item.learning_objective_number.trim().trim_end_matches('.'),
            objective_text: item.learning_objective_text.trim(),
            topic_number: item.topic_number.trim(),
            subtopic_number: item.subtopic_number.trim(),
        }
    }

    fn header(&self) -> String {
        let or_dash = |s: &str| if s.is_empty() { "-".to_string() } else { s.to_string() };
        let mut header = format!(
            "Topic {} | Subtopic {} | Objective {}",
            or_dash(self.topic_number),
            or_dash(self.subtopic_number),
            if self.objective_number.is_empty() {
                "(unassigned)".to_string()
            } else {
                self.objective_number.to_string()
            }
        );
        if !self.objective_text.is_empty() {
            header.push('\n');
            header.push_str(self.objective_text);
        }
        header
    }
}

/// Sort by (objective number, item number) and renumber from 1.
pub fn order_items(items: &[Item]) -> Vec<Item> {
    let mut ordered = items.to_vec();
    ordered.sort_by(|a, b| {
        compare_objective_numbers(&a.learning_objective_number, &b.learning_objective_number)
            .then(a.number.cmp(&b.number))
    });
    for (idx, item) in ordered.iter_mut().enumerate() {
        item.number = idx as u32 + 1;
    }
    ordered
}

/// Build all three views.
pub fn assemble(items: &[Item]) -> AssembledExam {
    let items = order_items(items);
    let rule = "=".repeat(RULE_WIDTH);
    let item_rule = "-".repeat(ITEM_RULE_WIDTH);

    let mut problems = banner("EXAM PROBLEMS", &rule);
    let mut answers = banner("ANSWER KEY", &rule);
    let mut combined = banner("COMPLETE EXAM", &rule);

    let mut sections = 0;
    let mut current: Option<SectionKey<'_>> = None;
    for item in &items {
        let key = SectionKey::of(item);
        if current.as_ref() != Some(&key) {
            let header = format!("\n{rule}\n{}\n{rule}\n\n", key.header());
            problems.push_str(&header);
            answers.push_str(&header);
            combined.push_str(&header);
            sections += 1;
            current = Some(key);
        }

        let question = render_question(item);
        let answer = render_answer(item);

        problems.push_str(&question);
        problems.push_str(&format!("{item_rule}\n"));

        answers.push_str(&format!("Problem {}\n{answer}{item_rule}\n", item.number));

        combined.push_str(&question);
        combined.push('\n');
        combined.push_str(&answer);
        combined.push_str(&render_metadata(item));
        combined.push_str(&format!("{item_rule}\n"));
    }

    AssembledExam {
        sections,
        problems_text: problems,
        answers_text: answers,
        combined_text: combined,
        items,
    }
}

fn banner(title: &str, rule: &str) -> String {
    format!("{rule}\n{title}\n{rule}\n")
}

fn render_question(item: &Item) -> String {
    let mut out = format!("Problem {}\n{}\n\n", item.number, item.question.trim());
    for (key, text) in item.choices.iter() {
        out.push_str(&format!("{key}. {}\n", text.trim()));
    }
    out
}

fn render_answer(item: &Item) -> String {
    let key = item
        .correct_key()
        .map(|k| k.to_string())
        .unwrap_or_else(|| item.correct_answer.trim().to_string());
    format!("Answer: {key}\nExplanation: {}\n", item.explanation.trim())
}

fn render_metadata(item: &Item) -> String {
    let mut parts = Vec::new();
    if !item.topic.trim().is_empty() {
        parts.push(format!("Topic: {}", item.topic.trim()));
    }
    if !item.difficulty.trim().is_empty() {
        parts.push(format!("Difficulty: {}", item.difficulty.trim()));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!("{}\n", parts.join(" | "))
    }
}
