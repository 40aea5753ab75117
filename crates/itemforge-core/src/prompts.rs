//! Prompt builders, one per backend request kind.
//!
//! Each prompt names the exact JSON shape the reply must take. The shapes are
//! the contract; the wording around them is not.

use crate::domain::{ContentAnalysis, Item, LearningObjective, ValidationBatch};

/// Source text beyond this many characters is cut from prompts.
pub const MAX_SOURCE_CHARS: usize = 12_000;

/// A system framing plus a user request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

const JSON_ONLY: &str = "Respond with a single JSON document and nothing else.";

pub fn analysis(source: &str, hints: &[LearningObjective]) -> Prompt {
    let hint_block = if hints.is_empty() {
        "No numbered learning objectives were found by a literal scan.".to_string()
    } else {
        let lines: Vec<String> = hints
            .iter()
            .map(|o| format!("- {} {}", o.number, o.description))
            .collect();
        format!(
            "A literal scan found these numbered learning objectives:\n{}",
            lines.join("\n")
        )
    };

    Prompt {
        system: format!(
            "You are a content analyst preparing material for exam item writers. {JSON_ONLY}"
        ),
        user: format!(
            "Analyse the source content below. Classify it into topics and difficulty \
             bands and list its learning objectives with their hierarchical numbers.\n\n\
             {hint_block}\n\n\
             Required JSON shape:\n\
             {{\"summary\": \"...\", \"topics\": [\"...\"], \"difficulty_levels\": [\"easy\", \"medium\", \"hard\"], \
             \"learning_objectives\": [{{\"number\": \"1.1.1.1\", \"description\": \"...\"}}]}}\n\n\
             SOURCE CONTENT:\n{}",
            truncate_chars(source, MAX_SOURCE_CHARS)
        ),
    }
}

pub fn generation(
    analysis: &ContentAnalysis,
    objective: &LearningObjective,
    count: usize,
    source: &str,
) -> Prompt {
    Prompt {
        system: format!(
            "You are an expert exam item writer. Every item has exactly four choices \
             labelled A-D and exactly one correct answer. {JSON_ONLY}"
        ),
        user: format!(
            "Write {count} multiple-choice problem(s) assessing learning objective \
             {number}: {description}\n\n\
             Topics: {topics}\nDifficulty levels: {levels}\nContent summary: {summary}\n\n\
             Required JSON shape:\n\
             {{\"problems\": [{{\"problem_number\": 1, \"question\": \"...\", \
             \"choices\": {{\"A\": \"...\", \"B\": \"...\", \"C\": \"...\", \"D\": \"...\"}}, \
             \"correct_answer\": \"A\", \"explanation\": \"...\", \"topic\": \"...\", \
             \"difficulty\": \"medium\"}}]}}\n\n\
             SOURCE CONTENT:\n{source}",
            number = objective.number,
            description = objective.description,
            topics = analysis.topics.join(", "),
            levels = analysis.difficulty_levels.join(", "),
            summary = analysis.summary,
            source = truncate_chars(source, MAX_SOURCE_CHARS),
        ),
    }
}

pub fn semantic_check(item: &Item) -> Prompt {
    Prompt {
        system: format!(
            "You are a strict exam reviewer. Solve the problem yourself before judging it. {JSON_ONLY}"
        ),
        user: format!(
            "{}\n\nIndependently decide which choice is correct. Then say whether the \
             problem is ambiguous (more than one defensible answer) and whether the \
             stated explanation is accurate.\n\n\
             Required JSON shape:\n\
             {{\"selected_answer\": \"A\", \"is_ambiguous\": false, \
             \"explanation_accurate\": true, \"issues\": [\"...\"]}}",
            render_item(item, true)
        ),
    }
}

pub fn fix(item: &Item, analysis: &ContentAnalysis) -> Prompt {
    let choices: Vec<String> = item
        .choices
        .iter()
        .map(|(k, text)| {
            if text.trim().is_empty() {
                format!("{k}. (missing)")
            } else {
                format!("{k}. {text}")
            }
        })
        .collect();

    Prompt {
        system: format!(
            "You repair broken multiple-choice problems without changing what they assess. {JSON_ONLY}"
        ),
        user: format!(
            "This problem is structurally incomplete. Keep the question. Produce a \
             complete set of four non-empty choices, one correct answer key and an \
             explanation.\n\n\
             Learning objective {number}: {objective}\nTopic: {topic}\nContent summary: {summary}\n\n\
             Question: {question}\nCurrent choices:\n{choices}\nCurrent answer key: {answer}\n\n\
             Required JSON shape:\n\
             {{\"choices\": {{\"A\": \"...\", \"B\": \"...\", \"C\": \"...\", \"D\": \"...\"}}, \
             \"correct_answer\": \"A\", \"explanation\": \"...\"}}",
            number = item.learning_objective_number,
            objective = item.learning_objective_text,
            topic = item.topic,
            summary = analysis.summary,
            question = item.question,
            choices = choices.join("\n"),
            answer = if item.correct_answer.trim().is_empty() {
                "(missing)"
            } else {
                item.correct_answer.as_str()
            },
        ),
    }
}

pub fn review(items: &[Item], latest: Option<&ValidationBatch>) -> Prompt {
    let rendered: Vec<String> = items.iter().map(|i| render_item(i, false)).collect();
    let validation_note = match latest {
        Some(batch) if batch.invalid_count() > 0 => format!(
            "The latest validation pass still flags problems {:?}.",
            batch.invalid_numbers()
        ),
        Some(_) => "The latest validation pass flagged no problems.".to_string(),
        None => "No validation pass has run.".to_string(),
    };

    Prompt {
        system: format!(
            "You are the final reviewer of an exam item bank. Be demanding: reserve \
             \"excellent\" for sets with no remaining issues. {JSON_ONLY}"
        ),
        user: format!(
            "Review the complete set of {count} problems below for accuracy, clarity, \
             coverage of the learning objectives and consistency.\n{validation_note}\n\n\
             Required JSON shape:\n\
             {{\"overall_quality\": \"excellent|good|fair|poor\", \
             \"approval_status\": \"approved|needs_revision|rejected\", \
             \"issues\": [\"...\"], \"problems_needing_revision\": [1], \
             \"recommendations\": [\"...\"]}}\n\n{body}",
            count = items.len(),
            body = rendered.join("\n\n"),
        ),
    }
}

pub fn translate_recommendations(recommendations: &[String], item_count: usize) -> Prompt {
    let lines: Vec<String> = recommendations.iter().map(|r| format!("- {r}")).collect();
    Prompt {
        system: format!(
            "You turn review feedback into concrete per-problem edits. {JSON_ONLY}"
        ),
        user: format!(
            "The item bank has problems numbered 1 to {item_count}. Translate these \
             recommendations into specific edits. Only use fix_type values \
             \"question\", \"explanation\", \"difficulty\" or \"topic\".\n\n{}\n\n\
             Required JSON shape:\n\
             {{\"fixes\": [{{\"problem_number\": 1, \"fix_type\": \"explanation\", \"new_value\": \"...\"}}]}}",
            lines.join("\n")
        ),
    }
}

fn render_item(item: &Item, include_key: bool) -> String {
    let mut out = format!(
        "Problem {} [objective {}]\n{}\n",
        item.number, item.learning_objective_number, item.question
    );
    for (key, text) in item.choices.iter() {
        out.push_str(&format!("{key}. {text}\n"));
    }
    if include_key {
        out.push_str(&format!("Stated answer: {}\n", item.correct_answer));
    } else {
        out.push_str(&format!("Answer: {}\n", item.correct_answer));
    }
    out.push_str(&format!("Explanation: {}", item.explanation));
    out
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
