//! Literal scan for hierarchical learning-objective identifiers.
//!
//! Pure and deterministic: no backend call. Used to seed the content analyst
//! and as its fallback when the backend returns no objectives.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::domain::LearningObjective;

/// Find every line that starts with a dotted number of four or more segments
/// (`1.1.1.1`, `2.3.1.4.2`, ...) and pair it with the rest of the line.
///
/// Order of first appearance is kept; a number seen twice keeps its first
/// description.
pub fn extract_objectives(source: &str) -> Vec<LearningObjective> {
    static OBJECTIVE_LINE: OnceLock<Regex> = OnceLock::new();
    let re = OBJECTIVE_LINE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*(\d+(?:\.\d+){3,})\.?(?:[ \t]+(.*?))?[ \t]*\r?$")
            .expect("objective regex is valid")
    });

    let mut seen = HashSet::new();
    re.captures_iter(source)
        .filter_map(|caps| {
            let number = caps.get(1)?.as_str().to_string();
            let description = caps
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
            Some(LearningObjective::new(number, description))
        })
        .filter(|objective| seen.insert(objective.number.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_four_segment_objectives_in_order() {
        let source = "\
Course outline
1.1.1.1 Define a process
  1.1.1.2 Explain scheduling
Some prose mentioning 1.1.1.3 inline is ignored
1.1.1.10 Compare schedulers
";
        let found = extract_objectives(source);
        let numbers: Vec<&str> = found.iter().map(|o| o.number.as_str()).collect();
        assert_eq!(numbers, vec!["1.1.1.1", "1.1.1.2", "1.1.1.10"]);
        assert_eq!(found[1].description, "Explain scheduling");
    }

    #[test]
    fn test_ignores_shallow_numbers_and_dedupes() {
        let source = "1.1 Chapter\n1.1.1 Section\n2.1.3.4. Deep one\n2.1.3.4 Duplicate\n3.2.1.1.5 Deeper\n";
        let found = extract_objectives(source);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].number, "2.1.3.4");
        assert_eq!(found[0].description, "Deep one");
        assert_eq!(found[1].number, "3.2.1.1.5");
    }

    #[test]
    fn test_number_without_description() {
        let found = extract_objectives("4.4.4.4\r\n");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].description, "");
    }

    #[test]
    fn test_no_objectives() {
        assert!(extract_objectives("plain text only").is_empty());
    }
}
