use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use super::error::SegmentError;

pub type CategoryCode = u32;

pub const UNCLASSIFIED: CategoryCode = 0;

/// One `(pattern, code)` entry of the category table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub pattern: String,
    pub code: CategoryCode,
}

impl CategoryRule {
    pub fn new(pattern: &str, code: CategoryCode) -> Self {
        Self {
            pattern: pattern.to_string(),
            code,
        }
    }
}

/// Ordered, first-match-wins. Specific phrases sit above the bare words they contain.
const DEFAULT_RULES: &[(&str, CategoryCode)] = &[
    ("Laboratory Report", 24),
    ("Lab Report", 24),
    ("Lab Results", 24),
    ("Laboratory", 24),
    ("Discharge Summary", 17),
    ("Discharge", 17),
    ("Operative Report", 19),
    ("Operative", 19),
    ("Surgical", 19),
    ("Surgery", 19),
    ("Radiology", 20),
    ("X-Ray", 20),
    ("Imaging", 20),
    ("Pathology", 21),
    ("Consultation", 18),
    ("Consult", 18),
    ("Emergency Department", 22),
    ("Emergency Room", 22),
    ("Emergency", 22),
    ("Pharmacy", 23),
    ("Medication List", 23),
    ("Prescription", 23),
    ("Progress Note", 16),
    ("Clinical Note", 16),
    ("Office Visit", 16),
    ("Progress", 16),
];

pub fn default_rules() -> Vec<CategoryRule> {
    DEFAULT_RULES
        .iter()
        .map(|(pattern, code)| CategoryRule::new(pattern, *code))
        .collect()
}

/// Default number of leading body characters consulted when the header is silent.
pub const DEFAULT_BODY_WINDOW: usize = 500;

struct CompiledRule {
    matcher: Regex,
    code: CategoryCode,
}

pub struct CategoryTable {
    rules: Vec<CompiledRule>,
    body_window: usize,
}

impl CategoryTable {
    pub fn new(rules: &[CategoryRule], body_window: usize) -> Result<Self, SegmentError> {
        let rules = rules
            .iter()
            .map(|rule| {
                let words: Vec<&str> = rule.pattern.split_whitespace().collect();
                if words.is_empty() {
                    return Err(SegmentError::Config(format!(
                        "category {} has an empty pattern",
                        rule.code
                    )));
                }
                let body = words
                    .iter()
                    .map(|w| regex::escape(w))
                    .collect::<Vec<_>>()
                    .join(r"\s+");
                let matcher = RegexBuilder::new(&format!(r"(?:^|[^\w]){}(?:$|[^\w])", body))
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| SegmentError::Config(format!("pattern {:?}: {}", rule.pattern, e)))?;
                Ok(CompiledRule {
                    matcher,
                    code: rule.code,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules, body_window })
    }

    /// Header first; body text only when no rule matches the header.
    pub fn classify(&self, header: &str, raw_text: &str) -> CategoryCode {
        let header = normalize(header);
        if let Some(code) = self.first_match(&header) {
            return code;
        }
        let body = normalize(window(raw_text, self.body_window));
        self.first_match(&body).unwrap_or(UNCLASSIFIED)
    }

    fn first_match(&self, text: &str) -> Option<CategoryCode> {
        if text.is_empty() {
            return None;
        }
        self.rules
            .iter()
            .find(|rule| rule.matcher.is_match(text))
            .map(|rule| rule.code)
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn window(text: &str, chars: usize) -> &str {
    match text.char_indices().nth(chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_table() -> CategoryTable {
        CategoryTable::new(&default_rules(), DEFAULT_BODY_WINDOW).unwrap()
    }

    #[test]
    fn header_rules() {
        let table = default_table();
        assert_eq!(table.classify("Laboratory Report", ""), 24);
        assert_eq!(table.classify("PROGRESS NOTE", ""), 16);
        assert_eq!(table.classify("discharge   summary", ""), 17);
        assert_eq!(table.classify("Chest X-Ray", ""), 20);
    }

    #[test]
    fn header_wins_over_body() {
        let table = default_table();
        let code = table.classify("Progress Note", "See attached laboratory report.");
        assert_eq!(code, 16);
    }

    #[test]
    fn body_fallback() {
        let table = default_table();
        assert_eq!(table.classify("", "Patient seen for\nconsultation today"), 18);
    }

    #[test]
    fn body_window_limits_scan() {
        let table = CategoryTable::new(&default_rules(), 20).unwrap();
        let text = format!("{}Radiology", "x ".repeat(30));
        assert_eq!(table.classify("", &text), UNCLASSIFIED);
    }

    #[test]
    fn whole_words_only() {
        let table = default_table();
        // "Consulted" must not fire the "Consult" rule.
        assert_eq!(table.classify("", "Patient was consulted by phone"), UNCLASSIFIED);
        assert_eq!(table.classify("", ""), UNCLASSIFIED);
    }

    #[test]
    fn first_rule_wins() {
        let rules = vec![CategoryRule::new("note", 99), CategoryRule::new("progress note", 16)];
        let table = CategoryTable::new(&rules, DEFAULT_BODY_WINDOW).unwrap();
        assert_eq!(table.classify("Progress Note", ""), 99);
    }

    #[test]
    fn extra_rules_are_additive() {
        let mut rules = default_rules();
        rules.push(CategoryRule::new("Immunization Record", 30));
        let table = CategoryTable::new(&rules, DEFAULT_BODY_WINDOW).unwrap();
        assert_eq!(table.classify("IMMUNIZATION  RECORD", ""), 30);
    }

    #[test]
    fn empty_pattern_rejected() {
        let rules = vec![CategoryRule::new("   ", 5)];
        assert!(matches!(
            CategoryTable::new(&rules, DEFAULT_BODY_WINDOW),
            Err(SegmentError::Config(_))
        ));
    }
}
