use std::collections::HashSet;

use serde::Deserialize;

/// Scores how alike two page texts are.
///
/// Implementations must be symmetric and return a value in `[0.0, 1.0]`.
/// Two texts with nothing comparable score `0.0`: blank pages are not evidence
/// of continuity.
pub trait ContentSimilarity: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f64;
}

/// Jaccard overlap of word tokens that contain at least one letter.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenOverlap;

impl ContentSimilarity for TokenOverlap {
    fn score(&self, a: &str, b: &str) -> f64 {
        jaccard(&word_tokens(a), &word_tokens(b))
    }
}

/// Jaccard overlap of consecutive word windows ("shingles").
#[derive(Debug, Clone, Copy)]
pub struct ShingleOverlap {
    pub width: usize,
}

impl ContentSimilarity for ShingleOverlap {
    fn score(&self, a: &str, b: &str) -> f64 {
        jaccard(&shingles(a, self.width), &shingles(b, self.width))
    }
}

/// Sørensen–Dice over character bigrams of the whitespace-normalized texts.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharacterBigrams;

impl ContentSimilarity for CharacterBigrams {
    fn score(&self, a: &str, b: &str) -> f64 {
        let a = squash(a);
        let b = squash(b);
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        strsim::sorensen_dice(&a, &b).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    #[default]
    TokenOverlap,
    Shingles,
    Bigrams,
}

impl SimilarityMetric {
    pub fn scorer(self, shingle_width: usize) -> Box<dyn ContentSimilarity> {
        match self {
            SimilarityMetric::TokenOverlap => Box::new(TokenOverlap),
            SimilarityMetric::Shingles => Box::new(ShingleOverlap {
                width: shingle_width.max(1),
            }),
            SimilarityMetric::Bigrams => Box::new(CharacterBigrams),
        }
    }
}

fn word_tokens(text: &str) -> HashSet<String> {
    words(text).into_iter().collect()
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().any(|c| c.is_alphabetic()))
        .map(|w| w.to_lowercase())
        .collect()
}

fn shingles(text: &str, width: usize) -> HashSet<String> {
    let words = words(text);
    if words.len() < width {
        // Short texts fall back to one shingle of everything they have.
        return if words.is_empty() {
            HashSet::new()
        } else {
            HashSet::from([words.join(" ")])
        };
    }
    words.windows(width).map(|w| w.join(" ")).collect()
}

fn squash(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    let union = a.len() + b.len() - shared;
    shared as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "Patient: Jane Roe\nComprehensive metabolic panel\nSodium 140 mmol/L";
    const B: &str = "Patient: Jane Roe\nComprehensive metabolic panel\nPotassium 4.1 mmol/L";
    const C: &str = "Operative report. Procedure: laparoscopic appendectomy.";

    fn all() -> Vec<Box<dyn ContentSimilarity>> {
        vec![
            Box::new(TokenOverlap),
            Box::new(ShingleOverlap { width: 2 }),
            Box::new(CharacterBigrams),
        ]
    }

    #[test]
    fn symmetric_and_bounded() {
        for scorer in all() {
            for (x, y) in [(A, B), (A, C), (B, C), (A, A), ("", A)] {
                let s = scorer.score(x, y);
                assert_eq!(s, scorer.score(y, x));
                assert!((0.0..=1.0).contains(&s), "score {} out of range", s);
            }
        }
    }

    #[test]
    fn related_pages_score_higher() {
        for scorer in all() {
            assert!(scorer.score(A, B) > scorer.score(A, C));
        }
    }

    #[test]
    fn identical_text_is_one() {
        assert_eq!(TokenOverlap.score(A, A), 1.0);
        assert_eq!(ShingleOverlap { width: 3 }.score(A, A), 1.0);
    }

    #[test]
    fn blank_pages_score_zero() {
        for scorer in all() {
            assert_eq!(scorer.score("", ""), 0.0);
            assert_eq!(scorer.score("  \n ", "12 34"), 0.0);
        }
    }

    #[test]
    fn numbers_ignored_by_token_overlap() {
        assert_eq!(TokenOverlap.score("glucose 99", "glucose 140"), 1.0);
    }

    #[test]
    fn metric_from_config_name() {
        #[derive(Deserialize)]
        struct Wrapper {
            metric: SimilarityMetric,
        }
        let w: Wrapper = toml::from_str(r#"metric = "bigrams""#).unwrap();
        assert_eq!(w.metric, SimilarityMetric::Bigrams);
    }
}
