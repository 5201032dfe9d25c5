use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("hardcoded separator regex is valid"));

/// How a box text is compared with one synonym.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchRule {
    Exact,
    Fuzzy {
        #[serde(default = "default_max_edits")]
        max_edits: usize,
    },
    TokenSet,
}

fn default_max_edits() -> usize {
    2
}

impl Default for MatchRule {
    fn default() -> Self {
        Self::Fuzzy {
            max_edits: default_max_edits(),
        }
    }
}

/// Lowercases and collapses every run of non-alphanumeric characters to one space.
#[must_use]
pub fn normalize(text: &str) -> String {
    NON_ALNUM
        .replace_all(&text.to_lowercase(), " ")
        .trim()
        .to_string()
}

/// Score in [0, 1] of `text` against `pattern`; both are normalized first.
#[must_use]
pub fn score(text: &str, pattern: &str, rule: MatchRule) -> f64 {
    score_normalized(&normalize(text), &normalize(pattern), rule)
}

pub(crate) fn score_normalized(text: &str, pattern: &str, rule: MatchRule) -> f64 {
    if text.is_empty() || pattern.is_empty() {
        return 0.0;
    }
    if text == pattern {
        return 1.0;
    }

    match rule {
        MatchRule::Exact => 0.0,
        MatchRule::Fuzzy { max_edits } => {
            let edits = strsim::levenshtein(text, pattern);
            if edits > max_edits {
                return 0.0;
            }
            edit_similarity(text, pattern, edits)
        }
        MatchRule::TokenSet => {
            let left = text.split(' ').collect::<BTreeSet<_>>();
            let right = pattern.split(' ').collect::<BTreeSet<_>>();
            let shared = left.intersection(&right).count();
            let union = left.union(&right).count();
            ratio(shared, union)
        }
    }
}

/// Normalized Levenshtein similarity without an edit cap.
pub(crate) fn similarity_normalized(text: &str, pattern: &str) -> f64 {
    if text.is_empty() || pattern.is_empty() {
        return 0.0;
    }
    edit_similarity(text, pattern, strsim::levenshtein(text, pattern))
}

fn edit_similarity(text: &str, pattern: &str, edits: usize) -> f64 {
    let longest = text.chars().count().max(pattern.chars().count());
    1.0 - ratio(edits, longest)
}

#[allow(clippy::cast_precision_loss)]
fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
