use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::model::Row;
use crate::options::TerminationTokens;
use crate::similarity::{normalize, similarity_normalized};

static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"-?\d[\d,]*(?:\.\d+)?").expect("hardcoded amount regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminatorState {
    Scanning,
    Terminated,
}

/// The row that closed the table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TerminalMarker {
    pub row: Row,
    /// Position of the row among the rows handed to the terminator.
    pub index: usize,
    pub token: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grand_total: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Termination {
    pub data_rows: Vec<Row>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal: Option<TerminalMarker>,
    pub trailing: Vec<Row>,
    pub found: bool,
}

#[derive(Debug, Clone)]
pub struct TableTerminator {
    tokens: Vec<(String, String)>,
    min_similarity: f64,
}

impl TableTerminator {
    #[must_use]
    pub fn new(tokens: TerminationTokens) -> Self {
        let min_similarity = tokens.min_similarity.clamp(0.0, 1.0);
        let tokens = tokens
            .tokens
            .into_iter()
            .map(|token| {
                let normalized = normalize(&token);
                (token, normalized)
            })
            .filter(|(_, normalized)| !normalized.is_empty())
            .collect();
        Self {
            tokens,
            min_similarity,
        }
    }

    #[must_use]
    pub fn state_after(&self, rows: &[Row]) -> TerminatorState {
        if rows.iter().any(|row| self.match_row(row).is_some()) {
            TerminatorState::Terminated
        } else {
            TerminatorState::Scanning
        }
    }

    /// Splits `rows` at the first row that matches a termination token.
    pub fn terminate(&self, rows: Vec<Row>) -> Termination {
        let mut state = TerminatorState::Scanning;
        let mut data_rows = Vec::new();
        let mut terminal = None;
        let mut trailing = Vec::new();

        for (index, row) in rows.into_iter().enumerate() {
            match state {
                TerminatorState::Scanning => match self.match_row(&row) {
                    Some((token, score)) => {
                        debug!(index, token, score, "table terminated");
                        let grand_total = grand_total(&row);
                        terminal = Some(TerminalMarker {
                            row,
                            index,
                            token: token.to_string(),
                            score,
                            grand_total,
                        });
                        state = TerminatorState::Terminated;
                    }
                    None => data_rows.push(row),
                },
                TerminatorState::Terminated => trailing.push(row),
            }
        }

        Termination {
            data_rows,
            found: state == TerminatorState::Terminated,
            terminal,
            trailing,
        }
    }

    /// Best token and score for `row`, when the score clears the threshold.
    #[must_use]
    pub fn match_row(&self, row: &Row) -> Option<(&str, f64)> {
        let text = normalize(&row.text());
        let words = text.split(' ').filter(|word| !word.is_empty()).collect::<Vec<_>>();
        let box_texts = row
            .boxes
            .iter()
            .map(|corrected| normalize(&corrected.text))
            .collect::<Vec<_>>();

        self.tokens
            .iter()
            .map(|(token, normalized)| {
                let width = normalized.split(' ').count();
                let window_best = words
                    .windows(width.min(words.len()).max(1))
                    .map(|window| similarity_normalized(&window.join(" "), normalized))
                    .fold(0.0, f64::max);
                let box_best = box_texts
                    .iter()
                    .map(|text| similarity_normalized(text, normalized))
                    .fold(0.0, f64::max);
                (token.as_str(), window_best.max(box_best))
            })
            .filter(|(_, score)| *score >= self.min_similarity)
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}

/// Right-most numeric amount on the row.
fn grand_total(row: &Row) -> Option<f64> {
    row.boxes.iter().rev().find_map(|corrected| {
        AMOUNT
            .find_iter(&corrected.text)
            .filter_map(|found| found.as_str().replace(',', "").parse::<f64>().ok())
            .last()
    })
}
