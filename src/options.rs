use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::assemble::OVERFLOW_LABEL;
use crate::error::ReconstructError;
use crate::geometry::PageFrame;
use crate::merge::{PAGE_COLUMN, ROW_COLUMN};
use crate::similarity::MatchRule;

pub const PROFILE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderLabel {
    pub canonical: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub rule: MatchRule,
}

impl HeaderLabel {
    #[must_use]
    pub fn new(canonical: &str, synonyms: &[&str]) -> Self {
        Self {
            canonical: canonical.to_string(),
            synonyms: synonyms.iter().map(ToString::to_string).collect(),
            rule: MatchRule::default(),
        }
    }

    #[must_use]
    pub fn with_rule(mut self, rule: MatchRule) -> Self {
        self.rule = rule;
        self
    }

    /// The canonical name followed by every synonym.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.canonical.as_str()).chain(self.synonyms.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderDictionary {
    pub labels: Vec<HeaderLabel>,
    #[serde(default = "default_header_similarity")]
    pub min_similarity: f64,
    #[serde(default = "default_min_distinct_labels")]
    pub min_distinct_labels: usize,
    /// Fraction of the page height, from the top, searched for the header band.
    #[serde(default = "default_search_fraction")]
    pub search_fraction: f64,
}

fn default_header_similarity() -> f64 {
    0.6
}

fn default_min_distinct_labels() -> usize {
    2
}

fn default_search_fraction() -> f64 {
    0.75
}

impl HeaderDictionary {
    #[must_use]
    pub fn new(labels: Vec<HeaderLabel>) -> Self {
        Self {
            labels,
            min_similarity: default_header_similarity(),
            min_distinct_labels: default_min_distinct_labels(),
            search_fraction: default_search_fraction(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminationTokens {
    pub tokens: Vec<String>,
    #[serde(default = "default_termination_similarity")]
    pub min_similarity: f64,
}

fn default_termination_similarity() -> f64 {
    0.8
}

impl TerminationTokens {
    #[must_use]
    pub fn new(tokens: &[&str]) -> Self {
        Self {
            tokens: tokens.iter().map(ToString::to_string).collect(),
            min_similarity: default_termination_similarity(),
        }
    }
}

/// Header and termination vocabulary for one document type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableProfile {
    pub version: u32,
    #[serde(default)]
    pub name: String,
    pub header: HeaderDictionary,
    pub termination: TerminationTokens,
}

impl TableProfile {
    #[must_use]
    pub fn freight_invoice() -> Self {
        Self {
            version: PROFILE_VERSION,
            name: "freight-invoice".to_string(),
            header: HeaderDictionary::new(vec![
                HeaderLabel::new("Quantity", &["Qty", "Units", "Unit"]),
                HeaderLabel::new("Pieces", &["Pcs", "Pc"]),
                HeaderLabel::new("Weight", &["Wt", "Wgt", "Lbs"]),
                HeaderLabel::new("Description", &["Desc", "Item", "Commodity"]),
                HeaderLabel::new("Total", &["Amount", "Amt", "Charges"]),
            ]),
            termination: TerminationTokens::new(&[
                "Total Charge",
                "Total Charges",
                "Total Chg.",
                "Grand Total",
            ]),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ReconstructError> {
        let profile: Self = serde_json::from_str(json)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<(), ReconstructError> {
        if self.version != PROFILE_VERSION {
            return Err(ReconstructError::InvalidProfile(format!(
                "unsupported profile version {}, expected {PROFILE_VERSION}",
                self.version
            )));
        }
        if self.header.labels.is_empty() {
            return Err(ReconstructError::InvalidProfile(
                "header dictionary has no labels".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for label in &self.header.labels {
            let canonical = label.canonical.trim();
            if canonical.is_empty() {
                return Err(ReconstructError::InvalidProfile(
                    "header label names must be non-empty".to_string(),
                ));
            }
            if [PAGE_COLUMN, ROW_COLUMN, OVERFLOW_LABEL]
                .iter()
                .any(|reserved| canonical.eq_ignore_ascii_case(reserved))
            {
                return Err(ReconstructError::InvalidProfile(format!(
                    "header label '{canonical}' clashes with a merged output column"
                )));
            }
            if !seen.insert(canonical.to_lowercase()) {
                return Err(ReconstructError::InvalidProfile(format!(
                    "duplicate header label '{canonical}'"
                )));
            }
        }

        check_unit_interval("header.min_similarity", self.header.min_similarity)?;
        check_unit_interval("header.search_fraction", self.header.search_fraction)?;
        check_unit_interval("termination.min_similarity", self.termination.min_similarity)?;
        if self.header.min_distinct_labels == 0 {
            return Err(ReconstructError::InvalidProfile(
                "header.min_distinct_labels must be at least 1".to_string(),
            ));
        }
        if self
            .termination
            .tokens
            .iter()
            .any(|token| token.trim().is_empty())
        {
            return Err(ReconstructError::InvalidProfile(
                "termination tokens must be non-empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for TableProfile {
    fn default() -> Self {
        Self::freight_invoice()
    }
}

fn check_unit_interval(name: &str, value: f64) -> Result<(), ReconstructError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ReconstructError::InvalidProfile(format!(
            "{name} must be in (0, 1], got {value}"
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlopeBlend {
    Mean,
    #[default]
    Weighted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlopeConfig {
    pub min_boxes_per_region: usize,
    pub blend: SlopeBlend,
    pub grid_cols: usize,
    pub grid_rows: usize,
}

impl Default for SlopeConfig {
    fn default() -> Self {
        Self {
            min_boxes_per_region: 3,
            blend: SlopeBlend::Weighted,
            grid_cols: 2,
            grid_rows: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OuterEdge {
    PageMargin,
    HeaderPadding(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnConfig {
    pub width_weighted: bool,
    pub outer_edge: OuterEdge,
    pub max_widenings: usize,
    /// Largest single edge move, as a fraction of the page width.
    pub max_widen_fraction: f64,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            width_weighted: true,
            outer_edge: OuterEdge::PageMargin,
            max_widenings: 16,
            max_widen_fraction: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowConfig {
    /// Multiplier applied to the running median box height.
    pub threshold_factor: f64,
}

impl Default for RowConfig {
    fn default() -> Self {
        Self {
            threshold_factor: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QualityMode {
    #[default]
    BestEffort,
    Strict,
    SkipAmbiguous,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSelection {
    ranges: Vec<RangeInclusive<u32>>,
}

impl PageSelection {
    pub fn parse(selection: &str) -> Result<Self, ReconstructError> {
        selection.parse().map_err(ReconstructError::InvalidPageSelection)
    }

    #[must_use]
    pub fn contains(&self, page: u32) -> bool {
        self.ranges.iter().any(|range| range.contains(&page))
    }
}

fn parse_page_number(token: &str) -> Result<u32, String> {
    match token.trim().parse::<u32>() {
        Ok(0) => Err("pages are 1-based".to_string()),
        Ok(page) => Ok(page),
        Err(_) => Err(format!("invalid page number: '{}'", token.trim())),
    }
}

impl FromStr for PageSelection {
    type Err = String;

    fn from_str(selection: &str) -> Result<Self, Self::Err> {
        let mut ranges = Vec::new();
        for token in selection.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (start, end) = match token.split_once('-') {
                Some((start, end)) => (parse_page_number(start)?, parse_page_number(end)?),
                None => {
                    let page = parse_page_number(token)?;
                    (page, page)
                }
            };
            if end < start {
                return Err(format!("invalid range '{token}': end is smaller than start"));
            }
            ranges.push(start..=end);
        }

        if ranges.is_empty() {
            return Err("page selection cannot be empty".to_string());
        }
        Ok(Self { ranges })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReconstructOptions {
    pub profile: TableProfile,
    pub slope: SlopeConfig,
    pub columns: ColumnConfig,
    pub rows: RowConfig,
    /// Page rectangle; derived from the page's boxes when absent.
    pub page_frame: Option<PageFrame>,
    pub pages: Option<PageSelection>,
    pub quality_mode: QualityMode,
}

impl ReconstructOptions {
    pub fn validate(&self) -> Result<(), ReconstructError> {
        self.profile.validate()?;
        if self.slope.min_boxes_per_region < 2 {
            return Err(ReconstructError::InvalidOption(
                "min_boxes_per_region must be at least 2".to_string(),
            ));
        }
        if self.slope.grid_cols == 0 || self.slope.grid_rows == 0 {
            return Err(ReconstructError::InvalidOption(
                "slope partition needs at least one row and column".to_string(),
            ));
        }
        if !(self.rows.threshold_factor > 0.0 && self.rows.threshold_factor.is_finite()) {
            return Err(ReconstructError::InvalidOption(
                "row threshold_factor must be positive".to_string(),
            ));
        }
        if !(self.columns.max_widen_fraction >= 0.0 && self.columns.max_widen_fraction <= 1.0) {
            return Err(ReconstructError::InvalidOption(
                "max_widen_fraction must be in [0, 1]".to_string(),
            ));
        }
        if let OuterEdge::HeaderPadding(padding) = self.columns.outer_edge {
            if !(padding >= 0.0 && padding.is_finite()) {
                return Err(ReconstructError::InvalidOption(
                    "header padding must be a non-negative number".to_string(),
                ));
            }
        }
        Ok(())
    }
}
