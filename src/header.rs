use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, instrument};

use crate::geometry::PageFrame;
use crate::model::{Band, CorrectedBox, HeaderCandidate};
use crate::options::{HeaderDictionary, HeaderLabel};
use crate::similarity::{normalize, score_normalized};

/// Horizontal seed for one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anchor {
    pub label: String,
    pub x_center: f64,
    pub width: f64,
    pub left: f64,
    pub right: f64,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub box_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaderRow {
    pub candidates: Vec<HeaderCandidate>,
    /// One anchor per matched label, ordered left-to-right.
    pub anchors: Vec<Anchor>,
    /// Every box inside the header band, matched or not.
    pub boxes: Vec<CorrectedBox>,
    pub band: Band,
    pub y_variance: f64,
}

impl HeaderRow {
    #[must_use]
    pub fn confidence(&self) -> f64 {
        if self.anchors.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let count = self.anchors.len() as f64;
        self.anchors.iter().map(|anchor| anchor.score).sum::<f64>() / count
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.boxes.iter().any(|corrected| corrected.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HeaderDetection {
    Found(HeaderRow),
    NotFound,
}

struct BandGroup {
    candidates: Vec<HeaderCandidate>,
    mean_y: f64,
}

impl BandGroup {
    fn distinct_labels(&self) -> usize {
        let mut labels = self
            .candidates
            .iter()
            .map(|candidate| candidate.label.as_str())
            .collect::<Vec<_>>();
        labels.sort_unstable();
        labels.dedup();
        labels.len()
    }

    fn y_variance(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let count = self.candidates.len() as f64;
        let mean = self
            .candidates
            .iter()
            .map(|candidate| candidate.corrected.center().y)
            .sum::<f64>()
            / count;
        self.candidates
            .iter()
            .map(|candidate| (candidate.corrected.center().y - mean).powi(2))
            .sum::<f64>()
            / count
    }

    fn aggregate_score(&self) -> f64 {
        self.candidates.iter().map(|candidate| candidate.score).sum()
    }

    fn top(&self) -> f64 {
        self.candidates
            .iter()
            .map(|candidate| candidate.corrected.quad.min_y())
            .fold(f64::INFINITY, f64::min)
    }

    fn band(&self) -> Band {
        let bottom = self
            .candidates
            .iter()
            .map(|candidate| candidate.corrected.quad.max_y())
            .fold(f64::NEG_INFINITY, f64::max);
        Band {
            top: self.top(),
            bottom,
        }
    }
}

/// Finds the header row by matching box texts against a [`HeaderDictionary`].
#[derive(Debug, Clone)]
pub struct HeaderDetector {
    dictionary: HeaderDictionary,
    patterns: Vec<Vec<String>>,
}

impl HeaderDetector {
    #[must_use]
    pub fn new(dictionary: HeaderDictionary) -> Self {
        let patterns = dictionary
            .labels
            .iter()
            .map(|label| label.patterns().map(normalize).collect())
            .collect();
        Self {
            dictionary,
            patterns,
        }
    }

    #[must_use]
    pub fn dictionary(&self) -> &HeaderDictionary {
        &self.dictionary
    }

    /// Best label for `text` at or above the dictionary's minimum similarity.
    #[must_use]
    pub fn best_match(&self, text: &str) -> Option<(&HeaderLabel, f64)> {
        let text = normalize(text);
        if text.is_empty() {
            return None;
        }

        let mut best: Option<(&HeaderLabel, f64)> = None;
        for (label, patterns) in self.dictionary.labels.iter().zip(&self.patterns) {
            let score = patterns
                .iter()
                .map(|pattern| score_normalized(&text, pattern, label.rule))
                .fold(0.0, f64::max);
            if score >= self.dictionary.min_similarity
                && best.is_none_or(|(_, best_score)| score > best_score)
            {
                best = Some((label, score));
            }
        }
        best
    }

    #[must_use]
    pub fn candidates(&self, boxes: &[CorrectedBox], frame: &PageFrame) -> Vec<HeaderCandidate> {
        let search_limit = frame.top() + frame.height() * self.dictionary.search_fraction;
        boxes
            .iter()
            .filter(|corrected| corrected.center().y <= search_limit)
            .filter_map(|corrected| {
                self.best_match(&corrected.text)
                    .map(|(label, score)| HeaderCandidate {
                        corrected: corrected.clone(),
                        label: label.canonical.clone(),
                        score,
                    })
            })
            .collect()
    }

    #[instrument(level = "debug", skip_all, fields(boxes = boxes.len()))]
    pub fn detect(&self, boxes: &[CorrectedBox], frame: &PageFrame) -> HeaderDetection {
        let mut candidates = self.candidates(boxes, frame);
        if candidates.len() < 2 {
            debug!(candidates = candidates.len(), "too few header candidates");
            return HeaderDetection::NotFound;
        }

        candidates.sort_by(|a, b| a.corrected.center().y.total_cmp(&b.corrected.center().y));
        let tolerance = median_height(&candidates) / 2.0;

        let mut bands: Vec<BandGroup> = Vec::new();
        for candidate in candidates {
            let y = candidate.corrected.center().y;
            match bands.last_mut() {
                Some(band) if (y - band.mean_y).abs() <= tolerance => {
                    band.candidates.push(candidate);
                    #[allow(clippy::cast_precision_loss)]
                    let count = band.candidates.len() as f64;
                    band.mean_y += (y - band.mean_y) / count;
                }
                _ => bands.push(BandGroup {
                    candidates: vec![candidate],
                    mean_y: y,
                }),
            }
        }

        let winner = bands
            .into_iter()
            .filter(|band| {
                band.candidates.len() >= 2
                    && band.distinct_labels() >= self.dictionary.min_distinct_labels
            })
            .min_by(|a, b| {
                b.distinct_labels()
                    .cmp(&a.distinct_labels())
                    .then_with(|| a.y_variance().total_cmp(&b.y_variance()))
                    .then_with(|| b.aggregate_score().total_cmp(&a.aggregate_score()))
                    .then_with(|| a.top().total_cmp(&b.top()))
            });

        let Some(winner) = winner else {
            debug!("no band reaches the minimum distinct label count");
            return HeaderDetection::NotFound;
        };

        let band = winner.band();
        let y_variance = winner.y_variance();
        let anchors = anchors_from(&winner.candidates);
        let members = boxes
            .iter()
            .filter(|corrected| band.contains(corrected.center().y))
            .cloned()
            .collect::<Vec<_>>();

        debug!(
            anchors = anchors.len(),
            members = members.len(),
            top = band.top,
            "selected header band"
        );

        HeaderDetection::Found(HeaderRow {
            candidates: winner.candidates,
            anchors,
            boxes: members,
            band,
            y_variance,
        })
    }

    /// Dictionary labels evenly spaced across the frame, for pages without a
    /// detectable header.
    #[must_use]
    pub fn default_anchors(&self, frame: &PageFrame) -> Vec<Anchor> {
        let labels = &self.dictionary.labels;
        #[allow(clippy::cast_precision_loss)]
        let width = frame.width() / labels.len().max(1) as f64;
        labels
            .iter()
            .enumerate()
            .map(|(index, label)| {
                #[allow(clippy::cast_precision_loss)]
                let left = frame.left() + index as f64 * width;
                Anchor {
                    label: label.canonical.clone(),
                    x_center: left + width / 2.0,
                    width,
                    left,
                    right: left + width,
                    score: 0.0,
                    box_id: None,
                }
            })
            .collect()
    }
}

fn median_height(candidates: &[HeaderCandidate]) -> f64 {
    let mut heights = candidates
        .iter()
        .map(|candidate| candidate.corrected.quad.height())
        .collect::<Vec<_>>();
    heights.sort_by(f64::total_cmp);
    heights.get(heights.len() / 2).copied().unwrap_or(0.0)
}

fn anchors_from(candidates: &[HeaderCandidate]) -> Vec<Anchor> {
    let mut best: BTreeMap<&str, &HeaderCandidate> = BTreeMap::new();
    for candidate in candidates {
        let slot = best.entry(candidate.label.as_str()).or_insert(candidate);
        if candidate.score > slot.score {
            *slot = candidate;
        }
    }

    let mut anchors = best
        .into_values()
        .map(|candidate| {
            let quad = &candidate.corrected.quad;
            Anchor {
                label: candidate.label.clone(),
                x_center: candidate.corrected.center().x,
                width: quad.max_x() - quad.min_x(),
                left: quad.min_x(),
                right: quad.max_x(),
                score: candidate.score,
                box_id: Some(candidate.corrected.id.clone()),
            }
        })
        .collect::<Vec<_>>();
    anchors.sort_by(|a, b| a.x_center.total_cmp(&b.x_center));
    anchors
}
