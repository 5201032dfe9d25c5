use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::geometry::PageFrame;
use crate::header::Anchor;
use crate::model::Column;
use crate::options::{ColumnConfig, OuterEdge};
use crate::warning::{TableWarning, WarningCode, WarningSink};

const EDGE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WidenError {
    #[error("no columns to widen")]
    NoColumns,

    #[error("x={x} is {distance:.4} away from the nearest column, limit is {limit:.4}")]
    TooFar { x: f64, distance: f64, limit: f64 },

    #[error("widening to x={x} would break column ordering")]
    WouldOverlap { x: f64 },

    #[error("widening budget of {0} exhausted")]
    BudgetExhausted(usize),
}

/// Ordered, pairwise non-overlapping columns of one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSet {
    columns: Vec<Column>,
    frame_width: f64,
    widenings: usize,
}

impl ColumnSet {
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    #[must_use]
    pub fn widenings(&self) -> usize {
        self.widenings
    }

    /// Index of the column containing `x`.
    #[must_use]
    pub fn locate(&self, x: f64) -> Option<usize> {
        let last = self.columns.len().checked_sub(1)?;
        self.columns
            .iter()
            .enumerate()
            .position(|(index, column)| column.contains(x, index == last))
    }

    /// True when every interval is non-empty and ordered without overlap.
    #[must_use]
    pub fn is_well_ordered(&self) -> bool {
        self.columns.iter().all(|column| column.left < column.right)
            && self
                .columns
                .windows(2)
                .all(|pair| pair[0].right <= pair[1].left)
    }
}

#[derive(Debug, Clone)]
pub struct ColumnBounder {
    config: ColumnConfig,
}

impl ColumnBounder {
    #[must_use]
    pub fn new(config: ColumnConfig) -> Self {
        Self { config }
    }

    pub fn bound(
        &self,
        anchors: &[Anchor],
        frame: &PageFrame,
        warnings: &mut WarningSink,
    ) -> ColumnSet {
        let mut sorted = anchors.iter().collect::<Vec<_>>();
        sorted.sort_by(|a, b| a.x_center.total_cmp(&b.x_center));

        let mut kept: Vec<&Anchor> = Vec::with_capacity(sorted.len());
        for anchor in sorted {
            match kept.last() {
                Some(previous) if anchor.x_center <= previous.x_center => {
                    warnings.push(TableWarning::new(
                        WarningCode::AnchorDropped,
                        format!(
                            "anchor '{}' shares x={:.4} with '{}'",
                            anchor.label, anchor.x_center, previous.label
                        ),
                    ));
                }
                _ => kept.push(anchor),
            }
        }

        let (Some(first), Some(last)) = (kept.first(), kept.last()) else {
            return ColumnSet {
                columns: Vec::new(),
                frame_width: frame.width(),
                widenings: 0,
            };
        };

        let (outer_left, outer_right) = match self.config.outer_edge {
            OuterEdge::PageMargin => (frame.left().min(first.left), frame.right().max(last.right)),
            OuterEdge::HeaderPadding(padding) => (first.left - padding, last.right + padding),
        };

        let mut edges = Vec::with_capacity(kept.len() + 1);
        edges.push(outer_left.min(first.x_center));
        for pair in kept.windows(2) {
            edges.push(self.split_point(pair[0], pair[1]));
        }
        edges.push(outer_right.max(last.x_center + EDGE_EPSILON));

        let columns = kept
            .iter()
            .zip(edges.windows(2))
            .map(|(anchor, edge)| Column {
                label: anchor.label.clone(),
                left: edge[0],
                right: edge[1],
            })
            .collect::<Vec<_>>();

        debug!(columns = columns.len(), "bounded columns");
        ColumnSet {
            columns,
            frame_width: frame.width(),
            widenings: 0,
        }
    }

    fn split_point(&self, left: &Anchor, right: &Anchor) -> f64 {
        let total = left.width + right.width;
        if self.config.width_weighted && total > 0.0 {
            (left.x_center * right.width + right.x_center * left.width) / total
        } else {
            (left.x_center + right.x_center) / 2.0
        }
    }

    /// Moves the nearest column edge just far enough to contain `x`.
    ///
    /// Returns the index of the column that now holds `x`. The set is left
    /// untouched on error.
    pub fn widen_to_include(&self, set: &mut ColumnSet, x: f64) -> Result<usize, WidenError> {
        if set.columns.is_empty() {
            return Err(WidenError::NoColumns);
        }
        if !x.is_finite() {
            return Err(WidenError::WouldOverlap { x });
        }
        if let Some(index) = set.locate(x) {
            return Ok(index);
        }
        if set.widenings >= self.config.max_widenings {
            return Err(WidenError::BudgetExhausted(self.config.max_widenings));
        }

        let last = set.columns.len() - 1;
        let (index, distance) = if x < set.columns[0].left {
            (0, set.columns[0].left - x)
        } else if x > set.columns[last].right {
            (last, x - set.columns[last].right)
        } else {
            let gap = set
                .columns
                .windows(2)
                .position(|pair| x >= pair[0].right && x < pair[1].left)
                .ok_or(WidenError::WouldOverlap { x })?;
            let to_left = x - set.columns[gap].right;
            let to_right = set.columns[gap + 1].left - x;
            if to_left <= to_right {
                (gap, to_left)
            } else {
                (gap + 1, to_right)
            }
        };

        let limit = self.config.max_widen_fraction * set.frame_width;
        if distance > limit {
            return Err(WidenError::TooFar { x, distance, limit });
        }

        let previous = set.columns[index].clone();
        if x < set.columns[index].left {
            set.columns[index].left = x;
        } else {
            let ceiling = set
                .columns
                .get(index + 1)
                .map_or(f64::INFINITY, |next| next.left);
            set.columns[index].right = (x + EDGE_EPSILON).min(ceiling);
        }

        if !set.is_well_ordered() || set.locate(x) != Some(index) {
            set.columns[index] = previous;
            return Err(WidenError::WouldOverlap { x });
        }

        set.widenings += 1;
        debug!(column = index, x, distance, "widened column");
        Ok(index)
    }
}
