use tracing::debug;

use crate::columns::ColumnSet;
use crate::model::{Band, CorrectedBox, Row};
use crate::options::RowConfig;

/// Groups corrected boxes into text rows by vertical overlap.
#[derive(Debug, Clone)]
pub struct RowClusterer {
    config: RowConfig,
}

impl RowClusterer {
    #[must_use]
    pub fn new(config: RowConfig) -> Self {
        Self { config }
    }

    /// Rows ordered top to bottom, boxes inside each row left to right.
    pub fn cluster(&self, mut boxes: Vec<CorrectedBox>, columns: &ColumnSet) -> Vec<Row> {
        boxes.sort_by(|a, b| {
            let (a, b) = (a.center(), b.center());
            a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x))
        });

        let mut heights = RunningMedian::default();
        let mut rows: Vec<Row> = Vec::new();
        for corrected in boxes {
            let band = corrected.band();
            heights.insert(band.bottom - band.top);
            let threshold = self.config.threshold_factor * heights.median();

            match rows.last_mut() {
                Some(row) if row.band.overlap(&band) > threshold => {
                    row.boxes.push(corrected);
                    row.band = mean_band(&row.boxes);
                }
                _ => rows.push(Row {
                    band,
                    boxes: vec![corrected],
                }),
            }
        }

        rows.sort_by(|a, b| a.band.top.total_cmp(&b.band.top));
        let threshold = self.config.threshold_factor * heights.median();
        let mut rows = merge_close_rows(rows, threshold, columns);
        for row in &mut rows {
            row.sort_left_to_right();
        }

        debug!(rows = rows.len(), threshold, "clustered rows");
        rows
    }
}

fn merge_close_rows(rows: Vec<Row>, threshold: f64, columns: &ColumnSet) -> Vec<Row> {
    let mut merged: Vec<Row> = Vec::with_capacity(rows.len());
    for row in rows {
        match merged.last_mut() {
            Some(previous)
                if (previous.band.center() - row.band.center()).abs() < threshold
                    && !rows_collide(previous, &row, columns) =>
            {
                previous.boxes.extend(row.boxes);
                previous.band = mean_band(&previous.boxes);
            }
            _ => merged.push(row),
        }
    }
    merged
}

/// Two rows collide when some pair of their boxes sits in the same column
/// and overlaps horizontally.
fn rows_collide(upper: &Row, lower: &Row, columns: &ColumnSet) -> bool {
    upper.boxes.iter().any(|a| {
        lower.boxes.iter().any(|b| {
            let same_column = columns.is_empty()
                || columns.locate(a.center().x) == columns.locate(b.center().x);
            let horizontal = a.quad.max_x().min(b.quad.max_x()) - a.quad.min_x().max(b.quad.min_x());
            same_column && horizontal > 0.0
        })
    })
}

#[allow(clippy::cast_precision_loss)]
fn mean_band(boxes: &[CorrectedBox]) -> Band {
    let count = boxes.len().max(1) as f64;
    let (top, bottom) = boxes.iter().fold((0.0, 0.0), |(top, bottom), corrected| {
        let band = corrected.band();
        (top + band.top, bottom + band.bottom)
    });
    Band {
        top: top / count,
        bottom: bottom / count,
    }
}

#[derive(Debug, Default)]
struct RunningMedian {
    sorted: Vec<f64>,
}

impl RunningMedian {
    fn insert(&mut self, value: f64) {
        let at = self.sorted.partition_point(|existing| *existing < value);
        self.sorted.insert(at, value);
    }

    fn median(&self) -> f64 {
        let len = self.sorted.len();
        match len {
            0 => 0.0,
            _ if len % 2 == 1 => self.sorted[len / 2],
            _ => (self.sorted[len / 2 - 1] + self.sorted[len / 2]) / 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{RowClusterer, RunningMedian};
    use crate::columns::{ColumnBounder, ColumnSet};
    use crate::geometry::{PageFrame, Quad};
    use crate::header::Anchor;
    use crate::model::{CorrectedBox, OcrBox};
    use crate::options::{ColumnConfig, RowConfig};
    use crate::warning::WarningSink;

    fn boxed(id: &str, x: f64, y: f64, width: f64, height: f64) -> CorrectedBox {
        let source = OcrBox::new(id, id, Quad::from_rect(x, y, width, height), 0.9, 1)
            .expect("valid box");
        CorrectedBox::from_source(&source, *source.quad())
    }

    fn anchor(label: &str, x_center: f64) -> Anchor {
        Anchor {
            label: label.to_string(),
            x_center,
            width: 0.1,
            left: x_center - 0.05,
            right: x_center + 0.05,
            score: 1.0,
            box_id: None,
        }
    }

    fn two_columns() -> ColumnSet {
        let frame = PageFrame::new(0.0, 0.0, 1.0, 1.0).expect("valid frame");
        let mut warnings = WarningSink::for_page(1);
        ColumnBounder::new(ColumnConfig::default()).bound(
            &[anchor("Left", 0.25), anchor("Right", 0.75)],
            &frame,
            &mut warnings,
        )
    }

    fn ids(row: &crate::model::Row) -> Vec<&str> {
        row.boxes.iter().map(|corrected| corrected.id.as_str()).collect()
    }

    #[test]
    fn small_baseline_offset_stays_one_row() {
        let rows = RowClusterer::new(RowConfig::default()).cluster(
            vec![
                boxed("qty", 0.1, 0.100, 0.08, 0.03),
                boxed("desc", 0.3, 0.105, 0.08, 0.03),
                boxed("total", 0.6, 0.102, 0.08, 0.03),
            ],
            &two_columns(),
        );

        assert_eq!(rows.len(), 1);
        assert_eq!(ids(&rows[0]), vec!["qty", "desc", "total"]);
    }

    #[test]
    fn separate_lines_stay_apart_in_order() {
        let rows = RowClusterer::new(RowConfig::default()).cluster(
            vec![
                boxed("c", 0.1, 0.36, 0.08, 0.03),
                boxed("a", 0.6, 0.20, 0.08, 0.03),
                boxed("b", 0.1, 0.28, 0.08, 0.03),
                boxed("a0", 0.1, 0.20, 0.08, 0.03),
            ],
            &two_columns(),
        );

        assert_eq!(rows.len(), 3);
        assert_eq!(ids(&rows[0]), vec!["a0", "a"]);
        assert_eq!(ids(&rows[1]), vec!["b"]);
        assert_eq!(ids(&rows[2]), vec!["c"]);
        assert!(rows.windows(2).all(|pair| pair[0].band.top < pair[1].band.top));
    }

    #[test]
    fn close_rows_merge_across_columns() {
        let rows = RowClusterer::new(RowConfig::default()).cluster(
            vec![
                boxed("tall", 0.1, 0.10, 0.1, 0.10),
                boxed("short", 0.7, 0.16, 0.1, 0.03),
            ],
            &two_columns(),
        );

        assert_eq!(rows.len(), 1);
        assert_eq!(ids(&rows[0]), vec!["tall", "short"]);
    }

    #[test]
    fn close_rows_in_the_same_column_do_not_merge() {
        let rows = RowClusterer::new(RowConfig::default()).cluster(
            vec![
                boxed("tall", 0.1, 0.10, 0.1, 0.10),
                boxed("short", 0.15, 0.16, 0.1, 0.03),
            ],
            &two_columns(),
        );

        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn every_box_lands_in_exactly_one_row() {
        let boxes = (0..12_u32)
            .map(|index| {
                let column = f64::from(index % 3);
                let line = f64::from(index / 3);
                boxed(&format!("b{index}"), 0.1 + column * 0.3, 0.1 + line * 0.07, 0.08, 0.03)
            })
            .collect::<Vec<_>>();
        let rows = RowClusterer::new(RowConfig::default()).cluster(boxes, &two_columns());

        let seen = rows.iter().flat_map(ids).collect::<Vec<_>>();
        let unique = seen.iter().collect::<BTreeSet<_>>();
        assert_eq!(rows.len(), 4);
        assert_eq!(seen.len(), 12);
        assert_eq!(unique.len(), 12);
    }

    #[test]
    fn running_median_handles_even_counts() {
        let mut median = RunningMedian::default();
        assert!(median.median().abs() < f64::EPSILON);
        median.insert(0.3);
        median.insert(0.1);
        assert!((median.median() - 0.2).abs() < 1e-12);
        median.insert(0.2);
        assert!((median.median() - 0.2).abs() < 1e-12);
    }
}
