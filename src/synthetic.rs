use geo::{AffineTransform, Coord};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::ReconstructError;
use crate::geometry::Quad;
use crate::model::OcrBox;

const COLUMN_START: f64 = 0.1;
const COLUMN_STEP: f64 = 0.15;
const HEADER_Y: f64 = 0.1;
const ROW_START: f64 = 0.2;
const ROW_STEP: f64 = 0.08;
const BOX_WIDTH: f64 = 0.08;
const BOX_HEIGHT: f64 = 0.03;
const PAGE_CENTER: Coord<f64> = Coord { x: 0.5, y: 0.5 };

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Skew {
    None,
    /// Whole page rotated by this many degrees about the page center.
    Uniform(f64),
    /// Each quadrant rotated about the page center by its own random angle.
    /// Top-left and bottom-right draw from `[-max_deg, 0]`, top-right and
    /// bottom-left from `[0, max_deg]`.
    PerQuadrant { max_deg: f64, seed: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub page: u32,
}

impl SyntheticTable {
    #[must_use]
    pub fn new(headers: &[&str], rows: &[&[&str]]) -> Self {
        Self {
            headers: headers.iter().map(ToString::to_string).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(ToString::to_string).collect())
                .collect(),
            page: 1,
        }
    }

    /// A small freight invoice closed by a "Total Charge" row.
    #[must_use]
    pub fn freight_sample() -> Self {
        Self::new(
            &["Units", "Pieces", "Weight", "Description", "Total"],
            &[
                &["10", "2", "450", "Steel pipe", "400.00"],
                &["4", "1", "120", "Valves", "1,250.00"],
                &["1", "1", "80", "Gaskets", "95.00"],
                &["6", "3", "900", "Copper wire", "2,105.00"],
                &["", "", "", "Total Charge", "3850"],
            ],
        )
    }

    #[must_use]
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn boxes(&self, skew: Skew) -> Result<Vec<OcrBox>, ReconstructError> {
        let angles = match skew {
            Skew::None | Skew::Uniform(_) => [0.0; 4],
            Skew::PerQuadrant { max_deg, seed } => {
                let mut rng = StdRng::seed_from_u64(seed);
                let spread = max_deg.abs();
                // Indexed top-left, top-right, bottom-left, bottom-right.
                std::array::from_fn(|quadrant| {
                    let angle = rng.random_range(0.0..=spread);
                    if quadrant == 0 || quadrant == 3 { -angle } else { angle }
                })
            }
        };

        let header = std::iter::once((HEADER_Y, "h".to_string(), &self.headers));
        let rows = self.rows.iter().enumerate().map(|(index, row)| {
            #[allow(clippy::cast_precision_loss)]
            let y = ROW_START + index as f64 * ROW_STEP;
            (y, format!("r{index}"), row)
        });

        let mut boxes = Vec::new();
        for (y, prefix, cells) in header.chain(rows) {
            for (column, text) in cells.iter().enumerate() {
                if text.trim().is_empty() {
                    continue;
                }
                #[allow(clippy::cast_precision_loss)]
                let x = COLUMN_START + column as f64 * COLUMN_STEP;
                let quad = Quad::from_rect(x, y, BOX_WIDTH, BOX_HEIGHT);
                let quad = match skew {
                    Skew::None => quad,
                    Skew::Uniform(deg) => quad.transformed(&rotation(deg)),
                    Skew::PerQuadrant { .. } => {
                        let center = quad.centroid();
                        let quadrant = usize::from(center.x >= 0.5) + 2 * usize::from(center.y >= 0.5);
                        quad.transformed(&rotation(angles[quadrant]))
                    }
                };
                boxes.push(OcrBox::new(
                    format!("p{}-{prefix}c{column}", self.page),
                    text.as_str(),
                    quad,
                    0.95,
                    self.page,
                )?);
            }
        }
        Ok(boxes)
    }
}

fn rotation(degrees: f64) -> AffineTransform<f64> {
    AffineTransform::rotate(degrees, PAGE_CENTER)
}

#[cfg(test)]
mod tests {
    use super::{Skew, SyntheticTable};

    #[test]
    fn one_box_per_non_empty_cell() {
        let boxes = SyntheticTable::freight_sample()
            .boxes(Skew::None)
            .expect("sample boxes are valid");
        assert_eq!(boxes.len(), 5 + 4 * 5 + 2);
        assert!(boxes.iter().all(|ocr_box| ocr_box.page() == 1));
    }

    #[test]
    fn uniform_skew_tilts_top_edges() {
        let boxes = SyntheticTable::freight_sample()
            .with_page(2)
            .boxes(Skew::Uniform(5.0))
            .expect("skewed boxes are valid");
        let top = boxes[0].quad().corners();
        let angle = (top[1].y - top[0].y).atan2(top[1].x - top[0].x).to_degrees();
        assert!((angle.abs() - 5.0).abs() < 1e-6);
        assert!(boxes[0].id().starts_with("p2-"));
    }

    #[test]
    fn per_quadrant_skew_is_seeded() {
        let table = SyntheticTable::freight_sample();
        let skew = Skew::PerQuadrant {
            max_deg: 3.0,
            seed: 7,
        };
        let first = table.boxes(skew).expect("valid boxes");
        let second = table.boxes(skew).expect("valid boxes");
        assert_eq!(first, second);
    }

    #[test]
    fn per_quadrant_skew_alternates_sign_about_the_page_center() {
        let boxes = SyntheticTable::freight_sample()
            .boxes(Skew::PerQuadrant {
                max_deg: 4.0,
                seed: 3,
            })
            .expect("valid boxes");
        let angle_of = |id: &str| {
            let ocr_box = boxes
                .iter()
                .find(|ocr_box| ocr_box.id() == id)
                .expect("box exists");
            let top = ocr_box.quad().corners();
            (top[1].y - top[0].y).atan2(top[1].x - top[0].x).to_degrees()
        };

        // Header cell 0 is top-left, header cell 4 top-right, the grand total bottom-right.
        assert!((-4.0..=0.0).contains(&angle_of("p1-hc0")));
        assert!((0.0..=4.0).contains(&angle_of("p1-hc4")));
        assert!((-4.0..=0.0).contains(&angle_of("p1-r4c4")));
    }
}
