use std::str::FromStr;

use geo::algorithm::line_intersection::line_intersection;
use geo::{AffineTransform, Area, Coord, Line, LineString, Polygon, Rect};
use serde::{Deserialize, Serialize};

const MIN_AREA: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    corners: [Coord<f64>; 4],
}

impl Quad {
    #[must_use]
    pub fn from_corners(corners: [Coord<f64>; 4]) -> Self {
        Self { corners }
    }

    /// Axis-aligned box from its top-left corner and size.
    #[must_use]
    pub fn from_rect(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::from_corners([
            Coord { x, y },
            Coord { x: x + width, y },
            Coord {
                x: x + width,
                y: y + height,
            },
            Coord { x, y: y + height },
        ])
    }

    #[must_use]
    pub fn corners(&self) -> &[Coord<f64>; 4] {
        &self.corners
    }

    /// Checks that the corners are finite and describe a simple quadrilateral
    /// with non-zero area.
    pub fn validate(&self) -> Result<(), String> {
        if self
            .corners
            .iter()
            .any(|corner| !corner.x.is_finite() || !corner.y.is_finite())
        {
            return Err("corner coordinates must be finite".to_string());
        }

        let polygon = Polygon::new(LineString::from(self.corners.to_vec()), vec![]);
        if polygon.unsigned_area() <= MIN_AREA {
            return Err("quadrilateral has zero area".to_string());
        }

        let [a, b, c, d] = self.corners;
        let crossing = line_intersection(Line::new(a, b), Line::new(c, d)).is_some()
            || line_intersection(Line::new(b, c), Line::new(d, a)).is_some();
        if crossing {
            return Err("quadrilateral edges intersect".to_string());
        }

        Ok(())
    }

    #[must_use]
    pub fn centroid(&self) -> Coord<f64> {
        let (sum_x, sum_y) = self
            .corners
            .iter()
            .fold((0.0, 0.0), |(x, y), corner| (x + corner.x, y + corner.y));
        Coord {
            x: sum_x / 4.0,
            y: sum_y / 4.0,
        }
    }

    #[must_use]
    pub fn top_left(&self) -> Coord<f64> {
        self.corners[0]
    }

    #[must_use]
    pub fn top_right(&self) -> Coord<f64> {
        self.corners[1]
    }

    #[must_use]
    pub fn top_mid(&self) -> Coord<f64> {
        let [tl, tr, ..] = self.corners;
        Coord {
            x: (tl.x + tr.x) / 2.0,
            y: (tl.y + tr.y) / 2.0,
        }
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        distance(self.corners[0], self.corners[1])
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        distance(self.corners[0], self.corners[3])
    }

    #[must_use]
    pub fn min_x(&self) -> f64 {
        self.corners.iter().map(|c| c.x).fold(f64::INFINITY, f64::min)
    }

    #[must_use]
    pub fn max_x(&self) -> f64 {
        self.corners
            .iter()
            .map(|c| c.x)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    #[must_use]
    pub fn min_y(&self) -> f64 {
        self.corners.iter().map(|c| c.y).fold(f64::INFINITY, f64::min)
    }

    #[must_use]
    pub fn max_y(&self) -> f64 {
        self.corners
            .iter()
            .map(|c| c.y)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    #[must_use]
    pub fn transformed(&self, transform: &AffineTransform<f64>) -> Self {
        Self::from_corners(self.corners.map(|corner| transform.apply(corner)))
    }
}

fn distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (b.x - a.x).hypot(b.y - a.y)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageFrame {
    rect: Rect<f64>,
}

impl PageFrame {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Result<Self, String> {
        if ![left, top, right, bottom].iter().all(|value| value.is_finite()) {
            return Err("page frame coordinates must be finite".to_string());
        }
        if right <= left || bottom <= top {
            return Err("page frame requires right>left and bottom>top".to_string());
        }
        Ok(Self {
            rect: Rect::new(Coord { x: left, y: top }, Coord { x: right, y: bottom }),
        })
    }

    /// Bounding rectangle of the given quads, `None` when there are none or
    /// they collapse to a line.
    pub fn enclosing<'a>(quads: impl IntoIterator<Item = &'a Quad>) -> Option<Self> {
        let mut bounds: Option<(f64, f64, f64, f64)> = None;
        for quad in quads {
            let (left, top, right, bottom) = bounds.unwrap_or((
                f64::INFINITY,
                f64::INFINITY,
                f64::NEG_INFINITY,
                f64::NEG_INFINITY,
            ));
            bounds = Some((
                left.min(quad.min_x()),
                top.min(quad.min_y()),
                right.max(quad.max_x()),
                bottom.max(quad.max_y()),
            ));
        }
        let (left, top, right, bottom) = bounds?;
        Self::new(left, top, right, bottom).ok()
    }

    #[must_use]
    pub fn left(&self) -> f64 {
        self.rect.min().x
    }

    #[must_use]
    pub fn right(&self) -> f64 {
        self.rect.max().x
    }

    #[must_use]
    pub fn top(&self) -> f64 {
        self.rect.min().y
    }

    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.rect.max().y
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.rect.width()
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.rect.height()
    }

    #[must_use]
    pub fn center(&self) -> Coord<f64> {
        self.rect.center()
    }
}

impl FromStr for PageFrame {
    type Err = String;

    fn from_str(frame: &str) -> Result<Self, Self::Err> {
        let values = frame
            .split(',')
            .map(|value| {
                value
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| format!("invalid page frame coordinate: '{}'", value.trim()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        match values.as_slice() {
            &[left, top, right, bottom] => Self::new(left, top, right, bottom),
            _ => Err(format!(
                "page frame needs four values left,top,right,bottom, got {}",
                values.len()
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Quadrant {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegionId {
    pub row: usize,
    pub col: usize,
}

impl RegionId {
    /// Quadrant name when the region belongs to a 2x2 partition.
    #[must_use]
    pub fn quadrant(self, partition: &Partition) -> Option<Quadrant> {
        if partition.cols != 2 || partition.rows != 2 {
            return None;
        }
        Some(match (self.row, self.col) {
            (0, 0) => Quadrant::TopLeft,
            (0, _) => Quadrant::TopRight,
            (_, 0) => Quadrant::BottomLeft,
            _ => Quadrant::BottomRight,
        })
    }
}

// Points on an interior split line belong to the right/lower region; points
// outside the frame clamp to the nearest edge region.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    frame: PageFrame,
    cols: usize,
    rows: usize,
}

impl Partition {
    #[must_use]
    pub fn grid(frame: PageFrame, cols: usize, rows: usize) -> Self {
        Self {
            frame,
            cols: cols.max(1),
            rows: rows.max(1),
        }
    }

    #[must_use]
    pub fn quadrants(frame: PageFrame) -> Self {
        Self::grid(frame, 2, 2)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cols * self.rows
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn region_ids(&self) -> Vec<RegionId> {
        (0..self.rows)
            .flat_map(|row| (0..self.cols).map(move |col| RegionId { row, col }))
            .collect()
    }

    #[must_use]
    pub fn index_of(&self, id: RegionId) -> usize {
        id.row * self.cols + id.col
    }

    #[must_use]
    pub fn region_of(&self, point: Coord<f64>) -> RegionId {
        RegionId {
            row: cell_index(point.y, self.frame.top(), self.frame.height(), self.rows),
            col: cell_index(point.x, self.frame.left(), self.frame.width(), self.cols),
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn cell_index(value: f64, start: f64, extent: f64, cells: usize) -> usize {
    let relative = ((value - start) / extent * cells as f64).floor();
    if relative <= 0.0 {
        0
    } else {
        (relative as usize).min(cells - 1)
    }
}

#[cfg(test)]
mod tests {
    use geo::{AffineTransform, Coord};

    use super::{PageFrame, Partition, Quad, Quadrant, RegionId};

    #[test]
    fn page_frame_parses_four_coordinates() {
        let frame = "0, 0, 1, 1".parse::<PageFrame>().expect("frame parses");
        assert!((frame.center().x - 0.5).abs() < 1e-12);
        assert!("0,0,1".parse::<PageFrame>().is_err());
        assert!("0,0,x,1".parse::<PageFrame>().is_err());
        assert!("1,0,0,1".parse::<PageFrame>().is_err());
    }

    #[test]
    fn rect_quad_measures() {
        let quad = Quad::from_rect(0.1, 0.2, 0.08, 0.03);
        assert!((quad.width() - 0.08).abs() < 1e-12);
        assert!((quad.height() - 0.03).abs() < 1e-12);
        assert!((quad.centroid().x - 0.14).abs() < 1e-12);
        assert!((quad.top_mid().y - 0.2).abs() < 1e-12);
        assert!(quad.validate().is_ok());
    }

    #[test]
    fn rejects_zero_area_and_bow_tie() {
        let flat = Quad::from_rect(0.0, 0.0, 1.0, 0.0);
        assert!(flat.validate().unwrap_err().contains("zero area"));

        let bow_tie = Quad::from_corners([
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 1.0 },
            Coord { x: 1.0, y: 0.0 },
            Coord { x: 0.0, y: 1.0 },
        ]);
        assert!(bow_tie.validate().is_err());
    }

    #[test]
    fn rejects_non_finite_corners() {
        let quad = Quad::from_rect(f64::NAN, 0.0, 1.0, 1.0);
        assert!(quad.validate().unwrap_err().contains("finite"));
    }

    #[test]
    fn rotation_keeps_edge_lengths() {
        let quad = Quad::from_rect(0.2, 0.2, 0.1, 0.02);
        let rotated = quad.transformed(&AffineTransform::rotate(5.0, Coord { x: 0.5, y: 0.5 }));
        assert!((rotated.width() - 0.1).abs() < 1e-12);
        assert!((rotated.height() - 0.02).abs() < 1e-12);
        assert!(rotated.top_right().y > rotated.top_left().y);
    }

    #[test]
    fn frame_encloses_quads() {
        let quads = [Quad::from_rect(0.1, 0.1, 0.1, 0.1), Quad::from_rect(0.5, 0.7, 0.2, 0.1)];
        let frame = PageFrame::enclosing(quads.iter()).expect("frame");
        assert!((frame.left() - 0.1).abs() < 1e-12);
        assert!((frame.right() - 0.7).abs() < 1e-12);
        assert!((frame.bottom() - 0.8).abs() < 1e-12);
        assert!(PageFrame::enclosing(std::iter::empty()).is_none());
    }

    #[test]
    fn quadrant_assignment_splits_on_midlines() {
        let frame = PageFrame::new(0.0, 0.0, 1.0, 1.0).expect("frame");
        let partition = Partition::quadrants(frame);

        let tl = partition.region_of(Coord { x: 0.2, y: 0.2 });
        let br = partition.region_of(Coord { x: 0.5, y: 0.5 });
        let outside = partition.region_of(Coord { x: 1.4, y: -0.3 });

        assert_eq!(tl.quadrant(&partition), Some(Quadrant::TopLeft));
        assert_eq!(br.quadrant(&partition), Some(Quadrant::BottomRight));
        assert_eq!(outside, RegionId { row: 0, col: 1 });
        assert_eq!(partition.index_of(br), 3);
    }

    #[test]
    fn wider_grids_have_no_quadrant_names() {
        let frame = PageFrame::new(0.0, 0.0, 3.0, 1.0).expect("frame");
        let partition = Partition::grid(frame, 3, 1);
        assert_eq!(partition.len(), 3);
        let id = partition.region_of(Coord { x: 2.5, y: 0.5 });
        assert_eq!(id, RegionId { row: 0, col: 2 });
        assert_eq!(id.quadrant(&partition), None);
    }
}
