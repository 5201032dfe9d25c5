use geo::Coord;
use serde::Serialize;

use crate::error::ReconstructError;
use crate::geometry::Quad;

/// One validated OCR detection. Construct with [`OcrBox::new`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrBox {
    id: String,
    text: String,
    quad: Quad,
    confidence: f32,
    page: u32,
}

impl OcrBox {
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        quad: Quad,
        confidence: f32,
        page: u32,
    ) -> Result<Self, ReconstructError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ReconstructError::invalid_box(&id, "box id must not be empty"));
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ReconstructError::invalid_box(
                &id,
                format!("confidence {confidence} is outside [0, 1]"),
            ));
        }
        if page == 0 {
            return Err(ReconstructError::invalid_box(&id, "pages are 1-based"));
        }
        quad.validate()
            .map_err(|reason| ReconstructError::invalid_box(&id, reason))?;

        Ok(Self {
            id,
            text: text.into(),
            quad,
            confidence,
            page,
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn quad(&self) -> &Quad {
        &self.quad
    }

    #[must_use]
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    #[must_use]
    pub fn page(&self) -> u32 {
        self.page
    }
}

/// A box after slope correction. Only the quad differs from the source box.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectedBox {
    pub id: String,
    pub text: String,
    pub quad: Quad,
    pub confidence: f32,
    pub page: u32,
}

impl CorrectedBox {
    #[must_use]
    pub fn from_source(source: &OcrBox, quad: Quad) -> Self {
        Self {
            id: source.id.clone(),
            text: source.text.clone(),
            quad,
            confidence: source.confidence,
            page: source.page,
        }
    }

    #[must_use]
    pub fn center(&self) -> Coord<f64> {
        self.quad.centroid()
    }

    #[must_use]
    pub fn band(&self) -> Band {
        Band {
            top: self.quad.min_y(),
            bottom: self.quad.max_y(),
        }
    }
}

/// A vertical extent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Band {
    pub top: f64,
    pub bottom: f64,
}

impl Band {
    #[must_use]
    pub fn center(&self) -> f64 {
        (self.top + self.bottom) / 2.0
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    /// Length of the shared extent; negative when the bands are apart.
    #[must_use]
    pub fn overlap(&self, other: &Band) -> f64 {
        self.bottom.min(other.bottom) - self.top.max(other.top)
    }

    #[must_use]
    pub fn contains(&self, y: f64) -> bool {
        (self.top..=self.bottom).contains(&y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaderCandidate {
    pub corrected: CorrectedBox,
    pub label: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub label: String,
    pub left: f64,
    pub right: f64,
}

impl Column {
    /// Half-open containment; `closed_right` is set for the last column.
    #[must_use]
    pub fn contains(&self, x: f64, closed_right: bool) -> bool {
        x >= self.left && (x < self.right || (closed_right && x <= self.right))
    }

    #[must_use]
    pub fn center(&self) -> f64 {
        (self.left + self.right) / 2.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub boxes: Vec<CorrectedBox>,
    pub band: Band,
}

impl Row {
    /// Box texts joined left-to-right with single spaces.
    #[must_use]
    pub fn text(&self) -> String {
        self.boxes
            .iter()
            .map(|corrected| corrected.text.trim())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub(crate) fn sort_left_to_right(&mut self) {
        self.boxes
            .sort_by(|a, b| a.center().x.total_cmp(&b.center().x));
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Cell {
    pub label: String,
    pub text: String,
    pub box_ids: Vec<String>,
}

impl Cell {
    #[must_use]
    pub fn empty(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub(crate) fn push(&mut self, corrected: &CorrectedBox) {
        let text = corrected.text.trim();
        if !text.is_empty() {
            if !self.text.is_empty() {
                self.text.push(' ');
            }
            self.text.push_str(text);
        }
        self.box_ids.push(corrected.id.clone());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.box_ids.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledRow {
    pub cells: Vec<Cell>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overflow: Option<Cell>,
    pub needs_review: bool,
    pub band: Band,
}

impl AssembledRow {
    #[must_use]
    pub fn cell(&self, label: &str) -> Option<&Cell> {
        self.cells.iter().find(|cell| cell.label == label)
    }

    /// Text of the named column, empty when the column holds no box.
    #[must_use]
    pub fn text(&self, label: &str) -> &str {
        self.cell(label).map_or("", |cell| cell.text.as_str())
    }

    pub fn box_ids(&self) -> impl Iterator<Item = &str> {
        self.cells
            .iter()
            .chain(self.overflow.iter())
            .flat_map(|cell| cell.box_ids.iter().map(String::as_str))
    }
}

/// Flat CSV view of every table in a document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MergedOutput {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub table_count: usize,
    pub row_count: usize,
}
