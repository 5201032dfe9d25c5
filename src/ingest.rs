use std::collections::HashSet;
use std::fs;
use std::path::Path;

use geo::Coord;
use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::ReconstructError;
use crate::geometry::Quad;
use crate::model::OcrBox;

#[derive(Debug, Deserialize)]
struct RawBlock {
    id: Option<String>,
    #[serde(default)]
    text: String,
    confidence: Option<f32>,
    page: Option<u32>,
    #[serde(flatten)]
    geometry: RawGeometry,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawGeometry {
    Corners {
        coords: [[f64; 2]; 4],
    },
    Edges {
        x0: f64,
        y0: f64,
        x1: f64,
        y1: f64,
    },
    Span {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
}

impl RawGeometry {
    fn into_quad(self) -> Result<Quad, String> {
        match self {
            Self::Corners { coords } => {
                Ok(Quad::from_corners(coords.map(|[x, y]| Coord { x, y })))
            }
            Self::Edges { x0, y0, x1, y1 } => Ok(Quad::from_rect(
                x0.min(x1),
                y0.min(y1),
                (x1 - x0).abs(),
                (y1 - y0).abs(),
            )),
            Self::Span {
                x,
                y,
                width,
                height,
            } => {
                if width > 0.0 && height > 0.0 {
                    Ok(Quad::from_rect(x, y, width, height))
                } else {
                    Err(format!("width and height must be positive, got {width}x{height}"))
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct BlockOut<'a> {
    id: &'a str,
    text: &'a str,
    confidence: f32,
    page: u32,
    coords: [[f64; 2]; 4],
}

#[derive(Debug, Serialize)]
struct DocumentOut<'a> {
    blocks: Vec<BlockOut<'a>>,
}

/// Parses OCR output: either `{"blocks": [...]}` or a bare array of blocks.
pub fn parse_ocr_json(json: &str) -> Result<Vec<OcrBox>, ReconstructError> {
    let blocks = match serde_json::from_str::<Value>(json)? {
        Value::Array(blocks) => blocks,
        Value::Object(mut object) => match object.remove("blocks") {
            Some(Value::Array(blocks)) => blocks,
            _ => {
                return Err(serde_json::Error::custom("expected a \"blocks\" array").into());
            }
        },
        _ => {
            return Err(
                serde_json::Error::custom("expected an array of blocks or a blocks object").into(),
            );
        }
    };

    let mut seen = HashSet::with_capacity(blocks.len());
    let mut boxes = Vec::with_capacity(blocks.len());
    for (index, value) in blocks.into_iter().enumerate() {
        let fallback_id = format!("b{index}");
        let raw = RawBlock::deserialize(value)
            .map_err(|error| ReconstructError::invalid_box(&fallback_id, error.to_string()))?;
        let id = raw.id.unwrap_or(fallback_id);
        if !seen.insert(id.clone()) {
            return Err(ReconstructError::DuplicateBoxId(id));
        }

        let quad = raw
            .geometry
            .into_quad()
            .map_err(|reason| ReconstructError::invalid_box(&id, reason))?;
        boxes.push(OcrBox::new(
            id,
            raw.text,
            quad,
            raw.confidence.unwrap_or(1.0),
            raw.page.unwrap_or(1),
        )?);
    }

    debug!(boxes = boxes.len(), "parsed OCR blocks");
    Ok(boxes)
}

pub fn read_ocr_json(path: &Path) -> Result<Vec<OcrBox>, ReconstructError> {
    let json = fs::read_to_string(path)?;
    parse_ocr_json(&json)
}

/// Renders boxes in the corner form accepted by [`parse_ocr_json`].
pub fn blocks_to_json_string(boxes: &[OcrBox]) -> Result<String, ReconstructError> {
    let document = DocumentOut {
        blocks: boxes
            .iter()
            .map(|ocr_box| BlockOut {
                id: ocr_box.id(),
                text: ocr_box.text(),
                confidence: ocr_box.confidence(),
                page: ocr_box.page(),
                coords: (*ocr_box.quad().corners()).map(|corner| [corner.x, corner.y]),
            })
            .collect(),
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

pub fn write_blocks_json(path: &Path, boxes: &[OcrBox]) -> Result<(), ReconstructError> {
    fs::write(path, blocks_to_json_string(boxes)?)?;
    Ok(())
}
