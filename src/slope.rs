use geo::{AffineTransform, Coord};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::geometry::{PageFrame, Partition, Quadrant, RegionId};
use crate::model::{CorrectedBox, OcrBox};
use crate::options::{SlopeBlend, SlopeConfig};
use crate::warning::{TableWarning, WarningCode, WarningSink};

const MIN_X_VARIANCE: f64 = 1e-18;
const MIN_ANGLE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlopeSource {
    Local,
    PageFallback,
    GlobalFit,
    Uncorrected,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionEstimate {
    pub region: RegionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quadrant: Option<Quadrant>,
    pub box_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_slope: Option<f64>,
    pub applied_slope: f64,
    pub confidence: f64,
    pub degenerate: bool,
    pub source: SlopeSource,
}

impl RegionEstimate {
    #[must_use]
    pub fn applied_angle_deg(&self) -> f64 {
        self.applied_slope.atan().to_degrees()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlopeReport {
    pub regions: Vec<RegionEstimate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_slope: Option<f64>,
    pub global_fallback: bool,
    pub pivot: Coord<f64>,
}

impl SlopeReport {
    pub(crate) fn empty() -> Self {
        Self {
            regions: Vec::new(),
            page_slope: None,
            global_fallback: false,
            pivot: Coord { x: 0.0, y: 0.0 },
        }
    }

    #[must_use]
    pub fn quadrant(&self, quadrant: Quadrant) -> Option<&RegionEstimate> {
        self.regions
            .iter()
            .find(|estimate| estimate.quadrant == Some(quadrant))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct LineFit {
    slope: f64,
    confidence: f64,
}

// Corners are measured from each box's own top midpoint, so offsets between
// text lines do not enter the fit.
fn fit_top_edges(boxes: &[&OcrBox]) -> Option<LineFit> {
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut deviations = Vec::with_capacity(boxes.len() * 2);
    for ocr_box in boxes {
        let quad = ocr_box.quad();
        let mid = quad.top_mid();
        for corner in [quad.top_left(), quad.top_right()] {
            let dx = corner.x - mid.x;
            let dy = corner.y - mid.y;
            sxx += dx * dx;
            sxy += dx * dy;
            deviations.push((dx, dy));
        }
    }

    if sxx <= MIN_X_VARIANCE {
        return None;
    }
    let slope = sxy / sxx;

    #[allow(clippy::cast_precision_loss)]
    let points = (boxes.len() * 3) as f64;
    let residual = deviations
        .iter()
        .map(|(dx, dy)| (dy - slope * dx).powi(2))
        .sum::<f64>();
    let rms = (residual / points).sqrt();

    #[allow(clippy::cast_precision_loss)]
    let count = boxes.len() as f64;
    let mean_height = boxes.iter().map(|b| b.quad().height()).sum::<f64>() / count;
    let mean_ocr = boxes.iter().map(|b| f64::from(b.confidence())).sum::<f64>() / count;
    let fit_quality = if mean_height > 0.0 {
        1.0 / (1.0 + rms / mean_height)
    } else {
        0.0
    };

    Some(LineFit {
        slope,
        confidence: mean_ocr * fit_quality,
    })
}

fn blend(estimates: &[(f64, usize, f64)], mode: SlopeBlend) -> Option<f64> {
    if estimates.is_empty() {
        return None;
    }

    #[allow(clippy::cast_precision_loss)]
    let mean = estimates.iter().map(|(slope, _, _)| slope).sum::<f64>() / estimates.len() as f64;
    match mode {
        SlopeBlend::Mean => Some(mean),
        SlopeBlend::Weighted => {
            #[allow(clippy::cast_precision_loss)]
            let weights = estimates
                .iter()
                .map(|(slope, count, confidence)| (slope, *count as f64 * confidence));
            let (sum, total) = weights.fold((0.0, 0.0), |(sum, total), (slope, weight)| {
                (sum + slope * weight, total + weight)
            });
            if total > 0.0 {
                Some(sum / total)
            } else {
                Some(mean)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SlopeCorrector {
    config: SlopeConfig,
    frame: Option<PageFrame>,
}

impl SlopeCorrector {
    #[must_use]
    pub fn new(config: SlopeConfig) -> Self {
        Self {
            config,
            frame: None,
        }
    }

    /// Fixes the page frame instead of deriving it from the boxes.
    #[must_use]
    pub fn with_frame(mut self, frame: Option<PageFrame>) -> Self {
        self.frame = frame;
        self
    }

    #[instrument(level = "debug", skip_all, fields(boxes = boxes.len()))]
    pub fn correct(
        &self,
        boxes: &[OcrBox],
        warnings: &mut WarningSink,
    ) -> (Vec<CorrectedBox>, SlopeReport) {
        let Some(frame) = self
            .frame
            .or_else(|| PageFrame::enclosing(boxes.iter().map(OcrBox::quad)))
        else {
            return (Vec::new(), SlopeReport::empty());
        };

        let partition = Partition::grid(frame, self.config.grid_cols, self.config.grid_rows);
        let assignments = boxes
            .iter()
            .map(|ocr_box| partition.index_of(partition.region_of(ocr_box.quad().centroid())))
            .collect::<Vec<_>>();

        let mut members: Vec<Vec<&OcrBox>> = vec![Vec::new(); partition.len()];
        for (ocr_box, &region) in boxes.iter().zip(&assignments) {
            members[region].push(ocr_box);
        }

        let mut regions = Vec::with_capacity(partition.len());
        let mut local = Vec::new();
        for (id, region_boxes) in partition.region_ids().into_iter().zip(&members) {
            let populated = region_boxes.len() >= self.config.min_boxes_per_region;
            let fit = if populated {
                fit_top_edges(region_boxes)
            } else {
                None
            };
            if let Some(fit) = fit {
                local.push((fit.slope, region_boxes.len(), fit.confidence));
            }
            regions.push(RegionEstimate {
                region: id,
                quadrant: id.quadrant(&partition),
                box_count: region_boxes.len(),
                local_slope: fit.map(|fit| fit.slope),
                applied_slope: 0.0,
                confidence: fit.map_or(0.0, |fit| fit.confidence),
                degenerate: populated && fit.is_none(),
                source: SlopeSource::Uncorrected,
            });
        }

        let any_populated = regions
            .iter()
            .any(|estimate| estimate.box_count >= self.config.min_boxes_per_region);
        let mut page_slope = blend(&local, self.config.blend);
        let mut global_fallback = false;

        if !any_populated {
            let everything = boxes.iter().collect::<Vec<_>>();
            match fit_top_edges(&everything) {
                Some(fit) => {
                    warnings.push(TableWarning::new(
                        WarningCode::GlobalSlopeFallback,
                        "every page region is under-populated; using one global slope fit",
                    ));
                    page_slope = Some(fit.slope);
                    global_fallback = true;
                }
                None if !boxes.is_empty() => warnings.push(TableWarning::new(
                    WarningCode::GeometryDegenerate,
                    "global slope fit is degenerate; page left uncorrected",
                )),
                None => {}
            }
        }

        for estimate in &mut regions {
            let label = region_label(estimate);
            if let Some(slope) = estimate.local_slope {
                estimate.applied_slope = slope;
                estimate.source = SlopeSource::Local;
                continue;
            }

            if estimate.degenerate {
                warnings.push(
                    TableWarning::new(
                        WarningCode::GeometryDegenerate,
                        format!("{label}: top edges have no horizontal spread; using page slope"),
                    )
                    .with_confidence(0.0),
                );
            } else if estimate.box_count > 0 && !global_fallback {
                warnings.push(TableWarning::new(
                    WarningCode::QuadrantFallback,
                    format!(
                        "{label}: {} box(es) below the minimum of {}; using page slope",
                        estimate.box_count, self.config.min_boxes_per_region
                    ),
                ));
            }

            if let Some(slope) = page_slope {
                estimate.applied_slope = slope;
                estimate.source = if global_fallback {
                    SlopeSource::GlobalFit
                } else {
                    SlopeSource::PageFallback
                };
            }
        }

        let pivot = frame.center();
        let transforms = regions
            .iter()
            .map(|estimate| {
                let angle = estimate.applied_slope.atan();
                (angle.abs() >= MIN_ANGLE)
                    .then(|| AffineTransform::rotate(-angle.to_degrees(), pivot))
            })
            .collect::<Vec<_>>();

        let corrected = boxes
            .iter()
            .zip(&assignments)
            .map(|(ocr_box, &region)| {
                let quad = match &transforms[region] {
                    Some(transform) => ocr_box.quad().transformed(transform),
                    None => *ocr_box.quad(),
                };
                CorrectedBox::from_source(ocr_box, quad)
            })
            .collect();

        debug!(
            page_slope = ?page_slope,
            global_fallback,
            regions = regions.len(),
            "estimated page skew"
        );

        (
            corrected,
            SlopeReport {
                regions,
                page_slope,
                global_fallback,
                pivot,
            },
        )
    }
}

fn region_label(estimate: &RegionEstimate) -> String {
    match estimate.quadrant {
        Some(quadrant) => format!("{quadrant:?} quadrant"),
        None => format!("region r{}c{}", estimate.region.row, estimate.region.col),
    }
}
