mod assemble;
mod columns;
mod csv_out;
mod error;
mod geometry;
mod header;
mod ingest;
mod merge;
mod model;
mod options;
mod rows;
mod similarity;
mod slope;
mod synthetic;
mod terminator;
mod warning;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::csv_out::{write_csv, write_csv_to_string};
use crate::merge::merge_tables;

pub use assemble::{Assembly, OVERFLOW_LABEL, TableAssembler};
pub use columns::{ColumnBounder, ColumnSet, WidenError};
pub use error::ReconstructError;
pub use geometry::{PageFrame, Partition, Quad, Quadrant, RegionId};
pub use header::{Anchor, HeaderDetection, HeaderDetector, HeaderRow};
pub use ingest::{blocks_to_json_string, parse_ocr_json, read_ocr_json, write_blocks_json};
pub use model::{
    AssembledRow, Band, Cell, Column, CorrectedBox, HeaderCandidate, MergedOutput, OcrBox, Row,
};
pub use options::{
    ColumnConfig, HeaderDictionary, HeaderLabel, OuterEdge, PROFILE_VERSION, PageSelection,
    QualityMode, ReconstructOptions, RowConfig, SlopeBlend, SlopeConfig, TableProfile,
    TerminationTokens,
};
pub use rows::RowClusterer;
pub use similarity::{MatchRule, normalize, score};
pub use slope::{RegionEstimate, SlopeCorrector, SlopeReport, SlopeSource};
pub use synthetic::{Skew, SyntheticTable};
pub use terminator::{TableTerminator, TerminalMarker, Termination, TerminatorState};
pub use warning::{TableWarning, WarningCode, WarningSink};

pub const LOW_CONFIDENCE_THRESHOLD: f32 = 0.60;

const HEADER_WEIGHT: f64 = 0.6;
const TERMINATION_WEIGHT: f64 = 0.2;
const PLACEMENT_WEIGHT: f64 = 0.2;

/// The reconstructed table of one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<HeaderRow>,
    pub columns: Vec<Column>,
    pub rows: Vec<AssembledRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal: Option<TerminalMarker>,
    /// Rows below the terminating row.
    pub trailing: Vec<Row>,
    /// Boxes above the header band.
    pub preamble_box_ids: Vec<String>,
    pub terminator_found: bool,
    pub possibly_trailing_content: bool,
    pub low_confidence: bool,
    pub confidence: f32,
    pub column_widenings: usize,
    pub slope: SlopeReport,
    pub warnings: Vec<TableWarning>,
}

impl Table {
    pub(crate) fn empty(page: u32) -> Self {
        Self {
            page,
            header: None,
            columns: Vec::new(),
            rows: Vec::new(),
            terminal: None,
            trailing: Vec::new(),
            preamble_box_ids: Vec::new(),
            terminator_found: false,
            possibly_trailing_content: false,
            low_confidence: true,
            confidence: 0.0,
            column_widenings: 0,
            slope: SlopeReport::empty(),
            warnings: Vec::new(),
        }
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.label.as_str())
    }

    #[must_use]
    pub fn needs_review(&self) -> bool {
        self.rows.iter().any(|row| row.needs_review)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentReport {
    pub tables: Vec<Table>,
    pub warnings: Vec<TableWarning>,
}

impl DocumentReport {
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.tables.iter().map(|table| table.rows.len()).sum()
    }

    #[must_use]
    pub fn merged(&self) -> MergedOutput {
        merge_tables(&self.tables)
    }

    pub fn to_csv_string(&self, delimiter: u8) -> Result<String, ReconstructError> {
        write_csv_to_string(&self.merged(), delimiter)
    }

    pub fn write_csv(&self, path: &Path, delimiter: u8) -> Result<(), ReconstructError> {
        write_csv(path, &self.merged(), delimiter)
    }

    pub fn to_json_string(&self) -> Result<String, ReconstructError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionReport {
    pub row_count: usize,
    pub table_count: usize,
    pub warnings: Vec<TableWarning>,
}

impl ExtractionReport {
    fn from_document(document: DocumentReport) -> Self {
        Self {
            row_count: document.row_count(),
            table_count: document
                .tables
                .iter()
                .filter(|table| !table.rows.is_empty())
                .count(),
            warnings: document.warnings,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv { delimiter: u8 },
    Json,
}

/// Rebuilds the table of a single page. Every box must carry the same page number.
pub fn reconstruct_page(
    boxes: &[OcrBox],
    options: &ReconstructOptions,
) -> Result<Table, ReconstructError> {
    options.validate()?;
    let page = boxes.first().map_or(1, OcrBox::page);
    if let Some(stray) = boxes.iter().find(|ocr_box| ocr_box.page() != page) {
        return Err(ReconstructError::InvalidOption(format!(
            "box '{}' is on page {}, expected every box on page {page}",
            stray.id(),
            stray.page()
        )));
    }
    Ok(run_page(page, boxes, options))
}

#[instrument(level = "debug", skip(boxes, options), fields(boxes = boxes.len()))]
fn run_page(page: u32, boxes: &[OcrBox], options: &ReconstructOptions) -> Table {
    let mut warnings = WarningSink::for_page(page);

    let (corrected, slope) = SlopeCorrector::new(options.slope.clone())
        .with_frame(options.page_frame)
        .correct(boxes, &mut warnings);

    let Some(frame) = options
        .page_frame
        .or_else(|| PageFrame::enclosing(corrected.iter().map(|corrected_box| &corrected_box.quad)))
    else {
        let mut table = Table::empty(page);
        table.slope = slope;
        table.warnings = warnings.into_inner();
        return table;
    };

    let detector = HeaderDetector::new(options.profile.header.clone());
    let (header, anchors) = match detector.detect(&corrected, &frame) {
        HeaderDetection::Found(header) => {
            let anchors = header.anchors.clone();
            (Some(header), anchors)
        }
        HeaderDetection::NotFound => {
            warnings.push(TableWarning::new(
                WarningCode::HeaderNotFound,
                "no header row matched the dictionary; using evenly spaced default columns",
            ));
            (None, detector.default_anchors(&frame))
        }
    };

    let mut preamble_box_ids = Vec::new();
    let mut body = Vec::with_capacity(corrected.len());
    for corrected_box in corrected {
        match &header {
            Some(header) if header.contains(&corrected_box.id) => {}
            Some(header) if corrected_box.center().y < header.band.top => {
                preamble_box_ids.push(corrected_box.id);
            }
            _ => body.push(corrected_box),
        }
    }

    let bounder = ColumnBounder::new(options.columns.clone());
    let mut columns = bounder.bound(&anchors, &frame, &mut warnings);
    let rows = RowClusterer::new(options.rows.clone()).cluster(body, &columns);

    let termination = TableTerminator::new(options.profile.termination.clone()).terminate(rows);
    if !termination.found {
        warnings.push(TableWarning::new(
            WarningCode::TerminationNotFound,
            "no termination row found; the table may include trailing content",
        ));
    }

    let assembly =
        TableAssembler::new(bounder).assemble(termination.data_rows, &mut columns, &mut warnings);
    let confidence = table_confidence(
        header.as_ref(),
        options.profile.header.labels.len(),
        termination.found,
        &assembly,
    );

    debug!(
        rows = assembly.rows.len(),
        columns = columns.len(),
        confidence,
        terminated = termination.found,
        "reconstructed page"
    );

    Table {
        page,
        header,
        column_widenings: columns.widenings(),
        columns: columns.into_columns(),
        rows: assembly.rows,
        terminal: termination.terminal,
        trailing: termination.trailing,
        preamble_box_ids,
        terminator_found: termination.found,
        possibly_trailing_content: !termination.found,
        low_confidence: confidence < LOW_CONFIDENCE_THRESHOLD,
        confidence,
        slope,
        warnings: warnings.into_inner(),
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn table_confidence(
    header: Option<&HeaderRow>,
    dictionary_labels: usize,
    terminated: bool,
    assembly: &Assembly,
) -> f32 {
    let header_component = header.map_or(0.0, |header| {
        header.confidence() * header.anchors.len() as f64 / dictionary_labels.max(1) as f64
    });
    let termination = if terminated { 1.0 } else { 0.0 };
    let score = HEADER_WEIGHT * header_component.min(1.0)
        + TERMINATION_WEIGHT * termination
        + PLACEMENT_WEIGHT * assembly.placement_ratio();
    score.clamp(0.0, 1.0) as f32
}

fn apply_quality_mode(
    tables: Vec<Table>,
    mode: QualityMode,
    skipped: &mut Vec<TableWarning>,
) -> Result<Vec<Table>, ReconstructError> {
    let mut out = Vec::new();

    for mut table in tables {
        if !table.low_confidence {
            out.push(table);
            continue;
        }

        let mut sink = WarningSink::for_page(table.page);
        match mode {
            QualityMode::BestEffort => {
                sink.push(
                    TableWarning::new(
                        WarningCode::LowConfidence,
                        "table confidence is low; exported in best-effort mode",
                    )
                    .with_confidence(table.confidence),
                );
                table.warnings.extend(sink.into_inner());
                out.push(table);
            }
            QualityMode::Strict => {
                return Err(ReconstructError::AmbiguousTable {
                    page: table.page,
                    confidence: table.confidence,
                });
            }
            QualityMode::SkipAmbiguous => {
                sink.push(
                    TableWarning::new(WarningCode::LowConfidence, "skipping low-confidence table")
                        .with_confidence(table.confidence),
                );
                skipped.extend(table.warnings);
                skipped.extend(sink.into_inner());
            }
        }
    }

    Ok(out)
}

/// Rebuilds one table per page, pages processed in parallel and reported in
/// page order.
pub fn reconstruct_document(
    boxes: &[OcrBox],
    options: &ReconstructOptions,
) -> Result<DocumentReport, ReconstructError> {
    options.validate()?;

    let mut pages: BTreeMap<u32, Vec<OcrBox>> = BTreeMap::new();
    for ocr_box in boxes {
        let selected = options
            .pages
            .as_ref()
            .is_none_or(|selection| selection.contains(ocr_box.page()));
        if selected {
            pages.entry(ocr_box.page()).or_default().push(ocr_box.clone());
        }
    }
    if pages.is_empty() {
        return Err(ReconstructError::NoPagesSelected);
    }

    let pages = pages.into_iter().collect::<Vec<_>>();
    let tables = pages
        .par_iter()
        .map(|(page, page_boxes)| run_page(*page, page_boxes, options))
        .collect::<Vec<_>>();

    let mut skipped = Vec::new();
    let tables = apply_quality_mode(tables, options.quality_mode, &mut skipped)?;
    let mut warnings = tables
        .iter()
        .flat_map(|table| table.warnings.iter().cloned())
        .collect::<Vec<_>>();
    warnings.extend(skipped);
    warnings.sort_by_key(|warning| warning.page);

    Ok(DocumentReport { tables, warnings })
}

/// Reads an OCR JSON file, rebuilds its tables and writes them in `format`.
pub fn extract_ocr_file(
    input: &Path,
    output: &Path,
    options: &ReconstructOptions,
    format: OutputFormat,
) -> Result<ExtractionReport, ReconstructError> {
    let boxes = read_ocr_json(input)?;
    let document = reconstruct_document(&boxes, options)?;
    match format {
        OutputFormat::Csv { delimiter } => document.write_csv(output, delimiter)?,
        OutputFormat::Json => fs::write(output, document.to_json_string()?)?,
    }
    Ok(ExtractionReport::from_document(document))
}

/// In-memory variant of [`extract_ocr_file`] producing CSV text.
pub fn extract_ocr_json_to_csv_string(
    json: &str,
    options: &ReconstructOptions,
    delimiter: u8,
) -> Result<(String, ExtractionReport), ReconstructError> {
    let boxes = parse_ocr_json(json)?;
    let document = reconstruct_document(&boxes, options)?;
    let csv = document.to_csv_string(delimiter)?;
    Ok((csv, ExtractionReport::from_document(document)))
}
