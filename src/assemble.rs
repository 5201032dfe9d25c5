use tracing::debug;

use crate::columns::{ColumnBounder, ColumnSet};
use crate::model::{AssembledRow, Cell, Row};
use crate::warning::{TableWarning, WarningCode, WarningSink};

pub const OVERFLOW_LABEL: &str = "overflow";

// Neighbouring rows closer than this many row heights are suspect.
const SPLIT_ROW_HEIGHTS: f64 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Assembly {
    pub rows: Vec<AssembledRow>,
    pub boxes: usize,
    pub overflow_boxes: usize,
    /// Column-placed boxes in rows that look like halves of one torn row.
    pub split_boxes: usize,
}

impl Assembly {
    /// Share of boxes placed in a column of an intact row, 1.0 for an empty
    /// table.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn placement_ratio(&self) -> f64 {
        if self.boxes == 0 {
            1.0
        } else {
            let misplaced = (self.overflow_boxes + self.split_boxes).min(self.boxes);
            1.0 - misplaced as f64 / self.boxes as f64
        }
    }
}

/// Maps the boxes of each row onto columns.
#[derive(Debug, Clone)]
pub struct TableAssembler {
    bounder: ColumnBounder,
}

impl TableAssembler {
    #[must_use]
    pub fn new(bounder: ColumnBounder) -> Self {
        Self { bounder }
    }

    pub fn assemble(
        &self,
        rows: Vec<Row>,
        columns: &mut ColumnSet,
        warnings: &mut WarningSink,
    ) -> Assembly {
        let mut assembled = Vec::with_capacity(rows.len());
        let mut boxes = 0;
        let mut overflow_boxes = 0;

        for (row_index, row) in rows.into_iter().enumerate() {
            let mut cells = columns
                .columns()
                .iter()
                .map(|column| Cell::empty(column.label.clone()))
                .collect::<Vec<_>>();
            let mut overflow: Option<Cell> = None;

            for corrected in &row.boxes {
                boxes += 1;
                let x = corrected.center().x;
                let widened_before = columns.widenings();
                match self.bounder.widen_to_include(columns, x) {
                    Ok(index) => {
                        if columns.widenings() > widened_before {
                            let column = &columns.columns()[index];
                            warnings.push(
                                TableWarning::new(
                                    WarningCode::ColumnWidened,
                                    format!(
                                        "column '{}' widened to [{:.4}, {:.4}) for box {}",
                                        column.label, column.left, column.right, corrected.id
                                    ),
                                )
                                .with_row(row_index),
                            );
                        }
                        cells[index].push(corrected);
                    }
                    Err(err) => {
                        warnings.push(
                            TableWarning::new(
                                WarningCode::ColumnOverflow,
                                format!("box {} at x={x:.4} fits no column: {err}", corrected.id),
                            )
                            .with_row(row_index),
                        );
                        overflow_boxes += 1;
                        overflow
                            .get_or_insert_with(|| Cell::empty(OVERFLOW_LABEL))
                            .push(corrected);
                    }
                }
            }

            assembled.push(AssembledRow {
                needs_review: overflow.is_some(),
                cells,
                overflow,
                band: row.band,
            });
        }

        let split_boxes = flag_split_rows(&mut assembled, warnings);

        debug!(
            rows = assembled.len(),
            boxes,
            overflow_boxes,
            split_boxes,
            widenings = columns.widenings(),
            "assembled table"
        );
        Assembly {
            rows: assembled,
            boxes,
            overflow_boxes,
            split_boxes,
        }
    }
}

/// Flags neighbouring rows that sit within [`SPLIT_ROW_HEIGHTS`] row heights
/// of each other and fill disjoint columns. Returns the number of column-placed
/// boxes in flagged rows.
fn flag_split_rows(rows: &mut [AssembledRow], warnings: &mut WarningSink) -> usize {
    let mut split = vec![false; rows.len()];
    for (index, pair) in rows.windows(2).enumerate() {
        let (upper, lower) = (&pair[0], &pair[1]);
        let height = (upper.band.height() + lower.band.height()) / 2.0;
        let gap = (lower.band.center() - upper.band.center()).abs();
        if gap >= SPLIT_ROW_HEIGHTS * height || !fills_disjoint_columns(upper, lower) {
            continue;
        }
        warnings.push(
            TableWarning::new(
                WarningCode::RowSplit,
                format!(
                    "rows {index} and {} are {gap:.4} apart and fill disjoint columns",
                    index + 1
                ),
            )
            .with_row(index),
        );
        split[index] = true;
        split[index + 1] = true;
    }

    let mut boxes = 0;
    for (row, split) in rows.iter_mut().zip(split) {
        if split {
            row.needs_review = true;
            boxes += row.cells.iter().map(|cell| cell.box_ids.len()).sum::<usize>();
        }
    }
    boxes
}

fn fills_disjoint_columns(upper: &AssembledRow, lower: &AssembledRow) -> bool {
    let occupied = |row: &AssembledRow| {
        row.cells
            .iter()
            .map(|cell| !cell.is_empty())
            .collect::<Vec<_>>()
    };
    let (upper, lower) = (occupied(upper), occupied(lower));
    upper.contains(&true)
        && lower.contains(&true)
        && upper.iter().zip(&lower).all(|(a, b)| !(*a && *b))
}
