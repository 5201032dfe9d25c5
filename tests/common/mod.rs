#![allow(dead_code)]

use std::path::Path;

use ocr_table_rebuild::{OcrBox, Quad, Skew, SyntheticTable, write_blocks_json};

/// Five line items and a "Total Charge" row under a four-column header.
pub fn scenario_a() -> SyntheticTable {
    SyntheticTable::new(
        &["Quantity", "Description", "Weight", "Total"],
        &[
            &["2", "Steel pipe", "450", "400.00"],
            &["4", "Valves", "120", "1,250.00"],
            &["1", "Gaskets", "80", "95.00"],
            &["6", "Copper wire", "900", "2,105.00"],
            &["3", "Flanges", "60", "150.00"],
            &["", "Total Charge", "", "4000.00"],
        ],
    )
}

/// Same header and items without a termination row.
pub fn scenario_e() -> SyntheticTable {
    SyntheticTable::new(
        &["Quantity", "Description", "Weight", "Total"],
        &[
            &["2", "Steel pipe", "450", "400.00"],
            &["4", "Valves", "120", "1,250.00"],
            &["1", "Gaskets", "80", "95.00"],
        ],
    )
}

pub fn skewed(table: &SyntheticTable, degrees: f64) -> Vec<OcrBox> {
    table
        .boxes(Skew::Uniform(degrees))
        .expect("synthetic boxes should be valid")
}

pub fn boxed(id: &str, text: &str, x: f64, y: f64) -> OcrBox {
    OcrBox::new(id, text, Quad::from_rect(x, y, 0.08, 0.03), 0.9, 1).expect("box should be valid")
}

pub fn write_fixture(path: &Path, boxes: &[OcrBox]) {
    write_blocks_json(path, boxes).expect("OCR fixture should be written");
}
