mod common;

use std::collections::BTreeSet;
use std::process::Command;

use ocr_table_rebuild::{
    ColumnConfig, LOW_CONFIDENCE_THRESHOLD, OuterEdge, OutputFormat, PageFrame,
    ReconstructOptions, Skew, SlopeConfig, SyntheticTable, WarningCode, extract_ocr_file,
    extract_ocr_json_to_csv_string, parse_ocr_json, reconstruct_document, reconstruct_page,
};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

#[test]
fn rebuilds_a_uniformly_skewed_invoice() {
    let boxes = common::skewed(&common::scenario_a(), 5.0);
    let table = reconstruct_page(&boxes, &ReconstructOptions::default())
        .expect("reconstruction should succeed");

    assert_eq!(
        table.labels().collect::<Vec<_>>(),
        vec!["Quantity", "Description", "Weight", "Total"]
    );
    assert_eq!(table.rows.len(), 5);
    assert!(table.terminator_found);
    assert_eq!(table.rows[0].text("Description"), "Steel pipe");
    assert_eq!(table.rows[4].text("Quantity"), "3");
    assert_eq!(table.rows[4].text("Total"), "150.00");
    assert!(
        table
            .rows
            .iter()
            .all(|row| !row.text("Description").contains("Total Charge")),
        "terminal row leaked into data rows: {:?}",
        table.rows
    );
    let terminal = table.terminal.as_ref().expect("terminal row should be kept");
    assert_eq!(terminal.grand_total, Some(4000.0));
    assert!(table.slope.page_slope.is_some_and(|slope| (slope - 5f64.to_radians().tan()).abs() < 1e-6));
}

#[test]
fn rebuilds_per_quadrant_skew_for_every_seed() {
    let options = ReconstructOptions {
        page_frame: Some(PageFrame::new(0.0, 0.0, 1.0, 1.0).expect("unit frame is valid")),
        // The grand-total row is alone in the bottom-right quadrant.
        slope: SlopeConfig {
            min_boxes_per_region: 2,
            ..SlopeConfig::default()
        },
        ..ReconstructOptions::default()
    };

    for seed in 1..=8 {
        let boxes = SyntheticTable::freight_sample()
            .boxes(Skew::PerQuadrant { max_deg: 4.0, seed })
            .expect("synthetic boxes should be valid");
        let table = reconstruct_page(&boxes, &options).expect("reconstruction should succeed");

        assert_eq!(
            table.labels().collect::<Vec<_>>(),
            vec!["Quantity", "Pieces", "Weight", "Description", "Total"],
            "seed {seed}"
        );
        assert_eq!(table.rows.len(), 4, "seed {seed}: {:?}", table.rows);
        assert_eq!(table.rows[0].text("Description"), "Steel pipe", "seed {seed}");
        assert_eq!(table.rows[3].text("Total"), "2,105.00", "seed {seed}");
        assert!(table.terminator_found, "seed {seed}");
        assert!(!table.low_confidence, "seed {seed}: {}", table.confidence);
    }
}

#[test]
fn torn_rows_make_the_table_low_confidence() {
    let mut boxes = vec![
        common::boxed("h0", "Qty", 0.1, 0.1),
        common::boxed("h1", "Pcs", 0.25, 0.1),
        common::boxed("h2", "Weight", 0.4, 0.1),
    ];
    for line in 0..4_u32 {
        let y = 0.2 + f64::from(line) * 0.08;
        boxes.push(common::boxed(&format!("q{line}"), "2", 0.1, y));
        boxes.push(common::boxed(&format!("p{line}"), "1", 0.25, y));
        boxes.push(common::boxed(&format!("w{line}"), "450", 0.4, y + 0.04));
    }
    boxes.push(common::boxed("t0", "Total Charge", 0.1, 0.52));
    boxes.push(common::boxed("t1", "95.00", 0.4, 0.52));
    let table = reconstruct_page(&boxes, &ReconstructOptions::default())
        .expect("reconstruction should succeed");

    assert!(table.terminator_found);
    assert_eq!(table.rows.len(), 8);
    assert!(table.rows.iter().all(|row| row.needs_review));
    assert!(table.confidence < LOW_CONFIDENCE_THRESHOLD, "confidence {}", table.confidence);
    assert!(table.low_confidence);
    assert!(
        table
            .warnings
            .iter()
            .any(|warning| warning.code == WarningCode::RowSplit)
    );
}

#[test]
fn keeps_every_row_without_a_terminator() {
    let boxes = common::skewed(&common::scenario_e(), 2.0);
    let table = reconstruct_page(&boxes, &ReconstructOptions::default())
        .expect("reconstruction should succeed");

    assert_eq!(table.rows.len(), 3);
    assert!(!table.terminator_found);
    assert!(table.possibly_trailing_content);
    assert!(
        table
            .warnings
            .iter()
            .any(|warning| warning.code == WarningCode::TerminationNotFound)
    );
}

#[test]
fn every_box_is_accounted_for_once() {
    let mut boxes = common::skewed(&common::scenario_a(), 3.0);
    boxes.push(common::boxed("note", "Invoice 4471", 0.1, 0.02));
    let table = reconstruct_page(&boxes, &ReconstructOptions::default())
        .expect("reconstruction should succeed");

    let header = table.header.as_ref().expect("header should be found");
    let mut seen = Vec::new();
    seen.extend(header.boxes.iter().map(|corrected| corrected.id.clone()));
    seen.extend(table.preamble_box_ids.iter().cloned());
    for row in &table.rows {
        seen.extend(row.box_ids().map(ToString::to_string));
    }
    for row in table.terminal.iter().map(|marker| &marker.row).chain(&table.trailing) {
        seen.extend(row.boxes.iter().map(|corrected| corrected.id.clone()));
    }

    let unique = seen.iter().cloned().collect::<BTreeSet<_>>();
    let expected = boxes
        .iter()
        .map(|ocr_box| ocr_box.id().to_string())
        .collect::<BTreeSet<_>>();
    assert_eq!(seen.len(), unique.len(), "a box was assigned twice");
    assert_eq!(unique, expected);
    assert_eq!(table.preamble_box_ids, vec!["note"]);
}

#[test]
fn widened_columns_stay_ordered() {
    let mut boxes = common::skewed(&common::scenario_e(), 0.0);
    boxes.push(common::boxed("stray", "extra", 0.66, 0.44));
    let options = ReconstructOptions {
        columns: ColumnConfig {
            outer_edge: OuterEdge::HeaderPadding(0.0),
            ..ColumnConfig::default()
        },
        ..ReconstructOptions::default()
    };
    let table = reconstruct_page(&boxes, &options).expect("reconstruction should succeed");

    assert!(table.column_widenings >= 1);
    assert!(table.columns.iter().all(|column| column.left < column.right));
    assert!(
        table
            .columns
            .windows(2)
            .all(|pair| pair[0].right <= pair[1].left)
    );
    assert!(
        table
            .warnings
            .iter()
            .any(|warning| warning.code == WarningCode::ColumnWidened)
    );
    assert!(table.rows.iter().all(|row| row.overflow.is_none()));
}

#[test]
fn falls_back_to_default_columns_without_a_header() {
    let boxes = SyntheticTable::new(&["Alpha", "Beta", "Gamma"], &[&["1", "2", "3"]])
        .boxes(Skew::None)
        .expect("synthetic boxes should be valid");
    let table = reconstruct_page(&boxes, &ReconstructOptions::default())
        .expect("reconstruction should succeed");

    assert!(table.header.is_none());
    assert_eq!(table.columns.len(), 5);
    assert!(table.low_confidence);
    assert_eq!(table.rows.len(), 2);
}

#[test]
fn merges_tables_from_multiple_pages() {
    let mut boxes = common::skewed(&common::scenario_a(), 4.0);
    boxes.extend(
        SyntheticTable::freight_sample()
            .with_page(2)
            .boxes(Skew::Uniform(-3.0))
            .expect("synthetic boxes should be valid"),
    );
    let report = reconstruct_document(&boxes, &ReconstructOptions::default())
        .expect("document should rebuild");

    assert_eq!(report.tables.iter().map(|table| table.page).collect::<Vec<_>>(), vec![1, 2]);
    let merged = report.merged();
    assert_eq!(
        merged.headers,
        vec!["page", "row", "Quantity", "Description", "Weight", "Total", "Pieces", "overflow"]
    );
    assert_eq!(merged.row_count, 9);
    assert_eq!(merged.rows[5][0], "2");
    assert_eq!(merged.table_count, 2);
}

#[test]
fn extracts_json_file_to_csv_and_json() {
    let dir = tempdir().expect("tempdir should be created");
    let input = dir.path().join("boxes.json");
    let csv_path = dir.path().join("table.csv");
    let json_path = dir.path().join("table.json");
    common::write_fixture(&input, &common::skewed(&common::scenario_a(), 5.0));

    let report = extract_ocr_file(
        &input,
        &csv_path,
        &ReconstructOptions::default(),
        OutputFormat::Csv { delimiter: b',' },
    )
    .expect("extraction should succeed");
    let csv = std::fs::read_to_string(&csv_path).expect("CSV should be readable");
    assert!(
        csv.starts_with("page,row,Quantity,Description,Weight,Total,overflow"),
        "unexpected CSV output: {csv:?}, report: {report:?}"
    );
    assert!(csv.contains("1,2,4,Valves,120,\"1,250.00\","), "unexpected CSV output: {csv:?}");
    assert_eq!(report.row_count, 5);
    assert_eq!(report.table_count, 1);

    extract_ocr_file(&input, &json_path, &ReconstructOptions::default(), OutputFormat::Json)
        .expect("extraction should succeed");
    let json: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(&json_path).expect("JSON should be readable"),
    )
    .expect("output should be JSON");
    assert_eq!(json["tables"][0]["terminator_found"], serde_json::Value::Bool(true));
    assert_eq!(json["tables"][0]["rows"].as_array().map(Vec::len), Some(5));
}

#[test]
fn csv_string_round_trips_through_the_blocks_schema() {
    let json = ocr_table_rebuild::blocks_to_json_string(&common::skewed(&common::scenario_e(), 1.0))
        .expect("blocks should render");
    assert_eq!(parse_ocr_json(&json).expect("blocks should parse").len(), 16);

    let (csv, report) = extract_ocr_json_to_csv_string(&json, &ReconstructOptions::default(), b';')
        .expect("extraction should succeed");
    assert!(csv.starts_with("page;row;Quantity;Description;Weight;Total;overflow"));
    assert_eq!(report.row_count, 3);
}

#[test]
fn cli_reports_no_rows_with_exit_code_two() {
    let dir = tempdir().expect("tempdir should be created");
    let input = dir.path().join("header-only.json");
    let output = dir.path().join("out.csv");
    common::write_fixture(
        &input,
        &[
            common::boxed("h0", "Qty", 0.1, 0.1),
            common::boxed("h1", "Total", 0.4, 0.1),
        ],
    );

    let status = Command::new(env!("CARGO_BIN_EXE_ocr2table"))
        .args(["extract", "-i"])
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .status()
        .expect("binary should run");
    assert_eq!(status.code(), Some(2));
}

#[test]
fn cli_synthesizes_and_extracts() {
    let dir = tempdir().expect("tempdir should be created");
    let input = dir.path().join("synthetic.json");
    let output = dir.path().join("synthetic.csv");

    let synth = Command::new(env!("CARGO_BIN_EXE_ocr2table"))
        .args(["synth", "--skew", "3.5", "-o"])
        .arg(&input)
        .status()
        .expect("binary should run");
    assert!(synth.success());

    let extract = Command::new(env!("CARGO_BIN_EXE_ocr2table"))
        .args(["extract", "-i"])
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .status()
        .expect("binary should run");
    assert_eq!(extract.code(), Some(0));

    let csv = std::fs::read_to_string(&output).expect("CSV should be readable");
    assert!(csv.contains("Copper wire"), "unexpected CSV output: {csv:?}");
    assert!(!csv.contains("Total Charge"), "unexpected CSV output: {csv:?}");
}

#[test]
fn cli_extracts_per_quadrant_skew_on_a_unit_page() {
    let dir = tempdir().expect("tempdir should be created");
    let input = dir.path().join("quadrants.json");
    let output = dir.path().join("quadrants.csv");

    let synth = Command::new(env!("CARGO_BIN_EXE_ocr2table"))
        .args(["synth", "--per-quadrant", "--skew", "2.0", "--seed", "11", "-o"])
        .arg(&input)
        .status()
        .expect("binary should run");
    assert!(synth.success());

    let extract = Command::new(env!("CARGO_BIN_EXE_ocr2table"))
        .args(["extract", "--page-frame", "0,0,1,1", "-i"])
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .status()
        .expect("binary should run");
    assert_eq!(extract.code(), Some(0));

    let csv = std::fs::read_to_string(&output).expect("CSV should be readable");
    assert!(
        csv.starts_with("page,row,Quantity,Pieces,Weight,Description,Total,overflow"),
        "unexpected CSV output: {csv:?}"
    );
    assert!(csv.contains("1,4,6,3,900,Copper wire,\"2,105.00\","), "unexpected CSV output: {csv:?}");
}

#[test]
fn cli_rejects_missing_input() {
    let dir = tempdir().expect("tempdir should be created");
    let status = Command::new(env!("CARGO_BIN_EXE_ocr2table"))
        .args(["extract", "-i"])
        .arg(dir.path().join("missing.json"))
        .arg("-o")
        .arg(dir.path().join("out.csv"))
        .status()
        .expect("binary should run");
    assert_eq!(status.code(), Some(1));
}
