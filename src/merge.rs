use crate::Table;
use crate::assemble::OVERFLOW_LABEL;
use crate::model::MergedOutput;

pub(crate) const PAGE_COLUMN: &str = "page";
pub(crate) const ROW_COLUMN: &str = "row";

/// Column labels in first-seen order across tables.
fn label_union(tables: &[Table]) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for column in tables.iter().flat_map(|table| table.columns.iter()) {
        if !labels.contains(&column.label) {
            labels.push(column.label.clone());
        }
    }
    labels
}

pub(crate) fn merge_tables(tables: &[Table]) -> MergedOutput {
    let labels = label_union(tables);

    let mut headers = vec![PAGE_COLUMN.to_string(), ROW_COLUMN.to_string()];
    headers.extend(labels.iter().cloned());
    headers.push(OVERFLOW_LABEL.to_string());

    let mut rows = Vec::new();
    for table in tables {
        for (index, assembled) in table.rows.iter().enumerate() {
            let mut row = Vec::with_capacity(labels.len() + 3);
            row.push(table.page.to_string());
            row.push((index + 1).to_string());
            row.extend(labels.iter().map(|label| assembled.text(label).to_string()));
            row.push(
                assembled
                    .overflow
                    .as_ref()
                    .map(|cell| cell.text.clone())
                    .unwrap_or_default(),
            );
            rows.push(row);
        }
    }

    MergedOutput {
        headers,
        row_count: rows.len(),
        table_count: tables.iter().filter(|table| !table.rows.is_empty()).count(),
        rows,
    }
}
