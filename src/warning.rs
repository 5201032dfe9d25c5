use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCode {
    GeometryDegenerate,
    QuadrantFallback,
    GlobalSlopeFallback,
    HeaderNotFound,
    AnchorDropped,
    ColumnWidened,
    ColumnOverflow,
    RowSplit,
    TerminationNotFound,
    LowConfidence,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableWarning {
    pub code: WarningCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl TableWarning {
    #[must_use]
    pub fn new(code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            page: None,
            row: None,
            confidence: None,
        }
    }

    #[must_use]
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    #[must_use]
    pub fn with_row(mut self, row: usize) -> Self {
        self.row = Some(row);
        self
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Collects the warnings of one page run and mirrors each into the tracing log.
#[derive(Debug, Default)]
pub struct WarningSink {
    page: u32,
    warnings: Vec<TableWarning>,
}

impl WarningSink {
    #[must_use]
    pub fn for_page(page: u32) -> Self {
        Self {
            page,
            warnings: Vec::new(),
        }
    }

    pub fn push(&mut self, warning: TableWarning) {
        let warning = warning.with_page(self.page);
        tracing::warn!(
            page = self.page,
            code = ?warning.code,
            row = ?warning.row,
            "{}",
            warning.message
        );
        self.warnings.push(warning);
    }

    #[must_use]
    pub fn has(&self, code: WarningCode) -> bool {
        self.warnings.iter().any(|warning| warning.code == code)
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<TableWarning> {
        self.warnings
    }
}
