use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconstructError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    #[error("malformed OCR JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid box '{id}': {reason}")]
    InvalidBox { id: String, reason: String },

    #[error("duplicate box id '{0}'")]
    DuplicateBoxId(String),

    #[error("invalid table profile: {0}")]
    InvalidProfile(String),

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("invalid page selection: {0}")]
    InvalidPageSelection(String),

    #[error("no pages available after applying selection")]
    NoPagesSelected,

    #[error("table on page {page} is too ambiguous (confidence={confidence:.2})")]
    AmbiguousTable { page: u32, confidence: f32 },
}

impl ReconstructError {
    pub(crate) fn invalid_box(id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidBox {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}
