use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("Schema error in sheet '{sheet}': {reason}")]
    Schema { sheet: String, reason: String },

    #[error("Data format error at row {row}: {reason}")]
    DataFormat { row: usize, reason: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Data not loaded: {0}")]
    NotLoaded(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("Chart rendering error: {0}")]
    Render(#[from] std::fmt::Error),
}

impl PlannerError {
    pub(crate) fn schema(sheet: &str, reason: impl Into<String>) -> Self {
        Self::Schema {
            sheet: sheet.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn data_format(row: usize, reason: impl Into<String>) -> Self {
        Self::DataFormat {
            row,
            reason: reason.into(),
        }
    }
}

#[cfg(feature = "python")]
impl From<PlannerError> for pyo3::PyErr {
    fn from(err: PlannerError) -> pyo3::PyErr {
        use pyo3::exceptions::{PyRuntimeError, PyValueError};
        match err {
            PlannerError::Config(_) => PyValueError::new_err(err.to_string()),
            _ => PyRuntimeError::new_err(err.to_string()),
        }
    }
}
