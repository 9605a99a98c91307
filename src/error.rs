//! Error taxonomy for a single pipeline run

use thiserror::Error;

/// Errors surfaced by loaders and pipeline stages
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No usable input, or the input could not be turned into a table
    #[error("failed to load leads: {0}")]
    Load(String),

    /// The table cannot be preprocessed (e.g. it has no rows)
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// A column does not match the table's row count
    #[error("column '{column}' has {actual} values, table has {expected} rows")]
    ColumnLength {
        column: String,
        expected: usize,
        actual: usize,
    },

    /// Model fitting or prediction failed, or ran past its deadline
    #[error("model error: {0}")]
    Model(String),
}

impl PipelineError {
    pub fn load(msg: impl Into<String>) -> Self {
        PipelineError::Load(msg.into())
    }

    pub fn model(msg: impl std::fmt::Display) -> Self {
        PipelineError::Model(msg.to_string())
    }
}

impl From<polars::prelude::PolarsError> for PipelineError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        PipelineError::Load(err.to_string())
    }
}

impl From<calamine::Error> for PipelineError {
    fn from(err: calamine::Error) -> Self {
        PipelineError::Load(err.to_string())
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        PipelineError::Load(err.to_string())
    }
}
