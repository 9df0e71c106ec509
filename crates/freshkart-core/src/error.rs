use std::path::PathBuf;

use polars::prelude::PolarsError;
use thiserror::Error;

/// Why an input file could not be turned into records.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures while persisting outputs. None of them are retried or rolled back.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {path} as CSV: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },

    #[error("cumulative store operation on {target} failed: {source}")]
    Store {
        target: String,
        #[source]
        source: sqlx::Error,
    },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InputValidation(String),

    #[error("source {path} unavailable: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: SourceError,
    },

    #[error("order {order_id} has an unparseable created_at value {value:?}")]
    InvalidTimestamp { order_id: String, value: String },

    #[error("dataframe operation failed: {0}")]
    Transform(#[from] PolarsError),

    #[error(transparent)]
    SinkWrite(#[from] SinkError),
}

impl PipelineError {
    pub(crate) fn source_unavailable(path: impl Into<PathBuf>, source: impl Into<SourceError>) -> Self {
        PipelineError::SourceUnavailable {
            path: path.into(),
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
