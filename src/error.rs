//! Error types for the store, frame model, task runner and encoder

use thiserror::Error;

use crate::store::Key;

pub type Result<T> = std::result::Result<T, EncodingError>;

#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("Key not found: {0}")]
    KeyNotFound(Key),

    #[error("Key {key} is still referenced by {holders} live object(s)")]
    KeyInUse { key: Key, holders: usize },

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Target column is neither numeric nor a binary categorical.
    #[error("{0}")]
    InvalidTarget(String),

    #[error("Undefined aggregate: {0}")]
    UndefinedAggregate(String),

    #[error("Row {row} out of range for column of {len} rows")]
    RowOutOfRange { row: i64, len: u64 },

    #[error("Segment layout mismatch: {0}")]
    LayoutMismatch(String),

    #[error("Task '{task}' failed in segment {segment}: {source}")]
    TaskFailed {
        task: String,
        segment: usize,
        #[source]
        source: Box<EncodingError>,
    },

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EncodingError {
    /// Stable error code for callers that branch on failure kind
    pub fn code(&self) -> &'static str {
        match self {
            EncodingError::KeyNotFound(_) => "KEY_NOT_FOUND",
            EncodingError::KeyInUse { .. } => "KEY_IN_USE",
            EncodingError::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            EncodingError::InvalidArgument(_) => "INVALID_ARGUMENT",
            EncodingError::InvalidTarget(_) => "INVALID_TARGET",
            EncodingError::UndefinedAggregate(_) => "UNDEFINED_AGGREGATE",
            EncodingError::RowOutOfRange { .. } => "ROW_OUT_OF_RANGE",
            EncodingError::LayoutMismatch(_) => "LAYOUT_MISMATCH",
            EncodingError::TaskFailed { .. } => "TASK_FAILED",
            EncodingError::Io(_) => "IO_ERROR",
            EncodingError::Json(_) => "JSON_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }

    /// Unwrap task failures down to the fault raised inside the segment.
    pub fn root_cause(&self) -> &EncodingError {
        match self {
            EncodingError::TaskFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        EncodingError::InvalidArgument(msg.into())
    }
}
