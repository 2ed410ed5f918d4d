//! Unified error type for filter compilation and evaluation
//!
//! Both backends report through [`QueryError`]. Decoding, path and coercion
//! failures are client errors; store execution, export and cancellation are
//! server-side failures.

use thiserror::Error;

use crate::filter::{DataType, Mode};

/// Error type for every filter, sort and pagination operation
#[derive(Error, Debug)]
pub enum QueryError {
    /// Dotted path does not resolve against the record type
    #[error("Invalid field path '{path}' for {scope}")]
    InvalidFieldPath { scope: String, path: String },

    /// Filter or record value cannot be interpreted as the requested type
    #[error("Cannot coerce {value} to {expected}")]
    TypeCoercion {
        expected: &'static str,
        value: String,
    },

    /// Mode is not defined for the data type
    #[error("Mode '{mode}' is not supported for data type '{data_type}'")]
    UnsupportedOperation { mode: Mode, data_type: DataType },

    /// Range value is malformed (missing bound, or from after to)
    #[error("Invalid range value: {0}")]
    InvalidRangeValue(String),

    /// Request parameter could not be decoded
    #[error("{name} processing failed: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// Store execution failed
    #[error("{operation} failed with {filters} filter(s): {source}")]
    QueryExecution {
        operation: &'static str,
        filters: usize,
        #[source]
        source: sqlx::Error,
    },

    /// Evaluating a single item failed during in-memory processing
    #[error("Item at index {index}: {source}")]
    Item {
        index: usize,
        #[source]
        source: Box<QueryError>,
    },

    /// Caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// CSV export failed
    #[error("Export failed: {0}")]
    Export(#[from] csv::Error),
}

impl QueryError {
    pub fn invalid_field(scope: impl Into<String>, path: impl Into<String>) -> Self {
        Self::InvalidFieldPath {
            scope: scope.into(),
            path: path.into(),
        }
    }

    pub fn coercion(expected: &'static str, value: impl ToString) -> Self {
        Self::TypeCoercion {
            expected,
            value: value.to_string(),
        }
    }

    pub fn unsupported(mode: Mode, data_type: DataType) -> Self {
        Self::UnsupportedOperation { mode, data_type }
    }

    pub fn invalid_range(reason: impl Into<String>) -> Self {
        Self::InvalidRangeValue(reason.into())
    }

    pub fn parameter(name: &'static str, reason: impl ToString) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.to_string(),
        }
    }

    /// Wrap a store error with the operation name and filter count
    pub fn execution(operation: &'static str, filters: usize, source: sqlx::Error) -> Self {
        Self::QueryExecution {
            operation,
            filters,
            source,
        }
    }

    pub fn item(index: usize, source: QueryError) -> Self {
        Self::Item {
            index,
            source: Box::new(source),
        }
    }

    /// True for errors caused by the request rather than the store
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::InvalidFieldPath { .. }
            | Self::TypeCoercion { .. }
            | Self::UnsupportedOperation { .. }
            | Self::InvalidRangeValue(_)
            | Self::InvalidParameter { .. } => true,
            Self::Item { source, .. } => source.is_client_error(),
            Self::QueryExecution { .. } | Self::Cancelled | Self::Export(_) => false,
        }
    }

    /// True when a field path did not resolve
    pub fn is_field_not_found(&self) -> bool {
        matches!(self, Self::InvalidFieldPath { .. })
    }
}
