//! Error types for the store and the filter pipeline.

use thiserror::Error;

use crate::store::ColumnType;

/// Errors raised by a [`TabularStore`](crate::store::TabularStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Referenced table does not exist.
    #[error("table '{0}' does not exist")]
    TableNotFound(String),

    /// Table already exists.
    #[error("table '{0}' already exists")]
    TableExists(String),

    /// Referenced column does not exist.
    #[error("unknown column '{column}'")]
    UnknownColumn {
        /// Column name as requested.
        column: String,
    },

    /// Row width does not match the table schema.
    #[error("row for '{table}' has {actual} cells, expected {expected}")]
    ArityMismatch {
        /// Target table.
        table: String,
        /// Column count of the table.
        expected: usize,
        /// Cell count of the row.
        actual: usize,
    },

    /// Cell type does not match the column type.
    #[error("column '{column}' of '{table}' expects {expected:?}, got {actual}")]
    TypeMismatch {
        /// Target table.
        table: String,
        /// Offending column.
        column: String,
        /// Declared column type.
        expected: ColumnType,
        /// Type name of the provided value.
        actual: &'static str,
    },

    /// Source and destination columns differ in an insert-from-query.
    #[error("cannot insert into '{dest}' from '{source_table}': column lists differ")]
    IncompatibleSchemas {
        /// Destination table.
        dest: String,
        /// Source table.
        source_table: String,
    },

    /// Transaction control used out of order.
    #[error("transaction error: {0}")]
    Transaction(&'static str),

    /// The SQLite backend rejected a statement.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A table's recorded schema could not be encoded or decoded.
    #[error("schema catalog entry for '{table}': {source}")]
    Catalog {
        /// Table whose entry is bad.
        table: String,
        /// Underlying error.
        source: serde_json::Error,
    },
}

/// Errors raised while configuring or running filter stages.
#[derive(Debug, Error)]
pub enum FilterError {
    /// A required stage parameter is absent.
    #[error("stage '{stage}' requires parameter '{parameter}'")]
    MissingParameter {
        /// Stage tag.
        stage: String,
        /// Parameter key.
        parameter: String,
    },

    /// A stage parameter could not be interpreted.
    #[error("invalid parameter '{parameter}' for stage '{stage}': {reason}")]
    InvalidParameter {
        /// Stage tag.
        stage: String,
        /// Parameter key.
        parameter: String,
        /// Explanation of why it's invalid.
        reason: String,
    },

    /// No stage is registered under the requested name.
    #[error("unknown filter stage '{0}'")]
    UnknownStage(String),

    /// Failure in the tabular store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Input could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A VCF/BCF file could not be opened or decoded.
    #[error("VCF error: {0}")]
    Vcf(#[from] rust_htslib::errors::Error),

    /// A statistic could not be computed.
    #[error("numeric error: {0}")]
    Numeric(String),

    /// A row did not have the expected shape.
    #[error("data error: {0}")]
    Data(String),

    /// The run was cancelled between batches.
    #[error("stage '{0}' cancelled")]
    Cancelled(String),

    /// A stage produced rows that were not in its input.
    #[error("stage '{stage}' wrote {output} rows from an input of {input}")]
    SubsetViolation {
        /// Stage tag.
        stage: String,
        /// Input row count.
        input: usize,
        /// Output row count.
        output: usize,
    },

    /// A pipeline stage failed; the pipeline halted there.
    #[error("stage '{stage}' writing '{table}' failed: {source}")]
    StageFailed {
        /// Stage tag.
        stage: String,
        /// Output table of the failed stage.
        table: String,
        /// Cause.
        #[source]
        source: Box<FilterError>,
    },
}

impl FilterError {
    /// Helper for constructing parameter errors.
    pub fn invalid(stage: &str, parameter: &str, reason: impl Into<String>) -> Self {
        FilterError::InvalidParameter {
            stage: stage.to_string(),
            parameter: parameter.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, FilterError>;
