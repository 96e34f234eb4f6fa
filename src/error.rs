use thiserror::Error;

use crate::types::{FilterOp, ValueKind};

pub type CompileResult<T> = Result<T, CompileError>;
pub type ExecutionResult<T> = Result<T, ExecutionError>;
pub type StorageResult<T> = Result<T, StorageError>;

/// query specification rejected by the compiler
/// always recoverable: nothing has executed and no state was touched
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("{context} references column {column}, but the schema has {schema_len} columns")]
    UnknownColumn {
        context: &'static str,
        column: usize,
        schema_len: usize,
    },

    #[error("filter {filter}: operator {op} is not supported on {kind} column '{column}'")]
    IllegalOperator {
        filter: usize,
        column: String,
        kind: ValueKind,
        op: FilterOp,
    },

    #[error("filter {filter}: {operand} operand cannot be compared with {kind} column '{column}'")]
    OperandTypeMismatch {
        filter: usize,
        column: String,
        kind: ValueKind,
        operand: &'static str,
    },

    #[error("filter {filter}: operator {op} on column '{column}' expects {expected}")]
    OperandShape {
        filter: usize,
        column: String,
        op: FilterOp,
        expected: &'static str,
    },

    #[error("filter {filter}: invalid pattern '{pattern}' on column '{column}': {reason}")]
    InvalidPattern {
        filter: usize,
        column: String,
        pattern: String,
        reason: String,
    },

    #[error("column '{column}' is sorted both ascending and descending")]
    ConflictingSortKeys { column: String },

    #[error("distinct requires at least one column")]
    EmptyDistinct,
}

/// failure while running a compiled program
/// reserved for conditions the compiler cannot rule out
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("program expects column {column} to be {expected}, found {found}")]
    SchemaMismatch {
        column: usize,
        expected: String,
        found: String,
    },

    #[error("program reads column {column}, but the source has {available} columns")]
    MissingColumn { column: usize, available: usize },

    #[error("table has {rows} rows, more than a 32-bit row index can address")]
    TooManyRows { rows: usize },
}

/// failure building or loading a table
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("column '{column}' has {found} rows, table has {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),
}
