//! columnar query execution: a compiler that turns a declarative query over a
//! table's columns into register bytecode, and an interpreter that runs it to
//! produce the selected row indices in output order

pub mod config;
pub mod error;
pub mod execution;
pub mod optimizer;
pub mod planner;
pub mod query;
pub mod schema;
pub mod storage;
pub mod types;

pub use config::{ConfigError, EngineConfig};
pub use error::{CompileError, CompileResult, ExecutionError, ExecutionResult, StorageError};
pub use execution::{Interpreter, Program, QueryResult};
pub use planner::QueryPlanner;
pub use query::{Direction, Filter, Operand, QuerySpec, SortKey};
pub use schema::{ColumnSchema, Schema, Sortedness};
pub use storage::{BitVector, Column, ColumnSource, FlexVector, Slab, StringPool, Table};
pub use types::{FilterOp, Value, ValueKind};

/// compile with the default configuration
pub fn compile(schema: &Schema, spec: &QuerySpec) -> CompileResult<Program> {
    QueryPlanner::default().compile(schema, spec)
}

/// run a program with a throwaway interpreter
/// hold on to an [`Interpreter`] instead when executing repeatedly, so its
/// buffer pool is reused
pub fn execute<S: ColumnSource + ?Sized>(program: &Program, source: &S) -> ExecutionResult<QueryResult> {
    Interpreter::default().execute(program, source)
}
