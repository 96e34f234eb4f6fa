//! bytecode, the builder that emits it and the interpreter that runs it

pub mod builder;
pub mod bytecode;
pub mod interpreter;
pub mod operators;
pub mod program;
pub mod registers;

pub use builder::BytecodeBuilder;
pub use bytecode::{
    Constant, ConstantSet, IndexCount, Indices, Instruction, Predicate, SetProbe, SortAlgorithm,
    SortMethod,
    SortKeySpec,
};
pub use interpreter::{Interpreter, QueryResult};
pub use program::{ColumnBinding, OutputShape, Program};
pub use registers::{Handle, IndexRange, Register, RegisterFile, RegisterKind, Scalar, ScalarSet};
