use std::fmt;

use super::bytecode::{Indices, Instruction};
use super::registers::{Handle, RegisterKind};
use crate::query::SortKey;
use crate::types::ValueKind;

/// what the program assumes about one column it reads
/// checked against the column source before the first instruction runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnBinding {
    pub column: usize,
    pub kind: ValueKind,
    /// false when the program was compiled for a null-free column
    pub nullable: bool,
    /// true when an instruction binary-searches or elides sorting on this column
    pub requires_sorted: bool,
}

/// description of the rows a program produces
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutputShape {
    /// keys the output is ordered by, empty means row order
    pub order: Vec<SortKey>,
    pub distinct: bool,
    /// upper bound on the output size, when the limit fixes one
    pub max_rows: Option<usize>,
    /// a filter was statically false, the output is always empty
    pub always_empty: bool,
}

/// compiled, immutable bytecode program
/// reusable across executions and shareable between threads
#[derive(Debug, Clone)]
pub struct Program {
    pub(crate) instructions: Vec<Instruction>,
    pub(crate) register_kinds: Vec<RegisterKind>,
    pub(crate) columns: Vec<ColumnBinding>,
    pub(crate) output: Handle<Indices>,
    pub(crate) shape: OutputShape,
}

impl Program {
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn register_count(&self) -> usize {
        self.register_kinds.len()
    }

    pub fn register_kinds(&self) -> &[RegisterKind] {
        &self.register_kinds
    }

    /// columns read by the program, in ascending column order
    pub fn columns(&self) -> &[ColumnBinding] {
        &self.columns
    }

    pub fn output(&self) -> Handle<Indices> {
        self.output
    }

    pub fn shape(&self) -> &OutputShape {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "; {} registers, output {}",
            self.register_kinds.len(),
            self.output
        )?;
        for (pc, instruction) in self.instructions.iter().enumerate() {
            writeln!(f, "{:>3}: {}", pc, instruction)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_program_is_shareable() {
        assert_send_sync::<Program>();
    }
}
