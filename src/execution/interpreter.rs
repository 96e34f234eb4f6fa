use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use super::bytecode::{Constant, ConstantSet, IndexCount, Instruction, SetProbe, SortMethod};
use super::operators::{
    KeyColumn, RadixScratch, Refine, ScanInto, bit_filter, dispatch, distinct_hashed, distinct_sorted, id_range,
    limit_indices, limit_range, sort_rows, sorted_range,
};
use super::program::Program;
use super::registers::{
    Handle, IndexRange, MembershipSet, Register, RegisterFile, RegisterValue, Scalar, ScalarSet,
    double_key,
};
use crate::config::EngineConfig;
use crate::error::{ExecutionError, ExecutionResult};
use crate::query::Direction;
use crate::schema::Sortedness;
use crate::storage::{BufferPool, Column, ColumnSource, FlexVector, StringPool};

/// rows selected by a program, in output order
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub indices: FlexVector<u32>,
    pub row_count: usize,
}

impl QueryResult {
    pub fn as_slice(&self) -> &[u32] {
        self.indices.as_slice()
    }

    pub fn to_vec(&self) -> Vec<u32> {
        self.indices.to_vec()
    }
}

/// register-machine interpreter
/// one instance can run any number of programs, from any number of threads;
/// every execution gets its own register file and only the buffer pool is shared
pub struct Interpreter {
    buffer_pool: Arc<BufferPool>,
}

impl Interpreter {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_buffer_pool(Arc::new(BufferPool::new(config.buffer_pool_capacity)))
    }

    /// share a buffer pool between interpreters
    pub fn with_buffer_pool(buffer_pool: Arc<BufferPool>) -> Self {
        Self { buffer_pool }
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.buffer_pool
    }

    /// run `program` over the columns of `source`
    pub fn execute<S: ColumnSource + ?Sized>(
        &self,
        program: &Program,
        source: &S,
    ) -> ExecutionResult<QueryResult> {
        let row_count = source.row_count();
        if row_count > u32::MAX as usize {
            error!(rows = row_count, "table exceeds 32-bit row indices");
            return Err(ExecutionError::TooManyRows { rows: row_count });
        }
        if let Err(err) = check_columns(program, source) {
            warn!(%err, "program rejected by column source");
            return Err(err);
        }

        let mut registers = RegisterFile::new(program.register_count());
        let pool = source.string_pool();
        for (pc, instruction) in program.instructions().iter().enumerate() {
            trace!(pc, %instruction, "step");
            self.step(instruction, &mut registers, source, pool, row_count as u32);
        }

        let indices = registers.take(program.output());
        for buffer in registers.drain_indices() {
            self.buffer_pool.return_indices(buffer);
        }
        debug!(
            instructions = program.len(),
            registers = program.register_count(),
            rows = indices.len(),
            "program executed"
        );
        Ok(QueryResult {
            row_count: indices.len(),
            indices,
        })
    }

    /// write a register, recycling the index buffer it may have held
    fn store<T: RegisterValue>(&self, registers: &mut RegisterFile, handle: Handle<T>, value: T) {
        if let Register::Indices(old) = registers.set(handle, value) {
            self.buffer_pool.return_indices(old);
        }
    }

    fn step<S: ColumnSource + ?Sized>(
        &self,
        instruction: &Instruction,
        registers: &mut RegisterFile,
        source: &S,
        pool: &StringPool,
        row_count: u32,
    ) {
        match instruction {
            Instruction::InitRange { dest } => {
                self.store(registers, *dest, IndexRange::new(0, row_count));
            }
            Instruction::EmptyRange { dest } => {
                self.store(registers, *dest, IndexRange::default());
            }
            Instruction::IdFilter { op, value, range } => {
                let mut r = *registers.get(*range);
                id_range(*op, registers.get(*value), &mut r);
                registers.set(*range, r);
            }
            Instruction::SortedFilter {
                column,
                op,
                value,
                range,
            } => {
                let mut r = *registers.get(*range);
                sorted_range(column_at(source, *column), *op, registers.get(*value), pool, &mut r);
                registers.set(*range, r);
            }
            Instruction::LoadScalar { value, dest } => {
                self.store(registers, *dest, load_scalar(value, pool));
            }
            Instruction::LoadScalarSet {
                values,
                probe,
                dest,
            } => {
                self.store(registers, *dest, load_set(values, *probe, pool));
            }
            Instruction::AllocateIndices { count, dest } => {
                let size = match count {
                    IndexCount::Range(h) => registers.get(*h).len(),
                    IndexCount::Indices(h) => registers.get(*h).len(),
                    IndexCount::SetBits(h) => registers.get(*h).count_set_bits(),
                };
                let buffer = self.buffer_pool.get_indices(size);
                self.store(registers, *dest, buffer);
            }
            Instruction::Iota { range, dest } => {
                let r = *registers.get(*range);
                let out = registers.get_mut(*dest);
                out.reserve(out.len() + r.len());
                for row in r.start..r.end {
                    out.push(row);
                }
            }
            Instruction::ScanFilter {
                column,
                predicate,
                range,
                dest,
            } => {
                let range = *registers.get(*range);
                let mut out = registers.take(*dest);
                let visitor = ScanInto {
                    range,
                    out: &mut out,
                };
                dispatch(column_at(source, *column), predicate, registers, pool, visitor);
                registers.set(*dest, out);
            }
            Instruction::RefineFilter {
                column,
                predicate,
                indices,
            } => {
                let mut buffer = registers.take(*indices);
                let visitor = Refine {
                    indices: &mut buffer,
                };
                dispatch(column_at(source, *column), predicate, registers, pool, visitor);
                registers.set(*indices, buffer);
            }
            Instruction::BitFilter {
                column,
                predicate,
                range,
                dest,
            } => {
                let range = *registers.get(*range);
                let bits = bit_filter(column_at(source, *column), predicate, registers, pool, range);
                self.store(registers, *dest, bits);
            }
            Instruction::AndBits { src, dest } => {
                let mut bits = registers.take(*dest);
                bits.and_into(registers.get(*src));
                registers.set(*dest, bits);
            }
            Instruction::BitsToIndices { bits, range, dest } => {
                let start = registers.get(*range).start;
                let mut out = registers.take(*dest);
                registers
                    .get(*bits)
                    .for_each_set_bit(|i| out.push(start + i as u32));
                registers.set(*dest, out);
            }
            Instruction::Sort {
                indices,
                keys,
                method,
            } => {
                let keys: Vec<KeyColumn<'_>> = keys
                    .iter()
                    .map(|k| KeyColumn::new(column_at(source, k.column), pool, k.direction))
                    .collect();
                match method {
                    SortMethod::Radix { scratch } => {
                        let mut rows = registers.take(*scratch);
                        let buffer = registers.get_mut(*indices);
                        let n = buffer.len();
                        rows.resize(n);
                        let mut radix_keys = self.buffer_pool.get_keys(2 * n);
                        radix_keys.resize(2 * n);
                        let spare = RadixScratch {
                            rows: rows.as_mut_slice(),
                            keys: radix_keys.as_mut_slice(),
                        };
                        sort_rows(buffer.as_mut_slice(), &keys, true, Some(spare));
                        self.buffer_pool.return_keys(radix_keys);
                        registers.set(*scratch, rows);
                    }
                    SortMethod::Comparison { stable } => {
                        sort_rows(registers.get_mut(*indices).as_mut_slice(), &keys, *stable, None);
                    }
                }
            }
            Instruction::Reverse { indices } => {
                registers.get_mut(*indices).as_mut_slice().reverse();
            }
            Instruction::DistinctSorted { indices, columns } => {
                let keys = distinct_keys(source, pool, columns);
                distinct_sorted(registers.get_mut(*indices), &keys);
            }
            Instruction::DistinctHashed { indices, columns } => {
                let keys = distinct_keys(source, pool, columns);
                distinct_hashed(registers.get_mut(*indices), &keys);
            }
            Instruction::LimitRange {
                range,
                offset,
                limit,
            } => limit_range(registers.get_mut(*range), *offset, *limit),
            Instruction::LimitIndices {
                indices,
                offset,
                limit,
            } => limit_indices(registers.get_mut(*indices), *offset, *limit),
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

/// every column the program reads must exist with the kind, nullability and
/// order it was compiled against
fn check_columns<S: ColumnSource + ?Sized>(program: &Program, source: &S) -> ExecutionResult<()> {
    for binding in program.columns() {
        let column = source
            .column(binding.column)
            .ok_or(ExecutionError::MissingColumn {
                column: binding.column,
                available: source.column_count(),
            })?;
        let mismatch = |expected: String, found: String| ExecutionError::SchemaMismatch {
            column: binding.column,
            expected,
            found,
        };
        if column.kind() != binding.kind {
            return Err(mismatch(binding.kind.to_string(), column.kind().to_string()));
        }
        if column.len() != source.row_count() {
            return Err(mismatch(
                format!("{} rows", source.row_count()),
                format!("{} rows", column.len()),
            ));
        }
        if !binding.nullable && column.is_nullable() {
            return Err(mismatch(
                format!("non-nullable {}", binding.kind),
                format!("nullable {}", column.kind()),
            ));
        }
        if binding.requires_sorted && column.sortedness() != Sortedness::Sorted {
            return Err(mismatch("sorted".to_string(), "unsorted".to_string()));
        }
    }
    Ok(())
}

/// columns were checked before the first instruction; a miss here is a bug
fn column_at<S: ColumnSource + ?Sized>(source: &S, index: usize) -> &Column {
    match source.column(index) {
        Some(column) => column,
        None => panic!("program reads unbound column {}", index),
    }
}

fn distinct_keys<'a, S: ColumnSource + ?Sized>(
    source: &'a S,
    pool: &'a StringPool,
    columns: &[usize],
) -> Vec<KeyColumn<'a>> {
    columns
        .iter()
        .map(|&c| KeyColumn::new(column_at(source, c), pool, Direction::Ascending))
        .collect()
}

fn load_scalar(value: &Constant, pool: &StringPool) -> Scalar {
    match value {
        Constant::Int(v) => Scalar::Int(*v),
        Constant::Double(v) => Scalar::Double(*v),
        Constant::String(text) => Scalar::String {
            id: pool.lookup(text),
            text: text.clone(),
        },
    }
}

/// strings absent from the pool can never match and are dropped, as are NaNs
fn load_set(values: &ConstantSet, probe: SetProbe, pool: &StringPool) -> ScalarSet {
    let hashed = probe == SetProbe::Hash;
    match values {
        ConstantSet::Int(v) => ScalarSet::Int(MembershipSet::build(v.iter().copied(), hashed)),
        ConstantSet::Double(v) => {
            ScalarSet::Double(MembershipSet::build(v.iter().filter_map(|d| double_key(*d)), hashed))
        }
        ConstantSet::String(v) => ScalarSet::String(MembershipSet::build(
            v.iter().filter_map(|s| pool.lookup(s)),
            hashed,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::builder::BytecodeBuilder;
    use crate::execution::bytecode::{Predicate, SortKeySpec};
    use crate::execution::program::{ColumnBinding, OutputShape};
    use crate::storage::{BitVector, Table};
    use crate::types::{CompareOp, ValueKind};

    fn table(values: &[i32]) -> Table {
        let mut table = Table::new();
        table
            .add_column("v", Column::from_values(values))
            .unwrap();
        table
    }

    fn binding(kind: ValueKind) -> ColumnBinding {
        ColumnBinding {
            column: 0,
            kind,
            nullable: false,
            requires_sorted: false,
        }
    }

    /// filter v != 5, sort asc, distinct on v
    fn distinct_program(kind: ValueKind) -> Program {
        let mut b = BytecodeBuilder::new();
        let range = b.allocate::<IndexRange>();
        b.emit(Instruction::InitRange { dest: range });
        let value = b.allocate::<Scalar>();
        b.emit(Instruction::LoadScalar {
            value: Constant::Int(5),
            dest: value,
        });
        let out = b.allocate_indices(IndexCount::Range(range));
        b.emit(Instruction::ScanFilter {
            column: 0,
            predicate: Predicate::Compare {
                op: CompareOp::Ne,
                value,
            },
            range,
            dest: out,
        });
        b.emit(Instruction::Sort {
            indices: out,
            keys: vec![SortKeySpec {
                column: 0,
                direction: Direction::Ascending,
            }],
            method: SortMethod::Comparison { stable: true },
        });
        b.emit(Instruction::DistinctSorted {
            indices: out,
            columns: vec![0],
        });
        b.build(out, vec![binding(kind)], OutputShape::default())
    }

    #[test]
    fn test_filter_sort_distinct() {
        let interpreter = Interpreter::default();
        let result = interpreter
            .execute(&distinct_program(ValueKind::Int32), &table(&[5, 3, 5, 1, 3]))
            .unwrap();
        assert_eq!(result.to_vec(), vec![3, 1]);
        assert_eq!(result.row_count, 2);
    }

    #[test]
    fn test_schema_mismatch_is_an_error() {
        let interpreter = Interpreter::default();
        let err = interpreter
            .execute(&distinct_program(ValueKind::Int64), &table(&[1, 2]))
            .unwrap_err();
        assert!(matches!(err, ExecutionError::SchemaMismatch { column: 0, .. }));

        let err = interpreter
            .execute(&distinct_program(ValueKind::Int32), &Table::new())
            .unwrap_err();
        assert_eq!(
            err,
            ExecutionError::MissingColumn {
                column: 0,
                available: 0
            }
        );
    }

    #[test]
    fn test_bit_filters_and_radix_sort() {
        let values = [4i32, -2, 9, 4, 0, 7, -2, 3];
        let mut b = BytecodeBuilder::new();
        let range = b.allocate::<IndexRange>();
        b.emit(Instruction::InitRange { dest: range });
        let lo = b.allocate::<Scalar>();
        b.emit(Instruction::LoadScalar {
            value: Constant::Int(-1),
            dest: lo,
        });
        let acc = b.allocate::<BitVector>();
        b.emit(Instruction::BitFilter {
            column: 0,
            predicate: Predicate::Compare {
                op: CompareOp::Gt,
                value: lo,
            },
            range,
            dest: acc,
        });
        let hi = b.allocate::<Scalar>();
        b.emit(Instruction::LoadScalar {
            value: Constant::Int(8),
            dest: hi,
        });
        let next = b.allocate::<BitVector>();
        b.emit(Instruction::BitFilter {
            column: 0,
            predicate: Predicate::Compare {
                op: CompareOp::Lt,
                value: hi,
            },
            range,
            dest: next,
        });
        b.emit(Instruction::AndBits {
            src: next,
            dest: acc,
        });
        let out = b.allocate_indices(IndexCount::SetBits(acc));
        b.emit(Instruction::BitsToIndices {
            bits: acc,
            range,
            dest: out,
        });
        let scratch = b.allocate_scratch(8, IndexCount::Indices(out));
        b.emit(Instruction::Sort {
            indices: out,
            keys: vec![SortKeySpec {
                column: 0,
                direction: Direction::Descending,
            }],
            method: SortMethod::Radix { scratch },
        });
        b.emit(Instruction::LimitIndices {
            indices: out,
            offset: 1,
            limit: Some(3),
        });
        let program = b.build(out, vec![binding(ValueKind::Int32)], OutputShape::default());

        let interpreter = Interpreter::default();
        let result = interpreter.execute(&program, &table(&values)).unwrap();
        // passing rows by value desc: 7(5) 4(0) 4(3) 3(7) 0(4)
        assert_eq!(result.to_vec(), vec![0, 3, 7]);
        // the scratch buffer and the radix keys went back to the pool
        assert!(!interpreter.buffer_pool().is_empty());
        assert_eq!(interpreter.buffer_pool().key_slabs(), 1);

        // a second run draws the same key slab instead of allocating
        let again = interpreter.execute(&program, &table(&values)).unwrap();
        assert_eq!(again.to_vec(), vec![0, 3, 7]);
        assert_eq!(interpreter.buffer_pool().key_slabs(), 1);
    }

    #[test]
    fn test_id_range_reverse_and_iota() {
        let mut b = BytecodeBuilder::new();
        let range = b.allocate::<IndexRange>();
        b.emit(Instruction::InitRange { dest: range });
        let value = b.allocate::<Scalar>();
        b.emit(Instruction::LoadScalar {
            value: Constant::Int(2),
            dest: value,
        });
        b.emit(Instruction::IdFilter {
            op: CompareOp::Ge,
            value,
            range,
        });
        b.emit(Instruction::LimitRange {
            range,
            offset: 0,
            limit: Some(2),
        });
        let out = b.allocate_indices(IndexCount::Range(range));
        b.emit(Instruction::Iota { range, dest: out });
        b.emit(Instruction::Reverse { indices: out });
        let program = b.build(out, Vec::new(), OutputShape::default());

        let result = Interpreter::default()
            .execute(&program, &table(&[0, 0, 0, 0, 0]))
            .unwrap();
        assert_eq!(result.to_vec(), vec![3, 2]);
    }

    #[test]
    fn test_string_set_drops_unknown_values() {
        let mut pool = StringPool::new();
        pool.intern("a");
        let set = load_set(
            &ConstantSet::String(vec![Arc::from("a"), Arc::from("zzz")]),
            SetProbe::BinarySearch,
            &pool,
        );
        match set {
            ScalarSet::String(members) => assert_eq!(members.len(), 1),
            other => panic!("unexpected set {:?}", other),
        }
    }
}
