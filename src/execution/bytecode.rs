//! the closed instruction set executed by the interpreter
//!
//! instructions are straight-line: no jumps, no loops. each one reads zero or
//! more registers and columns and writes exactly one register. value-kind
//! checks happen when the compiler emits an instruction, so the interpreter
//! only switches on the opcode

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use super::registers::{Handle, IndexRange, Scalar, ScalarSet};
use crate::query::Direction;
use crate::storage::{BitVector, FlexVector};
use crate::types::CompareOp;

pub type Indices = FlexVector<u32>;

/// compile-time literal, turned into a [`Scalar`] by `LoadScalar`
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    Double(f64),
    String(Arc<str>),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "{}", v),
            Constant::Double(v) => write!(f, "{:?}", v),
            Constant::String(v) => write!(f, "'{}'", v),
        }
    }
}

/// compile-time operand list of an IN filter
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantSet {
    Int(Vec<i64>),
    Double(Vec<f64>),
    String(Vec<Arc<str>>),
}

impl ConstantSet {
    pub fn len(&self) -> usize {
        match self {
            ConstantSet::Int(v) => v.len(),
            ConstantSet::Double(v) => v.len(),
            ConstantSet::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// how an operand set is probed per row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetProbe {
    BinarySearch,
    Hash,
}

/// per-row test carried by the scan-type filters
#[derive(Debug, Clone)]
pub enum Predicate {
    Compare { op: CompareOp, value: Handle<Scalar> },
    In { set: Handle<ScalarSet> },
    IsNull,
    IsNotNull,
    /// unanchored search over string content; globs arrive already translated
    Matches(Regex),
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Compare { op, value } => write!(f, "{} {}", op, value),
            Predicate::In { set } => write!(f, "IN {}", set),
            Predicate::IsNull => write!(f, "IS NULL"),
            Predicate::IsNotNull => write!(f, "IS NOT NULL"),
            Predicate::Matches(regex) => write!(f, "MATCHES /{}/", regex.as_str()),
        }
    }
}

/// sort strategy chosen at compile time, before registers exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortAlgorithm {
    Comparison,
    Radix,
}

/// how a `Sort` instruction orders its buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortMethod {
    /// comparison sort, std's merge sort when stable
    Comparison { stable: bool },
    /// stable LSD radix over the primary key, integer kinds only;
    /// ping-pongs through `scratch`
    Radix { scratch: Handle<Indices> },
}

impl fmt::Display for SortMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortMethod::Comparison { stable: true } => write!(f, "Comparison, stable"),
            SortMethod::Comparison { stable: false } => write!(f, "Comparison"),
            SortMethod::Radix { scratch } => write!(f, "Radix, scratch {}", scratch),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKeySpec {
    pub column: usize,
    pub direction: Direction,
}

/// where `AllocateIndices` takes its exact size from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexCount {
    Range(Handle<IndexRange>),
    Indices(Handle<Indices>),
    SetBits(Handle<BitVector>),
}

#[derive(Debug, Clone)]
pub enum Instruction {
    /// dest = [0, row_count)
    InitRange { dest: Handle<IndexRange> },

    /// dest = [0, 0), emitted when a filter is statically false
    EmptyRange { dest: Handle<IndexRange> },

    /// narrow a range with arithmetic on the id column
    IdFilter {
        op: CompareOp,
        value: Handle<Scalar>,
        range: Handle<IndexRange>,
    },

    /// narrow a range by binary search on a sorted, null-free column
    SortedFilter {
        column: usize,
        op: CompareOp,
        value: Handle<Scalar>,
        range: Handle<IndexRange>,
    },

    LoadScalar {
        value: Constant,
        dest: Handle<Scalar>,
    },

    LoadScalarSet {
        values: ConstantSet,
        probe: SetProbe,
        dest: Handle<ScalarSet>,
    },

    /// dest = empty index buffer from the pool, sized exactly by `count`
    AllocateIndices {
        count: IndexCount,
        dest: Handle<Indices>,
    },

    /// append every row of `range` to `dest`
    Iota {
        range: Handle<IndexRange>,
        dest: Handle<Indices>,
    },

    /// append the rows of `range` that pass `predicate` to `dest`
    ScanFilter {
        column: usize,
        predicate: Predicate,
        range: Handle<IndexRange>,
        dest: Handle<Indices>,
    },

    /// drop the rows of `indices` that fail `predicate`, order preserved
    RefineFilter {
        column: usize,
        predicate: Predicate,
        indices: Handle<Indices>,
    },

    /// dest bit i = predicate(range.start + i)
    BitFilter {
        column: usize,
        predicate: Predicate,
        range: Handle<IndexRange>,
        dest: Handle<BitVector>,
    },

    /// dest &= src
    AndBits {
        src: Handle<BitVector>,
        dest: Handle<BitVector>,
    },

    /// append range.start + i for every set bit i
    BitsToIndices {
        bits: Handle<BitVector>,
        range: Handle<IndexRange>,
        dest: Handle<Indices>,
    },

    Sort {
        indices: Handle<Indices>,
        keys: Vec<SortKeySpec>,
        method: SortMethod,
    },

    Reverse { indices: Handle<Indices> },

    /// keep the first row of each adjacent run of equal keys
    DistinctSorted {
        indices: Handle<Indices>,
        columns: Vec<usize>,
    },

    /// keep the first occurrence of each key, order preserved
    DistinctHashed {
        indices: Handle<Indices>,
        columns: Vec<usize>,
    },

    LimitRange {
        range: Handle<IndexRange>,
        offset: usize,
        limit: Option<usize>,
    },

    LimitIndices {
        indices: Handle<Indices>,
        offset: usize,
        limit: Option<usize>,
    },
}

impl Instruction {
    pub fn name(&self) -> &'static str {
        match self {
            Instruction::InitRange { .. } => "InitRange",
            Instruction::EmptyRange { .. } => "EmptyRange",
            Instruction::IdFilter { .. } => "IdFilter",
            Instruction::SortedFilter { .. } => "SortedFilter",
            Instruction::LoadScalar { .. } => "LoadScalar",
            Instruction::LoadScalarSet { .. } => "LoadScalarSet",
            Instruction::AllocateIndices { .. } => "AllocateIndices",
            Instruction::Iota { .. } => "Iota",
            Instruction::ScanFilter { .. } => "ScanFilter",
            Instruction::RefineFilter { .. } => "RefineFilter",
            Instruction::BitFilter { .. } => "BitFilter",
            Instruction::AndBits { .. } => "AndBits",
            Instruction::BitsToIndices { .. } => "BitsToIndices",
            Instruction::Sort { .. } => "Sort",
            Instruction::Reverse { .. } => "Reverse",
            Instruction::DistinctSorted { .. } => "DistinctSorted",
            Instruction::DistinctHashed { .. } => "DistinctHashed",
            Instruction::LimitRange { .. } => "LimitRange",
            Instruction::LimitIndices { .. } => "LimitIndices",
        }
    }

    /// index of the register this instruction writes
    pub fn output_register(&self) -> u32 {
        match self {
            Instruction::InitRange { dest } | Instruction::EmptyRange { dest } => dest.index,
            Instruction::IdFilter { range, .. } | Instruction::SortedFilter { range, .. } => {
                range.index
            }
            Instruction::LoadScalar { dest, .. } => dest.index,
            Instruction::LoadScalarSet { dest, .. } => dest.index,
            Instruction::AllocateIndices { dest, .. }
            | Instruction::Iota { dest, .. }
            | Instruction::ScanFilter { dest, .. }
            | Instruction::BitsToIndices { dest, .. } => dest.index,
            Instruction::BitFilter { dest, .. } | Instruction::AndBits { dest, .. } => dest.index,
            Instruction::RefineFilter { indices, .. }
            | Instruction::Sort { indices, .. }
            | Instruction::Reverse { indices }
            | Instruction::DistinctSorted { indices, .. }
            | Instruction::DistinctHashed { indices, .. }
            | Instruction::LimitIndices { indices, .. } => indices.index,
            Instruction::LimitRange { range, .. } => range.index,
        }
    }
}

fn fmt_columns(columns: &[usize]) -> String {
    let parts: Vec<String> = columns.iter().map(|c| format!("col{}", c)).collect();
    parts.join(", ")
}

fn fmt_limit(f: &mut fmt::Formatter<'_>, offset: usize, limit: Option<usize>) -> fmt::Result {
    match limit {
        Some(limit) => write!(f, " offset={} limit={}", offset, limit),
        None => write!(f, " offset={}", offset),
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<16}", self.name())?;
        match self {
            Instruction::InitRange { dest } | Instruction::EmptyRange { dest } => {
                write!(f, "{}", dest)
            }
            Instruction::IdFilter { op, value, range } => {
                write!(f, "{} <- id {} {}", range, op, value)
            }
            Instruction::SortedFilter {
                column,
                op,
                value,
                range,
            } => write!(f, "{} <- col{} {} {}", range, column, op, value),
            Instruction::LoadScalar { value, dest } => write!(f, "{} <- {}", dest, value),
            Instruction::LoadScalarSet {
                values,
                probe,
                dest,
            } => write!(f, "{} <- {} values ({:?})", dest, values.len(), probe),
            Instruction::AllocateIndices { count, dest } => {
                let source = match count {
                    IndexCount::Range(h) => format!("len {}", h),
                    IndexCount::Indices(h) => format!("len {}", h),
                    IndexCount::SetBits(h) => format!("popcount {}", h),
                };
                write!(f, "{} <- [{}]", dest, source)
            }
            Instruction::Iota { range, dest } => write!(f, "{} <- {}", dest, range),
            Instruction::ScanFilter {
                column,
                predicate,
                range,
                dest,
            } => write!(f, "{} <- {} where col{} {}", dest, range, column, predicate),
            Instruction::RefineFilter {
                column,
                predicate,
                indices,
            } => write!(f, "{} where col{} {}", indices, column, predicate),
            Instruction::BitFilter {
                column,
                predicate,
                range,
                dest,
            } => write!(f, "{} <- {} where col{} {}", dest, range, column, predicate),
            Instruction::AndBits { src, dest } => write!(f, "{} &= {}", dest, src),
            Instruction::BitsToIndices { bits, range, dest } => {
                write!(f, "{} <- {} over {}", dest, bits, range)
            }
            Instruction::Sort {
                indices,
                keys,
                method,
            } => {
                let keys: Vec<String> = keys
                    .iter()
                    .map(|k| format!("col{} {}", k.column, k.direction))
                    .collect();
                write!(f, "{} by {} ({})", indices, keys.join(", "), method)
            }
            Instruction::Reverse { indices } => write!(f, "{}", indices),
            Instruction::DistinctSorted { indices, columns }
            | Instruction::DistinctHashed { indices, columns } => {
                write!(f, "{} on {}", indices, fmt_columns(columns))
            }
            Instruction::LimitRange {
                range,
                offset,
                limit,
            } => {
                write!(f, "{}", range)?;
                fmt_limit(f, *offset, *limit)
            }
            Instruction::LimitIndices {
                indices,
                offset,
                limit,
            } => {
                write!(f, "{}", indices)?;
                fmt_limit(f, *offset, *limit)
            }
        }
    }
}
