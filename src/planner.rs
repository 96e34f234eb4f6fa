use tracing::{debug, trace};

use crate::config::{ConfigError, EngineConfig};
use crate::error::{CompileError, CompileResult};
use crate::execution::builder::BytecodeBuilder;
use crate::execution::bytecode::{IndexCount, Indices, Instruction, Predicate, SortAlgorithm, SortMethod};
use crate::execution::program::{ColumnBinding, OutputShape, Program};
use crate::execution::registers::{Handle, IndexRange, Scalar, ScalarSet};
use crate::optimizer::{
    FilterPlan, FilterTier, OrderPlan, PlannedFilter, ScanPredicate, normalize_sort_keys,
    plan_filters, plan_order,
};
use crate::query::{Operand, QuerySpec, SortKey};
use crate::schema::Schema;
use crate::storage::BitVector;
use crate::types::OperatorClass;

/// the working set of candidate rows while instructions are emitted
#[derive(Debug, Clone, Copy)]
enum Candidates {
    /// still a contiguous row range, in row order
    Range(Handle<IndexRange>),
    Indices(Handle<Indices>),
}

/// compiles query specifications into bytecode programs
/// compilation is a pure function of (schema, spec, config)
pub struct QueryPlanner {
    config: EngineConfig,
}

impl Default for QueryPlanner {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }
}

impl QueryPlanner {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn compile(&self, schema: &Schema, spec: &QuerySpec) -> CompileResult<Program> {
        // step 1: reject anything the schema cannot answer
        validate(schema, spec)?;

        // step 2: fold and order the filters
        let filter_plan = plan_filters(&spec.filters, schema, &self.config)?;

        let mut emitter = Emitter {
            builder: BytecodeBuilder::new(),
            bindings: referenced_columns(schema, spec),
            schema,
            config: &self.config,
        };
        let sort_keys = normalize_sort_keys(&spec.sort_keys, schema);
        let range = emitter.builder.allocate::<IndexRange>();

        let (output, shape) = match filter_plan {
            FilterPlan::Empty => {
                emitter.builder.emit(Instruction::EmptyRange { dest: range });
                let out = emitter.materialize(Candidates::Range(range));
                let shape = OutputShape {
                    order: sort_keys,
                    distinct: spec.distinct.is_some(),
                    max_rows: Some(0),
                    always_empty: true,
                };
                (out, shape)
            }
            FilterPlan::Filters(filters) => {
                emitter.builder.emit(Instruction::InitRange { dest: range });

                // step 3: filters, range-shrinking ones first
                let candidates = emitter.emit_filters(range, &filters);

                // step 4: ordering, then distinct, then limit
                let (candidates, order) = emitter.emit_order(candidates, &sort_keys);
                let candidates = match &spec.distinct {
                    Some(columns) => emitter.emit_distinct(candidates, columns, &order),
                    None => candidates,
                };
                let candidates = emitter.emit_limit(candidates, spec.offset, spec.limit);

                let out = emitter.materialize(candidates);
                let shape = OutputShape {
                    order,
                    distinct: spec.distinct.is_some(),
                    max_rows: spec.limit,
                    always_empty: false,
                };
                (out, shape)
            }
        };

        let program = emitter.builder.build(output, emitter.bindings, shape);
        debug!(
            filters = spec.filters.len(),
            instructions = program.len(),
            registers = program.register_count(),
            "query compiled"
        );
        trace!("program listing:\n{}", program);
        Ok(program)
    }
}

/// validate column references, operator legality and operand shapes
fn validate(schema: &Schema, spec: &QuerySpec) -> CompileResult<()> {
    let unknown = |context: &'static str, column: usize| CompileError::UnknownColumn {
        context,
        column,
        schema_len: schema.len(),
    };

    for (index, filter) in spec.filters.iter().enumerate() {
        let column = schema
            .column(filter.column)
            .ok_or_else(|| unknown("filter", filter.column))?;
        if !column.kind.supports(filter.op) {
            return Err(CompileError::IllegalOperator {
                filter: index,
                column: column.name.clone(),
                kind: column.kind,
                op: filter.op,
            });
        }
        let expected = match (filter.op.class(), &filter.operand) {
            (OperatorClass::NullTest, Operand::None) => None,
            (OperatorClass::NullTest, _) => Some("no operand"),
            (OperatorClass::SetMembership, Operand::List(_)) => None,
            (OperatorClass::SetMembership, _) => Some("a list of values"),
            (_, Operand::Scalar(_)) => None,
            (_, _) => Some("a single value"),
        };
        if let Some(expected) = expected {
            return Err(CompileError::OperandShape {
                filter: index,
                column: column.name.clone(),
                op: filter.op,
                expected,
            });
        }
    }

    for (i, key) in spec.sort_keys.iter().enumerate() {
        let column = schema
            .column(key.column)
            .ok_or_else(|| unknown("sort key", key.column))?;
        let conflict = spec.sort_keys[..i]
            .iter()
            .any(|k| k.column == key.column && k.direction != key.direction);
        if conflict {
            return Err(CompileError::ConflictingSortKeys {
                column: column.name.clone(),
            });
        }
    }

    if let Some(columns) = &spec.distinct {
        if columns.is_empty() {
            return Err(CompileError::EmptyDistinct);
        }
        for &column in columns {
            schema
                .column(column)
                .ok_or_else(|| unknown("distinct", column))?;
        }
    }
    Ok(())
}

/// a binding for every column the query mentions
fn referenced_columns(schema: &Schema, spec: &QuerySpec) -> Vec<ColumnBinding> {
    let filters = spec.filters.iter().map(|f| f.column);
    let keys = spec.sort_keys.iter().map(|k| k.column);
    let distinct = spec.distinct.iter().flatten().copied();
    filters
        .chain(keys)
        .chain(distinct)
        .filter_map(|c| {
            schema.column(c).map(|col| ColumnBinding {
                column: c,
                kind: col.kind,
                nullable: col.nullable,
                requires_sorted: false,
            })
        })
        .collect()
}

/// instruction selection for one compilation
struct Emitter<'a> {
    builder: BytecodeBuilder,
    bindings: Vec<ColumnBinding>,
    schema: &'a Schema,
    config: &'a EngineConfig,
}

impl Emitter<'_> {
    /// record that the program depends on `column` being sorted
    fn require_sorted(&mut self, column: usize) {
        if let Some(col) = self.schema.column(column) {
            self.bindings.push(ColumnBinding {
                column,
                kind: col.kind,
                nullable: col.nullable,
                requires_sorted: true,
            });
        }
    }

    fn emit_filters(&mut self, range: Handle<IndexRange>, filters: &[PlannedFilter]) -> Candidates {
        let (shrinking, scans): (Vec<&PlannedFilter>, Vec<&PlannedFilter>) =
            filters.iter().partition(|f| f.shrinks_range());

        for filter in shrinking {
            let ScanPredicate::Compare { op, value } = &filter.predicate else {
                unreachable!("range filters are comparisons")
            };
            let scalar = self.builder.allocate::<Scalar>();
            self.builder.emit(Instruction::LoadScalar {
                value: value.clone(),
                dest: scalar,
            });
            if filter.tier == FilterTier::IdRange {
                self.builder.emit(Instruction::IdFilter {
                    op: *op,
                    value: scalar,
                    range,
                });
            } else {
                self.require_sorted(filter.column);
                self.builder.emit(Instruction::SortedFilter {
                    column: filter.column,
                    op: *op,
                    value: scalar,
                    range,
                });
            }
            self.builder.release(scalar);
        }

        if scans.is_empty() {
            return Candidates::Range(range);
        }
        let indices = if scans.len() >= self.config.bit_vector_filter_threshold {
            self.emit_bit_filters(range, &scans)
        } else {
            self.emit_scan_filters(range, &scans)
        };
        self.builder.release(range);
        Candidates::Indices(indices)
    }

    /// scan the first filter into a buffer, refine it with the rest
    fn emit_scan_filters(&mut self, range: Handle<IndexRange>, scans: &[&PlannedFilter]) -> Handle<Indices> {
        let out = self.builder.allocate_indices(IndexCount::Range(range));
        for (i, filter) in scans.iter().enumerate() {
            let (predicate, operand) = self.load_predicate(&filter.predicate);
            if i == 0 {
                self.builder.emit(Instruction::ScanFilter {
                    column: filter.column,
                    predicate,
                    range,
                    dest: out,
                });
            } else {
                self.builder.emit(Instruction::RefineFilter {
                    column: filter.column,
                    predicate,
                    indices: out,
                });
            }
            self.release_operand(operand);
        }
        out
    }

    /// evaluate every filter into a bit vector over the range and AND them
    fn emit_bit_filters(&mut self, range: Handle<IndexRange>, scans: &[&PlannedFilter]) -> Handle<Indices> {
        let acc = self.builder.allocate::<BitVector>();
        for (i, filter) in scans.iter().enumerate() {
            let (predicate, operand) = self.load_predicate(&filter.predicate);
            if i == 0 {
                self.builder.emit(Instruction::BitFilter {
                    column: filter.column,
                    predicate,
                    range,
                    dest: acc,
                });
            } else {
                let bits = self.builder.allocate::<BitVector>();
                self.builder.emit(Instruction::BitFilter {
                    column: filter.column,
                    predicate,
                    range,
                    dest: bits,
                });
                self.builder.emit(Instruction::AndBits { src: bits, dest: acc });
                self.builder.release(bits);
            }
            self.release_operand(operand);
        }
        let out = self.builder.allocate_indices(IndexCount::SetBits(acc));
        self.builder.emit(Instruction::BitsToIndices {
            bits: acc,
            range,
            dest: out,
        });
        self.builder.release(acc);
        out
    }

    /// emit the operand loads of a predicate
    fn load_predicate(&mut self, predicate: &ScanPredicate) -> (Predicate, OperandRegister) {
        match predicate {
            ScanPredicate::Compare { op, value } => {
                let dest = self.builder.allocate::<Scalar>();
                self.builder.emit(Instruction::LoadScalar {
                    value: value.clone(),
                    dest,
                });
                (Predicate::Compare { op: *op, value: dest }, OperandRegister::Scalar(dest))
            }
            ScanPredicate::In { values, probe } => {
                let dest = self.builder.allocate::<ScalarSet>();
                self.builder.emit(Instruction::LoadScalarSet {
                    values: values.clone(),
                    probe: *probe,
                    dest,
                });
                (Predicate::In { set: dest }, OperandRegister::Set(dest))
            }
            ScanPredicate::IsNull => (Predicate::IsNull, OperandRegister::None),
            ScanPredicate::IsNotNull => (Predicate::IsNotNull, OperandRegister::None),
            ScanPredicate::Matches(regex) => (Predicate::Matches(regex.clone()), OperandRegister::None),
        }
    }

    fn release_operand(&mut self, operand: OperandRegister) {
        match operand {
            OperandRegister::Scalar(h) => self.builder.release(h),
            OperandRegister::Set(h) => self.builder.release(h),
            OperandRegister::None => {}
        }
    }

    /// turn a range into an index buffer holding its rows
    fn materialize(&mut self, candidates: Candidates) -> Handle<Indices> {
        match candidates {
            Candidates::Indices(indices) => indices,
            Candidates::Range(range) => {
                let out = self.builder.allocate_indices(IndexCount::Range(range));
                self.builder.emit(Instruction::Iota { range, dest: out });
                self.builder.release(range);
                out
            }
        }
    }

    /// returns the candidates and the keys they are now ordered by
    fn emit_order(&mut self, candidates: Candidates, keys: &[SortKey]) -> (Candidates, Vec<SortKey>) {
        match plan_order(keys, self.schema, self.config) {
            OrderPlan::Natural => {
                if let Some(key) = keys.first() {
                    if self.schema.column(key.column).is_some_and(|c| !c.is_unique()) {
                        self.require_sorted(key.column);
                    }
                }
                (candidates, keys.to_vec())
            }
            OrderPlan::Reverse => {
                let indices = self.materialize(candidates);
                self.builder.emit(Instruction::Reverse { indices });
                (Candidates::Indices(indices), keys.to_vec())
            }
            OrderPlan::Sort {
                keys: specs,
                algorithm,
                stable,
            } => {
                let indices = self.materialize(candidates);
                let method = match algorithm {
                    SortAlgorithm::Radix => {
                        let expected = self.schema.row_count_hint.unwrap_or(0);
                        let scratch = self.builder.allocate_scratch(expected, IndexCount::Indices(indices));
                        SortMethod::Radix { scratch }
                    }
                    SortAlgorithm::Comparison => SortMethod::Comparison { stable },
                };
                self.builder.emit(Instruction::Sort {
                    indices,
                    keys: specs,
                    method,
                });
                if let SortMethod::Radix { scratch } = method {
                    self.builder.release_scratch(scratch);
                }
                (Candidates::Indices(indices), keys.to_vec())
            }
        }
    }

    fn emit_distinct(&mut self, candidates: Candidates, columns: &[usize], order: &[SortKey]) -> Candidates {
        let mut columns = columns.to_vec();
        columns.sort_unstable();
        columns.dedup();

        // rows are already unique when a unique column takes part
        if columns
            .iter()
            .any(|&c| self.schema.column(c).is_some_and(|col| col.is_unique()))
        {
            return candidates;
        }

        let sorted_on = |column: usize| {
            self.schema
                .column(column)
                .is_some_and(|c| c.is_searchable())
        };
        let adjacent = if order.is_empty() {
            // row order is ascending on a searchable column
            columns.len() == 1 && sorted_on(columns[0])
        } else {
            order.len() >= columns.len() && {
                let mut prefix: Vec<usize> = order[..columns.len()].iter().map(|k| k.column).collect();
                prefix.sort_unstable();
                prefix == columns
            }
        };

        if adjacent && order.is_empty() {
            self.require_sorted(columns[0]);
        }
        let indices = self.materialize(candidates);
        if adjacent {
            self.builder.emit(Instruction::DistinctSorted { indices, columns });
        } else {
            self.builder.emit(Instruction::DistinctHashed { indices, columns });
        }
        Candidates::Indices(indices)
    }

    fn emit_limit(&mut self, candidates: Candidates, offset: Option<usize>, limit: Option<usize>) -> Candidates {
        if offset.is_none() && limit.is_none() {
            return candidates;
        }
        let offset = offset.unwrap_or(0);
        match candidates {
            Candidates::Range(range) => {
                self.builder.emit(Instruction::LimitRange { range, offset, limit });
            }
            Candidates::Indices(indices) => {
                self.builder.emit(Instruction::LimitIndices {
                    indices,
                    offset,
                    limit,
                });
            }
        }
        candidates
    }
}

/// operand register a predicate holds until its filter has run
enum OperandRegister {
    None,
    Scalar(Handle<Scalar>),
    Set(Handle<ScalarSet>),
}
