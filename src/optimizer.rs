//! rewrite passes that run before instruction selection
//!
//! 1. constant folding: literals are cast to the column's kind, bounds are
//!    adjusted, and filters that can never match (or always match) are folded
//! 2. filter ordering: cheap range-shrinking filters first, declaration order
//!    breaks ties
//! 3. order planning: decide whether the requested sort order already holds

use std::cmp::Ordering;
use std::sync::Arc;

use regex::Regex;

use crate::config::EngineConfig;
use crate::error::{CompileError, CompileResult};
use crate::execution::bytecode::{Constant, ConstantSet, SetProbe, SortAlgorithm, SortKeySpec};
use crate::query::{Direction, Filter, Operand, SortKey};
use crate::schema::{ColumnSchema, Schema};
use crate::types::{CompareOp, FilterOp, Value, ValueKind};

/// per-row test of a folded filter
#[derive(Debug, Clone)]
pub enum ScanPredicate {
    Compare { op: CompareOp, value: Constant },
    In { values: ConstantSet, probe: SetProbe },
    IsNull,
    IsNotNull,
    Matches(Regex),
}

/// outcome of folding one filter
#[derive(Debug, Clone)]
pub enum Folded {
    /// matches every row, drop it
    Always,
    /// matches no row, the whole query is empty
    Never,
    Keep(ScanPredicate),
}

/// cost tiers, cheapest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FilterTier {
    /// arithmetic on the id column
    IdRange,
    /// binary search on a sorted column
    SortedRange,
    NullTest,
    Equality,
    Membership,
    Range,
    Inequality,
    Pattern,
}

/// a folded filter with its chosen strategy
#[derive(Debug, Clone)]
pub struct PlannedFilter {
    pub column: usize,
    pub tier: FilterTier,
    pub predicate: ScanPredicate,
}

impl PlannedFilter {
    /// narrows a contiguous range instead of scanning rows
    pub fn shrinks_range(&self) -> bool {
        matches!(self.tier, FilterTier::IdRange | FilterTier::SortedRange)
    }
}

/// result of the filter passes
#[derive(Debug, Clone)]
pub enum FilterPlan {
    Empty,
    Filters(Vec<PlannedFilter>),
}

/// how the candidate rows reach the requested order
#[derive(Debug, Clone, PartialEq)]
pub enum OrderPlan {
    /// row order already satisfies it
    Natural,
    /// row order reversed satisfies it
    Reverse,
    Sort {
        keys: Vec<SortKeySpec>,
        algorithm: SortAlgorithm,
        stable: bool,
    },
}

/// translate a shell glob into an anchored regex
/// `*` any run, `?` one char, `[...]` a class with `[!...]` negation
pub fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() + 8);
    out.push('^');
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                // copy the class through, or treat a lone '[' literally
                let mut class = String::new();
                let mut closed = false;
                if chars.peek() == Some(&'!') {
                    chars.next();
                    class.push('^');
                }
                if chars.peek() == Some(&']') {
                    chars.next();
                    class.push_str("\\]");
                }
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    if c == '\\' || c == '[' {
                        class.push('\\');
                    }
                    class.push(c);
                }
                if closed {
                    out.push('[');
                    out.push_str(&class);
                    out.push(']');
                } else {
                    out.push_str(&regex::escape("["));
                    out.push_str(&regex::escape(class.trim_start_matches('^')));
                }
            }
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4]))),
        }
    }
    out.push('$');
    out
}

/// fold one validated filter against its column
/// `index` is the filter's position in the query, used in errors
pub fn fold_filter(
    index: usize,
    filter: &Filter,
    column: &ColumnSchema,
    config: &EngineConfig,
) -> CompileResult<Folded> {
    let not_null = if column.nullable {
        Folded::Keep(ScanPredicate::IsNotNull)
    } else {
        Folded::Always
    };
    let mismatch = |value: &Value| CompileError::OperandTypeMismatch {
        filter: index,
        column: column.name.clone(),
        kind: column.kind,
        operand: value.type_name(),
    };

    match (filter.op, &filter.operand) {
        (FilterOp::IsNull, _) if column.nullable => Ok(Folded::Keep(ScanPredicate::IsNull)),
        (FilterOp::IsNull, _) => Ok(Folded::Never),
        (FilterOp::IsNotNull, _) => Ok(not_null),

        (FilterOp::Glob | FilterOp::Regex, Operand::Scalar(Value::String(pattern))) => {
            if filter.op == FilterOp::Glob && !pattern.is_empty() && pattern.chars().all(|c| c == '*') {
                return Ok(not_null);
            }
            let source = match filter.op {
                FilterOp::Glob => glob_to_regex(pattern),
                _ => pattern.clone(),
            };
            let regex = Regex::new(&source).map_err(|e| CompileError::InvalidPattern {
                filter: index,
                column: column.name.clone(),
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            Ok(Folded::Keep(ScanPredicate::Matches(regex)))
        }
        (FilterOp::Glob | FilterOp::Regex, Operand::Scalar(other)) => Err(mismatch(other)),

        (FilterOp::In, Operand::List(values)) => {
            let set = match cast_set(column.kind, values) {
                Ok(set) => set,
                Err(value) => return Err(mismatch(value)),
            };
            match set.len() {
                0 => Ok(Folded::Never),
                1 => {
                    let value = match set {
                        ConstantSet::Int(v) => Constant::Int(v[0]),
                        ConstantSet::Double(v) => Constant::Double(v[0]),
                        ConstantSet::String(v) => Constant::String(v[0].clone()),
                    };
                    Ok(Folded::Keep(ScanPredicate::Compare {
                        op: CompareOp::Eq,
                        value,
                    }))
                }
                n => {
                    let probe = if n >= config.hash_set_threshold {
                        SetProbe::Hash
                    } else {
                        SetProbe::BinarySearch
                    };
                    Ok(Folded::Keep(ScanPredicate::In { values: set, probe }))
                }
            }
        }

        (op, Operand::Scalar(value)) => {
            let Some(op) = op.as_compare() else {
                unreachable!("operand shape is validated before folding")
            };
            fold_compare(op, value, column.kind, not_null).ok_or_else(|| mismatch(value))
        }

        (_, _) => unreachable!("operand shape is validated before folding"),
    }
}

/// None when the literal's type does not fit the column
fn fold_compare(op: CompareOp, value: &Value, kind: ValueKind, not_null: Folded) -> Option<Folded> {
    let keep = |op, value| Folded::Keep(ScanPredicate::Compare { op, value });
    match (kind, value) {
        (ValueKind::String, Value::String(s)) => Some(keep(op, Constant::String(Arc::from(s.as_str())))),
        (ValueKind::String, _) | (_, Value::String(_)) => None,

        (ValueKind::Double, Value::Int(v)) => Some(fold_int_on_double(op, *v)),
        (ValueKind::Double, Value::Double(d)) if d.is_nan() => Some(Folded::Never),
        (ValueKind::Double, Value::Double(d)) => Some(keep(op, Constant::Double(*d))),

        (_, Value::Int(v)) => Some(fold_integer(op, *v as i128, kind, not_null)),
        (_, Value::Double(d)) => {
            let d = *d;
            if d.is_nan() {
                return Some(Folded::Never);
            }
            if d.fract() == 0.0 || d.is_infinite() {
                return Some(fold_integer(op, d as i128, kind, not_null));
            }
            // a fractional bound: move it onto the nearest integer inside
            Some(match op {
                CompareOp::Eq => Folded::Never,
                CompareOp::Ne => not_null,
                CompareOp::Lt | CompareOp::Le => {
                    fold_integer(CompareOp::Le, d.floor() as i128, kind, not_null)
                }
                CompareOp::Gt | CompareOp::Ge => {
                    fold_integer(CompareOp::Ge, d.ceil() as i128, kind, not_null)
                }
            })
        }
    }
}

/// compare a double column against an integer literal
/// past 2^53 the literal may have no exact double; no double lies strictly
/// between it and its rounded value, so the bound snaps onto that value
fn fold_int_on_double(op: CompareOp, v: i64) -> Folded {
    let keep = |op, d| {
        Folded::Keep(ScanPredicate::Compare {
            op,
            value: Constant::Double(d),
        })
    };
    let d = v as f64;
    let rounded = (d as i128).cmp(&(v as i128));
    match (op, rounded) {
        (op, Ordering::Equal) => keep(op, d),
        (CompareOp::Eq, _) => Folded::Never,
        // every value but NaN
        (CompareOp::Ne, _) => keep(CompareOp::Le, f64::INFINITY),
        (CompareOp::Lt | CompareOp::Le, Ordering::Greater) => keep(CompareOp::Lt, d),
        (CompareOp::Lt | CompareOp::Le, _) => keep(CompareOp::Le, d),
        (CompareOp::Gt | CompareOp::Ge, Ordering::Greater) => keep(CompareOp::Ge, d),
        (CompareOp::Gt | CompareOp::Ge, _) => keep(CompareOp::Gt, d),
    }
}

/// compare an integer column against an integer literal of any magnitude
fn fold_integer(op: CompareOp, v: i128, kind: ValueKind, not_null: Folded) -> Folded {
    let (min, max) = match kind.integer_bounds() {
        Some((min, max)) => (min as i128, max as i128),
        None => unreachable!("integer folding on {} column", kind),
    };
    let keep = |op, v: i128| {
        Folded::Keep(ScanPredicate::Compare {
            op,
            value: Constant::Int(v as i64),
        })
    };
    match op {
        CompareOp::Eq if v < min || v > max => Folded::Never,
        CompareOp::Ne if v < min || v > max => not_null,
        CompareOp::Lt if v <= min => Folded::Never,
        CompareOp::Lt if v > max => not_null,
        CompareOp::Le if v < min => Folded::Never,
        CompareOp::Le if v >= max => not_null,
        CompareOp::Gt if v >= max => Folded::Never,
        CompareOp::Gt if v < min => not_null,
        CompareOp::Ge if v > max => Folded::Never,
        CompareOp::Ge if v <= min => not_null,
        op => keep(op, v),
    }
}

/// cast an IN list to the column kind; values that can never match are
/// dropped, a literal of the wrong type is returned as the error
fn cast_set(kind: ValueKind, values: &[Value]) -> Result<ConstantSet, &Value> {
    match kind {
        ValueKind::String => values
            .iter()
            .map(|v| match v {
                Value::String(s) => Ok(Arc::from(s.as_str())),
                other => Err(other),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(ConstantSet::String),
        ValueKind::Double => {
            let mut out = Vec::with_capacity(values.len());
            for value in values {
                match value {
                    // no double equals an integer that does not survive the cast
                    Value::Int(v) if (*v as f64) as i128 == *v as i128 => out.push(*v as f64),
                    Value::Int(_) => {}
                    Value::Double(d) if d.is_nan() => {}
                    Value::Double(d) => out.push(*d),
                    other => return Err(other),
                }
            }
            Ok(ConstantSet::Double(out))
        }
        _ => {
            let (min, max) = kind.integer_bounds().unwrap_or((i64::MIN, i64::MAX));
            let mut out = Vec::with_capacity(values.len());
            for value in values {
                match value {
                    Value::Int(v) if (min..=max).contains(v) => out.push(*v),
                    Value::Int(_) => {}
                    Value::Double(d) if d.fract() == 0.0 && *d >= min as f64 && *d <= max as f64 => {
                        out.push(*d as i64)
                    }
                    Value::Double(_) => {}
                    other => return Err(other),
                }
            }
            out.sort_unstable();
            out.dedup();
            Ok(ConstantSet::Int(out))
        }
    }
}

/// tier of a folded filter on `column`
pub fn classify(predicate: &ScanPredicate, column: &ColumnSchema) -> FilterTier {
    match predicate {
        ScanPredicate::Compare { op, .. } if *op != CompareOp::Ne => {
            if column.kind == ValueKind::Id {
                FilterTier::IdRange
            } else if column.is_searchable() {
                FilterTier::SortedRange
            } else if *op == CompareOp::Eq {
                FilterTier::Equality
            } else {
                FilterTier::Range
            }
        }
        ScanPredicate::Compare { .. } => FilterTier::Inequality,
        ScanPredicate::In { .. } => FilterTier::Membership,
        ScanPredicate::IsNull | ScanPredicate::IsNotNull => FilterTier::NullTest,
        ScanPredicate::Matches(_) => FilterTier::Pattern,
    }
}

/// fold every filter and order the survivors by tier
/// filters must already be validated against the schema
pub fn plan_filters(
    filters: &[Filter],
    schema: &Schema,
    config: &EngineConfig,
) -> CompileResult<FilterPlan> {
    let mut planned = Vec::with_capacity(filters.len());
    let mut empty = false;
    for (index, filter) in filters.iter().enumerate() {
        let Some(column) = schema.column(filter.column) else {
            unreachable!("filter columns are validated before folding")
        };
        // keep folding after a Never so every filter still gets type-checked
        match fold_filter(index, filter, column, config)? {
            Folded::Always => {}
            Folded::Never => empty = true,
            Folded::Keep(predicate) => planned.push(PlannedFilter {
                column: filter.column,
                tier: classify(&predicate, column),
                predicate,
            }),
        }
    }
    if empty {
        return Ok(FilterPlan::Empty);
    }
    // stable: equal tiers keep declaration order
    planned.sort_by_key(|f| f.tier);
    Ok(FilterPlan::Filters(planned))
}

/// drop sort keys that can no longer change the order: repeats of an earlier
/// key and anything after a unique key
/// conflicting repeats are validated away before this runs
pub fn normalize_sort_keys(keys: &[SortKey], schema: &Schema) -> Vec<SortKey> {
    let mut out: Vec<SortKey> = Vec::with_capacity(keys.len());
    for key in keys {
        if out.iter().any(|k| k.column == key.column) {
            continue;
        }
        out.push(*key);
        if schema.column(key.column).is_some_and(|c| c.is_unique()) {
            break;
        }
    }
    out
}

/// choose how to produce `keys` from candidates still in row order
pub fn plan_order(keys: &[SortKey], schema: &Schema, config: &EngineConfig) -> OrderPlan {
    let Some(primary) = keys.first() else {
        return OrderPlan::Natural;
    };
    let Some(column) = schema.column(primary.column) else {
        unreachable!("sort columns are validated before planning")
    };

    if column.kind == ValueKind::Id {
        return match primary.direction {
            Direction::Ascending => OrderPlan::Natural,
            Direction::Descending => OrderPlan::Reverse,
        };
    }
    if keys.len() == 1 && primary.direction == Direction::Ascending && column.is_searchable() {
        return OrderPlan::Natural;
    }

    let large = schema
        .row_count_hint
        .is_some_and(|rows| rows >= config.radix_sort_threshold);
    let algorithm = if column.kind.is_integer() && large {
        SortAlgorithm::Radix
    } else {
        SortAlgorithm::Comparison
    };
    OrderPlan::Sort {
        keys: keys
            .iter()
            .map(|k| SortKeySpec {
                column: k.column,
                direction: k.direction,
            })
            .collect(),
        algorithm,
        stable: !column.is_unique(),
    }
}
