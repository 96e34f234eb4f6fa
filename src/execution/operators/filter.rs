//! per-row predicate evaluation over column storage
//!
//! the column kind and predicate are matched once per instruction; the row
//! loop then runs a monomorphized closure, so the hot path never switches on
//! the value kind

use std::cmp::Ordering;

use crate::execution::bytecode::{Indices, Predicate};
use crate::execution::registers::{IndexRange, RegisterFile, Scalar, ScalarSet, double_key};
use crate::storage::{BitVector, Column, ColumnData, StringId, StringPool};
use crate::types::{CompareOp, search_cmp_f64};

/// consumer of a row test
/// lets one dispatch routine drive scan, refine and bit-vector filters
pub trait RowTestVisitor {
    type Output;

    fn visit<F: Fn(u32) -> bool>(self, test: F) -> Self::Output;
}

/// append the rows of a range that pass to an index buffer
pub struct ScanInto<'a> {
    pub range: IndexRange,
    pub out: &'a mut Indices,
}

impl RowTestVisitor for ScanInto<'_> {
    type Output = ();

    fn visit<F: Fn(u32) -> bool>(self, test: F) {
        for row in self.range.start..self.range.end {
            if test(row) {
                self.out.push(row);
            }
        }
    }
}

/// drop failing rows from an index buffer in place
pub struct Refine<'a> {
    pub indices: &'a mut Indices,
}

impl RowTestVisitor for Refine<'_> {
    type Output = ();

    fn visit<F: Fn(u32) -> bool>(self, test: F) {
        self.indices.retain(test);
    }
}

/// evaluate a range into a bit vector, bit i for row range.start + i
pub struct IntoBits {
    pub range: IndexRange,
}

impl RowTestVisitor for IntoBits {
    type Output = BitVector;

    fn visit<F: Fn(u32) -> bool>(self, test: F) -> BitVector {
        let start = self.range.start;
        BitVector::from_fn(self.range.len(), |i| test(start + i as u32))
    }
}

/// evaluate `predicate` over a range into a bit vector
/// null tests copy whole words of the validity mask
pub fn bit_filter(
    column: &Column,
    predicate: &Predicate,
    registers: &RegisterFile,
    pool: &StringPool,
    range: IndexRange,
) -> BitVector {
    let (start, end) = (range.start as usize, range.end as usize);
    match (predicate, column.validity()) {
        (Predicate::IsNotNull, Some(validity)) => validity.slice(start, end),
        (Predicate::IsNull, Some(validity)) => {
            let mut bits = validity.slice(start, end);
            bits.not_in_place();
            bits
        }
        (Predicate::IsNotNull, None) => BitVector::new_all_set(range.len()),
        (Predicate::IsNull, None) => BitVector::new(range.len()),
        _ => dispatch(column, predicate, registers, pool, IntoBits { range }),
    }
}

/// pick the row test for `predicate` on `column` and hand it to `visitor`
pub fn dispatch<V: RowTestVisitor>(
    column: &Column,
    predicate: &Predicate,
    registers: &RegisterFile,
    pool: &StringPool,
    visitor: V,
) -> V::Output {
    let validity = column.validity();
    match predicate {
        Predicate::IsNull => match validity {
            Some(v) => visitor.visit(|row| !v.get(row as usize)),
            None => visitor.visit(|_| false),
        },
        Predicate::IsNotNull => match validity {
            Some(v) => visitor.visit(|row| v.get(row as usize)),
            None => visitor.visit(|_| true),
        },
        Predicate::Compare { op, value } => {
            compare(column, *op, registers.get(*value), pool, visitor)
        }
        Predicate::In { set } => member(column, registers.get(*set), visitor),
        Predicate::Matches(regex) => match column.data() {
            ColumnData::String(ids) => {
                let ids = ids.as_slice();
                non_null(validity, visitor, |row| {
                    regex.is_match(pool.get(ids[row as usize]))
                })
            }
            other => panic!("pattern filter on {} column", other.kind()),
        },
    }
}

/// wrap `test` with the validity check when the column can hold nulls
#[inline]
fn non_null<V: RowTestVisitor, F: Fn(u32) -> bool>(
    validity: Option<&BitVector>,
    visitor: V,
    test: F,
) -> V::Output {
    match validity {
        Some(v) if !v.all_set() => visitor.visit(|row| v.get(row as usize) && test(row)),
        _ => visitor.visit(test),
    }
}

fn compare_ints<V: RowTestVisitor, T: Copy + Into<i64>>(
    values: &[T],
    validity: Option<&BitVector>,
    op: CompareOp,
    operand: i64,
    visitor: V,
) -> V::Output {
    non_null(validity, visitor, |row| {
        op.matches(values[row as usize].into().cmp(&operand))
    })
}

fn compare<V: RowTestVisitor>(
    column: &Column,
    op: CompareOp,
    operand: &Scalar,
    pool: &StringPool,
    visitor: V,
) -> V::Output {
    let validity = column.validity();
    match (column.data(), operand) {
        (ColumnData::Id, Scalar::Int(b)) => {
            let b = *b;
            visitor.visit(move |row| op.matches((row as i64).cmp(&b)))
        }
        (ColumnData::Uint32(s), Scalar::Int(b)) => {
            compare_ints(s.as_slice(), validity, op, *b, visitor)
        }
        (ColumnData::Int32(s), Scalar::Int(b)) => {
            compare_ints(s.as_slice(), validity, op, *b, visitor)
        }
        (ColumnData::Int64(s), Scalar::Int(b)) => {
            compare_ints(s.as_slice(), validity, op, *b, visitor)
        }
        (ColumnData::Double(s), Scalar::Double(b)) => {
            let (values, b) = (s.as_slice(), *b);
            non_null(validity, visitor, move |row| {
                op.eval_f64(values[row as usize], b)
            })
        }
        (ColumnData::String(s), Scalar::String { text, id }) => {
            let ids = s.as_slice();
            match (op, id) {
                // equality on interned ids never touches the text
                (CompareOp::Eq, Some(id)) => {
                    let id = *id;
                    non_null(validity, visitor, move |row| ids[row as usize] == id)
                }
                (CompareOp::Ne, Some(id)) => {
                    let id = *id;
                    non_null(validity, visitor, move |row| ids[row as usize] != id)
                }
                (CompareOp::Eq, None) => visitor.visit(|_| false),
                (CompareOp::Ne, None) => non_null(validity, visitor, |_| true),
                _ => {
                    let text: &str = text;
                    non_null(validity, visitor, move |row| {
                        op.matches(pool.get(ids[row as usize]).cmp(text))
                    })
                }
            }
        }
        (data, operand) => panic!(
            "compare operand {:?} does not fit {} column",
            operand,
            data.kind()
        ),
    }
}

fn member<V: RowTestVisitor>(column: &Column, set: &ScalarSet, visitor: V) -> V::Output {
    let validity = column.validity();
    match (column.data(), set) {
        (ColumnData::Id, ScalarSet::Int(set)) => visitor.visit(|row| set.contains(&(row as i64))),
        (ColumnData::Uint32(s), ScalarSet::Int(set)) => {
            let values = s.as_slice();
            non_null(validity, visitor, |row| {
                set.contains(&(values[row as usize] as i64))
            })
        }
        (ColumnData::Int32(s), ScalarSet::Int(set)) => {
            let values = s.as_slice();
            non_null(validity, visitor, |row| {
                set.contains(&(values[row as usize] as i64))
            })
        }
        (ColumnData::Int64(s), ScalarSet::Int(set)) => {
            let values = s.as_slice();
            non_null(validity, visitor, |row| set.contains(&values[row as usize]))
        }
        (ColumnData::Double(s), ScalarSet::Double(set)) => {
            let values = s.as_slice();
            non_null(validity, visitor, |row| {
                double_key(values[row as usize]).is_some_and(|k| set.contains(&k))
            })
        }
        (ColumnData::String(s), ScalarSet::String(set)) => {
            let ids: &[StringId] = s.as_slice();
            non_null(validity, visitor, |row| set.contains(&ids[row as usize]))
        }
        (data, _) => panic!("set operand does not fit {} column", data.kind()),
    }
}

/// equal-key window of a sorted slice, all offsets relative to the slice
/// `from..to` excludes values that never match (NaN)
struct Window {
    from: usize,
    to: usize,
    lower: usize,
    upper: usize,
}

fn window<T>(values: &[T], cmp: impl Fn(&T) -> Ordering) -> Window {
    let lower = values.partition_point(|v| cmp(v) == Ordering::Less);
    let upper = lower + values[lower..].partition_point(|v| cmp(v) != Ordering::Greater);
    Window {
        from: 0,
        to: values.len(),
        lower,
        upper,
    }
}

/// narrow `range` to the rows of a sorted, null-free column satisfying `op value`
/// `Ne` is not range-shaped and never reaches here
pub fn sorted_range(
    column: &Column,
    op: CompareOp,
    operand: &Scalar,
    pool: &StringPool,
    range: &mut IndexRange,
) {
    let (start, end) = (range.start as usize, range.end as usize);
    let w = match (column.data(), operand) {
        (ColumnData::Id, Scalar::Int(b)) => {
            let rel = |v: i64| (v.clamp(start as i64, end as i64) as usize) - start;
            Window {
                from: 0,
                to: end - start,
                lower: rel(*b),
                upper: rel(b.saturating_add(1)),
            }
        }
        (ColumnData::Uint32(s), Scalar::Int(b)) => {
            window(&s.as_slice()[start..end], |v| (*v as i64).cmp(b))
        }
        (ColumnData::Int32(s), Scalar::Int(b)) => {
            window(&s.as_slice()[start..end], |v| (*v as i64).cmp(b))
        }
        (ColumnData::Int64(s), Scalar::Int(b)) => window(&s.as_slice()[start..end], |v| v.cmp(b)),
        (ColumnData::Double(s), Scalar::Double(b)) => {
            // NaNs sit at both ends and never match; zeros of either sign are one key
            let values = &s.as_slice()[start..end];
            let from = values.partition_point(|v| v.is_nan() && v.is_sign_negative());
            let to = values.partition_point(|v| !(v.is_nan() && v.is_sign_positive()));
            let inner = window(&values[from..to], |v| search_cmp_f64(*v, *b));
            Window {
                from,
                to,
                lower: from + inner.lower,
                upper: from + inner.upper,
            }
        }
        (ColumnData::String(s), Scalar::String { text, .. }) => {
            let text: &str = text;
            window(&s.as_slice()[start..end], |id| pool.get(*id).cmp(text))
        }
        (data, operand) => panic!(
            "sorted filter operand {:?} does not fit {} column",
            operand,
            data.kind()
        ),
    };

    let (from, to) = match op {
        CompareOp::Eq => (w.lower, w.upper),
        CompareOp::Lt => (w.from, w.lower),
        CompareOp::Le => (w.from, w.upper),
        CompareOp::Gt => (w.upper, w.to),
        CompareOp::Ge => (w.lower, w.to),
        CompareOp::Ne => panic!("!= has no sorted range"),
    };
    range.start = (start + from) as u32;
    range.end = (start + to.max(from)) as u32;
}

/// narrow `range` with arithmetic on row ids
pub fn id_range(op: CompareOp, operand: &Scalar, range: &mut IndexRange) {
    let b = match operand {
        Scalar::Int(b) => *b,
        other => panic!("id filter operand {:?} is not an integer", other),
    };
    let at = |v: i64| v.clamp(0, u32::MAX as i64) as u32;
    match op {
        CompareOp::Eq => range.clamp(at(b), at(b.saturating_add(1))),
        CompareOp::Lt => range.clamp(0, at(b)),
        CompareOp::Le => range.clamp(0, at(b.saturating_add(1))),
        CompareOp::Gt => range.clamp(at(b.saturating_add(1)), u32::MAX),
        CompareOp::Ge => range.clamp(at(b), u32::MAX),
        CompareOp::Ne => panic!("!= has no id range"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::registers::{Handle, MembershipSet};
    use crate::storage::FlexVector;
    use std::sync::Arc;

    fn scan(column: &Column, predicate: &Predicate, registers: &RegisterFile, pool: &StringPool) -> Vec<u32> {
        let mut out = FlexVector::new();
        let range = IndexRange::new(0, column.len() as u32);
        dispatch(column, predicate, registers, pool, ScanInto { range, out: &mut out });
        out.to_vec()
    }

    fn with_scalar(value: Scalar) -> (RegisterFile, Handle<Scalar>) {
        let mut registers = RegisterFile::new(1);
        let handle = Handle::new(0);
        registers.set(handle, value);
        (registers, handle)
    }

    #[test]
    fn test_compare_skips_nulls() {
        let column = Column::from_options(&[Some(5i32), None, Some(3), Some(5), None]);
        let (registers, value) = with_scalar(Scalar::Int(5));
        let pool = StringPool::new();

        let ne = Predicate::Compare { op: CompareOp::Ne, value };
        assert_eq!(scan(&column, &ne, &registers, &pool), vec![2]);
        let le = Predicate::Compare { op: CompareOp::Le, value };
        assert_eq!(scan(&column, &le, &registers, &pool), vec![0, 2, 3]);
        assert_eq!(scan(&column, &Predicate::IsNull, &registers, &pool), vec![1, 4]);
    }

    #[test]
    fn test_refine_and_bits_agree_with_scan() {
        let column = Column::from_values(&[1.5f64, f64::NAN, -2.0, 7.25, 0.0]);
        let (registers, value) = with_scalar(Scalar::Double(0.0));
        let pool = StringPool::new();
        let predicate = Predicate::Compare { op: CompareOp::Ge, value };

        let scanned = scan(&column, &predicate, &registers, &pool);
        assert_eq!(scanned, vec![0, 3, 4]);

        let mut indices = FlexVector::from_slice(&[4, 3, 2, 1, 0]);
        dispatch(&column, &predicate, &registers, &pool, Refine { indices: &mut indices });
        assert_eq!(indices.to_vec(), vec![4, 3, 0]);

        let bits = bit_filter(&column, &predicate, &registers, &pool, IndexRange::new(1, 5));
        let mut set = Vec::new();
        bits.for_each_set_bit(|i| set.push(i + 1));
        assert_eq!(set, vec![3, 4]);
    }

    #[test]
    fn test_null_bit_filter_uses_validity() {
        let column = Column::from_options(&[None, Some(1u32), None, Some(4)]);
        let registers = RegisterFile::new(0);
        let pool = StringPool::new();
        let bits = bit_filter(&column, &Predicate::IsNull, &registers, &pool, IndexRange::new(1, 4));
        assert_eq!(bits.len(), 3);
        assert!(!bits.get(0));
        assert!(bits.get(1));
        assert!(!bits.get(2));
    }

    #[test]
    fn test_string_filters() {
        let mut pool = StringPool::new();
        let column = Column::from_strings(&[Some("pear"), Some("apple"), None, Some("plum")], &mut pool);
        let (registers, value) = with_scalar(Scalar::String {
            text: Arc::from("pear"),
            id: pool.lookup("pear"),
        });
        let eq = Predicate::Compare { op: CompareOp::Eq, value };
        assert_eq!(scan(&column, &eq, &registers, &pool), vec![0]);
        let gt = Predicate::Compare { op: CompareOp::Gt, value };
        assert_eq!(scan(&column, &gt, &registers, &pool), vec![3]);

        let regex = Predicate::Matches(regex::Regex::new("^p").unwrap());
        assert_eq!(scan(&column, &regex, &registers, &pool), vec![0, 3]);

        // text missing from the pool: = matches nothing, != every non-null row
        let (registers, value) = with_scalar(Scalar::String { text: Arc::from("kiwi"), id: None });
        let eq = Predicate::Compare { op: CompareOp::Eq, value };
        assert!(scan(&column, &eq, &registers, &pool).is_empty());
        let ne = Predicate::Compare { op: CompareOp::Ne, value };
        assert_eq!(scan(&column, &ne, &registers, &pool), vec![0, 1, 3]);
    }

    #[test]
    fn test_set_membership() {
        let column = Column::from_values(&[1.0f64, -0.0, f64::NAN, 3.0]);
        let set = ScalarSet::Double(MembershipSet::build([0.0f64, 3.0].iter().filter_map(|v| double_key(*v)), false));
        let mut registers = RegisterFile::new(1);
        let handle = Handle::new(0);
        registers.set(handle, set);
        let pool = StringPool::new();
        assert_eq!(scan(&column, &Predicate::In { set: handle }, &registers, &pool), vec![1, 3]);
    }

    #[test]
    fn test_sorted_range() {
        let column = Column::from_values(&[1i64, 2, 2, 2, 5, 9]);
        let pool = StringPool::new();
        let full = IndexRange::new(0, 6);
        let run = |op, b| {
            let mut range = full;
            sorted_range(&column, op, &Scalar::Int(b), &pool, &mut range);
            (range.start, range.end)
        };
        assert_eq!(run(CompareOp::Eq, 2), (1, 4));
        assert_eq!(run(CompareOp::Lt, 2), (0, 1));
        assert_eq!(run(CompareOp::Le, 2), (0, 4));
        assert_eq!(run(CompareOp::Gt, 2), (4, 6));
        assert_eq!(run(CompareOp::Ge, 6), (5, 6));
        assert_eq!(run(CompareOp::Eq, 3), (4, 4));

        // within a subrange offsets stay absolute
        let mut range = IndexRange::new(2, 5);
        sorted_range(&column, CompareOp::Ge, &Scalar::Int(2), &pool, &mut range);
        assert_eq!((range.start, range.end), (2, 5));
    }

    #[test]
    fn test_sorted_range_skips_nans() {
        let column = Column::from_values(&[-f64::NAN, -1.0, 0.5, 2.0, f64::NAN]);
        let pool = StringPool::new();
        let mut range = IndexRange::new(0, 5);
        sorted_range(&column, CompareOp::Lt, &Scalar::Double(1.0), &pool, &mut range);
        assert_eq!((range.start, range.end), (1, 3));
        let mut range = IndexRange::new(0, 5);
        sorted_range(&column, CompareOp::Gt, &Scalar::Double(0.0), &pool, &mut range);
        assert_eq!((range.start, range.end), (2, 4));
    }

    #[test]
    fn test_sorted_range_treats_signed_zeros_as_equal() {
        let column = Column::from_values(&[-0.0, 0.0, 1.0]);
        let pool = StringPool::new();
        let run = |op, b: f64| {
            let mut range = IndexRange::new(0, 3);
            sorted_range(&column, op, &Scalar::Double(b), &pool, &mut range);
            (range.start..range.end).collect::<Vec<_>>()
        };
        assert_eq!(run(CompareOp::Eq, 0.0), vec![0, 1]);
        assert_eq!(run(CompareOp::Eq, -0.0), vec![0, 1]);
        assert_eq!(run(CompareOp::Lt, 0.0), Vec::<u32>::new());
        assert_eq!(run(CompareOp::Le, -0.0), vec![0, 1]);
        assert_eq!(run(CompareOp::Ge, 0.0), vec![0, 1, 2]);
        assert_eq!(run(CompareOp::Gt, -0.0), vec![2]);

        // the zeros may also come in the other order
        let column = Column::from_values(&[0.0, -0.0, 1.0]);
        let mut range = IndexRange::new(0, 3);
        sorted_range(&column, CompareOp::Eq, &Scalar::Double(0.0), &pool, &mut range);
        assert_eq!((range.start, range.end), (0, 2));
    }

    #[test]
    fn test_id_range() {
        let mut range = IndexRange::new(0, 10);
        id_range(CompareOp::Ge, &Scalar::Int(3), &mut range);
        id_range(CompareOp::Lt, &Scalar::Int(7), &mut range);
        assert_eq!(range, IndexRange::new(3, 7));
        id_range(CompareOp::Eq, &Scalar::Int(-4), &mut range);
        assert!(range.is_empty());
    }
}
