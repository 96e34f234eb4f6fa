//! the closed set of column value kinds and everything the rest of the engine
//! needs to know about them: width, nullability, ordering and which filter
//! operators are legal

use std::cmp::Ordering;
use std::fmt;

/// kind of value a column stores
/// adding a kind means extending this enum and the tables below
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// dense row identity: the value of row i is i, never null, strictly sorted
    Id,
    Uint32,
    Int32,
    Int64,
    Double,
    /// interned string id, ordered by string content
    String,
}

/// how two non-null values of a kind are ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    /// natural integer order
    Integer,
    /// IEEE 754 total order: -NaN < -inf < ... < +inf < NaN
    TotalFloat,
    /// byte-wise order of the interned text
    Lexicographic,
}

/// operator families, used to describe what a kind supports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorClass {
    Equality,
    Range,
    SetMembership,
    NullTest,
    Pattern,
}

/// filter operator as it appears in a query specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    IsNull,
    IsNotNull,
    /// shell-style pattern (`*`, `?`, `[...]`) over string content
    Glob,
    /// regular expression over string content (unanchored)
    Regex,
}

impl FilterOp {
    pub fn class(self) -> OperatorClass {
        match self {
            FilterOp::Eq | FilterOp::Ne => OperatorClass::Equality,
            FilterOp::Lt | FilterOp::Le | FilterOp::Gt | FilterOp::Ge => OperatorClass::Range,
            FilterOp::In => OperatorClass::SetMembership,
            FilterOp::IsNull | FilterOp::IsNotNull => OperatorClass::NullTest,
            FilterOp::Glob | FilterOp::Regex => OperatorClass::Pattern,
        }
    }

    /// the comparison this operator performs, if it is one
    pub fn as_compare(self) -> Option<CompareOp> {
        match self {
            FilterOp::Eq => Some(CompareOp::Eq),
            FilterOp::Ne => Some(CompareOp::Ne),
            FilterOp::Lt => Some(CompareOp::Lt),
            FilterOp::Le => Some(CompareOp::Le),
            FilterOp::Gt => Some(CompareOp::Gt),
            FilterOp::Ge => Some(CompareOp::Ge),
            _ => None,
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "!=",
            FilterOp::Lt => "<",
            FilterOp::Le => "<=",
            FilterOp::Gt => ">",
            FilterOp::Ge => ">=",
            FilterOp::In => "IN",
            FilterOp::IsNull => "IS NULL",
            FilterOp::IsNotNull => "IS NOT NULL",
            FilterOp::Glob => "GLOB",
            FilterOp::Regex => "REGEXP",
        };
        write!(f, "{}", s)
    }
}

/// binary comparison against a scalar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// does `ord` (value compared to operand) satisfy this operator
    #[inline]
    pub fn matches(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        }
    }

    /// evaluate `a op b` with IEEE semantics: any comparison involving NaN is false
    #[inline]
    pub fn eval_f64(self, a: f64, b: f64) -> bool {
        match self {
            CompareOp::Eq => a == b,
            CompareOp::Ne => a.partial_cmp(&b).is_some_and(|o| o != Ordering::Equal),
            CompareOp::Lt => a < b,
            CompareOp::Le => a <= b,
            CompareOp::Gt => a > b,
            CompareOp::Ge => a >= b,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        };
        write!(f, "{}", s)
    }
}

impl ValueKind {
    /// bytes one value occupies in column storage
    pub fn byte_width(self) -> usize {
        match self {
            ValueKind::Id | ValueKind::Uint32 | ValueKind::Int32 | ValueKind::String => 4,
            ValueKind::Int64 | ValueKind::Double => 8,
        }
    }

    /// whether a column of this kind may carry a validity mask
    pub fn nullable_storage(self) -> bool {
        !matches!(self, ValueKind::Id)
    }

    /// default comparator for sorting and range filters
    pub fn comparator(self) -> Comparator {
        match self {
            ValueKind::Id | ValueKind::Uint32 | ValueKind::Int32 | ValueKind::Int64 => {
                Comparator::Integer
            }
            ValueKind::Double => Comparator::TotalFloat,
            ValueKind::String => Comparator::Lexicographic,
        }
    }

    /// fixed-width integer keys are eligible for radix sorting
    pub fn is_integer(self) -> bool {
        self.comparator() == Comparator::Integer
    }

    pub fn is_numeric(self) -> bool {
        !matches!(self, ValueKind::String)
    }

    /// operator families legal against this kind
    pub fn operator_classes(self) -> &'static [OperatorClass] {
        use OperatorClass::*;
        match self {
            ValueKind::String => &[Equality, Range, SetMembership, NullTest, Pattern],
            _ => &[Equality, Range, SetMembership, NullTest],
        }
    }

    pub fn supports(self, op: FilterOp) -> bool {
        self.operator_classes().contains(&op.class())
    }

    /// inclusive value range for integer kinds
    pub fn integer_bounds(self) -> Option<(i64, i64)> {
        match self {
            ValueKind::Id | ValueKind::Uint32 => Some((0, u32::MAX as i64)),
            ValueKind::Int32 => Some((i32::MIN as i64, i32::MAX as i64)),
            ValueKind::Int64 => Some((i64::MIN, i64::MAX)),
            ValueKind::Double | ValueKind::String => None,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueKind::Id => "id",
            ValueKind::Uint32 => "uint32",
            ValueKind::Int32 => "int32",
            ValueKind::Int64 => "int64",
            ValueKind::Double => "double",
            ValueKind::String => "string",
        };
        write!(f, "{}", s)
    }
}

/// a literal operand in a query specification
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Double(f64),
    String(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Double(_) => "double",
            Value::String(_) => "string",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Double(d) => write!(f, "{}", d),
            Value::String(s) => write!(f, "'{}'", s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

/// total order on doubles with -0.0 and 0.0 collapsed
/// agrees with IEEE comparison on every pair without a NaN, so binary searches
/// over sorted data find the same rows a scan does
#[inline]
pub fn search_cmp_f64(a: f64, b: f64) -> Ordering {
    let zero = |v: f64| if v == 0.0 { 0.0 } else { v };
    zero(a).total_cmp(&zero(b))
}

/// order two possibly-null keys: nulls first, then `cmp` on the values
#[inline]
pub fn compare_nullable<T>(
    a: Option<T>,
    b: Option<T>,
    cmp: impl FnOnce(T, T) -> Ordering,
) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => cmp(a, b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_widths() {
        assert_eq!(ValueKind::Id.byte_width(), 4);
        assert_eq!(ValueKind::Int32.byte_width(), 4);
        assert_eq!(ValueKind::Int64.byte_width(), 8);
        assert_eq!(ValueKind::Double.byte_width(), 8);
        assert_eq!(ValueKind::String.byte_width(), 4);
    }

    #[test]
    fn test_operator_legality() {
        assert!(ValueKind::String.supports(FilterOp::Glob));
        assert!(ValueKind::String.supports(FilterOp::Lt));
        assert!(!ValueKind::Int64.supports(FilterOp::Regex));
        assert!(!ValueKind::Double.supports(FilterOp::Glob));
        assert!(ValueKind::Id.supports(FilterOp::In));
        assert!(ValueKind::Id.supports(FilterOp::IsNull));
    }

    #[test]
    fn test_nullability_and_comparators() {
        assert!(!ValueKind::Id.nullable_storage());
        assert!(ValueKind::Int32.nullable_storage());
        assert_eq!(ValueKind::Double.comparator(), Comparator::TotalFloat);
        assert!(ValueKind::Uint32.is_integer());
        assert!(!ValueKind::String.is_integer());
    }

    #[test]
    fn test_compare_op_matches() {
        assert!(CompareOp::Le.matches(Ordering::Equal));
        assert!(CompareOp::Le.matches(Ordering::Less));
        assert!(!CompareOp::Lt.matches(Ordering::Equal));
        assert!(CompareOp::Ne.matches(Ordering::Greater));
    }

    #[test]
    fn test_search_order_collapses_zeros() {
        assert_eq!(search_cmp_f64(-0.0, 0.0), Ordering::Equal);
        assert_eq!(search_cmp_f64(0.0, -0.0), Ordering::Equal);
        assert_eq!(search_cmp_f64(-1.0, -0.0), Ordering::Less);
        assert_eq!(search_cmp_f64(f64::INFINITY, f64::NAN), Ordering::Less);
        assert_eq!(search_cmp_f64(-f64::NAN, f64::NEG_INFINITY), Ordering::Less);
    }

    #[test]
    fn test_nan_never_compares() {
        for op in [CompareOp::Eq, CompareOp::Ne, CompareOp::Lt, CompareOp::Ge] {
            assert!(!op.eval_f64(f64::NAN, 1.0));
            assert!(!op.eval_f64(1.0, f64::NAN));
        }
    }

    #[test]
    fn test_nulls_sort_first() {
        let cmp = |a: i64, b: i64| a.cmp(&b);
        assert_eq!(compare_nullable(None, Some(1), cmp), Ordering::Less);
        assert_eq!(compare_nullable(Some(-100), None, cmp), Ordering::Greater);
        assert_eq!(compare_nullable::<i64>(None, None, cmp), Ordering::Equal);
    }
}
