use std::fmt;

use crate::types::{FilterOp, Value};

/// operand(s) of a filter predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// null tests take no operand
    None,
    Scalar(Value),
    /// set membership operand list
    List(Vec<Value>),
}

/// one filter predicate, already resolved to a column index
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: usize,
    pub op: FilterOp,
    pub operand: Operand,
}

impl Filter {
    pub fn new(column: usize, op: FilterOp, operand: Operand) -> Self {
        Self { column, op, operand }
    }

    pub fn eq(column: usize, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOp::Eq, Operand::Scalar(value.into()))
    }

    pub fn ne(column: usize, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOp::Ne, Operand::Scalar(value.into()))
    }

    pub fn lt(column: usize, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOp::Lt, Operand::Scalar(value.into()))
    }

    pub fn le(column: usize, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOp::Le, Operand::Scalar(value.into()))
    }

    pub fn gt(column: usize, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOp::Gt, Operand::Scalar(value.into()))
    }

    pub fn ge(column: usize, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOp::Ge, Operand::Scalar(value.into()))
    }

    pub fn in_list<V: Into<Value>>(column: usize, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        Self::new(column, FilterOp::In, Operand::List(values))
    }

    pub fn is_null(column: usize) -> Self {
        Self::new(column, FilterOp::IsNull, Operand::None)
    }

    pub fn is_not_null(column: usize) -> Self {
        Self::new(column, FilterOp::IsNotNull, Operand::None)
    }

    pub fn glob(column: usize, pattern: &str) -> Self {
        Self::new(column, FilterOp::Glob, Operand::Scalar(Value::from(pattern)))
    }

    pub fn regex(column: usize, pattern: &str) -> Self {
        Self::new(column, FilterOp::Regex, Operand::Scalar(Value::from(pattern)))
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "col{} {}", self.column, self.op)?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Scalar(v) => write!(f, " {}", v),
            Operand::List(values) => {
                let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, " ({})", parts.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Ascending,
    Descending,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Ascending => write!(f, "ASC"),
            Direction::Descending => write!(f, "DESC"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SortKey {
    pub column: usize,
    pub direction: Direction,
}

impl SortKey {
    pub fn asc(column: usize) -> Self {
        Self {
            column,
            direction: Direction::Ascending,
        }
    }

    pub fn desc(column: usize) -> Self {
        Self {
            column,
            direction: Direction::Descending,
        }
    }
}

/// declarative description of which rows to return and in what order
/// produced by the query-binding layer, read-only to the compiler
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuerySpec {
    pub filters: Vec<Filter>,
    pub sort_keys: Vec<SortKey>,
    /// keep only the first row of each distinct value of these columns
    pub distinct: Option<Vec<usize>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn order_by(mut self, key: SortKey) -> Self {
        self.sort_keys.push(key);
        self
    }

    #[must_use]
    pub fn distinct_on(mut self, columns: impl IntoIterator<Item = usize>) -> Self {
        self.distinct = Some(columns.into_iter().collect());
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}
