use crate::types::ValueKind;

/// hint from the table layer about a column's physical order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sortedness {
    #[default]
    Unsorted,
    /// values are non-decreasing in row order
    Sorted,
}

/// one column as the compiler sees it
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSchema {
    pub name: String,
    pub kind: ValueKind,
    pub nullable: bool,
    pub sortedness: Sortedness,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
            sortedness: Sortedness::Unsorted,
        }
    }

    /// mark the column as possibly containing nulls
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = self.kind.nullable_storage();
        self
    }

    /// mark the column as sorted ascending in row order
    #[must_use]
    pub fn sorted(mut self) -> Self {
        self.sortedness = Sortedness::Sorted;
        self
    }

    /// sorted and null-free: binary search over the raw data is valid
    pub fn is_searchable(&self) -> bool {
        self.kind == ValueKind::Id || (self.sortedness == Sortedness::Sorted && !self.nullable)
    }

    /// no two rows share a value, so ties never need breaking
    pub fn is_unique(&self) -> bool {
        self.kind == ValueKind::Id
    }
}

/// ordered column list of a table plus optional statistics
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    pub columns: Vec<ColumnSchema>,
    /// expected number of rows, feeds size-based algorithm choices
    pub row_count_hint: Option<usize>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnSchema>) -> Self {
        Self {
            columns,
            row_count_hint: None,
        }
    }

    #[must_use]
    pub fn with_row_count_hint(mut self, rows: usize) -> Self {
        self.row_count_hint = Some(rows);
        self
    }

    pub fn column(&self, index: usize) -> Option<&ColumnSchema> {
        self.columns.get(index)
    }

    /// resolve a column name to its index
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
