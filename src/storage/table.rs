use std::io;
use std::path::Path;

use tracing::debug;

use super::column::{Column, ColumnBuilder};
use super::string_pool::StringPool;
use crate::error::{StorageError, StorageResult};
use crate::schema::{ColumnSchema, Schema, Sortedness};
use crate::types::{Value, ValueKind};

/// what the interpreter needs from whoever owns the column data
/// columns must not change while a program is executing against them
pub trait ColumnSource {
    /// number of rows in every column
    fn row_count(&self) -> usize;

    fn column_count(&self) -> usize;

    fn column(&self, index: usize) -> Option<&Column>;

    /// pool resolving the ids stored in string columns
    fn string_pool(&self) -> &StringPool;
}

/// in-memory table: named columns of equal length plus their string pool
#[derive(Debug, Clone, Default)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Column>,
    row_count: usize,
    strings: StringPool,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// create a table whose string columns were interned into `strings`
    pub fn with_strings(strings: StringPool) -> Self {
        Self {
            strings,
            ..Default::default()
        }
    }

    /// append a column; the first column fixes the row count
    pub fn add_column(&mut self, name: impl Into<String>, column: Column) -> StorageResult<()> {
        let name = name.into();
        if self.names.contains(&name) {
            return Err(StorageError::DuplicateColumn(name));
        }
        if self.columns.is_empty() {
            self.row_count = column.len();
        } else if column.len() != self.row_count {
            return Err(StorageError::LengthMismatch {
                column: name,
                expected: self.row_count,
                found: column.len(),
            });
        }
        self.names.push(name);
        self.columns.push(column);
        Ok(())
    }

    /// append a dense id column covering every row
    pub fn add_id_column(&mut self, name: impl Into<String>) -> StorageResult<()> {
        let rows = self.row_count;
        self.add_column(name, Column::id(rows))
    }

    pub fn strings(&self) -> &StringPool {
        &self.strings
    }

    pub fn strings_mut(&mut self) -> &mut StringPool {
        &mut self.strings
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        let index = self.names.iter().position(|n| n == name)?;
        self.columns.get(index)
    }

    /// describe the table the way the compiler wants it
    pub fn schema(&self) -> Schema {
        let columns = self
            .names
            .iter()
            .zip(&self.columns)
            .map(|(name, column)| ColumnSchema {
                name: name.clone(),
                kind: column.kind(),
                nullable: column.is_nullable(),
                sortedness: column.sortedness(),
            })
            .collect();
        Schema::new(columns).with_row_count_hint(self.row_count)
    }

    /// read every cell of a row, None for nulls
    pub fn row(&self, row: usize) -> Vec<Option<Value>> {
        self.columns
            .iter()
            .map(|c| c.value(row, &self.strings))
            .collect()
    }

    /// load a headered CSV file
    pub fn from_csv(path: impl AsRef<Path>) -> StorageResult<Table> {
        let file = std::fs::File::open(path.as_ref())?;
        let table = Self::from_csv_reader(file)?;
        debug!(
            path = %path.as_ref().display(),
            rows = table.row_count,
            columns = table.columns.len(),
            "loaded CSV table"
        );
        Ok(table)
    }

    /// load headered CSV data from any reader
    /// column kinds are inferred from the data: INT64 -> DOUBLE -> STRING,
    /// empty fields and `null` are nulls
    pub fn from_csv_reader<R: io::Read>(reader: R) -> StorageResult<Table> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let headers: Vec<String> = csv_reader.headers()?.iter().map(|h| h.trim().to_string()).collect();

        // step 1: read all records, the whole table lives in memory anyway
        let mut records = Vec::new();
        for record in csv_reader.records() {
            records.push(record?);
        }

        let mut table = Table::new();
        for (col_index, name) in headers.iter().enumerate() {
            let fields: Vec<Option<&str>> = records
                .iter()
                .map(|r| r.get(col_index).map(str::trim).filter(|f| !is_null_field(f)))
                .collect();

            // step 2: infer type and nullability
            let kind = infer_kind(&fields);
            let nullable = fields.iter().any(Option::is_none);

            // step 3: build the column
            let mut builder = ColumnBuilder::new(kind, nullable);
            for field in &fields {
                match field {
                    None => builder.push_null(),
                    Some(text) => match kind {
                        ValueKind::Int64 => builder.push_int(text.parse().unwrap_or_default()),
                        ValueKind::Double => builder.push_double(text.parse().unwrap_or_default()),
                        _ => {
                            let id = table.strings.intern(text);
                            builder.push_string(id);
                        }
                    },
                }
            }
            let column = builder.finish();

            // step 4: detect sortedness so the compiler can use binary search
            let sortedness = if !column.is_empty() && column.check_sorted(&table.strings) {
                Sortedness::Sorted
            } else {
                Sortedness::Unsorted
            };
            table.add_column(name.clone(), column.with_sortedness(sortedness))?;
        }
        if table.columns.is_empty() {
            table.row_count = records.len();
        }
        Ok(table)
    }
}

impl ColumnSource for Table {
    fn row_count(&self) -> usize {
        self.row_count
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    fn string_pool(&self) -> &StringPool {
        &self.strings
    }
}

fn is_null_field(field: &str) -> bool {
    field.is_empty() || field.eq_ignore_ascii_case("null")
}

/// pick the narrowest kind every non-null field parses as
/// all-null columns fall back to STRING
fn infer_kind(fields: &[Option<&str>]) -> ValueKind {
    let mut values = fields.iter().flatten().peekable();
    if values.peek().is_none() {
        return ValueKind::String;
    }
    if fields.iter().flatten().all(|f| f.parse::<i64>().is_ok()) {
        return ValueKind::Int64;
    }
    if fields.iter().flatten().all(|f| f.parse::<f64>().is_ok()) {
        return ValueKind::Double;
    }
    ValueKind::String
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_column_checks_lengths() {
        let mut table = Table::new();
        table.add_column("a", Column::from_values(&[1i64, 2, 3])).unwrap();

        let err = table
            .add_column("b", Column::from_values(&[1i64]))
            .unwrap_err();
        assert!(matches!(err, StorageError::LengthMismatch { expected: 3, found: 1, .. }));

        let err = table
            .add_column("a", Column::from_values(&[1i64, 2, 3]))
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateColumn(_)));
    }

    #[test]
    fn test_from_csv_reader_infers_kinds() {
        let data = "id,name,score,ts\n1,Alice,3.5,10\n2,,4,20\n3,Carol,null,30\n";
        let table = Table::from_csv_reader(data.as_bytes()).unwrap();
        let schema = table.schema();

        assert_eq!(table.row_count(), 3);
        assert_eq!(schema.columns[0].kind, ValueKind::Int64);
        assert_eq!(schema.columns[1].kind, ValueKind::String);
        assert!(schema.columns[1].nullable);
        assert_eq!(schema.columns[2].kind, ValueKind::Double);
        assert!(schema.columns[2].nullable);
        assert_eq!(schema.columns[3].sortedness, Sortedness::Sorted);
        assert_eq!(schema.row_count_hint, Some(3));

        assert_eq!(
            table.row(1),
            vec![Some(Value::Int(2)), None, Some(Value::Double(4.0)), Some(Value::Int(20))]
        );
    }

    #[test]
    fn test_from_csv_reader_rejects_ragged_rows() {
        let data = "a,b\n1,2\n3\n";
        assert!(matches!(
            Table::from_csv_reader(data.as_bytes()),
            Err(StorageError::Csv(_))
        ));
    }

    #[test]
    fn test_id_column() {
        let mut table = Table::new();
        table.add_column("v", Column::from_values(&[9i32, 8])).unwrap();
        table.add_id_column("id").unwrap();

        let schema = table.schema();
        assert_eq!(schema.columns[1].kind, ValueKind::Id);
        assert_eq!(table.row(1), vec![Some(Value::Int(8)), Some(Value::Int(1))]);
    }
}
