use super::bit_vector::BitVector;
use super::flex_vector::FlexVector;
use super::slab::Slab;
use super::string_pool::{StringId, StringPool};
use crate::schema::Sortedness;
use crate::types::{Value, ValueKind};

/// typed storage of a column
/// each buffer is a slab sized exactly to the row count
#[derive(Debug, Clone)]
pub enum ColumnData {
    /// value of row i is i, nothing stored
    Id,
    Uint32(Slab<u32>),
    Int32(Slab<i32>),
    Int64(Slab<i64>),
    Double(Slab<f64>),
    String(Slab<StringId>),
}

impl ColumnData {
    pub fn kind(&self) -> ValueKind {
        match self {
            ColumnData::Id => ValueKind::Id,
            ColumnData::Uint32(_) => ValueKind::Uint32,
            ColumnData::Int32(_) => ValueKind::Int32,
            ColumnData::Int64(_) => ValueKind::Int64,
            ColumnData::Double(_) => ValueKind::Double,
            ColumnData::String(_) => ValueKind::String,
        }
    }
}

/// a column of a table: data + validity mask + sortedness hint
/// uses a separate validity bit vector (1 = value present) for nullable columns
#[derive(Debug, Clone)]
pub struct Column {
    data: ColumnData,
    len: usize,
    validity: Option<BitVector>,
    sortedness: Sortedness,
}

/// native element types that can back a column
pub trait ColumnValue: Copy + Default {
    const KIND: ValueKind;
    fn into_data(slab: Slab<Self>) -> ColumnData;
}

impl ColumnValue for u32 {
    const KIND: ValueKind = ValueKind::Uint32;
    fn into_data(slab: Slab<Self>) -> ColumnData {
        ColumnData::Uint32(slab)
    }
}

impl ColumnValue for i32 {
    const KIND: ValueKind = ValueKind::Int32;
    fn into_data(slab: Slab<Self>) -> ColumnData {
        ColumnData::Int32(slab)
    }
}

impl ColumnValue for i64 {
    const KIND: ValueKind = ValueKind::Int64;
    fn into_data(slab: Slab<Self>) -> ColumnData {
        ColumnData::Int64(slab)
    }
}

impl ColumnValue for f64 {
    const KIND: ValueKind = ValueKind::Double;
    fn into_data(slab: Slab<Self>) -> ColumnData {
        ColumnData::Double(slab)
    }
}

impl Column {
    /// an id column of `len` rows
    pub fn id(len: usize) -> Self {
        Self {
            data: ColumnData::Id,
            len,
            validity: None,
            sortedness: Sortedness::Sorted,
        }
    }

    /// a non-null column holding `values`
    pub fn from_values<T: ColumnValue>(values: &[T]) -> Self {
        Self {
            data: T::into_data(Slab::from_slice(values)),
            len: values.len(),
            validity: None,
            sortedness: Sortedness::Unsorted,
        }
    }

    /// a nullable column, `None` entries are null
    pub fn from_options<T: ColumnValue>(values: &[Option<T>]) -> Self {
        let data: Vec<T> = values.iter().map(|v| v.unwrap_or_default()).collect();
        let validity = BitVector::from_fn(values.len(), |i| values[i].is_some());
        Self {
            data: T::into_data(Slab::from_slice(&data)),
            len: values.len(),
            validity: Some(validity),
            sortedness: Sortedness::Unsorted,
        }
    }

    /// a nullable string column, interning every value into `pool`
    pub fn from_strings(values: &[Option<&str>], pool: &mut StringPool) -> Self {
        let mut builder = ColumnBuilder::new(ValueKind::String, true);
        for value in values {
            match value {
                Some(s) => builder.push_string(pool.intern(s)),
                None => builder.push_null(),
            }
        }
        builder.finish()
    }

    /// attach a sortedness hint, trusted as-is by the compiler
    #[must_use]
    pub fn with_sortedness(mut self, sortedness: Sortedness) -> Self {
        if matches!(self.data, ColumnData::Id) {
            return self;
        }
        self.sortedness = sortedness;
        self
    }

    pub fn kind(&self) -> ValueKind {
        self.data.kind()
    }

    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// validity mask, None when the column has no null storage
    pub fn validity(&self) -> Option<&BitVector> {
        self.validity.as_ref()
    }

    pub fn is_nullable(&self) -> bool {
        self.validity.is_some()
    }

    pub fn sortedness(&self) -> Sortedness {
        self.sortedness
    }

    #[inline]
    pub fn is_null(&self, row: usize) -> bool {
        self.validity.as_ref().is_some_and(|v| !v.get(row))
    }

    /// number of null rows
    pub fn null_count(&self) -> usize {
        self.validity
            .as_ref()
            .map_or(0, |v| v.len() - v.count_set_bits())
    }

    /// read one cell as a literal value, None for null or out of range
    /// convenience accessor for callers materializing results
    pub fn value(&self, row: usize, pool: &StringPool) -> Option<Value> {
        if row >= self.len || self.is_null(row) {
            return None;
        }
        Some(match &self.data {
            ColumnData::Id => Value::Int(row as i64),
            ColumnData::Uint32(s) => Value::Int(s[row] as i64),
            ColumnData::Int32(s) => Value::Int(s[row] as i64),
            ColumnData::Int64(s) => Value::Int(s[row]),
            ColumnData::Double(s) => Value::Double(s[row]),
            ColumnData::String(s) => Value::String(pool.get(s[row]).to_string()),
        })
    }

    /// true when the non-null values are non-decreasing in row order
    pub fn check_sorted(&self, pool: &StringPool) -> bool {
        fn non_decreasing<T: Copy>(s: &[T], le: impl Fn(T, T) -> bool) -> bool {
            s.windows(2).all(|w| le(w[0], w[1]))
        }
        if self.null_count() > 0 {
            return false;
        }
        match &self.data {
            ColumnData::Id => true,
            ColumnData::Uint32(s) => non_decreasing(s.as_slice(), |a, b| a <= b),
            ColumnData::Int32(s) => non_decreasing(s.as_slice(), |a, b| a <= b),
            ColumnData::Int64(s) => non_decreasing(s.as_slice(), |a, b| a <= b),
            ColumnData::Double(s) => non_decreasing(s.as_slice(), |a, b| a.total_cmp(&b).is_le()),
            ColumnData::String(s) => non_decreasing(s.as_slice(), |a, b| pool.get(a) <= pool.get(b)),
        }
    }
}

/// growable staging buffer for one column
enum BuilderBuffer {
    Id,
    Uint32(FlexVector<u32>),
    Int32(FlexVector<i32>),
    Int64(FlexVector<i64>),
    Double(FlexVector<f64>),
    String(FlexVector<StringId>),
}

/// accumulates values row by row, then freezes them into an exact-size column
pub struct ColumnBuilder {
    buffer: BuilderBuffer,
    /// row positions of nulls, only tracked for nullable builders
    nulls: Option<FlexVector<u32>>,
    len: usize,
    sortedness: Sortedness,
}

impl ColumnBuilder {
    pub fn new(kind: ValueKind, nullable: bool) -> Self {
        let buffer = match kind {
            ValueKind::Id => BuilderBuffer::Id,
            ValueKind::Uint32 => BuilderBuffer::Uint32(FlexVector::new()),
            ValueKind::Int32 => BuilderBuffer::Int32(FlexVector::new()),
            ValueKind::Int64 => BuilderBuffer::Int64(FlexVector::new()),
            ValueKind::Double => BuilderBuffer::Double(FlexVector::new()),
            ValueKind::String => BuilderBuffer::String(FlexVector::new()),
        };
        Self {
            buffer,
            nulls: (nullable && kind.nullable_storage()).then(FlexVector::new),
            len: 0,
            sortedness: Sortedness::Unsorted,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// push a null
    /// panics when the builder was not created nullable
    pub fn push_null(&mut self) {
        let nulls = self
            .nulls
            .as_mut()
            .expect("push_null on a non-nullable column builder");
        nulls.push(self.len as u32);
        match &mut self.buffer {
            BuilderBuffer::Id => unreachable!("id columns have no null storage"),
            BuilderBuffer::Uint32(v) => v.push(0),
            BuilderBuffer::Int32(v) => v.push(0),
            BuilderBuffer::Int64(v) => v.push(0),
            BuilderBuffer::Double(v) => v.push(0.0),
            BuilderBuffer::String(v) => v.push(StringId::default()),
        }
        self.len += 1;
    }

    /// push an integer
    /// panics on a type mismatch or when the value does not fit the column
    pub fn push_int(&mut self, value: i64) {
        match &mut self.buffer {
            BuilderBuffer::Id => assert_eq!(value, self.len as i64, "id column out of sequence"),
            BuilderBuffer::Uint32(v) => {
                v.push(u32::try_from(value).expect("value out of range for uint32 column"))
            }
            BuilderBuffer::Int32(v) => {
                v.push(i32::try_from(value).expect("value out of range for int32 column"))
            }
            BuilderBuffer::Int64(v) => v.push(value),
            BuilderBuffer::Double(v) => v.push(value as f64),
            BuilderBuffer::String(_) => panic!("Type mismatch when pushing integer to string column"),
        }
        self.len += 1;
    }

    pub fn push_double(&mut self, value: f64) {
        match &mut self.buffer {
            BuilderBuffer::Double(v) => v.push(value),
            _ => panic!("Type mismatch when pushing double to non-double column"),
        }
        self.len += 1;
    }

    pub fn push_string(&mut self, id: StringId) {
        match &mut self.buffer {
            BuilderBuffer::String(v) => v.push(id),
            _ => panic!("Type mismatch when pushing string to non-string column"),
        }
        self.len += 1;
    }

    /// push a literal, interning strings into `pool`
    pub fn push_value(&mut self, value: Option<&Value>, pool: &mut StringPool) {
        match value {
            None => self.push_null(),
            Some(Value::Int(i)) => self.push_int(*i),
            Some(Value::Double(d)) => self.push_double(*d),
            Some(Value::String(s)) => self.push_string(pool.intern(s)),
        }
    }

    #[must_use]
    pub fn sortedness(mut self, sortedness: Sortedness) -> Self {
        self.sortedness = sortedness;
        self
    }

    /// freeze into a column whose slab capacity equals the row count
    pub fn finish(self) -> Column {
        let len = self.len;
        let validity = self.nulls.map(|nulls| {
            let mut validity = BitVector::new_all_set(len);
            for &row in nulls.as_slice() {
                validity.clear(row as usize);
            }
            validity
        });
        let data = match self.buffer {
            BuilderBuffer::Id => {
                return Column::id(len);
            }
            BuilderBuffer::Uint32(v) => ColumnData::Uint32(Slab::from_slice(v.as_slice())),
            BuilderBuffer::Int32(v) => ColumnData::Int32(Slab::from_slice(v.as_slice())),
            BuilderBuffer::Int64(v) => ColumnData::Int64(Slab::from_slice(v.as_slice())),
            BuilderBuffer::Double(v) => ColumnData::Double(Slab::from_slice(v.as_slice())),
            BuilderBuffer::String(v) => ColumnData::String(Slab::from_slice(v.as_slice())),
        };
        Column {
            data,
            len,
            validity,
            sortedness: self.sortedness,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_values() {
        let col = Column::from_values(&[5i32, 3, 5, 1, 3]);
        let pool = StringPool::new();
        assert_eq!(col.kind(), ValueKind::Int32);
        assert_eq!(col.len(), 5);
        assert!(!col.is_nullable());
        assert_eq!(col.value(3, &pool), Some(Value::Int(1)));
        assert_eq!(col.value(5, &pool), None);
    }

    #[test]
    fn test_from_options_tracks_nulls() {
        let col = Column::from_options(&[Some(1.5f64), None, Some(-2.0)]);
        let pool = StringPool::new();
        assert!(col.is_nullable());
        assert!(col.is_null(1));
        assert!(!col.is_null(0));
        assert_eq!(col.null_count(), 1);
        assert_eq!(col.value(1, &pool), None);
        assert_eq!(col.value(2, &pool), Some(Value::Double(-2.0)));
    }

    #[test]
    fn test_builder_round_trip() {
        let mut pool = StringPool::new();
        let mut builder = ColumnBuilder::new(ValueKind::String, true);
        builder.push_value(Some(&Value::String("b".into())), &mut pool);
        builder.push_value(None, &mut pool);
        builder.push_value(Some(&Value::String("a".into())), &mut pool);
        let col = builder.finish();

        assert_eq!(col.len(), 3);
        assert_eq!(col.value(0, &pool), Some(Value::String("b".into())));
        assert_eq!(col.value(1, &pool), None);
        assert_eq!(col.value(2, &pool), Some(Value::String("a".into())));
    }

    #[test]
    #[should_panic(expected = "Type mismatch")]
    fn test_builder_type_mismatch_panics() {
        let mut builder = ColumnBuilder::new(ValueKind::Int64, false);
        builder.push_double(1.0);
    }

    #[test]
    #[should_panic(expected = "out of range for int32")]
    fn test_builder_rejects_out_of_range() {
        let mut builder = ColumnBuilder::new(ValueKind::Int32, false);
        builder.push_int(i64::MAX);
    }

    #[test]
    fn test_check_sorted() {
        let pool = StringPool::new();
        assert!(Column::from_values(&[1i64, 1, 2, 9]).check_sorted(&pool));
        assert!(!Column::from_values(&[1i64, 0]).check_sorted(&pool));
        assert!(!Column::from_options(&[None, Some(1i64)]).check_sorted(&pool));
        assert!(Column::id(10).check_sorted(&pool));
        // sort elision trusts this flag, so -0.0 must come before 0.0
        assert!(Column::from_values(&[-0.0, 0.0, 1.0]).check_sorted(&pool));
        assert!(!Column::from_values(&[0.0, -0.0, 1.0]).check_sorted(&pool));
        assert!(Column::from_values(&[1.0, 2.0, f64::NAN]).check_sorted(&pool));
    }
}
