use std::cmp::Ordering;
use std::collections::HashSet;

use super::sort::KeyColumn;
use crate::execution::bytecode::Indices;

/// keep the first row of every run of equal keys
/// the buffer must already be ordered so equal keys are adjacent
pub fn distinct_sorted(indices: &mut Indices, keys: &[KeyColumn<'_>]) {
    let mut previous: Option<u32> = None;
    indices.retain(|row| {
        let keep = previous.is_none_or(|prev| {
            keys.iter()
                .any(|k| k.compare_ascending(prev, row) != Ordering::Equal)
        });
        previous = Some(row);
        keep
    });
}

/// keep the first occurrence of every key, survivors keep their order
/// nulls compare equal to each other
pub fn distinct_hashed(indices: &mut Indices, keys: &[KeyColumn<'_>]) {
    if let [key] = keys {
        let mut seen: HashSet<Option<u64>> = HashSet::with_capacity(indices.len());
        indices.retain(|row| seen.insert(key.hash_key(row)));
        return;
    }
    let mut seen: HashSet<Vec<Option<u64>>> = HashSet::with_capacity(indices.len());
    indices.retain(|row| seen.insert(keys.iter().map(|k| k.hash_key(row)).collect()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Direction;
    use crate::storage::{Column, StringPool};

    #[test]
    fn test_sorted_keeps_first_of_each_run() {
        let column = Column::from_values(&[5i32, 3, 5, 1, 3]);
        let pool = StringPool::new();
        let key = KeyColumn::new(&column, &pool, Direction::Ascending);
        // already ordered by value: 1, 3, 3, 5, 5
        let mut indices = Indices::from_slice(&[3, 1, 4, 0, 2]);
        distinct_sorted(&mut indices, &[key]);
        assert_eq!(indices.to_vec(), vec![3, 1, 0]);
    }

    #[test]
    fn test_hashed_preserves_order_and_nulls() {
        let column = Column::from_options(&[Some(2i64), None, Some(7), Some(2), None]);
        let pool = StringPool::new();
        let key = KeyColumn::new(&column, &pool, Direction::Ascending);
        let mut indices = Indices::from_slice(&[4, 3, 2, 1, 0]);
        distinct_hashed(&mut indices, &[key]);
        assert_eq!(indices.to_vec(), vec![4, 3, 2]);
    }

    #[test]
    fn test_multi_column_distinct() {
        let a = Column::from_values(&[1u32, 1, 2, 1]);
        let b = Column::from_values(&[0.5f64, 0.5, 0.5, -0.5]);
        let pool = StringPool::new();
        let keys = [
            KeyColumn::new(&a, &pool, Direction::Ascending),
            KeyColumn::new(&b, &pool, Direction::Ascending),
        ];
        let mut hashed = Indices::from_slice(&[0, 1, 2, 3]);
        distinct_hashed(&mut hashed, &keys);
        assert_eq!(hashed.to_vec(), vec![0, 2, 3]);

        let mut sorted = Indices::from_slice(&[0, 1, 2, 3]);
        distinct_sorted(&mut sorted, &keys);
        assert_eq!(sorted.to_vec(), vec![0, 2, 3]);
    }
}
