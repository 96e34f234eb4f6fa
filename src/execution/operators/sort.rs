//! sorting of index permutations, the column data itself never moves
//!
//! ordering per kind follows the type system: integers naturally, doubles by
//! IEEE total order, strings by content. nulls come first ascending and last
//! descending

use std::cmp::Ordering;

use crate::query::Direction;
use crate::storage::{BitVector, Column, ColumnData, StringId, StringPool};
use crate::types::compare_nullable;

/// sort `indices` by `key(row)`
pub fn sort<K: Ord>(indices: &mut [u32], key: impl Fn(u32) -> K, direction: Direction, stable: bool) {
    sort_by(indices, |a, b| key(a).cmp(&key(b)), direction, stable);
}

/// sort `indices` with a row comparator
/// descending reverses the comparator, so equal rows keep their relative order
pub fn sort_by(
    indices: &mut [u32],
    compare: impl Fn(u32, u32) -> Ordering,
    direction: Direction,
    stable: bool,
) {
    if indices.len() < 2 {
        return;
    }
    match (direction, stable) {
        (Direction::Ascending, true) => indices.sort_by(|&a, &b| compare(a, b)),
        (Direction::Ascending, false) => indices.sort_unstable_by(|&a, &b| compare(a, b)),
        (Direction::Descending, true) => indices.sort_by(|&a, &b| compare(b, a)),
        (Direction::Descending, false) => indices.sort_unstable_by(|&a, &b| compare(b, a)),
    }
}

/// caller-owned working memory for radix sorting `n` rows
/// `rows` must hold at least `n` entries and `keys` at least `2 * n`
pub struct RadixScratch<'a> {
    pub rows: &'a mut [u32],
    pub keys: &'a mut [u64],
}

/// stable ascending LSD radix sort on 64-bit keys
/// byte positions on which every key agrees are skipped; never allocates
pub fn radix_sort(indices: &mut [u32], key: impl Fn(u32) -> u64, scratch: &mut RadixScratch<'_>) {
    let n = indices.len();
    if n < 2 {
        return;
    }
    assert!(
        scratch.rows.len() >= n && scratch.keys.len() >= 2 * n,
        "radix scratch smaller than input"
    );
    let rows = &mut scratch.rows[..n];
    let (mut keys, mut keys_out) = scratch.keys[..2 * n].split_at_mut(n);
    for (slot, &row) in keys.iter_mut().zip(indices.iter()) {
        *slot = key(row);
    }
    let mut in_scratch = false;

    for pass in 0..8 {
        let shift = pass * 8;
        let mut counts = [0usize; 256];
        for k in keys.iter() {
            counts[((k >> shift) & 0xff) as usize] += 1;
        }
        if counts.contains(&n) {
            continue;
        }

        let mut offsets = [0usize; 256];
        let mut total = 0;
        for (offset, count) in offsets.iter_mut().zip(counts) {
            *offset = total;
            total += count;
        }

        if in_scratch {
            scatter(rows, indices, keys, keys_out, shift, offsets);
        } else {
            scatter(indices, rows, keys, keys_out, shift, offsets);
        }
        std::mem::swap(&mut keys, &mut keys_out);
        in_scratch = !in_scratch;
    }

    if in_scratch {
        indices.copy_from_slice(rows);
    }
}

fn scatter(
    rows: &[u32],
    rows_out: &mut [u32],
    keys: &[u64],
    keys_out: &mut [u64],
    shift: usize,
    mut offsets: [usize; 256],
) {
    for (&row, &k) in rows.iter().zip(keys) {
        let bucket = ((k >> shift) & 0xff) as usize;
        let at = offsets[bucket];
        rows_out[at] = row;
        keys_out[at] = k;
        offsets[bucket] += 1;
    }
}

#[derive(Clone, Copy)]
enum KeyData<'a> {
    Id,
    Uint32(&'a [u32]),
    Int32(&'a [i32]),
    Int64(&'a [i64]),
    Double(&'a [f64]),
    String(&'a [StringId], &'a StringPool),
}

/// one column used as a sort or distinct key
#[derive(Clone, Copy)]
pub struct KeyColumn<'a> {
    data: KeyData<'a>,
    validity: Option<&'a BitVector>,
    direction: Direction,
}

impl<'a> KeyColumn<'a> {
    pub fn new(column: &'a Column, pool: &'a StringPool, direction: Direction) -> Self {
        let data = match column.data() {
            ColumnData::Id => KeyData::Id,
            ColumnData::Uint32(s) => KeyData::Uint32(s.as_slice()),
            ColumnData::Int32(s) => KeyData::Int32(s.as_slice()),
            ColumnData::Int64(s) => KeyData::Int64(s.as_slice()),
            ColumnData::Double(s) => KeyData::Double(s.as_slice()),
            ColumnData::String(s) => KeyData::String(s.as_slice(), pool),
        };
        Self {
            data,
            validity: column.validity().filter(|v| !v.all_set()),
            direction,
        }
    }

    #[inline]
    fn is_null(&self, row: u32) -> bool {
        self.validity.is_some_and(|v| !v.get(row as usize))
    }

    #[inline]
    fn present(&self, row: u32) -> Option<u32> {
        (!self.is_null(row)).then_some(row)
    }

    /// ascending comparison with nulls first, ignoring direction
    #[inline]
    pub fn compare_ascending(&self, a: u32, b: u32) -> Ordering {
        let (a, b) = (self.present(a), self.present(b));
        let (a, b) = (a.map(|r| r as usize), b.map(|r| r as usize));
        match self.data {
            KeyData::Id => compare_nullable(a, b, |a, b| a.cmp(&b)),
            KeyData::Uint32(s) => compare_nullable(a, b, |a, b| s[a].cmp(&s[b])),
            KeyData::Int32(s) => compare_nullable(a, b, |a, b| s[a].cmp(&s[b])),
            KeyData::Int64(s) => compare_nullable(a, b, |a, b| s[a].cmp(&s[b])),
            KeyData::Double(s) => compare_nullable(a, b, |a, b| s[a].total_cmp(&s[b])),
            KeyData::String(s, pool) => compare_nullable(a, b, |a, b| {
                if s[a] == s[b] {
                    Ordering::Equal
                } else {
                    pool.get(s[a]).cmp(pool.get(s[b]))
                }
            }),
        }
    }

    /// comparison in this key's direction
    #[inline]
    pub fn compare(&self, a: u32, b: u32) -> Ordering {
        match self.direction {
            Direction::Ascending => self.compare_ascending(a, b),
            Direction::Descending => self.compare_ascending(b, a),
        }
    }

    /// identity of a row's value for hashing; None for null
    /// doubles hash by bit pattern, matching total-order equality
    #[inline]
    pub fn hash_key(&self, row: u32) -> Option<u64> {
        if self.is_null(row) {
            return None;
        }
        let r = row as usize;
        Some(match self.data {
            KeyData::Id => row as u64,
            KeyData::Uint32(s) => s[r] as u64,
            KeyData::Int32(s) => s[r] as i64 as u64,
            KeyData::Int64(s) => s[r] as u64,
            KeyData::Double(s) => s[r].to_bits(),
            KeyData::String(s, _) => s[r].0 as u64,
        })
    }

    /// order-preserving unsigned key for radix sorting, None for null
    #[inline]
    fn radix_key(&self, row: u32) -> Option<u64> {
        const SIGN: u64 = 1 << 63;
        if self.is_null(row) {
            return None;
        }
        let r = row as usize;
        match self.data {
            KeyData::Id => Some(row as u64),
            KeyData::Uint32(s) => Some(s[r] as u64),
            KeyData::Int32(s) => Some((s[r] as i64 as u64) ^ SIGN),
            KeyData::Int64(s) => Some((s[r] as u64) ^ SIGN),
            KeyData::Double(_) | KeyData::String(..) => {
                panic!("radix sort on a non-integer key")
            }
        }
    }

    /// sort by this key alone, dispatching on the kind once
    fn sort(&self, indices: &mut [u32], stable: bool) {
        let validity = self.validity;
        let dir = self.direction;
        match self.data {
            KeyData::Id if validity.is_none() => sort_by(indices, |a, b| a.cmp(&b), dir, stable),
            KeyData::Int32(s) if validity.is_none() => {
                sort(indices, |r| s[r as usize], dir, stable)
            }
            KeyData::Int64(s) if validity.is_none() => {
                sort(indices, |r| s[r as usize], dir, stable)
            }
            KeyData::Uint32(s) if validity.is_none() => {
                sort(indices, |r| s[r as usize], dir, stable)
            }
            KeyData::Double(s) if validity.is_none() => sort_by(
                indices,
                |a, b| s[a as usize].total_cmp(&s[b as usize]),
                dir,
                stable,
            ),
            _ => sort_by(indices, |a, b| self.compare_ascending(a, b), dir, stable),
        }
    }

    /// stable radix sort by this key; nulls are split off first
    fn radix(&self, indices: &mut [u32], scratch: &mut RadixScratch<'_>) {
        let n = indices.len();
        let null_count = match self.validity {
            Some(_) => indices.iter().filter(|&&row| self.is_null(row)).count(),
            None => 0,
        };
        let value_count = n - null_count;

        // stable partition through the scratch rows: nulls first ascending,
        // last descending
        if null_count > 0 {
            let rows = &mut scratch.rows[..n];
            let (mut null_at, mut value_at) = match self.direction {
                Direction::Ascending => (0, null_count),
                Direction::Descending => (value_count, 0),
            };
            for &row in indices.iter() {
                if self.is_null(row) {
                    rows[null_at] = row;
                    null_at += 1;
                } else {
                    rows[value_at] = row;
                    value_at += 1;
                }
            }
            indices.copy_from_slice(rows);
        }

        match self.direction {
            Direction::Ascending => radix_sort(
                &mut indices[null_count..],
                |row| self.radix_key(row).unwrap_or(0),
                scratch,
            ),
            Direction::Descending => radix_sort(
                &mut indices[..value_count],
                |row| !self.radix_key(row).unwrap_or(0),
                scratch,
            ),
        }
    }
}

/// sort by several keys: the primary key over the whole buffer, then each
/// further key within the runs the previous keys left tied
/// with `scratch` the primary key is radix sorted, which is always stable
pub fn sort_rows(
    indices: &mut [u32],
    keys: &[KeyColumn<'_>],
    stable: bool,
    scratch: Option<RadixScratch<'_>>,
) {
    let Some((primary, rest)) = keys.split_first() else {
        return;
    };
    match scratch {
        Some(mut scratch) => primary.radix(indices, &mut scratch),
        None => primary.sort(indices, stable),
    }
    if !rest.is_empty() {
        refine_ties(indices, primary, rest);
    }
}

fn refine_ties(indices: &mut [u32], tied_on: &KeyColumn<'_>, keys: &[KeyColumn<'_>]) {
    let Some((next, rest)) = keys.split_first() else {
        return;
    };
    let mut start = 0;
    while start < indices.len() {
        let mut end = start + 1;
        while end < indices.len() && tied_on.compare(indices[start], indices[end]) == Ordering::Equal {
            end += 1;
        }
        if end - start > 1 {
            let group = &mut indices[start..end];
            next.sort(group, true);
            refine_ties(group, next, rest);
        }
        start = end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn identity(n: u32) -> Vec<u32> {
        (0..n).collect()
    }

    #[test]
    fn test_trivial_inputs_are_noops() {
        let mut empty: Vec<u32> = Vec::new();
        sort(&mut empty, |r| r, Direction::Descending, true);
        let mut one = vec![7];
        let mut scratch = RadixScratch {
            rows: &mut [],
            keys: &mut [],
        };
        radix_sort(&mut one, |r| r as u64, &mut scratch);
        assert_eq!(one, vec![7]);
    }

    #[test]
    fn test_descending_stable_keeps_tie_order() {
        let keys = [2, 1, 2, 3, 1];
        let mut indices = identity(5);
        sort(&mut indices, |r| keys[r as usize], Direction::Descending, true);
        assert_eq!(indices, vec![3, 0, 2, 1, 4]);
    }

    #[test]
    fn test_radix_matches_comparison_sort() {
        let mut rng = StdRng::seed_from_u64(7);
        let values: Vec<i64> = (0..2000).map(|_| rng.gen_range(-1000..1000)).collect();
        let column = Column::from_values(&values);
        let pool = StringPool::new();

        for direction in [Direction::Ascending, Direction::Descending] {
            let key = KeyColumn::new(&column, &pool, direction);
            let mut expected = identity(values.len() as u32);
            sort_rows(&mut expected, &[key], true, None);

            let mut radixed = identity(values.len() as u32);
            let (mut rows, mut keys) = (vec![0u32; radixed.len()], vec![0u64; 2 * radixed.len()]);
            let scratch = RadixScratch {
                rows: &mut rows,
                keys: &mut keys,
            };
            sort_rows(&mut radixed, &[key], true, Some(scratch));
            assert_eq!(radixed, expected);
        }
    }

    #[test]
    fn test_nulls_first_ascending_last_descending() {
        let column = Column::from_options(&[Some(3i32), None, Some(-1), None, Some(3)]);
        let pool = StringPool::new();

        let mut asc = identity(5);
        sort_rows(&mut asc, &[KeyColumn::new(&column, &pool, Direction::Ascending)], true, None);
        assert_eq!(asc, vec![1, 3, 2, 0, 4]);

        let mut desc = identity(5);
        let (mut rows, mut keys) = ([0u32; 5], [0u64; 10]);
        let key = KeyColumn::new(&column, &pool, Direction::Descending);
        let scratch = RadixScratch {
            rows: &mut rows,
            keys: &mut keys,
        };
        sort_rows(&mut desc, &[key], true, Some(scratch));
        assert_eq!(desc, vec![0, 4, 2, 1, 3]);

        // nulls split off stably on the ascending side too
        let mut asc = vec![4, 3, 2, 1, 0];
        let key = KeyColumn::new(&column, &pool, Direction::Ascending);
        let scratch = RadixScratch {
            rows: &mut rows,
            keys: &mut keys,
        };
        sort_rows(&mut asc, &[key], true, Some(scratch));
        assert_eq!(asc, vec![3, 1, 2, 4, 0]);
    }

    #[test]
    fn test_radix_reuses_one_scratch_across_sorts() {
        let mut rng = StdRng::seed_from_u64(11);
        let (mut rows, mut keys) = (vec![0u32; 500], vec![0u64; 1000]);
        for len in [500usize, 17, 300] {
            let values: Vec<Option<i32>> = (0..len)
                .map(|_| rng.gen_bool(0.9).then(|| rng.gen_range(-50..50)))
                .collect();
            let column = Column::from_options(&values);
            let pool = StringPool::new();
            for direction in [Direction::Ascending, Direction::Descending] {
                let key = KeyColumn::new(&column, &pool, direction);
                let mut expected = identity(len as u32);
                sort_rows(&mut expected, &[key], true, None);

                // leftovers from the previous sort must not leak in
                let mut radixed = identity(len as u32);
                let scratch = RadixScratch {
                    rows: &mut rows,
                    keys: &mut keys,
                };
                sort_rows(&mut radixed, &[key], true, Some(scratch));
                assert_eq!(radixed, expected, "len {} {:?}", len, direction);
            }
        }
    }

    #[test]
    fn test_doubles_use_total_order() {
        let column = Column::from_values(&[f64::NAN, 1.0, -0.0, 0.0, f64::NEG_INFINITY]);
        let pool = StringPool::new();
        let mut indices = identity(5);
        sort_rows(&mut indices, &[KeyColumn::new(&column, &pool, Direction::Ascending)], true, None);
        assert_eq!(indices, vec![4, 2, 3, 1, 0]);
    }

    #[test]
    fn test_multi_key_equals_sort_then_stable_resort() {
        let mut rng = StdRng::seed_from_u64(42);
        let a: Vec<i32> = (0..300).map(|_| rng.gen_range(0..5)).collect();
        let b: Vec<i64> = (0..300).map(|_| rng.gen_range(0..10)).collect();
        let (col_a, col_b) = (Column::from_values(&a), Column::from_values(&b));
        let pool = StringPool::new();

        let key_a = KeyColumn::new(&col_a, &pool, Direction::Ascending);
        let key_b = KeyColumn::new(&col_b, &pool, Direction::Descending);
        let mut multi = identity(300);
        sort_rows(&mut multi, &[key_a, key_b], true, None);

        let mut reference = identity(300);
        sort(&mut reference, |r| b[r as usize], Direction::Descending, true);
        sort(&mut reference, |r| a[r as usize], Direction::Ascending, true);
        assert_eq!(multi, reference);
    }

    #[test]
    fn test_strings_sort_by_content() {
        let mut pool = StringPool::new();
        let column = Column::from_strings(&[Some("pear"), Some("apple"), None, Some("fig")], &mut pool);
        let mut indices = identity(4);
        sort_rows(&mut indices, &[KeyColumn::new(&column, &pool, Direction::Ascending)], true, None);
        assert_eq!(indices, vec![2, 1, 3, 0]);
    }
}
