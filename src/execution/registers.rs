use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::storage::{BitVector, FlexVector, StringId};

/// typed reference to a register slot
/// the type parameter is the register payload, so instruction signatures
/// carry their register kinds and the compiler cannot wire a bit vector into
/// an index-buffer operand
pub struct Handle<T> {
    pub index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.index)
    }
}

impl<T> fmt::Display for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.index)
    }
}

/// kinds of values a register can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterKind {
    Range,
    Indices,
    Bits,
    Scalar,
    ScalarSet,
}

/// half-open range of row indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexRange {
    pub start: u32,
    pub end: u32,
}

impl IndexRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// intersect with [start, end)
    pub fn clamp(&mut self, start: u32, end: u32) {
        self.start = self.start.max(start);
        self.end = self.end.min(end).max(self.start);
    }
}

/// runtime value of a filter operand
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Int(i64),
    Double(f64),
    /// string operand; `id` is the pool id when the text exists in the table
    String { text: Arc<str>, id: Option<StringId> },
}

/// set probed either by binary search or hashing, chosen at compile time
#[derive(Debug, Clone, PartialEq)]
pub enum MembershipSet<T: Ord + Hash> {
    Sorted(Vec<T>),
    Hashed(HashSet<T>),
}

impl<T: Ord + Hash> MembershipSet<T> {
    /// build a set from arbitrary values, sorting/deduplicating as needed
    pub fn build(values: impl IntoIterator<Item = T>, hashed: bool) -> Self {
        if hashed {
            MembershipSet::Hashed(values.into_iter().collect())
        } else {
            let mut sorted: Vec<T> = values.into_iter().collect();
            sorted.sort_unstable();
            sorted.dedup();
            MembershipSet::Sorted(sorted)
        }
    }

    #[inline]
    pub fn contains(&self, value: &T) -> bool {
        match self {
            MembershipSet::Sorted(values) => values.binary_search(value).is_ok(),
            MembershipSet::Hashed(values) => values.contains(value),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            MembershipSet::Sorted(values) => values.len(),
            MembershipSet::Hashed(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// runtime operand set of an IN filter
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarSet {
    Int(MembershipSet<i64>),
    /// doubles keyed by normalised bit pattern, see `double_key`
    Double(MembershipSet<u64>),
    String(MembershipSet<StringId>),
}

/// hashable identity of a double for set membership
/// NaN never matches, -0.0 matches 0.0
#[inline]
pub fn double_key(value: f64) -> Option<u64> {
    if value.is_nan() {
        None
    } else if value == 0.0 {
        Some(0.0f64.to_bits())
    } else {
        Some(value.to_bits())
    }
}

/// one slot of the register file
#[derive(Debug, Clone, Default)]
pub enum Register {
    #[default]
    Empty,
    Range(IndexRange),
    Indices(FlexVector<u32>),
    Bits(BitVector),
    Scalar(Scalar),
    ScalarSet(ScalarSet),
}

/// payload types that live in registers
pub trait RegisterValue: Sized {
    const KIND: RegisterKind;
    fn wrap(self) -> Register;
    fn peek(register: &Register) -> Option<&Self>;
    fn peek_mut(register: &mut Register) -> Option<&mut Self>;
    fn unwrap(register: Register) -> Option<Self>;
}

macro_rules! register_value {
    ($ty:ty, $variant:ident) => {
        impl RegisterValue for $ty {
            const KIND: RegisterKind = RegisterKind::$variant;

            fn wrap(self) -> Register {
                Register::$variant(self)
            }

            fn peek(register: &Register) -> Option<&Self> {
                match register {
                    Register::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn peek_mut(register: &mut Register) -> Option<&mut Self> {
                match register {
                    Register::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn unwrap(register: Register) -> Option<Self> {
                match register {
                    Register::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

register_value!(IndexRange, Range);
register_value!(FlexVector<u32>, Indices);
register_value!(BitVector, Bits);
register_value!(Scalar, Scalar);
register_value!(ScalarSet, ScalarSet);

/// per-execution register storage, sized by the program
/// reading a register of the wrong kind means the program was mis-compiled,
/// which is a bug, so it panics
pub struct RegisterFile {
    registers: Vec<Register>,
}

impl RegisterFile {
    pub fn new(count: usize) -> Self {
        let mut registers = Vec::with_capacity(count);
        registers.resize_with(count, Register::default);
        Self { registers }
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    #[inline]
    pub fn get<T: RegisterValue>(&self, handle: Handle<T>) -> &T {
        let register = &self.registers[handle.index as usize];
        match T::peek(register) {
            Some(v) => v,
            None => kind_mismatch(handle.index, T::KIND, register),
        }
    }

    #[inline]
    pub fn get_mut<T: RegisterValue>(&mut self, handle: Handle<T>) -> &mut T {
        let register = &mut self.registers[handle.index as usize];
        if T::peek(register).is_none() {
            kind_mismatch(handle.index, T::KIND, register);
        }
        match T::peek_mut(register) {
            Some(v) => v,
            None => unreachable!(),
        }
    }

    /// overwrite a register, whatever it held before
    /// returns the previous contents so buffers can be recycled
    #[inline]
    pub fn set<T: RegisterValue>(&mut self, handle: Handle<T>, value: T) -> Register {
        std::mem::replace(&mut self.registers[handle.index as usize], value.wrap())
    }

    /// move a value out, leaving the register empty
    pub fn take<T: RegisterValue>(&mut self, handle: Handle<T>) -> T {
        let register = std::mem::take(&mut self.registers[handle.index as usize]);
        let kind = describe(&register);
        match T::unwrap(register) {
            Some(v) => v,
            None => panic!(
                "register r{} holds {}, expected {:?}",
                handle.index, kind, T::KIND
            ),
        }
    }

    /// empty every register, handing back the index buffers they held
    pub fn drain_indices(&mut self) -> Vec<FlexVector<u32>> {
        self.registers
            .iter_mut()
            .filter_map(|r| match std::mem::take(r) {
                Register::Indices(v) => Some(v),
                _ => None,
            })
            .collect()
    }
}

fn describe(register: &Register) -> &'static str {
    match register {
        Register::Empty => "nothing",
        Register::Range(_) => "a range",
        Register::Indices(_) => "indices",
        Register::Bits(_) => "a bit vector",
        Register::Scalar(_) => "a scalar",
        Register::ScalarSet(_) => "a scalar set",
    }
}

#[cold]
fn kind_mismatch(index: u32, expected: RegisterKind, found: &Register) -> ! {
    panic!(
        "register r{} holds {}, expected {:?}",
        index,
        describe(found),
        expected
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_access() {
        let mut registers = RegisterFile::new(3);
        let range: Handle<IndexRange> = Handle::new(0);
        let indices: Handle<FlexVector<u32>> = Handle::new(1);

        registers.set(range, IndexRange::new(2, 10));
        registers.set(indices, FlexVector::from_slice(&[1, 2, 3]));

        registers.get_mut(range).clamp(4, 6);
        assert_eq!(*registers.get(range), IndexRange::new(4, 6));
        assert_eq!(registers.get(indices).as_slice(), &[1, 2, 3]);

        let taken = registers.take(indices);
        assert_eq!(taken.len(), 3);
        assert!(matches!(registers.set(indices, taken), Register::Empty));
        assert_eq!(registers.drain_indices().len(), 1);
    }

    #[test]
    #[should_panic(expected = "expected Bits")]
    fn test_kind_mismatch_panics() {
        let mut registers = RegisterFile::new(1);
        registers.set(Handle::<IndexRange>::new(0), IndexRange::new(0, 1));
        let _ = registers.get(Handle::<BitVector>::new(0));
    }

    #[test]
    fn test_range_clamp_never_inverts() {
        let mut range = IndexRange::new(5, 10);
        range.clamp(12, 20);
        assert!(range.is_empty());
        assert_eq!(range.len(), 0);
    }

    #[test]
    fn test_membership_sets_agree() {
        let values = [9i64, 3, 3, -1, 42];
        let sorted = MembershipSet::build(values, false);
        let hashed = MembershipSet::build(values, true);
        assert_eq!(sorted.len(), 4);
        for value in -2..50 {
            assert_eq!(sorted.contains(&value), hashed.contains(&value));
        }
    }

    #[test]
    fn test_double_key() {
        assert_eq!(double_key(-0.0), double_key(0.0));
        assert_eq!(double_key(f64::NAN), None);
        assert_ne!(double_key(1.0), double_key(-1.0));
    }
}
