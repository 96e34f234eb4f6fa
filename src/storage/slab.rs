use std::ops::{Index, IndexMut};

/// fixed-capacity block of `T` values
/// a slab never resizes: growth is handled one level up by allocating a bigger
/// slab and copying (see `FlexVector`)
#[derive(Debug, Clone, PartialEq)]
pub struct Slab<T> {
    data: Box<[T]>,
}

impl<T: Copy + Default> Slab<T> {
    /// allocate a slab holding exactly `capacity` default-initialised values
    /// allocation failure aborts the process, OOM is not recoverable
    pub fn allocate(capacity: usize) -> Self {
        Self {
            data: vec![T::default(); capacity].into_boxed_slice(),
        }
    }

    /// allocate a slab and copy `values` into it (capacity == values.len())
    pub fn from_slice(values: &[T]) -> Self {
        Self {
            data: values.to_vec().into_boxed_slice(),
        }
    }
}

impl<T> Slab<T> {
    /// an empty slab, no allocation
    pub fn empty() -> Self {
        Self {
            data: Vec::new().into_boxed_slice(),
        }
    }

    /// number of elements the slab holds
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// read element `i`; `i` must be < capacity
    #[inline]
    pub fn at(&self, i: usize) -> &T {
        &self.data[i]
    }

    /// mutable access to element `i`; `i` must be < capacity
    #[inline]
    pub fn at_mut(&mut self, i: usize) -> &mut T {
        &mut self.data[i]
    }

    /// the whole slab as a slice
    /// instructions take this once and index the slice in their inner loop,
    /// so the capacity check happens at the slab boundary, not per element
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T> Index<usize> for Slab<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: usize) -> &T {
        &self.data[index]
    }
}

impl<T> IndexMut<usize> for Slab<T> {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.data[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_default_initialised() {
        let slab: Slab<u32> = Slab::allocate(16);
        assert_eq!(slab.capacity(), 16);
        assert!(slab.as_slice().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_read_write() {
        let mut slab: Slab<i64> = Slab::allocate(4);
        *slab.at_mut(0) = -5;
        slab[3] = 42;

        assert_eq!(*slab.at(0), -5);
        assert_eq!(slab[3], 42);
        assert_eq!(slab.as_slice(), &[-5, 0, 0, 42]);
    }

    #[test]
    #[should_panic]
    fn test_out_of_bounds_access_panics() {
        let slab: Slab<u32> = Slab::allocate(2);
        let _ = slab.at(2);
    }

    #[test]
    fn test_empty_slab() {
        let slab: Slab<f64> = Slab::empty();
        assert_eq!(slab.capacity(), 0);
        assert!(slab.as_slice().is_empty());
    }
}
