use super::slab::Slab;

/// growable sequence of `T` backed by exactly one `Slab`
/// invariant: len <= slab.capacity(); overflow reallocates into a slab twice
/// the size before the element is written
#[derive(Debug, Clone)]
pub struct FlexVector<T> {
    slab: Slab<T>,
    len: usize,
}

impl<T: Copy + Default> FlexVector<T> {
    /// capacity of the first slab allocated by a push into an empty vector
    pub const INITIAL_CAPACITY: usize = 64;

    /// create an empty vector, no allocation until the first push
    pub fn new() -> Self {
        Self {
            slab: Slab::empty(),
            len: 0,
        }
    }

    /// create an empty vector with room for exactly `capacity` elements
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slab: Slab::allocate(capacity),
            len: 0,
        }
    }

    /// create a vector holding a copy of `values`
    pub fn from_slice(values: &[T]) -> Self {
        Self {
            slab: Slab::from_slice(values),
            len: values.len(),
        }
    }

    /// wrap an existing slab, treating its first `len` elements as live
    pub fn from_slab(slab: Slab<T>, len: usize) -> Self {
        assert!(len <= slab.capacity(), "FlexVector length exceeds slab");
        Self { slab, len }
    }

    /// append a value, amortized O(1)
    #[inline]
    pub fn push(&mut self, value: T) {
        if self.len == self.slab.capacity() {
            self.grow_for(self.len + 1);
        }
        self.slab[self.len] = value;
        self.len += 1;
    }

    /// make sure the backing slab can hold at least `capacity` elements
    /// used when the final size is known up front so pushes never reallocate
    pub fn reserve(&mut self, capacity: usize) {
        if capacity > self.slab.capacity() {
            self.grow_to(capacity);
        }
    }

    /// append every value in `values`
    pub fn extend_from_slice(&mut self, values: &[T]) {
        self.grow_for(self.len + values.len());
        self.slab.as_mut_slice()[self.len..self.len + values.len()].copy_from_slice(values);
        self.len += values.len();
    }

    /// set the length to `len`, filling new slots with `T::default()`
    pub fn resize(&mut self, len: usize) {
        self.grow_for(len);
        if len > self.len {
            self.slab.as_mut_slice()[self.len..len].fill(T::default());
        }
        self.len = len;
    }

    /// keep only the elements for which `keep` returns true, preserving order
    /// compacts in place, never allocates
    pub fn retain(&mut self, mut keep: impl FnMut(T) -> bool) {
        let data = self.slab.as_mut_slice();
        let mut write = 0;
        for read in 0..self.len {
            let value = data[read];
            if keep(value) {
                data[write] = value;
                write += 1;
            }
        }
        self.len = write;
    }

    /// copy the live elements out into a `Vec`
    pub fn to_vec(&self) -> Vec<T> {
        self.as_slice().to_vec()
    }

    /// amortized growth: at least double the slab once `needed` no longer fits
    fn grow_for(&mut self, needed: usize) {
        let capacity = self.slab.capacity();
        if needed > capacity {
            self.grow_to(needed.max(capacity * 2).max(Self::INITIAL_CAPACITY));
        }
    }

    /// move existing elements into a new slab of `capacity` and drop the old one
    fn grow_to(&mut self, capacity: usize) {
        let mut slab = Slab::allocate(capacity);
        slab.as_mut_slice()[..self.len].copy_from_slice(&self.slab.as_slice()[..self.len]);
        self.slab = slab;
    }
}

impl<T> FlexVector<T> {
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slab.capacity()
    }

    /// the live elements
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.slab.as_slice()[..self.len]
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.slab.as_mut_slice()[..self.len]
    }

    #[inline]
    pub fn get(&self, i: usize) -> Option<&T> {
        self.as_slice().get(i)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    /// shorten to `len` elements, no-op when already shorter
    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }

    /// drop all elements, keep the slab
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// give back the backing slab (e.g. to a buffer pool)
    pub fn into_slab(self) -> Slab<T> {
        self.slab
    }
}

impl<T: Copy + Default> Default for FlexVector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PartialEq> PartialEq for FlexVector<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_first_push_allocates_initial_capacity() {
        let mut v: FlexVector<u32> = FlexVector::new();
        assert_eq!(v.capacity(), 0);

        v.push(7);
        assert_eq!(v.len(), 1);
        assert_eq!(v.capacity(), FlexVector::<u32>::INITIAL_CAPACITY);
    }

    #[test]
    fn test_growth_doubles() {
        let mut v: FlexVector<u32> = FlexVector::with_capacity(4);
        for i in 0..5 {
            v.push(i);
        }
        assert_eq!(v.capacity(), FlexVector::<u32>::INITIAL_CAPACITY.max(8));

        let mut v: FlexVector<u32> = FlexVector::with_capacity(100);
        for i in 0..101 {
            v.push(i);
        }
        assert_eq!(v.capacity(), 200);
    }

    #[test]
    fn test_push_round_trip_keeps_values_and_invariant() {
        let mut rng = StdRng::seed_from_u64(7);
        let values: Vec<i64> = (0..10_000).map(|_| rng.gen_range(i64::MIN..i64::MAX)).collect();

        let mut v = FlexVector::new();
        for &value in &values {
            v.push(value);
            assert!(v.len() <= v.capacity());
        }

        assert_eq!(v.as_slice(), values.as_slice());
    }

    #[test]
    fn test_reserve_prevents_reallocation() {
        let mut v: FlexVector<u32> = FlexVector::new();
        v.reserve(1000);
        assert_eq!(v.capacity(), 1000);

        for i in 0..1000 {
            v.push(i);
        }
        assert_eq!(v.capacity(), 1000);

        // reserving less than current capacity is a no-op
        v.reserve(10);
        assert_eq!(v.capacity(), 1000);
    }

    #[test]
    fn test_retain_compacts_in_order() {
        let mut v = FlexVector::from_slice(&[1u32, 2, 3, 4, 5, 6]);
        v.retain(|x| x % 2 == 0);
        assert_eq!(v.as_slice(), &[2, 4, 6]);
        assert_eq!(v.capacity(), 6);
    }

    #[test]
    fn test_truncate_resize_and_extend() {
        let mut v = FlexVector::from_slice(&[9u32, 8, 7]);
        v.truncate(10);
        assert_eq!(v.len(), 3);

        v.truncate(1);
        assert_eq!(v.as_slice(), &[9]);

        v.resize(3);
        assert_eq!(v.as_slice(), &[9, 0, 0]);

        v.extend_from_slice(&[1, 2]);
        assert_eq!(v.as_slice(), &[9, 0, 0, 1, 2]);
    }

    #[test]
    fn test_extend_and_resize_grow_geometrically() {
        let mut v: FlexVector<u32> = FlexVector::new();
        v.extend_from_slice(&[1, 2, 3]);
        assert_eq!(v.capacity(), FlexVector::<u32>::INITIAL_CAPACITY);

        let mut reallocations = 0;
        for i in 0..1000u32 {
            let before = v.capacity();
            v.extend_from_slice(&[i, i]);
            if v.capacity() != before {
                assert_eq!(v.capacity(), before * 2);
                reallocations += 1;
            }
        }
        assert_eq!(v.len(), 2003);
        assert_eq!(v.capacity(), 4096);
        assert_eq!(reallocations, 6);

        // a single large request jumps straight to the needed size
        v.extend_from_slice(&vec![7; 10_000]);
        assert_eq!(v.capacity(), 12_003);

        let mut v: FlexVector<u32> = FlexVector::with_capacity(100);
        v.resize(101);
        assert_eq!(v.capacity(), 200);
        v.resize(150);
        assert_eq!(v.capacity(), 200);
    }

    #[test]
    #[should_panic(expected = "FlexVector length exceeds slab")]
    fn test_from_slab_rejects_bad_length() {
        let _ = FlexVector::from_slab(Slab::<u32>::allocate(2), 3);
    }
}
