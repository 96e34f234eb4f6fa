use parking_lot::Mutex;

use super::flex_vector::FlexVector;
use super::slab::Slab;

/// buffer pool for reusing slabs across program executions
/// thread-safe: concurrent executions draw from and return to the same pool
/// index buffers and radix sort keys are pooled separately
pub struct BufferPool {
    indices: Shelf<u32>,
    keys: Shelf<u64>,
}

/// free slabs of one element type, at most `capacity` of them
struct Shelf<T> {
    slabs: Mutex<Vec<Slab<T>>>,
    capacity: usize,
}

impl<T: Copy + Default> Shelf<T> {
    fn new(capacity: usize) -> Self {
        Self {
            slabs: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// reuses the smallest pooled slab that is big enough, else allocates
    fn get(&self, size: usize) -> FlexVector<T> {
        let mut slabs = self.slabs.lock();

        let best = slabs
            .iter()
            .enumerate()
            .filter(|(_, slab)| slab.capacity() >= size)
            .min_by_key(|(_, slab)| slab.capacity())
            .map(|(i, _)| i);

        match best {
            Some(i) => FlexVector::from_slab(slabs.swap_remove(i), 0),
            None => FlexVector::with_capacity(size),
        }
    }

    fn put(&self, buffer: FlexVector<T>) {
        let slab = buffer.into_slab();
        if slab.capacity() == 0 {
            return;
        }

        let mut slabs = self.slabs.lock();
        // only keep it if the shelf isn't full
        if slabs.len() < self.capacity {
            slabs.push(slab);
        }
        // if the shelf is full, slab is dropped here (freed)
    }

    fn len(&self) -> usize {
        self.slabs.lock().len()
    }
}

impl BufferPool {
    /// create a new buffer pool keeping at most `capacity` slabs of each kind
    pub fn new(capacity: usize) -> Self {
        Self {
            indices: Shelf::new(capacity),
            keys: Shelf::new(capacity),
        }
    }

    /// get an empty index buffer able to hold `size` indices without growing
    pub fn get_indices(&self, size: usize) -> FlexVector<u32> {
        self.indices.get(size)
    }

    /// return a buffer to the pool (if there's room)
    pub fn return_indices(&self, indices: FlexVector<u32>) {
        self.indices.put(indices);
    }

    /// get an empty key buffer for radix sorting, able to hold `size` keys
    pub fn get_keys(&self, size: usize) -> FlexVector<u64> {
        self.keys.get(size)
    }

    pub fn return_keys(&self, keys: FlexVector<u64>) {
        self.keys.put(keys);
    }

    /// number of index slabs currently pooled
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// number of key slabs currently pooled
    pub fn key_slabs(&self) -> usize {
        self.keys.len()
    }
}
