/// dense bit-packed boolean mask over row positions
/// stored as u64 words so masks can be combined a word at a time
/// bounds are only debug-asserted: callers size registers correctly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitVector {
    /// data stored as u64 words (64 bits each)
    words: Vec<u64>,

    /// number of bits, fixed at construction
    len: usize,
}

impl BitVector {
    /// number of bits in a word
    const BITS_PER_WORD: usize = 64;

    /// create a bit vector with every bit cleared
    pub fn new(len: usize) -> Self {
        let num_words = len.div_ceil(Self::BITS_PER_WORD);
        Self {
            words: vec![0u64; num_words],
            len,
        }
    }

    /// create a bit vector with every bit set
    pub fn new_all_set(len: usize) -> Self {
        let num_words = len.div_ceil(Self::BITS_PER_WORD);
        let mut bv = Self {
            words: vec![u64::MAX; num_words],
            len,
        };
        bv.clear_tail();
        bv
    }

    /// build a bit vector of `len` bits where bit i = f(i)
    /// packs a whole word before storing it
    pub fn from_fn(len: usize, mut f: impl FnMut(usize) -> bool) -> Self {
        let num_words = len.div_ceil(Self::BITS_PER_WORD);
        let mut words = Vec::with_capacity(num_words);
        for w in 0..num_words {
            let base = w * Self::BITS_PER_WORD;
            let end = (base + Self::BITS_PER_WORD).min(len);
            let mut word = 0u64;
            for i in base..end {
                word |= (f(i) as u64) << (i - base);
            }
            words.push(word);
        }
        Self { words, len }
    }

    /// get the word index and bit position for a given index
    #[inline]
    fn word_and_bit(index: usize) -> (usize, usize) {
        (index / Self::BITS_PER_WORD, index % Self::BITS_PER_WORD)
    }

    /// zero the unused bits past `len` in the last word
    /// keeps count_set_bits and word-level ops exact
    fn clear_tail(&mut self) {
        let remaining_bits = self.len % Self::BITS_PER_WORD;
        if remaining_bits > 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << remaining_bits) - 1;
            }
        }
    }

    #[inline]
    pub fn get(&self, index: usize) -> bool {
        debug_assert!(index < self.len, "Index out of bounds");

        let (word_index, bit_index) = Self::word_and_bit(index);
        (self.words[word_index] & (1u64 << bit_index)) != 0
    }

    #[inline]
    pub fn set(&mut self, index: usize) {
        debug_assert!(index < self.len, "Index out of bounds");

        let (word_index, bit_index) = Self::word_and_bit(index);
        self.words[word_index] |= 1u64 << bit_index;
    }

    #[inline]
    pub fn clear(&mut self, index: usize) {
        debug_assert!(index < self.len, "Index out of bounds");

        let (word_index, bit_index) = Self::word_and_bit(index);
        self.words[word_index] &= !(1u64 << bit_index);
    }

    /// set or clear a bit based on a boolean value
    #[inline]
    pub fn assign(&mut self, index: usize, value: bool) {
        if value {
            self.set(index);
        } else {
            self.clear(index);
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// count the set bits
    pub fn count_set_bits(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// count the set bits in positions [0, count)
    pub fn count_set_bits_until(&self, count: usize) -> usize {
        debug_assert!(count <= self.len, "Count exceeds bit vector length");

        let full_words = count / Self::BITS_PER_WORD;
        let mut total: usize = self.words[..full_words]
            .iter()
            .map(|w| w.count_ones() as usize)
            .sum();

        let remaining_bits = count % Self::BITS_PER_WORD;
        if remaining_bits > 0 {
            let mask = (1u64 << remaining_bits) - 1;
            total += (self.words[full_words] & mask).count_ones() as usize;
        }
        total
    }

    /// check whether every bit is set
    /// fast path for validity masks: a fully valid column can skip null checks
    pub fn all_set(&self) -> bool {
        self.count_set_bits() == self.len
    }

    /// call `f` with the index of every set bit, ascending
    /// skips zero words entirely and walks set bits with trailing_zeros
    pub fn for_each_set_bit(&self, mut f: impl FnMut(usize)) {
        for (word_index, &word) in self.words.iter().enumerate() {
            let mut w = word;
            while w != 0 {
                let bit = w.trailing_zeros() as usize;
                f(word_index * Self::BITS_PER_WORD + bit);
                w &= w - 1; // clear the lowest set bit
            }
        }
    }

    /// self &= other, word by word
    pub fn and_into(&mut self, other: &BitVector) {
        debug_assert_eq!(self.len, other.len, "BitVector length mismatch");
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a &= *b;
        }
    }

    /// self |= other, word by word
    pub fn or_into(&mut self, other: &BitVector) {
        debug_assert_eq!(self.len, other.len, "BitVector length mismatch");
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= *b;
        }
    }

    /// flip every bit
    pub fn not_in_place(&mut self) {
        for word in &mut self.words {
            *word = !*word;
        }
        self.clear_tail();
    }

    /// copy bits [start, end) into a new bit vector of length end - start
    pub fn slice(&self, start: usize, end: usize) -> BitVector {
        debug_assert!(start <= end && end <= self.len, "Slice out of bounds");

        let len = end - start;
        if start % Self::BITS_PER_WORD == 0 {
            // aligned: copy whole words then trim
            let first = start / Self::BITS_PER_WORD;
            let num_words = len.div_ceil(Self::BITS_PER_WORD);
            let mut bv = BitVector {
                words: self.words[first..first + num_words].to_vec(),
                len,
            };
            bv.clear_tail();
            return bv;
        }
        BitVector::from_fn(len, |i| self.get(start + i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_bit_vector_all_clear() {
        let bv = BitVector::new(100);
        assert_eq!(bv.len(), 100);
        for i in 0..100 {
            assert!(!bv.get(i), "Bit {} should be clear", i);
        }
        assert_eq!(bv.count_set_bits(), 0);
    }

    #[test]
    fn test_new_all_set() {
        let bv = BitVector::new_all_set(100);
        for i in 0..100 {
            assert!(bv.get(i), "Bit {} should be set", i);
        }
        assert_eq!(bv.count_set_bits(), 100);
        assert!(bv.all_set());
    }

    #[test]
    fn test_set_get_clear() {
        let mut bv = BitVector::new(10);

        bv.set(3);
        bv.set(7);
        assert!(bv.get(3));
        assert!(bv.get(7));
        assert!(!bv.get(4));
        assert_eq!(bv.count_set_bits(), 2);

        bv.clear(3);
        assert!(!bv.get(3));
        assert_eq!(bv.count_set_bits(), 1);

        bv.assign(0, true);
        bv.assign(7, false);
        assert!(bv.get(0));
        assert!(!bv.get(7));
    }

    #[test]
    fn test_boundary_64_bits() {
        let mut bv = BitVector::new(128);

        bv.set(63); // last bit of first word
        bv.set(64); // first bit of second word

        assert!(bv.get(63));
        assert!(bv.get(64));
        assert!(!bv.get(62));
        assert!(!bv.get(65));
        assert_eq!(bv.count_set_bits_until(64), 1);
        assert_eq!(bv.count_set_bits_until(65), 2);
    }

    #[test]
    fn test_for_each_set_bit_ascending() {
        let mut bv = BitVector::new(200);
        for i in [0, 5, 63, 64, 130, 199] {
            bv.set(i);
        }

        let mut seen = Vec::new();
        bv.for_each_set_bit(|i| seen.push(i));
        assert_eq!(seen, vec![0, 5, 63, 64, 130, 199]);
    }

    #[test]
    fn test_and_or_into() {
        let a_bits = BitVector::from_fn(70, |i| i % 2 == 0);
        let b_bits = BitVector::from_fn(70, |i| i % 3 == 0);

        let mut and = a_bits.clone();
        and.and_into(&b_bits);
        let mut or = a_bits.clone();
        or.or_into(&b_bits);

        for i in 0..70 {
            assert_eq!(and.get(i), i % 6 == 0);
            assert_eq!(or.get(i), i % 2 == 0 || i % 3 == 0);
        }
    }

    #[test]
    fn test_not_keeps_tail_clear() {
        let mut bv = BitVector::new(70);
        bv.set(1);
        bv.not_in_place();
        assert_eq!(bv.count_set_bits(), 69);
        assert!(!bv.get(1));
    }

    #[test]
    fn test_slice_aligned_and_unaligned() {
        let bv = BitVector::from_fn(300, |i| i % 7 == 0);

        let aligned = bv.slice(64, 200);
        assert_eq!(aligned.len(), 136);
        for i in 0..136 {
            assert_eq!(aligned.get(i), (i + 64) % 7 == 0);
        }
        assert_eq!(aligned.count_set_bits(), (64..200).filter(|i| i % 7 == 0).count());

        let unaligned = bv.slice(3, 10);
        assert_eq!(unaligned.len(), 7);
        for i in 0..7 {
            assert_eq!(unaligned.get(i), (i + 3) % 7 == 0);
        }
    }
}
