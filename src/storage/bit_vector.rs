//! Fixed-size bit vector over state (or choice) indices.
//!
//! Unlike a growable set, the size is fixed at construction time so that
//! complementation is well defined: `!v` flips exactly `v.size()` bits.

use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

const BITS_PER_WORD: usize = 64;

#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct BitVector {
    words: Vec<u64>,
    size: usize,
}

impl BitVector {
    /// Creates a bit vector of `size` bits, all set to `value`.
    pub fn new(size: usize, value: bool) -> BitVector {
        let num_words = (size + BITS_PER_WORD - 1) / BITS_PER_WORD;
        let fill = if value { u64::MAX } else { 0 };
        let mut v = BitVector { words: vec![fill; num_words], size };
        v.truncate_last_word();
        v
    }

    /// Creates a bit vector of `size` bits where exactly the given indices are set.
    pub fn from_indices<I: IntoIterator<Item = usize>>(size: usize, indices: I) -> BitVector {
        let mut v = BitVector::new(size, false);
        for i in indices {
            v.set(i, true);
        }
        v
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    fn word_and_bit(index: usize) -> (usize, usize) {
        (index / BITS_PER_WORD, index % BITS_PER_WORD)
    }

    // bits beyond `size` in the last word must stay zero, otherwise Eq/Hash and counting break
    fn truncate_last_word(&mut self) {
        let rem = self.size % BITS_PER_WORD;
        if rem != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << rem) - 1;
            }
        }
    }

    #[inline]
    pub fn get(&self, index: usize) -> bool {
        debug_assert!(index < self.size, "index {} out of bounds ({})", index, self.size);
        let (w, b) = Self::word_and_bit(index);
        (self.words[w] >> b) & 1 == 1
    }

    #[inline]
    pub fn set(&mut self, index: usize, value: bool) {
        debug_assert!(index < self.size, "index {} out of bounds ({})", index, self.size);
        let (w, b) = Self::word_and_bit(index);
        if value {
            self.words[w] |= 1u64 << b;
        } else {
            self.words[w] &= !(1u64 << b);
        }
    }

    pub fn clear(&mut self) {
        for w in self.words.iter_mut() {
            *w = 0;
        }
    }

    /// Number of set bits.
    pub fn number_of_set_bits(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Number of set bits strictly before `index`.
    pub fn number_of_set_bits_before_index(&self, index: usize) -> usize {
        let (w, b) = Self::word_and_bit(index);
        let mut count: usize = self.words[..w].iter().map(|x| x.count_ones() as usize).sum();
        if b > 0 && w < self.words.len() {
            count += (self.words[w] & ((1u64 << b) - 1)).count_ones() as usize;
        }
        count
    }

    /// For every index `i`, the number of set bits before `i`. Used to compact
    /// a state space onto the set bits of this vector.
    pub fn number_of_set_bits_before_indices(&self) -> Vec<usize> {
        let mut result = Vec::with_capacity(self.size);
        let mut count = 0;
        for i in 0..self.size {
            result.push(count);
            if self.get(i) {
                count += 1;
            }
        }
        result
    }

    /// `true` if no bit is set.
    pub fn empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// `true` if every bit is set.
    pub fn full(&self) -> bool {
        self.number_of_set_bits() == self.size
    }

    pub fn complement(&mut self) {
        for w in self.words.iter_mut() {
            *w = !*w;
        }
        self.truncate_last_word();
    }

    /// `self & !other`
    pub fn minus(&self, other: &BitVector) -> BitVector {
        debug_assert_eq!(self.size, other.size);
        let words = self.words.iter().zip(other.words.iter()).map(|(a, b)| a & !b).collect();
        BitVector { words, size: self.size }
    }

    pub fn is_subset_of(&self, other: &BitVector) -> bool {
        self.words.iter().zip(other.words.iter()).all(|(a, b)| a & !b == 0)
    }

    pub fn is_disjoint_from(&self, other: &BitVector) -> bool {
        self.words.iter().zip(other.words.iter()).all(|(a, b)| a & b == 0)
    }

    /// Smallest set index `>= from`, or `size()` if there is none.
    pub fn next_set_index(&self, from: usize) -> usize {
        if from >= self.size {
            return self.size;
        }
        let (mut w, b) = Self::word_and_bit(from);
        let mut word = self.words[w] & (u64::MAX << b);
        loop {
            if word != 0 {
                let index = w * BITS_PER_WORD + word.trailing_zeros() as usize;
                return index.min(self.size);
            }
            w += 1;
            if w >= self.words.len() {
                return self.size;
            }
            word = self.words[w];
        }
    }

    /// Iterates over the indices of set bits in increasing order.
    pub fn iter(&self) -> SetBits<'_> {
        SetBits { vector: self, next: 0 }
    }

    /// Keeps only the values whose index is set.
    pub fn filter<T: Clone>(&self, values: &[T]) -> Vec<T> {
        self.iter().map(|i| values[i].clone()).collect()
    }
}

pub struct SetBits<'a> {
    vector: &'a BitVector,
    next: usize,
}

impl<'a> Iterator for SetBits<'a> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let index = self.vector.next_set_index(self.next);
        if index >= self.vector.size {
            self.next = index;
            None
        } else {
            self.next = index + 1;
            Some(index)
        }
    }
}

impl<'a> IntoIterator for &'a BitVector {
    type Item = usize;
    type IntoIter = SetBits<'a>;

    fn into_iter(self) -> SetBits<'a> {
        self.iter()
    }
}

impl BitAnd for &BitVector {
    type Output = BitVector;

    fn bitand(self, rhs: &BitVector) -> BitVector {
        debug_assert_eq!(self.size, rhs.size);
        let words = self.words.iter().zip(rhs.words.iter()).map(|(a, b)| a & b).collect();
        BitVector { words, size: self.size }
    }
}

impl BitOr for &BitVector {
    type Output = BitVector;

    fn bitor(self, rhs: &BitVector) -> BitVector {
        debug_assert_eq!(self.size, rhs.size);
        let words = self.words.iter().zip(rhs.words.iter()).map(|(a, b)| a | b).collect();
        BitVector { words, size: self.size }
    }
}

impl BitAndAssign<&BitVector> for BitVector {
    fn bitand_assign(&mut self, rhs: &BitVector) {
        debug_assert_eq!(self.size, rhs.size);
        for (a, b) in self.words.iter_mut().zip(rhs.words.iter()) {
            *a &= b;
        }
    }
}

impl BitOrAssign<&BitVector> for BitVector {
    fn bitor_assign(&mut self, rhs: &BitVector) {
        debug_assert_eq!(self.size, rhs.size);
        for (a, b) in self.words.iter_mut().zip(rhs.words.iter()) {
            *a |= b;
        }
    }
}

impl Not for &BitVector {
    type Output = BitVector;

    fn not(self) -> BitVector {
        let mut v = self.clone();
        v.complement();
        v
    }
}

impl Not for BitVector {
    type Output = BitVector;

    fn not(mut self) -> BitVector {
        self.complement();
        self
    }
}

impl fmt::Debug for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitVector({}){:?}", self.size, self.iter().collect::<Vec<_>>())
    }
}
