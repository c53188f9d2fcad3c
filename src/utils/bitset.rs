//! Fixed-width bit vector used for register liveness.
//!
//! Liveness tracks one bit per virtual register plus one trailing bit for the pending
//! invoke result, so vectors are small, dense and compared after every block visit.
//! Storage is a vector of 64-bit words; bits past `len` are always zero so that
//! equality and hashing work word by word.
//!
//! # Example
//!
//! ```rust
//! use dexflow::utils::BitSet;
//!
//! let mut live = BitSet::new(5);
//! live.insert(0);
//! live.insert(4);
//!
//! assert!(live.contains(4));
//! assert_eq!(live.count(), 2);
//! assert_eq!(live.to_string(), "10001");
//! ```

use std::fmt;

const WORD_BITS: usize = u64::BITS as usize;

/// A fixed-width set of small integers.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct BitSet {
    words: Vec<u64>,
    len: usize,
}

impl BitSet {
    /// Creates an all-zero vector holding `len` bits.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(WORD_BITS)],
            len,
        }
    }

    /// Number of bits the vector holds.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no bit is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Index of the highest bit. Liveness keeps the pending-result slot here.
    ///
    /// # Panics
    ///
    /// Panics on a zero-width vector.
    #[must_use]
    pub fn last_index(&self) -> usize {
        assert!(self.len > 0, "zero-width bit vector has no last index");
        self.len - 1
    }

    /// Sets bit `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn insert(&mut self, index: usize) {
        let (word, mask) = self.locate(index);
        self.words[word] |= mask;
    }

    /// Clears bit `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn remove(&mut self, index: usize) {
        let (word, mask) = self.locate(index);
        self.words[word] &= !mask;
    }

    /// Tests bit `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        let (word, mask) = self.locate(index);
        self.words[word] & mask != 0
    }

    /// Number of set bits.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Clears every bit.
    pub fn clear(&mut self) {
        self.words.fill(0);
    }

    /// Adds every bit of `other`, returning `true` if anything changed.
    ///
    /// # Panics
    ///
    /// Panics if the widths differ.
    pub fn union_with(&mut self, other: &Self) -> bool {
        assert_eq!(self.len, other.len, "bit vectors of different widths");
        let mut changed = false;
        for (dst, src) in self.words.iter_mut().zip(&other.words) {
            let merged = *dst | *src;
            changed |= merged != *dst;
            *dst = merged;
        }
        changed
    }

    /// Iterates the indices of set bits in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            let mut rest = word;
            std::iter::from_fn(move || {
                if rest == 0 {
                    return None;
                }
                let bit = rest.trailing_zeros() as usize;
                rest &= rest - 1;
                Some(i * WORD_BITS + bit)
            })
        })
    }

    fn locate(&self, index: usize) -> (usize, u64) {
        assert!(
            index < self.len,
            "bit {index} out of range for a vector of {} bits",
            self.len
        );
        (index / WORD_BITS, 1u64 << (index % WORD_BITS))
    }
}

/// Binary form with the highest index first, one character per bit.
impl fmt::Display for BitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for index in (0..self.len).rev() {
            f.write_str(if self.contains(index) { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl fmt::Debug for BitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
