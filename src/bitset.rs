//! Compact bitset rows for taxon sets.
//!
//! # Overview
//! The conflict scan compares every reported clade with every other one. Each
//! comparison needs a handful of set intersections over the taxon universe,
//! so clades and complements are packed into `u64` words once and the scan
//! works on words instead of sorted id lists.
//!
//! # Example
//! With taxa [A, B, C, D] numbered [0, 1, 2, 3]:
//! - Clade {A, C} → bitset `0b0101` (bits 0 and 2 set)
//! - Clade {B, C, D} → bitset `0b1110` (bits 1, 2, 3 set)

/// A set of taxon ids packed into `u64` words (64 ids per word).
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Bitset(pub Vec<u64>);

impl Bitset {
    /// Creates an empty bitset of `words` words; use `num_taxa.div_ceil(64)`.
    ///
    /// # Example
    /// ```
    /// # use rust_python_clade_support::bitset::Bitset;
    /// let bs = Bitset::zeros(2);
    /// assert_eq!(bs.0.len(), 2);
    /// assert!(bs.is_empty());
    /// ```
    pub fn zeros(words: usize) -> Self {
        Bitset(vec![0u64; words])
    }

    /// Builds a bitset holding `ids`.
    ///
    /// # Example
    /// ```
    /// # use rust_python_clade_support::bitset::Bitset;
    /// let bs = Bitset::from_ids(1, &[0, 5]);
    /// assert_eq!(bs.0[0], 0b00100001);
    /// ```
    pub fn from_ids(words: usize, ids: &[usize]) -> Self {
        let mut bs = Self::zeros(words);
        for &id in ids {
            bs.set(id);
        }
        bs
    }

    #[inline]
    pub fn set(&mut self, idx: usize) {
        let word = idx >> 6;
        let bit = idx & 63;
        self.0[word] |= 1u64 << bit;
    }

    #[inline]
    pub fn contains(&self, idx: usize) -> bool {
        self.0
            .get(idx >> 6)
            .is_some_and(|w| w & (1u64 << (idx & 63)) != 0)
    }

    /// Union in place: `self` becomes `self ∪ other`.
    #[inline]
    pub fn or_assign(&mut self, other: &Bitset) {
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a |= *b;
        }
    }

    /// Intersection as a new bitset.
    ///
    /// # Example
    /// ```
    /// # use rust_python_clade_support::bitset::Bitset;
    /// let left = Bitset::from_ids(1, &[0, 1, 2]);
    /// let right = Bitset::from_ids(1, &[1, 2, 3]);
    /// assert_eq!(left.and(&right), Bitset::from_ids(1, &[1, 2]));
    /// ```
    #[inline]
    pub fn and(&self, other: &Bitset) -> Bitset {
        Bitset(self.0.iter().zip(&other.0).map(|(a, b)| a & b).collect())
    }

    #[inline]
    pub fn union(&self, other: &Bitset) -> Bitset {
        let mut out = self.clone();
        out.or_assign(other);
        out
    }

    /// Whether the two sets share at least one id.
    #[inline]
    pub fn intersects(&self, other: &Bitset) -> bool {
        self.0.iter().zip(&other.0).any(|(a, b)| a & b != 0)
    }

    /// Whether every id of `self` is also in `other`.
    #[inline]
    pub fn is_subset_of(&self, other: &Bitset) -> bool {
        self.0.iter().zip(&other.0).all(|(a, b)| a & !b == 0)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&w| w == 0)
    }

    /// Population count: how many taxa are in the set.
    #[inline]
    pub fn count_ones(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }
}
