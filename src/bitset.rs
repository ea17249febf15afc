//! Fixed-width bitset over the sorted tip names of one tree generation.
//!
//! # Overview
//! Every edge of an unrooted tree cuts the tips into two groups. A [`Bitset`]
//! records one of those groups: bit `i` is set iff the `i`-th tip (in sorted
//! name order) lies on the recorded side.
//!
//! # Example
//! For tips `[A, B, C, D]` mapped to indices `[0, 1, 2, 3]`:
//! - side {C, D} → `0b1100`
//! - side {B}    → `0b0010`

/// A compact bitset holding one side of a bipartition.
///
/// Bits are packed into `u64` words, 64 tips per word. Bits at positions
/// `>= num_tips` are always zero, so two bitsets of the same generation
/// compare equal iff they describe the same tip set.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Bitset(pub Vec<u64>);

impl Bitset {
    /// Number of `u64` words needed for `num_tips` bits.
    #[inline]
    pub fn words_for(num_tips: usize) -> usize {
        num_tips.div_ceil(64)
    }

    /// Creates a new bitset with all bits set to 0.
    ///
    /// # Example
    /// ```
    /// # use spr_replay::bitset::Bitset;
    /// // 100 tips need 2 words (128 bits)
    /// let bs = Bitset::zeros(Bitset::words_for(100));
    /// assert_eq!(bs.0.len(), 2);
    /// ```
    pub fn zeros(words: usize) -> Self {
        Bitset(vec![0u64; words])
    }

    /// Marks tip `idx` as present on this side.
    ///
    /// # Example
    /// ```
    /// # use spr_replay::bitset::Bitset;
    /// let mut bs = Bitset::zeros(1);
    /// bs.set(0);
    /// bs.set(5);
    /// assert_eq!(bs.0[0], 0b00100001);
    /// ```
    #[inline]
    pub fn set(&mut self, idx: usize) {
        let word = idx >> 6;
        let bit = idx & 63;
        self.0[word] |= 1u64 << bit;
    }

    /// Returns whether tip `idx` is on this side.
    #[inline]
    pub fn get(&self, idx: usize) -> bool {
        let word = idx >> 6;
        let bit = idx & 63;
        self.0.get(word).is_some_and(|w| w & (1u64 << bit) != 0)
    }

    /// Union in place: `self` becomes `self ∪ other`.
    ///
    /// # Example
    /// ```
    /// # use spr_replay::bitset::Bitset;
    /// let mut left = Bitset::zeros(1);
    /// left.set(0);
    /// let mut right = Bitset::zeros(1);
    /// right.set(1);
    /// left.or_assign(&right);
    /// assert_eq!(left.0[0], 0b11);
    /// ```
    #[inline]
    pub fn or_assign(&mut self, other: &Bitset) {
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a |= *b;
        }
    }

    /// Population count: how many tips are on this side.
    #[inline]
    pub fn count_ones(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// The other side of the bipartition over `num_tips` tips.
    ///
    /// Padding bits beyond `num_tips` stay zero.
    ///
    /// # Example
    /// ```
    /// # use spr_replay::bitset::Bitset;
    /// let mut ab = Bitset::zeros(1);
    /// ab.set(0);
    /// ab.set(1);
    /// assert_eq!(ab.complement(4).0[0], 0b1100);
    /// ```
    pub fn complement(&self, num_tips: usize) -> Bitset {
        let mut out = Bitset(self.0.iter().map(|w| !w).collect());
        let tail = num_tips & 63;
        if tail != 0 {
            if let Some(last) = out.0.last_mut() {
                *last &= (1u64 << tail) - 1;
            }
        }
        out
    }

    /// Indices of all set bits, ascending.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().flat_map(|(w, &word)| {
            (0..64).filter(move |b| word & (1u64 << b) != 0).map(move |b| (w << 6) | b)
        })
    }
}
