//! Provides `PrioBitmap`, a bit array supporting constant-time lookup of the
//! highest set bit.
use core::fmt;

const WORD_LEN: usize = u64::BITS as usize;

/// A bit array of `WORDS * 64` entries. Higher positions represent higher
/// priorities.
///
/// All methods panic when the given bit position is out of range.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct PrioBitmap<const WORDS: usize> {
    words: [u64; WORDS],
}

impl<const WORDS: usize> PrioBitmap<WORDS> {
    /// The number of bits the bitmap can hold.
    pub(crate) const LEN: usize = WORDS * WORD_LEN;

    pub(crate) const fn new() -> Self {
        Self { words: [0; WORDS] }
    }

    /// Get the bit at the specified position.
    #[inline]
    pub(crate) fn get(&self, i: usize) -> bool {
        self.words[i / WORD_LEN] & (1 << (i % WORD_LEN)) != 0
    }

    /// Set the bit at the specified position.
    #[inline]
    pub(crate) fn set(&mut self, i: usize) {
        self.words[i / WORD_LEN] |= 1 << (i % WORD_LEN);
    }

    /// Clear the bit at the specified position.
    #[inline]
    pub(crate) fn clear(&mut self, i: usize) {
        self.words[i / WORD_LEN] &= !(1 << (i % WORD_LEN));
    }

    /// Get the position of the highest set bit.
    #[inline]
    pub(crate) fn find_last_set(&self) -> Option<usize> {
        self.words
            .iter()
            .enumerate()
            .rev()
            .find(|(_, &w)| w != 0)
            .map(|(i, &w)| i * WORD_LEN + (WORD_LEN - 1 - w.leading_zeros() as usize))
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Iterate over the set bits in ascending order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..Self::LEN).filter(move |&i| self.get(i))
    }
}

impl<const WORDS: usize> Default for PrioBitmap<WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const WORDS: usize> fmt::Debug for PrioBitmap<WORDS> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
