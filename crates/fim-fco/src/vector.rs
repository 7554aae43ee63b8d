//! A dense bitset over the property index space, growable in 32-bit words.

/// A bitset over a genre's property index space.
///
/// `size()` is always a multiple of 32 (a whole number of words).
/// `contains(i)` only holds for `0 <= i < size()`; per the invariant in
/// spec.md §3, `add` never implicitly grows the vector -- callers that
/// want growth call [`PropertyVector::add_and_grow`] explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PropertyVector {
    words: Vec<u32>,
}

const BITS_PER_WORD: usize = 32;

impl PropertyVector {
    #[must_use]
    pub fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// A vector with at least `n_slots` slots (rounded up to a whole word).
    #[must_use]
    pub fn with_capacity(n_slots: usize) -> Self {
        let n_words = n_slots.div_ceil(BITS_PER_WORD);
        Self {
            words: vec![0; n_words],
        }
    }

    /// Number of addressable slots, always a multiple of 32.
    #[must_use]
    pub fn size(&self) -> usize {
        self.words.len() * BITS_PER_WORD
    }

    fn word_and_bit(index: usize) -> (usize, u32) {
        (index / BITS_PER_WORD, 1u32 << (index % BITS_PER_WORD))
    }

    /// Set bit `index`. No-op if `index >= size()`; does not grow the
    /// vector. See [`Self::add_and_grow`] for the growing variant.
    pub fn add(&mut self, index: usize) {
        if index >= self.size() {
            return;
        }
        let (w, bit) = Self::word_and_bit(index);
        self.words[w] |= bit;
    }

    /// Set bit `index`, growing the vector with zero words if needed.
    pub fn add_and_grow(&mut self, index: usize) {
        if index >= self.size() {
            let n_words = (index / BITS_PER_WORD) + 1;
            self.words.resize(n_words, 0);
        }
        self.add(index);
    }

    /// Clear bit `index`. Out-of-range is a no-op.
    pub fn remove(&mut self, index: usize) {
        if index >= self.size() {
            return;
        }
        let (w, bit) = Self::word_and_bit(index);
        self.words[w] &= !bit;
    }

    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        if index >= self.size() {
            return false;
        }
        let (w, bit) = Self::word_and_bit(index);
        self.words[w] & bit != 0
    }

    /// Remove every bit.
    pub fn clear(&mut self) {
        for w in &mut self.words {
            *w = 0;
        }
    }

    /// Number of set bits.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Iterate over the set indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.size()).filter(move |&i| self.contains(i))
    }

    fn combine(a: &Self, b: &Self, f: impl Fn(u32, u32) -> u32) -> Self {
        let n = a.words.len().max(b.words.len());
        let mut words = Vec::with_capacity(n);
        for i in 0..n {
            let wa = a.words.get(i).copied().unwrap_or(0);
            let wb = b.words.get(i).copied().unwrap_or(0);
            words.push(f(wa, wb));
        }
        Self { words }
    }

    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self::combine(self, other, |a, b| a | b)
    }

    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        Self::combine(self, other, |a, b| a & b)
    }

    /// Set difference: bits in `self` but not in `other`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        Self::combine(self, other, |a, b| a & !b)
    }

    #[must_use]
    pub fn symmetric_difference(&self, other: &Self) -> Self {
        Self::combine(self, other, |a, b| a ^ b)
    }

    /// True iff every bit set in `self` is also set in `other`.
    #[must_use]
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.iter().all(|i| other.contains(i))
    }

    /// Little-endian word count followed by the raw words (spec.md §4.1).
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.words.len() * 4);
        out.extend_from_slice(&(self.words.len() as u32).to_le_bytes());
        for w in &self.words {
            out.extend_from_slice(&w.to_le_bytes());
        }
        out
    }

    /// Inverse of [`Self::serialize`]. Returns `None` on truncated input.
    #[must_use]
    pub fn deserialize(buf: &[u8]) -> Option<(Self, &[u8])> {
        if buf.len() < 4 {
            return None;
        }
        let (count_bytes, rest) = buf.split_at(4);
        let count = u32::from_le_bytes(count_bytes.try_into().ok()?) as usize;
        if rest.len() < count * 4 {
            return None;
        }
        let mut words = Vec::with_capacity(count);
        let mut rest = rest;
        for _ in 0..count {
            let (w, r) = rest.split_at(4);
            words.push(u32::from_le_bytes(w.try_into().ok()?));
            rest = r;
        }
        Some((Self { words }, rest))
    }
}

impl FromIterator<usize> for PropertyVector {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        let mut v = Self::new();
        for i in iter {
            v.add_and_grow(i);
        }
        v
    }
}
