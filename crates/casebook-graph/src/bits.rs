//! Compact bit sets over dense fact and entry indices.

/// Bit set keyed by dense index
///
/// The word vector never ends in a zero word, so derived equality, hashing
/// and ordering are by content. The solver uses sets directly as search-state
/// keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    /// Empty set with room reserved for indices `0..len`
    #[must_use]
    pub fn with_capacity(len: usize) -> Self {
        Self {
            words: Vec::with_capacity(len.div_ceil(64)),
        }
    }

    /// Insert an index; returns `true` when it was not already present
    pub fn insert(&mut self, ix: usize) -> bool {
        let (w, b) = (ix / 64, ix % 64);
        if w >= self.words.len() {
            self.words.resize(w + 1, 0);
        }
        let mask = 1u64 << b;
        let fresh = self.words[w] & mask == 0;
        self.words[w] |= mask;
        fresh
    }

    /// Membership test
    #[must_use]
    pub fn contains(&self, ix: usize) -> bool {
        self.words
            .get(ix / 64)
            .is_some_and(|w| w & (1u64 << (ix % 64)) != 0)
    }

    /// Add every member of `other`
    pub fn union_with(&mut self, other: &BitSet) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= *b;
        }
    }

    /// Members present in both sets
    #[must_use]
    pub fn intersection(&self, other: &BitSet) -> BitSet {
        let mut words: Vec<u64> = self
            .words
            .iter()
            .zip(&other.words)
            .map(|(a, b)| a & b)
            .collect();
        while words.last() == Some(&0) {
            words.pop();
        }
        BitSet { words }
    }

    /// `true` when the two sets share at least one member
    #[must_use]
    pub fn intersects(&self, other: &BitSet) -> bool {
        self.words.iter().zip(&other.words).any(|(a, b)| a & b != 0)
    }

    /// `true` when every member of `self` is in `other`
    #[must_use]
    pub fn is_subset(&self, other: &BitSet) -> bool {
        self.words.iter().enumerate().all(|(i, a)| {
            let b = other.words.get(i).copied().unwrap_or(0);
            a & !b == 0
        })
    }

    /// `true` when `other` has a member missing from `self`
    #[must_use]
    pub fn adds_to(&self, other: &BitSet) -> bool {
        !other.is_subset(self)
    }

    /// `true` when no index is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Number of members
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Members in ascending order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &w)| {
            (0..64).filter(move |b| w & (1u64 << b) != 0).map(move |b| wi * 64 + b)
        })
    }
}

impl FromIterator<usize> for BitSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = BitSet::default();
        for ix in iter {
            set.insert(ix);
        }
        set
    }
}
