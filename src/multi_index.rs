//! Sparse multi-indices labelling the terms of a polynomial chaos expansion.
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

/// A finitely supported vector of non-negative integers.
///
/// The representation is canonical: trailing zeros are always stripped, so that two
/// multi-indices which only differ by trailing zeros compare and hash identically.
/// Component `k` is the polynomial degree in the random variable of the
/// coefficient field term `k + 1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<usize>", into = "Vec<usize>")]
pub struct Multiindex {
    entries: Vec<usize>,
}

impl Multiindex {
    pub fn new(entries: impl Into<Vec<usize>>) -> Self {
        let mut entries = entries.into();
        while entries.last() == Some(&0) {
            entries.pop();
        }
        Self { entries }
    }

    /// The multi-index with all components zero, i.e. the deterministic mean term.
    pub fn zero() -> Self {
        Self::default()
    }

    /// The unit multi-index $e_m$.
    pub fn unit(m: usize) -> Self {
        Self::zero().inc(m, 1)
    }

    /// Index of the last nonzero component plus one.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_zero(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all components.
    pub fn order(&self) -> usize {
        self.entries.iter().sum()
    }

    /// Component `m`, which is zero beyond [`len`](Self::len).
    pub fn get(&self, m: usize) -> usize {
        self.entries.get(m).copied().unwrap_or(0)
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.entries
    }

    /// Returns a new multi-index with component `m` increased by `k`.
    pub fn inc(&self, m: usize, k: usize) -> Self {
        let mut entries = self.entries.clone();
        if entries.len() <= m {
            entries.resize(m + 1, 0);
        }
        entries[m] += k;
        Self::new(entries)
    }

    /// Returns a new multi-index with component `m` decreased by `k`,
    /// or `None` if the component would become negative.
    pub fn dec(&self, m: usize, k: usize) -> Option<Self> {
        let current = self.get(m);
        if current < k {
            None
        } else if k == 0 {
            Some(self.clone())
        } else {
            let mut entries = self.entries.clone();
            entries[m] = current - k;
            Some(Self::new(entries))
        }
    }

    /// The dimensions with nonzero exponent.
    pub fn supp(&self) -> impl '_ + Iterator<Item = usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| **e > 0)
            .map(|(m, _)| m)
    }
}

impl From<Vec<usize>> for Multiindex {
    fn from(entries: Vec<usize>) -> Self {
        Self::new(entries)
    }
}

impl From<&[usize]> for Multiindex {
    fn from(entries: &[usize]) -> Self {
        Self::new(entries.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Multiindex {
    fn from(entries: [usize; N]) -> Self {
        Self::new(entries.to_vec())
    }
}

impl From<Multiindex> for Vec<usize> {
    fn from(mu: Multiindex) -> Self {
        mu.entries
    }
}

impl FromIterator<usize> for Multiindex {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect::<Vec<_>>())
    }
}

/// Multi-indices are ordered by total order first, then lexicographically.
impl Ord for Multiindex {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order()
            .cmp(&other.order())
            .then_with(|| self.entries.cmp(&other.entries))
    }
}

impl PartialOrd for Multiindex {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Multiindex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.entries.iter().join(", "))
    }
}

/// The union of the supports of the given multi-indices.
pub fn supp<'a>(indices: impl IntoIterator<Item = &'a Multiindex>) -> BTreeSet<usize> {
    indices.into_iter().flat_map(|mu| mu.supp()).collect()
}

/// Generates all multi-indices with at most `dims` dimensions and total order at most `order`.
///
/// The result is sorted according to the ordering of [`Multiindex`].
pub fn complete_order_set(dims: usize, order: usize) -> Vec<Multiindex> {
    let mut result = vec![Multiindex::zero()];
    let mut frontier = vec![Multiindex::zero()];
    for _ in 0..order {
        let mut next = BTreeSet::new();
        for mu in &frontier {
            for m in 0..dims {
                next.insert(mu.inc(m, 1));
            }
        }
        result.extend(next.iter().cloned());
        frontier = next.into_iter().collect();
    }
    result.sort();
    result.dedup();
    result
}
