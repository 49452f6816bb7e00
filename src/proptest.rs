//! Proptest strategies for the basic types of this crate.
use crate::multi_index::Multiindex;
use ::proptest::collection::{btree_set, vec};
use ::proptest::prelude::*;
use nalgebra::Point2;
use std::collections::BTreeSet;

/// Points in the unit square.
pub fn point2_in_unit_square() -> impl Strategy<Value = Point2<f64>> {
    [0.0..=1.0, 0.0..=1.0].prop_map(|[x, y]| Point2::new(x, y))
}

/// Multi-indices with at most `max_len` stored entries, each at most `max_entry`.
///
/// Trailing zeros are generated too, so the strategy exercises normalization.
pub fn multiindex(max_len: usize, max_entry: usize) -> impl Strategy<Value = Multiindex> {
    vec(0..=max_entry, 0..=max_len).prop_map(Multiindex::new)
}

/// Downward closed sets of multi-indices, built from a few random generators.
///
/// Every index of the set has all of its predecessors `mu - e_m` in the set as well.
pub fn downward_closed_set(max_len: usize, max_entry: usize) -> impl Strategy<Value = BTreeSet<Multiindex>> {
    btree_set(multiindex(max_len, max_entry), 0..4).prop_map(|generators| {
        let mut set = BTreeSet::new();
        let mut stack: Vec<Multiindex> = generators.into_iter().collect();
        stack.push(Multiindex::zero());
        while let Some(mu) = stack.pop() {
            if set.insert(mu.clone()) {
                stack.extend((0..mu.len()).filter_map(|m| mu.dec(m, 1)));
            }
        }
        set
    })
}

impl Arbitrary for Multiindex {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        multiindex(6, 4).boxed()
    }
}
