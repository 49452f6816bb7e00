use egsz::multi_index::{complete_order_set, supp, Multiindex};
use egsz::proptest::{downward_closed_set, multiindex};
use proptest::prelude::*;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

fn hash_of(mu: &Multiindex) -> u64 {
    let mut hasher = DefaultHasher::new();
    mu.hash(&mut hasher);
    hasher.finish()
}

#[test]
fn trailing_zeros_are_normalized() {
    let a = Multiindex::new([0, 1, 3, 0]);
    let b = Multiindex::new([0, 1, 3, 0, 0, 0]);
    assert_eq!(a, b);
    assert_eq!(hash_of(&a), hash_of(&b));
    assert_eq!(a.len(), 3);
    assert_eq!(a.as_slice(), &[0, 1, 3]);
    assert!(Multiindex::new([0, 0]).is_zero());
}

#[test]
fn dec_below_zero_is_none() {
    let mu = Multiindex::new([0, 1, 3, 0]);
    assert_eq!(mu.dec(0, 1), None);
    assert_eq!(mu.dec(2, 4), None);
    assert_eq!(mu.dec(7, 1), None);
    assert_eq!(mu.dec(2, 3), Some(Multiindex::new([0, 1])));
    assert_eq!(mu.dec(1, 0), Some(mu.clone()));
}

#[test]
fn components_beyond_length_are_zero() {
    let mu = Multiindex::new([2, 0, 1]);
    assert_eq!(mu.get(0), 2);
    assert_eq!(mu.get(1), 0);
    assert_eq!(mu.get(10), 0);
    assert_eq!(mu.order(), 3);
    assert_eq!(mu.supp().collect::<Vec<_>>(), vec![0, 2]);
    assert_eq!(Multiindex::unit(3), Multiindex::new([0, 0, 0, 1]));
}

#[test]
fn ordering_is_by_total_order_first() {
    let mut indices = vec![
        Multiindex::new([2]),
        Multiindex::new([0, 1]),
        Multiindex::zero(),
        Multiindex::new([1]),
        Multiindex::new([1, 1]),
    ];
    indices.sort();
    assert_eq!(
        indices,
        vec![
            Multiindex::zero(),
            Multiindex::new([0, 1]),
            Multiindex::new([1]),
            Multiindex::new([1, 1]),
            Multiindex::new([2]),
        ]
    );
}

#[test]
fn display_and_serialization() {
    let mu = Multiindex::new([0, 1, 3, 0]);
    assert_eq!(format!("{}", mu), "[0, 1, 3]");
    assert_eq!(format!("{}", Multiindex::zero()), "[]");

    let json = serde_json::to_string(&mu).unwrap();
    assert_eq!(json, "[0,1,3]");
    let parsed: Multiindex = serde_json::from_str("[0,1,3,0,0]").unwrap();
    assert_eq!(parsed, mu);
}

#[test]
fn support_of_set() {
    let indices = [Multiindex::new([1]), Multiindex::new([0, 0, 2]), Multiindex::zero()];
    assert_eq!(supp(&indices).into_iter().collect::<Vec<_>>(), vec![0, 2]);
    assert!(supp(&[Multiindex::zero()]).is_empty());
}

#[test]
fn complete_order_set_basic() {
    let set = complete_order_set(2, 2);
    assert_eq!(set.len(), 6);
    assert_eq!(set[0], Multiindex::zero());
    assert!(set.iter().all(|mu| mu.order() <= 2 && mu.len() <= 2));
    assert!(set.windows(2).all(|w| w[0] < w[1]));

    assert_eq!(complete_order_set(3, 0), vec![Multiindex::zero()]);
    // Binomial(3 + 2, 2)
    assert_eq!(complete_order_set(3, 2).len(), 10);
}

proptest! {
    #[test]
    fn inc_dec_inverse(mu in multiindex(6, 4), m in 0 .. 8usize, v in 0 .. 4usize) {
        let original = mu.clone();
        let increased = mu.inc(m, v);
        prop_assert_eq!(&mu, &original);
        prop_assert_eq!(increased.get(m), mu.get(m) + v);
        prop_assert_eq!(increased.dec(m, v), Some(mu.clone()));
        prop_assert_eq!(&mu, &original);
    }

    #[test]
    fn normalization_is_idempotent(entries in proptest::collection::vec(0 .. 3usize, 0 .. 6), zeros in 0 .. 4usize) {
        let mut padded = entries.clone();
        padded.extend(std::iter::repeat(0).take(zeros));
        let a = Multiindex::new(entries);
        let b = Multiindex::new(padded);
        prop_assert_eq!(hash_of(&a), hash_of(&b));
        prop_assert_eq!(a, b);
    }

    #[test]
    fn downward_closed_sets_contain_predecessors(set in downward_closed_set(4, 3)) {
        prop_assert!(set.contains(&Multiindex::zero()));
        for mu in &set {
            for m in mu.supp() {
                let predecessor = mu.dec(m, 1).unwrap();
                prop_assert!(set.contains(&predecessor));
            }
        }
    }
}
