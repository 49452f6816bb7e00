use crate::two_term_field;
use egsz::coefficient_field::CoefficientField;
use egsz::function::{ConstantFunction, SpatialFunction};
use egsz::multi_index::Multiindex;
use egsz::random_variable::{NormalRV, RandomVariable, UniformRV};
use egsz::Error;
use nalgebra::Point2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use util::assert_scalar_rel_eq;

#[test]
fn list_field_terms_and_length() {
    let field = two_term_field();
    assert_eq!(field.len(), Some(3));
    assert!(!field.is_deterministic());

    let x = Point2::new(0.25, 0.0);
    let (mean, rv) = field.term(0).unwrap();
    assert_eq!(mean.eval(&x), 2.0);
    assert_eq!(rv.beta(1), 0.0);

    // cos(2 pi * 0.25) = 0
    let (a1, _) = field.term(1).unwrap();
    assert!(a1.eval(&x).abs() < 1e-14);
    let (a2, _) = field.term(2).unwrap();
    assert_scalar_rel_eq!(a2.eval(&x), 0.25, reltol = 1e-14);
}

#[test]
fn term_beyond_length_is_dimension_error() {
    let field = two_term_field();
    match field.term(3) {
        Err(Error::Dimension { requested, available }) => {
            assert_eq!(requested, 3);
            assert_eq!(available, 3);
        }
        other => panic!("Expected dimension error, got {:?}", other),
    }
    assert!(matches!(field.rv(7), Err(Error::Dimension { .. })));
}

#[test]
fn list_field_requires_matching_lengths() {
    let mean: Arc<dyn SpatialFunction> = Arc::new(ConstantFunction(1.0));
    let funcs: Vec<Arc<dyn SpatialFunction>> = vec![Arc::new(ConstantFunction(0.1))];
    let rvs: Vec<Arc<dyn RandomVariable>> = vec![Arc::new(UniformRV::default()), Arc::new(NormalRV::default())];
    let result = CoefficientField::from_list(mean, funcs, rvs);
    assert!(matches!(result, Err(Error::Configuration(_))));
}

#[test]
fn deterministic_field() {
    let mean: Arc<dyn SpatialFunction> = Arc::new(ConstantFunction(1.0));
    let field = CoefficientField::from_list(mean, vec![], vec![]).unwrap();
    assert_eq!(field.len(), Some(1));
    assert!(field.is_deterministic());
}

#[test]
fn parametric_field_is_unbounded_and_memoized() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let field = CoefficientField::parametric_with_iid_rvs(
        Arc::new(ConstantFunction(1.0)),
        move |m| {
            counter.fetch_add(1, Ordering::SeqCst);
            Arc::new(ConstantFunction(1.0 / (m * m) as f64)) as Arc<dyn SpatialFunction>
        },
        Arc::new(UniformRV::default()),
    );
    assert_eq!(field.len(), None);

    let x = Point2::origin();
    assert_eq!(field.term(4).unwrap().0.eval(&x), 1.0 / 16.0);
    assert_eq!(field.term(2).unwrap().0.eval(&x), 0.25);
    assert_eq!(field.term(4).unwrap().0.eval(&x), 1.0 / 16.0);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[test]
fn cosine_expansion_frequencies_and_decay() {
    let field = CoefficientField::cosine_expansion(2.0, 0.5, 1.0, Some(6));
    assert_eq!(field.len(), Some(7));

    // Term 1 has frequencies (0, 1): constant in x
    let (a1, _) = field.term(1).unwrap();
    assert_scalar_rel_eq!(a1.eval(&Point2::new(0.3, 0.0)), 0.5, reltol = 1e-14);
    assert_scalar_rel_eq!(a1.eval(&Point2::new(0.3, 0.5)), -0.5, reltol = 1e-14);

    // Term 2 has frequencies (1, 0) and amplitude 0.5 / 4
    let (a2, _) = field.term(2).unwrap();
    assert_scalar_rel_eq!(a2.eval(&Point2::new(0.0, 0.3)), 0.125, reltol = 1e-14);
    assert_scalar_rel_eq!(a2.eval(&Point2::new(0.5, 0.3)), -0.125, reltol = 1e-14);

    let unbounded = CoefficientField::cosine_expansion(2.0, 0.5, 1.0, None);
    assert_eq!(unbounded.len(), None);
    let x = Point2::new(0.1, 0.7);
    for m in 1..=6 {
        assert_eq!(unbounded.term(m).unwrap().0.eval(&x), field.term(m).unwrap().0.eval(&x));
    }
}

#[test]
fn realizations() {
    let field = two_term_field();
    let x = Point2::new(0.0, 0.0);
    assert_scalar_rel_eq!(field.evaluate(&x, &[1.0, -1.0]).unwrap(), 2.25, reltol = 1e-14);
    assert_scalar_rel_eq!(field.evaluate(&x, &[]).unwrap(), 2.0, reltol = 1e-14);

    let indices = [Multiindex::zero(), Multiindex::new([1]), Multiindex::new([1, 1])];
    let y = [0.5, -0.5];
    let weights = field.sample_realization(&indices, &y).unwrap();
    let p1 = UniformRV::default().evaluate_polynomial(1, 0.5);
    assert_eq!(weights[&Multiindex::zero()], 1.0);
    assert_scalar_rel_eq!(weights[&Multiindex::new([1])], p1, reltol = 1e-14);
    assert_scalar_rel_eq!(weights[&Multiindex::new([1, 1])], -p1 * p1, reltol = 1e-14);

    assert!(matches!(
        field.sample_realization(&indices, &[0.5]),
        Err(Error::Dimension { .. })
    ));

    let mut rng = StdRng::seed_from_u64(3);
    let y = field.sample_rvs(&mut rng, 2).unwrap();
    assert_eq!(y.len(), 2);
    assert!(y.iter().all(|y| y.abs() <= 1.0));
    assert!(matches!(field.sample_rvs(&mut rng, 3), Err(Error::Dimension { .. })));
}
