use crate::{two_term_field, unit_square_basis};
use egsz::fem::FemVector;
use egsz::function::{ConstantFunction, FnFunction, SpatialFunction};
use egsz::multi_index::Multiindex;
use egsz::multi_vector::{MultiVector, MultiVectorSnapshot};
use egsz::random_variable::{RandomVariable, UniformRV};
use egsz::Error;
use matrixcompare::assert_matrix_eq;
use nalgebra::{Point2, Vector2};
use std::collections::BTreeMap;
use util::assert_scalar_rel_eq;

fn mi(entries: &[usize]) -> Multiindex {
    Multiindex::from(entries)
}

fn linear_function() -> impl SpatialFunction {
    FnFunction::new(|x: &Point2<f64>| x.x + 2.0 * x.y, |_: &Point2<f64>| Vector2::new(1.0, 2.0))
}

/// The scaling of the linear function held by each index of [`linear_multivector`].
fn scale_of(mu: &Multiindex) -> f64 {
    match mu.as_slice() {
        [] => 1.0,
        [1] => 2.0,
        _ => 3.0,
    }
}

/// Indices [], [1] and [0, 1], each holding a multiple of a linear function on a 2x2 mesh.
fn linear_multivector() -> MultiVector {
    let basis = unit_square_basis(2);
    let mut w = MultiVector::new();
    for mu in [mi(&[]), mi(&[1]), mi(&[0, 1])] {
        let mut v = FemVector::interpolate(basis.clone(), &linear_function());
        v.scale_mut(scale_of(&mu));
        w.set(mu, v);
    }
    w
}

#[test]
fn active_set_queries() {
    let basis = unit_square_basis(2);
    let mut w = MultiVector::zeros(&[mi(&[]), mi(&[2]), mi(&[0, 0, 1])], basis.clone());
    assert_eq!(w.len(), 3);
    assert_eq!(w.num_dofs(), 3 * basis.dim());
    assert_eq!(w.max_len(), 3);
    assert_eq!(w.max_order(), 2);
    assert_eq!(w.supp().into_iter().collect::<Vec<_>>(), vec![0, 2]);
    assert!(w.shares_mesh());
    assert_eq!(w.distinct_bases().len(), 1);

    assert!(!w.activate(mi(&[2]), basis.clone()));
    assert!(w.activate(mi(&[1, 1]), basis.clone()));
    assert!(w.contains(&mi(&[1, 1, 0])));
    assert_eq!(w.active_indices().first(), Some(&Multiindex::zero()));

    match w.get(&mi(&[5])) {
        Err(Error::MissingIndex(mu)) => assert_eq!(mu, mi(&[5])),
        other => panic!("Expected missing index error, got {:?}", other),
    }
    assert!(matches!(w.get_mut(&mi(&[0, 3])), Err(Error::MissingIndex(_))));
}

#[test]
fn vector_space_operations() {
    let w = linear_multivector();
    let doubled = w.add(&w).unwrap();
    assert_scalar_rel_eq!(doubled.norm(), 2.0 * w.norm(), reltol = 1e-14);
    assert_eq!(w.sub(&w).unwrap().norm(), 0.0);
    assert_scalar_rel_eq!(w.inner(&w).unwrap(), w.norm() * w.norm(), reltol = 1e-14);
    assert_scalar_rel_eq!(w.scaled(-3.0).norm(), 3.0 * w.norm(), reltol = 1e-14);

    let mut y = w.zeros_like();
    assert_eq!(y.norm(), 0.0);
    y.axpy(0.5, &w).unwrap();
    assert_scalar_rel_eq!(y.inner(&w).unwrap(), 0.5 * w.inner(&w).unwrap(), reltol = 1e-14);

    let fewer = MultiVector::zeros(&[mi(&[]), mi(&[1])], unit_square_basis(2));
    assert!(matches!(w.inner(&fewer), Err(Error::ActiveSetMismatch)));

    // Same indices on another basis
    let other = MultiVector::zeros(&w.active_indices(), unit_square_basis(2));
    assert!(matches!(w.add(&other), Err(Error::BasisMismatch)));
}

#[test]
fn shared_refinement_preserves_functions() {
    let mut w = linear_multivector();
    let dofs_before = w.num_dofs();
    w.refine(&[0, 1, 6]).unwrap();
    assert!(w.shares_mesh());
    assert!(w.num_dofs() > dofs_before);
    assert!(w.projection_cache().len() >= 2);

    for (mu, v) in w.iter() {
        let mut expected = FemVector::interpolate(v.basis().clone(), &linear_function());
        expected.scale_mut(scale_of(mu));
        assert_matrix_eq!(v.coeffs().clone(), expected.into_coeffs(), comp = abs, tol = 1e-12);
    }

    w.refine_uniformly().unwrap();
    assert!(w.shares_mesh());
    let x = Point2::new(0.3, 0.6);
    assert_scalar_rel_eq!(w.get(&mi(&[1])).unwrap().eval(&x).unwrap(), 2.0 * 1.5, reltol = 1e-12);
}

#[test]
fn local_refinement_and_projection() {
    let mut w = linear_multivector();
    let mut marks = BTreeMap::new();
    marks.insert(mi(&[1]), vec![0, 2]);
    marks.insert(mi(&[0, 1]), vec![]);
    w.refine_local(&marks).unwrap();

    assert!(!w.shares_mesh());
    assert_eq!(w.distinct_bases().len(), 2);
    let coarse_dim = w.get(&mi(&[])).unwrap().dim();
    let fine_dim = w.get(&mi(&[1])).unwrap().dim();
    assert!(fine_dim > coarse_dim);
    assert_eq!(w.get(&mi(&[0, 1])).unwrap().dim(), coarse_dim);

    // Linear functions survive projection in both directions
    let down = w.project(&mi(&[1]), &mi(&[])).unwrap();
    let expected_down = w.get(&mi(&[])).unwrap().coeffs() * 2.0;
    assert_matrix_eq!(down, expected_down, comp = abs, tol = 1e-12);
    let up = w.project(&mi(&[]), &mi(&[1])).unwrap();
    let expected_up = w.get(&mi(&[1])).unwrap().coeffs() * 0.5;
    assert_matrix_eq!(up, expected_up, comp = abs, tol = 1e-12);

    // Vectors on different meshes cannot be combined directly
    let mut other = w.clone();
    other.refine_uniformly().unwrap();
    assert!(matches!(w.inner(&other), Err(Error::BasisMismatch)));

    assert!(matches!(w.refine_local(&BTreeMap::from([(mi(&[7]), vec![0])])), Err(Error::MissingIndex(_))));
}

#[test]
fn realization_combines_chaos_polynomials() {
    let basis = unit_square_basis(3);
    let mut w = MultiVector::new();
    w.set(Multiindex::zero(), FemVector::interpolate(basis.clone(), &ConstantFunction(1.0)));
    w.set(mi(&[1]), FemVector::interpolate(basis.clone(), &linear_function()));

    let field = two_term_field();
    let x = Point2::new(0.2, 0.1);
    let y = [0.5, -0.3];
    let p1 = UniformRV::default().evaluate_polynomial(1, 0.5);
    let value = w.evaluate_realization(&field, &x, &y).unwrap();
    assert_scalar_rel_eq!(value, 1.0 + p1 * 0.4, reltol = 1e-12);

    assert!(matches!(
        w.evaluate_realization(&field, &x, &[]),
        Err(Error::Dimension { .. })
    ));
}

#[test]
fn snapshot_json_export() {
    let mut w = linear_multivector();
    let mut marks = BTreeMap::new();
    marks.insert(mi(&[0, 1]), vec![3]);
    w.refine_local(&marks).unwrap();

    let snapshot = w.snapshot();
    assert_eq!(snapshot.meshes.len(), 2);
    assert_eq!(snapshot.entries.len(), 3);

    let json = serde_json::to_string(&snapshot).unwrap();
    let parsed: MultiVectorSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, snapshot);

    let restored = MultiVector::from_snapshot(&parsed).unwrap();
    assert_eq!(restored.active_indices(), w.active_indices());
    assert_eq!(restored.distinct_bases().len(), 2);
    for ((mu, v), (nu, u)) in restored.iter().zip(w.iter()) {
        assert_eq!(mu, nu);
        assert_eq!(v.coeffs(), u.coeffs());
    }

    let mut broken = snapshot.clone();
    broken.entries[0].mesh = 5;
    assert!(MultiVector::from_snapshot(&broken).is_err());
    let mut broken = snapshot;
    broken.meshes[0].cells[0] = [0, 1, 1000];
    assert!(MultiVector::from_snapshot(&broken).is_err());
}
