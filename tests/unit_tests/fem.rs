use crate::unit_square_basis;
use egsz::fem::assembly::{assemble_load, assemble_mass, assemble_stiffness, DirichletTreatment};
use egsz::fem::projection::interpolation_matrix;
use egsz::fem::{Discretisation, FemPoisson, FemVector, OperatorRole};
use egsz::function::{ConstantFunction, FnFunction, SpatialFunction};
use egsz::proptest::point2_in_unit_square;
use egsz::util::spmv;
use egsz::Error;
use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector, Point2, Vector2};
use proptest::prelude::*;
use std::sync::Arc;
use util::assert_scalar_rel_eq;

/// The linear function u(x, y) = 1 + 2x - 3y.
fn linear_function() -> impl SpatialFunction {
    FnFunction::new(|x: &Point2<f64>| 1.0 + 2.0 * x.x - 3.0 * x.y, |_: &Point2<f64>| Vector2::new(2.0, -3.0))
}

#[test]
fn stiffness_matrix_properties() {
    let basis = unit_square_basis(4);
    let stiffness = assemble_stiffness(&basis, &ConstantFunction(1.0), DirichletTreatment::None);
    let dense = DMatrix::from(&stiffness);
    assert_matrix_eq!(dense, dense.transpose(), comp = abs, tol = 1e-12);

    // Constants are in the kernel of the unconstrained matrix
    let ones = DVector::from_element(basis.dim(), 1.0);
    assert_matrix_eq!(spmv(&stiffness, &ones), DVector::zeros(basis.dim()), comp = abs, tol = 1e-12);

    // u^T K u = |grad u|^2 * |domain| for linear u
    let u = FemVector::interpolate(basis.clone(), &linear_function());
    let energy = u.coeffs().dot(&spmv(&stiffness, u.coeffs()));
    assert_scalar_rel_eq!(energy, 13.0, reltol = 1e-12);

    // The coefficient scales the matrix
    let scaled = assemble_stiffness(&basis, &ConstantFunction(3.0), DirichletTreatment::None);
    assert_matrix_eq!(DMatrix::from(&scaled), &dense * 3.0, comp = abs, tol = 1e-12);
}

#[test]
fn dirichlet_treatments() {
    let basis = unit_square_basis(3);
    let coefficient = ConstantFunction(1.0);
    let identity = DMatrix::from(&assemble_stiffness(&basis, &coefficient, DirichletTreatment::Identity));
    let zero = DMatrix::from(&assemble_stiffness(&basis, &coefficient, DirichletTreatment::Zero));
    let none = DMatrix::from(&assemble_stiffness(&basis, &coefficient, DirichletTreatment::None));

    for i in 0..basis.dim() {
        for j in 0..basis.dim() {
            if basis.is_boundary(i) || basis.is_boundary(j) {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_eq!(identity[(i, j)], expected);
                assert_eq!(zero[(i, j)], 0.0);
            } else {
                assert_eq!(identity[(i, j)], none[(i, j)]);
                assert_eq!(zero[(i, j)], none[(i, j)]);
            }
        }
    }
}

#[test]
fn poisson_discretisation_roles() {
    let basis = unit_square_basis(2);
    let mean = FemPoisson
        .assemble_operator(&ConstantFunction(1.0), &basis, OperatorRole::Mean)
        .unwrap();
    let fluctuation = FemPoisson
        .assemble_operator(&ConstantFunction(1.0), &basis, OperatorRole::Fluctuation)
        .unwrap();
    let rhs = FemPoisson.assemble_rhs(&ConstantFunction(1.0), &basis).unwrap();

    let boundary_dof = (0..basis.dim()).find(|&i| basis.is_boundary(i)).unwrap();
    let interior_dof = (0..basis.dim()).find(|&i| !basis.is_boundary(i)).unwrap();
    let mut e = DVector::zeros(basis.dim());
    e[boundary_dof] = 1.0;
    assert_matrix_eq!(spmv(&mean, &e), e, comp = abs, tol = 1e-14);
    assert_eq!(spmv(&fluctuation, &e).norm(), 0.0);
    assert_eq!(rhs[boundary_dof], 0.0);
    assert!(rhs[interior_dof] > 0.0);
}

#[test]
fn mass_and_load_integrate_constants() {
    let basis = unit_square_basis(3);
    let mass = assemble_mass(&basis, DirichletTreatment::None);
    let ones = DVector::from_element(basis.dim(), 1.0);
    assert_scalar_rel_eq!(ones.dot(&spmv(&mass, &ones)), 1.0, reltol = 1e-12);

    let load = assemble_load(&basis, &ConstantFunction(2.0), false);
    assert_scalar_rel_eq!(load.sum(), 2.0, reltol = 1e-12);

    // Integrating a linear function against the constant one is exact
    let load = assemble_load(&basis, &linear_function(), false);
    assert_scalar_rel_eq!(load.sum(), 0.5, reltol = 1e-12);
}

#[test]
fn linear_functions_are_reproduced_by_projection() {
    let coarse = unit_square_basis(2);
    let (fine, pair) = coarse.refine(&[0, 3, 5]).unwrap();
    let fine = Arc::new(fine);
    assert_ne!(coarse.id(), fine.id());

    let u_coarse = FemVector::interpolate(coarse.clone(), &linear_function());
    let u_fine = FemVector::interpolate(fine.clone(), &linear_function());

    let prolongated = spmv(&pair.prolongation, u_coarse.coeffs());
    assert_matrix_eq!(prolongated, u_fine.coeffs().clone(), comp = abs, tol = 1e-12);
    let restricted = spmv(&pair.restriction, u_fine.coeffs());
    assert_matrix_eq!(restricted, u_coarse.coeffs().clone(), comp = abs, tol = 1e-12);

    // Interpolating onto the same basis is the identity
    let identity = interpolation_matrix(&fine, &fine).unwrap();
    assert_eq!(identity.nnz(), fine.dim());
}

#[test]
fn vector_operations_require_same_basis() {
    let a = unit_square_basis(2);
    let b = unit_square_basis(2);
    let mut u = FemVector::zeros(a.clone());
    let v = FemVector::zeros(b);
    assert!(matches!(u.axpy(1.0, &v), Err(Error::BasisMismatch)));
    assert!(matches!(u.dot(&v), Err(Error::BasisMismatch)));

    let w = FemVector::interpolate(a.clone(), &ConstantFunction(2.0));
    u.axpy(0.5, &w).unwrap();
    assert_scalar_rel_eq!(u.dot(&w).unwrap(), 2.0 * a.dim() as f64, reltol = 1e-14);

    assert!(FemVector::from_coefficients(a.clone(), DVector::zeros(a.dim() + 1)).is_err());
}

#[test]
fn cell_gradients_of_linear_function() {
    let basis = unit_square_basis(3);
    let u = FemVector::interpolate(basis.clone(), &linear_function());
    for cell in 0..basis.mesh().num_cells() {
        assert_matrix_eq!(u.cell_gradient(cell), Vector2::new(2.0, -3.0), comp = abs, tol = 1e-12);
    }
}

proptest! {
    #[test]
    fn interpolated_linear_function_is_exact(x in point2_in_unit_square()) {
        let basis = unit_square_basis(3);
        let f = linear_function();
        let u = FemVector::interpolate(basis.clone(), &f);
        let value = u.eval(&x).unwrap();
        prop_assert!((value - f.eval(&x)).abs() < 1e-12);

        let (cell, lambda) = basis.locate(&x).unwrap();
        prop_assert!(cell < basis.mesh().num_cells());
        prop_assert!((lambda.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        prop_assert!(lambda.iter().all(|&l| l >= 0.0));
    }
}
