//! Assembly of global P1 matrices and vectors.
use crate::fem::spatially_indexed::barycentric_coordinates;
use crate::fem::P1Basis;
use crate::function::SpatialFunction;
use crate::quadrature::{integrate_over_triangle, tri_strength_2};
use nalgebra::{DVector, Matrix3};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::prelude::*;

/// How the rows and columns associated with boundary vertices are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirichletTreatment {
    /// Boundary rows and columns are replaced by those of the identity matrix.
    Identity,
    /// Boundary rows and columns are zero.
    Zero,
    /// The matrix is assembled as is.
    None,
}

/// Element stiffness matrix $K_{ij} = \int_T a \nabla\phi_i \cdot \nabla\phi_j$.
pub fn element_stiffness(basis: &P1Basis, cell: usize, coefficient: &dyn SpatialFunction) -> Matrix3<f64> {
    let vertices = basis.mesh().cell_vertices(cell);
    let coefficient_integral = integrate_over_triangle(&vertices, &tri_strength_2(), |x| coefficient.eval(x));
    let gradients = basis.cell_gradients(cell);
    Matrix3::from_fn(|i, j| coefficient_integral * gradients[i].dot(&gradients[j]))
}

fn assemble_element_matrices<F>(basis: &P1Basis, treatment: DirichletTreatment, element_matrix: F) -> CsrMatrix<f64>
where
    F: Send + Sync + Fn(usize) -> Matrix3<f64>,
{
    let mesh = basis.mesh();
    let element_matrices: Vec<Matrix3<f64>> = (0..mesh.num_cells())
        .into_par_iter()
        .with_min_len(50)
        .map(element_matrix)
        .collect();

    let n = basis.dim();
    let mut coo = CooMatrix::new(n, n);
    let is_boundary = basis.boundary_mask();
    for (cell, matrix) in element_matrices.iter().enumerate() {
        let vertices = mesh.connectivity()[cell];
        for (i, &row) in vertices.iter().enumerate() {
            for (j, &col) in vertices.iter().enumerate() {
                if treatment != DirichletTreatment::None && (is_boundary[row] || is_boundary[col]) {
                    continue;
                }
                coo.push(row, col, matrix[(i, j)]);
            }
        }
    }

    if treatment == DirichletTreatment::Identity {
        for (dof, _) in is_boundary.iter().enumerate().filter(|(_, b)| **b) {
            coo.push(dof, dof, 1.0);
        }
    }

    CsrMatrix::from(&coo)
}

/// Assembles the stiffness matrix of $-\nabla \cdot (a \nabla u)$.
pub fn assemble_stiffness(
    basis: &P1Basis,
    coefficient: &dyn SpatialFunction,
    treatment: DirichletTreatment,
) -> CsrMatrix<f64> {
    assemble_element_matrices(basis, treatment, |cell| element_stiffness(basis, cell, coefficient))
}

/// Assembles the (exact) P1 mass matrix.
pub fn assemble_mass(basis: &P1Basis, treatment: DirichletTreatment) -> CsrMatrix<f64> {
    let mesh = basis.mesh();
    let reference = Matrix3::new(2.0, 1.0, 1.0, 1.0, 2.0, 1.0, 1.0, 1.0, 2.0) / 12.0;
    assemble_element_matrices(basis, treatment, |cell| reference * mesh.cell_area(cell))
}

/// Assembles the load vector $b_i = \int f \phi_i$. Boundary entries are zero if `zero_boundary` is set.
pub fn assemble_load(basis: &P1Basis, f: &dyn SpatialFunction, zero_boundary: bool) -> DVector<f64> {
    let mesh = basis.mesh();
    let quadrature = tri_strength_2();
    let mut load = DVector::zeros(basis.dim());
    for (cell, vertices) in mesh.connectivity().iter().enumerate() {
        let points = mesh.cell_vertices(cell);
        for (i, &vertex) in vertices.iter().enumerate() {
            load[vertex] += integrate_over_triangle(&points, &quadrature, |x| {
                f.eval(x) * barycentric_coordinates(&points, x)[i]
            });
        }
    }
    if zero_boundary {
        for (dof, &is_boundary) in basis.boundary_mask().iter().enumerate() {
            if is_boundary {
                load[dof] = 0.0;
            }
        }
    }
    load
}
