//! Value-preserving transfer of finite element functions between bases.
use crate::fem::P1Basis;
use eyre::eyre;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use std::sync::Arc;

/// Prolongation from a coarse (old) basis to a fine (new) basis, together with its restriction.
///
/// Both maps are nodal interpolation operators, so the prolongation reproduces coarse functions
/// exactly when the new mesh is a refinement of the old one.
#[derive(Debug, Clone)]
pub struct ProjectionPair {
    pub prolongation: Arc<CsrMatrix<f64>>,
    pub restriction: Arc<CsrMatrix<f64>>,
}

/// Assembles the matrix of nodal interpolation from `source` onto `target`.
///
/// Row `i` holds the barycentric weights of the `i`-th vertex of the target mesh in the
/// cell of the source mesh containing it.
pub fn interpolation_matrix(source: &P1Basis, target: &P1Basis) -> eyre::Result<CsrMatrix<f64>> {
    if source.id() == target.id() {
        return Ok(CsrMatrix::identity(source.dim()));
    }

    let mut coo = CooMatrix::new(target.dim(), source.dim());
    for (row, x) in target.mesh().vertices().iter().enumerate() {
        let (cell, lambda) = source
            .locate(x)
            .ok_or_else(|| eyre!("cannot interpolate from a basis on an empty mesh"))?;
        let vertices = source.mesh().connectivity()[cell];
        for (&col, &weight) in vertices.iter().zip(&lambda) {
            if weight.abs() > 1e-14 {
                coo.push(row, col, weight);
            }
        }
    }
    Ok(CsrMatrix::from(&coo))
}

/// Builds the projection pair between `old` and `new`.
pub fn projection_pair(old: &P1Basis, new: &P1Basis) -> eyre::Result<ProjectionPair> {
    Ok(ProjectionPair {
        prolongation: Arc::new(interpolation_matrix(old, new)?),
        restriction: Arc::new(interpolation_matrix(new, old)?),
    })
}
