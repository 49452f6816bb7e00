use crate::error::{Error, Result};
use crate::fem::P1Basis;
use crate::function::SpatialFunction;
use eyre::eyre;
use nalgebra::{DVector, Point2, Vector2};
use std::sync::Arc;

/// Coefficients of a finite element function with respect to a [`P1Basis`].
#[derive(Debug, Clone)]
pub struct FemVector {
    basis: Arc<P1Basis>,
    coeffs: DVector<f64>,
}

impl FemVector {
    pub fn zeros(basis: Arc<P1Basis>) -> Self {
        let coeffs = DVector::zeros(basis.dim());
        Self { basis, coeffs }
    }

    pub fn from_coefficients(basis: Arc<P1Basis>, coeffs: DVector<f64>) -> eyre::Result<Self> {
        if coeffs.len() != basis.dim() {
            return Err(eyre!(
                "number of coefficients ({}) does not match basis dimension ({})",
                coeffs.len(),
                basis.dim()
            ));
        }
        Ok(Self { basis, coeffs })
    }

    /// Nodal interpolation of `f`.
    pub fn interpolate(basis: Arc<P1Basis>, f: &dyn SpatialFunction) -> Self {
        let coeffs = DVector::from_iterator(basis.dim(), basis.mesh().vertices().iter().map(|x| f.eval(x)));
        Self { basis, coeffs }
    }

    pub fn basis(&self) -> &Arc<P1Basis> {
        &self.basis
    }

    pub fn coeffs(&self) -> &DVector<f64> {
        &self.coeffs
    }

    pub fn coeffs_mut(&mut self) -> &mut DVector<f64> {
        &mut self.coeffs
    }

    pub fn into_coeffs(self) -> DVector<f64> {
        self.coeffs
    }

    pub fn dim(&self) -> usize {
        self.coeffs.len()
    }

    /// Evaluates the function at `x`. Points outside the mesh are evaluated at the closest cell.
    pub fn eval(&self, x: &Point2<f64>) -> eyre::Result<f64> {
        let (cell, lambda) = self
            .basis
            .locate(x)
            .ok_or_else(|| eyre!("cannot evaluate function on empty mesh"))?;
        let vertices = self.basis.mesh().connectivity()[cell];
        Ok((0..3).map(|i| lambda[i] * self.coeffs[vertices[i]]).sum())
    }

    /// The (constant) gradient of the function on the given cell.
    pub fn cell_gradient(&self, cell: usize) -> Vector2<f64> {
        let vertices = self.basis.mesh().connectivity()[cell];
        let gradients = self.basis.cell_gradients(cell);
        (0..3)
            .map(|i| gradients[i] * self.coeffs[vertices[i]])
            .fold(Vector2::zeros(), |acc, g| acc + g)
    }

    fn check_basis(&self, other: &FemVector) -> Result<()> {
        if self.basis.id() == other.basis.id() {
            Ok(())
        } else {
            Err(Error::BasisMismatch)
        }
    }

    /// `self += alpha * x`
    pub fn axpy(&mut self, alpha: f64, x: &FemVector) -> Result<()> {
        self.check_basis(x)?;
        self.coeffs.axpy(alpha, &x.coeffs, 1.0);
        Ok(())
    }

    pub fn scale_mut(&mut self, alpha: f64) {
        self.coeffs *= alpha;
    }

    /// Euclidean inner product of the coefficient vectors.
    pub fn dot(&self, other: &FemVector) -> Result<f64> {
        self.check_basis(other)?;
        Ok(self.coeffs.dot(&other.coeffs))
    }

    pub fn norm(&self) -> f64 {
        self.coeffs.norm()
    }
}
