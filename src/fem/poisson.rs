use crate::fem::assembly::{assemble_load, assemble_stiffness, DirichletTreatment};
use crate::fem::P1Basis;
use crate::function::SpatialFunction;
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;

/// Whether an operator is the mean term or one of the fluctuation terms of an expansion.
///
/// The distinction determines the treatment of boundary conditions: the mean operator carries
/// identity rows on the boundary, while fluctuation operators vanish there. Together this keeps
/// the stochastic Galerkin operator symmetric and positive definite and boundary values at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorRole {
    Mean,
    Fluctuation,
}

/// A discretisation of an elliptic problem with a scalar coefficient.
pub trait Discretisation: Send + Sync {
    fn assemble_operator(
        &self,
        coefficient: &dyn SpatialFunction,
        basis: &P1Basis,
        role: OperatorRole,
    ) -> eyre::Result<CsrMatrix<f64>>;

    fn assemble_rhs(&self, f: &dyn SpatialFunction, basis: &P1Basis) -> eyre::Result<DVector<f64>>;
}

/// The Poisson problem $-\nabla \cdot (a \nabla u) = f$ with homogeneous Dirichlet conditions.
#[derive(Debug, Clone, Copy, Default)]
pub struct FemPoisson;

impl Discretisation for FemPoisson {
    fn assemble_operator(
        &self,
        coefficient: &dyn SpatialFunction,
        basis: &P1Basis,
        role: OperatorRole,
    ) -> eyre::Result<CsrMatrix<f64>> {
        let treatment = match role {
            OperatorRole::Mean => DirichletTreatment::Identity,
            OperatorRole::Fluctuation => DirichletTreatment::Zero,
        };
        Ok(assemble_stiffness(basis, coefficient, treatment))
    }

    fn assemble_rhs(&self, f: &dyn SpatialFunction, basis: &P1Basis) -> eyre::Result<DVector<f64>> {
        Ok(assemble_load(basis, f, true))
    }
}
