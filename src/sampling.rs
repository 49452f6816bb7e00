//! Monte Carlo sampling of the error of a stochastic Galerkin solution.
//!
//! For every sample $y$ of the random parameters, the deterministic problem with coefficient
//! $a(\cdot, y)$ is solved on a reference mesh and compared to the realization
//! $u_N(\cdot, y) = \sum_\mu w_\mu P_\mu(y)$ interpolated onto the same mesh.
use crate::error::Result;
use crate::fem::assembly::{assemble_mass, assemble_stiffness, DirichletTreatment};
use crate::fem::P1Basis;
use crate::function::{ConstantFunction, FnFunction, SpatialFunction};
use crate::multi_operator::MultiOperator;
use crate::multi_vector::MultiVector;
use crate::util::spmv;
use eyre::eyre;
use log::{debug, info};
use nalgebra::{DVector, Point2};
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CscMatrix, CsrMatrix};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Root mean square errors over all samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampledError {
    pub l2: f64,
    /// Error in the $H^1$ seminorm.
    pub h1: f64,
    pub num_samples: usize,
}

/// Estimates the error of `w` by sampling `num_samples` realizations of the coefficient field.
///
/// The random parameters are truncated after `num_terms` terms, or after the number of terms of a
/// finite field. At least the dimensions active in `w` are sampled.
pub fn sample_error_mc<R: Rng>(
    w: &MultiVector,
    operator: &MultiOperator,
    f: &dyn SpatialFunction,
    reference: &Arc<P1Basis>,
    num_terms: usize,
    num_samples: usize,
    rng: &mut R,
) -> Result<SampledError> {
    let field = operator.coefficient_field();
    let mut num_terms = num_terms.max(w.max_len());
    if let Some(len) = field.len() {
        num_terms = num_terms.min(len - 1);
    }
    let samples: Vec<Vec<f64>> = (0..num_samples)
        .map(|_| field.sample_rvs(&mut *rng, num_terms))
        .collect::<Result<_>>()?;

    let mass = assemble_mass(reference, DirichletTreatment::None);
    let laplace = assemble_stiffness(reference, &ConstantFunction(1.0), DirichletTreatment::None);
    let rhs = operator.discretisation().assemble_rhs(f, reference)?;
    let projected: Vec<_> = w
        .iter()
        .map(|(mu, v)| -> Result<_> { Ok((mu, w.projection_cache().project(v, reference)?)) })
        .collect::<Result<_>>()?;
    debug!(
        "Sampling error with {} samples of {} terms on {} reference dofs",
        num_samples,
        num_terms,
        reference.dim()
    );

    let squared_errors: Vec<(f64, f64)> = samples
        .par_iter()
        .map(|y| -> Result<_> {
            let exact = solve_realization(operator, reference, &rhs, y)?;
            let weights = field.sample_realization(w.iter().map(|(mu, _)| mu), y)?;
            let mut error = exact;
            for (mu, coeffs) in &projected {
                error.axpy(-weights[*mu], coeffs, 1.0);
            }
            let l2 = error.dot(&spmv(&mass, &error)).max(0.0);
            let h1 = error.dot(&spmv(&laplace, &error)).max(0.0);
            Ok((l2, h1))
        })
        .collect::<Result<_>>()?;

    let n = num_samples.max(1) as f64;
    let (l2, h1) = squared_errors
        .iter()
        .fold((0.0, 0.0), |(l2, h1), (e_l2, e_h1)| (l2 + e_l2, h1 + e_h1));
    let error = SampledError {
        l2: (l2 / n).sqrt(),
        h1: (h1 / n).sqrt(),
        num_samples,
    };
    info!(
        "Sampled error over {} realizations: L2 {:e}, H1 {:e}",
        num_samples, error.l2, error.h1
    );
    Ok(error)
}

/// Solves the deterministic problem for the parameters `y` on `basis`.
fn solve_realization(
    operator: &MultiOperator,
    basis: &P1Basis,
    rhs: &DVector<f64>,
    y: &[f64],
) -> Result<DVector<f64>> {
    let field = operator.coefficient_field();
    let terms: Vec<(Arc<dyn SpatialFunction>, f64)> = y
        .iter()
        .enumerate()
        .map(|(m, &y_m)| -> Result<_> { Ok((field.term(m + 1)?.0, y_m)) })
        .collect::<Result<_>>()?;
    let mean = field.mean().clone();
    let coefficient = FnFunction::new(
        |x: &Point2<f64>| mean.eval(x) + terms.iter().map(|(a, y_m)| a.eval(x) * y_m).sum::<f64>(),
        |x: &Point2<f64>| {
            terms
                .iter()
                .fold(mean.gradient(x), |acc, (a, y_m)| acc + a.gradient(x) * *y_m)
        },
    );

    let matrix: CsrMatrix<f64> = assemble_stiffness(basis, &coefficient, DirichletTreatment::Identity);
    let factor = CscCholesky::factor(&CscMatrix::from(&matrix))
        .map_err(|err| eyre!("realization of the coefficient field is not positive: {:?}", err))?;
    Ok(factor.solve(rhs).column(0).into_owned())
}
