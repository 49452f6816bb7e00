//! Preconditioned conjugate gradient over multivectors.
//!
//! The solver only relies on the vector space operations of [`MultiVector`] and on operators
//! implementing [`LinearOperator`], so it knows nothing about meshes or multi-indices.
use crate::error::{Error, Result};
use crate::multi_vector::MultiVector;
use log::{debug, warn};
use std::cell::Cell;

pub trait LinearOperator {
    fn apply(&self, x: &MultiVector) -> Result<MultiVector>;
}

impl<'a, A> LinearOperator for &'a A
where
    A: ?Sized + LinearOperator,
{
    fn apply(&self, x: &MultiVector) -> Result<MultiVector> {
        <A as LinearOperator>::apply(self, x)
    }
}

pub struct IdentityOperator;

impl LinearOperator for IdentityOperator {
    fn apply(&self, x: &MultiVector) -> Result<MultiVector> {
        Ok(x.clone())
    }
}

/// Quantities available to a stopping criterion after each iteration.
#[derive(Debug, Clone, Copy)]
pub struct CgIterationState<'a> {
    pub iteration: usize,
    pub b_norm: f64,
    /// The residual $r = b - Ax$ as updated by the CG recurrence.
    pub approx_residual: &'a MultiVector,
    /// $z^T r$ for the preconditioned residual $z = P r$.
    pub z_dot_r: f64,
}

pub trait CgStoppingCriterion {
    /// Called by CG at the start of a new solve, with the initial state.
    fn reset(&self, _initial: &CgIterationState) {}

    fn has_converged(&self, state: &CgIterationState) -> Result<bool>;
}

/// Relative residual tolerance ||r|| <= tol * ||b||.
///
/// Note that we use the *approximate* residual given by Conjugate-Gradient. For ill-conditioned
/// problems, it is possible that CG's residual converges, but the real residual does not.
#[derive(Debug)]
pub struct RelativeResidualCriterion {
    tol: f64,
}

impl RelativeResidualCriterion {
    pub fn new(tol: f64) -> Self {
        Self { tol }
    }
}

impl Default for RelativeResidualCriterion {
    fn default() -> Self {
        Self::new(1e-8)
    }
}

impl CgStoppingCriterion for RelativeResidualCriterion {
    fn has_converged(&self, state: &CgIterationState) -> Result<bool> {
        Ok(state.approx_residual.norm() <= self.tol * state.b_norm)
    }
}

/// Tolerance on the preconditioned residual, sqrt(z^T r) <= tol * sqrt(z_0^T r_0).
#[derive(Debug)]
pub struct PreconditionedResidualCriterion {
    tol: f64,
    initial: Cell<f64>,
}

impl PreconditionedResidualCriterion {
    pub fn new(tol: f64) -> Self {
        Self {
            tol,
            initial: Cell::new(f64::NAN),
        }
    }
}

impl CgStoppingCriterion for PreconditionedResidualCriterion {
    fn reset(&self, initial: &CgIterationState) {
        self.initial.set(initial.z_dot_r.max(0.0).sqrt());
    }

    fn has_converged(&self, state: &CgIterationState) -> Result<bool> {
        Ok(state.z_dot_r.max(0.0).sqrt() <= self.tol * self.initial.get())
    }
}

/// Result of a CG solve. Reaching the iteration limit is not an error, but reported here.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub struct PcgOutput {
    /// Number of iterations of the solver.
    ///
    /// Corresponds to the number of updates made to the (initial) solution vector.
    pub num_iterations: usize,
    /// Norm of the approximate residual of the returned iterate.
    pub residual_norm: f64,
    pub converged: bool,
}

#[derive(Debug)]
pub struct ConjugateGradient<A, P, Criterion> {
    operator: A,
    preconditioner: P,
    stopping_criterion: Criterion,
    max_iter: Option<usize>,
}

impl ConjugateGradient<(), IdentityOperator, ()> {
    pub fn new() -> Self {
        Self {
            operator: (),
            preconditioner: IdentityOperator,
            stopping_criterion: (),
            max_iter: None,
        }
    }
}

impl Default for ConjugateGradient<(), IdentityOperator, ()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P, Criterion> ConjugateGradient<(), P, Criterion> {
    pub fn with_operator<A>(self, operator: A) -> ConjugateGradient<A, P, Criterion> {
        ConjugateGradient {
            operator,
            preconditioner: self.preconditioner,
            stopping_criterion: self.stopping_criterion,
            max_iter: self.max_iter,
        }
    }
}

impl<A, P, Criterion> ConjugateGradient<A, P, Criterion> {
    pub fn with_preconditioner<P2>(self, preconditioner: P2) -> ConjugateGradient<A, P2, Criterion> {
        ConjugateGradient {
            operator: self.operator,
            preconditioner,
            stopping_criterion: self.stopping_criterion,
            max_iter: self.max_iter,
        }
    }

    pub fn with_max_iter(self, max_iter: usize) -> Self {
        Self {
            max_iter: Some(max_iter),
            ..self
        }
    }
}

impl<A, P> ConjugateGradient<A, P, ()> {
    pub fn with_stopping_criterion<Criterion>(self, stopping_criterion: Criterion) -> ConjugateGradient<A, P, Criterion> {
        ConjugateGradient {
            operator: self.operator,
            preconditioner: self.preconditioner,
            stopping_criterion,
            max_iter: self.max_iter,
        }
    }
}

impl<A, P, Criterion> ConjugateGradient<A, P, Criterion>
where
    A: LinearOperator,
    P: LinearOperator,
    Criterion: CgStoppingCriterion,
{
    /// Solves `Ax = b` starting from the initial guess in `x`, which is overwritten.
    ///
    /// `x` must have the same active set and bases as `b`.
    #[allow(non_snake_case)]
    pub fn solve_with_guess(&self, b: &MultiVector, x: &mut MultiVector) -> Result<PcgOutput> {
        let mut output = PcgOutput {
            num_iterations: 0,
            residual_norm: 0.0,
            converged: false,
        };

        let b_norm = b.norm();
        if b_norm == 0.0 {
            *x = b.zeros_like();
            output.converged = true;
            return Ok(output);
        }

        // r = b - Ax
        let mut r = b.sub(&self.operator.apply(x)?)?;
        // z = Pr
        let mut z = self.preconditioner.apply(&r)?;
        // p = z
        let mut p = z.clone();
        let mut zTr = z.inner(&r)?;

        self.stopping_criterion.reset(&CgIterationState {
            iteration: 0,
            b_norm,
            approx_residual: &r,
            z_dot_r: zTr,
        });

        loop {
            let state = CgIterationState {
                iteration: output.num_iterations,
                b_norm,
                approx_residual: &r,
                z_dot_r: zTr,
            };
            if self.stopping_criterion.has_converged(&state)? {
                output.converged = true;
                break;
            } else if let Some(max_iter) = self.max_iter {
                if output.num_iterations >= max_iter {
                    warn!(
                        "PCG did not converge within {} iterations (residual {:e}, rhs {:e})",
                        max_iter,
                        r.norm(),
                        b_norm
                    );
                    break;
                }
            }

            // Ap = A * p
            let Ap = self.operator.apply(&p)?;
            let pAp = p.inner(&Ap)?;

            if pAp <= 0.0 {
                return Err(Error::IndefiniteOperator);
            }
            if zTr <= 0.0 {
                return Err(Error::IndefinitePreconditioner);
            }

            let alpha = zTr / pAp;
            // x <- x + alpha * p
            x.axpy(alpha, &p)?;
            // r <- r - alpha * Ap
            r.axpy(-alpha, &Ap)?;

            // Number of iterations corresponds to number of updates to the x vector
            output.num_iterations += 1;

            // z <- P r
            z = self.preconditioner.apply(&r)?;
            let zTr_next = z.inner(&r)?;
            let beta = zTr_next / zTr;

            // p <- z + beta * p
            p.scale(beta);
            p.axpy(1.0, &z)?;

            zTr = zTr_next;
        }

        output.residual_norm = r.norm();
        debug!(
            "PCG finished after {} iterations with residual {:e}",
            output.num_iterations, output.residual_norm
        );
        Ok(output)
    }
}

/// Solves `Ax = b` with the preconditioner `P` and the relative residual criterion `eps`.
///
/// Returns the final iterate along with the solver output. Failure to converge within
/// `max_iter` iterations is reported in the output rather than as an error.
pub fn pcg(
    a: &dyn LinearOperator,
    b: &MultiVector,
    p: &dyn LinearOperator,
    x0: &MultiVector,
    eps: f64,
    max_iter: usize,
) -> Result<(MultiVector, PcgOutput)> {
    let mut x = x0.clone();
    let output = ConjugateGradient::new()
        .with_operator(a)
        .with_preconditioner(p)
        .with_stopping_criterion(RelativeResidualCriterion::new(eps))
        .with_max_iter(max_iter)
        .solve_with_guess(b, &mut x)?;
    Ok((x, output))
}
