//! The stochastic Galerkin operator induced by a coefficient field.
//!
//! For an active set $\Lambda$, the operator acts on a multivector $w$ by
//!
//! $$
//! (A w)_\nu = A_0 w_\nu + \sum_{k < M} A_{k+1} \big[ \alpha_k(\nu_k) w_\nu
//!     + \beta_k(\nu_k + 1) P w_{\nu + e_k} + \beta_k(\nu_k) P w_{\nu - e_k} \big],
//! $$
//!
//! where $A_m$ is the stiffness matrix of coefficient term $m$ on the mesh of $\nu$,
//! $\alpha_k, \beta_k$ are the recurrence coefficients of the random variable of term $k + 1$
//! and $P$ interpolates onto the basis of $\nu$. Neighbors outside of $\Lambda$ do not contribute.
//!
//! When two coupled indices live on different meshes, their coupling is evaluated on the mesh
//! with more degrees of freedom (the host). The host row reads $A^h_{k+1} P w$ as above, while
//! the other row receives $P^T A^h_{k+1} w$ with the same interpolation $P$ onto the host,
//! restricted to interior dofs on both sides. This keeps the operator symmetric. For nested meshes
//! it is the exact Galerkin coupling.
use crate::coefficient_field::CoefficientField;
use crate::error::Result;
use crate::fem::{Discretisation, FemVector, OperatorRole, P1Basis};
use crate::function::SpatialFunction;
use crate::mesh::MeshId;
use crate::multi_index::Multiindex;
use crate::multi_vector::MultiVector;
use crate::pcg::LinearOperator;
use crate::util::{energy_norm, spmv, spmv_into, spmv_transpose_into};
use eyre::eyre;
use log::debug;
use nalgebra::DVector;
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CscMatrix, CsrMatrix};
use parking_lot::RwLock;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::sync::Arc;

pub struct MultiOperator {
    coefficient_field: Arc<CoefficientField>,
    discretisation: Arc<dyn Discretisation>,
    max_terms: Option<usize>,
    matrices: RwLock<FxHashMap<(MeshId, usize), Arc<CsrMatrix<f64>>>>,
    mean_factors: RwLock<FxHashMap<MeshId, Arc<CscCholesky<f64>>>>,
}

impl std::fmt::Debug for MultiOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiOperator")
            .field("coefficient_field", &self.coefficient_field)
            .field("max_terms", &self.max_terms)
            .field("num_cached_matrices", &self.matrices.read().len())
            .finish()
    }
}

impl MultiOperator {
    pub fn new(coefficient_field: Arc<CoefficientField>, discretisation: Arc<dyn Discretisation>) -> Self {
        Self {
            coefficient_field,
            discretisation,
            max_terms: None,
            matrices: Default::default(),
            mean_factors: Default::default(),
        }
    }

    /// Restricts the operator to the first `max_terms` stochastic dimensions.
    pub fn with_max_terms(self, max_terms: usize) -> Self {
        Self {
            max_terms: Some(max_terms),
            ..self
        }
    }

    pub fn coefficient_field(&self) -> &Arc<CoefficientField> {
        &self.coefficient_field
    }

    pub fn discretisation(&self) -> &Arc<dyn Discretisation> {
        &self.discretisation
    }

    /// The number of stochastic dimensions $M$ the operator couples when applied to `w`.
    pub fn num_dimensions(&self, w: &MultiVector) -> usize {
        self.max_terms.unwrap_or_else(|| w.max_len())
    }

    pub fn num_cached_matrices(&self) -> usize {
        self.matrices.read().len()
    }

    fn assemble_term(&self, basis: &P1Basis, m: usize) -> Result<CsrMatrix<f64>> {
        let (func, _) = self.coefficient_field.term(m)?;
        let role = if m == 0 {
            OperatorRole::Mean
        } else {
            OperatorRole::Fluctuation
        };
        debug!("Assembling operator for term {} on mesh {:?}", m, basis.id());
        Ok(self
            .discretisation
            .assemble_operator(func.as_ref(), basis, role)?)
    }

    /// The stiffness matrix of coefficient term `m` on `basis`, assembled on first use.
    pub fn term_matrix(&self, basis: &P1Basis, m: usize) -> Result<Arc<CsrMatrix<f64>>> {
        let key = (basis.id(), m);
        if let Some(matrix) = self.matrices.read().get(&key) {
            return Ok(matrix.clone());
        }
        let matrix = Arc::new(self.assemble_term(basis, m)?);
        Ok(self.matrices.write().entry(key).or_insert(matrix).clone())
    }

    /// Assembles all matrices needed to apply the operator to `w` in parallel.
    fn prepare(&self, w: &MultiVector, num_dimensions: usize) -> Result<()> {
        let missing: Vec<(Arc<P1Basis>, usize)> = {
            let matrices = self.matrices.read();
            w.distinct_bases()
                .into_values()
                .flat_map(|basis| (0..=num_dimensions).map(move |m| (basis.clone(), m)))
                .filter(|(basis, m)| !matrices.contains_key(&(basis.id(), *m)))
                .collect()
        };
        if missing.is_empty() {
            return Ok(());
        }

        let assembled: Vec<((MeshId, usize), Arc<CsrMatrix<f64>>)> = missing
            .par_iter()
            .map(|(basis, m)| -> Result<_> { Ok(((basis.id(), *m), Arc::new(self.assemble_term(basis, *m)?))) })
            .collect::<Result<_>>()?;
        self.matrices.write().extend(assembled);
        Ok(())
    }

    /// Applies the operator to `w`. The result has the same active set and bases as `w`.
    pub fn apply(&self, w: &MultiVector) -> Result<MultiVector> {
        let num_dimensions = self.num_dimensions(w);
        self.prepare(w, num_dimensions)?;

        let results: Vec<(Multiindex, FemVector)> = w
            .active_indices()
            .into_par_iter()
            .map(|nu| -> Result<_> {
                let v = w.get(&nu)?;
                let basis = v.basis();
                let a_0 = self.term_matrix(basis, 0)?;
                let mut y = spmv(&a_0, v.coeffs());

                for k in 0..num_dimensions {
                    let (z, hosted) = self.row_coupling(w, &nu, k)?;
                    let a_k = self.term_matrix(basis, k + 1)?;
                    spmv_into(&mut y, 1.0, 1.0, &a_k, &z);
                    for (beta, neighbor) in hosted {
                        let a_n = self.term_matrix(neighbor.basis(), k + 1)?;
                        let p = w.projection_cache().get_or_assemble(basis, neighbor.basis())?;
                        let flux = spmv(&a_n, neighbor.coeffs());
                        let mut transferred = DVector::zeros(basis.dim());
                        spmv_transpose_into(&mut transferred, 0.0, beta, &p, &flux);
                        y += interior(basis, transferred);
                    }
                }
                Ok((nu, FemVector::from_coefficients(basis.clone(), y)?))
            })
            .collect::<Result<_>>()?;

        let mut result = w.zeros_like();
        for (nu, v) in results {
            result.set(nu, v);
        }
        Ok(result)
    }

    /// Coefficients (on the basis of `nu`) of the function multiplied by $a_{k+1}$ in the flux of `nu`,
    /// i.e. $\alpha_k(\nu_k) w_\nu + \beta_k(\nu_k + 1) P w_{\nu + e_k} + \beta_k(\nu_k) P w_{\nu - e_k}$
    /// with all neighbors interpolated onto the mesh of `nu`.
    pub fn coupled_component(&self, w: &MultiVector, nu: &Multiindex, k: usize) -> Result<DVector<f64>> {
        let v = w.get(nu)?;
        let basis = v.basis();
        let projections = w.projection_cache();
        let rv = self.coefficient_field.rv(k + 1)?;
        let nu_k = nu.get(k);
        let mut z = v.coeffs() * rv.alpha(nu_k);
        if let Ok(w_up) = w.get(&nu.inc(k, 1)) {
            z.axpy(rv.beta(nu_k + 1), &projections.project(w_up, basis)?, 1.0);
        }
        if let Some(down) = nu.dec(k, 1) {
            if let Ok(w_down) = w.get(&down) {
                z.axpy(rv.beta(nu_k), &projections.project(w_down, basis)?, 1.0);
            }
        }
        Ok(z)
    }

    /// The coupling of row `nu` in dimension `k`, split by the mesh it is evaluated on.
    ///
    /// The first part holds the coefficients multiplied by $A_{k+1}$ on the mesh of `nu`. The
    /// second part lists the neighbors hosting the coupling on their own mesh, with their weights.
    fn row_coupling<'w>(
        &self,
        w: &'w MultiVector,
        nu: &Multiindex,
        k: usize,
    ) -> Result<(DVector<f64>, Vec<(f64, &'w FemVector)>)> {
        let v = w.get(nu)?;
        let basis = v.basis();
        let rv = self.coefficient_field.rv(k + 1)?;
        let nu_k = nu.get(k);
        let mut z = v.coeffs() * rv.alpha(nu_k);
        let mut hosted = Vec::new();

        let up = w.get(&nu.inc(k, 1)).ok().map(|w_up| (rv.beta(nu_k + 1), w_up));
        let down = nu
            .dec(k, 1)
            .and_then(|down| w.get(&down).ok())
            .map(|w_down| (rv.beta(nu_k), w_down));
        for (beta, neighbor) in up.into_iter().chain(down) {
            if neighbor.basis().id() == basis.id() {
                z.axpy(beta, neighbor.coeffs(), 1.0);
            } else if hosts_coupling(basis, neighbor.basis()) {
                let p = w.projection_cache().get_or_assemble(neighbor.basis(), basis)?;
                let coeffs = interior(neighbor.basis(), neighbor.coeffs().clone());
                spmv_into(&mut z, 1.0, beta, &p, &coeffs);
            } else {
                hosted.push((beta, neighbor));
            }
        }
        Ok((z, hosted))
    }

    /// The energy norm $\sqrt{v^T A_0 v}$ of the mean operator on the basis of `v`.
    pub fn energy_norm_mean(&self, v: &FemVector) -> Result<f64> {
        let a0 = self.term_matrix(v.basis(), 0)?;
        Ok(energy_norm(&a0, v.coeffs()))
    }

    /// The right-hand side for the source `f`: the load vector on the zero index, zero elsewhere.
    pub fn prepare_rhs(&self, f: &dyn SpatialFunction, w: &MultiVector) -> Result<MultiVector> {
        let mut rhs = w.zeros_like();
        let zero = Multiindex::zero();
        let basis = rhs.get(&zero)?.basis().clone();
        let load = self.discretisation.assemble_rhs(f, &basis)?;
        *rhs.get_mut(&zero)? = FemVector::from_coefficients(basis, load)?;
        Ok(rhs)
    }

    /// Sparse Cholesky factor of the mean operator on `basis`, computed on first use.
    pub fn mean_factor(&self, basis: &P1Basis) -> Result<Arc<CscCholesky<f64>>> {
        if let Some(factor) = self.mean_factors.read().get(&basis.id()) {
            return Ok(factor.clone());
        }
        let a0 = self.term_matrix(basis, 0)?;
        debug!("Factorizing mean operator on mesh {:?}", basis.id());
        let factor = CscCholesky::factor(&CscMatrix::from(&*a0))
            .map_err(|err| eyre!("Cholesky factorization of mean operator failed: {:?}", err))?;
        Ok(self
            .mean_factors
            .write()
            .entry(basis.id())
            .or_insert(Arc::new(factor))
            .clone())
    }
}

/// Zeroes the boundary entries of `coeffs`, as the fluctuation operators act on interior dofs only.
fn interior(basis: &P1Basis, mut coeffs: DVector<f64>) -> DVector<f64> {
    for (c, &is_boundary) in coeffs.iter_mut().zip(basis.boundary_mask()) {
        if is_boundary {
            *c = 0.0;
        }
    }
    coeffs
}

/// Whether the coupling between functions on `basis` and `other` is evaluated on `basis`.
fn hosts_coupling(basis: &P1Basis, other: &P1Basis) -> bool {
    (basis.dim(), basis.id()) >= (other.dim(), other.id())
}

impl LinearOperator for MultiOperator {
    fn apply(&self, x: &MultiVector) -> Result<MultiVector> {
        MultiOperator::apply(self, x)
    }
}

/// The block diagonal preconditioner $P = \mathrm{diag}(A_0^{-1})$.
///
/// Each block is solved exactly with the sparse Cholesky factor of the mean operator on the
/// mesh of the respective index. For a deterministic coefficient field this is the exact inverse.
#[derive(Debug, Clone, Copy)]
pub struct MeanFieldPreconditioner<'a> {
    operator: &'a MultiOperator,
}

impl<'a> MeanFieldPreconditioner<'a> {
    pub fn new(operator: &'a MultiOperator) -> Self {
        Self { operator }
    }
}

impl<'a> LinearOperator for MeanFieldPreconditioner<'a> {
    fn apply(&self, x: &MultiVector) -> Result<MultiVector> {
        let results: Vec<(Multiindex, FemVector)> = x
            .iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|(mu, v)| -> Result<_> {
                let factor = self.operator.mean_factor(v.basis())?;
                let solution: DVector<f64> = factor.solve(v.coeffs()).column(0).into_owned();
                Ok((mu.clone(), FemVector::from_coefficients(v.basis().clone(), solution)?))
            })
            .collect::<Result<_>>()?;

        let mut result = x.zeros_like();
        for (mu, v) in results {
            result.set(mu, v);
        }
        Ok(result)
    }
}
