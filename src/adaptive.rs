//! The adaptive solve-estimate-mark-refine loop.
use crate::coefficient_field::CoefficientField;
use crate::error::{check_theta, Error, Result};
use crate::estimator::{ResidualEstimate, ResidualEstimator};
use crate::fem::{Discretisation, FemPoisson, P1Basis};
use crate::function::SpatialFunction;
use crate::marking::{
    discard_small_candidates, mark_delta, mark_x, mark_x_local, mark_y, max_new_indices, refine_x, refine_x_local,
    refine_y,
};
use crate::mesh::refinement::refine_uniformly_repeat;
use crate::mesh::TriangleMesh2d;
use crate::multi_index::Multiindex;
use crate::multi_operator::{MeanFieldPreconditioner, MultiOperator};
use crate::multi_vector::MultiVector;
use crate::pcg::{pcg, PcgOutput};
use crate::sampling::{sample_error_mc, SampledError};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveSolverOptions {
    /// Bulk parameter of the spatial marking.
    pub theta_eta: f64,
    /// Bulk parameter of the multi-index marking.
    pub theta_zeta: f64,
    /// Bulk parameter of the marking of indices with large projection errors.
    pub theta_delta: f64,
    /// Candidate indices with a smaller tail estimate are never activated.
    pub min_zeta: f64,
    /// Maximal number of indices activated per iteration.
    pub max_new_mi: usize,
    /// Further limits the number of activated indices to this fraction of the active set.
    pub max_lambda_frac: Option<f64>,
    /// Stochastic dimensions from this one on are never activated.
    pub max_search_dim: usize,
    pub pcg_eps: f64,
    pub pcg_maxiter: usize,
    /// The loop terminates once the global estimate drops below this tolerance.
    pub error_eps: f64,
    pub max_refinements: usize,
    pub c_eta: f64,
    pub c_q: f64,
    pub do_residual_refinement: bool,
    pub do_index_activation: bool,
    /// Refines all cells instead of the marked ones.
    pub do_uniform_refinement: bool,
    /// Number of Monte Carlo samples of the error per iteration. Sampling is disabled with `0`.
    pub mc_samples: usize,
    /// Number of random parameters drawn per sample, unless the coefficient field has fewer.
    pub mc_num_terms: usize,
    /// Number of uniform refinements of the initial mesh giving the reference mesh for sampling.
    pub mc_refinements: usize,
    pub mc_seed: u64,
}

impl Default for AdaptiveSolverOptions {
    fn default() -> Self {
        Self {
            theta_eta: 0.4,
            theta_zeta: 0.1,
            theta_delta: 0.9,
            min_zeta: 1e-15,
            max_new_mi: 10,
            max_lambda_frac: None,
            max_search_dim: 100,
            pcg_eps: 1e-6,
            pcg_maxiter: 100,
            error_eps: 1e-4,
            max_refinements: 5,
            c_eta: 1.0,
            c_q: 1.0,
            do_residual_refinement: true,
            do_index_activation: true,
            do_uniform_refinement: false,
            mc_samples: 0,
            mc_num_terms: 10,
            mc_refinements: 2,
            mc_seed: 0,
        }
    }
}

impl AdaptiveSolverOptions {
    pub fn validate(&self) -> Result<()> {
        check_theta("theta_eta", self.theta_eta)?;
        check_theta("theta_zeta", self.theta_zeta)?;
        check_theta("theta_delta", self.theta_delta)?;
        for (name, value) in [("pcg_eps", self.pcg_eps), ("c_eta", self.c_eta), ("c_q", self.c_q)] {
            if !(value > 0.0) {
                return Err(Error::configuration(format!("{} must be positive, got {}", name, value)));
            }
        }
        if self.error_eps < 0.0 {
            return Err(Error::configuration(format!(
                "error_eps must be non-negative, got {}",
                self.error_eps
            )));
        }
        if !(self.min_zeta >= 0.0) {
            return Err(Error::configuration(format!(
                "min_zeta must be non-negative, got {}",
                self.min_zeta
            )));
        }
        if let Some(frac) = self.max_lambda_frac {
            if !(frac > 0.0 && frac.is_finite()) {
                return Err(Error::configuration(format!(
                    "max_lambda_frac must be positive, got {}",
                    frac
                )));
            }
        }
        for (name, value) in [
            ("pcg_maxiter", self.pcg_maxiter),
            ("max_new_mi", self.max_new_mi),
            ("max_search_dim", self.max_search_dim),
        ] {
            if value == 0 {
                return Err(Error::configuration(format!("{} must be at least 1", name)));
            }
        }
        Ok(())
    }
}

/// Statistics of a single iteration of the adaptive loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationStats {
    pub iteration: usize,
    pub dofs: usize,
    /// The global error estimate.
    pub est: f64,
    pub res: f64,
    pub proj: f64,
    /// The stochastic tail estimate.
    pub mi: f64,
    pub res_mu: Vec<(Multiindex, f64)>,
    pub active_indices: Vec<Multiindex>,
    pub marked_cells: usize,
    /// Indices whose meshes were refined because of their projection error.
    #[serde(default)]
    pub projection_indices: Vec<Multiindex>,
    pub new_indices: Vec<Multiindex>,
    pub pcg_iterations: usize,
    pub pcg_residual: f64,
    pub pcg_converged: bool,
    #[serde(default)]
    pub mc_error: Option<SampledError>,
}

impl IterationStats {
    fn new(iteration: usize, w: &MultiVector, estimate: &ResidualEstimate, pcg: &PcgOutput) -> Self {
        Self {
            iteration,
            dofs: w.num_dofs(),
            est: estimate.global,
            res: estimate.eta,
            proj: estimate.delta,
            mi: estimate.zeta_global,
            res_mu: estimate
                .eta_mu
                .iter()
                .map(|(mu, eta)| (mu.clone(), *eta))
                .collect(),
            active_indices: w.active_indices(),
            marked_cells: 0,
            projection_indices: Vec::new(),
            new_indices: Vec::new(),
            pcg_iterations: pcg.num_iterations,
            pcg_residual: pcg.residual_norm,
            pcg_converged: pcg.converged,
            mc_error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    ToleranceReached,
    MaxRefinementsReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverState {
    Init,
    Solve,
    Estimate,
    Mark,
    Refine,
    Terminated(TerminationReason),
}

/// Marks produced in one iteration, applied in the refinement step.
enum CellMarks {
    None,
    Uniform,
    Shared(BTreeSet<usize>),
    Local(BTreeMap<Multiindex, Vec<usize>>),
}

pub struct AdaptiveSolver<'a> {
    operator: MultiOperator,
    f: Arc<dyn SpatialFunction>,
    options: AdaptiveSolverOptions,
    coarse_basis: Arc<P1Basis>,
    reference_basis: Option<Arc<P1Basis>>,
    w: MultiVector,
    stats: Vec<IterationStats>,
    state: SolverState,
    iteration: usize,
    observer: Option<Box<dyn FnMut(&IterationStats) + 'a>>,
}

impl<'a> std::fmt::Debug for AdaptiveSolver<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveSolver")
            .field("options", &self.options)
            .field("state", &self.state)
            .field("iteration", &self.iteration)
            .field("num_active_indices", &self.w.len())
            .finish()
    }
}

impl<'a> AdaptiveSolver<'a> {
    /// Creates a solver for the Poisson problem with the given coefficient field and source,
    /// starting from the zero index on `mesh`.
    pub fn new(
        coefficient_field: Arc<CoefficientField>,
        f: Arc<dyn SpatialFunction>,
        mesh: Arc<TriangleMesh2d>,
        options: AdaptiveSolverOptions,
    ) -> Result<Self> {
        Self::with_discretisation(coefficient_field, Arc::new(FemPoisson), f, mesh, options)
    }

    pub fn with_discretisation(
        coefficient_field: Arc<CoefficientField>,
        discretisation: Arc<dyn Discretisation>,
        f: Arc<dyn SpatialFunction>,
        mesh: Arc<TriangleMesh2d>,
        options: AdaptiveSolverOptions,
    ) -> Result<Self> {
        options.validate()?;
        let coarse_basis = Arc::new(P1Basis::new(mesh));
        let w = MultiVector::zeros(&[Multiindex::zero()], coarse_basis.clone());
        Ok(Self {
            operator: MultiOperator::new(coefficient_field, discretisation),
            f,
            options,
            coarse_basis,
            reference_basis: None,
            w,
            stats: Vec::new(),
            state: SolverState::Init,
            iteration: 0,
            observer: None,
        })
    }

    /// Activates additional indices with the zero function on the coarse mesh before solving.
    pub fn with_initial_indices<'b>(mut self, indices: impl IntoIterator<Item = &'b Multiindex>) -> Self {
        for mu in indices {
            self.w.activate(mu.clone(), self.coarse_basis.clone());
        }
        self
    }

    /// Registers a callback receiving the statistics of every iteration.
    pub fn with_observer(mut self, observer: impl FnMut(&IterationStats) + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn options(&self) -> &AdaptiveSolverOptions {
        &self.options
    }

    pub fn operator(&self) -> &MultiOperator {
        &self.operator
    }

    /// The current (last computed) solution.
    pub fn solution(&self) -> &MultiVector {
        &self.w
    }

    pub fn statistics(&self) -> &[IterationStats] {
        &self.stats
    }

    pub fn last_state(&self) -> SolverState {
        self.state
    }

    /// Runs iterations until termination.
    pub fn run(&mut self) -> Result<TerminationReason> {
        loop {
            if let Some(reason) = self.step()? {
                return Ok(reason);
            }
        }
    }

    /// Performs one iteration of solve, estimate, mark and refine.
    ///
    /// Returns the termination reason once the loop has terminated. Subsequent calls do nothing.
    pub fn step(&mut self) -> Result<Option<TerminationReason>> {
        if let SolverState::Terminated(reason) = self.state {
            return Ok(Some(reason));
        }

        self.state = SolverState::Solve;
        let rhs = self.operator.prepare_rhs(self.f.as_ref(), &self.w)?;
        let preconditioner = MeanFieldPreconditioner::new(&self.operator);
        let (solution, pcg_output) = pcg(
            &self.operator,
            &rhs,
            &preconditioner,
            &self.w,
            self.options.pcg_eps,
            self.options.pcg_maxiter,
        )?;
        self.w = solution;

        self.state = SolverState::Estimate;
        let reference = (self.options.mc_samples > 0).then(|| self.reference_basis());
        let estimator = ResidualEstimator::new(&self.operator, self.f.as_ref())
            .with_c_eta(self.options.c_eta)
            .with_c_q(self.options.c_q)
            .with_max_search_dim(self.search_dimension());
        let estimate = estimator.estimate(&self.w)?;
        let mut stats = IterationStats::new(self.iteration, &self.w, &estimate, &pcg_output);
        if let Some(reference) = &reference {
            stats.mc_error = Some(self.sample_error(reference)?);
        }
        info!(
            "Iteration {}: {} indices, {} dofs, estimate {:e} (residual {:e}, projection {:e}, tail {:e}), {} PCG iterations",
            self.iteration,
            self.w.len(),
            stats.dofs,
            estimate.global,
            estimate.eta,
            estimate.delta,
            estimate.zeta_global,
            pcg_output.num_iterations
        );

        let termination = if estimate.global < self.options.error_eps {
            Some(TerminationReason::ToleranceReached)
        } else if self.iteration >= self.options.max_refinements {
            Some(TerminationReason::MaxRefinementsReached)
        } else {
            None
        };
        if let Some(reason) = termination {
            info!("Adaptive loop terminated after iteration {}: {:?}", self.iteration, reason);
            self.state = SolverState::Terminated(reason);
            self.record(stats);
            return Ok(Some(reason));
        }

        self.state = SolverState::Mark;
        let (cell_marks, projection_indices) = self.mark_cells(&estimate)?;
        stats.marked_cells = match &cell_marks {
            CellMarks::None => 0,
            CellMarks::Uniform => self
                .w
                .distinct_bases()
                .values()
                .map(|basis| basis.mesh().num_cells())
                .sum(),
            CellMarks::Shared(cells) => cells.len(),
            CellMarks::Local(marks) => marks.values().map(Vec::len).sum(),
        };
        let new_indices = if self.options.do_index_activation {
            let lambda: BTreeSet<Multiindex> = self.w.active_indices().into_iter().collect();
            let max_new_mi = max_new_indices(self.options.max_new_mi, lambda.len(), self.options.max_lambda_frac);
            mark_y(
                &lambda,
                estimate.zeta_global,
                discard_small_candidates(estimate.candidates(), self.options.min_zeta),
                |mu, m| estimator.evaluate_zeta(&self.w, mu, m),
                self.options.theta_zeta,
                max_new_mi,
                self.search_dimension(),
            )?
        } else {
            Vec::new()
        };

        self.state = SolverState::Refine;
        match cell_marks {
            CellMarks::None => {}
            CellMarks::Uniform => self.w.refine_uniformly()?,
            CellMarks::Shared(cells) => refine_x(&mut self.w, &cells)?,
            CellMarks::Local(marks) => refine_x_local(&mut self.w, &marks)?,
        }
        refine_y(&mut self.w, &new_indices, &self.coarse_basis);
        stats.projection_indices = projection_indices;
        stats.new_indices = new_indices;

        self.record(stats);
        self.iteration += 1;
        Ok(None)
    }

    /// Marks cells by their residual indicators. With indices on different meshes, indices with a
    /// large projection error additionally have all cells of their mesh marked.
    fn mark_cells(&self, estimate: &ResidualEstimate) -> Result<(CellMarks, Vec<Multiindex>)> {
        if self.options.do_uniform_refinement {
            Ok((CellMarks::Uniform, Vec::new()))
        } else if !self.options.do_residual_refinement {
            Ok((CellMarks::None, Vec::new()))
        } else if self.w.shares_mesh() {
            let cells = mark_x(estimate.eta, &estimate.eta_local, self.options.theta_eta)?;
            Ok((CellMarks::Shared(cells), Vec::new()))
        } else {
            let mut marks = mark_x_local(estimate.eta, &estimate.eta_local, self.options.theta_eta)?;
            let projection_indices = mark_delta(&estimate.delta_mu, self.options.theta_delta)?;
            for mu in &projection_indices {
                let num_cells = self.w.get(mu)?.basis().mesh().num_cells();
                marks.insert(mu.clone(), (0..num_cells).collect());
            }
            Ok((CellMarks::Local(marks), projection_indices))
        }
    }

    /// The basis on a uniform refinement of the initial mesh, used as reference for error sampling.
    fn reference_basis(&mut self) -> Arc<P1Basis> {
        if let Some(basis) = &self.reference_basis {
            return basis.clone();
        }
        let mesh = refine_uniformly_repeat(self.coarse_basis.mesh(), self.options.mc_refinements);
        debug!("Created reference mesh with {} cells for error sampling", mesh.num_cells());
        let basis = Arc::new(P1Basis::new(Arc::new(mesh)));
        self.reference_basis = Some(basis.clone());
        basis
    }

    /// Samples the error of the current solution against solutions on the reference basis.
    fn sample_error(&self, reference: &Arc<P1Basis>) -> Result<SampledError> {
        let mut rng = StdRng::seed_from_u64(self.options.mc_seed.wrapping_add(self.iteration as u64));
        sample_error_mc(
            &self.w,
            &self.operator,
            self.f.as_ref(),
            reference,
            self.options.mc_num_terms,
            self.options.mc_samples,
            &mut rng,
        )
    }

    /// Dimensions available for activation, capped by the terms of a finite coefficient field.
    fn search_dimension(&self) -> usize {
        match self.operator.coefficient_field().len() {
            Some(len) => self.options.max_search_dim.min(len - 1),
            None => self.options.max_search_dim,
        }
    }

    fn record(&mut self, stats: IterationStats) {
        if let Some(observer) = self.observer.as_mut() {
            observer(&stats);
        }
        self.stats.push(stats);
    }
}
