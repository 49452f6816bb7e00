//! Residual based a posteriori error estimation for stochastic Galerkin solutions.
//!
//! The estimator has three components:
//!
//! - the spatial residual $\eta$, with one indicator per cell and active index,
//! - the projection error $\delta$ caused by coupling indices on different meshes,
//! - the stochastic tail $\zeta$, estimating the error of not activating neighbors of $\Lambda$.
//!
//! The global estimate is $\sqrt{\eta^2 + \delta^2 + \zeta^2}$.
use crate::error::{Error, Result};
use crate::fem::{FemVector, P1Basis};
use crate::function::SpatialFunction;
use crate::mesh::{MeshId, TriangleMesh2d};
use crate::multi_index::Multiindex;
use crate::multi_operator::MultiOperator;
use crate::multi_vector::MultiVector;
use crate::quadrature::{integrate_over_segment, integrate_over_triangle, segment_gauss_2, tri_strength_2};
use crate::util::energy_norm;
use log::debug;
use nalgebra::{DVector, Point2, Vector2};
use parking_lot::RwLock;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The result of a residual estimation.
#[derive(Debug, Clone, Default)]
pub struct ResidualEstimate {
    /// Per-cell residual indicators for every active index, on the mesh of that index.
    pub eta_local: BTreeMap<Multiindex, DVector<f64>>,
    /// Residual contribution of every active index (root-sum-square of its cell indicators).
    pub eta_mu: BTreeMap<Multiindex, f64>,
    pub eta: f64,
    /// Projection error contribution attributed to the lower index of each coupled pair.
    pub delta_mu: BTreeMap<Multiindex, f64>,
    pub delta: f64,
    /// Tail estimates for the inactive neighbors `mu + e_k`, keyed by `(mu, k)`.
    pub zeta: BTreeMap<(Multiindex, usize), f64>,
    pub zeta_global: f64,
    pub global: f64,
}

impl ResidualEstimate {
    /// Aggregates the tail estimates by candidate index, summing over all active parents.
    pub fn candidates(&self) -> BTreeMap<Multiindex, f64> {
        let mut candidates = BTreeMap::new();
        for ((mu, k), zeta) in &self.zeta {
            *candidates.entry(mu.inc(*k, 1)).or_insert(0.0) += zeta;
        }
        candidates
    }
}

pub struct ResidualEstimator<'a> {
    operator: &'a MultiOperator,
    f: &'a dyn SpatialFunction,
    c_eta: f64,
    c_q: f64,
    max_search_dim: Option<usize>,
    ratios: RwLock<FxHashMap<(MeshId, usize), f64>>,
}

impl<'a> ResidualEstimator<'a> {
    pub fn new(operator: &'a MultiOperator, f: &'a dyn SpatialFunction) -> Self {
        Self {
            operator,
            f,
            c_eta: 1.0,
            c_q: 1.0,
            max_search_dim: None,
            ratios: Default::default(),
        }
    }

    /// Sets the constant of the spatial residual estimator.
    pub fn with_c_eta(self, c_eta: f64) -> Self {
        Self { c_eta, ..self }
    }

    /// Sets the constant of the tail estimator.
    pub fn with_c_q(self, c_q: f64) -> Self {
        Self { c_q, ..self }
    }

    /// Restricts the tail estimation to the stochastic dimensions below `max_search_dim`.
    pub fn with_max_search_dim(self, max_search_dim: usize) -> Self {
        Self {
            max_search_dim: Some(max_search_dim),
            ..self
        }
    }

    /// Estimates the error of `w`.
    pub fn estimate(&self, w: &MultiVector) -> Result<ResidualEstimate> {
        let indices = w.active_indices();

        let eta_local: BTreeMap<Multiindex, DVector<f64>> = indices
            .par_iter()
            .map(|mu| -> Result<_> { Ok((mu.clone(), self.residual_indicators(w, mu)?)) })
            .collect::<Result<_>>()?;
        let eta_mu: BTreeMap<Multiindex, f64> = eta_local
            .iter()
            .map(|(mu, indicators)| (mu.clone(), indicators.norm()))
            .collect();
        let eta = rss(eta_mu.values());

        let delta_mu = self.projection_indicators(w)?;
        let delta = rss(delta_mu.values());

        let mut zeta = BTreeMap::new();
        for k in self.tail_dimensions(w) {
            for mu in &indices {
                if !w.contains(&mu.inc(k, 1)) {
                    zeta.insert((mu.clone(), k), self.evaluate_zeta(w, mu, k)?);
                }
            }
        }
        let zeta_global = rss(zeta.values());

        let global = (eta * eta + delta * delta + zeta_global * zeta_global).sqrt();
        debug!(
            "Estimated error {:e} (residual {:e}, projection {:e}, tail {:e})",
            global, eta, delta, zeta_global
        );
        Ok(ResidualEstimate {
            eta_local,
            eta_mu,
            eta,
            delta_mu,
            delta,
            zeta,
            zeta_global,
            global,
        })
    }

    /// The stochastic dimensions searched for inactive neighbors: `0..=max(supp) + 1`, so that the
    /// first unused dimension is always searched. Restricted to the terms available in the
    /// coefficient field and to the search range.
    pub fn tail_dimensions(&self, w: &MultiVector) -> std::ops::Range<usize> {
        let mut end = w.supp().last().map_or(1, |maxm| maxm + 2);
        if let Some(len) = self.operator.coefficient_field().len() {
            end = end.min(len - 1);
        }
        if let Some(max_search_dim) = self.max_search_dim {
            end = end.min(max_search_dim);
        }
        0..end
    }

    /// The tail estimate $\zeta(\mu, k)$ for activating $\mu + e_k$.
    pub fn evaluate_zeta(&self, w: &MultiVector, mu: &Multiindex, k: usize) -> Result<f64> {
        let v = w.get(mu)?;
        let rv = self.operator.coefficient_field().rv(k + 1)?;
        let ratio = self.coefficient_ratio(v.basis(), k + 1)?;
        let norm = self.operator.energy_norm_mean(v)?;
        Ok(self.c_q * ratio * rv.beta(mu.get(k) + 1) * norm)
    }

    /// $\| a_m / a_0 \|_\infty$, sampled at vertices and centroids of the mesh.
    fn coefficient_ratio(&self, basis: &P1Basis, m: usize) -> Result<f64> {
        let key = (basis.id(), m);
        if let Some(ratio) = self.ratios.read().get(&key) {
            return Ok(*ratio);
        }
        let (a_m, _) = self.operator.coefficient_field().term(m)?;
        let a_0 = self.operator.coefficient_field().mean();
        let ratio = sample_points(basis.mesh())
            .map(|x| (a_m.eval(&x) / a_0.eval(&x)).abs())
            .fold(0.0, f64::max);
        self.ratios.write().insert(key, ratio);
        Ok(ratio)
    }

    /// The functions multiplied by each term of the coefficient field in the flux of index `mu`.
    ///
    /// Entry `0` is `w_mu` itself, entry `k + 1` is the coupled component of dimension `k`.
    fn flux_components(&self, w: &MultiVector, mu: &Multiindex) -> Result<Vec<FemVector>> {
        let v = w.get(mu)?;
        let mut components = vec![v.clone()];
        for k in 0..self.operator.num_dimensions(w) {
            let z = self.operator.coupled_component(w, mu, k)?;
            components.push(FemVector::from_coefficients(v.basis().clone(), z)?);
        }
        Ok(components)
    }

    /// Per-cell residual indicators of index `mu`.
    fn residual_indicators(&self, w: &MultiVector, mu: &Multiindex) -> Result<DVector<f64>> {
        let components = self.flux_components(w, mu)?;
        let basis = components[0].basis().clone();
        let mesh = basis.mesh();
        let funcs: Vec<Arc<dyn SpatialFunction>> = (0..components.len())
            .map(|m| -> Result<_> { Ok(self.operator.coefficient_field().term(m)?.0) })
            .collect::<Result<_>>()?;

        // Gradients are constant per cell for piecewise linear functions
        let gradients: Vec<Vec<Vector2<f64>>> = components
            .iter()
            .map(|c| (0..mesh.num_cells()).map(|cell| c.cell_gradient(cell)).collect())
            .collect();

        let flux = |cell: usize, x: &Point2<f64>| -> Vector2<f64> {
            funcs
                .iter()
                .zip(&gradients)
                .map(|(a, g)| g[cell] * a.eval(x))
                .fold(Vector2::zeros(), |acc, s| acc + s)
        };
        // The Laplacian of piecewise linear functions vanishes, leaving the coefficient gradients
        let flux_divergence = |cell: usize, x: &Point2<f64>| -> f64 {
            funcs
                .iter()
                .zip(&gradients)
                .map(|(a, g)| a.gradient(x).dot(&g[cell]))
                .sum()
        };

        let source_weight = if mu.is_zero() { 1.0 } else { 0.0 };
        let tri_quadrature = tri_strength_2();
        let mut squared: DVector<f64> = DVector::zeros(mesh.num_cells());
        for cell in 0..mesh.num_cells() {
            let vertices = mesh.cell_vertices(cell);
            let residual = integrate_over_triangle(&vertices, &tri_quadrature, |x| {
                let r = source_weight * self.f.eval(x) + flux_divergence(cell, x);
                r * r
            });
            let h = mesh.cell_diameter(cell);
            squared[cell] += h * h * residual;
        }

        let segment_quadrature = segment_gauss_2();
        for edge in mesh.edges() {
            if let (t1, Some(t2)) = edge.cells {
                let [a, b] = edge.vertices.map(|v| mesh.vertices()[v]);
                let normal = TriangleMesh2d::side_normal(&a, &b);
                let jump = integrate_over_segment(&a, &b, &segment_quadrature, |x| {
                    let j = (flux(t1, x) - flux(t2, x)).dot(&normal);
                    j * j
                });
                let h_e = (b - a).norm();
                squared[t1] += 0.5 * h_e * jump;
                squared[t2] += 0.5 * h_e * jump;
            }
        }

        let min_mean = sample_points(mesh)
            .map(|x| self.operator.coefficient_field().mean().eval(&x))
            .fold(f64::INFINITY, f64::min);
        if !(min_mean > 0.0) {
            return Err(Error::configuration(format!(
                "mean coefficient must be positive, but has minimum {}",
                min_mean
            )));
        }

        let scale = self.c_eta * self.c_eta / min_mean;
        Ok(squared.map(|s| (scale * s).max(0.0).sqrt()))
    }

    /// Projection indicators for coupled indices `mu` and `mu + e_k` living on different meshes.
    fn projection_indicators(&self, w: &MultiVector) -> Result<BTreeMap<Multiindex, f64>> {
        let projections = w.projection_cache();
        let mut squared = BTreeMap::new();
        for (mu, v) in w.iter() {
            let mut total = 0.0;
            for k in 0..self.operator.num_dimensions(w) {
                let w_up = match w.get(&mu.inc(k, 1)) {
                    Ok(w_up) => w_up,
                    Err(_) => continue,
                };
                if w_up.basis().id() == v.basis().id() {
                    continue;
                }
                let rv = self.operator.coefficient_field().rv(k + 1)?;
                let ratio = self.coefficient_ratio(w_up.basis(), k + 1)?;
                let there = FemVector::from_coefficients(v.basis().clone(), projections.project(w_up, v.basis())?)?;
                let back = projections.project(&there, w_up.basis())?;
                let error = w_up.coeffs() - back;
                let a0 = self.operator.term_matrix(w_up.basis(), 0)?;
                let delta = rv.beta(mu.get(k) + 1) * ratio * energy_norm(&a0, &error);
                total += delta * delta;
            }
            squared.insert(mu.clone(), total.sqrt());
        }
        Ok(squared)
    }
}

fn sample_points(mesh: &TriangleMesh2d) -> impl '_ + Iterator<Item = Point2<f64>> {
    mesh.vertices()
        .iter()
        .copied()
        .chain((0..mesh.num_cells()).map(|cell| mesh.cell_centroid(cell)))
}

fn rss<'a>(values: impl IntoIterator<Item = &'a f64>) -> f64 {
    values.into_iter().map(|v| v * v).sum::<f64>().sqrt()
}
