//! Doerfler (bulk chasing) marking of cells and multi-indices, and application of the marks.
use crate::error::{check_theta, Error, Result};
use crate::fem::P1Basis;
use crate::multi_index::{self, Multiindex};
use crate::multi_vector::MultiVector;
use log::{debug, info, warn};
use nalgebra::DVector;
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Greedily takes entries in the given order until their accumulated value reaches `budget`.
fn accumulate_until<T>(sorted: impl IntoIterator<Item = (f64, T)>, budget: f64) -> (Vec<T>, f64) {
    let mut marked = Vec::new();
    let mut accumulated = 0.0;
    for (value, item) in sorted {
        if accumulated >= budget {
            break;
        }
        marked.push(item);
        accumulated += value;
    }
    (marked, accumulated)
}

/// Marks cells of a mesh shared by all indices.
///
/// The per-cell indicators of all indices are combined into one root-sum-square indicator per
/// cell. Cells are then taken in order of decreasing indicator (ties by cell id) until the
/// accumulated indicator reaches `theta_x * global_eta`. The passed `global_eta` is the budget
/// even if it differs from the root-sum-square of the local indicators.
pub fn mark_x(
    global_eta: f64,
    eta_local: &BTreeMap<Multiindex, DVector<f64>>,
    theta_x: f64,
) -> Result<BTreeSet<usize>> {
    check_theta("theta_x", theta_x)?;
    let num_cells = eta_local.values().next().map_or(0, DVector::len);
    let mut squared = DVector::<f64>::zeros(num_cells);
    for indicators in eta_local.values() {
        if indicators.len() != num_cells {
            return Err(Error::Dimension {
                requested: indicators.len(),
                available: num_cells,
            });
        }
        squared += indicators.component_mul(indicators);
    }
    let combined = squared.map(f64::sqrt);
    debug!(
        "(mark_x) global residual {:e}, re-summed residual {:e}",
        global_eta,
        combined.norm()
    );

    let mut sorted: Vec<(f64, usize)> = combined.iter().copied().zip(0..).collect();
    sorted.sort_by_key(|&(value, cell)| (Reverse(OrderedFloat(value)), cell));
    let (marked, accumulated) = accumulate_until(sorted, theta_x * global_eta);
    info!(
        "(mark_x) marked {} of {} cells ({:e} of budget {:e})",
        marked.len(),
        num_cells,
        accumulated,
        theta_x * global_eta
    );
    Ok(marked.into_iter().collect())
}

/// Marks cells individually per index, for indices living on different meshes.
///
/// The pool consists of all pairs `(mu, cell)`, ordered by decreasing indicator (ties by index
/// and cell). The result maps every index with marked cells to its sorted cell ids.
pub fn mark_x_local(
    global_eta: f64,
    eta_local: &BTreeMap<Multiindex, DVector<f64>>,
    theta_x: f64,
) -> Result<BTreeMap<Multiindex, Vec<usize>>> {
    check_theta("theta_x", theta_x)?;
    let mut sorted: Vec<(f64, (&Multiindex, usize))> = eta_local
        .iter()
        .flat_map(|(mu, indicators)| indicators.iter().enumerate().map(move |(cell, &value)| (value, (mu, cell))))
        .collect();
    sorted.sort_by(|(v1, key1), (v2, key2)| {
        OrderedFloat(*v2)
            .cmp(&OrderedFloat(*v1))
            .then_with(|| key1.cmp(key2))
    });
    let (marked, accumulated) = accumulate_until(sorted, theta_x * global_eta);
    info!(
        "(mark_x) marked {} cells over {} indices ({:e} of budget {:e})",
        marked.len(),
        eta_local.len(),
        accumulated,
        theta_x * global_eta
    );

    let mut marks: BTreeMap<Multiindex, Vec<usize>> = BTreeMap::new();
    for (mu, cell) in marked {
        marks.entry(mu.clone()).or_default().push(cell);
    }
    for cells in marks.values_mut() {
        cells.sort_unstable();
    }
    Ok(marks)
}

/// Marks indices whose coupling to neighbors on different meshes causes a large projection error.
///
/// Indices are taken in order of decreasing indicator (ties by index order) until the accumulated
/// indicator reaches `theta_delta` times the root-sum-square of all indicators. Indices with a
/// vanishing indicator are never marked.
pub fn mark_delta(delta_mu: &BTreeMap<Multiindex, f64>, theta_delta: f64) -> Result<Vec<Multiindex>> {
    check_theta("theta_delta", theta_delta)?;
    let global_delta = delta_mu.values().map(|d| d * d).sum::<f64>().sqrt();
    let mut sorted: Vec<(f64, &Multiindex)> = delta_mu
        .iter()
        .filter(|(_, delta)| **delta > 0.0)
        .map(|(mu, &delta)| (delta, mu))
        .collect();
    sorted.sort_by(|(d1, mu1), (d2, mu2)| OrderedFloat(*d2).cmp(&OrderedFloat(*d1)).then_with(|| mu1.cmp(mu2)));
    let (marked, accumulated) = accumulate_until(sorted, theta_delta * global_delta);
    if !marked.is_empty() {
        info!(
            "(mark_delta) marked {} indices for projection refinement ({:e} of budget {:e})",
            marked.len(),
            accumulated,
            theta_delta * global_delta
        );
    }
    Ok(marked.into_iter().cloned().collect())
}

/// Removes candidates with a tail estimate below `min_zeta`.
pub fn discard_small_candidates(zeta: BTreeMap<Multiindex, f64>, min_zeta: f64) -> BTreeMap<Multiindex, f64> {
    let num_candidates = zeta.len();
    let retained: BTreeMap<_, _> = zeta.into_iter().filter(|(_, z)| *z >= min_zeta).collect();
    if retained.len() < num_candidates {
        debug!(
            "(mark_y) discarded {} candidates with tail estimate below {:e}",
            num_candidates - retained.len(),
            min_zeta
        );
    }
    retained
}

/// The number of indices that may be activated at once for an active set of `lambda_len` indices.
///
/// With `max_lambda_frac`, at most `ceil(max_lambda_frac * lambda_len)` indices (but at least one)
/// are activated, and never more than `max_new_mi`.
pub fn max_new_indices(max_new_mi: usize, lambda_len: usize, max_lambda_frac: Option<f64>) -> usize {
    match max_lambda_frac {
        Some(frac) => {
            let by_fraction = (frac * lambda_len as f64).ceil().max(1.0) as usize;
            max_new_mi.min(by_fraction)
        }
        None => max_new_mi,
    }
}

/// Selects new multi-indices to activate from a pool of candidates with tail estimates.
///
/// Candidates are taken in order of decreasing estimate (ties by index order) and leave the pool
/// when selected. Selection stops once the accumulated estimate reaches
/// `theta_y * global_zeta`, `max_new_mi` indices are selected or the pool is exhausted.
///
/// Whenever a selected candidate `mu` satisfies `mu - e_maxm` in `lambda` for the largest active
/// dimension `maxm`, the candidate `mu - e_maxm + e_minm` with the smallest inactive dimension
/// `minm` is evaluated through `eval_zeta_m(mu - e_maxm, minm)` and added to the pool. Dimensions
/// from `max_search_dim` on are never searched.
pub fn mark_y<F>(
    lambda: &BTreeSet<Multiindex>,
    global_zeta: f64,
    mut zeta: BTreeMap<Multiindex, f64>,
    mut eval_zeta_m: F,
    theta_y: f64,
    max_new_mi: usize,
    max_search_dim: usize,
) -> Result<Vec<Multiindex>>
where
    F: FnMut(&Multiindex, usize) -> Result<f64>,
{
    check_theta("theta_y", theta_y)?;
    if zeta.is_empty() {
        warn!("(mark_y) list of multi-index candidates is empty");
        return Ok(Vec::new());
    }

    let supp = multi_index::supp(lambda);
    let budget = theta_y * global_zeta;
    let mut new_mi = Vec::new();
    let mut marked_zeta = 0.0;

    while marked_zeta < budget && new_mi.len() < max_new_mi {
        let best = zeta
            .iter()
            .max_by(|(mu1, z1), (mu2, z2)| {
                OrderedFloat(**z1)
                    .cmp(&OrderedFloat(**z2))
                    .then_with(|| mu2.cmp(mu1))
            })
            .map(|(mu, _)| mu.clone());
        let Some(mu) = best else {
            warn!("(mark_y) list of multi-index candidates is exhausted");
            break;
        };
        let value = zeta.remove(&mu).unwrap_or_default();
        marked_zeta += value;

        if let Some(&maxm) = supp.iter().next_back() {
            if let Some(mu2) = mu.dec(maxm, 1).filter(|mu2| lambda.contains(mu2)) {
                let minm = (0..=maxm + 1)
                    .find(|m| !supp.contains(m))
                    .unwrap_or(maxm + 1);
                let candidate = mu2.inc(minm, 1);
                if minm < max_search_dim
                    && !lambda.contains(&candidate)
                    && !zeta.contains_key(&candidate)
                    && !new_mi.contains(&candidate)
                    && candidate != mu
                {
                    let value = eval_zeta_m(&mu2, minm)?;
                    debug!(
                        "(mark_y) extending candidates with {} ({:e}) since {} is at the boundary of the active set",
                        candidate, value, mu2
                    );
                    zeta.insert(candidate, value);
                }
            }
        }
        new_mi.push(mu);
    }

    if new_mi.is_empty() {
        info!("(mark_y) no new multi-indices selected");
    } else {
        info!(
            "(mark_y) selected {} new multi-indices ({:e} of budget {:e})",
            new_mi.len(),
            marked_zeta,
            budget
        );
    }
    Ok(new_mi)
}

/// Refines the meshes of all indices restricted to the marked cells.
pub fn refine_x(w: &mut MultiVector, cells: &BTreeSet<usize>) -> Result<()> {
    let cells: Vec<usize> = cells.iter().copied().collect();
    w.refine(&cells)
}

/// Refines the mesh of every index with its own marked cells.
pub fn refine_x_local(w: &mut MultiVector, marks: &BTreeMap<Multiindex, Vec<usize>>) -> Result<()> {
    w.refine_local(marks)
}

/// Activates the new indices with the zero function on `basis`. Returns the number of activated indices.
pub fn refine_y(w: &mut MultiVector, new_mi: &[Multiindex], basis: &Arc<P1Basis>) -> usize {
    new_mi
        .iter()
        .filter(|mu| w.activate((*mu).clone(), basis.clone()))
        .count()
}
