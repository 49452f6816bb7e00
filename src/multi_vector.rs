//! Multivectors: one finite element function per active multi-index.
use crate::coefficient_field::CoefficientField;
use crate::error::{Error, Result};
use crate::fem::projection::interpolation_matrix;
use crate::fem::{projection_pair, FemVector, P1Basis};
use crate::mesh::refinement::{refine_marked, refine_uniformly};
use crate::mesh::{MeshId, TriangleMesh2d};
use crate::multi_index::{self, Multiindex};
use crate::util::spmv;
use log::debug;
use nalgebra::{DVector, Point2};
use nalgebra_sparse::CsrMatrix;
use parking_lot::RwLock;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Interpolation matrices between pairs of bases, keyed by (source, target) mesh ids.
///
/// Meshes are immutable snapshots, so entries never become stale.
#[derive(Debug, Default)]
pub struct ProjectionCache {
    matrices: RwLock<FxHashMap<(MeshId, MeshId), Arc<CsrMatrix<f64>>>>,
}

impl ProjectionCache {
    /// Returns the interpolation matrix from `source` to `target`, assembling it if necessary.
    pub fn get_or_assemble(&self, source: &P1Basis, target: &P1Basis) -> Result<Arc<CsrMatrix<f64>>> {
        let key = (source.id(), target.id());
        if let Some(matrix) = self.matrices.read().get(&key) {
            return Ok(matrix.clone());
        }
        debug!("Assembling projection from mesh {:?} to mesh {:?}", key.0, key.1);
        let matrix = Arc::new(interpolation_matrix(source, target)?);
        Ok(self.matrices.write().entry(key).or_insert(matrix).clone())
    }

    pub fn insert(&self, source: MeshId, target: MeshId, matrix: Arc<CsrMatrix<f64>>) {
        self.matrices.write().insert((source, target), matrix);
    }

    pub fn len(&self) -> usize {
        self.matrices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Expresses `vector` in terms of `target`. Vectors already on `target` are returned as is.
    pub fn project(&self, vector: &FemVector, target: &P1Basis) -> Result<DVector<f64>> {
        if vector.basis().id() == target.id() {
            Ok(vector.coeffs().clone())
        } else {
            let matrix = self.get_or_assemble(vector.basis(), target)?;
            Ok(spmv(&matrix, vector.coeffs()))
        }
    }
}

/// Map from the active multi-indices $\Lambda$ to finite element functions.
///
/// Every function has its own basis, so different indices may live on different meshes.
/// Clones and vectors created with [`zeros_like`](Self::zeros_like) share the projection cache.
#[derive(Debug, Clone, Default)]
pub struct MultiVector {
    vectors: BTreeMap<Multiindex, FemVector>,
    projections: Arc<ProjectionCache>,
}

enum RefinementKind {
    Uniform,
    Marked(Vec<usize>),
}

impl MultiVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A multivector with the zero function on `basis` for every given index.
    pub fn zeros<'a>(indices: impl IntoIterator<Item = &'a Multiindex>, basis: Arc<P1Basis>) -> Self {
        let mut w = Self::new();
        for mu in indices {
            w.activate(mu.clone(), basis.clone());
        }
        w
    }

    /// A multivector with the same active set and bases as `self`, but with zero coefficients.
    pub fn zeros_like(&self) -> Self {
        Self {
            vectors: self
                .vectors
                .iter()
                .map(|(mu, v)| (mu.clone(), FemVector::zeros(v.basis().clone())))
                .collect(),
            projections: self.projections.clone(),
        }
    }

    pub fn projection_cache(&self) -> &Arc<ProjectionCache> {
        &self.projections
    }

    pub fn get(&self, mu: &Multiindex) -> Result<&FemVector> {
        self.vectors
            .get(mu)
            .ok_or_else(|| Error::MissingIndex(mu.clone()))
    }

    pub fn get_mut(&mut self, mu: &Multiindex) -> Result<&mut FemVector> {
        self.vectors
            .get_mut(mu)
            .ok_or_else(|| Error::MissingIndex(mu.clone()))
    }

    /// Sets the function of `mu`, activating the index if necessary.
    pub fn set(&mut self, mu: Multiindex, vector: FemVector) {
        self.vectors.insert(mu, vector);
    }

    /// Activates `mu` with the zero function on `basis`.
    ///
    /// Returns `false` and leaves the multivector unchanged if `mu` is already active.
    pub fn activate(&mut self, mu: Multiindex, basis: Arc<P1Basis>) -> bool {
        if self.vectors.contains_key(&mu) {
            false
        } else {
            self.vectors.insert(mu, FemVector::zeros(basis));
            true
        }
    }

    pub fn contains(&self, mu: &Multiindex) -> bool {
        self.vectors.contains_key(mu)
    }

    /// The active set $\Lambda$ in ascending order.
    pub fn active_indices(&self) -> Vec<Multiindex> {
        self.vectors.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Multiindex, &FemVector)> {
        self.vectors.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&Multiindex, &mut FemVector)> {
        self.vectors.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// The active stochastic dimensions.
    pub fn supp(&self) -> BTreeSet<usize> {
        multi_index::supp(self.vectors.keys())
    }

    pub fn max_order(&self) -> usize {
        self.vectors.keys().map(Multiindex::order).max().unwrap_or(0)
    }

    /// The maximal length of the active indices.
    pub fn max_len(&self) -> usize {
        self.vectors.keys().map(Multiindex::len).max().unwrap_or(0)
    }

    /// Total number of degrees of freedom over all indices.
    pub fn num_dofs(&self) -> usize {
        self.vectors.values().map(FemVector::dim).sum()
    }

    /// Whether all active indices share the same mesh.
    pub fn shares_mesh(&self) -> bool {
        let mut ids = self.vectors.values().map(|v| v.basis().id());
        match ids.next() {
            Some(first) => ids.all(|id| id == first),
            None => true,
        }
    }

    /// The distinct bases of the active indices, by mesh id.
    pub fn distinct_bases(&self) -> BTreeMap<MeshId, Arc<P1Basis>> {
        self.vectors
            .values()
            .map(|v| (v.basis().id(), v.basis().clone()))
            .collect()
    }

    /// The function of `mu_src` expressed in the basis of the function of `mu_dst`.
    pub fn project(&self, mu_src: &Multiindex, mu_dst: &Multiindex) -> Result<DVector<f64>> {
        let target = self.get(mu_dst)?.basis().clone();
        self.projections.project(self.get(mu_src)?, &target)
    }

    fn check_compatible(&self, other: &MultiVector) -> Result<()> {
        if self.vectors.len() != other.vectors.len() {
            return Err(Error::ActiveSetMismatch);
        }
        for ((mu, v), (nu, w)) in self.vectors.iter().zip(&other.vectors) {
            if mu != nu {
                return Err(Error::ActiveSetMismatch);
            }
            if v.basis().id() != w.basis().id() {
                return Err(Error::BasisMismatch);
            }
        }
        Ok(())
    }

    /// `self += alpha * x`
    pub fn axpy(&mut self, alpha: f64, x: &MultiVector) -> Result<()> {
        self.check_compatible(x)?;
        for (v, w) in self.vectors.values_mut().zip(x.vectors.values()) {
            v.axpy(alpha, w)?;
        }
        Ok(())
    }

    pub fn scale(&mut self, alpha: f64) {
        for v in self.vectors.values_mut() {
            v.scale_mut(alpha);
        }
    }

    pub fn scaled(&self, alpha: f64) -> Self {
        let mut result = self.clone();
        result.scale(alpha);
        result
    }

    pub fn add(&self, other: &MultiVector) -> Result<Self> {
        let mut result = self.clone();
        result.axpy(1.0, other)?;
        Ok(result)
    }

    pub fn sub(&self, other: &MultiVector) -> Result<Self> {
        let mut result = self.clone();
        result.axpy(-1.0, other)?;
        Ok(result)
    }

    /// Sum of the Euclidean inner products of the coefficient vectors.
    pub fn inner(&self, other: &MultiVector) -> Result<f64> {
        self.check_compatible(other)?;
        self.vectors
            .values()
            .zip(other.vectors.values())
            .map(|(v, w)| v.dot(w))
            .sum()
    }

    pub fn norm(&self) -> f64 {
        self.vectors
            .values()
            .map(|v| v.coeffs().norm_squared())
            .sum::<f64>()
            .sqrt()
    }

    /// Refines the mesh of every active index restricted to the given cells.
    ///
    /// Indices sharing a mesh keep sharing the refined mesh. Cell ids must be valid for every
    /// distinct mesh.
    pub fn refine(&mut self, cell_ids: &[usize]) -> Result<()> {
        let groups = self
            .distinct_bases()
            .into_values()
            .map(|basis| {
                let indices = self.indices_on(basis.id());
                (basis, RefinementKind::Marked(cell_ids.to_vec()), indices)
            })
            .collect();
        self.refine_groups(groups)
    }

    /// Refines every index with its own set of cells. Indices without marks are left unchanged.
    pub fn refine_local(&mut self, marks: &BTreeMap<Multiindex, Vec<usize>>) -> Result<()> {
        // Indices sharing a mesh and a cell set are refined together
        let mut groups: BTreeMap<(MeshId, Vec<usize>), (Arc<P1Basis>, Vec<Multiindex>)> = BTreeMap::new();
        for (mu, cells) in marks {
            if cells.is_empty() {
                continue;
            }
            let basis = self.get(mu)?.basis().clone();
            let mut cells = cells.clone();
            cells.sort_unstable();
            cells.dedup();
            groups
                .entry((basis.id(), cells))
                .or_insert_with(|| (basis, Vec::new()))
                .1
                .push(mu.clone());
        }
        let groups = groups
            .into_iter()
            .map(|((_, cells), (basis, indices))| (basis, RefinementKind::Marked(cells), indices))
            .collect();
        self.refine_groups(groups)
    }

    pub fn refine_uniformly(&mut self) -> Result<()> {
        let groups = self
            .distinct_bases()
            .into_values()
            .map(|basis| {
                let indices = self.indices_on(basis.id());
                (basis, RefinementKind::Uniform, indices)
            })
            .collect();
        self.refine_groups(groups)
    }

    fn indices_on(&self, id: MeshId) -> Vec<Multiindex> {
        self.vectors
            .iter()
            .filter(|(_, v)| v.basis().id() == id)
            .map(|(mu, _)| mu.clone())
            .collect()
    }

    fn refine_groups(&mut self, groups: Vec<(Arc<P1Basis>, RefinementKind, Vec<Multiindex>)>) -> Result<()> {
        let projections = self.projections.clone();
        // Refine each distinct mesh in parallel
        let refined: Vec<(Arc<P1Basis>, Vec<Multiindex>)> = groups
            .into_par_iter()
            .map(|(basis, kind, indices)| -> Result<_> {
                let mesh = match &kind {
                    RefinementKind::Uniform => refine_uniformly(basis.mesh()),
                    RefinementKind::Marked(cells) => refine_marked(basis.mesh(), cells)?,
                };
                let new_basis = Arc::new(P1Basis::new(Arc::new(mesh)));
                let pair = projection_pair(&basis, &new_basis)?;
                projections.insert(basis.id(), new_basis.id(), pair.prolongation);
                projections.insert(new_basis.id(), basis.id(), pair.restriction);
                Ok((new_basis, indices))
            })
            .collect::<Result<_>>()?;

        let mut targets: FxHashMap<Multiindex, Arc<P1Basis>> = FxHashMap::default();
        for (basis, indices) in refined {
            for mu in indices {
                targets.insert(mu, basis.clone());
            }
        }

        // Prolongate each index in parallel
        self.vectors
            .par_iter_mut()
            .filter_map(|(mu, v)| targets.get(mu).map(|basis| (v, basis)))
            .try_for_each(|(v, basis)| -> Result<()> {
                let coeffs = projections.project(v, basis)?;
                *v = FemVector::from_coefficients(basis.clone(), coeffs)?;
                Ok(())
            })
    }

    /// Evaluates the realization $u(x, y) = \sum_\mu u_\mu(x) P_\mu(y)$.
    pub fn evaluate_realization(&self, coefficient_field: &CoefficientField, x: &Point2<f64>, y: &[f64]) -> Result<f64> {
        let weights = coefficient_field.sample_realization(self.vectors.keys(), y)?;
        let mut value = 0.0;
        for (mu, v) in &self.vectors {
            value += weights[mu] * v.eval(x)?;
        }
        Ok(value)
    }

    /// Copies the multivector into a plain serializable form.
    pub fn snapshot(&self) -> MultiVectorSnapshot {
        let mut mesh_positions = BTreeMap::new();
        let mut meshes = Vec::new();
        let mut entries = Vec::with_capacity(self.len());
        for (mu, v) in &self.vectors {
            let mesh = v.basis().mesh();
            let position = *mesh_positions.entry(mesh.id()).or_insert_with(|| {
                meshes.push(MeshSnapshot {
                    vertices: mesh.vertices().iter().map(|p| [p.x, p.y]).collect(),
                    cells: mesh.connectivity().to_vec(),
                });
                meshes.len() - 1
            });
            entries.push(EntrySnapshot {
                index: mu.clone(),
                mesh: position,
                coefficients: v.coeffs().as_slice().to_vec(),
            });
        }
        MultiVectorSnapshot { meshes, entries }
    }

    /// Restores a multivector from a snapshot. Entries that shared a mesh share it again.
    pub fn from_snapshot(snapshot: &MultiVectorSnapshot) -> Result<Self> {
        let bases: Vec<Arc<P1Basis>> = snapshot
            .meshes
            .iter()
            .map(|mesh| {
                if let Some(&v) = mesh.cells.iter().flatten().find(|&&v| v >= mesh.vertices.len()) {
                    return Err(Error::Dimension {
                        requested: v,
                        available: mesh.vertices.len(),
                    });
                }
                let vertices = mesh.vertices.iter().map(|&[x, y]| Point2::new(x, y)).collect();
                // Cells are stored with their refinement edges, which must be kept as they are
                let mesh = TriangleMesh2d::from_refined_parts(vertices, mesh.cells.clone());
                Ok(Arc::new(P1Basis::new(Arc::new(mesh))))
            })
            .collect::<Result<_>>()?;
        let mut w = Self::new();
        for entry in &snapshot.entries {
            let basis = bases.get(entry.mesh).ok_or(Error::Dimension {
                requested: entry.mesh,
                available: bases.len(),
            })?;
            let coeffs = DVector::from_column_slice(&entry.coefficients);
            w.set(entry.index.clone(), FemVector::from_coefficients(basis.clone(), coeffs)?);
        }
        Ok(w)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshSnapshot {
    pub vertices: Vec<[f64; 2]>,
    pub cells: Vec<[usize; 3]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub index: Multiindex,
    /// Position of the mesh in [`MultiVectorSnapshot::meshes`].
    pub mesh: usize,
    pub coefficients: Vec<f64>,
}

/// Serializable representation of a [`MultiVector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiVectorSnapshot {
    pub meshes: Vec<MeshSnapshot>,
    pub entries: Vec<EntrySnapshot>,
}
