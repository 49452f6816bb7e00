//! A minimal finite element backend: continuous piecewise linear functions on triangle meshes.
//!
//! Degrees of freedom are the mesh vertices. Homogeneous Dirichlet conditions are imposed on
//! all boundary vertices.
use crate::mesh::refinement::refine_marked;
use crate::mesh::{MeshId, TriangleMesh2d};
use nalgebra::{Point2, Vector2};
use std::sync::{Arc, OnceLock};

pub mod assembly;
pub mod poisson;
pub mod projection;
pub mod spatially_indexed;

mod vector;

pub use poisson::{Discretisation, FemPoisson, OperatorRole};
pub use projection::{projection_pair, ProjectionPair};
pub use vector::FemVector;

use spatially_indexed::CellLocator;

/// Nodal basis of continuous piecewise linear functions on a triangle mesh.
#[derive(Debug)]
pub struct P1Basis {
    mesh: Arc<TriangleMesh2d>,
    boundary: Vec<bool>,
    locator: OnceLock<CellLocator>,
}

impl P1Basis {
    pub fn new(mesh: Arc<TriangleMesh2d>) -> Self {
        let boundary = mesh.boundary_vertex_mask();
        Self {
            mesh,
            boundary,
            locator: OnceLock::new(),
        }
    }

    pub fn mesh(&self) -> &Arc<TriangleMesh2d> {
        &self.mesh
    }

    /// The id of the underlying mesh. Two bases are the same if and only if their ids agree.
    pub fn id(&self) -> MeshId {
        self.mesh.id()
    }

    /// Number of degrees of freedom.
    pub fn dim(&self) -> usize {
        self.mesh.num_vertices()
    }

    pub fn boundary_mask(&self) -> &[bool] {
        &self.boundary
    }

    pub fn is_boundary(&self, dof: usize) -> bool {
        self.boundary[dof]
    }

    /// Gradients of the three basis functions supported on the cell, in local vertex order.
    pub fn cell_gradients(&self, cell: usize) -> [Vector2<f64>; 3] {
        let [a, b, c] = self.mesh.cell_vertices(cell);
        let area2 = (b - a).perp(&(c - a));
        [
            Vector2::new(b.y - c.y, c.x - b.x) / area2,
            Vector2::new(c.y - a.y, a.x - c.x) / area2,
            Vector2::new(a.y - b.y, b.x - a.x) / area2,
        ]
    }

    /// Finds a cell containing `x` and the barycentric coordinates of `x` in that cell.
    pub fn locate(&self, x: &Point2<f64>) -> Option<(usize, [f64; 3])> {
        self.locator
            .get_or_init(|| CellLocator::new(&self.mesh))
            .locate(&self.mesh, x)
    }

    /// Refines the given cells and returns the new basis with the projection pair between the bases.
    pub fn refine(&self, cells: &[usize]) -> eyre::Result<(P1Basis, ProjectionPair)> {
        let refined = Self::new(Arc::new(refine_marked(&self.mesh, cells)?));
        let pair = projection_pair(self, &refined)?;
        Ok((refined, pair))
    }
}
