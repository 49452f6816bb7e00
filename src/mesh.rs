//! Immutable triangle meshes in two dimensions.
//!
//! Meshes are snapshots: refinement never mutates a mesh but produces a new one with a fresh
//! [`MeshId`]. Anything derived from a mesh (bases, assembled matrices, projection operators)
//! can therefore be cached by id without ever going stale.
use eyre::eyre;
use nalgebra::{Point2, Vector2};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

pub mod procedural;
pub mod refinement;

static NEXT_MESH_ID: AtomicUsize = AtomicUsize::new(0);

/// Stable identifier of a mesh snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(usize);

impl MeshId {
    fn next() -> Self {
        Self(NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// An edge of a mesh along with its one or two adjacent cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshEdge {
    /// Vertex indices, sorted in ascending order.
    pub vertices: [usize; 2],
    pub cells: (usize, Option<usize>),
}

impl MeshEdge {
    pub fn is_boundary(&self) -> bool {
        self.cells.1.is_none()
    }
}

/// Index-based conforming triangle mesh.
///
/// Every cell `[v0, v1, v2]` is oriented counter-clockwise, and `(v0, v1)` is its
/// *refinement edge* while `v2` is its newest vertex, which is the bookkeeping needed for
/// newest vertex bisection (see [`refinement`]).
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleMesh2d {
    id: MeshId,
    vertices: Vec<Point2<f64>>,
    connectivity: Vec<[usize; 3]>,
}

impl TriangleMesh2d {
    /// Construct a mesh from vertices and connectivity.
    ///
    /// Cells are reoriented counter-clockwise and their longest edge is chosen as the initial
    /// refinement edge. Out-of-bounds vertex indices and degenerate cells are rejected.
    pub fn from_vertices_and_connectivity(
        vertices: Vec<Point2<f64>>,
        connectivity: Vec<[usize; 3]>,
    ) -> eyre::Result<Self> {
        let mut oriented = Vec::with_capacity(connectivity.len());
        for (cell_index, cell) in connectivity.into_iter().enumerate() {
            if cell.iter().any(|&v| v >= vertices.len()) {
                return Err(eyre!("cell {} references a vertex out of bounds", cell_index));
            }
            let [a, b, c] = cell.map(|v| vertices[v]);
            let signed_area2 = (b - a).perp(&(c - a));
            if signed_area2 == 0.0 {
                return Err(eyre!("cell {} is degenerate", cell_index));
            }
            let cell = if signed_area2 < 0.0 { [cell[0], cell[2], cell[1]] } else { cell };

            let edge_len2 = |i: usize| (vertices[cell[(i + 1) % 3]] - vertices[cell[i]]).norm_squared();
            let longest = (0..3)
                .max_by(|&i, &j| edge_len2(i).total_cmp(&edge_len2(j)))
                .unwrap_or(0);
            oriented.push([cell[longest], cell[(longest + 1) % 3], cell[(longest + 2) % 3]]);
        }
        Ok(Self::from_refined_parts(vertices, oriented))
    }

    /// Assumes that the cells are already oriented and carry their refinement edges.
    pub(crate) fn from_refined_parts(vertices: Vec<Point2<f64>>, connectivity: Vec<[usize; 3]>) -> Self {
        Self {
            id: MeshId::next(),
            vertices,
            connectivity,
        }
    }

    pub fn id(&self) -> MeshId {
        self.id
    }

    pub fn vertices(&self) -> &[Point2<f64>] {
        &self.vertices
    }

    pub fn connectivity(&self) -> &[[usize; 3]] {
        &self.connectivity
    }

    pub fn num_cells(&self) -> usize {
        self.connectivity.len()
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn cell_vertices(&self, cell: usize) -> [Point2<f64>; 3] {
        self.connectivity[cell].map(|v| self.vertices[v])
    }

    pub fn cell_area(&self, cell: usize) -> f64 {
        let [a, b, c] = self.cell_vertices(cell);
        0.5 * (b - a).perp(&(c - a)).abs()
    }

    /// The diameter $h_T$ of the cell, i.e. its longest edge.
    pub fn cell_diameter(&self, cell: usize) -> f64 {
        let [a, b, c] = self.cell_vertices(cell);
        [(b - a).norm(), (c - b).norm(), (a - c).norm()]
            .into_iter()
            .fold(0.0, f64::max)
    }

    pub fn cell_centroid(&self, cell: usize) -> Point2<f64> {
        let [a, b, c] = self.cell_vertices(cell);
        Point2::from((a.coords + b.coords + c.coords) / 3.0)
    }

    /// Largest cell diameter.
    pub fn max_diameter(&self) -> f64 {
        (0..self.num_cells())
            .map(|cell| self.cell_diameter(cell))
            .fold(0.0, f64::max)
    }

    /// Collects all edges along with their adjacent cells.
    ///
    /// The result is sorted by vertex indices, so it does not depend on any hashing.
    pub fn edges(&self) -> Vec<MeshEdge> {
        let mut edges: BTreeMap<[usize; 2], (usize, Option<usize>)> = BTreeMap::new();
        for (cell_index, cell) in self.connectivity.iter().enumerate() {
            for i in 0..3 {
                let (a, b) = (cell[i], cell[(i + 1) % 3]);
                let key = [a.min(b), a.max(b)];
                edges
                    .entry(key)
                    .and_modify(|cells| cells.1 = Some(cell_index))
                    .or_insert((cell_index, None));
            }
        }
        edges
            .into_iter()
            .map(|(vertices, cells)| MeshEdge { vertices, cells })
            .collect()
    }

    /// Finds edges which are only connected to exactly one cell.
    pub fn find_boundary_edges(&self) -> Vec<MeshEdge> {
        self.edges().into_iter().filter(MeshEdge::is_boundary).collect()
    }

    /// Returns a mask which is `true` for every vertex on the boundary of the mesh.
    pub fn boundary_vertex_mask(&self) -> Vec<bool> {
        let mut mask = vec![false; self.num_vertices()];
        for edge in self.find_boundary_edges() {
            for v in edge.vertices {
                mask[v] = true;
            }
        }
        mask
    }

    /// Outward unit normal of the (oriented) cell side from `a` to `b`.
    pub(crate) fn side_normal(a: &Point2<f64>, b: &Point2<f64>) -> Vector2<f64> {
        let t = b - a;
        Vector2::new(t.y, -t.x).normalize()
    }
}
