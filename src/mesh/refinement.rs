//! Local refinement of triangle meshes by newest vertex bisection.
//!
//! A cell `[v0, v1, v2]` is bisected along its refinement edge `(v0, v1)` into the children
//! `[v2, v0, m]` and `[v1, v2, m]`, where `m` is the midpoint of the refinement edge. The new
//! vertex `m` is the newest vertex of both children, so their refinement edges are edges of
//! the parent. Conformity is restored by a closure over marked edges: whenever an edge of a
//! cell is marked, so is the refinement edge of that cell.
use crate::mesh::TriangleMesh2d;
use eyre::eyre;
use nalgebra::Point2;
use rustc_hash::{FxHashMap, FxHashSet};

type EdgeKey = (usize, usize);

fn edge_key(a: usize, b: usize) -> EdgeKey {
    (a.min(b), a.max(b))
}

fn refinement_edge(cell: &[usize; 3]) -> EdgeKey {
    edge_key(cell[0], cell[1])
}

fn cell_edges(cell: &[usize; 3]) -> [EdgeKey; 3] {
    [
        edge_key(cell[0], cell[1]),
        edge_key(cell[1], cell[2]),
        edge_key(cell[2], cell[0]),
    ]
}

/// Refines the given cells, along with as many neighbors as necessary to keep the mesh
/// conforming.
///
/// Every marked cell is bisected at least once. Cell indices must be in bounds.
pub fn refine_marked(mesh: &TriangleMesh2d, marked_cells: &[usize]) -> eyre::Result<TriangleMesh2d> {
    let mut marked_edges = FxHashSet::default();
    for &cell in marked_cells {
        let connectivity = mesh
            .connectivity()
            .get(cell)
            .ok_or_else(|| eyre!("cell index {} out of bounds for mesh with {} cells", cell, mesh.num_cells()))?;
        marked_edges.insert(refinement_edge(connectivity));
    }
    close_edge_marking(mesh, &mut marked_edges);
    Ok(bisect_marked_edges(mesh, &marked_edges))
}

/// Refines every cell, i.e. every cell is split into four children.
pub fn refine_uniformly(mesh: &TriangleMesh2d) -> TriangleMesh2d {
    let marked_edges = mesh
        .connectivity()
        .iter()
        .flat_map(cell_edges)
        .collect();
    bisect_marked_edges(mesh, &marked_edges)
}

/// Applies [`refine_uniformly`] `rounds` times.
pub fn refine_uniformly_repeat(mesh: &TriangleMesh2d, rounds: usize) -> TriangleMesh2d {
    let mut refined = mesh.clone();
    for _ in 0..rounds {
        refined = refine_uniformly(&refined);
    }
    refined
}

fn close_edge_marking(mesh: &TriangleMesh2d, marked_edges: &mut FxHashSet<EdgeKey>) {
    let mut changed = true;
    while changed {
        changed = false;
        for cell in mesh.connectivity() {
            let ref_edge = refinement_edge(cell);
            if !marked_edges.contains(&ref_edge) && cell_edges(cell).iter().any(|e| marked_edges.contains(e)) {
                marked_edges.insert(ref_edge);
                changed = true;
            }
        }
    }
}

fn bisect_marked_edges(mesh: &TriangleMesh2d, marked_edges: &FxHashSet<EdgeKey>) -> TriangleMesh2d {
    let mut vertices: Vec<Point2<f64>> = mesh.vertices().to_vec();
    let mut midpoints: FxHashMap<EdgeKey, usize> = FxHashMap::default();
    let mut connectivity = Vec::with_capacity(mesh.num_cells());

    let mut stack = Vec::new();
    for cell in mesh.connectivity() {
        stack.push(*cell);
        while let Some(cell) = stack.pop() {
            let ref_edge = refinement_edge(&cell);
            if !marked_edges.contains(&ref_edge) {
                connectivity.push(cell);
                continue;
            }
            let [v0, v1, v2] = cell;
            let m = *midpoints.entry(ref_edge).or_insert_with(|| {
                let midpoint = Point2::from((vertices[v0].coords + vertices[v1].coords) * 0.5);
                vertices.push(midpoint);
                vertices.len() - 1
            });
            // Reverse order on the stack so children come out in the order [v2, v0, m], [v1, v2, m]
            stack.push([v1, v2, m]);
            stack.push([v2, v0, m]);
        }
    }

    TriangleMesh2d::from_refined_parts(vertices, connectivity)
}
