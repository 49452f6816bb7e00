use crate::mesh::TriangleMesh2d;
use nalgebra::Point2;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, RTreeObject};
use std::fmt;

/// Barycentric coordinates of `x` with respect to the triangle `[a, b, c]`.
pub fn barycentric_coordinates(vertices: &[Point2<f64>; 3], x: &Point2<f64>) -> [f64; 3] {
    let [a, b, c] = vertices;
    let area2 = (b - a).perp(&(c - a));
    let lambda1 = (x - a).perp(&(c - a)) / area2;
    let lambda2 = (b - a).perp(&(x - a)) / area2;
    [1.0 - lambda1 - lambda2, lambda1, lambda2]
}

/// R-tree over the bounding boxes of the cells of a mesh, used for point location.
pub struct CellLocator {
    tree: RTree<GeomWithData<Rectangle<[f64; 2]>, usize>>,
}

impl fmt::Debug for CellLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellLocator")
            .field("num_cells", &self.tree.size())
            .finish()
    }
}

impl CellLocator {
    pub fn new(mesh: &TriangleMesh2d) -> Self {
        let geometries = (0..mesh.num_cells())
            .map(|cell| {
                let vertices = mesh.cell_vertices(cell);
                let mut min = [f64::INFINITY; 2];
                let mut max = [f64::NEG_INFINITY; 2];
                for v in &vertices {
                    for i in 0..2 {
                        min[i] = min[i].min(v[i]);
                        max[i] = max[i].max(v[i]);
                    }
                }
                // Make bounding box larger than necessary to accommodate
                // possible floating point errors etc.
                let pad = 1e-10 * mesh.cell_diameter(cell);
                let rectangle = Rectangle::from_corners([min[0] - pad, min[1] - pad], [max[0] + pad, max[1] + pad]);
                GeomWithData::new(rectangle, cell)
            })
            .collect();
        Self {
            tree: RTree::bulk_load(geometries),
        }
    }

    /// Cells whose bounding box may contain the closest point of the mesh to `point`.
    fn closest_cell_candidates<'a>(&'a self, point: [f64; 2]) -> impl 'a + Iterator<Item = usize> {
        let mut iter = self.tree.nearest_neighbor_iter_with_distance_2(&point).peekable();

        // Any subsequent box can be excluded if its closest point is further away
        // than any point in the first box
        let d2_max = iter
            .peek()
            .map(|(geom, _)| {
                let envelope = geom.geom().envelope();
                let (lower, upper) = (envelope.lower(), envelope.upper());
                let dx = (point[0] - lower[0]).abs().max((point[0] - upper[0]).abs());
                let dy = (point[1] - lower[1]).abs().max((point[1] - upper[1]).abs());
                dx * dx + dy * dy
            })
            .unwrap_or(f64::NAN);
        iter.take_while(move |(_, d2)| *d2 <= d2_max)
            .map(|(geom, _)| geom.data)
    }

    /// Finds the cell containing `x` together with the barycentric coordinates of `x` in that cell.
    ///
    /// Points outside of the mesh are projected onto the closest cell, so the returned
    /// coordinates are always non-negative. Returns `None` only for an empty mesh.
    pub fn locate(&self, mesh: &TriangleMesh2d, x: &Point2<f64>) -> Option<(usize, [f64; 3])> {
        let mut best: Option<(usize, [f64; 3], f64)> = None;
        for cell in self.closest_cell_candidates([x.x, x.y]) {
            let lambda = barycentric_coordinates(&mesh.cell_vertices(cell), x);
            let min_lambda = lambda.iter().copied().fold(f64::INFINITY, f64::min);
            if best.map_or(true, |(_, _, current)| min_lambda > current) {
                best = Some((cell, lambda, min_lambda));
            }
            if min_lambda >= -1e-12 {
                break;
            }
        }
        best.map(|(cell, lambda, _)| (cell, clamp_barycentric(lambda)))
    }
}

fn clamp_barycentric(lambda: [f64; 3]) -> [f64; 3] {
    let clamped = lambda.map(|l| l.max(0.0));
    let sum: f64 = clamped.iter().sum();
    if sum > 0.0 {
        clamped.map(|l| l / sum)
    } else {
        [1.0 / 3.0; 3]
    }
}
