//! Basic procedural mesh generation routines.
use crate::mesh::TriangleMesh2d;
use nalgebra::{Point2, Vector2};

pub fn create_unit_square_uniform_tri_mesh_2d(cells_per_dim: usize) -> TriangleMesh2d {
    create_rectangular_uniform_tri_mesh_2d(1.0, 1, 1, cells_per_dim, &Vector2::new(0.0, 1.0))
}

/// Generates an axis-aligned rectangular uniform triangle mesh given a unit length,
/// dimensions as multipliers of the unit length and the number of cells per unit length.
///
/// Every square is split along its diagonal from the top left to the bottom right corner,
/// and the diagonal is the refinement edge of both triangles.
pub fn create_rectangular_uniform_tri_mesh_2d(
    unit_length: f64,
    units_x: usize,
    units_y: usize,
    cells_per_unit: usize,
    top_left: &Vector2<f64>,
) -> TriangleMesh2d {
    if cells_per_unit == 0 || units_x == 0 || units_y == 0 {
        return TriangleMesh2d::from_refined_parts(Vec::new(), Vec::new());
    }

    let cell_size = unit_length / cells_per_unit as f64;
    let num_cells_x = units_x * cells_per_unit;
    let num_cells_y = units_y * cells_per_unit;

    let to_global_vertex_index = |i, j| (num_cells_x + 1) * j + i;

    let mut vertices = Vec::with_capacity((num_cells_x + 1) * (num_cells_y + 1));
    for j in 0..=num_cells_y {
        for i in 0..=num_cells_x {
            let v = top_left + Vector2::new(i as f64, -(j as f64)) * cell_size;
            vertices.push(Point2::from(v));
        }
    }

    let mut cells = Vec::with_capacity(2 * num_cells_x * num_cells_y);
    for j in 0..num_cells_y {
        for i in 0..num_cells_x {
            let top_left = to_global_vertex_index(i, j);
            let top_right = to_global_vertex_index(i + 1, j);
            let bottom_right = to_global_vertex_index(i + 1, j + 1);
            let bottom_left = to_global_vertex_index(i, j + 1);
            cells.push([top_left, bottom_right, top_right]);
            cells.push([bottom_right, top_left, bottom_left]);
        }
    }

    TriangleMesh2d::from_refined_parts(vertices, cells)
}

/// Generates a uniform triangle mesh of the L-shaped domain $(-1, 1)^2 \setminus [0, 1) \times (-1, 0]$.
///
/// `cells_per_unit` is the number of squares along a unit length.
pub fn create_lshape_tri_mesh_2d(cells_per_unit: usize) -> TriangleMesh2d {
    let square = create_rectangular_uniform_tri_mesh_2d(1.0, 2, 2, cells_per_unit, &Vector2::new(-1.0, 1.0));

    let kept_cells: Vec<[usize; 3]> = (0..square.num_cells())
        .filter(|&cell| {
            let centroid = square.cell_centroid(cell);
            !(centroid.x > 0.0 && centroid.y < 0.0)
        })
        .map(|cell| square.connectivity()[cell])
        .collect();

    // Drop vertices that are no longer referenced and relabel the rest
    let mut new_index = vec![None; square.num_vertices()];
    let mut vertices = Vec::new();
    for cell in &kept_cells {
        for &v in cell {
            if new_index[v].is_none() {
                new_index[v] = Some(vertices.len());
                vertices.push(square.vertices()[v]);
            }
        }
    }
    let cells = kept_cells
        .iter()
        .map(|cell| cell.map(|v| new_index[v].unwrap_or_default()))
        .collect();

    TriangleMesh2d::from_refined_parts(vertices, cells)
}
