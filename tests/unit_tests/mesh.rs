use egsz::mesh::procedural::{create_lshape_tri_mesh_2d, create_unit_square_uniform_tri_mesh_2d};
use egsz::mesh::refinement::{refine_marked, refine_uniformly, refine_uniformly_repeat};
use egsz::mesh::TriangleMesh2d;
use nalgebra::Point2;
use proptest::collection::vec;
use proptest::prelude::*;
use std::collections::BTreeMap;
use util::assert_scalar_rel_eq;

fn total_area(mesh: &TriangleMesh2d) -> f64 {
    (0..mesh.num_cells()).map(|cell| mesh.cell_area(cell)).sum()
}

fn is_on_unit_square_boundary(x: &Point2<f64>) -> bool {
    let tol = 1e-12;
    x.x.abs() < tol || x.y.abs() < tol || (x.x - 1.0).abs() < tol || (x.y - 1.0).abs() < tol
}

/// Checks that every cell is counter-clockwise, no edge is shared by more than two cells and
/// all edges with a single adjacent cell lie on the boundary of the unit square, which rules
/// out hanging nodes.
fn assert_conforming_unit_square_mesh(mesh: &TriangleMesh2d) {
    let mut edge_counts: BTreeMap<[usize; 2], usize> = BTreeMap::new();
    for (cell_index, cell) in mesh.connectivity().iter().enumerate() {
        let [a, b, c] = mesh.cell_vertices(cell_index);
        assert!((b - a).perp(&(c - a)) > 0.0, "Cell {} is not counter-clockwise", cell_index);
        for i in 0..3 {
            let (u, v) = (cell[i], cell[(i + 1) % 3]);
            *edge_counts.entry([u.min(v), u.max(v)]).or_default() += 1;
        }
    }
    assert!(edge_counts.values().all(|&count| count <= 2));

    for edge in mesh.find_boundary_edges() {
        let [a, b] = edge.vertices.map(|v| mesh.vertices()[v]);
        assert!(
            is_on_unit_square_boundary(&a) && is_on_unit_square_boundary(&b),
            "Edge {:?} has a single neighbor but is not on the boundary",
            edge
        );
    }
    assert_scalar_rel_eq!(total_area(mesh), 1.0, reltol = 1e-12);
}

#[test]
fn unit_square_mesh_basic_properties() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(2);
    assert_eq!(mesh.num_cells(), 8);
    assert_eq!(mesh.num_vertices(), 9);
    assert_eq!(mesh.edges().len(), 16);
    assert_eq!(mesh.find_boundary_edges().len(), 8);

    let mask = mesh.boundary_vertex_mask();
    assert_eq!(mask.iter().filter(|&&b| b).count(), 8);
    assert_scalar_rel_eq!(mesh.max_diameter(), 0.5 * 2.0f64.sqrt(), reltol = 1e-14);
    assert_conforming_unit_square_mesh(&mesh);
}

#[test]
fn lshape_mesh() {
    let mesh = create_lshape_tri_mesh_2d(1);
    assert_eq!(mesh.num_cells(), 6);
    assert_eq!(mesh.num_vertices(), 8);
    assert_scalar_rel_eq!(total_area(&mesh), 3.0, reltol = 1e-14);
    assert!(mesh
        .connectivity()
        .iter()
        .flatten()
        .all(|&v| v < mesh.num_vertices()));
}

#[test]
fn construction_validates_and_orients_cells() {
    let vertices = vec![
        Point2::new(0.0, 0.0),
        Point2::new(1.0, 0.0),
        Point2::new(0.0, 1.0),
        Point2::new(2.0, 0.0),
    ];

    // Clockwise input is reoriented, and the longest edge becomes the refinement edge
    let mesh = TriangleMesh2d::from_vertices_and_connectivity(vertices.clone(), vec![[0, 2, 1]]).unwrap();
    assert_scalar_rel_eq!(mesh.cell_area(0), 0.5, reltol = 1e-14);
    let cell = mesh.connectivity()[0];
    let mut refinement_edge = [cell[0], cell[1]];
    refinement_edge.sort();
    assert_eq!(refinement_edge, [1, 2]);

    assert!(TriangleMesh2d::from_vertices_and_connectivity(vertices.clone(), vec![[0, 1, 7]]).is_err());
    assert!(TriangleMesh2d::from_vertices_and_connectivity(vertices, vec![[0, 1, 3]]).is_err());
}

#[test]
fn mesh_ids_are_unique() {
    let a = create_unit_square_uniform_tri_mesh_2d(1);
    let b = create_unit_square_uniform_tri_mesh_2d(1);
    let c = refine_uniformly(&a);
    assert_ne!(a.id(), b.id());
    assert_ne!(a.id(), c.id());
}

#[test]
fn uniform_refinement_quadruples_cells() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(2);
    let refined = refine_uniformly(&mesh);
    assert_eq!(refined.num_cells(), 32);
    assert_eq!(refined.num_vertices(), 25);
    assert_conforming_unit_square_mesh(&refined);

    let twice = refine_uniformly_repeat(&mesh, 2);
    assert_eq!(twice.num_cells(), 128);
    assert_scalar_rel_eq!(twice.max_diameter(), 0.25 * mesh.max_diameter(), reltol = 1e-12);
}

#[test]
fn local_refinement_bisects_marked_cells() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(2);
    let refined = refine_marked(&mesh, &[0]).unwrap();
    assert!(refined.num_cells() > mesh.num_cells());
    assert!(refined.num_cells() < 4 * mesh.num_cells());
    assert_conforming_unit_square_mesh(&refined);

    // Both children of the marked cell have half of its area
    let half_area = 0.5 * mesh.cell_area(0);
    let children = (0..refined.num_cells())
        .filter(|&cell| (refined.cell_area(cell) - half_area).abs() < 1e-14)
        .count();
    assert!(children >= 2);

    let unchanged = refine_marked(&mesh, &[]).unwrap();
    assert_eq!(unchanged.num_cells(), mesh.num_cells());
}

#[test]
fn local_refinement_rejects_invalid_cells() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(1);
    assert!(refine_marked(&mesh, &[2]).is_err());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn repeated_local_refinement_is_conforming(marks in vec(vec(0.0 .. 1.0f64, 1 .. 6), 1 .. 4)) {
        let mut mesh = create_unit_square_uniform_tri_mesh_2d(2);
        for round in marks {
            // Map the random numbers to valid cell indices of the current mesh
            let cells: Vec<usize> = round
                .iter()
                .map(|t| ((t * mesh.num_cells() as f64) as usize).min(mesh.num_cells() - 1))
                .collect();
            let refined = refine_marked(&mesh, &cells).unwrap();
            prop_assert!(refined.num_cells() >= mesh.num_cells() + cells.len().min(1));
            assert_conforming_unit_square_mesh(&refined);
            mesh = refined;
        }
    }
}
