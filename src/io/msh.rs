use crate::mesh::TriangleMesh2d;
use eyre::{eyre, Context};
use log::warn;
use nalgebra::Point2;
use std::path::Path;

/// Loads a [`TriangleMesh2d`] from a Gmsh MSH file at the given path.
pub fn load_msh_from_file<P: AsRef<Path>>(file_path: P) -> eyre::Result<TriangleMesh2d> {
    let msh_bytes = std::fs::read(file_path).wrap_err("failed to read file")?;
    load_msh_from_bytes(&msh_bytes).wrap_err("failed to load mesh from msh file")
}

/// Loads a [`TriangleMesh2d`] by parsing the given bytes as a Gmsh MSH file.
///
/// Only the `Tri3` element blocks of entity dimension 2 are used. Other blocks, such as
/// boundary lines or points, are ignored.
pub fn load_msh_from_bytes(bytes: &[u8]) -> eyre::Result<TriangleMesh2d> {
    let mut msh_file = mshio::parse_msh_bytes(bytes).map_err(|e| eyre!("failed to parse msh file: {}", e))?;

    let msh_nodes = msh_file
        .data
        .nodes
        .take()
        .ok_or(eyre!("MSH file does not contain nodes"))?;
    let msh_elements = msh_file
        .data
        .elements
        .take()
        .ok_or(eyre!("MSH file does not contain elements"))?;

    if !msh_elements
        .element_blocks
        .iter()
        .any(|block| element_block_is_triangle_block(block))
    {
        return Err(eyre!("MSH file does not contain a block of Tri3 elements of dimension 2"));
    }

    let mut vertices = Vec::new();
    for node_block in &msh_nodes.node_blocks {
        vertices.extend(vertices_from_node_block(node_block)?);
    }

    let mut connectivity = Vec::new();
    for element_block in &msh_elements.element_blocks {
        connectivity.extend(connectivity_from_element_block(element_block)?);
    }

    TriangleMesh2d::from_vertices_and_connectivity(vertices, connectivity)
}

fn vertices_from_node_block<F, I>(node_block: &mshio::NodeBlock<u64, I, F>) -> eyre::Result<Vec<Point2<f64>>>
where
    F: mshio::MshFloatT,
    I: mshio::MshIntT,
{
    if node_block.node_tags.is_some() {
        return Err(eyre!("node block tags are not consecutive in msh file"));
    }

    node_block
        .nodes
        .iter()
        .map(|node| {
            let x = node
                .x
                .to_f64()
                .ok_or_else(|| eyre!("failed to convert coordinate to f64"))?;
            let y = node
                .y
                .to_f64()
                .ok_or_else(|| eyre!("failed to convert coordinate to f64"))?;
            if node.z.to_f64().map_or(false, |z| z != 0.0) {
                warn!("Ignoring nonzero z-coordinate of node in two-dimensional mesh.");
            }
            Ok(Point2::new(x, y))
        })
        .collect()
}

fn connectivity_from_element_block<I>(element_block: &mshio::ElementBlock<u64, I>) -> eyre::Result<Vec<[usize; 3]>>
where
    I: mshio::MshIntT,
{
    if element_block.element_tags.is_some() {
        return Err(eyre!("element block tags are not consecutive in msh file"));
    }

    if !element_block_is_triangle_block(element_block) {
        return Ok(Vec::new());
    }

    element_block
        .elements
        .iter()
        .map(|element| {
            if element.nodes.len() < 3 {
                return Err(eyre!("not enough nodes to initialize connectivity"));
            }
            // MSH node tags are one-based
            let mut cell = [0; 3];
            for (local, &tag) in element.nodes.iter().take(3).enumerate() {
                cell[local] = (tag as usize)
                    .checked_sub(1)
                    .ok_or_else(|| eyre!("invalid node tag 0 in msh file"))?;
            }
            Ok(cell)
        })
        .collect()
}

fn element_block_is_triangle_block<I>(element_block: &mshio::ElementBlock<u64, I>) -> bool
where
    I: mshio::MshIntT,
{
    element_block.element_type == mshio::ElementType::Tri3 && element_block.entity_dim.to_usize() == Some(2)
}
