use glam::{Mat3, Mat4, Vec3};

use super::scene_graph::{NodeId, SceneGraph, SkinBinding};
use crate::dae::{DaeDocument, DaeGeometry, DaeSkin, MAX_TEX_COORD_SETS};

pub const MAX_INFLUENCES: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    /// Position as authored in the document.
    pub stored_pos: Vec3,
    /// Position in the bind pose.
    pub pos: Vec3,
    pub stored_normal: Vec3,
    pub normal: Vec3,
    pub tangent: Vec3,
    pub bitangent: Vec3,
    pub tex_coords: [Vec3; MAX_TEX_COORD_SETS],
    pub joints: [Option<NodeId>; MAX_INFLUENCES],
    pub weights: [f32; MAX_INFLUENCES],
    pub dae_pos_index: usize,
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            stored_pos: Vec3::ZERO,
            pos: Vec3::ZERO,
            stored_normal: Vec3::ZERO,
            normal: Vec3::ZERO,
            tangent: Vec3::ZERO,
            bitangent: Vec3::ZERO,
            tex_coords: [Vec3::ZERO; MAX_TEX_COORD_SETS],
            joints: [None; MAX_INFLUENCES],
            weights: [1.0, 0.0, 0.0, 0.0],
            dae_pos_index: 0,
        }
    }
}

/// Triangle corner a welded vertex was first created from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CornerSource {
    /// Primitive index in the geometry.
    pub group: usize,
    /// Corner index inside the primitive.
    pub corner: usize,
}

/// All triangles of a mesh that share one material.
#[derive(Debug, Clone, Default)]
pub struct TriGroup {
    /// Range in the shared index buffer.
    pub first: u32,
    pub count: u32,
    /// Range in the shared vertex buffer, end exclusive.
    pub vert_r_start: u32,
    pub vert_r_end: u32,
    pub mat_name: String,
    /// Output name of the child mesh for every group but the first.
    pub name: String,
    /// Global vertex indices created from each document position.
    pub pos_index_to_vertices: Vec<Vec<u32>>,
    pub(crate) corner_sources: Vec<CornerSource>,
}

impl TriGroup {
    pub fn vertex_range(&self) -> std::ops::Range<usize> {
        self.vert_r_start as usize..self.vert_r_end as usize
    }

    pub fn index_range(&self) -> std::ops::Range<usize> {
        self.first as usize..(self.first + self.count) as usize
    }
}

/// Skin influences and bind pose transform of one document position.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PositionSkin {
    pub joints: [Option<NodeId>; MAX_INFLUENCES],
    pub weights: [f32; MAX_INFLUENCES],
    pub matrix: Mat4,
}

impl PositionSkin {
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.matrix.transform_point3(p)
    }

    pub fn transform_normal(&self, n: Vec3) -> Vec3 {
        let normal_mat = Mat3::from_mat4(self.matrix).inverse().transpose();
        let transformed = (normal_mat * n).normalize_or_zero();
        if transformed == Vec3::ZERO {
            n
        } else {
            transformed
        }
    }
}

/// Influences for every position of a skinned mesh, `None` for static meshes.
pub(crate) fn position_skins(doc: &DaeDocument, graph: &SceneGraph, node_id: NodeId) -> Option<Vec<PositionSkin>> {
    let node = graph.node(node_id);
    let mesh = node.mesh()?;
    let binding = mesh.skin.as_ref()?;
    let skin = doc.controllers.find_skin(mesh.skin_id.as_deref()?)?;
    let geometry = doc.find_geometry(&mesh.geometry_id)?;

    let mut truncated = 0usize;
    let skins = (0..geometry.positions.len())
        .map(|pos| {
            let (skin, was_truncated) = position_skin(graph, node.mat_abs, skin, binding, pos);
            truncated += usize::from(was_truncated);
            skin
        })
        .collect();

    if truncated > 0 {
        log::warn!(
            "Mesh '{}': {} vertices have more than {} influences, keeping the strongest",
            node.name,
            truncated,
            MAX_INFLUENCES
        );
    }
    Some(skins)
}

fn position_skin(
    graph: &SceneGraph,
    mesh_abs: Mat4,
    skin: &DaeSkin,
    binding: &SkinBinding,
    pos: usize,
) -> (PositionSkin, bool) {
    // (joint, weight, matrix) with unresolved joints dropped
    let mut influences: Vec<(Option<NodeId>, f32, Mat4)> = skin
        .vertex_weights
        .get(pos)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .filter(|w| w.weight > 0.0)
        .filter_map(|w| match usize::try_from(w.joint) {
            Ok(index) => {
                let joint = (*binding.joints.get(index)?)?;
                let inv_bind = binding.inv_bind_mats.get(index)?;
                let matrix = graph.node(joint).mat_abs * *inv_bind * binding.bind_shape_mat;
                Some((Some(joint), w.weight, matrix))
            }
            // Negative indices bind to the shape itself.
            Err(_) => Some((None, w.weight, mesh_abs * binding.bind_shape_mat)),
        })
        .collect();

    influences.sort_by(|a, b| b.1.total_cmp(&a.1));
    let truncated = influences.len() > MAX_INFLUENCES;
    influences.truncate(MAX_INFLUENCES);

    let total: f32 = influences.iter().map(|i| i.1).sum();
    if total <= 0.0 {
        let skin = PositionSkin {
            joints: [None; MAX_INFLUENCES],
            weights: [1.0, 0.0, 0.0, 0.0],
            matrix: mesh_abs * binding.bind_shape_mat,
        };
        return (skin, truncated);
    }

    let mut skin = PositionSkin {
        joints: [None; MAX_INFLUENCES],
        weights: [0.0; MAX_INFLUENCES],
        matrix: Mat4::ZERO,
    };
    for (slot, (joint, weight, matrix)) in influences.into_iter().enumerate() {
        let weight = weight / total;
        skin.joints[slot] = joint;
        skin.weights[slot] = weight;
        skin.matrix += matrix * weight;
    }
    (skin, truncated)
}

/// Smooth per-position normals for primitives that do not provide any.
fn fallback_normals(geometry: &DaeGeometry) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; geometry.positions.len()];
    for group in &geometry.tri_groups {
        for tri in group.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0].pos, tri[1].pos, tri[2].pos];
            let (Some(pa), Some(pb), Some(pc)) = (
                geometry.positions.get(a),
                geometry.positions.get(b),
                geometry.positions.get(c),
            ) else {
                continue;
            };
            let face = (*pb - *pa).cross(*pc - *pa);
            for index in [a, b, c] {
                normals[index] += face;
            }
        }
    }
    normals
        .into_iter()
        .map(|n| {
            let n = n.normalize_or_zero();
            if n == Vec3::ZERO {
                Vec3::Y
            } else {
                n
            }
        })
        .collect()
}

/// Resolves a primitive's material symbol to the material name.
fn material_name(doc: &DaeDocument, graph: &SceneGraph, node_id: NodeId, symbol: &str) -> String {
    let Some(mesh) = graph.node(node_id).mesh() else {
        return symbol.to_string();
    };
    match mesh.instance.material_for_symbol(symbol) {
        Some(id) => doc
            .find_material(id)
            .map(|m| m.display_name().to_string())
            .unwrap_or_else(|| id.to_string()),
        None => symbol.to_string(),
    }
}

/// Builds the welded vertices and indices of one mesh node, one [TriGroup]
/// per material, and computes the tangent space basis.
pub(crate) fn build_tri_groups(
    doc: &DaeDocument,
    graph: &SceneGraph,
    node_id: NodeId,
    vertices: &mut Vec<Vertex>,
    indices: &mut Vec<u32>,
) -> Vec<TriGroup> {
    let Some(geometry) = graph
        .node(node_id)
        .mesh()
        .and_then(|m| doc.find_geometry(&m.geometry_id))
    else {
        return Vec::new();
    };

    let skins = position_skins(doc, graph, node_id);
    let needs_fallback = geometry
        .tri_groups
        .iter()
        .any(|g| g.indices.iter().any(|c| g.normal(c).is_none()));
    let fallback = if needs_fallback {
        fallback_normals(geometry)
    } else {
        Vec::new()
    };

    // Primitives sharing a material, in order of first appearance.
    let mut materials: Vec<(String, Vec<usize>)> = Vec::new();
    for (i, group) in geometry.tri_groups.iter().enumerate() {
        let name = material_name(doc, graph, node_id, &group.material_symbol);
        match materials.iter_mut().find(|(n, _)| *n == name) {
            Some((_, groups)) => groups.push(i),
            None => materials.push((name, vec![i])),
        }
    }

    let mut tri_groups = Vec::with_capacity(materials.len());
    for (mat_name, group_indices) in materials {
        let mut tri_group = TriGroup {
            first: indices.len() as u32,
            vert_r_start: vertices.len() as u32,
            mat_name,
            pos_index_to_vertices: vec![Vec::new(); geometry.positions.len()],
            ..Default::default()
        };

        for group_index in group_indices {
            let group = &geometry.tri_groups[group_index];
            for (corner_index, corner) in group.indices.iter().enumerate() {
                let mut vertex = Vertex {
                    stored_pos: geometry.positions[corner.pos],
                    stored_normal: group
                        .normal(corner)
                        .or_else(|| fallback.get(corner.pos).copied())
                        .unwrap_or(Vec3::Y),
                    dae_pos_index: corner.pos,
                    ..Default::default()
                };
                for set in 0..MAX_TEX_COORD_SETS {
                    vertex.tex_coords[set] = group.tex_coord(corner, set);
                }

                let candidates = &mut tri_group.pos_index_to_vertices[corner.pos];
                let existing = candidates.iter().copied().find(|&v| {
                    let other = &vertices[v as usize];
                    other.stored_normal == vertex.stored_normal && other.tex_coords == vertex.tex_coords
                });

                let index = match existing {
                    Some(index) => index,
                    None => {
                        match skins.as_ref().and_then(|s| s.get(corner.pos)) {
                            Some(skin) => {
                                vertex.pos = skin.transform_point(vertex.stored_pos);
                                vertex.normal = skin.transform_normal(vertex.stored_normal);
                                vertex.joints = skin.joints;
                                vertex.weights = skin.weights;
                            }
                            None => {
                                vertex.pos = vertex.stored_pos;
                                vertex.normal = vertex.stored_normal;
                            }
                        }
                        let index = vertices.len() as u32;
                        vertices.push(vertex);
                        candidates.push(index);
                        tri_group.corner_sources.push(CornerSource {
                            group: group_index,
                            corner: corner_index,
                        });
                        index
                    }
                };
                indices.push(index);
            }
        }

        tri_group.count = indices.len() as u32 - tri_group.first;
        tri_group.vert_r_end = vertices.len() as u32;

        let range = tri_group.vertex_range();
        calc_tangent_space_basis(
            &mut vertices[range],
            tri_group.vert_r_start,
            &indices[tri_group.index_range()],
            &tri_group.pos_index_to_vertices,
        );
        tri_groups.push(tri_group);
    }

    tri_groups
}

/// Computes tangents and bitangents for the vertices of one [TriGroup].
///
/// `vertices` starts at global index `offset`. Contributions of every
/// triangle are summed per vertex and then averaged over all vertices that
/// share a document position before they are orthogonalized against the normal.
pub(crate) fn calc_tangent_space_basis(
    vertices: &mut [Vertex],
    offset: u32,
    indices: &[u32],
    pos_index_to_vertices: &[Vec<u32>],
) {
    for v in vertices.iter_mut() {
        v.tangent = Vec3::ZERO;
        v.bitangent = Vec3::ZERO;
    }

    for tri in indices.chunks_exact(3) {
        let local = [
            (tri[0] - offset) as usize,
            (tri[1] - offset) as usize,
            (tri[2] - offset) as usize,
        ];
        let [v0, v1, v2] = local.map(|i| &vertices[i]);

        let edge1 = v1.pos - v0.pos;
        let edge2 = v2.pos - v0.pos;
        let uv1 = v1.tex_coords[0] - v0.tex_coords[0];
        let uv2 = v2.tex_coords[0] - v0.tex_coords[0];

        let det = uv1.x * uv2.y - uv2.x * uv1.y;
        if det.abs() <= f32::EPSILON {
            continue;
        }
        let r = 1.0 / det;
        let tangent = (edge1 * uv2.y - edge2 * uv1.y) * r;
        let bitangent = (edge2 * uv1.x - edge1 * uv2.x) * r;

        for i in local {
            vertices[i].tangent += tangent;
            vertices[i].bitangent += bitangent;
        }
    }

    for shared in pos_index_to_vertices.iter().filter(|s| s.len() > 1) {
        let (tangent, bitangent) = shared.iter().fold((Vec3::ZERO, Vec3::ZERO), |(t, b), &v| {
            let v = &vertices[(v - offset) as usize];
            (t + v.tangent, b + v.bitangent)
        });
        for &v in shared {
            let v = &mut vertices[(v - offset) as usize];
            v.tangent = tangent;
            v.bitangent = bitangent;
        }
    }

    for v in vertices.iter_mut() {
        let n = v.normal;
        // Gram-Schmidt
        let mut tangent = v.tangent - n * n.dot(v.tangent);
        if tangent.length_squared() <= 1e-12 {
            tangent = n.any_orthonormal_vector();
        }
        let tangent = tangent.normalize();

        let handedness = if n.cross(tangent).dot(v.bitangent) < 0.0 { -1.0 } else { 1.0 };
        v.tangent = tangent;
        v.bitangent = n.cross(tangent) * handedness;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn vertex(pos: Vec3, uv: Vec3, dae_pos_index: usize) -> Vertex {
        Vertex {
            stored_pos: pos,
            pos,
            stored_normal: Vec3::Z,
            normal: Vec3::Z,
            tex_coords: [uv, Vec3::ZERO, Vec3::ZERO, Vec3::ZERO],
            dae_pos_index,
            ..Default::default()
        }
    }

    #[test]
    fn planar_quad_tangents_follow_uv_axes() {
        let mut vertices = vec![
            vertex(Vec3::new(0.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 0.0), 0),
            vertex(Vec3::new(1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 1),
            vertex(Vec3::new(1.0, 1.0, 0.0), Vec3::new(1.0, 1.0, 0.0), 2),
            vertex(Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 1.0, 0.0), 3),
        ];
        let pos_map = vec![vec![0], vec![1], vec![2], vec![3]];
        calc_tangent_space_basis(&mut vertices, 0, &[0, 1, 2, 0, 2, 3], &pos_map);

        for v in &vertices {
            assert_relative_eq!(v.tangent, Vec3::X, epsilon = 1e-6);
            assert_relative_eq!(v.bitangent, Vec3::Y, epsilon = 1e-6);
        }
    }

    #[test]
    fn mirrored_uvs_flip_the_bitangent() {
        let mut vertices = vec![
            vertex(Vec3::new(0.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0), 0),
            vertex(Vec3::new(1.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 0.0), 1),
            vertex(Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 0.0, 0.0), 2),
        ];
        let pos_map = vec![vec![0], vec![1], vec![2]];
        calc_tangent_space_basis(&mut vertices, 0, &[0, 1, 2], &pos_map);
        assert_relative_eq!(vertices[0].bitangent, -Vec3::Y, epsilon = 1e-6);
    }

    #[test]
    fn missing_uvs_still_give_an_orthonormal_frame() {
        let mut vertices = vec![
            vertex(Vec3::new(0.0, 0.0, 0.0), Vec3::ZERO, 0),
            vertex(Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO, 1),
            vertex(Vec3::new(0.0, 1.0, 0.0), Vec3::ZERO, 2),
        ];
        let pos_map = vec![vec![10], vec![11], vec![12]];
        calc_tangent_space_basis(&mut vertices, 10, &[10, 11, 12], &pos_map);
        for v in &vertices {
            assert_relative_eq!(v.tangent.length(), 1.0, epsilon = 1e-6);
            assert_relative_eq!(v.tangent.dot(v.normal), 0.0, epsilon = 1e-6);
            assert_relative_eq!(v.bitangent.dot(v.tangent), 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn shared_positions_get_equal_tangents() {
        // Two triangles meeting at positions 1 and 2 through a UV seam.
        let mut vertices = vec![
            vertex(Vec3::new(0.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 0.0), 0),
            vertex(Vec3::new(1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 1),
            vertex(Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 1.0, 0.0), 2),
            vertex(Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 0.5, 0.0), 1),
            vertex(Vec3::new(1.0, 1.0, 0.0), Vec3::new(0.5, 0.5, 0.0), 3),
            vertex(Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 0.0, 0.0), 2),
        ];
        let pos_map = vec![vec![0], vec![1, 3], vec![2, 5], vec![4]];
        calc_tangent_space_basis(&mut vertices, 0, &[0, 1, 2, 3, 4, 5], &pos_map);

        assert_eq!(vertices[1].tangent, vertices[3].tangent);
        assert_eq!(vertices[2].bitangent, vertices[5].bitangent);
    }
}
