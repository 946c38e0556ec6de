use glam::Vec3;

use super::mesh::{self, TriGroup, Vertex};
use super::scene_graph::{bounded_name, NodeId, SceneGraph, MAX_NAME_LEN};
use crate::dae::DaeDocument;

/// Deltas smaller than this in every component are not stored.
pub const MORPH_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MorphDiff {
    pub vert_index: u32,
    pub pos_diff: Vec3,
    pub norm_diff: Vec3,
    pub tan_diff: Vec3,
    pub bitan_diff: Vec3,
}

impl MorphDiff {
    fn is_negligible(&self) -> bool {
        [self.pos_diff, self.norm_diff, self.tan_diff, self.bitan_diff]
            .iter()
            .all(|d| d.abs().max_element() <= MORPH_EPSILON)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MorphTarget {
    pub name: String,
    /// Sorted by vertex index.
    pub diffs: Vec<MorphDiff>,
}

/// Adds the diffs of every target of the mesh's morph controller to `targets`.
///
/// Targets with the same name as an existing one extend it.
pub(crate) fn process_morph_targets(
    doc: &DaeDocument,
    graph: &SceneGraph,
    node_id: NodeId,
    vertices: &[Vertex],
    indices: &[u32],
    targets: &mut Vec<MorphTarget>,
) {
    let Some(mesh) = graph.node(node_id).mesh() else { return };
    let Some(morph) = mesh.morph_id.as_deref().and_then(|id| doc.controllers.find_morph(id)) else {
        return;
    };
    let skins = mesh::position_skins(doc, graph, node_id);

    for target_id in &morph.targets {
        let Some(target) = doc.find_geometry(target_id) else {
            log::warn!("Morph target geometry '{}' not found", target_id);
            continue;
        };
        let name = bounded_name(target.display_name(), MAX_NAME_LEN).to_string();

        let mut diffs = Vec::new();
        for group in &mesh.tri_groups {
            let morphed = morphed_vertices(group, vertices, indices, target, morph.relative, skins.as_deref());
            let start = group.vert_r_start;
            diffs.extend(
                morphed
                    .iter()
                    .zip(&vertices[group.vertex_range()])
                    .enumerate()
                    .map(|(i, (m, base))| MorphDiff {
                        vert_index: start + i as u32,
                        pos_diff: m.pos - base.pos,
                        norm_diff: m.normal - base.normal,
                        tan_diff: m.tangent - base.tangent,
                        bitan_diff: m.bitangent - base.bitangent,
                    })
                    .filter(|d| !d.is_negligible()),
            );
        }

        match targets.iter_mut().find(|t| t.name == name) {
            Some(existing) => {
                existing.diffs.extend(diffs);
                existing.diffs.sort_by_key(|d| d.vert_index);
            }
            None => targets.push(MorphTarget { name, diffs }),
        }
    }
}

/// Copy of the group's vertices with the target's positions and normals and
/// a recomputed tangent frame.
fn morphed_vertices(
    group: &TriGroup,
    vertices: &[Vertex],
    indices: &[u32],
    target: &crate::dae::DaeGeometry,
    relative: bool,
    skins: Option<&[mesh::PositionSkin]>,
) -> Vec<Vertex> {
    let mut morphed = vertices[group.vertex_range()].to_vec();

    for (vertex, source) in morphed.iter_mut().zip(&group.corner_sources) {
        let Some(target_group) = target.tri_groups.get(source.group) else { continue };
        let Some(corner) = target_group.indices.get(source.corner) else { continue };
        let Some(&target_pos) = target.positions.get(corner.pos) else { continue };
        let target_normal = target_group.normal(corner);

        let (pos, normal) = if relative {
            (
                vertex.stored_pos + target_pos,
                (vertex.stored_normal + target_normal.unwrap_or(Vec3::ZERO)).normalize_or_zero(),
            )
        } else {
            (target_pos, target_normal.unwrap_or(vertex.stored_normal))
        };
        let normal = if normal == Vec3::ZERO { vertex.stored_normal } else { normal };

        match skins.and_then(|s| s.get(vertex.dae_pos_index)) {
            Some(skin) => {
                vertex.pos = skin.transform_point(pos);
                vertex.normal = skin.transform_normal(normal);
            }
            None => {
                vertex.pos = pos;
                vertex.normal = normal;
            }
        }
    }

    mesh::calc_tangent_space_basis(
        &mut morphed,
        group.vert_r_start,
        &indices[group.index_range()],
        &group.pos_index_to_vertices,
    );
    morphed
}

/// Moves the diffs of vertices in `range_start..` through `remap` after the
/// vertices of a [TriGroup] were reordered.
pub(crate) fn remap_diffs(targets: &mut [MorphTarget], range_start: u32, remap: &[u32]) {
    let range_end = range_start + remap.len() as u32;
    for target in targets {
        let mut changed = false;
        for diff in &mut target.diffs {
            if (range_start..range_end).contains(&diff.vert_index) {
                diff.vert_index = range_start + remap[(diff.vert_index - range_start) as usize];
                changed = true;
            }
        }
        if changed {
            target.diffs.sort_by_key(|d| d.vert_index);
        }
    }
}
