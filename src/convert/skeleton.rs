use std::collections::HashSet;

use super::mesh::Vertex;
use super::scene_graph::{NodeId, NodeKind, SceneGraph};

/// Joint indices are stored in one byte and slot 0 is the model root.
pub const MAX_JOINTS: usize = u8::MAX as usize;

/// Marks joints referenced by skinned vertices as used, propagates that to
/// their ancestor joints and assigns dense indices in depth-first order.
///
/// Returns the used joints ordered by index.
pub(crate) fn process_joints(graph: &mut SceneGraph, vertices: &[Vertex]) -> Vec<NodeId> {
    let referenced: HashSet<NodeId> = vertices
        .iter()
        .flat_map(|v| v.joints.iter().flatten().copied())
        .collect();

    let order = graph.depth_first();

    // Children come after their parents, so walking backwards sees every
    // subtree before its root.
    let mut subtree_used = vec![false; graph.nodes.len()];
    for &id in order.iter().rev() {
        let node = graph.node(id);
        let used = referenced.contains(&id) || node.children.iter().any(|&c| subtree_used[c]);
        subtree_used[id] = used;
    }

    let mut joints = Vec::new();
    for id in order {
        let node = graph.node_mut(id);
        let inv_bind_mat = node.mat_abs.inverse();
        if let NodeKind::Joint(joint) = &mut node.kind {
            joint.used = subtree_used[id];
            joint.inv_bind_mat = inv_bind_mat;
            joint.index = None;
            if joint.used {
                joint.index = Some(joints.len() as u32);
                joints.push(id);
            }
        }
    }

    if !joints.is_empty() {
        log::info!("{} joints used for skinning", joints.len());
    }
    joints
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::scene_graph::{JointData, SceneNode};
    use glam::{Mat4, Vec3};

    fn node(name: &str, kind: NodeKind, parent: Option<NodeId>, mat_abs: Mat4) -> SceneNode {
        SceneNode {
            name: name.to_string(),
            dae_id: name.to_string(),
            dae_sid: String::new(),
            dae_name: String::new(),
            kind,
            parent,
            children: Vec::new(),
            mat_rel: mat_abs,
            mat_abs,
            frames: Vec::new(),
        }
    }

    fn joint() -> NodeKind {
        NodeKind::Joint(JointData::default())
    }

    #[test]
    fn indices_are_dense_and_cover_used_joints() {
        // root -> a -> b, root -> unused, and a mesh beside them
        let mut graph = SceneGraph::default();
        graph.nodes.push(node("root", joint(), None, Mat4::IDENTITY));
        graph.nodes.push(node("a", joint(), Some(0), Mat4::from_translation(Vec3::X)));
        graph.nodes.push(node("b", joint(), Some(1), Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0))));
        graph.nodes.push(node("unused", joint(), Some(0), Mat4::IDENTITY));
        graph.nodes.push(node("group", NodeKind::Transform, None, Mat4::IDENTITY));
        graph.nodes[0].children = vec![1, 3];
        graph.nodes[1].children = vec![2];
        graph.roots = vec![0, 4];

        let vertices = vec![Vertex {
            joints: [Some(2), None, None, None],
            ..Default::default()
        }];
        let joints = process_joints(&mut graph, &vertices);

        assert_eq!(joints, vec![0, 1, 2]);
        let indices: Vec<_> = (0..4).map(|i| graph.node(i).joint().unwrap().index).collect();
        assert_eq!(indices, vec![Some(0), Some(1), Some(2), None]);
        assert!(!graph.node(3).joint().unwrap().used);

        let b = graph.node(2).joint().unwrap();
        assert_eq!(b.inv_bind_mat.transform_point3(Vec3::new(2.0, 0.0, 0.0)), Vec3::ZERO);
    }

    #[test]
    fn no_skin_means_no_used_joints() {
        let mut graph = SceneGraph::default();
        graph.nodes.push(node("root", joint(), None, Mat4::IDENTITY));
        graph.roots = vec![0];
        assert!(process_joints(&mut graph, &[Vertex::default()]).is_empty());
        assert_eq!(graph.node(0).joint().unwrap().index, None);
    }
}
