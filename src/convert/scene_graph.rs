use std::collections::HashSet;

use glam::{Mat4, Vec3};

use super::animation::AnimationSampler;
use super::mesh::TriGroup;
use crate::config::ConvertConfig;
use crate::dae::{DaeCamera, DaeDocument, DaeInstance, DaeLight, DaeLightKind, DaeNode, DaeProjection, InstanceKind, UpAxis};
use crate::error::{ConvertError, ConvertResult};

pub type NodeId = usize;

/// Upper bound for node names in bytes.
pub const MAX_NAME_LEN: usize = 255;
pub const MAX_LOD_LEVEL: u32 = 4;

/// Skin joints resolved against the graph.
#[derive(Debug, Clone)]
pub struct SkinBinding {
    /// One entry per skin joint, `None` if the joint was not found.
    pub joints: Vec<Option<NodeId>>,
    pub inv_bind_mats: Vec<Mat4>,
    pub bind_shape_mat: Mat4,
}

#[derive(Debug, Clone)]
pub struct MeshData {
    pub instance: DaeInstance,
    pub geometry_id: String,
    pub skin_id: Option<String>,
    pub morph_id: Option<String>,
    pub skin: Option<SkinBinding>,
    pub tri_groups: Vec<TriGroup>,
    pub lod_level: u32,
}

#[derive(Debug, Clone, Default)]
pub struct JointData {
    /// Dense index, only assigned to used joints.
    pub index: Option<u32>,
    pub inv_bind_mat: Mat4,
    pub used: bool,
    pub dae_inv_bind_mat: Mat4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightKind {
    Directional,
    Point,
    Spot,
}

#[derive(Debug, Clone)]
pub struct LightData {
    pub kind: LightKind,
    pub color: Vec3,
    pub constant_attenuation: f32,
    pub linear_attenuation: f32,
    pub quadratic_attenuation: f32,
    /// Full cone angle in degrees.
    pub falloff_angle: f32,
    pub falloff_exponent: f32,
    pub radius: f32,
}

/// Radius used for lights without distance attenuation.
pub const UNATTENUATED_LIGHT_RADIUS: f32 = 10000.0;

impl LightData {
    fn from_dae(light: &DaeLight) -> Option<LightData> {
        let kind = match light.kind {
            DaeLightKind::Directional => LightKind::Directional,
            DaeLightKind::Point => LightKind::Point,
            DaeLightKind::Spot => LightKind::Spot,
            DaeLightKind::Ambient => return None,
        };

        let radius = match kind {
            LightKind::Directional => UNATTENUATED_LIGHT_RADIUS,
            _ => attenuation_radius(
                light.constant_attenuation,
                light.linear_attenuation,
                light.quadratic_attenuation,
            ),
        };

        Some(LightData {
            kind,
            color: light.color,
            constant_attenuation: light.constant_attenuation,
            linear_attenuation: light.linear_attenuation,
            quadratic_attenuation: light.quadratic_attenuation,
            falloff_angle: match kind {
                LightKind::Spot => light.falloff_angle,
                _ => 360.0,
            },
            falloff_exponent: light.falloff_exponent,
            radius,
        })
    }
}

/// Distance at which `1 / (c + l*d + q*d^2)` drops below 1/256.
fn attenuation_radius(constant: f32, linear: f32, quadratic: f32) -> f32 {
    const CUTOFF: f32 = 256.0;
    let radius = if quadratic > 0.0 {
        let disc = linear * linear - 4.0 * quadratic * (constant - CUTOFF);
        (-linear + disc.max(0.0).sqrt()) / (2.0 * quadratic)
    } else if linear > 0.0 {
        (CUTOFF - constant) / linear
    } else {
        UNATTENUATED_LIGHT_RADIUS
    };
    radius.clamp(0.0, UNATTENUATED_LIGHT_RADIUS)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraData {
    pub near_plane: f32,
    pub far_plane: f32,
    pub left_plane: f32,
    pub right_plane: f32,
    pub bottom_plane: f32,
    pub top_plane: f32,
}

impl CameraData {
    fn from_dae(camera: &DaeCamera) -> CameraData {
        let near = camera.znear;
        let (right, top) = match camera.projection {
            DaeProjection::Perspective { xfov, yfov, aspect_ratio } => {
                let half_tan = |fov: f32| near * (fov.to_radians() * 0.5).tan();
                match (xfov, yfov) {
                    (Some(x), Some(y)) => (half_tan(x), half_tan(y)),
                    (Some(x), None) => (half_tan(x), half_tan(x) / aspect_ratio.unwrap_or(1.0)),
                    (None, Some(y)) => (half_tan(y) * aspect_ratio.unwrap_or(1.0), half_tan(y)),
                    (None, None) => (near, near),
                }
            }
            DaeProjection::Orthographic { xmag, ymag, aspect_ratio } => match (xmag, ymag) {
                (Some(x), Some(y)) => (x, y),
                (Some(x), None) => (x, x / aspect_ratio.unwrap_or(1.0)),
                (None, Some(y)) => (y * aspect_ratio.unwrap_or(1.0), y),
                (None, None) => (1.0, 1.0),
            },
        };

        CameraData {
            near_plane: near,
            far_plane: camera.zfar,
            left_plane: -right,
            right_plane: right,
            bottom_plane: -top,
            top_plane: top,
        }
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Transform,
    Mesh(Box<MeshData>),
    Joint(JointData),
    Light(LightData),
    Camera(CameraData),
}

#[derive(Debug, Clone)]
pub struct SceneNode {
    /// Unique output name.
    pub name: String,
    pub dae_id: String,
    pub dae_sid: String,
    pub dae_name: String,
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub mat_rel: Mat4,
    pub mat_abs: Mat4,
    /// Relative transform per frame, empty without animation.
    pub frames: Vec<Mat4>,
}

impl SceneNode {
    pub fn mesh(&self) -> Option<&MeshData> {
        match &self.kind {
            NodeKind::Mesh(mesh) => Some(&**mesh),
            _ => None,
        }
    }

    pub fn joint(&self) -> Option<&JointData> {
        match &self.kind {
            NodeKind::Joint(joint) => Some(joint),
            _ => None,
        }
    }
}

/// Arena holding the converted node tree. Dropping it drops every node.
#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    pub nodes: Vec<SceneNode>,
    pub roots: Vec<NodeId>,
    /// Every name handed out so far, including sub-mesh names.
    names: HashSet<String>,
}

impl SceneGraph {
    pub fn node(&self, id: NodeId) -> &SceneNode {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut SceneNode {
        &mut self.nodes[id]
    }

    /// All nodes in depth-first pre-order, parents before children.
    pub fn depth_first(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id].children.iter().rev());
        }
        order
    }

    /// Pre-order walk of the subtree below and including `root`.
    pub fn subtree(&self, root: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id].children.iter().rev());
        }
        order
    }

    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.nodes[node].parent;
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes[id].parent;
        }
        false
    }

    /// Reserves a name that is unique in the graph by appending `_1`, `_2`, ...
    pub(crate) fn unique_name(&mut self, name: &str) -> String {
        let base = bounded_name(name, MAX_NAME_LEN);
        if self.names.insert(base.to_string()) {
            return base.to_string();
        }

        let mut counter = 1usize;
        loop {
            let suffix = format!("_{counter}");
            let candidate = format!("{}{}", bounded_name(base, MAX_NAME_LEN - suffix.len()), suffix);
            if self.names.insert(candidate.clone()) {
                log::debug!("Renamed '{}' to '{}'", name, candidate);
                return candidate;
            }
            counter += 1;
        }
    }
}

/// Cuts `name` to at most `max` bytes on a char boundary.
pub fn bounded_name(name: &str, max: usize) -> &str {
    let mut end = name.len().min(max);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Walks the visual scene and builds the [SceneGraph].
pub(crate) struct GraphBuilder<'a> {
    doc: &'a DaeDocument,
    sampler: AnimationSampler<'a>,
    graph: SceneGraph,
    node_stack: Vec<String>,
    root_correction: Mat4,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(doc: &'a DaeDocument, config: &ConvertConfig) -> Self {
        let up_axis = config.up_axis_conversion.resolve(doc.up_axis);
        let rotation = match up_axis {
            UpAxis::YUp => Mat4::IDENTITY,
            UpAxis::ZUp => Mat4::from_rotation_x(-90f32.to_radians()),
            UpAxis::XUp => Mat4::from_rotation_z(90f32.to_radians()),
        };

        Self {
            doc,
            sampler: AnimationSampler::new(&doc.animations),
            graph: SceneGraph::default(),
            node_stack: Vec::new(),
            root_correction: Mat4::from_scale(Vec3::splat(config.scale_factor)) * rotation,
        }
    }

    pub fn build(mut self) -> ConvertResult<(SceneGraph, usize)> {
        let doc = self.doc;
        if let Some(scene) = &doc.scene {
            for dae_node in &scene.nodes {
                let id = self.process_node(dae_node, None)?;
                self.graph.roots.push(id);
            }
        }

        self.bind_skins()?;
        self.sampler.report();
        Ok((self.graph, self.sampler.frame_count()))
    }

    fn process_node(&mut self, dae_node: &'a DaeNode, parent: Option<NodeId>) -> ConvertResult<NodeId> {
        let doc = self.doc;

        // Resolve instances first so invalid references abort before anything is added.
        let mut payloads = Vec::new();
        for instance in &dae_node.instances {
            if let Some(kind) = self.validate_instance(instance)? {
                payloads.push(kind);
            }
        }

        let mut payloads = payloads.into_iter();
        let kind = if dae_node.joint {
            NodeKind::Joint(JointData::default())
        } else {
            payloads.next().unwrap_or(NodeKind::Transform)
        };

        let correction = if parent.is_none() {
            self.root_correction
        } else {
            Mat4::IDENTITY
        };
        let mat_rel = correction * dae_node.assemble_matrix();
        let frames = self
            .sampler
            .node_frames(dae_node)
            .into_iter()
            .map(|frame| correction * frame)
            .collect();

        let display_name = [&dae_node.name, &dae_node.id]
            .into_iter()
            .find(|n| !n.is_empty())
            .map(String::as_str)
            .unwrap_or("Node");

        let id = self.add_node(
            SceneNode {
                name: display_name.to_string(),
                dae_id: dae_node.id.clone(),
                dae_sid: dae_node.sid.clone(),
                dae_name: dae_node.name.clone(),
                kind,
                parent,
                children: Vec::new(),
                mat_rel,
                mat_abs: Mat4::IDENTITY,
                frames,
            },
            parent,
        );

        // Remaining instances hang below the node with an identity transform.
        for kind in payloads {
            let frame_count = self.sampler.frame_count();
            self.add_node(
                SceneNode {
                    name: display_name.to_string(),
                    dae_id: String::new(),
                    dae_sid: String::new(),
                    dae_name: String::new(),
                    kind,
                    parent: Some(id),
                    children: Vec::new(),
                    mat_rel: Mat4::IDENTITY,
                    mat_abs: Mat4::IDENTITY,
                    frames: vec![Mat4::IDENTITY; frame_count],
                },
                Some(id),
            );
        }

        let pushed = !dae_node.id.is_empty();
        if pushed {
            self.node_stack.push(dae_node.id.clone());
        }

        for child in &dae_node.children {
            self.process_node(child, Some(id))?;
        }

        for reference in &dae_node.node_references {
            if self.node_stack.contains(reference) {
                return Err(ConvertError::CyclicInstance(reference.clone()));
            }
            match doc.find_library_node(reference) {
                Some(library_node) => {
                    self.process_node(library_node, Some(id))?;
                }
                None => log::warn!("instance_node target '{}' not found", reference),
            }
        }

        if pushed {
            self.node_stack.pop();
        }

        Ok(id)
    }

    fn add_node(&mut self, mut node: SceneNode, parent: Option<NodeId>) -> NodeId {
        node.name = self.graph.unique_name(&node.name);
        node.mat_abs = match parent {
            Some(parent) => self.graph.nodes[parent].mat_abs * node.mat_rel,
            None => node.mat_rel,
        };
        if let NodeKind::Mesh(mesh) = &mut node.kind {
            mesh.lod_level = lod_level_from_name(&node.name);
        }

        let id = self.graph.nodes.len();
        self.graph.nodes.push(node);
        if let Some(parent) = parent {
            self.graph.nodes[parent].children.push(id);
        }
        id
    }

    /// Checks that the target of an instance exists.
    ///
    /// Returns `None` for instances that are skipped.
    fn validate_instance(&self, instance: &DaeInstance) -> ConvertResult<Option<NodeKind>> {
        let doc = self.doc;
        match instance.kind {
            InstanceKind::Geometry | InstanceKind::Controller => {
                let mesh = self.resolve_mesh_source(instance)?;
                let has_triangles = doc
                    .find_geometry(&mesh.geometry_id)
                    .is_some_and(|g| g.tri_groups.iter().any(|t| t.triangle_count() > 0));
                if has_triangles {
                    Ok(Some(NodeKind::Mesh(Box::new(mesh))))
                } else {
                    log::warn!("Geometry '{}' has no triangles and is ignored", mesh.geometry_id);
                    Ok(None)
                }
            }
            InstanceKind::Light => match doc.lights.find_light(&instance.url) {
                Some(light) => match LightData::from_dae(light) {
                    Some(data) => Ok(Some(NodeKind::Light(data))),
                    None => {
                        log::info!("Ambient light '{}' is not converted", instance.url);
                        Ok(None)
                    }
                },
                None => {
                    log::warn!("Light '{}' not found", instance.url);
                    Ok(None)
                }
            },
            InstanceKind::Camera => match doc.cameras.find_camera(&instance.url) {
                Some(camera) => Ok(Some(NodeKind::Camera(CameraData::from_dae(camera)))),
                None => {
                    log::warn!("Camera '{}' not found", instance.url);
                    Ok(None)
                }
            },
        }
    }

    /// Follows skin and morph controllers down to the geometry.
    fn resolve_mesh_source(&self, instance: &DaeInstance) -> ConvertResult<MeshData> {
        let doc = self.doc;
        let mut mesh = MeshData {
            instance: instance.clone(),
            geometry_id: String::new(),
            skin_id: None,
            morph_id: None,
            skin: None,
            tri_groups: Vec::new(),
            lod_level: 0,
        };

        if instance.kind == InstanceKind::Geometry {
            if doc.find_geometry(&instance.url).is_none() {
                return Err(ConvertError::MissingInstanceTarget(instance.url.clone()));
            }
            mesh.geometry_id = instance.url.clone();
            return Ok(mesh);
        }

        let mut visited: Vec<&str> = Vec::new();
        let mut current = instance.url.as_str();
        loop {
            if doc.find_geometry(current).is_some() {
                mesh.geometry_id = current.to_string();
                return Ok(mesh);
            }
            if visited.contains(&current) {
                return Err(ConvertError::CyclicController(current.to_string()));
            }
            visited.push(current);

            if let Some(skin) = doc.controllers.find_skin(current) {
                if mesh.skin_id.is_none() {
                    mesh.skin_id = Some(skin.id.clone());
                } else {
                    log::warn!("Nested skin '{}' is ignored", skin.id);
                }
                current = &skin.owner_id;
            } else if let Some(morph) = doc.controllers.find_morph(current) {
                if mesh.morph_id.is_none() {
                    mesh.morph_id = Some(morph.id.clone());
                } else {
                    log::warn!("Nested morph '{}' is ignored", morph.id);
                }
                current = &morph.owner_id;
            } else {
                return Err(ConvertError::MissingInstanceTarget(current.to_string()));
            }
        }
    }

    /// Resolves skin joints once the whole graph exists.
    fn bind_skins(&mut self) -> ConvertResult<()> {
        let doc = self.doc;
        let mesh_nodes: Vec<NodeId> = self
            .graph
            .depth_first()
            .into_iter()
            .filter(|&id| self.graph.nodes[id].mesh().is_some_and(|m| m.skin_id.is_some()))
            .collect();

        for mesh_id in mesh_nodes {
            let Some(mesh) = self.graph.nodes[mesh_id].mesh() else { continue };
            let Some(skin) = mesh.skin_id.as_deref().and_then(|id| doc.controllers.find_skin(id)) else {
                continue;
            };

            let search_roots: Vec<NodeId> = mesh
                .instance
                .skeletons
                .iter()
                .filter_map(|root| self.graph.nodes.iter().position(|n| &n.dae_id == root))
                .collect();

            let mut joints = Vec::with_capacity(skin.joint_names.len());
            for (joint_name, inv_bind_mat) in skin.joint_names.iter().zip(&skin.inv_bind_mats) {
                let found = self.find_joint(joint_name, &search_roots);
                match found {
                    Some(joint_id) => {
                        if self.graph.is_ancestor(joint_id, mesh_id) {
                            return Err(ConvertError::SkinBindsAncestor {
                                mesh: self.graph.nodes[mesh_id].name.clone(),
                                joint: joint_name.clone(),
                            });
                        }
                        let node = &mut self.graph.nodes[joint_id];
                        if matches!(node.kind, NodeKind::Transform) {
                            log::debug!("Node '{}' is used as a joint", node.name);
                            node.kind = NodeKind::Joint(JointData::default());
                        }
                        if let NodeKind::Joint(joint) = &mut node.kind {
                            joint.dae_inv_bind_mat = *inv_bind_mat;
                        }
                    }
                    None => log::warn!(
                        "Joint '{}' of skin '{}' not found, its influences are dropped",
                        joint_name,
                        skin.id
                    ),
                }
                joints.push(found);
            }

            if let NodeKind::Mesh(mesh) = &mut self.graph.nodes[mesh_id].kind {
                mesh.skin = Some(SkinBinding {
                    joints,
                    inv_bind_mats: skin.inv_bind_mats.clone(),
                    bind_shape_mat: skin.bind_shape_mat,
                });
            }
        }

        Ok(())
    }

    /// Searches joints by sid, then id, then name.
    fn find_joint(&self, name: &str, roots: &[NodeId]) -> Option<NodeId> {
        let candidates: Vec<NodeId> = if roots.is_empty() {
            self.graph.depth_first()
        } else {
            roots.iter().flat_map(|&r| self.graph.subtree(r)).collect()
        };
        let usable = |id: &&NodeId| {
            matches!(self.graph.nodes[**id].kind, NodeKind::Joint(_) | NodeKind::Transform)
        };

        let lookup = |key: fn(&SceneNode) -> &str| {
            candidates
                .iter()
                .filter(usable)
                .find(|&&id| key(&self.graph.nodes[id]) == name)
                .copied()
        };

        lookup(|n| n.dae_sid.as_str())
            .or_else(|| lookup(|n| n.dae_id.as_str()))
            .or_else(|| lookup(|n| n.dae_name.as_str()))
            .or_else(|| {
                // Skeleton roots may be wrong, fall back to the whole graph.
                (!roots.is_empty()).then(|| self.find_joint(name, &[])).flatten()
            })
    }
}

/// `_lod1` to `_lod4` suffixes select the level of detail.
fn lod_level_from_name(name: &str) -> u32 {
    let lower = name.to_ascii_lowercase();
    (1..=MAX_LOD_LEVEL)
        .find(|level| lower.ends_with(&format!("_lod{level}")))
        .unwrap_or(0)
}
