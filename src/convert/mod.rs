//! Conversion of a parsed document into the runtime scene graph, vertex
//! buffers, joints, morph targets and animation frames.
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config::ConvertConfig;
use crate::dae::DaeDocument;
use crate::error::{ConvertError, ConvertResult};
use crate::export;

mod animation;
pub mod mesh;
pub mod morph;
mod optimize;
pub mod scene_graph;
mod skeleton;

pub use mesh::{TriGroup, Vertex, MAX_INFLUENCES};
pub use morph::{MorphDiff, MorphTarget};
pub use skeleton::MAX_JOINTS;
pub use scene_graph::{CameraData, JointData, LightData, LightKind, MeshData, NodeId, NodeKind, SceneGraph, SceneNode};

/// Converts one document. Create one converter per document.
pub struct Converter<'a> {
    doc: &'a DaeDocument,
    config: ConvertConfig,
    graph: SceneGraph,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    morph_targets: Vec<MorphTarget>,
    joints: Vec<NodeId>,
    frame_count: usize,
    max_lod_level: u32,
    converted: bool,
}

impl<'a> Converter<'a> {
    pub fn new(doc: &'a DaeDocument, config: ConvertConfig) -> Self {
        Self {
            doc,
            config,
            graph: SceneGraph::default(),
            vertices: Vec::new(),
            indices: Vec::new(),
            morph_targets: Vec::new(),
            joints: Vec::new(),
            frame_count: 0,
            max_lod_level: 0,
            converted: false,
        }
    }

    /// Builds the scene graph and all mesh, joint and morph data.
    ///
    /// On failure the converter holds no partial results.
    pub fn convert_model(&mut self, optimize: bool) -> ConvertResult<()> {
        self.reset();
        let result = self.run_pipeline(optimize);
        if result.is_err() {
            self.reset();
        }
        result
    }

    fn reset(&mut self) {
        self.graph = SceneGraph::default();
        self.vertices.clear();
        self.indices.clear();
        self.morph_targets.clear();
        self.joints.clear();
        self.frame_count = 0;
        self.max_lod_level = 0;
        self.converted = false;
    }

    fn run_pipeline(&mut self, optimize: bool) -> ConvertResult<()> {
        self.config.validate()?;

        let (graph, frame_count) = scene_graph::GraphBuilder::new(self.doc, &self.config).build()?;
        self.graph = graph;
        self.frame_count = frame_count;

        self.process_meshes(optimize);
        self.joints = skeleton::process_joints(&mut self.graph, &self.vertices);
        if self.joints.len() > MAX_JOINTS {
            return Err(ConvertError::TooManyJoints(self.joints.len()));
        }
        self.converted = true;

        log::info!(
            "Converted {} nodes: {} vertices, {} indices, {} tri groups, {} morph targets, {} frames",
            self.graph.nodes.len(),
            self.vertex_count(),
            self.index_count(),
            self.tri_group_count(),
            self.morph_targets.len(),
            self.frame_count
        );
        Ok(())
    }

    fn process_meshes(&mut self, optimize: bool) {
        let doc = self.doc;
        for id in self.graph.depth_first() {
            let Some(lod_level) = self.graph.node(id).mesh().map(|m| m.lod_level) else {
                continue;
            };

            let mut tri_groups = mesh::build_tri_groups(doc, &self.graph, id, &mut self.vertices, &mut self.indices);
            // Further materials are written as child meshes with names of their own.
            let node_name = self.graph.node(id).name.clone();
            for group in tri_groups.iter_mut().skip(1) {
                group.name = self.graph.unique_name(&node_name);
            }
            if let NodeKind::Mesh(mesh) = &mut self.graph.node_mut(id).kind {
                mesh.tri_groups = tri_groups;
            }

            morph::process_morph_targets(
                doc,
                &self.graph,
                id,
                &self.vertices,
                &self.indices,
                &mut self.morph_targets,
            );

            if optimize {
                if let NodeKind::Mesh(mesh) = &mut self.graph.node_mut(id).kind {
                    for group in &mut mesh.tri_groups {
                        let remap = optimize::optimize_tri_group(group, &mut self.vertices, &mut self.indices);
                        morph::remap_diffs(&mut self.morph_targets, group.vert_r_start, &remap);
                    }
                }
            }

            self.max_lod_level = self.max_lod_level.max(lod_level);
        }
    }

    pub fn has_animation(&self) -> bool {
        self.graph.nodes.iter().any(|n| !n.frames.is_empty())
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn morph_targets(&self) -> &[MorphTarget] {
        &self.morph_targets
    }

    /// Used joints ordered by their index.
    pub fn joints(&self) -> &[NodeId] {
        &self.joints
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn max_lod_level(&self) -> u32 {
        self.max_lod_level
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn tri_group_count(&self) -> usize {
        self.graph
            .nodes
            .iter()
            .filter_map(|n| n.mesh())
            .map(|m| m.tri_groups.len())
            .sum()
    }

    pub fn lod_distances(&self) -> [f32; 4] {
        self.config.lod_distances
    }

    fn asset_directory(&self, asset_path: &str) -> ConvertResult<PathBuf> {
        if !self.converted {
            return Err(ConvertError::NotConverted);
        }
        let directory = self.config.output_directory.join(asset_path);
        std::fs::create_dir_all(&directory)?;
        Ok(directory)
    }

    /// Writes the geometry and the scene graph file. Returns their paths.
    pub fn write_model(&self, asset_path: &str, asset_name: &str, model_name: &str) -> ConvertResult<(PathBuf, PathBuf)> {
        let directory = self.asset_directory(asset_path)?;

        let geometry_path = directory.join(format!("{asset_name}.geo"));
        export::write_file(&geometry_path, &export::geometry::geometry_bytes(self)?)?;

        let scene_path = directory.join(format!("{asset_name}.scene.xml"));
        let scene = export::scene::scene_xml(self, asset_path, asset_name, model_name);
        export::write_file(&scene_path, &export::xml_bytes(&scene)?)?;

        Ok((geometry_path, scene_path))
    }

    /// Writes one material file per referenced material. Existing files are
    /// only overwritten with `replace`. Returns the written paths.
    pub fn write_materials(&self, asset_path: &str, model_name: &str, replace: bool) -> ConvertResult<Vec<PathBuf>> {
        let directory = self.asset_directory(asset_path)?;
        export::material::write_materials(self, self.doc, &directory, asset_path, model_name, replace)
    }

    pub fn write_animation(&self, asset_path: &str, asset_name: &str) -> ConvertResult<PathBuf> {
        let directory = self.asset_directory(asset_path)?;
        let path = directory.join(format!("{asset_name}.anim"));
        export::write_file(&path, &export::animation::animation_bytes(self)?)?;
        Ok(path)
    }
}

/// Files produced by [convert_dae_file].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertedFiles {
    pub geometry_path: PathBuf,
    pub scene_path: PathBuf,
    pub material_paths: Vec<PathBuf>,
    pub animation_path: Option<PathBuf>,
}

/// Parses, converts and writes all outputs of one COLLADA file.
pub fn convert_dae_file(dae_file_path: &Path, config: &ConvertConfig) -> anyhow::Result<ConvertedFiles> {
    let doc = DaeDocument::parse_file(dae_file_path)?;

    let asset_name = if config.asset_name.is_empty() {
        dae_file_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string())
    } else {
        config.asset_name.clone()
    };

    let mut converter = Converter::new(&doc, config.clone());
    converter
        .convert_model(config.optimize)
        .with_context(|| format!("Failed to convert {}", dae_file_path.display()))?;

    let (geometry_path, scene_path) = converter
        .write_model(&config.asset_path, &asset_name, &config.model_name)
        .context("Failed to write model")?;
    let material_paths = converter
        .write_materials(&config.asset_path, &config.model_name, config.replace_materials)
        .context("Failed to write materials")?;
    let animation_path = if converter.has_animation() {
        Some(
            converter
                .write_animation(&config.asset_path, &asset_name)
                .context("Failed to write animation")?,
        )
    } else {
        None
    };

    Ok(ConvertedFiles {
        geometry_path,
        scene_path,
        material_paths,
        animation_path,
    })
}
