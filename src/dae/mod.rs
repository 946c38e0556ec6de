//! Owned, already resolved view of a COLLADA 1.4 document.
//!
//! Parsing never fails on a single bad library entry. Malformed entries are
//! logged and dropped so the rest of the document stays usable.
use std::path::Path;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use xmltree::Element;

mod animation;
mod cameras;
mod controllers;
mod geometry;
mod lights;
mod materials;
mod scene;
pub(crate) mod xml;

pub use animation::{DaeChannel, DaeLibAnimations, DaeSampler, DaeSelector, Interpolation};
pub use cameras::{DaeCamera, DaeLibCameras, DaeProjection};
pub use controllers::{DaeLibControllers, DaeMorph, DaeSkin, DaeWeight};
pub use geometry::{DaeGeometry, DaeTriGroup, DaeVertexRef, MAX_TEX_COORD_SETS};
pub use lights::{DaeLibLights, DaeLight, DaeLightKind};
pub use materials::{DaeEffect, DaeImage, DaeMaterial};
pub use scene::{DaeInstance, DaeNode, DaeTransformation, DaeVisualScene, InstanceKind, MaterialBinding, TransformKind};

use xml::{find_path, get_element_text};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UpAxis {
    XUp,
    #[default]
    YUp,
    ZUp,
}

#[derive(Debug, Clone, Default)]
pub struct DaeDocument {
    pub up_axis: UpAxis,
    pub images: Vec<DaeImage>,
    pub effects: Vec<DaeEffect>,
    pub materials: Vec<DaeMaterial>,
    pub geometries: Vec<DaeGeometry>,
    pub controllers: DaeLibControllers,
    pub lights: DaeLibLights,
    pub cameras: DaeLibCameras,
    pub library_nodes: Vec<DaeNode>,
    pub animations: DaeLibAnimations,
    pub scene: Option<DaeVisualScene>,
}

impl DaeDocument {
    pub fn parse_file<P: AsRef<Path>>(path: P) -> anyhow::Result<DaeDocument> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        DaeDocument::parse_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn parse_str(text: &str) -> anyhow::Result<DaeDocument> {
        let root = Element::parse(text.as_bytes())?;
        if root.name != "COLLADA" {
            return Err(anyhow!("Root element is <{}>, expected <COLLADA>", root.name));
        }
        Ok(DaeDocument::from_root(&root))
    }

    fn from_root(root: &Element) -> DaeDocument {
        let up_axis = match find_path(root, &["asset", "up_axis"])
            .and_then(get_element_text)
            .as_deref()
            .map(str::trim)
        {
            Some("Z_UP") => UpAxis::ZUp,
            Some("X_UP") => UpAxis::XUp,
            _ => UpAxis::YUp,
        };

        let scene = scene::parse_visual_scene(root);
        if scene.is_none() {
            log::warn!("Document has no visual scene");
        }

        DaeDocument {
            up_axis,
            images: materials::parse_images(root),
            effects: materials::parse_effects(root),
            materials: materials::parse_materials(root),
            geometries: geometry::parse_geometries(root),
            controllers: DaeLibControllers::parse(root),
            lights: DaeLibLights::parse(root),
            cameras: DaeLibCameras::parse(root),
            library_nodes: scene::parse_library_nodes(root),
            animations: DaeLibAnimations::parse(root),
            scene,
        }
    }

    pub fn find_geometry(&self, id: &str) -> Option<&DaeGeometry> {
        self.geometries.iter().find(|g| !id.is_empty() && g.id == id)
    }

    pub fn find_material(&self, id: &str) -> Option<&DaeMaterial> {
        self.materials.iter().find(|m| !id.is_empty() && m.id == id)
    }

    pub fn find_effect(&self, id: &str) -> Option<&DaeEffect> {
        self.effects.iter().find(|e| !id.is_empty() && e.id == id)
    }

    pub fn find_image(&self, id: &str) -> Option<&DaeImage> {
        self.images.iter().find(|i| !id.is_empty() && i.id == id)
    }

    /// Searches `library_nodes` including nested children.
    pub fn find_library_node(&self, id: &str) -> Option<&DaeNode> {
        if id.is_empty() {
            return None;
        }
        self.library_nodes.iter().find_map(|n| n.find_by_id(id))
    }
}
