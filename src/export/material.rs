//! Material XML files, one per distinct material used by a mesh.
use std::path::{Path, PathBuf};

use xmltree::{Element, XMLNode};

use super::{format_float, resource_path, write_file, xml_bytes};
use crate::convert::Converter;
use crate::dae::{DaeDocument, DaeEffect};
use crate::error::ConvertResult;

pub const DEFAULT_SHADER: &str = "shaders/model.shader";
pub const SKINNING_FLAG: &str = "_F01_Skinning";

/// File name of a material, prefixed with `model_name`.
pub fn material_file_name(model_name: &str, mat_name: &str) -> String {
    let name: String = format!("{model_name}{mat_name}")
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect();
    format!("{name}.material.xml")
}

/// A material as referenced by the converted meshes.
#[derive(Debug, Clone, PartialEq, Eq)]
struct UsedMaterial {
    name: String,
    skinned: bool,
}

/// Distinct materials in depth-first order of the meshes using them.
fn used_materials(converter: &Converter) -> Vec<UsedMaterial> {
    let graph = converter.graph();
    let mut materials: Vec<UsedMaterial> = Vec::new();

    for id in graph.depth_first() {
        let Some(mesh) = graph.node(id).mesh() else { continue };
        let skinned = mesh.skin.is_some();
        for group in &mesh.tri_groups {
            match materials.iter_mut().find(|m| m.name == group.mat_name) {
                Some(existing) => existing.skinned |= skinned,
                None => materials.push(UsedMaterial {
                    name: group.mat_name.clone(),
                    skinned,
                }),
            }
        }
    }
    materials
}

fn find_effect<'a>(doc: &'a DaeDocument, mat_name: &str) -> Option<&'a DaeEffect> {
    doc.materials
        .iter()
        .find(|m| m.display_name() == mat_name || m.id == mat_name)
        .and_then(|m| doc.find_effect(&m.effect_id))
}

fn material_xml(doc: &DaeDocument, material: &UsedMaterial, asset_path: &str) -> Element {
    let mut root = Element::new("Material");

    let mut shader = Element::new("Shader");
    shader.attributes.insert("source".to_string(), DEFAULT_SHADER.to_string());
    root.children.push(XMLNode::Element(shader));

    if material.skinned {
        let mut flag = Element::new("ShaderFlag");
        flag.attributes.insert("name".to_string(), SKINNING_FLAG.to_string());
        root.children.push(XMLNode::Element(flag));
    }

    let effect = find_effect(doc, &material.name);
    if effect.is_none() {
        log::debug!("Material '{}' has no effect, using defaults", material.name);
    }

    let texture = effect
        .and_then(|e| e.diffuse_texture.as_deref())
        .and_then(|image_id| match doc.find_image(image_id) {
            Some(image) => Some(image.file_name.as_str()),
            None => {
                log::warn!("Texture image '{}' of material '{}' not found", image_id, material.name);
                None
            }
        });
    if let Some(file_name) = texture {
        let mut sampler = Element::new("Sampler");
        sampler.attributes.insert("name".to_string(), "albedoMap".to_string());
        sampler.attributes.insert("map".to_string(), resource_path(asset_path, file_name));
        root.children.push(XMLNode::Element(sampler));
    }

    let color = effect.and_then(|e| e.diffuse_color).unwrap_or(glam::Vec4::ONE);
    let mut uniform = Element::new("Uniform");
    uniform.attributes.insert("name".to_string(), "matDiffuseCol".to_string());
    for (attribute, value) in ["a", "b", "c", "d"].into_iter().zip(color.to_array()) {
        uniform.attributes.insert(attribute.to_string(), format_float(value));
    }
    root.children.push(XMLNode::Element(uniform));

    root
}

/// Writes the material files into `directory`. Files that already exist are
/// kept unless `replace` is set.
pub fn write_materials(
    converter: &Converter,
    doc: &DaeDocument,
    directory: &Path,
    asset_path: &str,
    model_name: &str,
    replace: bool,
) -> ConvertResult<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for material in used_materials(converter) {
        let path = directory.join(material_file_name(model_name, &material.name));
        if !replace && path.exists() {
            log::info!("Keeping existing material {}", path.display());
            continue;
        }

        let element = material_xml(doc, &material, asset_path);
        write_file(&path, &xml_bytes(&element)?)?;
        paths.push(path);
    }
    Ok(paths)
}
