use std::collections::HashMap;

use glam::Vec4;
use xmltree::Element;

use super::xml::{attr, attr_or_empty, child_elements, child_float, element_floats, find_all_children, find_child, find_path, get_element_text, url_target};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaeImage {
    pub id: String,
    pub file_name: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DaeEffect {
    pub id: String,
    pub diffuse_color: Option<Vec4>,
    /// Image id of the diffuse texture.
    pub diffuse_texture: Option<String>,
    pub specular_color: Option<Vec4>,
    pub shininess: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaeMaterial {
    pub id: String,
    pub name: String,
    pub effect_id: String,
}

impl DaeMaterial {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

pub(crate) fn parse_images(root: &Element) -> Vec<DaeImage> {
    find_all_children(root, "library_images")
        .into_iter()
        .flat_map(|lib| find_all_children(lib, "image"))
        .filter_map(|image| {
            let id = attr(image, "id")?.to_string();
            let init_from = find_child(image, "init_from")?;
            // COLLADA 1.5 nests the path in <ref>
            let path = find_child(init_from, "ref")
                .and_then(get_element_text)
                .or_else(|| get_element_text(init_from))?;
            Some(DaeImage {
                id,
                file_name: clean_image_path(path.trim()),
            })
        })
        .collect()
}

/// Reduces `file:///C:/textures/wood.png` style URIs to the bare file name.
fn clean_image_path(path: &str) -> String {
    let path = path.replace("%20", " ");
    path.rsplit(['/', '\\'])
        .next()
        .unwrap_or(path.as_str())
        .to_string()
}

pub(crate) fn parse_materials(root: &Element) -> Vec<DaeMaterial> {
    find_all_children(root, "library_materials")
        .into_iter()
        .flat_map(|lib| find_all_children(lib, "material"))
        .filter_map(|material| {
            Some(DaeMaterial {
                id: attr(material, "id")?.to_string(),
                name: attr_or_empty(material, "name"),
                effect_id: find_child(material, "instance_effect")
                    .and_then(|e| attr(e, "url"))
                    .map(|url| url_target(url).to_string())
                    .unwrap_or_default(),
            })
        })
        .collect()
}

pub(crate) fn parse_effects(root: &Element) -> Vec<DaeEffect> {
    find_all_children(root, "library_effects")
        .into_iter()
        .flat_map(|lib| find_all_children(lib, "effect"))
        .filter_map(parse_effect)
        .collect()
}

fn parse_effect(effect: &Element) -> Option<DaeEffect> {
    let id = attr(effect, "id")?.to_string();
    let mut result = DaeEffect {
        id,
        ..Default::default()
    };

    let Some(profile) = find_child(effect, "profile_COMMON") else {
        log::debug!("Effect '{}' has no profile_COMMON", result.id);
        return Some(result);
    };

    // newparam sid -> surface image id, sampler sid -> surface sid
    let mut surfaces = HashMap::new();
    let mut samplers = HashMap::new();
    for param in find_all_children(profile, "newparam") {
        let Some(sid) = attr(param, "sid") else { continue };
        if let Some(image) = find_path(param, &["surface", "init_from"]).and_then(get_element_text) {
            surfaces.insert(sid.to_string(), image.trim().to_string());
        } else if let Some(source) = find_path(param, &["sampler2D", "source"]).and_then(get_element_text) {
            samplers.insert(sid.to_string(), source.trim().to_string());
        }
    }

    let Some(shading) = find_child(profile, "technique").and_then(|t| child_elements(t).find(|c| {
        matches!(c.name.as_str(), "phong" | "blinn" | "lambert" | "constant")
    })) else {
        return Some(result);
    };

    if let Some(diffuse) = find_child(shading, "diffuse") {
        if let Some(color) = find_child(diffuse, "color") {
            result.diffuse_color = vec4(&element_floats(color));
        }
        if let Some(texture) = find_child(diffuse, "texture").and_then(|t| attr(t, "texture")) {
            let surface = samplers.get(texture).map(String::as_str).unwrap_or(texture);
            let image = surfaces.get(surface).map(String::as_str).unwrap_or(surface);
            result.diffuse_texture = Some(image.to_string());
        }
    }
    result.specular_color = find_path(shading, &["specular", "color"])
        .and_then(|c| vec4(&element_floats(c)));
    result.shininess = find_child(shading, "shininess").and_then(|s| child_float(s, "float"));

    Some(result)
}

fn vec4(values: &[f32]) -> Option<Vec4> {
    match values {
        [r, g, b, a, ..] => Some(Vec4::new(*r, *g, *b, *a)),
        [r, g, b] => Some(Vec4::new(*r, *g, *b, 1.0)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(text: &str) -> Element {
        Element::parse(format!("<COLLADA>{text}</COLLADA>").as_bytes()).unwrap()
    }

    #[test]
    fn diffuse_texture_through_sampler_chain() {
        let root = root(
            r##"<library_images><image id="wood-img"><init_from>file:///C:/art/tex/wood%20dark.png</init_from></image></library_images>
            <library_effects><effect id="wood-fx"><profile_COMMON>
                <newparam sid="surf"><surface type="2D"><init_from>wood-img</init_from></surface></newparam>
                <newparam sid="samp"><sampler2D><source>surf</source></sampler2D></newparam>
                <technique sid="common"><phong>
                    <diffuse><texture texture="samp" texcoord="UVMap"/></diffuse>
                    <specular><color>0.5 0.5 0.5 1</color></specular>
                    <shininess><float>20</float></shininess>
                </phong></technique>
            </profile_COMMON></effect></library_effects>
            <library_materials><material id="wood-mat" name="Wood"><instance_effect url="#wood-fx"/></material></library_materials>"##,
        );

        let images = parse_images(&root);
        assert_eq!(images[0].file_name, "wood dark.png");

        let effects = parse_effects(&root);
        assert_eq!(effects[0].diffuse_texture.as_deref(), Some("wood-img"));
        assert_eq!(effects[0].shininess, Some(20.0));

        let materials = parse_materials(&root);
        assert_eq!(materials[0].effect_id, "wood-fx");
        assert_eq!(materials[0].display_name(), "Wood");
    }

    #[test]
    fn diffuse_color_without_alpha() {
        let root = root(
            r#"<library_effects><effect id="red"><profile_COMMON><technique sid="t"><lambert>
                <diffuse><color>1 0 0</color></diffuse>
            </lambert></technique></profile_COMMON></effect></library_effects>"#,
        );
        let effects = parse_effects(&root);
        assert_eq!(effects[0].diffuse_color, Some(Vec4::new(1.0, 0.0, 0.0, 1.0)));
        assert!(effects[0].diffuse_texture.is_none());
    }
}
