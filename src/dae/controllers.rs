use std::collections::HashMap;

use glam::Mat4;
use xmltree::Element;

use super::xml::{attr, element_floats, element_ints, find_all_children, find_child, get_element_text, mat4_from_row_major, url_target};

/// One (joint, weight) pair of a skin. `joint` indexes `DaeSkin::joint_names`;
/// negative values refer to the bind shape itself and carry no joint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DaeWeight {
    pub joint: i64,
    pub weight: f32,
}

#[derive(Debug, Clone)]
pub struct DaeSkin {
    pub id: String,
    /// Geometry or morph controller the skin deforms.
    pub owner_id: String,
    pub bind_shape_mat: Mat4,
    pub joint_names: Vec<String>,
    /// `IDREF_array` joints name node ids, `Name_array` joints name sids.
    pub joints_are_ids: bool,
    pub inv_bind_mats: Vec<Mat4>,
    /// Influences per source position.
    pub vertex_weights: Vec<Vec<DaeWeight>>,
}

#[derive(Debug, Clone)]
pub struct DaeMorph {
    pub id: String,
    pub owner_id: String,
    pub targets: Vec<String>,
    pub weights: Vec<f32>,
    /// `RELATIVE` targets store offsets instead of absolute shapes.
    pub relative: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DaeLibControllers {
    pub skins: Vec<DaeSkin>,
    pub morphs: Vec<DaeMorph>,
}

impl DaeLibControllers {
    pub fn find_skin(&self, id: &str) -> Option<&DaeSkin> {
        if id.is_empty() {
            return None;
        }
        self.skins.iter().find(|s| s.id == id)
    }

    pub fn find_morph(&self, id: &str) -> Option<&DaeMorph> {
        if id.is_empty() {
            return None;
        }
        self.morphs.iter().find(|m| m.id == id)
    }

    pub(crate) fn parse(root: &Element) -> DaeLibControllers {
        let mut lib = DaeLibControllers::default();
        let controllers = find_all_children(root, "library_controllers")
            .into_iter()
            .flat_map(|library| find_all_children(library, "controller"));
        for controller in controllers {
            let Some(id) = attr(controller, "id") else {
                log::warn!("Skipping <controller> without id");
                continue;
            };

            if let Some(skin) = find_child(controller, "skin") {
                match parse_skin(id, skin) {
                    Some(skin) => lib.skins.push(skin),
                    None => log::warn!("Skin controller '{}' is malformed and is dropped", id),
                }
            } else if let Some(morph) = find_child(controller, "morph") {
                match parse_morph(id, morph) {
                    Some(morph) => lib.morphs.push(morph),
                    None => log::warn!("Morph controller '{}' is malformed and is dropped", id),
                }
            }
        }

        lib
    }
}

enum SourceData {
    Floats(Vec<f32>),
    Names { names: Vec<String>, ids: bool },
}

fn parse_sources(element: &Element) -> HashMap<String, SourceData> {
    let mut sources = HashMap::new();
    for source in find_all_children(element, "source") {
        let Some(id) = attr(source, "id") else { continue };
        let data = if let Some(floats) = find_child(source, "float_array") {
            SourceData::Floats(element_floats(floats))
        } else if let Some(names) = find_child(source, "Name_array") {
            SourceData::Names {
                names: split_names(names),
                ids: false,
            }
        } else if let Some(names) = find_child(source, "IDREF_array") {
            SourceData::Names {
                names: split_names(names),
                ids: true,
            }
        } else {
            continue;
        };
        sources.insert(id.to_string(), data);
    }
    sources
}

fn split_names(element: &Element) -> Vec<String> {
    get_element_text(element)
        .map(|text| text.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

fn input_source<'a>(element: &'a Element, semantic: &str) -> Option<&'a str> {
    find_all_children(element, "input")
        .into_iter()
        .find(|i| attr(i, "semantic") == Some(semantic))
        .and_then(|i| attr(i, "source"))
        .map(url_target)
}

fn input_offset(element: &Element, semantic: &str) -> Option<usize> {
    find_all_children(element, "input")
        .into_iter()
        .find(|i| attr(i, "semantic") == Some(semantic))
        .map(|i| attr(i, "offset").and_then(|o| o.parse().ok()).unwrap_or(0))
}

fn parse_skin(id: &str, skin: &Element) -> Option<DaeSkin> {
    let owner_id = url_target(attr(skin, "source")?).to_string();
    let sources = parse_sources(skin);

    let bind_shape_mat = find_child(skin, "bind_shape_matrix")
        .map(element_floats)
        .and_then(|values| mat4_from_row_major(&values))
        .unwrap_or(Mat4::IDENTITY);

    let joints_elem = find_child(skin, "joints")?;
    let (joint_names, joints_are_ids) = match sources.get(input_source(joints_elem, "JOINT")?)? {
        SourceData::Names { names, ids } => (names.clone(), *ids),
        SourceData::Floats(_) => return None,
    };
    let inv_bind_mats: Vec<Mat4> = match input_source(joints_elem, "INV_BIND_MATRIX").and_then(|s| sources.get(s)) {
        Some(SourceData::Floats(values)) => values
            .chunks_exact(16)
            .filter_map(mat4_from_row_major)
            .collect(),
        _ => vec![Mat4::IDENTITY; joint_names.len()],
    };
    if inv_bind_mats.len() != joint_names.len() {
        log::warn!(
            "Skin '{}': {} joints but {} inverse bind matrices",
            id,
            joint_names.len(),
            inv_bind_mats.len()
        );
        return None;
    }

    let weights_elem = find_child(skin, "vertex_weights")?;
    let joint_offset = input_offset(weights_elem, "JOINT")?;
    let weight_offset = input_offset(weights_elem, "WEIGHT")?;
    let weight_values = match input_source(weights_elem, "WEIGHT").and_then(|s| sources.get(s)) {
        Some(SourceData::Floats(values)) => values.as_slice(),
        _ => return None,
    };
    let stride = find_all_children(weights_elem, "input").len().max(joint_offset.max(weight_offset) + 1);
    let vcount = find_child(weights_elem, "vcount").map(element_ints).unwrap_or_default();
    let v = find_child(weights_elem, "v").map(element_ints).unwrap_or_default();

    let mut vertex_weights = Vec::with_capacity(vcount.len());
    let mut cursor = 0usize;
    for count in vcount {
        let mut influences = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count.max(0) {
            let tuple = v.get(cursor..cursor + stride)?;
            let weight = usize::try_from(tuple[weight_offset])
                .ok()
                .and_then(|i| weight_values.get(i))
                .copied()?;
            influences.push(DaeWeight {
                joint: tuple[joint_offset],
                weight,
            });
            cursor += stride;
        }
        vertex_weights.push(influences);
    }

    Some(DaeSkin {
        id: id.to_string(),
        owner_id,
        bind_shape_mat,
        joint_names,
        joints_are_ids,
        inv_bind_mats,
        vertex_weights,
    })
}

fn parse_morph(id: &str, morph: &Element) -> Option<DaeMorph> {
    let owner_id = url_target(attr(morph, "source")?).to_string();
    let sources = parse_sources(morph);
    let targets_elem = find_child(morph, "targets")?;

    let targets = match sources.get(input_source(targets_elem, "MORPH_TARGET")?)? {
        SourceData::Names { names, .. } => names.clone(),
        SourceData::Floats(_) => return None,
    };
    let weights = match input_source(targets_elem, "MORPH_WEIGHT").and_then(|s| sources.get(s)) {
        Some(SourceData::Floats(values)) => values.clone(),
        _ => vec![0.0; targets.len()],
    };

    Some(DaeMorph {
        id: id.to_string(),
        owner_id,
        targets,
        weights,
        relative: attr(morph, "method") == Some("RELATIVE"),
    })
}
