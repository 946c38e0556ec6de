use std::collections::HashMap;

use glam::Vec3;
use xmltree::Element;

use super::xml::{attr, attr_or_empty, child_elements, element_floats, element_ints, find_all_children, find_child, find_path, url_target};

pub const MAX_TEX_COORD_SETS: usize = 4;

/// Indices of one triangle corner into the primitive's arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DaeVertexRef {
    pub pos: usize,
    pub normal: Option<usize>,
    pub tex_coords: [Option<usize>; MAX_TEX_COORD_SETS],
}

/// One `triangles`/`polylist`/`polygons` primitive, already triangulated.
#[derive(Debug, Clone, Default)]
pub struct DaeTriGroup {
    pub material_symbol: String,
    pub normals: Vec<Vec3>,
    pub tex_coords: Vec<Vec<Vec3>>,
    /// Three corners per triangle.
    pub indices: Vec<DaeVertexRef>,
}

impl DaeTriGroup {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn normal(&self, corner: &DaeVertexRef) -> Option<Vec3> {
        corner.normal.and_then(|i| self.normals.get(i).copied())
    }

    pub fn tex_coord(&self, corner: &DaeVertexRef, set: usize) -> Vec3 {
        corner.tex_coords[set]
            .and_then(|i| self.tex_coords.get(set)?.get(i).copied())
            .unwrap_or(Vec3::ZERO)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DaeGeometry {
    pub id: String,
    pub name: String,
    pub positions: Vec<Vec3>,
    pub tri_groups: Vec<DaeTriGroup>,
}

impl DaeGeometry {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone)]
struct DaeSource {
    values: Vec<f32>,
    stride: usize,
}

impl DaeSource {
    fn parse(element: &Element) -> Option<(String, DaeSource)> {
        let id = attr(element, "id")?.to_string();
        let values = find_child(element, "float_array")
            .map(element_floats)
            .unwrap_or_default();
        let stride = find_path(element, &["technique_common", "accessor"])
            .and_then(|a| attr(a, "stride"))
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|&s| s > 0)
            .unwrap_or(1);
        Some((id, DaeSource { values, stride }))
    }

    fn vec3s(&self) -> Vec<Vec3> {
        self.values
            .chunks(self.stride)
            .filter(|chunk| chunk.len() == self.stride)
            .map(|chunk| {
                let mut v = [0.0f32; 3];
                for (dst, src) in v.iter_mut().zip(chunk) {
                    *dst = *src;
                }
                Vec3::from_array(v)
            })
            .collect()
    }
}

struct PrimitiveInput<'a> {
    semantic: &'a str,
    source: &'a str,
    offset: usize,
    set: usize,
}

fn parse_inputs(element: &Element) -> Vec<PrimitiveInput<'_>> {
    find_all_children(element, "input")
        .into_iter()
        .filter_map(|input| {
            Some(PrimitiveInput {
                semantic: attr(input, "semantic")?,
                source: url_target(attr(input, "source")?),
                offset: attr(input, "offset")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0),
                set: attr(input, "set").and_then(|s| s.parse().ok()).unwrap_or(0),
            })
        })
        .collect()
}

/// Per-position attributes declared on `<vertices>` next to POSITION.
#[derive(Default)]
struct VertexInputs {
    id: String,
    normals: Option<Vec<Vec3>>,
    tex_coords: Vec<(usize, Vec<Vec3>)>,
}

pub(crate) fn parse_geometries(root: &Element) -> Vec<DaeGeometry> {
    let mut geometries = Vec::new();

    let elements = find_all_children(root, "library_geometries")
        .into_iter()
        .flat_map(|library| find_all_children(library, "geometry"));
    for geometry_elem in elements {
        let Some(id) = attr(geometry_elem, "id") else {
            log::warn!("Skipping <geometry> without id");
            continue;
        };
        let Some(mesh_elem) = find_child(geometry_elem, "mesh") else {
            log::debug!("Geometry '{}' has no <mesh> and is skipped", id);
            continue;
        };

        let mut geometry = DaeGeometry {
            id: id.to_string(),
            name: attr_or_empty(geometry_elem, "name"),
            ..Default::default()
        };
        parse_mesh(mesh_elem, &mut geometry);

        log::debug!(
            "Geometry '{}': {} positions, {} triangle groups",
            geometry.id,
            geometry.positions.len(),
            geometry.tri_groups.len()
        );
        geometries.push(geometry);
    }

    geometries
}

fn parse_mesh(mesh_elem: &Element, geometry: &mut DaeGeometry) {
    let sources: HashMap<String, DaeSource> = find_all_children(mesh_elem, "source")
        .into_iter()
        .filter_map(DaeSource::parse)
        .collect();

    let mut vertex_inputs = VertexInputs::default();
    if let Some(vertices_elem) = find_child(mesh_elem, "vertices") {
        vertex_inputs.id = attr_or_empty(vertices_elem, "id");
        for input in parse_inputs(vertices_elem) {
            let Some(source) = sources.get(input.source) else {
                log::warn!("Geometry '{}': missing source '{}'", geometry.id, input.source);
                continue;
            };
            match input.semantic {
                "POSITION" => geometry.positions = source.vec3s(),
                "NORMAL" => vertex_inputs.normals = Some(source.vec3s()),
                "TEXCOORD" => vertex_inputs.tex_coords.push((input.set, source.vec3s())),
                _ => (),
            }
        }
    }

    for primitive in child_elements(mesh_elem) {
        let polygons = match primitive.name.as_str() {
            "triangles" => triangle_polygons(primitive),
            "polylist" => polylist_polygons(primitive),
            "polygons" => polygons_polygons(primitive),
            "lines" | "linestrips" | "trifans" | "tristrips" => {
                log::warn!(
                    "Geometry '{}': <{}> primitives are not supported",
                    geometry.id,
                    primitive.name
                );
                continue;
            }
            _ => continue,
        };

        if let Some(group) = build_tri_group(primitive, &polygons, &sources, &vertex_inputs, geometry) {
            geometry.tri_groups.push(group);
        }
    }
}

/// Raw index tuples of one polygon, each tuple `stride` values long.
type Polygon = Vec<i64>;

fn primitive_stride(primitive: &Element) -> usize {
    parse_inputs(primitive)
        .iter()
        .map(|i| i.offset + 1)
        .max()
        .unwrap_or(1)
}

fn triangle_polygons(primitive: &Element) -> Vec<Polygon> {
    let stride = primitive_stride(primitive);
    find_all_children(primitive, "p")
        .into_iter()
        .flat_map(element_ints)
        .collect::<Vec<_>>()
        .chunks_exact(stride * 3)
        .map(|c| c.to_vec())
        .collect()
}

fn polylist_polygons(primitive: &Element) -> Vec<Polygon> {
    let stride = primitive_stride(primitive);
    let vcount = find_child(primitive, "vcount")
        .map(element_ints)
        .unwrap_or_default();
    let values = find_child(primitive, "p").map(element_ints).unwrap_or_default();

    let mut polygons = Vec::with_capacity(vcount.len());
    let mut cursor = 0;
    for count in vcount {
        let len = count.max(0) as usize * stride;
        if cursor + len > values.len() {
            log::warn!("Polylist index data is shorter than its vcount");
            break;
        }
        polygons.push(values[cursor..cursor + len].to_vec());
        cursor += len;
    }
    polygons
}

fn polygons_polygons(primitive: &Element) -> Vec<Polygon> {
    find_all_children(primitive, "p")
        .into_iter()
        .map(element_ints)
        .collect()
}

fn build_tri_group(
    primitive: &Element,
    polygons: &[Polygon],
    sources: &HashMap<String, DaeSource>,
    vertex_inputs: &VertexInputs,
    geometry: &DaeGeometry,
) -> Option<DaeTriGroup> {
    let inputs = parse_inputs(primitive);
    let stride = primitive_stride(primitive);

    let Some(vertex_offset) = inputs
        .iter()
        .find(|i| i.semantic == "VERTEX" && i.source == vertex_inputs.id)
        .or_else(|| inputs.iter().find(|i| i.semantic == "VERTEX"))
        .map(|i| i.offset)
    else {
        log::warn!("Geometry '{}': primitive without VERTEX input is skipped", geometry.id);
        return None;
    };

    let mut group = DaeTriGroup {
        material_symbol: attr_or_empty(primitive, "material"),
        ..Default::default()
    };

    // Normals either come per corner or per position through <vertices>.
    let normal_offset = match inputs.iter().find(|i| i.semantic == "NORMAL") {
        Some(input) => {
            group.normals = sources.get(input.source).map(DaeSource::vec3s).unwrap_or_default();
            Some(input.offset)
        }
        None => {
            group.normals = vertex_inputs.normals.clone().unwrap_or_default();
            None
        }
    };
    let normals_per_position = normal_offset.is_none() && vertex_inputs.normals.is_some();

    // Texture coordinate sets ordered by their `set` attribute.
    let mut tex_inputs: Vec<(usize, Option<usize>, Vec<Vec3>)> = inputs
        .iter()
        .filter(|i| i.semantic == "TEXCOORD")
        .filter_map(|i| Some((i.set, Some(i.offset), sources.get(i.source)?.vec3s())))
        .collect();
    if tex_inputs.is_empty() {
        tex_inputs = vertex_inputs
            .tex_coords
            .iter()
            .map(|(set, data)| (*set, None, data.clone()))
            .collect();
    }
    tex_inputs.sort_by_key(|(set, _, _)| *set);
    if tex_inputs.len() > MAX_TEX_COORD_SETS {
        log::warn!(
            "Geometry '{}': {} texture coordinate sets, only {} are kept",
            geometry.id,
            tex_inputs.len(),
            MAX_TEX_COORD_SETS
        );
        tex_inputs.truncate(MAX_TEX_COORD_SETS);
    }

    let corner = |tuple: &[i64]| -> Option<DaeVertexRef> {
        let index_at = |offset: usize| tuple.get(offset).and_then(|&v| usize::try_from(v).ok());
        let pos = index_at(vertex_offset).filter(|&p| p < geometry.positions.len())?;
        let mut vertex = DaeVertexRef {
            pos,
            normal: match normal_offset {
                Some(offset) => index_at(offset),
                None if normals_per_position => Some(pos),
                None => None,
            },
            ..Default::default()
        };
        for (set, (_, offset, _)) in tex_inputs.iter().enumerate() {
            vertex.tex_coords[set] = match offset {
                Some(offset) => index_at(*offset),
                None => Some(pos),
            };
        }
        Some(vertex)
    };

    let mut skipped = 0usize;
    for polygon in polygons {
        let corners: Option<Vec<DaeVertexRef>> = polygon.chunks_exact(stride).map(&corner).collect();
        let Some(corners) = corners.filter(|c| c.len() >= 3) else {
            skipped += 1;
            continue;
        };
        // Fan triangulation
        for i in 1..corners.len() - 1 {
            group.indices.extend([corners[0], corners[i], corners[i + 1]]);
        }
    }

    if skipped > 0 {
        log::warn!(
            "Geometry '{}': skipped {} polygons with invalid indices",
            geometry.id,
            skipped
        );
    }

    group.tex_coords = tex_inputs.into_iter().map(|(_, _, data)| data).collect();

    if group.indices.is_empty() {
        None
    } else {
        Some(group)
    }
}
