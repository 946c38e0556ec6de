//! Scene graph XML.
use glam::{EulerRot, Mat4};
use xmltree::{Element, XMLNode};

use super::{format_float, resource_path};
use crate::convert::{Converter, NodeId, NodeKind, TriGroup};

/// Builds the `Model` element with the whole node tree below it.
pub fn scene_xml(converter: &Converter, asset_path: &str, asset_name: &str, model_name: &str) -> Element {
    let mut model = Element::new("Model");
    set(&mut model, "name", asset_name);
    set(&mut model, "geometry", &resource_path(asset_path, &format!("{asset_name}.geo")));

    let lod_distances = converter.lod_distances();
    for level in 1..=converter.max_lod_level() as usize {
        set(&mut model, &format!("lodDist{level}"), &format_float(lod_distances[level - 1]));
    }

    let graph = converter.graph();
    for &root in &graph.roots {
        model
            .children
            .push(XMLNode::Element(node_element(converter, root, asset_path, model_name)));
    }
    model
}

fn node_element(converter: &Converter, id: NodeId, asset_path: &str, model_name: &str) -> Element {
    let node = converter.graph().node(id);

    let mut element = match &node.kind {
        NodeKind::Transform => Element::new("Group"),
        NodeKind::Mesh(_) => Element::new("Mesh"),
        NodeKind::Joint(_) => Element::new("Joint"),
        NodeKind::Light(_) => Element::new("Light"),
        NodeKind::Camera(_) => Element::new("Camera"),
    };
    set(&mut element, "name", &node.name);
    set_transform(&mut element, &node.mat_rel);

    match &node.kind {
        NodeKind::Transform => (),
        NodeKind::Mesh(mesh) => {
            let mut groups = mesh.tri_groups.iter();
            if let Some(first) = groups.next() {
                set_batch(&mut element, first, asset_path, model_name);
            }
            if mesh.lod_level > 0 {
                set(&mut element, "lodLevel", &mesh.lod_level.to_string());
            }

            // Further materials become identity child meshes.
            for group in groups {
                let mut child = Element::new("Mesh");
                set(&mut child, "name", &group.name);
                set_batch(&mut child, group, asset_path, model_name);
                if mesh.lod_level > 0 {
                    set(&mut child, "lodLevel", &mesh.lod_level.to_string());
                }
                element.children.push(XMLNode::Element(child));
            }
        }
        NodeKind::Joint(joint) => {
            if let Some(index) = joint.index {
                set(&mut element, "jointIndex", &(index + 1).to_string());
            }
        }
        NodeKind::Light(light) => {
            set(&mut element, "material", "");
            set(&mut element, "lightingContext", "LIGHTING");
            set(&mut element, "shadowContext", "SHADOWMAP");
            set(&mut element, "radius", &format_float(light.radius));
            set(&mut element, "fov", &format_float(light.falloff_angle));
            set(&mut element, "col_R", &format_float(light.color.x));
            set(&mut element, "col_G", &format_float(light.color.y));
            set(&mut element, "col_B", &format_float(light.color.z));
            set(&mut element, "shadowMapCount", "0");
        }
        NodeKind::Camera(camera) => {
            set(&mut element, "pipeline", "");
            set(&mut element, "leftPlane", &format_float(camera.left_plane));
            set(&mut element, "rightPlane", &format_float(camera.right_plane));
            set(&mut element, "bottomPlane", &format_float(camera.bottom_plane));
            set(&mut element, "topPlane", &format_float(camera.top_plane));
            set(&mut element, "nearPlane", &format_float(camera.near_plane));
            set(&mut element, "farPlane", &format_float(camera.far_plane));
        }
    }

    for &child in &node.children {
        element
            .children
            .push(XMLNode::Element(node_element(converter, child, asset_path, model_name)));
    }
    element
}

fn set(element: &mut Element, name: &str, value: &str) {
    element.attributes.insert(name.to_string(), value.to_string());
}

fn set_batch(element: &mut Element, group: &TriGroup, asset_path: &str, model_name: &str) {
    let material = super::material::material_file_name(model_name, &group.mat_name);
    set(element, "material", &resource_path(asset_path, &material));
    set(element, "batchStart", &group.first.to_string());
    set(element, "batchCount", &group.count.to_string());
    set(element, "vertRStart", &group.vert_r_start.to_string());
    // Inclusive in the file format.
    set(element, "vertREnd", &group.vert_r_end.saturating_sub(1).to_string());
}

/// Translation, Euler rotation in degrees and scale. Identity parts are omitted.
fn set_transform(element: &mut Element, mat: &Mat4) {
    let (scale, rotation, translation) = mat.to_scale_rotation_translation();
    let (z, y, x) = rotation.to_euler(EulerRot::ZYX);

    let values = [
        ("tx", translation.x, 0.0),
        ("ty", translation.y, 0.0),
        ("tz", translation.z, 0.0),
        ("rx", x.to_degrees(), 0.0),
        ("ry", y.to_degrees(), 0.0),
        ("rz", z.to_degrees(), 0.0),
        ("sx", scale.x, 1.0),
        ("sy", scale.y, 1.0),
        ("sz", scale.z, 1.0),
    ];
    for (name, value, identity) in values {
        if (value - identity).abs() > 1e-6 {
            set(element, name, &format_float(value));
        }
    }
}
