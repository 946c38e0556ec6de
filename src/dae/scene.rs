use glam::{Mat4, Vec3};
use xmltree::Element;

use super::xml::{attr, attr_or_empty, child_elements, element_floats, find_all_children, find_child, find_path, get_element_text, url_target};

/// One element of a node's transformation stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    /// 16 values, row-major.
    Matrix,
    /// x, y, z
    Translate,
    /// axis x, y, z and angle in degrees
    Rotate,
    /// x, y, z
    Scale,
}

impl TransformKind {
    pub fn value_count(self) -> usize {
        match self {
            TransformKind::Matrix => 16,
            TransformKind::Rotate => 4,
            TransformKind::Translate | TransformKind::Scale => 3,
        }
    }

    /// Maps an animation member selector like `X` or `ANGLE` to a value slot.
    pub fn member_index(self, member: &str) -> Option<usize> {
        match (self, member) {
            (TransformKind::Rotate, "ANGLE") => Some(3),
            (TransformKind::Matrix, _) => None,
            (_, "X") => Some(0),
            (_, "Y") => Some(1),
            (_, "Z") => Some(2),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DaeTransformation {
    pub sid: String,
    pub kind: TransformKind,
    pub values: Vec<f32>,
}

impl DaeTransformation {
    /// Builds the matrix of this element using `values` in place of the authored ones.
    /// Animation sampling overrides single values this way.
    pub fn matrix_with(&self, values: &[f32]) -> Mat4 {
        match self.kind {
            TransformKind::Matrix => super::xml::mat4_from_row_major(values).unwrap_or(Mat4::IDENTITY),
            TransformKind::Translate => Mat4::from_translation(vec3_or(values, Vec3::ZERO)),
            TransformKind::Scale => Mat4::from_scale(vec3_or(values, Vec3::ONE)),
            TransformKind::Rotate => {
                let axis = vec3_or(values, Vec3::Z);
                let angle = values.get(3).copied().unwrap_or(0.0);
                if axis.length_squared() <= f32::EPSILON {
                    Mat4::IDENTITY
                } else {
                    Mat4::from_axis_angle(axis.normalize(), angle.to_radians())
                }
            }
        }
    }

    pub fn matrix(&self) -> Mat4 {
        self.matrix_with(&self.values)
    }
}

fn vec3_or(values: &[f32], fallback: Vec3) -> Vec3 {
    super::xml::vec3_from_slice(values).unwrap_or(fallback)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceKind {
    Geometry,
    Controller,
    Light,
    Camera,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialBinding {
    pub symbol: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaeInstance {
    pub kind: InstanceKind,
    /// Target id without the leading `#`.
    pub url: String,
    /// Skeleton root node ids of a controller instance.
    pub skeletons: Vec<String>,
    pub material_bindings: Vec<MaterialBinding>,
}

impl DaeInstance {
    /// Resolves a primitive's material symbol to the bound material id.
    pub fn material_for_symbol(&self, symbol: &str) -> Option<&str> {
        self.material_bindings
            .iter()
            .find(|b| b.symbol == symbol)
            .map(|b| b.target.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct DaeNode {
    pub id: String,
    pub sid: String,
    pub name: String,
    pub joint: bool,
    pub transforms: Vec<DaeTransformation>,
    pub instances: Vec<DaeInstance>,
    /// `instance_node` targets, without `#`.
    pub node_references: Vec<String>,
    pub children: Vec<DaeNode>,
}

impl DaeNode {
    /// The authored transformation, all stack elements multiplied in order.
    pub fn assemble_matrix(&self) -> Mat4 {
        self.transforms
            .iter()
            .fold(Mat4::IDENTITY, |acc, t| acc * t.matrix())
    }

    /// Depth-first search of this subtree by document id.
    pub fn find_by_id(&self, id: &str) -> Option<&DaeNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_by_id(id))
    }

    pub(crate) fn parse(element: &Element) -> DaeNode {
        let mut node = DaeNode {
            id: attr_or_empty(element, "id"),
            sid: attr_or_empty(element, "sid"),
            name: attr_or_empty(element, "name"),
            joint: attr(element, "type") == Some("JOINT"),
            ..Default::default()
        };

        for child in child_elements(element) {
            let transform_kind = match child.name.as_str() {
                "matrix" => Some(TransformKind::Matrix),
                "translate" => Some(TransformKind::Translate),
                "rotate" => Some(TransformKind::Rotate),
                "scale" => Some(TransformKind::Scale),
                _ => None,
            };

            if let Some(kind) = transform_kind {
                let mut values = element_floats(child);
                if values.len() < kind.value_count() {
                    log::warn!(
                        "Node '{}': <{}> has {} values, expected {}. Ignoring it.",
                        node.id,
                        child.name,
                        values.len(),
                        kind.value_count()
                    );
                    continue;
                }
                values.truncate(kind.value_count());
                node.transforms.push(DaeTransformation {
                    sid: attr_or_empty(child, "sid"),
                    kind,
                    values,
                });
                continue;
            }

            match child.name.as_str() {
                "instance_geometry" => push_instance(&mut node, child, InstanceKind::Geometry),
                "instance_controller" => push_instance(&mut node, child, InstanceKind::Controller),
                "instance_light" => push_instance(&mut node, child, InstanceKind::Light),
                "instance_camera" => push_instance(&mut node, child, InstanceKind::Camera),
                "instance_node" => {
                    if let Some(url) = attr(child, "url") {
                        node.node_references.push(url_target(url).to_string());
                    }
                }
                "node" => node.children.push(DaeNode::parse(child)),
                "skew" | "lookat" => {
                    log::warn!("Node '{}': <{}> is not supported and is ignored", node.id, child.name);
                }
                _ => (),
            }
        }

        node
    }
}

fn push_instance(node: &mut DaeNode, element: &Element, kind: InstanceKind) {
    let Some(url) = attr(element, "url") else {
        log::warn!("Node '{}': <{}> without url is ignored", node.id, element.name);
        return;
    };

    let skeletons = find_all_children(element, "skeleton")
        .into_iter()
        .filter_map(get_element_text)
        .map(|text| url_target(text.trim()).to_string())
        .collect();

    let material_bindings = find_path(element, &["bind_material", "technique_common"])
        .map(|technique| {
            find_all_children(technique, "instance_material")
                .into_iter()
                .filter_map(|m| {
                    Some(MaterialBinding {
                        symbol: attr(m, "symbol")?.to_string(),
                        target: url_target(attr(m, "target")?).to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    node.instances.push(DaeInstance {
        kind,
        url: url_target(url).to_string(),
        skeletons,
        material_bindings,
    });
}

#[derive(Debug, Clone, Default)]
pub struct DaeVisualScene {
    pub id: String,
    pub name: String,
    pub nodes: Vec<DaeNode>,
}

impl DaeVisualScene {
    pub(crate) fn parse(element: &Element) -> DaeVisualScene {
        DaeVisualScene {
            id: attr_or_empty(element, "id"),
            name: attr_or_empty(element, "name"),
            nodes: find_all_children(element, "node")
                .into_iter()
                .map(DaeNode::parse)
                .collect(),
        }
    }
}

/// Picks the visual scene referenced by `<scene>`, falling back to the first one.
pub(crate) fn parse_visual_scene(root: &Element) -> Option<DaeVisualScene> {
    let library = find_child(root, "library_visual_scenes")?;
    let scenes = find_all_children(library, "visual_scene");

    let wanted = find_path(root, &["scene", "instance_visual_scene"])
        .and_then(|inst| attr(inst, "url"))
        .map(url_target);

    let chosen = wanted
        .and_then(|id| scenes.iter().find(|s| attr(s, "id") == Some(id)))
        .or_else(|| scenes.first())?;

    Some(DaeVisualScene::parse(chosen))
}

pub(crate) fn parse_library_nodes(root: &Element) -> Vec<DaeNode> {
    find_all_children(root, "library_nodes")
        .into_iter()
        .flat_map(|lib| find_all_children(lib, "node"))
        .map(DaeNode::parse)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn parse_node(text: &str) -> DaeNode {
        DaeNode::parse(&Element::parse(text.as_bytes()).unwrap())
    }

    #[test]
    fn transformation_stack_keeps_document_order() {
        let node = parse_node(
            r#"<node id="n" name="N">
                <translate sid="translate">1 2 3</translate>
                <rotate sid="rotateZ">0 0 1 90</rotate>
                <scale sid="scale">2 2 2</scale>
            </node>"#,
        );
        assert_eq!(node.transforms.len(), 3);
        assert_eq!(node.transforms[1].kind, TransformKind::Rotate);

        let p = node.assemble_matrix().transform_point3(Vec3::X);
        assert_relative_eq!(p, Vec3::new(1.0, 4.0, 3.0), epsilon = 1e-5);
    }

    #[test]
    fn instances_and_bindings() {
        let node = parse_node(
            r##"<node id="body" type="NODE">
                <instance_controller url="#skin">
                    <skeleton>#root</skeleton>
                    <bind_material><technique_common>
                        <instance_material symbol="mat0" target="#Skin-material"/>
                    </technique_common></bind_material>
                </instance_controller>
                <instance_node url="#lib_node"/>
            </node>"##,
        );
        let inst = &node.instances[0];
        assert_eq!(inst.kind, InstanceKind::Controller);
        assert_eq!(inst.url, "skin");
        assert_eq!(inst.skeletons, vec!["root".to_string()]);
        assert_eq!(inst.material_for_symbol("mat0"), Some("Skin-material"));
        assert_eq!(node.node_references, vec!["lib_node".to_string()]);
        assert!(!node.joint);
    }

    #[test]
    fn short_transform_is_dropped() {
        let node = parse_node(r#"<node id="n"><translate>1 2</translate></node>"#);
        assert!(node.transforms.is_empty());
    }
}
