use glam::{Mat4, Vec3};
use xmltree::{Element, XMLNode};

// Helper functions for parsing with xmltree
pub(crate) fn find_child<'a>(element: &'a Element, name: &str) -> Option<&'a Element> {
    element.children.iter().find_map(|node| match node {
        XMLNode::Element(child) if child.name == name => Some(child),
        _ => None,
    })
}

pub(crate) fn find_all_children<'a>(element: &'a Element, name: &str) -> Vec<&'a Element> {
    element
        .children
        .iter()
        .filter_map(|node| match node {
            XMLNode::Element(child) if child.name == name => Some(child),
            _ => None,
        })
        .collect()
}

/// All element children in document order, regardless of name.
pub(crate) fn child_elements(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(|node| match node {
        XMLNode::Element(child) => Some(child),
        _ => None,
    })
}

/// Follows a path of nested child names, e.g. `["technique_common", "perspective"]`.
pub(crate) fn find_path<'a>(element: &'a Element, path: &[&str]) -> Option<&'a Element> {
    path.iter()
        .try_fold(element, |current, name| find_child(current, name))
}

pub(crate) fn get_element_text(element: &Element) -> Option<String> {
    let text: String = element
        .children
        .iter()
        .filter_map(|node| match node {
            XMLNode::Text(text) | XMLNode::CData(text) => Some(text.as_str()),
            _ => None,
        })
        .collect();

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

pub(crate) fn attr<'a>(element: &'a Element, name: &str) -> Option<&'a str> {
    element.attributes.get(name).map(String::as_str)
}

pub(crate) fn attr_or_empty(element: &Element, name: &str) -> String {
    attr(element, name).unwrap_or_default().to_string()
}

/// Strips the leading `#` of a local URI fragment.
pub(crate) fn url_target(url: &str) -> &str {
    url.trim_start_matches('#')
}

pub(crate) fn parse_floats(text: &str) -> Vec<f32> {
    text.split_whitespace()
        .filter_map(|s| s.parse::<f32>().ok())
        .collect()
}

pub(crate) fn parse_ints(text: &str) -> Vec<i64> {
    text.split_whitespace()
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

pub(crate) fn element_floats(element: &Element) -> Vec<f32> {
    get_element_text(element)
        .map(|text| parse_floats(&text))
        .unwrap_or_default()
}

pub(crate) fn element_ints(element: &Element) -> Vec<i64> {
    get_element_text(element)
        .map(|text| parse_ints(&text))
        .unwrap_or_default()
}

/// Reads the first float of a child like `<znear>0.1</znear>`.
pub(crate) fn child_float(element: &Element, name: &str) -> Option<f32> {
    find_child(element, name).and_then(|child| element_floats(child).first().copied())
}

pub(crate) fn vec3_from_slice(values: &[f32]) -> Option<Vec3> {
    match values {
        [x, y, z, ..] => Some(Vec3::new(*x, *y, *z)),
        _ => None,
    }
}

/// COLLADA stores matrices row-major.
pub(crate) fn mat4_from_row_major(values: &[f32]) -> Option<Mat4> {
    let array: [f32; 16] = values.get(..16)?.try_into().ok()?;
    Some(Mat4::from_cols_array(&array).transpose())
}
