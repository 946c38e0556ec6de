use xmltree::Element;

use super::xml::{attr, attr_or_empty, child_float, find_all_children, find_child, find_path};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DaeProjection {
    /// Field of view angles in degrees; at least one of them is present.
    Perspective {
        xfov: Option<f32>,
        yfov: Option<f32>,
        aspect_ratio: Option<f32>,
    },
    Orthographic {
        xmag: Option<f32>,
        ymag: Option<f32>,
        aspect_ratio: Option<f32>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DaeCamera {
    pub id: String,
    pub name: String,
    pub projection: DaeProjection,
    pub znear: f32,
    pub zfar: f32,
}

impl DaeCamera {
    fn parse(element: &Element) -> Option<DaeCamera> {
        let id = attr(element, "id")?.to_string();
        let technique = find_path(element, &["optics", "technique_common"])?;

        let (params, projection) = if let Some(p) = find_child(technique, "perspective") {
            let (xfov, yfov) = (child_float(p, "xfov"), child_float(p, "yfov"));
            if xfov.is_none() && yfov.is_none() {
                return None;
            }
            let aspect_ratio = child_float(p, "aspect_ratio");
            (p, DaeProjection::Perspective { xfov, yfov, aspect_ratio })
        } else if let Some(o) = find_child(technique, "orthographic") {
            let (xmag, ymag) = (child_float(o, "xmag"), child_float(o, "ymag"));
            if xmag.is_none() && ymag.is_none() {
                return None;
            }
            let aspect_ratio = child_float(o, "aspect_ratio");
            (o, DaeProjection::Orthographic { xmag, ymag, aspect_ratio })
        } else {
            return None;
        };

        let znear = child_float(params, "znear")?;
        let zfar = child_float(params, "zfar")?;
        if (znear <= 0.0 && matches!(projection, DaeProjection::Perspective { .. })) || zfar <= znear {
            return None;
        }

        Some(DaeCamera {
            name: attr_or_empty(element, "name"),
            id,
            projection,
            znear,
            zfar,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct DaeLibCameras {
    pub cameras: Vec<DaeCamera>,
}

impl DaeLibCameras {
    pub fn find_camera(&self, id: &str) -> Option<&DaeCamera> {
        if id.is_empty() {
            return None;
        }
        self.cameras.iter().find(|c| c.id == id)
    }

    pub(crate) fn parse(root: &Element) -> DaeLibCameras {
        let mut lib = DaeLibCameras::default();
        let cameras = find_all_children(root, "library_cameras")
            .into_iter()
            .flat_map(|library| find_all_children(library, "camera"));
        for camera_elem in cameras {
            match DaeCamera::parse(camera_elem) {
                Some(camera) => lib.cameras.push(camera),
                None => log::warn!(
                    "Camera '{}' is malformed and is dropped",
                    attr(camera_elem, "id").unwrap_or_default()
                ),
            }
        }

        lib
    }
}
