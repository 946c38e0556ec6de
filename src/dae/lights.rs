use glam::Vec3;
use xmltree::Element;

use super::xml::{attr, attr_or_empty, child_elements, child_float, element_floats, find_all_children, find_child, vec3_from_slice};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaeLightKind {
    Ambient,
    Directional,
    Point,
    Spot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DaeLight {
    pub id: String,
    pub name: String,
    pub kind: DaeLightKind,
    pub color: Vec3,
    pub constant_attenuation: f32,
    pub linear_attenuation: f32,
    pub quadratic_attenuation: f32,
    /// Full cone angle in degrees, spot lights only.
    pub falloff_angle: f32,
    pub falloff_exponent: f32,
}

impl DaeLight {
    /// Returns `None` for entries that cannot be used, e.g. a missing id,
    /// no `technique_common` or an unknown light type.
    fn parse(element: &Element) -> Option<DaeLight> {
        let id = attr(element, "id")?.to_string();
        let technique = find_child(element, "technique_common")?;
        let type_elem = child_elements(technique).next()?;

        let kind = match type_elem.name.as_str() {
            "ambient" => DaeLightKind::Ambient,
            "directional" => DaeLightKind::Directional,
            "point" => DaeLightKind::Point,
            "spot" => DaeLightKind::Spot,
            _ => return None,
        };

        let color = find_child(type_elem, "color")
            .map(element_floats)
            .and_then(|values| vec3_from_slice(&values))
            .unwrap_or(Vec3::ONE);

        Some(DaeLight {
            name: attr_or_empty(element, "name"),
            id,
            kind,
            color,
            constant_attenuation: child_float(type_elem, "constant_attenuation").unwrap_or(1.0),
            linear_attenuation: child_float(type_elem, "linear_attenuation").unwrap_or(0.0),
            quadratic_attenuation: child_float(type_elem, "quadratic_attenuation").unwrap_or(0.0),
            falloff_angle: child_float(type_elem, "falloff_angle").unwrap_or(180.0),
            falloff_exponent: child_float(type_elem, "falloff_exponent").unwrap_or(0.0),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct DaeLibLights {
    pub lights: Vec<DaeLight>,
}

impl DaeLibLights {
    pub fn find_light(&self, id: &str) -> Option<&DaeLight> {
        if id.is_empty() {
            return None;
        }
        self.lights.iter().find(|l| l.id == id)
    }

    pub(crate) fn parse(root: &Element) -> DaeLibLights {
        let mut lib = DaeLibLights::default();
        let lights = find_all_children(root, "library_lights")
            .into_iter()
            .flat_map(|library| find_all_children(library, "light"));
        for light_elem in lights {
            match DaeLight::parse(light_elem) {
                Some(light) => lib.lights.push(light),
                None => log::warn!(
                    "Light '{}' is malformed and is dropped",
                    attr(light_elem, "id").unwrap_or_default()
                ),
            }
        }

        lib
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lib(lights: &str) -> DaeLibLights {
        let text = format!("<COLLADA><library_lights>{lights}</library_lights></COLLADA>");
        DaeLibLights::parse(&Element::parse(text.as_bytes()).unwrap())
    }

    #[test]
    fn spot_light_parameters() {
        let lights = lib(
            r#"<light id="spot1" name="Spot"><technique_common><spot>
                <color>1 0.5 0.25</color>
                <constant_attenuation>1</constant_attenuation>
                <linear_attenuation>0.1</linear_attenuation>
                <quadratic_attenuation>0.01</quadratic_attenuation>
                <falloff_angle>45</falloff_angle>
                <falloff_exponent>2</falloff_exponent>
            </spot></technique_common></light>"#,
        );
        let spot = lights.find_light("spot1").unwrap();
        assert_eq!(spot.kind, DaeLightKind::Spot);
        assert_eq!(spot.color, Vec3::new(1.0, 0.5, 0.25));
        assert_eq!(spot.falloff_angle, 45.0);
        assert_eq!(spot.quadratic_attenuation, 0.01);
    }

    #[test]
    fn malformed_entries_are_dropped_and_lookup_misses() {
        let lights = lib(
            r#"<light id="broken"><technique_common><laser/></technique_common></light>
               <light id="no_technique"/>
               <light id="sun"><technique_common><directional><color>1 1 1</color></directional></technique_common></light>"#,
        );
        assert_eq!(lights.lights.len(), 1);
        assert!(lights.find_light("broken").is_none());
        assert!(lights.find_light("").is_none());
        assert_eq!(lights.find_light("sun").unwrap().kind, DaeLightKind::Directional);
    }
}
