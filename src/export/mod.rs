//! Writers for the runtime formats. Every file is assembled in memory first
//! and written with a single call.
use std::io::Write;
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use xmltree::Element;

use crate::error::ConvertResult;

pub mod animation;
pub mod geometry;
pub mod material;
pub mod scene;

/// Size of the fixed name fields in the binary formats.
pub const NAME_FIELD_LEN: usize = 256;

/// Writes `data` to `path`, removing the file again if the write fails.
pub fn write_file(path: &Path, data: &[u8]) -> ConvertResult<()> {
    let result = std::fs::File::create(path).and_then(|mut file| {
        file.write_all(data)?;
        file.flush()
    });

    if let Err(e) = result {
        log::error!("Failed to write {}: {}", path.display(), e);
        // The file may not exist if creating it failed.
        let _ = std::fs::remove_file(path);
        return Err(e.into());
    }

    log::debug!("Wrote {} ({} bytes)", path.display(), data.len());
    Ok(())
}

pub(crate) fn xml_bytes(element: &Element) -> ConvertResult<Vec<u8>> {
    let mut bytes = Vec::new();
    element.write(&mut bytes)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Path of a resource as referenced from other resources, always with `/`.
pub(crate) fn resource_path(asset_path: &str, file_name: &str) -> String {
    let directory = asset_path.trim_end_matches(['/', '\\']).replace('\\', "/");
    if directory.is_empty() {
        file_name.to_string()
    } else {
        format!("{directory}/{file_name}")
    }
}

/// Zero padded fixed size name. Longer names are cut on a char boundary.
pub(crate) fn write_name<W: Write>(writer: &mut W, name: &str) -> std::io::Result<()> {
    let name = crate::convert::scene_graph::bounded_name(name, NAME_FIELD_LEN - 1);
    writer.write_all(name.as_bytes())?;
    writer.write_all(&vec![0u8; NAME_FIELD_LEN - name.len()])
}

pub(crate) fn write_vec3<W: Write>(writer: &mut W, v: glam::Vec3) -> std::io::Result<()> {
    writer.write_f32::<LittleEndian>(v.x)?;
    writer.write_f32::<LittleEndian>(v.y)?;
    writer.write_f32::<LittleEndian>(v.z)
}

/// Formats a float for XML attributes without a negative zero.
pub(crate) fn format_float(value: f32) -> String {
    format!("{}", value + 0.0)
}
