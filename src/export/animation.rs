//! `H3DA` version 3 animation files.
use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use glam::{Mat4, Quat, Vec3};

use super::{write_name, write_vec3};
use crate::convert::Converter;
use crate::error::ConvertResult;

pub const ANIMATION_MAGIC: &[u8; 4] = b"H3DA";
pub const ANIMATION_VERSION: u32 = 3;

pub fn animation_bytes(converter: &Converter) -> ConvertResult<Vec<u8>> {
    let mut out = Vec::new();
    write_animation(&mut out, converter)?;
    Ok(out)
}

fn write_animation<W: Write>(out: &mut W, converter: &Converter) -> std::io::Result<()> {
    let graph = converter.graph();
    let animated: Vec<_> = graph
        .depth_first()
        .into_iter()
        .map(|id| graph.node(id))
        .filter(|node| !node.frames.is_empty())
        .collect();

    out.write_all(ANIMATION_MAGIC)?;
    out.write_u32::<LittleEndian>(ANIMATION_VERSION)?;
    out.write_u32::<LittleEndian>(animated.len() as u32)?;
    out.write_u32::<LittleEndian>(converter.frame_count() as u32)?;

    for node in animated {
        write_name(out, &node.name)?;

        // Static channels store a single frame.
        let compressed = node.frames.windows(2).all(|w| w[0] == w[1]);
        out.write_u8(compressed as u8)?;
        let frames = if compressed { &node.frames[..1] } else { &node.frames[..] };
        for frame in frames {
            write_frame(out, frame)?;
        }
    }
    Ok(())
}

fn write_frame<W: Write>(out: &mut W, mat: &Mat4) -> std::io::Result<()> {
    let (scale, rotation, translation) = decompose(mat);
    for value in rotation.to_array() {
        out.write_f32::<LittleEndian>(value)?;
    }
    write_vec3(out, translation)?;
    write_vec3(out, scale)
}

fn decompose(mat: &Mat4) -> (Vec3, Quat, Vec3) {
    let (scale, rotation, translation) = mat.to_scale_rotation_translation();
    // Degenerate matrices give a non-finite rotation.
    let rotation = if rotation.is_finite() { rotation.normalize() } else { Quat::IDENTITY };
    (scale, rotation, translation)
}
