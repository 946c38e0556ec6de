//! `H3DG` version 5 geometry files.
use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use glam::Mat4;

use super::{write_name, write_vec3};
use crate::convert::{Converter, MorphDiff, Vertex, MAX_INFLUENCES};
use crate::error::{ConvertError, ConvertResult};

pub const GEOMETRY_MAGIC: &[u8; 4] = b"H3DG";
pub const GEOMETRY_VERSION: u32 = 5;

/// Vertex stream ids.
pub mod stream {
    pub const POSITION: u32 = 0;
    pub const NORMAL: u32 = 1;
    pub const TANGENT: u32 = 2;
    pub const BITANGENT: u32 = 3;
    pub const JOINT_INDICES: u32 = 4;
    pub const JOINT_WEIGHTS: u32 = 5;
    pub const TEX_COORDS_0: u32 = 6;
    pub const TEX_COORDS_1: u32 = 7;
}

pub fn geometry_bytes(converter: &Converter) -> ConvertResult<Vec<u8>> {
    let mut out = Vec::new();
    write_geometry(&mut out, converter)?;
    Ok(out)
}

fn write_geometry<W: Write>(out: &mut W, converter: &Converter) -> ConvertResult<()> {
    let graph = converter.graph();
    let vertices = converter.vertices();

    out.write_all(GEOMETRY_MAGIC)?;
    out.write_u32::<LittleEndian>(GEOMETRY_VERSION)?;

    // Slot 0 is the model root.
    let joints = converter.joints();
    out.write_u32::<LittleEndian>(joints.len() as u32 + 1)?;
    write_mat4(out, &Mat4::IDENTITY)?;
    for &joint in joints {
        let inv_bind_mat = graph.node(joint).joint().map(|j| j.inv_bind_mat).unwrap_or(Mat4::IDENTITY);
        write_mat4(out, &inv_bind_mat)?;
    }

    let skinned = vertices.iter().any(|v| v.joints.iter().any(Option::is_some));
    let has_second_uv_set = vertices.iter().any(|v| v.tex_coords[1] != glam::Vec3::ZERO);
    let stream_count = 5 + if skinned { 2 } else { 0 } + if has_second_uv_set { 1 } else { 0 };

    out.write_u32::<LittleEndian>(stream_count)?;
    out.write_u32::<LittleEndian>(vertices.len() as u32)?;

    out.write_u32::<LittleEndian>(stream::POSITION)?;
    out.write_u32::<LittleEndian>(12)?;
    for v in vertices {
        write_vec3(out, v.pos)?;
    }

    for (id, attribute) in [
        (stream::NORMAL, (|v: &Vertex| v.normal) as fn(&Vertex) -> glam::Vec3),
        (stream::TANGENT, |v: &Vertex| v.tangent),
        (stream::BITANGENT, |v: &Vertex| v.bitangent),
    ] {
        out.write_u32::<LittleEndian>(id)?;
        out.write_u32::<LittleEndian>(6)?;
        for v in vertices {
            let value = attribute(v);
            for c in [value.x, value.y, value.z] {
                out.write_i16::<LittleEndian>(to_snorm16(c))?;
            }
        }
    }

    if skinned {
        out.write_u32::<LittleEndian>(stream::JOINT_INDICES)?;
        out.write_u32::<LittleEndian>(MAX_INFLUENCES as u32)?;
        for v in vertices {
            for joint in v.joints {
                let index = joint
                    .and_then(|j| graph.node(j).joint())
                    .and_then(|j| j.index)
                    .map(|i| i + 1)
                    .unwrap_or(0);
                let index = u8::try_from(index).map_err(|_| ConvertError::TooManyJoints(joints.len()))?;
                out.write_u8(index)?;
            }
        }

        out.write_u32::<LittleEndian>(stream::JOINT_WEIGHTS)?;
        out.write_u32::<LittleEndian>(MAX_INFLUENCES as u32)?;
        for v in vertices {
            for weight in v.weights {
                out.write_u8((weight.clamp(0.0, 1.0) * 255.0).round() as u8)?;
            }
        }
    }

    let uv_sets: &[(u32, usize)] = if has_second_uv_set {
        &[(stream::TEX_COORDS_0, 0), (stream::TEX_COORDS_1, 1)]
    } else {
        &[(stream::TEX_COORDS_0, 0)]
    };
    for &(id, set) in uv_sets {
        out.write_u32::<LittleEndian>(id)?;
        out.write_u32::<LittleEndian>(8)?;
        for v in vertices {
            out.write_f32::<LittleEndian>(v.tex_coords[set].x)?;
            out.write_f32::<LittleEndian>(v.tex_coords[set].y)?;
        }
    }

    let indices = converter.indices();
    out.write_u32::<LittleEndian>(indices.len() as u32)?;
    for &i in indices {
        out.write_u32::<LittleEndian>(i)?;
    }

    let targets = converter.morph_targets();
    out.write_u32::<LittleEndian>(targets.len() as u32)?;
    for target in targets {
        write_name(out, &target.name)?;
        out.write_u32::<LittleEndian>(4)?;
        out.write_u32::<LittleEndian>(target.diffs.len() as u32)?;
        for diff in &target.diffs {
            out.write_u32::<LittleEndian>(diff.vert_index)?;
        }

        for (id, attribute) in [
            (stream::POSITION, (|d: &MorphDiff| d.pos_diff) as fn(&MorphDiff) -> glam::Vec3),
            (stream::NORMAL, |d: &MorphDiff| d.norm_diff),
            (stream::TANGENT, |d: &MorphDiff| d.tan_diff),
            (stream::BITANGENT, |d: &MorphDiff| d.bitan_diff),
        ] {
            out.write_u32::<LittleEndian>(id)?;
            out.write_u32::<LittleEndian>(12)?;
            for diff in &target.diffs {
                write_vec3(out, attribute(diff))?;
            }
        }
    }

    Ok(())
}

/// Column-major, 16 floats.
fn write_mat4<W: Write>(out: &mut W, mat: &Mat4) -> std::io::Result<()> {
    for value in mat.to_cols_array() {
        out.write_f32::<LittleEndian>(value)?;
    }
    Ok(())
}

fn to_snorm16(value: f32) -> i16 {
    (value.clamp(-1.0, 1.0) * 32767.0).round() as i16
}
