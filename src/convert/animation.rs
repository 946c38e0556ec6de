use std::borrow::Cow;

use glam::{Mat4, Quat, Vec3};

use crate::dae::xml::mat4_from_row_major;
use crate::dae::{DaeLibAnimations, DaeNode, DaeSampler, DaeSelector, Interpolation, TransformKind};

/// Evaluates a node's transformation stack for each output frame.
///
/// Every sampler with exactly `frame_count` keys is read key by key. All other
/// samplers are resampled at evenly spaced times over the document's key range.
pub(crate) struct AnimationSampler<'a> {
    lib: &'a DaeLibAnimations,
    frame_count: usize,
    frame_times: Vec<f32>,
    resampled_nodes: Vec<String>,
}

impl<'a> AnimationSampler<'a> {
    pub fn new(lib: &'a DaeLibAnimations) -> Self {
        let frame_count = lib.max_frame_count;
        let frame_times = match lib.time_range() {
            Some((start, end)) if frame_count > 1 => (0..frame_count)
                .map(|i| start + (end - start) * i as f32 / (frame_count - 1) as f32)
                .collect(),
            Some((start, _)) => vec![start; frame_count],
            None => Vec::new(),
        };

        Self {
            lib,
            frame_count,
            frame_times,
            resampled_nodes: Vec::new(),
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Relative transform of `node` for every frame, or an empty list if the
    /// document has no animation.
    pub fn node_frames(&mut self, node: &DaeNode) -> Vec<Mat4> {
        if self.frame_count == 0 {
            return Vec::new();
        }

        let needs_resampling = node.transforms.iter().any(|t| {
            self.lib
                .channels_for(&node.id, &t.sid)
                .filter_map(|c| self.lib.sampler(c))
                .any(|s| s.key_count() != self.frame_count)
        });
        if needs_resampling {
            self.resampled_nodes.push(node.id.clone());
        }

        (0..self.frame_count)
            .map(|frame| self.node_transform(node, frame))
            .collect()
    }

    /// Assembles the transformation stack with animated values substituted.
    pub fn node_transform(&self, node: &DaeNode, frame: usize) -> Mat4 {
        node.transforms.iter().fold(Mat4::IDENTITY, |acc, transform| {
            let mut values = Cow::Borrowed(transform.values.as_slice());

            for channel in self.lib.channels_for(&node.id, &transform.sid) {
                let Some(sampler) = self.lib.sampler(channel) else { continue };
                let whole_matrix = transform.kind == TransformKind::Matrix && channel.selector == DaeSelector::All;
                let Some(sampled) = self.sample(sampler, frame, whole_matrix) else { continue };

                match channel.selector.value_index(transform.kind) {
                    Some(index) => {
                        if let (Some(value), Some(slot)) = (sampled.first(), values.to_mut().get_mut(index)) {
                            *slot = *value;
                        }
                    }
                    None if channel.selector == DaeSelector::All && sampled.len() >= transform.kind.value_count() => {
                        values = Cow::Owned(sampled[..transform.kind.value_count()].to_vec());
                    }
                    None => (),
                }
            }

            acc * transform.matrix_with(&values)
        })
    }

    fn sample(&self, sampler: &'a DaeSampler, frame: usize, whole_matrix: bool) -> Option<Cow<'a, [f32]>> {
        if sampler.key_count() == self.frame_count {
            return sampler.key(frame).map(Cow::Borrowed);
        }

        let time = *self.frame_times.get(frame)?;
        let last = sampler.key_count().checked_sub(1)?;
        let next = sampler.input.iter().position(|&t| t > time).unwrap_or(last + 1);
        if next == 0 {
            return sampler.key(0).map(Cow::Borrowed);
        }
        if next > last {
            return sampler.key(last).map(Cow::Borrowed);
        }

        let prev = next - 1;
        let (a, b) = (sampler.key(prev)?, sampler.key(next)?);
        if sampler.interpolation == Interpolation::Step {
            return Some(Cow::Borrowed(a));
        }

        let span = sampler.input[next] - sampler.input[prev];
        let amount = if span > 0.0 {
            (time - sampler.input[prev]) / span
        } else {
            0.0
        };

        if whole_matrix {
            interpolate_matrix(a, b, amount).map(Cow::Owned)
        } else {
            Some(Cow::Owned(
                a.iter().zip(b).map(|(x, y)| x + (y - x) * amount).collect(),
            ))
        }
    }

    /// Logs the nodes whose channels did not line up with the frame count.
    pub fn report(&self) {
        if !self.resampled_nodes.is_empty() {
            log::warn!(
                "Animation channels of {} node(s) were resampled to {} frames: {}",
                self.resampled_nodes.len(),
                self.frame_count,
                self.resampled_nodes.join(", ")
            );
        }
    }
}

/// Interpolates two row-major matrices through their scale, rotation and translation.
fn interpolate_matrix(a: &[f32], b: &[f32], amount: f32) -> Option<Vec<f32>> {
    let (scale_a, rot_a, trans_a) = mat4_from_row_major(a)?.to_scale_rotation_translation();
    let (scale_b, rot_b, trans_b) = mat4_from_row_major(b)?.to_scale_rotation_translation();

    let matrix = compose(
        scale_a.lerp(scale_b, amount),
        rot_a.slerp(rot_b, amount),
        trans_a.lerp(trans_b, amount),
    );
    Some(matrix.transpose().to_cols_array().to_vec())
}

/// Scale, then rotate, then translate.
fn compose(scale: Vec3, rotation: Quat, translation: Vec3) -> Mat4 {
    Mat4::from_scale_rotation_translation(scale, rotation, translation)
}
