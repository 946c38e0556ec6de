use std::collections::HashMap;

use xmltree::Element;

use super::xml::{attr, child_elements, element_floats, find_all_children, find_child, find_path, get_element_text, url_target};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    #[default]
    Linear,
    Step,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DaeSampler {
    pub id: String,
    /// Key times in seconds.
    pub input: Vec<f32>,
    /// `stride` values per key.
    pub output: Vec<f32>,
    pub stride: usize,
    pub interpolation: Interpolation,
}

impl DaeSampler {
    pub fn key_count(&self) -> usize {
        self.input.len()
    }

    /// Output values of a single key.
    pub fn key(&self, index: usize) -> Option<&[f32]> {
        let start = index * self.stride;
        self.output.get(start..start + self.stride)
    }
}

/// Which part of the targeted transformation a channel drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaeSelector {
    /// The whole element.
    All,
    /// `.X`, `.Y`, `.Z`, `.ANGLE`
    Member(String),
    /// `(i)`
    Index(usize),
    /// `(row)(col)` of a matrix.
    RowCol(usize, usize),
}

impl DaeSelector {
    /// Value slot of a row-major element array, if the selector names one.
    pub fn value_index(&self, kind: super::TransformKind) -> Option<usize> {
        match self {
            DaeSelector::All => None,
            DaeSelector::Member(member) => kind.member_index(member),
            DaeSelector::Index(i) => Some(*i),
            DaeSelector::RowCol(row, col) => Some(row * 4 + col),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DaeChannel {
    /// Index into `DaeLibAnimations::samplers`.
    pub sampler: usize,
    pub node_id: String,
    pub sid: String,
    pub selector: DaeSelector,
}

#[derive(Debug, Clone, Default)]
pub struct DaeLibAnimations {
    pub samplers: Vec<DaeSampler>,
    pub channels: Vec<DaeChannel>,
    pub max_frame_count: usize,
}

impl DaeLibAnimations {
    pub fn channels_for<'a>(&'a self, node_id: &'a str, sid: &'a str) -> impl Iterator<Item = &'a DaeChannel> {
        self.channels
            .iter()
            .filter(move |c| !sid.is_empty() && c.node_id == node_id && c.sid == sid)
    }

    pub fn sampler(&self, channel: &DaeChannel) -> Option<&DaeSampler> {
        self.samplers.get(channel.sampler)
    }

    /// Earliest and latest key time over all samplers.
    pub fn time_range(&self) -> Option<(f32, f32)> {
        self.samplers
            .iter()
            .flat_map(|s| s.input.iter().copied())
            .fold(None, |range, t| match range {
                None => Some((t, t)),
                Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
            })
    }

    pub(crate) fn parse(root: &Element) -> DaeLibAnimations {
        let mut lib = DaeLibAnimations::default();
        for library in find_all_children(root, "library_animations") {
            for animation in find_all_children(library, "animation") {
                lib.parse_animation(animation);
            }
        }
        lib.max_frame_count = lib.samplers.iter().map(DaeSampler::key_count).max().unwrap_or(0);
        lib
    }

    fn parse_animation(&mut self, animation: &Element) {
        let sources = parse_sources(animation);
        let mut sampler_indices = HashMap::new();

        for sampler_elem in find_all_children(animation, "sampler") {
            let Some(id) = attr(sampler_elem, "id") else { continue };
            match parse_sampler(id, sampler_elem, &sources) {
                Some(sampler) => {
                    sampler_indices.insert(id.to_string(), self.samplers.len());
                    self.samplers.push(sampler);
                }
                None => log::warn!("Animation sampler '{}' is malformed and is dropped", id),
            }
        }

        for channel in find_all_children(animation, "channel") {
            let (Some(source), Some(target)) = (attr(channel, "source"), attr(channel, "target")) else {
                continue;
            };
            let Some(&sampler) = sampler_indices.get(url_target(source)) else {
                log::warn!("Animation channel '{}' has no sampler", target);
                continue;
            };
            match parse_target(target) {
                Some((node_id, sid, selector)) => self.channels.push(DaeChannel {
                    sampler,
                    node_id,
                    sid,
                    selector,
                }),
                None => log::warn!("Animation channel target '{}' is not supported", target),
            }
        }

        for nested in child_elements(animation).filter(|c| c.name == "animation") {
            self.parse_animation(nested);
        }
    }
}

struct Source {
    floats: Vec<f32>,
    names: Vec<String>,
    stride: usize,
}

fn parse_sources(element: &Element) -> HashMap<String, Source> {
    find_all_children(element, "source")
        .into_iter()
        .filter_map(|source| {
            let id = attr(source, "id")?.to_string();
            let stride = find_path(source, &["technique_common", "accessor"])
                .and_then(|a| attr(a, "stride"))
                .and_then(|s| s.parse().ok())
                .unwrap_or(1usize)
                .max(1);
            let floats = find_child(source, "float_array").map(element_floats).unwrap_or_default();
            let names = find_child(source, "Name_array")
                .and_then(get_element_text)
                .map(|t| t.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default();
            Some((id, Source { floats, names, stride }))
        })
        .collect()
}

fn parse_sampler(id: &str, element: &Element, sources: &HashMap<String, Source>) -> Option<DaeSampler> {
    let input_source = |semantic: &str| {
        find_all_children(element, "input")
            .into_iter()
            .find(|i| attr(i, "semantic") == Some(semantic))
            .and_then(|i| attr(i, "source"))
            .and_then(|s| sources.get(url_target(s)))
    };

    let input = input_source("INPUT")?;
    let output = input_source("OUTPUT")?;
    let interpolation = match input_source("INTERPOLATION").and_then(|s| s.names.first()) {
        Some(name) if name == "STEP" => Interpolation::Step,
        _ => Interpolation::Linear,
    };

    if input.floats.is_empty() || output.floats.len() < input.floats.len() * output.stride {
        return None;
    }

    Some(DaeSampler {
        id: id.to_string(),
        input: input.floats.clone(),
        output: output.floats.clone(),
        stride: output.stride,
        interpolation,
    })
}

/// Splits `node/sid.X`, `node/sid(3)` or `node/sid(1)(2)`.
fn parse_target(target: &str) -> Option<(String, String, DaeSelector)> {
    let (node_id, rest) = target.split_once('/')?;

    if let Some((sid, member)) = rest.split_once('.') {
        return Some((node_id.to_string(), sid.to_string(), DaeSelector::Member(member.to_string())));
    }

    if let Some((sid, indices)) = rest.split_once('(') {
        let values: Vec<usize> = indices
            .split(|c| c == '(' || c == ')')
            .filter(|s| !s.is_empty())
            .map(|s| s.trim().parse().ok())
            .collect::<Option<_>>()?;
        let selector = match values.as_slice() {
            [i] => DaeSelector::Index(*i),
            [r, c] => DaeSelector::RowCol(*r, *c),
            _ => return None,
        };
        return Some((node_id.to_string(), sid.to_string(), selector));
    }

    Some((node_id.to_string(), rest.to_string(), DaeSelector::All))
}
