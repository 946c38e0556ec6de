use super::mesh::{TriGroup, Vertex};

const CACHE_SIZE: usize = 16;
const VALENCE_SIZE: usize = 8;
// Scores from the post-transform cache simulation, indexed by cache position + 1.
const CACHE_SCORES: [f32; CACHE_SIZE + 1] = [
    0.0, 0.779, 0.791, 0.789, 0.981, 0.843, 0.726, 0.847, 0.882, 0.867, 0.799, 0.642, 0.613, 0.600, 0.568, 0.372, 0.234,
];
// Indexed by the number of triangles still using the vertex.
const VALENCE_SCORES: [f32; VALENCE_SIZE + 1] = [0.0, 0.995, 0.713, 0.450, 0.404, 0.059, 0.005, 0.147, 0.006];

/// Triangles using each vertex, packed into one buffer.
struct Adjacency {
    counts: Vec<usize>,
    offsets: Vec<usize>,
    triangles: Vec<usize>,
}

impl Adjacency {
    fn new(triangles: &[[usize; 3]], vertex_count: usize) -> Self {
        let mut counts = vec![0; vertex_count];
        for &v in triangles.iter().flatten() {
            counts[v] += 1;
        }

        let offsets: Vec<usize> = counts
            .iter()
            .scan(0, |offset, &count| {
                let start = *offset;
                *offset += count;
                Some(start)
            })
            .collect();

        let mut cursor = offsets.clone();
        let mut data = vec![0; triangles.len() * 3];
        for (t, triangle) in triangles.iter().enumerate() {
            for &v in triangle {
                data[cursor[v]] = t;
                cursor[v] += 1;
            }
        }

        Self {
            counts,
            offsets,
            triangles: data,
        }
    }

    fn live(&self, vertex: usize) -> &[usize] {
        let start = self.offsets[vertex];
        &self.triangles[start..start + self.counts[vertex]]
    }

    fn remove(&mut self, vertex: usize, triangle: usize) {
        let start = self.offsets[vertex];
        let end = start + self.counts[vertex];
        if let Some(pos) = self.triangles[start..end].iter().position(|&t| t == triangle) {
            self.triangles.swap(start + pos, end - 1);
            self.counts[vertex] -= 1;
        }
    }
}

/// Greedy triangle reordering driven by a simulated 16 entry LRU cache.
///
/// Returns the new triangle order as indices into `triangles`.
pub(crate) fn optimize_triangle_order(triangles: &[[usize; 3]], vertex_count: usize) -> Vec<usize> {
    let triangle_count = triangles.len();
    if triangle_count == 0 {
        return Vec::new();
    }

    let mut adjacency = Adjacency::new(triangles, vertex_count);
    let mut vertex_scores: Vec<f32> = adjacency
        .counts
        .iter()
        .map(|&c| VALENCE_SCORES[c.min(VALENCE_SIZE)])
        .collect();
    let mut triangle_scores: Vec<f32> = triangles
        .iter()
        .map(|t| t.iter().map(|&v| vertex_scores[v]).sum())
        .collect();

    let mut emitted = vec![false; triangle_count];
    let mut order = Vec::with_capacity(triangle_count);
    let mut cache: Vec<usize> = Vec::with_capacity(CACHE_SIZE + 3);
    let mut current = 0;
    let mut input_cursor = 1;

    loop {
        let triangle = triangles[current];
        order.push(current);
        emitted[current] = true;
        triangle_scores[current] = 0.0;

        // The triangle's vertices move to the front, everything else shifts back.
        let mut next_cache: Vec<usize> = Vec::with_capacity(CACHE_SIZE + 3);
        next_cache.extend(triangle);
        next_cache.extend(cache.iter().copied().filter(|v| !triangle.contains(v)));

        for v in triangle {
            adjacency.remove(v, current);
        }

        let mut best: Option<(usize, f32)> = None;
        for (position, &v) in next_cache.iter().enumerate() {
            if adjacency.counts[v] == 0 {
                continue;
            }

            let cache_score = if position < CACHE_SIZE { CACHE_SCORES[position + 1] } else { 0.0 };
            let score = cache_score + VALENCE_SCORES[adjacency.counts[v].min(VALENCE_SIZE)];
            let difference = score - vertex_scores[v];
            vertex_scores[v] = score;

            for &t in adjacency.live(v) {
                triangle_scores[t] += difference;
                if best.map_or(true, |(_, s)| s < triangle_scores[t]) {
                    best = Some((t, triangle_scores[t]));
                }
            }
        }

        next_cache.truncate(CACHE_SIZE);
        cache = next_cache;

        let next = best.map(|(t, _)| t).or_else(|| {
            while input_cursor < triangle_count {
                if !emitted[input_cursor] {
                    return Some(input_cursor);
                }
                input_cursor += 1;
            }
            None
        });

        match next {
            Some(t) => current = t,
            None => break,
        }
    }

    order
}

/// Reorders the triangles of `group` for vertex cache locality, then
/// renumbers its vertices in first-use order.
///
/// Index and vertex ranges stay where they are. Returns the new local index
/// of every old local vertex.
pub(crate) fn optimize_tri_group(group: &mut TriGroup, vertices: &mut [Vertex], indices: &mut [u32]) -> Vec<u32> {
    let base = group.vert_r_start;
    let vertex_count = (group.vert_r_end - group.vert_r_start) as usize;
    let group_indices = &mut indices[group.index_range()];

    let triangles: Vec<[usize; 3]> = group_indices
        .chunks_exact(3)
        .map(|t| [(t[0] - base) as usize, (t[1] - base) as usize, (t[2] - base) as usize])
        .collect();
    let order = optimize_triangle_order(&triangles, vertex_count);

    // First-use numbering
    let mut remap = vec![u32::MAX; vertex_count];
    let mut next = 0u32;
    for &t in &order {
        for v in triangles[t] {
            if remap[v] == u32::MAX {
                remap[v] = next;
                next += 1;
            }
        }
    }
    for slot in remap.iter_mut().filter(|s| **s == u32::MAX) {
        *slot = next;
        next += 1;
    }

    for (out, &t) in group_indices.chunks_exact_mut(3).zip(&order) {
        for (dst, v) in out.iter_mut().zip(triangles[t]) {
            *dst = base + remap[v];
        }
    }

    let range = group.vertex_range();
    let old_vertices = vertices[range.clone()].to_vec();
    let old_sources = group.corner_sources.clone();
    for (old, vertex) in old_vertices.into_iter().enumerate() {
        vertices[range.start + remap[old] as usize] = vertex;
    }
    for (old, source) in old_sources.into_iter().enumerate() {
        if let Some(slot) = group.corner_sources.get_mut(remap[old] as usize) {
            *slot = source;
        }
    }
    for shared in &mut group.pos_index_to_vertices {
        for v in shared.iter_mut() {
            *v = base + remap[(*v - base) as usize];
        }
    }

    remap
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    /// Average number of cache misses per triangle with a FIFO cache.
    fn acmr(indices: &[u32], cache_size: usize) -> f32 {
        let mut cache = std::collections::VecDeque::new();
        let mut misses = 0;
        for &i in indices {
            if !cache.contains(&i) {
                misses += 1;
                cache.push_back(i);
                if cache.len() > cache_size {
                    cache.pop_front();
                }
            }
        }
        misses as f32 / (indices.len() / 3) as f32
    }

    fn grid(size: u32) -> Vec<u32> {
        let row = size + 1;
        let mut indices = Vec::new();
        // Column-major emission is cache hostile for wide grids.
        for x in 0..size {
            for y in 0..size {
                let v = y * row + x;
                indices.extend([v, v + 1, v + row, v + 1, v + row + 1, v + row]);
            }
        }
        indices
    }

    #[test]
    fn every_triangle_is_emitted_once() {
        let indices = grid(6);
        let triangles: Vec<[usize; 3]> = indices
            .chunks_exact(3)
            .map(|t| [t[0] as usize, t[1] as usize, t[2] as usize])
            .collect();
        let mut order = optimize_triangle_order(&triangles, 49);
        order.sort_unstable();
        assert_eq!(order, (0..triangles.len()).collect::<Vec<_>>());
    }

    #[test]
    fn reordering_keeps_ranges_and_improves_locality() {
        let size = 20;
        let vertex_count = ((size + 1) * (size + 1)) as usize;
        let offset = 5u32;

        let mut indices: Vec<u32> = vec![0; 3];
        indices.extend(grid(size).into_iter().map(|i| i + offset));
        let mut vertices: Vec<Vertex> = (0..offset as usize + vertex_count)
            .map(|i| Vertex {
                pos: Vec3::splat(i as f32),
                dae_pos_index: i,
                ..Default::default()
            })
            .collect();

        let mut group = TriGroup {
            first: 3,
            count: (indices.len() - 3) as u32,
            vert_r_start: offset,
            vert_r_end: offset + vertex_count as u32,
            pos_index_to_vertices: (0..offset as usize + vertex_count).map(|i| {
                if i >= offset as usize { vec![i as u32] } else { Vec::new() }
            }).collect(),
            ..Default::default()
        };

        let before = indices[3..].to_vec();
        let triangles_before: std::collections::HashSet<[u32; 3]> = before
            .chunks_exact(3)
            .map(|t| [vertices[t[0] as usize].dae_pos_index as u32, vertices[t[1] as usize].dae_pos_index as u32, vertices[t[2] as usize].dae_pos_index as u32])
            .collect();

        optimize_tri_group(&mut group, &mut vertices, &mut indices);

        assert_eq!(&indices[..3], &[0, 0, 0]);
        assert!(indices[3..].iter().all(|&i| i >= offset && i < offset + vertex_count as u32));
        // First index of the group refers to the first vertex of the range.
        assert_eq!(indices[3], offset);

        let triangles_after: std::collections::HashSet<[u32; 3]> = indices[3..]
            .chunks_exact(3)
            .map(|t| [vertices[t[0] as usize].dae_pos_index as u32, vertices[t[1] as usize].dae_pos_index as u32, vertices[t[2] as usize].dae_pos_index as u32])
            .collect();
        assert_eq!(triangles_before, triangles_after);

        for (pos, shared) in group.pos_index_to_vertices.iter().enumerate() {
            for &v in shared {
                assert_eq!(vertices[v as usize].dae_pos_index, pos);
            }
        }

        assert!(acmr(&indices[3..], 16) < acmr(&before, 16));
    }
}
