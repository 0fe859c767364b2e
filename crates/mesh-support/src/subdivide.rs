//! Adaptive subdivision by longest-edge splitting.
//!
//! Triangles with an edge longer than the maximum length are split
//! repeatedly at their longest edge until every edge fits. Each split edge
//! receives `floor(length / max_length)` evenly spaced vertices up front,
//! recorded per edge so that the neighbouring triangle reuses exactly the
//! same vertices and no cracks open along shared edges.
//!
//! Original vertices keep their indices; new vertices are only appended.

use std::collections::VecDeque;

use hashbrown::HashMap;
use nalgebra::Point3;
use tracing::{debug, warn};

use crate::{Mesh, Vertex};

/// Result of adaptive subdivision.
#[derive(Debug, Clone)]
pub struct SubdivideResult {
    /// The subdivided mesh.
    pub mesh: Mesh,
    /// Original triangle count.
    pub original_triangles: usize,
    /// Final triangle count.
    pub final_triangles: usize,
    /// Number of vertices appended along split edges.
    pub vertices_added: usize,
}

/// Split every triangle until no edge is longer than `max_length`.
///
/// # Example
/// ```
/// use mesh_support::{Mesh, subdivide};
///
/// let mesh = Mesh::from_parts(
///     &[[0.0, 0.0, 0.0], [3.0, 0.0, 0.0], [0.0, 0.5, 0.0]],
///     &[[0, 1, 2]],
/// );
/// let divided = subdivide(&mesh, 1.0);
/// assert!(divided.face_count() > 1);
/// assert_eq!(divided.position(1), mesh.position(1));
/// ```
pub fn subdivide(mesh: &Mesh, max_length: f64) -> Mesh {
    subdivide_with_stats(mesh, max_length).mesh
}

/// Same as [`subdivide`], with statistics.
///
/// An invalid `max_length` or a face referring to a missing vertex leaves
/// the mesh unchanged.
pub fn subdivide_with_stats(mesh: &Mesh, max_length: f64) -> SubdivideResult {
    let original_triangles = mesh.faces.len();

    let unchanged = if !max_length.is_finite() || max_length <= 0.0 {
        Some("invalid subdivision length")
    } else if !mesh.has_valid_indices() {
        Some("face refers to a missing vertex")
    } else {
        None
    };
    if let Some(reason) = unchanged {
        warn!(max_length, reason, "Mesh left unchanged by subdivision");
        return SubdivideResult {
            mesh: mesh.clone(),
            original_triangles,
            final_triangles: original_triangles,
            vertices_added: 0,
        };
    }

    let mut divider = EdgeDivider {
        vertices: mesh.vertices.clone(),
        edges: HashMap::new(),
        max_length,
    };
    let mut faces = Vec::with_capacity(original_triangles);
    let mut pending = VecDeque::new();

    for face in &mesh.faces {
        let corners = face.map(|i| mesh.position(i));
        let Some(lengths) = dividable_lengths(&corners, max_length) else {
            faces.push(*face);
            continue;
        };

        let mut current = PendingTriangle {
            indices: *face,
            lengths,
        };
        loop {
            match current.divide_index(max_length) {
                Some(edge) => {
                    let (first, second) = divider.split(&current, edge);
                    pending.push_back(second);
                    current = first;
                }
                None => {
                    faces.push(current.indices);
                    match pending.pop_front() {
                        Some(next) => current = next,
                        None => break,
                    }
                }
            }
        }
    }

    let vertices_added = divider.vertices.len() - mesh.vertices.len();
    let final_triangles = faces.len();

    debug!(
        max_length,
        original_triangles,
        final_triangles,
        vertices_added,
        split_edges = divider.edges.len(),
        "Adaptive subdivision complete"
    );

    SubdivideResult {
        mesh: Mesh {
            vertices: divider.vertices,
            faces,
        },
        original_triangles,
        final_triangles,
        vertices_added,
    }
}

/// Edge lengths of a triangle if any edge exceeds `max_length`.
///
/// Edge `i` joins corners `i` and `i + 1`. The componentwise absolute sum of
/// an edge vector bounds its length from above, so edges are tested largest
/// sum first and the square root is only taken when the sum alone cannot
/// rule the edge out.
fn dividable_lengths(corners: &[Point3<f64>; 3], max_length: f64) -> Option<[f64; 3]> {
    let edges = [
        corners[0] - corners[1],
        corners[1] - corners[2],
        corners[2] - corners[0],
    ];
    let sums = edges.map(|e| e.abs().sum());

    let mut order = [0, 1, 2];
    order.sort_by(|&a, &b| sums[b].total_cmp(&sums[a]));

    for idx in order {
        if sums[idx] <= max_length {
            return None;
        }
        if edges[idx].norm() > max_length {
            return Some(edges.map(|e| e.norm()));
        }
    }
    None
}

/// New vertices along one edge, listed from the smaller endpoint index of
/// the edge key towards the larger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EdgeRun {
    first: u32,
    count: u32,
    ascending: bool,
}

impl EdgeRun {
    /// Vertex index at position `pos` along the run.
    fn vertex_at(&self, pos: u32) -> u32 {
        if self.ascending {
            self.first + pos
        } else {
            self.first - pos
        }
    }

    /// Positions `from..=to` as a run ordered from `from`, which may lie
    /// after `to`.
    fn slice(&self, from: u32, to: u32) -> EdgeRun {
        EdgeRun {
            first: self.vertex_at(from),
            count: from.abs_diff(to) + 1,
            ascending: self.ascending == (from <= to),
        }
    }
}

/// Canonical edge key and whether `(a, b)` had to be swapped.
fn edge_key(a: u32, b: u32) -> ((u32, u32), bool) {
    if a > b { ((b, a), true) } else { ((a, b), false) }
}

#[derive(Debug, Clone, Copy)]
struct PendingTriangle {
    indices: [u32; 3],
    /// Length of edge `i`, joining corners `i` and `i + 1`.
    lengths: [f64; 3],
}

impl PendingTriangle {
    /// Longest edge, if it is longer than `max_length`.
    fn divide_index(&self, max_length: f64) -> Option<usize> {
        let l = &self.lengths;
        let idx = if l[0] > l[1] && l[0] > l[2] {
            0
        } else if l[1] > l[2] {
            1
        } else {
            2
        };
        (l[idx] > max_length).then_some(idx)
    }
}

struct EdgeDivider {
    vertices: Vec<Vertex>,
    edges: HashMap<(u32, u32), EdgeRun>,
    max_length: f64,
}

impl EdgeDivider {
    fn position(&self, index: u32) -> Point3<f64> {
        self.vertices[index as usize].position
    }

    /// Append `count` evenly spaced vertices between the key endpoints.
    fn create_run(&mut self, key: (u32, u32), count: u32) -> EdgeRun {
        let start = self.position(key.0);
        let dir = self.position(key.1) - start;
        let segments = f64::from(count + 1);

        let run = EdgeRun {
            first: self.vertices.len() as u32,
            count,
            ascending: true,
        };
        for i in 1..=count {
            self.vertices
                .push(Vertex::new(start + dir * (f64::from(i) / segments)));
        }
        self.edges.insert(key, run);
        run
    }

    /// Split `tri` at one vertex of its edge `edge`.
    ///
    /// The first child keeps corner `edge`, the second keeps corner
    /// `edge + 1`; both keep the opposite corner.
    fn split(&mut self, tri: &PendingTriangle, edge: usize) -> (PendingTriangle, PendingTriangle) {
        let i0 = edge;
        let i1 = (edge + 1) % 3;
        let i2 = (edge + 2) % 3;
        let [vi0, vi1, vi2] = [tri.indices[i0], tri.indices[i1], tri.indices[i2]];
        let l = &tri.lengths;

        let (key, key_swap) = edge_key(vi0, vi1);
        let run = match self.edges.get(&key) {
            Some(run) => *run,
            None => {
                let count = ((l[i0] / self.max_length).floor() as u32).max(1);
                self.create_run(key, count)
            }
        };
        let n = run.count;

        // Even runs have no middle vertex; pick the one on the side that keeps
        // both neighbours approaching the middle consistently.
        let mut offset = n / 2;
        if n % 2 == 0 && key_swap == (l[i1] < l[i2]) {
            offset -= 1;
        }
        let new_index = run.vertex_at(offset);

        let new_len = (self.position(vi2) - self.position(new_index)).norm();
        let ratio = f64::from(offset + 1) / f64::from(n + 1);
        let mut len1 = l[i0] * ratio;
        let mut len2 = l[i0] - len1;
        if key_swap {
            std::mem::swap(&mut len1, &mut len2);
        }

        if offset > 0 {
            let lower = if key.0 < new_index {
                run.slice(0, offset - 1)
            } else {
                run.slice(offset - 1, 0)
            };
            self.edges
                .entry(edge_key(key.0, new_index).0)
                .or_insert(lower);
        }
        if offset + 1 < n {
            let upper = if new_index < key.1 {
                run.slice(offset + 1, n - 1)
            } else {
                run.slice(n - 1, offset + 1)
            };
            self.edges
                .entry(edge_key(new_index, key.1).0)
                .or_insert(upper);
        }

        (
            PendingTriangle {
                indices: [vi0, new_index, vi2],
                lengths: [len1, new_len, l[i2]],
            },
            PendingTriangle {
                indices: [new_index, vi1, vi2],
                lengths: [len2, l[i1], new_len],
            },
        )
    }
}
