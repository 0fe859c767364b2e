//! Removal of very short edges before thickness analysis.
//!
//! Edges shorter than a minimum length are collapsed shortest first. The
//! merged vertex is placed where it stays closest to the planes of all
//! triangles around the edge, and a collapse is only taken when that
//! distance stays within the allowed error.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use hashbrown::{HashMap, HashSet};
use nalgebra::{Matrix4, Point3, Vector3, Vector4};
use tracing::debug;

use crate::{Mesh, Vertex};

/// Statistics of [`remove_small_edges`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollapseResult {
    /// Number of edge collapses performed.
    pub collapses_performed: usize,
    /// Number of short edges left in place (link condition or error bound).
    pub collapses_rejected: usize,
    /// Number of vertices removed from the mesh.
    pub vertices_removed: usize,
    /// Number of faces removed from the mesh.
    pub faces_removed: usize,
}

/// Quadric error matrix of a set of planes.
#[derive(Debug, Clone, Copy)]
struct Quadric(Matrix4<f64>);

impl Quadric {
    fn zero() -> Self {
        Self(Matrix4::zeros())
    }

    /// Quadric of the plane through `point` with unit `normal`.
    fn from_plane(normal: &Vector3<f64>, point: &Point3<f64>) -> Self {
        let p = Vector4::new(normal.x, normal.y, normal.z, -normal.dot(&point.coords));
        Self(p * p.transpose())
    }

    fn add(&mut self, other: &Quadric) {
        self.0 += other.0;
    }

    /// Point minimizing the summed squared plane distances, if unique.
    fn optimal_point(&self) -> Option<Point3<f64>> {
        let a = self.0.fixed_view::<3, 3>(0, 0).into_owned();
        let b = -self.0.fixed_view::<3, 1>(0, 3).into_owned();
        if a.determinant().abs() < 1e-10 {
            return None;
        }
        a.try_inverse().map(|inv| Point3::from(inv * b))
    }
}

/// A short edge in the collapse queue, shortest on top.
#[derive(Debug, Clone, Copy)]
struct ShortEdge {
    length: f64,
    v1: u32,
    v2: u32,
}

impl PartialEq for ShortEdge {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ShortEdge {}

impl PartialOrd for ShortEdge {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ShortEdge {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap behavior, ties broken by index
        other
            .length
            .total_cmp(&self.length)
            .then_with(|| (other.v1, other.v2).cmp(&(self.v1, self.v2)))
    }
}

/// Normalize edge so smaller index comes first.
fn normalize_edge(v1: u32, v2: u32) -> (u32, u32) {
    if v1 < v2 { (v1, v2) } else { (v2, v1) }
}

/// Collapse edges shorter than `min_length` in place.
///
/// A collapse is performed only if the link condition holds (the endpoints
/// share at most two neighbours) and some merge position lies within
/// `max_error` of the planes of every triangle touching either endpoint.
/// Faces that become degenerate are removed and merged-away vertices are
/// compacted out of the vertex list.
///
/// The mesh is left untouched if `min_length` is not positive.
pub fn remove_small_edges(mesh: &mut Mesh, min_length: f64, max_error: f64) -> CollapseResult {
    let enabled = min_length > 0.0 && max_error >= 0.0;
    if mesh.faces.is_empty() || !enabled {
        debug!(min_length, max_error, "Skipping short edge removal");
        return CollapseResult::default();
    }

    let mut state = CollapseState::new(mesh);
    let mut heap = BinaryHeap::new();
    let mut seen = HashSet::new();
    for face in &mesh.faces {
        for i in 0..3 {
            let (v1, v2) = normalize_edge(face[i], face[(i + 1) % 3]);
            if v1 == v2 || !seen.insert((v1, v2)) {
                continue;
            }
            let length = state.distance(v1, v2);
            if length < min_length {
                heap.push(ShortEdge { length, v1, v2 });
            }
        }
    }

    let mut result = CollapseResult::default();

    while let Some(edge) = heap.pop() {
        let v1 = state.actual(edge.v1);
        let v2 = state.actual(edge.v2);
        if v1 == v2 || !state.are_adjacent(v1, v2) {
            continue;
        }

        let length = state.distance(v1, v2);
        if length >= min_length {
            continue;
        }
        if length > edge.length {
            // Endpoints moved since queued
            heap.push(ShortEdge { length, v1, v2 });
            continue;
        }

        if !state.is_link_valid(v1, v2) {
            result.collapses_rejected += 1;
            continue;
        }
        let Some(target) = state.best_target(v1, v2, max_error) else {
            result.collapses_rejected += 1;
            continue;
        };

        state.collapse(v1, v2, target);
        result.collapses_performed += 1;

        for neighbor in state.neighbors(v1) {
            let length = state.distance(v1, neighbor);
            if length < min_length {
                heap.push(ShortEdge {
                    length,
                    v1,
                    v2: neighbor,
                });
            }
        }
    }

    if result.collapses_performed > 0 {
        let original_vertices = mesh.vertices.len();
        let original_faces = mesh.faces.len();
        *mesh = state.build_final_mesh();
        result.vertices_removed = original_vertices - mesh.vertices.len();
        result.faces_removed = original_faces - mesh.faces.len();
    }

    debug!(
        min_length,
        max_error,
        performed = result.collapses_performed,
        rejected = result.collapses_rejected,
        vertices_removed = result.vertices_removed,
        faces_removed = result.faces_removed,
        "Short edge removal complete"
    );

    result
}

struct CollapseState {
    positions: Vec<Point3<f64>>,
    removed: Vec<bool>,
    faces: Vec<Option<[u32; 3]>>,
    vertex_faces: Vec<Vec<usize>>,
    quadrics: Vec<Quadric>,
    remap: HashMap<u32, u32>,
}

impl CollapseState {
    fn new(mesh: &Mesh) -> Self {
        let positions = mesh.positions();
        let mut vertex_faces = vec![Vec::new(); positions.len()];
        let mut quadrics = vec![Quadric::zero(); positions.len()];

        for (face_idx, face) in mesh.faces.iter().enumerate() {
            let plane = mesh
                .triangle(face_idx)
                .and_then(|tri| tri.normal().map(|n| Quadric::from_plane(&n, &tri.v0)));
            for &vi in face {
                let faces = &mut vertex_faces[vi as usize];
                if !faces.contains(&face_idx) {
                    faces.push(face_idx);
                }
                if let Some(q) = &plane {
                    quadrics[vi as usize].add(q);
                }
            }
        }

        Self {
            removed: vec![false; positions.len()],
            positions,
            faces: mesh.faces.iter().copied().map(Some).collect(),
            vertex_faces,
            quadrics,
            remap: HashMap::new(),
        }
    }

    fn distance(&self, v1: u32, v2: u32) -> f64 {
        (self.positions[v1 as usize] - self.positions[v2 as usize]).norm()
    }

    /// Get the actual vertex index following the remap chain.
    fn actual(&self, v: u32) -> u32 {
        let mut current = v;
        while let Some(&next) = self.remap.get(&current) {
            current = next;
        }
        current
    }

    fn live_faces(&self, v: u32) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.vertex_faces[v as usize]
            .iter()
            .filter_map(|&f| self.faces[f])
    }

    fn neighbors(&self, v: u32) -> HashSet<u32> {
        self.live_faces(v)
            .flatten()
            .filter(|&vi| vi != v)
            .collect()
    }

    fn are_adjacent(&self, v1: u32, v2: u32) -> bool {
        self.live_faces(v1).any(|face| face.contains(&v2))
    }

    /// Link condition: at most the two opposite corners of the edge are
    /// shared neighbours.
    fn is_link_valid(&self, v1: u32, v2: u32) -> bool {
        let n1 = self.neighbors(v1);
        let n2 = self.neighbors(v2);
        n1.intersection(&n2).count() <= 2
    }

    fn corner_positions(&self, face: &[u32; 3]) -> [Point3<f64>; 3] {
        face.map(|vi| self.positions[vi as usize])
    }

    /// Merge position for the edge with the smallest plane deviation, if it
    /// stays within `max_error` and flips no surviving triangle.
    fn best_target(&self, v1: u32, v2: u32, max_error: f64) -> Option<Point3<f64>> {
        let mut affected: Vec<usize> = self.vertex_faces[v1 as usize].clone();
        for &f in &self.vertex_faces[v2 as usize] {
            if !affected.contains(&f) {
                affected.push(f);
            }
        }

        let mut planes = Vec::with_capacity(affected.len());
        let mut surviving = Vec::with_capacity(affected.len());
        for &f in &affected {
            let Some(face) = self.faces[f] else { continue };
            let [a, b, c] = self.corner_positions(&face);
            let normal = (b - a).cross(&(c - a));
            let Some(unit) = normal.try_normalize(f64::EPSILON) else {
                continue;
            };
            planes.push((unit, a));
            if !(face.contains(&v1) && face.contains(&v2)) {
                surviving.push((face, normal));
            }
        }

        let p1 = self.positions[v1 as usize];
        let p2 = self.positions[v2 as usize];
        let midpoint = Point3::from((p1.coords + p2.coords) / 2.0);
        let edge_length = (p2 - p1).norm();

        let mut combined = self.quadrics[v1 as usize];
        combined.add(&self.quadrics[v2 as usize]);
        let optimum = combined
            .optimal_point()
            .filter(|p| (p - midpoint).norm() <= edge_length);

        let mut best: Option<(f64, Point3<f64>)> = None;
        for candidate in optimum.into_iter().chain([midpoint, p1, p2]) {
            let flips = surviving.iter().any(|(face, normal)| {
                let moved = face.map(|vi| {
                    if vi == v1 || vi == v2 {
                        candidate
                    } else {
                        self.positions[vi as usize]
                    }
                });
                let new_normal = (moved[1] - moved[0]).cross(&(moved[2] - moved[0]));
                new_normal.dot(normal) <= 0.0
            });
            if flips {
                continue;
            }

            let error = planes
                .iter()
                .map(|(n, p)| n.dot(&(candidate - p)).abs())
                .fold(0.0, f64::max);
            if best.is_none_or(|(e, _)| error < e) {
                best = Some((error, candidate));
            }
        }

        best.filter(|(error, _)| *error <= max_error)
            .map(|(_, p)| p)
    }

    /// Merge `v2` into `v1`, moving `v1` to `target`.
    fn collapse(&mut self, v1: u32, v2: u32, target: Point3<f64>) {
        self.positions[v1 as usize] = target;
        self.removed[v2 as usize] = true;
        self.remap.insert(v2, v1);

        let q2 = self.quadrics[v2 as usize];
        self.quadrics[v1 as usize].add(&q2);

        for f in std::mem::take(&mut self.vertex_faces[v2 as usize]) {
            let Some(mut face) = self.faces[f] else {
                continue;
            };
            for vi in face.iter_mut() {
                if *vi == v2 {
                    *vi = v1;
                }
            }

            if face[0] == face[1] || face[1] == face[2] || face[0] == face[2] {
                self.faces[f] = None;
                for vi in face {
                    self.vertex_faces[vi as usize].retain(|&other| other != f);
                }
            } else {
                self.faces[f] = Some(face);
                self.vertex_faces[v1 as usize].push(f);
            }
        }
    }

    fn build_final_mesh(&self) -> Mesh {
        let mut vertices = Vec::with_capacity(self.positions.len());
        let mut vertex_map = vec![u32::MAX; self.positions.len()];

        for (old_idx, position) in self.positions.iter().enumerate() {
            if !self.removed[old_idx] {
                vertex_map[old_idx] = vertices.len() as u32;
                vertices.push(Vertex::new(*position));
            }
        }

        let faces = self
            .faces
            .iter()
            .flatten()
            .map(|face| face.map(|vi| vertex_map[vi as usize]))
            .filter(|f| f[0] != f[1] && f[1] != f[2] && f[0] != f[2])
            .collect();

        Mesh { vertices, faces }
    }
}
