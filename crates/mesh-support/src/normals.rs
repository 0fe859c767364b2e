//! Per-vertex and per-face normals.
//!
//! Vertex normals are accumulated from the adjacent faces. The weighting of
//! each face contribution is selected with [`NormalStrategy`].

use nalgebra::Vector3;
use tracing::{debug, warn};

use crate::types::Mesh;

/// How adjacent face normals are weighted when building a vertex normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "pipeline-config",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum NormalStrategy {
    /// Plain mean of the unit normals of all adjacent faces.
    AverageNeighbor,
    /// Unit face normals weighted by the face's interior angle at the vertex.
    AngleWeighted,
    /// Face normals weighted by face area.
    AreaWeighted,
    /// Nelson Max weighting: `(e1 x e2) / (|e1|^2 |e2|^2)`, exact for
    /// vertices sampled from a sphere.
    #[default]
    NelsonMaxWeighted,
}

/// Compute unit face normals, aligned with `mesh.faces`.
///
/// Degenerate faces get a zero vector.
pub fn compute_triangle_normals(mesh: &Mesh) -> Vec<Vector3<f64>> {
    mesh.triangles()
        .map(|tri| tri.normal().unwrap_or_else(Vector3::zeros))
        .collect()
}

/// Compute unit vertex normals, aligned with `mesh.vertices`.
///
/// Vertices without any non-degenerate adjacent face get a zero vector.
/// A face referring to a missing vertex makes the result empty.
pub fn compute_vertex_normals(mesh: &Mesh, strategy: NormalStrategy) -> Vec<Vector3<f64>> {
    if !mesh.has_valid_indices() {
        warn!(
            vertices = mesh.vertices.len(),
            "Face refers to a missing vertex, no vertex normals computed"
        );
        return Vec::new();
    }

    let mut accum = vec![Vector3::zeros(); mesh.vertices.len()];

    for face in &mesh.faces {
        let p = [
            mesh.position(face[0]),
            mesh.position(face[1]),
            mesh.position(face[2]),
        ];
        let cross = (p[1] - p[0]).cross(&(p[2] - p[0]));
        let cross_len = cross.norm();
        if cross_len <= f64::EPSILON {
            continue;
        }
        let unit = cross / cross_len;

        for corner in 0..3 {
            let e1 = p[(corner + 1) % 3] - p[corner];
            let e2 = p[(corner + 2) % 3] - p[corner];
            let contribution = match strategy {
                NormalStrategy::AverageNeighbor => unit,
                NormalStrategy::AngleWeighted => unit * corner_angle(&e1, &e2),
                // |cross| = 2 * area
                NormalStrategy::AreaWeighted => cross,
                NormalStrategy::NelsonMaxWeighted => {
                    let denom = e1.norm_squared() * e2.norm_squared();
                    if denom <= f64::EPSILON {
                        continue;
                    }
                    // Same orientation as `cross` for every corner of a CCW face.
                    e1.cross(&e2) / denom
                }
            };
            accum[face[corner] as usize] += contribution;
        }
    }

    for normal in &mut accum {
        let len = normal.norm();
        if len > f64::EPSILON {
            *normal /= len;
        } else {
            *normal = Vector3::zeros();
        }
    }

    debug!(
        vertices = accum.len(),
        strategy = ?strategy,
        "Computed vertex normals"
    );

    accum
}

fn corner_angle(e1: &Vector3<f64>, e2: &Vector3<f64>) -> f64 {
    let denom = e1.norm() * e2.norm();
    if denom <= f64::EPSILON {
        return 0.0;
    }
    (e1.dot(e2) / denom).clamp(-1.0, 1.0).acos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Closed axis-aligned box, CCW from outside.
    fn make_box(size: f64) -> Mesh {
        let s = size;
        Mesh::from_parts(
            &[
                [0.0, 0.0, 0.0],
                [s, 0.0, 0.0],
                [s, s, 0.0],
                [0.0, s, 0.0],
                [0.0, 0.0, s],
                [s, 0.0, s],
                [s, s, s],
                [0.0, s, s],
            ],
            &[
                [0, 2, 1],
                [0, 3, 2],
                [4, 5, 6],
                [4, 6, 7],
                [0, 1, 5],
                [0, 5, 4],
                [3, 7, 6],
                [3, 6, 2],
                [0, 4, 7],
                [0, 7, 3],
                [1, 2, 6],
                [1, 6, 5],
            ],
        )
    }

    #[test]
    fn test_triangle_normals() {
        let mesh = make_box(2.0);
        let normals = compute_triangle_normals(&mesh);
        assert_eq!(normals.len(), 12);
        assert_relative_eq!(normals[0], Vector3::new(0.0, 0.0, -1.0));
        assert_relative_eq!(normals[2], Vector3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_flat_patch_normals_all_strategies() {
        let mesh = Mesh::from_parts(
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
            &[[0, 1, 2], [0, 2, 3]],
        );
        for strategy in [
            NormalStrategy::AverageNeighbor,
            NormalStrategy::AngleWeighted,
            NormalStrategy::AreaWeighted,
            NormalStrategy::NelsonMaxWeighted,
        ] {
            let normals = compute_vertex_normals(&mesh, strategy);
            for n in normals {
                assert_relative_eq!(n, Vector3::new(0.0, 0.0, 1.0), epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_box_corner_normals_point_outward() {
        let mesh = make_box(1.0);
        let center = nalgebra::Point3::new(0.5, 0.5, 0.5);
        for strategy in [
            NormalStrategy::AngleWeighted,
            NormalStrategy::NelsonMaxWeighted,
        ] {
            let normals = compute_vertex_normals(&mesh, strategy);
            for (vertex, n) in mesh.vertices.iter().zip(&normals) {
                assert_relative_eq!(n.norm(), 1.0, epsilon = 1e-12);
                assert!(n.dot(&(vertex.position - center)) > 0.0);
            }
        }
    }

    #[test]
    fn test_angle_weighted_box_corner_is_diagonal() {
        // Each corner sees three faces with a total angle of PI/2 each.
        let mesh = make_box(1.0);
        let normals = compute_vertex_normals(&mesh, NormalStrategy::AngleWeighted);
        let expected = Vector3::new(-1.0, -1.0, -1.0).normalize();
        assert_relative_eq!(normals[0], expected, epsilon = 1e-12);
    }

    #[test]
    fn test_unreferenced_vertex_gets_zero_normal() {
        let mut mesh = make_box(1.0);
        mesh.vertices.push(crate::Vertex::from_coords(5.0, 5.0, 5.0));
        let normals = compute_vertex_normals(&mesh, NormalStrategy::default());
        assert_eq!(normals.len(), 9);
        assert_relative_eq!(normals[8], Vector3::zeros());
    }

    #[test]
    fn test_out_of_range_index_gives_no_normals() {
        let mut mesh = make_box(1.0);
        mesh.faces.push([0, 1, 8]);
        assert!(compute_vertex_normals(&mesh, NormalStrategy::default()).is_empty());
    }
}
