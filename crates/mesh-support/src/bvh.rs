//! Bounding volume hierarchy for first-hit ray queries.
//!
//! [`RayIndex`] is built once over a mesh and then only read, so it can be
//! shared across rayon workers while widths are measured.

use nalgebra::{Point3, Vector3};
use tracing::debug;

use crate::normals::compute_triangle_normals;
use crate::types::{Mesh, Triangle};

/// Epsilon used for ray-triangle and box tests.
const RAY_EPSILON: f64 = 1e-10;

/// Closest intersection of a ray with the indexed mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Distance along the (unit) ray direction.
    pub distance: f64,
    /// Index of the hit face.
    pub face: usize,
}

/// Axis-aligned bounding box for spatial acceleration.
#[derive(Debug, Clone, Copy)]
struct Aabb {
    min: Point3<f64>,
    max: Point3<f64>,
}

impl Aabb {
    fn from_triangle(tri: &Triangle) -> Self {
        Self {
            min: tri.v0.inf(&tri.v1).inf(&tri.v2),
            max: tri.v0.sup(&tri.v1).sup(&tri.v2),
        }
    }

    fn merge(&self, other: &Aabb) -> Self {
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Grow every side by `pad`.
    fn padded(&self, pad: f64) -> Self {
        let pad = Vector3::repeat(pad);
        Self {
            min: self.min - pad,
            max: self.max + pad,
        }
    }

    /// Parameter interval `(enter, exit)` of the ray inside the box, clipped
    /// to `t >= 0`.
    fn ray_intersect(&self, origin: &Point3<f64>, dir_inv: &Vector3<f64>) -> Option<(f64, f64)> {
        let to_min = (self.min - origin).component_mul(dir_inv);
        let to_max = (self.max - origin).component_mul(dir_inv);

        let enter = to_min.inf(&to_max).max();
        let exit = to_min.sup(&to_max).min();

        (exit >= enter && exit >= 0.0).then(|| (enter.max(0.0), exit))
    }
}

#[derive(Debug)]
enum BvhNode {
    Leaf {
        aabb: Aabb,
        face_idx: usize,
    },
    Internal {
        aabb: Aabb,
        left: Box<BvhNode>,
        right: Box<BvhNode>,
    },
}

impl BvhNode {
    /// Build a subtree over `indices`, splitting at the centroid median of the
    /// longest axis.
    fn build(boxes: &[Aabb], centroids: &[Point3<f64>], indices: &mut [usize]) -> Option<Self> {
        match indices {
            [] => return None,
            [idx] => {
                return Some(BvhNode::Leaf {
                    aabb: boxes[*idx].padded(RAY_EPSILON),
                    face_idx: *idx,
                });
            }
            _ => {}
        }

        let combined = indices[1..]
            .iter()
            .fold(boxes[indices[0]], |acc, &idx| acc.merge(&boxes[idx]))
            .padded(RAY_EPSILON);

        let extent = combined.max - combined.min;
        let axis = extent.imax();

        indices.sort_unstable_by(|&a, &b| centroids[a][axis].total_cmp(&centroids[b][axis]));

        let mid = indices.len() / 2;
        let (left_indices, right_indices) = indices.split_at_mut(mid);
        let left = BvhNode::build(boxes, centroids, left_indices);
        let right = BvhNode::build(boxes, centroids, right_indices);

        match (left, right) {
            (Some(l), Some(r)) => Some(BvhNode::Internal {
                aabb: combined,
                left: Box::new(l),
                right: Box::new(r),
            }),
            (Some(n), None) | (None, Some(n)) => Some(n),
            (None, None) => None,
        }
    }

    fn aabb(&self) -> &Aabb {
        match self {
            BvhNode::Leaf { aabb, .. } => aabb,
            BvhNode::Internal { aabb, .. } => aabb,
        }
    }
}

/// Ray parameter of the hit with `tri`, from either side, if beyond `epsilon`
/// (Möller-Trumbore).
fn ray_triangle_intersect(
    origin: &Point3<f64>,
    direction: &Vector3<f64>,
    tri: &Triangle,
    epsilon: f64,
) -> Option<f64> {
    let e1 = tri.v1 - tri.v0;
    let e2 = tri.v2 - tri.v0;

    let p = direction.cross(&e2);
    let det = e1.dot(&p);
    if det.abs() < epsilon {
        return None;
    }
    let inv_det = det.recip();

    let to_origin = origin - tri.v0;
    let u = to_origin.dot(&p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = to_origin.cross(&e1);
    let v = direction.dot(&q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = e2.dot(&q) * inv_det;
    (t > epsilon).then_some(t)
}

/// Acceleration structure over a mesh for nearest-hit ray casting, with the
/// unit normal of every face.
#[derive(Debug)]
pub struct RayIndex {
    triangles: Vec<Triangle>,
    normals: Vec<Vector3<f64>>,
    root: Option<BvhNode>,
}

impl RayIndex {
    /// Build the hierarchy and face normals for `mesh`.
    pub fn build(mesh: &Mesh) -> Self {
        let triangles: Vec<Triangle> = mesh.triangles().collect();
        let normals = compute_triangle_normals(mesh);

        let boxes: Vec<Aabb> = triangles.iter().map(Aabb::from_triangle).collect();
        let centroids: Vec<Point3<f64>> = triangles.iter().map(Triangle::centroid).collect();
        let mut indices: Vec<usize> = (0..triangles.len()).collect();
        let root = BvhNode::build(&boxes, &centroids, &mut indices);

        debug!(faces = triangles.len(), "Built ray index");

        Self {
            triangles,
            normals,
            root,
        }
    }

    /// Number of indexed faces.
    pub fn face_count(&self) -> usize {
        self.triangles.len()
    }

    /// Unit normal of `face`, zero for degenerate faces.
    pub fn face_normal(&self, face: usize) -> Vector3<f64> {
        self.normals[face]
    }

    /// First intersection of the ray `origin + t * direction`, `t > 0`.
    ///
    /// `direction` is expected to be unit length so the returned distance is
    /// metric.
    pub fn first_hit(&self, origin: &Point3<f64>, direction: &Vector3<f64>) -> Option<RayHit> {
        let root = self.root.as_ref()?;
        let dir_inv = direction.map(|c| {
            if c.abs() > RAY_EPSILON {
                1.0 / c
            } else {
                f64::MAX
            }
        });
        self.trace(root, origin, direction, &dir_inv, f64::INFINITY)
            .map(|(distance, face)| RayHit { distance, face })
    }

    /// Trace a ray through the subtree and return the closest hit closer than
    /// `max_dist`.
    fn trace(
        &self,
        node: &BvhNode,
        origin: &Point3<f64>,
        direction: &Vector3<f64>,
        dir_inv: &Vector3<f64>,
        max_dist: f64,
    ) -> Option<(f64, usize)> {
        let (t_near, _) = node.aabb().ray_intersect(origin, dir_inv)?;
        if t_near > max_dist {
            return None;
        }

        match node {
            BvhNode::Leaf { face_idx, .. } => {
                ray_triangle_intersect(origin, direction, &self.triangles[*face_idx], RAY_EPSILON)
                    .filter(|&t| t <= max_dist)
                    .map(|t| (t, *face_idx))
            }
            BvhNode::Internal { left, right, .. } => {
                let hit_left = self.trace(left, origin, direction, dir_inv, max_dist);
                let max_dist_right = hit_left.map_or(max_dist, |(t, _)| t);
                let hit_right = self.trace(right, origin, direction, dir_inv, max_dist_right);

                match (hit_left, hit_right) {
                    (Some(l), Some(r)) => Some(if l.0 <= r.0 { l } else { r }),
                    (Some(h), None) | (None, Some(h)) => Some(h),
                    (None, None) => None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Two parallel square plates, `gap` apart, facing away from each other.
    fn make_plates(gap: f64) -> Mesh {
        Mesh::from_parts(
            &[
                [-10.0, -10.0, 0.0],
                [10.0, -10.0, 0.0],
                [10.0, 10.0, 0.0],
                [-10.0, 10.0, 0.0],
                [-10.0, -10.0, gap],
                [10.0, -10.0, gap],
                [10.0, 10.0, gap],
                [-10.0, 10.0, gap],
            ],
            &[[0, 2, 1], [0, 3, 2], [4, 5, 6], [4, 6, 7]],
        )
    }

    #[test]
    fn test_ray_triangle_cases() {
        let tri = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
        );
        let down = -Vector3::z();

        let cases = [
            // origin, direction, expected distance
            (Point3::new(0.5, 0.5, 3.0), down, Some(3.0)),
            (Point3::new(0.5, 0.5, -3.0), Vector3::z(), Some(3.0)),
            (Point3::new(0.5, 0.5, -3.0), down, None),
            (Point3::new(1.5, 1.5, 3.0), down, None),
            (Point3::new(0.5, 0.5, 1.0), Vector3::x(), None),
        ];
        for (origin, direction, expected) in cases {
            let t = ray_triangle_intersect(&origin, &direction, &tri, RAY_EPSILON);
            match expected {
                Some(d) => assert_relative_eq!(t.unwrap(), d, epsilon = 1e-12),
                None => assert!(t.is_none(), "unexpected hit from {:?}", origin),
            }
        }
    }

    #[test]
    fn test_box_interval() {
        let unit = Aabb {
            min: Point3::new(-1.0, -1.0, -1.0),
            max: Point3::new(1.0, 1.0, 1.0),
        };
        let inv = |d: Vector3<f64>| d.map(|c| if c == 0.0 { f64::MAX } else { 1.0 / c });

        let (enter, exit) = unit
            .ray_intersect(&Point3::new(0.0, 0.0, -4.0), &inv(Vector3::z()))
            .unwrap();
        assert_relative_eq!(enter, 3.0);
        assert_relative_eq!(exit, 5.0);

        // Starting inside clips the entry to zero
        let (enter, exit) = unit
            .ray_intersect(&Point3::origin(), &inv(Vector3::x()))
            .unwrap();
        assert_relative_eq!(enter, 0.0);
        assert_relative_eq!(exit, 1.0);

        assert!(unit
            .ray_intersect(&Point3::new(3.0, 0.0, -4.0), &inv(Vector3::z()))
            .is_none());
        assert!(unit
            .ray_intersect(&Point3::new(0.0, 0.0, 4.0), &inv(Vector3::z()))
            .is_none());
    }

    #[test]
    fn test_first_hit_between_plates() {
        let index = RayIndex::build(&make_plates(2.0));
        assert_eq!(index.face_count(), 4);

        let hit = index
            .first_hit(&Point3::new(1.0, 2.0, 0.5), &Vector3::z())
            .unwrap();
        assert_relative_eq!(hit.distance, 1.5, epsilon = 1e-12);
        assert!(hit.face == 2 || hit.face == 3);
        assert_relative_eq!(index.face_normal(hit.face), Vector3::z());

        // Looking down finds the bottom plate, whose normal points down.
        let hit = index
            .first_hit(&Point3::new(1.0, 2.0, 0.5), &-Vector3::z())
            .unwrap();
        assert_relative_eq!(hit.distance, 0.5, epsilon = 1e-12);
        assert_relative_eq!(index.face_normal(hit.face), -Vector3::z());
    }

    #[test]
    fn test_first_hit_returns_closest() {
        // Three stacked plates; the ray must stop at the nearest one.
        let mut mesh = make_plates(4.0);
        let base = mesh.vertices.len() as u32;
        for [x, y] in [[-10.0, -10.0], [10.0, -10.0], [10.0, 10.0], [-10.0, 10.0]] {
            mesh.vertices.push(crate::Vertex::from_coords(x, y, 1.0));
        }
        mesh.faces.push([base, base + 1, base + 2]);
        mesh.faces.push([base, base + 2, base + 3]);

        let index = RayIndex::build(&mesh);
        let dir = Vector3::new(0.1, 0.0, 1.0).normalize();
        let hit = index.first_hit(&Point3::new(0.0, 0.0, 0.5), &dir).unwrap();
        assert!(hit.face >= 4);
        assert_relative_eq!(hit.distance, 0.5 / dir.z, epsilon = 1e-12);
    }

    #[test]
    fn test_first_hit_miss_and_empty() {
        let index = RayIndex::build(&make_plates(2.0));
        let miss = index.first_hit(&Point3::new(50.0, 0.0, 1.0), &Vector3::z());
        assert!(miss.is_none());

        let empty = RayIndex::build(&Mesh::new());
        assert!(empty.first_hit(&Point3::origin(), &Vector3::z()).is_none());
    }
}
