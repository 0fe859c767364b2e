//! Indexed triangle meshes and per-triangle geometry.

use nalgebra::{Point3, Vector3};

use crate::error::{SupportError, SupportResult};

/// A mesh vertex. Units follow the input mesh, usually millimeters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: Point3<f64>,
}

impl Vertex {
    #[inline]
    pub fn new(position: Point3<f64>) -> Self {
        Self { position }
    }

    #[inline]
    pub fn from_coords(x: f64, y: f64, z: f64) -> Self {
        Self::new(Point3::new(x, y, z))
    }
}

/// Indexed triangle mesh, faces wound counter-clockwise seen from outside.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    /// Corner indices into `vertices`.
    pub faces: Vec<[u32; 3]>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mesh from raw positions and faces.
    pub fn from_parts(positions: &[[f64; 3]], faces: &[[u32; 3]]) -> Self {
        Self {
            vertices: positions
                .iter()
                .map(|&[x, y, z]| Vertex::from_coords(x, y, z))
                .collect(),
            faces: faces.to_vec(),
        }
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// True when there is nothing to sample: no vertices or no faces.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Position of the vertex at `index`.
    #[inline]
    pub fn position(&self, index: u32) -> Point3<f64> {
        self.vertices[index as usize].position
    }

    /// All vertex positions, in index order.
    pub fn positions(&self) -> Vec<Point3<f64>> {
        self.vertices.iter().map(|v| v.position).collect()
    }

    /// Opposite corners of the axis-aligned box around all vertices.
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let first = self.vertices.first()?.position;
        let (min, max) = self.vertices[1..]
            .iter()
            .fold((first, first), |(min, max), v| {
                (min.inf(&v.position), max.sup(&v.position))
            });
        Some((min, max))
    }

    /// Every face resolved to its corner positions, in face order.
    pub fn triangles(&self) -> impl Iterator<Item = Triangle> + '_ {
        self.faces.iter().map(|face| self.face_triangle(face))
    }

    /// Face `face_idx` resolved to its corner positions.
    pub fn triangle(&self, face_idx: usize) -> Option<Triangle> {
        self.faces.get(face_idx).map(|face| self.face_triangle(face))
    }

    #[inline]
    fn face_triangle(&self, &[i0, i1, i2]: &[u32; 3]) -> Triangle {
        Triangle {
            v0: self.position(i0),
            v1: self.position(i1),
            v2: self.position(i2),
        }
    }

    pub fn surface_area(&self) -> f64 {
        self.triangles().map(|t| t.area()).sum()
    }

    /// Length of the shortest triangle side in the mesh.
    ///
    /// Returns `None` for a mesh without faces.
    pub fn min_edge_length(&self) -> Option<f64> {
        self.triangles()
            .map(|tri| tri.min_edge_length())
            .min_by(f64::total_cmp)
    }

    /// True when every face corner refers to an existing vertex.
    pub fn has_valid_indices(&self) -> bool {
        let vertex_count = self.vertices.len();
        self.faces.iter().flatten().all(|&v| (v as usize) < vertex_count)
    }

    /// Check that every face references an existing vertex and that every
    /// coordinate is finite.
    pub fn validate(&self) -> SupportResult<()> {
        let vertex_count = self.vertices.len();
        for (face_index, face) in self.faces.iter().enumerate() {
            if let Some(&bad) = face.iter().find(|&&v| v as usize >= vertex_count) {
                return Err(SupportError::invalid_vertex_index(
                    face_index,
                    bad,
                    vertex_count,
                ));
            }
        }
        for (vertex_index, vertex) in self.vertices.iter().enumerate() {
            if let Some(&value) = vertex.position.coords.iter().find(|c| !c.is_finite()) {
                return Err(SupportError::invalid_coordinate(vertex_index, value));
            }
        }
        Ok(())
    }
}

/// Three corner positions of a face.
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    pub v0: Point3<f64>,
    pub v1: Point3<f64>,
    pub v2: Point3<f64>,
}

impl Triangle {
    #[inline]
    pub fn new(v0: Point3<f64>, v1: Point3<f64>, v2: Point3<f64>) -> Self {
        Self { v0, v1, v2 }
    }

    /// `(v1 - v0) x (v2 - v0)`: outward for counter-clockwise corners, twice
    /// the area long.
    #[inline]
    pub fn scaled_normal(&self) -> Vector3<f64> {
        (self.v1 - self.v0).cross(&(self.v2 - self.v0))
    }

    /// Unit normal, `None` if the corners are collinear.
    pub fn normal(&self) -> Option<Vector3<f64>> {
        self.scaled_normal().try_normalize(f64::EPSILON)
    }

    #[inline]
    pub fn area(&self) -> f64 {
        0.5 * self.scaled_normal().norm()
    }

    #[inline]
    pub fn centroid(&self) -> Point3<f64> {
        self.interpolate(1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0)
    }

    /// Side lengths; side `i` runs from corner `i` to corner `i + 1`.
    #[inline]
    pub fn edge_lengths(&self) -> [f64; 3] {
        [
            nalgebra::distance(&self.v0, &self.v1),
            nalgebra::distance(&self.v1, &self.v2),
            nalgebra::distance(&self.v2, &self.v0),
        ]
    }

    #[inline]
    pub fn min_edge_length(&self) -> f64 {
        self.edge_lengths().into_iter().fold(f64::INFINITY, f64::min)
    }

    #[inline]
    pub fn max_edge_length(&self) -> f64 {
        self.edge_lengths().into_iter().fold(0.0, f64::max)
    }

    /// Point at barycentric weights `(b0, b1, b2)`.
    #[inline]
    pub fn interpolate(&self, b0: f64, b1: f64, b2: f64) -> Point3<f64> {
        Point3::from(self.v0.coords * b0 + self.v1.coords * b1 + self.v2.coords * b2)
    }
}
