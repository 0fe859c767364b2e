//! Spatial hash of support spheres for collision queries.

use hashbrown::HashMap;
use nalgebra::Point3;

use crate::support::PointRadius;

/// Spatial structure of already placed support spheres.
///
/// Two spheres collide when the distance between their centers is smaller
/// than the sum of their radii.
pub trait PointGrid {
    /// Whether a sphere at `point` with `radius` collides with any inserted
    /// sphere.
    fn collides_with(&self, point: &Point3<f64>, radius: f64) -> bool;

    /// Add a sphere.
    fn insert(&mut self, point: Point3<f64>, radius: f64);
}

/// Uniform hash grid of spheres.
///
/// Queries visit every cell within the query radius plus the largest
/// inserted radius, so any cell size works; it is fastest near the typical
/// sphere radius. When that range spans more cells than are occupied, the
/// occupied cells are scanned instead.
#[derive(Debug, Clone)]
pub struct PointGrid3D {
    cell_size: f64,
    cells: HashMap<(i64, i64, i64), Vec<PointRadius>>,
    max_radius: f64,
    len: usize,
}

impl PointGrid3D {
    /// Create an empty grid. Non-positive or non-finite sizes fall back to 1.
    pub fn new(cell_size: f64) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            1.0
        };
        Self {
            cell_size,
            cells: HashMap::new(),
            max_radius: 0.0,
            len: 0,
        }
    }

    /// Create a grid holding `points`.
    pub fn with_points(cell_size: f64, points: impl IntoIterator<Item = PointRadius>) -> Self {
        let mut grid = Self::new(cell_size);
        for p in points {
            grid.insert(p.point, p.radius);
        }
        grid
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Number of inserted spheres.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate over all inserted spheres, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &PointRadius> + '_ {
        self.cells.values().flatten()
    }

    fn cell_coord(&self, value: f64) -> i64 {
        (value / self.cell_size).floor() as i64
    }
}

impl PointGrid for PointGrid3D {
    fn collides_with(&self, point: &Point3<f64>, radius: f64) -> bool {
        if self.len == 0 {
            return false;
        }

        let reach = radius + self.max_radius;
        let lo = point.map(|c| self.cell_coord(c - reach));
        let hi = point.map(|c| self.cell_coord(c + reach));
        let hits = |spheres: &Vec<PointRadius>| {
            spheres
                .iter()
                .any(|s| (s.point - point).norm() < radius + s.radius)
        };

        let span: f64 = (0..3)
            .map(|axis| hi[axis] as f64 - lo[axis] as f64 + 1.0)
            .product();
        if span > self.cells.len() as f64 {
            return self
                .cells
                .iter()
                .filter(|((x, y, z), _)| {
                    (lo.x..=hi.x).contains(x)
                        && (lo.y..=hi.y).contains(y)
                        && (lo.z..=hi.z).contains(z)
                })
                .any(|(_, spheres)| hits(spheres));
        }

        for x in lo.x..=hi.x {
            for y in lo.y..=hi.y {
                for z in lo.z..=hi.z {
                    if self.cells.get(&(x, y, z)).is_some_and(hits) {
                        return true;
                    }
                }
            }
        }
        false
    }

    fn insert(&mut self, point: Point3<f64>, radius: f64) {
        let cell = (
            self.cell_coord(point.x),
            self.cell_coord(point.y),
            self.cell_coord(point.z),
        );
        self.cells
            .entry(cell)
            .or_default()
            .push(PointRadius::new(point, radius));
        self.max_radius = self.max_radius.max(radius);
        self.len += 1;
    }
}
