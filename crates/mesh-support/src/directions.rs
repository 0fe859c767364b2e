//! Ray directions for shape diameter sampling.
//!
//! Directions are generated once around the +Z axis with a golden-angle
//! (Fibonacci) spiral and rotated onto each surface point's inward normal
//! when rays are cast. Each direction's weight is its Z component, so rays
//! close to the axis count more than grazing ones.

use std::f64::consts::PI;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use nalgebra::Vector3;
use tracing::{debug, info};

use crate::error::{SupportError, SupportResult};

/// Default file name used by [`store_directions`].
pub const DIRECTIONS_DEBUG_FILE: &str = "unit_z_rays.stl";

/// A unit ray direction relative to the +Z sampling axis.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "pipeline-config",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Direction {
    /// Unit vector inside the sampling cone.
    pub dir: Vector3<f64>,
    /// Trust in rays cast along this direction, equal to `dir.z`.
    pub weight: f64,
}

impl Direction {
    /// The sampling axis itself, with full weight.
    pub fn axis() -> Self {
        Self {
            dir: Vector3::z(),
            weight: 1.0,
        }
    }
}

/// Generate up to `count_samples` directions inside a cone around +Z.
///
/// `angle` is the full cone opening in degrees and must lie strictly between
/// 1 and 180. Generation walks a Fibonacci spiral from the pole downwards and
/// stops as soon as the Z coordinate falls below `cos(angle / 2)`, so fewer
/// than `count_samples` directions are usually returned.
///
/// A `count_samples` of 0 or 1 yields just the axis with weight 1.
///
/// # Example
/// ```
/// use mesh_support::create_fibonacci_sphere_samples;
///
/// let dirs = create_fibonacci_sphere_samples(60.0, 10);
/// let min_z = (30.0_f64).to_radians().cos();
/// assert!(dirs.iter().all(|d| d.dir.z >= min_z));
/// ```
pub fn create_fibonacci_sphere_samples(angle: f64, count_samples: usize) -> Vec<Direction> {
    if count_samples <= 1 {
        return vec![Direction::axis()];
    }
    debug_assert!(angle > 1.0 && angle < 180.0, "cone angle out of range");
    let min_z = (angle / 2.0).to_radians().cos();

    let phi = PI * (3.0 - 5.0_f64.sqrt()); // Golden angle
    let last = (count_samples - 1) as f64;

    let mut points = Vec::with_capacity(count_samples);
    for i in 0..count_samples {
        let z = 1.0 - i as f64 / last;
        if z < min_z {
            break;
        }
        let radius = (1.0 - z * z).sqrt();
        let theta = phi * i as f64;
        let dir = Vector3::new(theta.cos() * radius, theta.sin() * radius, z);
        points.push(Direction { dir, weight: z });
    }

    debug!(
        angle,
        requested = count_samples,
        generated = points.len(),
        "Generated Fibonacci ray directions"
    );
    points
}

/// Write the directions as a small STL to [`DIRECTIONS_DEBUG_FILE`] in the
/// working directory.
pub fn store_directions(dirs: &[Direction]) -> SupportResult<()> {
    store_directions_to(dirs, Path::new(DIRECTIONS_DEBUG_FILE))
}

/// Write the directions as a small STL for visual inspection.
///
/// Each direction becomes two skinny triangles sharing an apex at three
/// times the direction, crossed along the X and Y axes.
pub fn store_directions_to(dirs: &[Direction], path: &Path) -> SupportResult<()> {
    let triangles = direction_triangles(dirs);

    let file = File::create(path).map_err(|e| SupportError::io_write(path, e))?;
    let mut writer = BufWriter::new(file);
    stl_io::write_stl(&mut writer, triangles.iter()).map_err(|e| SupportError::io_write(path, e))?;
    writer
        .flush()
        .map_err(|e| SupportError::io_write(path, e))?;

    info!(
        directions = dirs.len(),
        triangles = triangles.len(),
        path = %path.display(),
        "Stored ray directions"
    );
    Ok(())
}

fn direction_triangles(dirs: &[Direction]) -> Vec<stl_io::Triangle> {
    const TRIANGLE_SIZE: f64 = 1e-1;
    const TRIANGLE_LENGTH: f64 = 3.0;
    let half = TRIANGLE_SIZE / 2.0;

    let to_vertex =
        |v: Vector3<f64>| stl_io::Vertex::new([v.x as f32, v.y as f32, v.z as f32]);

    let mut triangles = Vec::with_capacity(2 * dirs.len());
    for d in dirs {
        for offset in [Vector3::new(half, 0.0, 0.0), Vector3::new(0.0, half, 0.0)] {
            triangles.push(stl_io::Triangle {
                normal: stl_io::Normal::new([0.0, 0.0, 0.0]), // Readers recompute
                vertices: [
                    to_vertex(d.dir * TRIANGLE_LENGTH),
                    to_vertex(d.dir + offset),
                    to_vertex(d.dir - offset),
                ],
            });
        }
    }
    triangles
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_single_sample_is_axis() {
        for count in [0, 1] {
            let dirs = create_fibonacci_sphere_samples(90.0, count);
            assert_eq!(dirs.len(), 1);
            assert_relative_eq!(dirs[0].dir, Vector3::z());
            assert_relative_eq!(dirs[0].weight, 1.0);
        }
    }

    #[test]
    fn test_directions_inside_cone() {
        let dirs = create_fibonacci_sphere_samples(60.0, 10);
        let min_z = 30.0_f64.to_radians().cos();
        assert!(!dirs.is_empty());
        for d in &dirs {
            assert!(d.dir.z >= min_z, "z = {} below {}", d.dir.z, min_z);
            assert_relative_eq!(d.dir.norm(), 1.0, epsilon = 1e-12);
            assert_relative_eq!(d.weight, d.dir.z);
        }
    }

    #[test]
    fn test_spiral_stops_early() {
        // z steps by 1/99; cos(15deg) ~ 0.966 keeps only the first few samples
        let dirs = create_fibonacci_sphere_samples(30.0, 100);
        assert!(dirs.len() < 100);
        assert_eq!(dirs.len(), 4);
        assert_relative_eq!(dirs[0].dir, Vector3::z());
    }

    #[test]
    fn test_hemisphere_keeps_upper_half() {
        let dirs = create_fibonacci_sphere_samples(179.0, 201);
        // z = 1 - i/200 stays >= cos(89.5deg) ~ 0.0087 up to i = 198
        assert_eq!(dirs.len(), 199);
        assert!(dirs.iter().all(|d| d.dir.z > 0.0));
    }

    #[test]
    fn test_deterministic() {
        let a = create_fibonacci_sphere_samples(120.0, 60);
        let b = create_fibonacci_sphere_samples(120.0, 60);
        assert_eq!(a, b);
    }

    #[test]
    fn test_direction_triangles() {
        let dirs = create_fibonacci_sphere_samples(90.0, 8);
        let triangles = direction_triangles(&dirs);
        assert_eq!(triangles.len(), 2 * dirs.len());
        let apex = &triangles[0].vertices[0];
        assert_relative_eq!(apex[2], 3.0_f32);
    }

    #[test]
    fn test_store_directions_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rays.stl");
        let dirs = create_fibonacci_sphere_samples(90.0, 16);
        store_directions_to(&dirs, &path).unwrap();

        let mut file = File::open(&path).unwrap();
        let stl = stl_io::read_stl(&mut file).unwrap();
        assert_eq!(stl.faces.len(), 2 * dirs.len());
    }

    #[test]
    fn test_store_directions_to_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("rays.stl");
        let err = store_directions_to(&[Direction::axis()], &path).unwrap_err();
        assert!(matches!(err, SupportError::IoWrite { .. }));
    }
}
