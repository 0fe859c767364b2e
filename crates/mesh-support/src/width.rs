//! Local thickness (shape diameter) estimation by ray casting.
//!
//! For each surface point a cone of rays is cast into the solid along the
//! inverted normal. Hits that leave through a back-facing triangle are
//! discarded, outliers beyond a multiple of the standard deviation are
//! dropped, and the remaining distances are averaged with the direction
//! weights.
//!
//! Points whose thickness cannot be measured get [`NO_WIDTH`].

use std::f64::consts::{FRAC_PI_2, PI};

use nalgebra::{Point3, UnitQuaternion, Vector3};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::bvh::RayIndex;
use crate::directions::{Direction, create_fibonacci_sphere_samples};
use crate::error::{SupportError, SupportResult, ensure_at_least};

/// Thickness value of a point that could not be measured.
pub const NO_WIDTH: f64 = -1.0;

/// Whether `width` is a real measurement rather than [`NO_WIDTH`].
#[inline]
pub fn is_measured(width: f64) -> bool {
    width >= 0.0
}

/// Ray casting parameters for [`calc_width`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "pipeline-config",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct RaysConfig {
    /// Points whose normal Z exceeds this are not measured (top-facing).
    pub normal_z_max: f64,
    /// Discard hits whose triangle faces away from the ray.
    pub angle_filtering: bool,
    /// Maximum angle in radians between the ray and the hit triangle normal.
    pub allowed_angle: f64,
    /// Discard hit distances far from the mean.
    pub deviation_filtering: bool,
    /// Allowed distance from the mean as a multiple of the standard deviation.
    pub allowed_deviation: f64,
    /// Ray origin offset into the solid, added back to every result.
    pub safe_move: f64,
    /// Ray directions around +Z, rotated onto every inverted normal.
    pub dirs: Vec<Direction>,
}

impl Default for RaysConfig {
    fn default() -> Self {
        Self {
            normal_z_max: 0.9,
            angle_filtering: true,
            allowed_angle: FRAC_PI_2,
            deviation_filtering: true,
            allowed_deviation: 1.5,
            safe_move: 1e-5,
            dirs: create_fibonacci_sphere_samples(120.0, 60),
        }
    }
}

impl RaysConfig {
    /// Default parameters with the given directions.
    ///
    /// Fails with [`SupportError::EmptyDirections`] if `dirs` is empty.
    pub fn new(dirs: Vec<Direction>) -> SupportResult<Self> {
        let config = Self {
            dirs,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Default parameters with `count` directions spread over a cone of
    /// `angle` degrees.
    pub fn with_cone(angle: f64, count: usize) -> SupportResult<Self> {
        if !angle.is_finite() || angle <= 1.0 || angle >= 180.0 {
            return Err(SupportError::invalid_parameter(
                "angle",
                angle,
                "cone angle must lie strictly between 1 and 180 degrees",
            ));
        }
        Self::new(create_fibonacci_sphere_samples(angle, count))
    }

    /// Disable both hit filters.
    pub fn without_filtering(mut self) -> Self {
        self.angle_filtering = false;
        self.deviation_filtering = false;
        self
    }

    /// Check every parameter.
    pub fn validate(&self) -> SupportResult<()> {
        if self.dirs.is_empty() {
            return Err(SupportError::EmptyDirections);
        }
        if !self.normal_z_max.is_finite() || !(-1.0..=1.0).contains(&self.normal_z_max) {
            return Err(SupportError::invalid_parameter(
                "rays.normal_z_max",
                self.normal_z_max,
                "must lie in [-1, 1]",
            ));
        }
        if !self.allowed_angle.is_finite() || !(0.0..=PI).contains(&self.allowed_angle) {
            return Err(SupportError::invalid_parameter(
                "rays.allowed_angle",
                self.allowed_angle,
                "must lie in [0, PI] radians",
            ));
        }
        ensure_at_least("rays.allowed_deviation", self.allowed_deviation, 0.0)?;
        ensure_at_least("rays.safe_move", self.safe_move, 0.0)?;
        Ok(())
    }
}

/// Rotation taking +Z onto `target` (unit length).
fn rotation_from_z(target: &Vector3<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::rotation_between(&Vector3::z(), target)
        .unwrap_or_else(|| UnitQuaternion::from_axis_angle(&Vector3::x_axis(), PI))
}

/// Estimate the local thickness of the solid at `point`.
///
/// `normal` is the outward surface normal at `point`. Returns [`NO_WIDTH`]
/// for top-facing points, zero normals, and points where no ray survives
/// filtering.
pub fn calc_width(
    point: &Point3<f64>,
    normal: &Vector3<f64>,
    index: &RayIndex,
    config: &RaysConfig,
) -> f64 {
    let Some(normal) = normal.try_normalize(f64::EPSILON) else {
        return NO_WIDTH;
    };
    if normal.z > config.normal_z_max {
        return NO_WIDTH;
    }

    let ray_dir = -normal;
    let origin = point + ray_dir * config.safe_move;
    let rotation = rotation_from_z(&ray_dir);

    let mut widths = Vec::with_capacity(config.dirs.len());
    let mut weights = Vec::with_capacity(config.dirs.len());
    let mut sum = 0.0;
    let mut sq_sum = 0.0;

    for dir in &config.dirs {
        let ray = rotation * dir.dir;
        let Some(hit) = index.first_hit(&origin, &ray) else {
            continue;
        };

        if config.angle_filtering {
            let dot = ray_dir.dot(&index.face_normal(hit.face)).clamp(-1.0, 1.0);
            // Larger angles mean the ray left through the wrong side
            if dot.acos() > config.allowed_angle {
                continue;
            }
        }

        widths.push(hit.distance);
        weights.push(dir.weight);
        sum += hit.distance;
        sq_sum += hit.distance * hit.distance;
    }

    match widths.len() {
        0 => return NO_WIDTH,
        1 => return widths[0] + config.safe_move,
        _ => {}
    }

    let n = widths.len() as f64;
    let mean = sum / n;
    let std_dev = (sq_sum / n - mean * mean).max(0.0).sqrt();
    let threshold = std_dev * config.allowed_deviation;

    let mut weighted_sum = 0.0;
    let mut weight_sum = 0.0;
    for (&width, &weight) in widths.iter().zip(&weights) {
        if config.deviation_filtering && (width - mean).abs() > threshold {
            continue;
        }
        weighted_sum += width * weight;
        weight_sum += weight;
    }

    if weight_sum <= 0.0 {
        return mean + config.safe_move;
    }
    weighted_sum / weight_sum + config.safe_move
}

/// Estimate thickness for every point, in parallel.
///
/// The result is aligned with `points`. Mismatched or empty inputs and an
/// empty direction set yield an empty vector.
pub fn calc_widths(
    points: &[Point3<f64>],
    normals: &[Vector3<f64>],
    index: &RayIndex,
    config: &RaysConfig,
) -> Vec<f64> {
    if points.is_empty() || config.dirs.is_empty() || points.len() != normals.len() {
        warn!(
            points = points.len(),
            normals = normals.len(),
            directions = config.dirs.len(),
            "Cannot measure widths: empty or mismatched input"
        );
        return Vec::new();
    }

    info!(
        points = points.len(),
        directions = config.dirs.len(),
        faces = index.face_count(),
        "Measuring local thickness"
    );

    let widths: Vec<f64> = points
        .par_iter()
        .zip(normals.par_iter())
        .map(|(point, normal)| calc_width(point, normal, index, config))
        .collect();

    let unmeasured = widths.iter().filter(|w| !is_measured(**w)).count();
    debug!(
        measured = widths.len() - unmeasured,
        unmeasured, "Thickness measurement complete"
    );

    widths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Mesh;
    use approx::assert_relative_eq;

    /// Closed slab `[-10, 10]^2 x [0, thickness]`, CCW from outside.
    fn make_slab(thickness: f64) -> Mesh {
        let (s, t) = (10.0, thickness);
        Mesh::from_parts(
            &[
                [-s, -s, 0.0],
                [s, -s, 0.0],
                [s, s, 0.0],
                [-s, s, 0.0],
                [-s, -s, t],
                [s, -s, t],
                [s, s, t],
                [-s, s, t],
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

    fn down() -> Vector3<f64> {
        Vector3::new(0.0, 0.0, -1.0)
    }

    #[test]
    fn test_is_measured() {
        assert!(is_measured(0.0));
        assert!(is_measured(2.5));
        assert!(!is_measured(NO_WIDTH));
    }

    #[test]
    fn test_rotation_from_z() {
        for target in [
            Vector3::z(),
            -Vector3::z(),
            Vector3::x(),
            Vector3::new(1.0, -2.0, 0.5).normalize(),
        ] {
            let rotated = rotation_from_z(&target) * Vector3::z();
            assert_relative_eq!(rotated, target, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_parallel_planes_single_direction() {
        let thickness = 1.5;
        let index = RayIndex::build(&make_slab(thickness));
        let config = RaysConfig::new(vec![Direction::axis()]).unwrap();

        let width = calc_width(&Point3::new(1.0, 2.0, 0.0), &down(), &index, &config);
        assert_relative_eq!(width, thickness, epsilon = 1e-9);
    }

    #[test]
    fn test_single_hit_adds_safe_move_back() {
        // The ray starts safe_move inside, the reported width is the full slab
        let index = RayIndex::build(&make_slab(1.5));
        let mut config = RaysConfig::new(vec![Direction::axis()]).unwrap();
        config.safe_move = 0.25;

        let width = calc_width(&Point3::new(1.0, 2.0, 0.0), &down(), &index, &config);
        assert_relative_eq!(width, 1.5, epsilon = 1e-9);
    }

    #[test]
    fn test_parallel_planes_unfiltered_axis_cone() {
        // Directions close to the axis, oblique hits are at most 1/cos(10deg) longer.
        let thickness = 1.0;
        let index = RayIndex::build(&make_slab(thickness));
        let config = RaysConfig::with_cone(20.0, 200).unwrap().without_filtering();
        assert!(config.dirs.len() > 1);

        let width = calc_width(&Point3::new(1.0, 2.0, 0.0), &down(), &index, &config);
        assert!(width >= thickness - 1e-9);
        assert!(width <= thickness / 10.0_f64.to_radians().cos() + 1e-9);
    }

    #[test]
    fn test_default_cone_bounded() {
        let thickness = 1.0;
        let index = RayIndex::build(&make_slab(thickness));
        let config = RaysConfig::default();

        let width = calc_width(&Point3::new(1.0, 2.0, 0.0), &down(), &index, &config);
        // Rays stay within 60 degrees of the normal
        assert!(width >= thickness - 1e-9, "width {width}");
        assert!(width <= 2.0 * thickness + 1e-9, "width {width}");
    }

    #[test]
    fn test_top_facing_is_unmeasured() {
        let index = RayIndex::build(&make_slab(1.0));
        let config = RaysConfig::default();

        let width = calc_width(&Point3::new(0.0, 0.0, 1.0), &Vector3::z(), &index, &config);
        assert_eq!(width, NO_WIDTH);
    }

    #[test]
    fn test_zero_normal_is_unmeasured() {
        let index = RayIndex::build(&make_slab(1.0));
        let config = RaysConfig::default();

        let width = calc_width(&Point3::origin(), &Vector3::zeros(), &index, &config);
        assert_eq!(width, NO_WIDTH);
    }

    #[test]
    fn test_no_hit_is_unmeasured() {
        // Point above the slab looking away from it
        let index = RayIndex::build(&make_slab(1.0));
        let config = RaysConfig::new(vec![Direction::axis()]).unwrap();

        let width = calc_width(&Point3::new(0.0, 0.0, 5.0), &down(), &index, &config);
        assert_eq!(width, NO_WIDTH);
    }

    #[test]
    fn test_back_face_hit_is_filtered() {
        // Below the slab, the ray enters the bottom face from outside.
        let index = RayIndex::build(&make_slab(1.0));
        let origin = Point3::new(1.0, 2.0, -3.0);

        let config = RaysConfig::new(vec![Direction::axis()]).unwrap();
        assert_eq!(calc_width(&origin, &down(), &index, &config), NO_WIDTH);

        let config = config.without_filtering();
        assert_relative_eq!(calc_width(&origin, &down(), &index, &config), 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_calc_widths_batch() {
        let index = RayIndex::build(&make_slab(2.0));
        let config = RaysConfig::new(vec![Direction::axis()]).unwrap();
        let points = vec![
            Point3::new(0.5, 0.2, 0.0),
            Point3::new(0.5, 0.2, 2.0),
            Point3::new(3.0, -4.0, 0.0),
        ];
        let normals = vec![down(), Vector3::z(), down()];

        let widths = calc_widths(&points, &normals, &index, &config);
        assert_eq!(widths.len(), 3);
        assert_relative_eq!(widths[0], 2.0, epsilon = 1e-9);
        assert_eq!(widths[1], NO_WIDTH);
        assert_relative_eq!(widths[2], 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_calc_widths_matches_sequential() {
        let index = RayIndex::build(&make_slab(1.0));
        let config = RaysConfig::default();
        let points: Vec<Point3<f64>> = (0..64)
            .map(|i| Point3::new(-8.0 + 0.25 * i as f64, 0.5 * (i % 7) as f64, 0.0))
            .collect();
        let normals = vec![down(); points.len()];

        let parallel = calc_widths(&points, &normals, &index, &config);
        let sequential: Vec<f64> = points
            .iter()
            .zip(&normals)
            .map(|(p, n)| calc_width(p, n, &index, &config))
            .collect();
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn test_calc_widths_mismatched_lengths() {
        let index = RayIndex::build(&make_slab(1.0));
        let config = RaysConfig::default();
        let points = vec![Point3::origin(); 3];
        let normals = vec![down(); 2];

        assert!(calc_widths(&points, &normals, &index, &config).is_empty());
        assert!(calc_widths(&[], &[], &index, &config).is_empty());
    }

    #[test]
    fn test_calc_widths_empty_directions() {
        let index = RayIndex::build(&make_slab(1.0));
        let config = RaysConfig {
            dirs: Vec::new(),
            ..Default::default()
        };
        let widths = calc_widths(&[Point3::origin()], &[down()], &index, &config);
        assert!(widths.is_empty());
    }

    #[test]
    fn test_config_validation() {
        assert!(RaysConfig::default().validate().is_ok());
        assert!(matches!(
            RaysConfig::new(Vec::new()),
            Err(SupportError::EmptyDirections)
        ));
        assert!(RaysConfig::with_cone(180.0, 10).is_err());
        assert!(RaysConfig::with_cone(0.5, 10).is_err());

        let config = RaysConfig {
            normal_z_max: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RaysConfig {
            safe_move: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
