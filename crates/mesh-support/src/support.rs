//! Stochastic support point generation from per-vertex thickness.
//!
//! Thin regions need more, smaller supports. Every triangle whose corners
//! are all measured and thin enough gets a number of random points
//! proportional to its area divided by the mean support disk area of its
//! corners.

use std::f64::consts::PI;

use nalgebra::Point3;
use rand::Rng;
use tracing::{debug, trace, warn};

use crate::Mesh;
use crate::error::{SupportError, SupportResult, ensure_at_least, ensure_positive, ensure_range};
use crate::width::is_measured;

/// Mapping from thickness to support radius and point density.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "pipeline-config",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct SampleConfig {
    /// Thickness mapped to `min_radius`; thinner parts are clamped to it.
    pub min_width: f64,
    /// Thickness mapped to `max_radius`; thicker parts get no supports.
    pub max_width: f64,
    /// Smallest support radius.
    pub min_radius: f64,
    /// Largest support radius.
    pub max_radius: f64,
    /// Scales the expected number of points per triangle.
    pub multiplicator: f64,
    /// Triangles whose normal Z exceeds this are not sampled (top-facing).
    pub normal_z_max: f64,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            min_width: 0.1,
            max_width: 1.0,
            min_radius: 0.2,
            max_radius: 0.5,
            multiplicator: 1.0,
            normal_z_max: 0.9,
        }
    }
}

impl SampleConfig {
    /// Create a validated config with the given width and radius ranges.
    pub fn new(
        min_width: f64,
        max_width: f64,
        min_radius: f64,
        max_radius: f64,
    ) -> SupportResult<Self> {
        let config = Self {
            min_width,
            max_width,
            min_radius,
            max_radius,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the density multiplier.
    pub fn with_multiplicator(mut self, multiplicator: f64) -> Self {
        self.multiplicator = multiplicator;
        self
    }

    /// Check every parameter.
    pub fn validate(&self) -> SupportResult<()> {
        ensure_at_least("sample.min_width", self.min_width, 0.0)?;
        ensure_range("width", self.min_width, self.max_width)?;
        ensure_positive("sample.min_radius", self.min_radius)?;
        ensure_range("radius", self.min_radius, self.max_radius)?;
        ensure_positive("sample.multiplicator", self.multiplicator)?;
        if !self.normal_z_max.is_finite() || !(-1.0..=1.0).contains(&self.normal_z_max) {
            return Err(SupportError::invalid_parameter(
                "sample.normal_z_max",
                self.normal_z_max,
                "must lie in [-1, 1]",
            ));
        }
        Ok(())
    }

    /// Linear map of `[min_width, max_width]` onto `[min_radius, max_radius]`.
    ///
    /// Widths below `min_width` map to `min_radius`.
    pub fn width_to_radius(&self, width: f64) -> f64 {
        let width = width.max(self.min_width);
        (width - self.min_width) / (self.max_width - self.min_width)
            * (self.max_radius - self.min_radius)
            + self.min_radius
    }
}

/// A candidate support point and the radius it covers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointRadius {
    pub point: Point3<f64>,
    pub radius: f64,
}

impl PointRadius {
    pub fn new(point: Point3<f64>, radius: f64) -> Self {
        Self { point, radius }
    }
}

/// Generate random support candidates over `mesh`.
///
/// `widths` holds one thickness per vertex. A triangle with any corner that
/// is unmeasured or thicker than `max_width` yields no points. Otherwise the
/// expected count is `area / mean(PI * r^2) * multiplicator`: the integer
/// part is always emitted and the fraction decides one extra point with a
/// single draw. Points are uniform inside the triangle and their radius is
/// interpolated from the corner radii.
///
/// Draws from `rng` happen in a fixed order, so a seeded generator gives
/// reproducible output. The extra-point draw is taken after the corner and
/// normal checks, so rejected and top-facing triangles consume no draws.
///
/// Returns nothing if `widths` does not match the vertex count or a face
/// refers to a missing vertex.
pub fn generate_support_points<R: Rng + ?Sized>(
    mesh: &Mesh,
    widths: &[f64],
    config: &SampleConfig,
    rng: &mut R,
) -> Vec<PointRadius> {
    if widths.len() != mesh.vertices.len() {
        warn!(
            widths = widths.len(),
            vertices = mesh.vertices.len(),
            "Width count does not match vertex count, no support points generated"
        );
        return Vec::new();
    }
    if !mesh.has_valid_indices() {
        warn!("Face refers to a missing vertex, no support points generated");
        return Vec::new();
    }

    let mut result = Vec::new();
    let mut rejected_triangles = 0usize;
    let mut top_facing = 0usize;

    for (face_idx, face) in mesh.faces.iter().enumerate() {
        let corner_widths = face.map(|vi| widths[vi as usize]);
        // Partially supported triangles are skipped as a whole
        if corner_widths
            .iter()
            .any(|&w| !is_measured(w) || w > config.max_width)
        {
            rejected_triangles += 1;
            continue;
        }

        let Some(tri) = mesh.triangle(face_idx) else {
            continue;
        };
        let Some(normal) = tri.normal() else {
            continue;
        };
        if normal.z > config.normal_z_max {
            top_facing += 1;
            continue;
        }

        let radii = corner_widths.map(|w| config.width_to_radius(w));
        let area_per_point = radii.iter().map(|r| PI * r * r).sum::<f64>() / 3.0;

        let expected = tri.area() / area_per_point * config.multiplicator;
        let mut count = expected.trunc() as usize;
        if rng.gen_range(0.0..1.0) < expected.fract() {
            count += 1;
        }

        trace!(face = face_idx, expected, count, "Sampling triangle");

        for _ in 0..count {
            let mut b0: f64 = rng.gen_range(0.0..1.0);
            let mut b1: f64 = rng.gen_range(0.0..1.0);
            if b0 + b1 > 1.0 {
                b0 = 1.0 - b0;
                b1 = 1.0 - b1;
            }
            let b2 = 1.0 - b0 - b1;

            result.push(PointRadius {
                point: tri.interpolate(b0, b1, b2),
                radius: b0 * radii[0] + b1 * radii[1] + b2 * radii[2],
            });
        }
    }

    debug!(
        faces = mesh.faces.len(),
        rejected_triangles,
        top_facing,
        points = result.len(),
        "Generated support candidates"
    );

    result
}
