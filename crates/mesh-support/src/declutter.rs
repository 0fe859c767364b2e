//! Greedy Poisson-sphere filtering of support candidates.

use tracing::debug;

use crate::grid::{PointGrid, PointGrid3D};
use crate::support::PointRadius;

/// Keep a subset of `samples` whose spheres do not overlap each other or
/// anything in `grid`.
///
/// Candidates are visited by radius, largest first, so big supports are
/// never crowded out by many small ones. Equal radii keep their input
/// order. The accepted points are returned in visiting order; `grid` itself
/// is not modified.
///
/// # Example
/// ```
/// use mesh_support::{PointGrid3D, PointRadius, poisson_sphere_from_samples};
/// use nalgebra::Point3;
///
/// let samples = vec![
///     PointRadius::new(Point3::new(0.0, 0.0, 0.0), 0.5),
///     PointRadius::new(Point3::new(0.6, 0.0, 0.0), 1.0),
/// ];
/// let kept = poisson_sphere_from_samples(samples, &PointGrid3D::new(1.0));
/// assert_eq!(kept.len(), 1);
/// assert_eq!(kept[0].radius, 1.0);
/// ```
pub fn poisson_sphere_from_samples<G: PointGrid + ?Sized>(
    mut samples: Vec<PointRadius>,
    grid: &G,
) -> Vec<PointRadius> {
    let Some(max_radius) = samples.iter().map(|s| s.radius).max_by(f64::total_cmp) else {
        return samples;
    };

    samples.sort_by(|a, b| b.radius.total_cmp(&a.radius));

    let candidates = samples.len();
    let mut local = PointGrid3D::new(max_radius);
    let mut accepted = Vec::with_capacity(candidates);

    for sample in samples {
        if local.collides_with(&sample.point, sample.radius)
            || grid.collides_with(&sample.point, sample.radius)
        {
            continue;
        }
        local.insert(sample.point, sample.radius);
        accepted.push(sample);
    }

    debug!(
        candidates,
        accepted = accepted.len(),
        max_radius,
        "Decluttered support candidates"
    );

    accepted
}
