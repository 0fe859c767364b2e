//! End-to-end support sampling for tiny parts.
//!
//! The pipeline runs in a fixed order:
//!
//! 1. collapse edges shorter than `min_length` on a copy of the mesh
//! 2. build the ray index on the collapsed mesh
//! 3. subdivide until no edge is longer than `max_length`
//! 4. compute vertex normals and estimate thickness at every vertex
//! 5. draw support candidates from thin triangles
//! 6. drop candidates colliding with each other or with existing supports
//!
//! # Example
//!
//! ```
//! use mesh_support::{Mesh, PointGrid3D, TinyPartsConfig, sample_tiny_parts};
//! use rand::SeedableRng;
//! use rand::rngs::StdRng;
//!
//! let mesh = Mesh::from_parts(
//!     &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
//!     &[[0, 2, 1]],
//! );
//! let mut rng = StdRng::seed_from_u64(42);
//! let points = sample_tiny_parts(
//!     &mesh,
//!     &PointGrid3D::new(1.0),
//!     &TinyPartsConfig::default(),
//!     &mut rng,
//! )
//! .unwrap();
//! // A single open triangle has nothing to measure against
//! assert!(points.is_empty());
//! ```

use std::fmt;

use nalgebra::Point3;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::bvh::RayIndex;
use crate::collapse::{CollapseResult, remove_small_edges};
use crate::declutter::poisson_sphere_from_samples;
use crate::error::{SupportResult, ensure_at_least, ensure_positive};
use crate::grid::PointGrid;
use crate::normals::{NormalStrategy, compute_vertex_normals};
use crate::subdivide::subdivide_with_stats;
use crate::support::{PointRadius, SampleConfig, generate_support_points};
use crate::tracing_ext::{OperationTimer, log_mesh_stats, log_width_stats};
use crate::types::Mesh;
use crate::width::{RaysConfig, calc_widths, is_measured};

/// Parameters of the whole sampling pipeline.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "pipeline-config",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct TinyPartsConfig {
    /// Edges shorter than this are collapsed before measuring. Zero disables
    /// the collapse.
    pub min_length: f64,
    /// Largest allowed surface deviation of a single collapse.
    pub max_error: f64,
    /// Longest edge left after subdivision. Bounds the spacing of measured
    /// vertices.
    pub max_length: f64,
    /// How face normals are combined into vertex normals.
    pub normal_strategy: NormalStrategy,
    /// Thickness estimation.
    pub rays: RaysConfig,
    /// Thickness to support mapping.
    pub sample: SampleConfig,
}

impl Default for TinyPartsConfig {
    fn default() -> Self {
        Self {
            min_length: 0.1,
            max_error: 0.01,
            max_length: 0.5,
            normal_strategy: NormalStrategy::default(),
            rays: RaysConfig::default(),
            sample: SampleConfig::default(),
        }
    }
}

impl TinyPartsConfig {
    /// Finer preset for resin printing: denser measurement and smaller
    /// supports.
    pub fn for_sla() -> Self {
        Self {
            min_length: 0.05,
            max_error: 0.005,
            max_length: 0.25,
            normal_strategy: NormalStrategy::AngleWeighted,
            rays: RaysConfig::default(),
            sample: SampleConfig {
                min_width: 0.05,
                max_width: 0.8,
                min_radius: 0.1,
                max_radius: 0.3,
                multiplicator: 1.0,
                normal_z_max: 0.9,
            },
        }
    }

    /// Check every parameter, including the nested configs.
    pub fn validate(&self) -> SupportResult<()> {
        ensure_at_least("min_length", self.min_length, 0.0)?;
        ensure_at_least("max_error", self.max_error, 0.0)?;
        ensure_positive("max_length", self.max_length)?;
        self.rays.validate()?;
        self.sample.validate()?;
        Ok(())
    }

    /// Load configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or doesn't match the schema.
    #[cfg(feature = "pipeline-config")]
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Serialize to TOML string.
    #[cfg(feature = "pipeline-config")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Outcome of [`sample_tiny_parts_detailed`].
#[derive(Debug, Clone, Default)]
pub struct TinyPartsResult {
    /// Accepted support points.
    pub points: Vec<Point3<f64>>,
    /// Accepted support points with their radii.
    pub supports: Vec<PointRadius>,
    /// Candidates drawn before decluttering.
    pub candidates_generated: usize,
    /// Vertices of the subdivided mesh with a thickness estimate.
    pub vertices_measured: usize,
    /// Vertices of the subdivided mesh without one.
    pub vertices_unmeasurable: usize,
    /// Statistics of the edge collapse stage.
    pub collapse: CollapseResult,
    /// Vertex count of the measured mesh.
    pub subdivided_vertices: usize,
    /// Face count of the measured mesh.
    pub subdivided_triangles: usize,
}

impl TinyPartsResult {
    /// Share of candidates that survived decluttering.
    pub fn acceptance_ratio(&self) -> f64 {
        if self.candidates_generated == 0 {
            0.0
        } else {
            self.points.len() as f64 / self.candidates_generated as f64
        }
    }
}

impl fmt::Display for TinyPartsResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tiny Parts Support Sampling:")?;
        writeln!(
            f,
            "  Edge collapses: {} ({} rejected)",
            self.collapse.collapses_performed, self.collapse.collapses_rejected
        )?;
        writeln!(
            f,
            "  Measured mesh: {} vertices, {} triangles",
            self.subdivided_vertices, self.subdivided_triangles
        )?;
        writeln!(
            f,
            "  Vertices measured: {} ({} unmeasurable)",
            self.vertices_measured, self.vertices_unmeasurable
        )?;
        writeln!(f, "  Candidates generated: {}", self.candidates_generated)?;
        write!(
            f,
            "  Supports accepted: {} ({:.1}%)",
            self.points.len(),
            self.acceptance_ratio() * 100.0
        )
    }
}

/// Support points for the thin parts of `mesh`.
///
/// `grid` holds supports placed earlier; new points never collide with them.
/// The result is fully determined by the inputs and the state of `rng`.
///
/// # Errors
///
/// Returns an error if `config` is invalid or `mesh` references missing
/// vertices or holds non-finite coordinates.
pub fn sample_tiny_parts<G, R>(
    mesh: &Mesh,
    grid: &G,
    config: &TinyPartsConfig,
    rng: &mut R,
) -> SupportResult<Vec<Point3<f64>>>
where
    G: PointGrid + ?Sized,
    R: Rng + ?Sized,
{
    sample_tiny_parts_detailed(mesh, grid, config, rng).map(|result| result.points)
}

/// Like [`sample_tiny_parts`], with statistics of every stage.
pub fn sample_tiny_parts_detailed<G, R>(
    mesh: &Mesh,
    grid: &G,
    config: &TinyPartsConfig,
    rng: &mut R,
) -> SupportResult<TinyPartsResult>
where
    G: PointGrid + ?Sized,
    R: Rng + ?Sized,
{
    config.validate()?;
    mesh.validate()?;

    if mesh.faces.is_empty() {
        warn!("Mesh has no faces, no supports generated");
        return Ok(TinyPartsResult::default());
    }

    info!(
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        "Sampling tiny part supports"
    );

    let mut collapsed = mesh.clone();
    let collapse = {
        let _timer =
            OperationTimer::with_context("collapse", mesh.face_count(), mesh.vertex_count());
        remove_small_edges(&mut collapsed, config.min_length, config.max_error)
    };
    log_mesh_stats(&collapsed, "after collapse");

    let index = {
        let _timer = OperationTimer::with_context(
            "ray_index",
            collapsed.face_count(),
            collapsed.vertex_count(),
        );
        RayIndex::build(&collapsed)
    };

    let divided = {
        let _timer = OperationTimer::with_context(
            "subdivide",
            collapsed.face_count(),
            collapsed.vertex_count(),
        );
        subdivide_with_stats(&collapsed, config.max_length)
    };
    let measured_mesh = divided.mesh;
    log_mesh_stats(&measured_mesh, "after subdivision");

    let widths = {
        let _timer = OperationTimer::with_context(
            "widths",
            measured_mesh.face_count(),
            measured_mesh.vertex_count(),
        );
        let normals = compute_vertex_normals(&measured_mesh, config.normal_strategy);
        calc_widths(&measured_mesh.positions(), &normals, &index, &config.rays)
    };
    log_width_stats(&widths);

    let vertices_measured = widths.iter().filter(|&&w| is_measured(w)).count();
    let vertices_unmeasurable = widths.len() - vertices_measured;
    debug!(
        measured = vertices_measured,
        unmeasurable = vertices_unmeasurable,
        "Thickness estimated"
    );

    let candidates = {
        let _timer = OperationTimer::new("generate");
        generate_support_points(&measured_mesh, &widths, &config.sample, rng)
    };
    let candidates_generated = candidates.len();

    let supports = {
        let _timer = OperationTimer::new("declutter");
        poisson_sphere_from_samples(candidates, grid)
    };
    let points = supports.iter().map(|s| s.point).collect::<Vec<_>>();

    info!(
        candidates = candidates_generated,
        accepted = points.len(),
        "Tiny part supports sampled"
    );

    Ok(TinyPartsResult {
        points,
        supports,
        candidates_generated,
        vertices_measured,
        vertices_unmeasurable,
        collapse,
        subdivided_vertices: measured_mesh.vertex_count(),
        subdivided_triangles: measured_mesh.face_count(),
    })
}
