//! Local thickness estimation and support point sampling for thin parts of
//! 3D-printable meshes.
//!
//! Thin, fragile regions of a print (pins, fins, thin walls) need more and
//! smaller supports than bulky regions. This crate measures how thick the
//! solid is at every point of the surface and turns that into a set of
//! non-overlapping support points with radii.
//!
//! # Features
//!
//! - **Thickness**: shape diameter estimation by casting a cone of rays
//!   into the solid, with angle and outlier filtering
//! - **Preprocessing**: quadric-guided collapse of tiny edges and
//!   crack-free subdivision of long edges
//! - **Sampling**: area-proportional stochastic support placement
//!   driven by a caller-supplied random generator
//! - **Decluttering**: greedy Poisson-sphere filtering against each other
//!   and against supports placed earlier
//!
//! # Units and Conventions
//!
//! **This library assumes millimeter (mm) units.** Widths, radii and edge
//! lengths in every config are in the same units as the mesh.
//!
//! Face winding is **counter-clockwise (CCW) when viewed from outside** the
//! mesh, so normals point outward. Z is up; faces whose normal points up
//! past `normal_z_max` never receive supports.
//!
//! A thickness of [`NO_WIDTH`] marks a vertex that could not be measured.
//! It is a regular value, not an error.
//!
//! # Quick Start
//!
//! ```no_run
//! use mesh_support::{Mesh, PointGrid3D, TinyPartsConfig, sample_tiny_parts_detailed};
//! use rand::SeedableRng;
//! use rand::rngs::StdRng;
//!
//! # fn load() -> Mesh { Mesh::new() }
//! let mesh: Mesh = load();
//! let existing = PointGrid3D::new(1.0);
//! let mut rng = StdRng::seed_from_u64(42);
//!
//! let result = sample_tiny_parts_detailed(
//!     &mesh,
//!     &existing,
//!     &TinyPartsConfig::for_sla(),
//!     &mut rng,
//! )
//! .unwrap();
//! println!("{}", result);
//! ```
//!
//! # Using the stages directly
//!
//! ```no_run
//! use mesh_support::{
//!     Mesh, NormalStrategy, RayIndex, RaysConfig, compute_vertex_normals, calc_widths,
//!     is_measured, subdivide,
//! };
//!
//! # let mesh = Mesh::new();
//! let index = RayIndex::build(&mesh);
//! let fine = subdivide(&mesh, 0.5);
//! let normals = compute_vertex_normals(&fine, NormalStrategy::AngleWeighted);
//! let widths = calc_widths(&fine.positions(), &normals, &index, &RaysConfig::default());
//! let thin = widths.iter().filter(|&&w| is_measured(w) && w < 0.8).count();
//! println!("{} thin vertices", thin);
//! ```
//!
//! # Logging
//!
//! All stages log through `tracing`; see [`tracing_ext`] for targets.

mod bvh;
mod collapse;
mod declutter;
mod directions;
mod error;
mod grid;
mod normals;
mod pipeline;
mod subdivide;
mod support;
pub mod tracing_ext;
mod types;
mod width;

// Core types
pub use error::{SupportError, SupportErrorCode, SupportResult};
pub use types::{Mesh, Triangle, Vertex};

// Thickness estimation
pub use bvh::{RayHit, RayIndex};
pub use directions::{
    DIRECTIONS_DEBUG_FILE, Direction, create_fibonacci_sphere_samples, store_directions,
    store_directions_to,
};
pub use normals::{NormalStrategy, compute_triangle_normals, compute_vertex_normals};
pub use width::{NO_WIDTH, RaysConfig, calc_width, calc_widths, is_measured};

// Mesh preprocessing
pub use collapse::{CollapseResult, remove_small_edges};
pub use subdivide::{SubdivideResult, subdivide, subdivide_with_stats};

// Support placement
pub use declutter::poisson_sphere_from_samples;
pub use grid::{PointGrid, PointGrid3D};
pub use support::{PointRadius, SampleConfig, generate_support_points};

// Pipeline
pub use pipeline::{
    TinyPartsConfig, TinyPartsResult, sample_tiny_parts, sample_tiny_parts_detailed,
};
